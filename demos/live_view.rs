use onvif_cam::{StreamEvent, VideoStream};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("Usage: {} <RTSP URL> [seconds]", args[0]);
        return Ok(());
    }

    let seconds: u64 = match args.get(2) {
        Some(raw) => raw.parse()?,
        None => 10,
    };

    println!("Connecting to {}...", args[1]);
    let mut stream = VideoStream::open(&args[1], None, Duration::from_secs(10)).await?;
    println!("Connected. Pulling frames for {} seconds...", seconds);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    let mut frames = 0u64;
    let mut keyframes = 0u64;

    loop {
        let event = tokio::select! {
            event = stream.poll() => event?,
            _ = tokio::time::sleep_until(deadline) => break,
        };

        match event {
            StreamEvent::Frame(frame) => {
                frames += 1;
                if frame.is_keyframe {
                    keyframes += 1;
                    println!(
                        "Keyframe at {}: {} bytes ({} frames so far, {} lost packets)",
                        frame.timestamp,
                        frame.data.len(),
                        frames,
                        frame.loss
                    );
                }
            }
            StreamEvent::EndOfStream => {
                println!("Server ended the stream.");
                break;
            }
        }
    }

    println!("Received {} frames ({} keyframes).", frames, keyframes);
    stream.close().await;

    Ok(())
}
