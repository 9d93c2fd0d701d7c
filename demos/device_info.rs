use onvif_cam::{DeviceManagement, Media, OnvifCam};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        println!("Usage: {} <IP> <Username> <Password>", args[0]);
        return Ok(());
    }

    let cam = OnvifCam::new(args[1].as_str())
        .with_credentials(args[2].as_str(), args[3].as_str())
        .with_timeout(Duration::from_secs(5));

    println!("Device: {}", cam.get_device_info().await?);
    println!("Device clock (UTC): {}", cam.get_system_date_and_time().await?);

    cam.connect().await?;

    println!("Profiles:");
    for profile in cam.profiles().await {
        println!("  {} ({})", profile.token, profile.name);
    }
    println!("Video sources:");
    for source in cam.video_sources().await {
        let resolution = source
            .resolution
            .map(|(w, h)| format!("{}x{}", w, h))
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "  {} ({}, {} fps)",
            source.token,
            resolution,
            source.framerate.unwrap_or(0.0)
        );
    }

    println!("Stream URI: {}", cam.get_stream_uri().await?);

    cam.close().await;
    Ok(())
}
