use onvif_cam::{DeviceManagement, Imaging, IrCutMode, OnvifCam, Ptz};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        println!("Usage: {} <IP> <Username> <Password> [ONVIF port]", args[0]);
        return Ok(());
    }

    let port: u16 = match args.get(4) {
        Some(raw) => raw.parse()?,
        None => 80,
    };

    let cam = OnvifCam::new(args[1].as_str())
        .with_onvif_port(port)
        .with_credentials(args[2].as_str(), args[3].as_str())
        .with_timeout(Duration::from_secs(5));

    cam.connect().await?;
    println!("Connected to {}", cam.get_device_info().await?);

    for profile in cam.profiles().await {
        println!("Profile {}: {}", profile.token, profile.name);
    }

    println!("Current settings: {:?}", cam.get_imaging_settings().await?);

    println!("Setting brightness to 60...");
    cam.set_brightness(60.0).await?;

    println!("Toggling night vision...");
    cam.set_ir_cut_mode(IrCutMode::Off).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    cam.set_ir_cut_mode(IrCutMode::Auto).await?;

    println!("Panning right...");
    cam.ptz_move(0.5, 0.0, 0.0).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    cam.ptz_stop().await?;

    println!("Zooming in...");
    cam.ptz_move(0.0, 0.0, 0.5).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    cam.ptz_stop().await?;

    cam.close().await;
    println!("Done.");

    Ok(())
}
