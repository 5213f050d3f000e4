// src/main.rs
use anyhow::{Context, bail};
use clap::Parser;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nvmecollectd::collector::{
    DriveEnumerator, DumpTransport, IdentityCache, NvmeDrive, NvmeTransport, SensorBoard,
    create_device, telemetry,
};
use nvmecollectd::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = Config::parse();

    let (transport, enumerator) = select_transport(&config)?;
    let cache = IdentityCache::with_max_slots(transport, config.max_slots);
    let board = Arc::new(SensorBoard::new());

    let mut drives = Vec::new();
    for descriptor in enumerator
        .storage_devices()
        .context("Failed to list storage devices")?
    {
        match create_device(&cache, &descriptor, board.clone()) {
            Some(drive) => drives.push(drive),
            None => info!(
                serial = %descriptor.serial,
                "Storage device {} is not an NVMe drive", descriptor.logical_index
            ),
        }
    }
    info!("Monitoring {} NVMe drive(s)", drives.len());

    if config.report {
        for drive in &drives {
            println!("{}", drive.render());
        }
        return Ok(());
    }
    if config.once {
        println!("{}", serde_json::to_string_pretty(&telemetry(&drives))?);
        return Ok(());
    }

    info!("Sending metrics to UDP {}", config.target);
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let mut interval = tokio::time::interval(config.poll_interval());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                poll(&mut drives);
                let bytes = serde_json::to_vec(&telemetry(&drives))?;
                match socket.send_to(&bytes, &config.target).await {
                    Ok(_) => info!("Sent metrics to {} ({} bytes)", config.target, bytes.len()),
                    Err(e) => warn!("Failed to send UDP packet: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    for drive in &mut drives {
        drive.close();
    }
    Ok(())
}

/// A failing drive keeps its previous values and never stops the others.
fn poll(drives: &mut [NvmeDrive]) {
    for drive in drives.iter_mut() {
        if let Err(e) = drive.tick() {
            warn!(drive = %drive.identifier(), "Failed to poll NVMe drive: {}", e);
        }
    }
}

fn select_transport(
    config: &Config,
) -> anyhow::Result<(Arc<dyn NvmeTransport>, Box<dyn DriveEnumerator>)> {
    if let Some(dir) = &config.dump_dir {
        info!("Replaying NVMe captures from {}", dir.display());
        let dump = DumpTransport::new(dir);
        let transport: Arc<dyn NvmeTransport> = Arc::new(dump.clone());
        let enumerator: Box<dyn DriveEnumerator> = Box::new(dump);
        return Ok((transport, enumerator));
    }

    #[cfg(windows)]
    {
        use nvmecollectd::collector::windows::WindowsTransport;
        let transport: Arc<dyn NvmeTransport> = Arc::new(WindowsTransport::new());
        let enumerator: Box<dyn DriveEnumerator> = Box::new(WindowsTransport::new());
        return Ok((transport, enumerator));
    }

    #[cfg(not(windows))]
    {
        bail!("no native NVMe transport on this platform; pass --dump-dir");
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
