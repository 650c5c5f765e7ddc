//! Panoramic tracking worker binary.
//!
//! Reads control commands one per line from stdin in live mode and prints
//! the session summary as JSON when the session ends.

use std::path::Path;

use anyhow::{anyhow, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use pano_media::{FrameSource, ImageSequenceSource};
use pano_models::{Command, RunMode};
use pano_worker::{init_tracing, send_command, Collaborators, CommandRequest, SessionRunner, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting pano-worker");

    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    let marker = config
        .marker
        .ok_or_else(|| anyhow!("PANO_MARKER_X and PANO_MARKER_Y are required without a marker detector"))?;
    let collaborators = Collaborators::fallback(marker);
    let source = open_source(&config.source)?;

    let (commands, requests) = mpsc::channel(config.command_buffer);
    if config.mode == RunMode::LiveStreaming {
        tokio::spawn(read_commands(commands.clone()));
    }

    // Ctrl-C ends the session like a SHUTDOWN command
    let interrupt = commands.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        if let Err(e) = send_command(&interrupt, Command::Shutdown).await {
            warn!("Shutdown not delivered: {}", e);
        }
    });
    drop(commands);

    let summary = match SessionRunner::new(config, collaborators).run(source, requests).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Session failed: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!("Worker shutdown complete");
    Ok(())
}

/// Forward stdin lines as commands; end of input disconnects.
async fn read_commands(commands: mpsc::Sender<CommandRequest>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command = Command::parse(line.as_bytes());
        match send_command(&commands, command).await {
            Ok(Some(reply)) if command == Command::Receive => println!("<{} bytes>", reply.len()),
            Ok(Some(reply)) => println!("{}", String::from_utf8_lossy(&reply)),
            Ok(None) => {}
            Err(e) => {
                warn!("Command not delivered: {}", e);
                return;
            }
        }
    }
    send_command(&commands, Command::Disconnect).await.ok();
}

fn open_source(location: &str) -> anyhow::Result<Box<dyn FrameSource>> {
    let path = Path::new(location);
    if path.is_dir() {
        let source = ImageSequenceSource::open(path).with_context(|| format!("opening {location}"))?;
        return Ok(Box::new(source));
    }
    open_video(location)
}

#[cfg(feature = "opencv")]
fn open_video(location: &str) -> anyhow::Result<Box<dyn FrameSource>> {
    use pano_media::VideoCaptureSource;

    let source = match location.parse::<i32>() {
        Ok(camera) => VideoCaptureSource::from_camera(camera)?,
        Err(_) => VideoCaptureSource::from_file(location)?,
    };
    Ok(Box::new(source))
}

#[cfg(not(feature = "opencv"))]
fn open_video(location: &str) -> anyhow::Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "{location} is not an image directory; video files and cameras need the `opencv` feature"
    ))
}
