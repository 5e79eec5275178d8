use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scan_core::{
    drive_view, load_settings, HttpTransport, MediaSource, MissingMediaSource, Phase,
    ScanController, StillImageCamera,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod terminal;

use terminal::{outcome_json, TerminalView};

#[derive(Parser, Debug)]
#[command(name = "monument-scan", about = "Identify a monument from a photo")]
struct Cli {
    /// Base URL of the recognition service; `/scan/` is appended.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Settings file (defaults to ./scan.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "info")]
    log_filter: String,
    /// Print the final outcome as JSON instead of the live view.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan an image file from disk.
    Upload { path: PathBuf },
    /// Capture a frame from a still-image camera device and scan it.
    Camera { device: PathBuf },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_filter);

    let mut settings =
        load_settings(cli.config.as_deref()).context("failed to load scan settings")?;
    if let Some(url) = &cli.api_url {
        settings.api_base_url = url.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        settings.request_timeout_secs = secs;
    }
    settings.validate().context("invalid scan settings")?;

    let transport = HttpTransport::new(&settings).context("failed to build scan transport")?;
    info!(
        endpoint = %transport.endpoint(),
        timeout_secs = settings.request_timeout_secs,
        "scan service configured"
    );

    let media: Arc<dyn MediaSource> = match &cli.command {
        Command::Camera { device } => Arc::new(StillImageCamera::new(device)),
        Command::Upload { .. } => Arc::new(MissingMediaSource),
    };
    let mut controller = ScanController::new(media, Arc::new(transport));

    let events = controller.subscribe();
    let quiet = cli.json;
    let view_task = tokio::spawn(async move {
        let mut view = TerminalView::new(std::io::stdout(), quiet);
        drive_view(events, &mut view).await
    });

    let outcome = run(&mut controller, &cli.command).await;
    let last = controller.snapshot();
    drop(controller);
    view_task.await.context("terminal view task failed")?;
    outcome?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&last))?);
    }

    Ok(if last.phase == Phase::Succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run(controller: &mut ScanController, command: &Command) -> Result<()> {
    match command {
        Command::Upload { path } => {
            controller
                .select_path(path)
                .await
                .with_context(|| format!("failed to load image '{}'", path.display()))?;
        }
        Command::Camera { .. } => {
            controller.request_camera().await?;
            if controller.phase() != Phase::CameraActive {
                return Ok(());
            }
            controller
                .capture_frame()
                .context("failed to capture camera frame")?;
        }
    }

    controller.submit_scan().await?;
    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
