//! scope_monitor - live microscope-feed detection monitor
//!
//! This binary:
//! 1. Opens the camera feed and reads back its resolution
//! 2. Loads the class catalog from the detection service (or the defaults)
//! 3. Runs one detection cycle every period until stopped
//! 4. Shows per-class statistics and optionally writes the annotated frame
//!
//! Stdin commands: `pause`/`hide`, `resume`/`show`, `stop`/`quit`.
//! Ctrl-C stops the loop.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use scope_monitor::{
    run_loop, CameraSource, ClassCatalog, CycleDispatcher, FacingMode, HttpDetectionClient,
    LoopScheduler, LoopState, MonitorConfig, MonitorError, Session, SessionOptions, Status,
    Trigger, Ui,
};

const PERMISSION_EXIT_CODE: i32 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about = "Live microscope-feed detection monitor")]
struct Args {
    /// Config file (JSON, or TOML by extension). Overrides SCOPE_CONFIG.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Detection service base URL.
    #[arg(long, value_name = "URL")]
    server_url: Option<String>,

    /// Camera feed URL (stub://..., http(s)://...).
    #[arg(long, value_name = "URL")]
    camera_url: Option<String>,

    /// Ideal capture width.
    #[arg(long)]
    width: Option<u32>,

    /// Ideal capture height.
    #[arg(long)]
    height: Option<u32>,

    /// Preferred camera facing (user|environment).
    #[arg(long, value_name = "FACING")]
    facing: Option<String>,

    /// Milliseconds between detection cycles.
    #[arg(long)]
    period_ms: Option<u64>,

    /// Write the annotated frame here (PNG) after every successful cycle.
    #[arg(long, value_name = "PATH")]
    overlay_out: Option<PathBuf>,

    /// TrueType/OpenType font for box labels.
    #[arg(long, value_name = "PATH")]
    font: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = match &args.config {
        Some(path) => MonitorConfig::load_from(Some(path))?,
        None => MonitorConfig::load()?,
    };
    let cfg = apply_args(cfg, &args)?;
    log::info!(
        "scope_monitor {} server={} camera={} period={}ms",
        env!("CARGO_PKG_VERSION"),
        cfg.server_url,
        cfg.camera.url,
        cfg.period.as_millis()
    );

    let display = Arc::new(ui.panel());

    display.set_status(Status::RequestingCamera);
    let mut camera = CameraSource::new(cfg.camera.clone())?;
    let opened = {
        let _stage = ui.stage("Open camera");
        camera.open()
    };
    let resolution = match opened {
        Ok(resolution) => resolution,
        Err(e) => {
            display.set_status(Status::CameraError);
            if MonitorError::is_permission_denied(&e) {
                eprintln!();
                eprintln!("Camera access was denied: {:#}", e);
                eprintln!("Grant access to the camera feed and start scope_monitor again.");
                std::process::exit(PERMISSION_EXIT_CODE);
            }
            return Err(e).context("camera could not be opened");
        }
    };
    log::info!("camera delivering {}", resolution);

    let client = HttpDetectionClient::new(&cfg.server_url)?;
    let catalog = {
        let _stage = ui.stage("Load class catalog");
        ClassCatalog::load(&client)
    };

    let session = Session::new(
        catalog,
        camera,
        Arc::new(client),
        SessionOptions {
            jpeg_quality: cfg.jpeg_quality,
            font_path: cfg.font_path.clone(),
            overlay_path: cfg.overlay_path.clone(),
        },
    )?
    .with_view(Box::new(display.clone()));
    let session = Arc::new(session);

    let (tx, rx) = mpsc::channel::<Trigger>();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Trigger::Stop);
    })
    .expect("error setting Ctrl-C handler");
    spawn_command_reader(tx);

    let mut scheduler = LoopScheduler::new(cfg.period)?;
    let mut dispatcher = CycleDispatcher::new(session.clone());
    run_loop(&mut scheduler, &mut dispatcher, &rx, |state| match state {
        LoopState::Running => display.set_status(Status::Detecting),
        LoopState::Paused => display.set_status(Status::Paused),
        LoopState::Stopped => display.set_status(Status::Stopped),
        LoopState::Idle => {}
    });

    session.shutdown()?;
    let stats = session.stats();
    log::info!(
        "scope_monitor stopped: {} cycles ok, {} failed",
        stats.cycles_ok,
        stats.cycles_failed
    );
    Ok(())
}

fn apply_args(mut cfg: MonitorConfig, args: &Args) -> Result<MonitorConfig> {
    if let Some(url) = &args.server_url {
        cfg.server_url = url.clone();
    }
    if let Some(url) = &args.camera_url {
        cfg.camera.url = url.clone();
    }
    if let Some(width) = args.width {
        cfg.camera.ideal_width = width;
    }
    if let Some(height) = args.height {
        cfg.camera.ideal_height = height;
    }
    if let Some(facing) = &args.facing {
        cfg.camera.facing = match facing.as_str() {
            "user" => FacingMode::User,
            "environment" => FacingMode::Environment,
            other => anyhow::bail!("facing must be user or environment, got {}", other),
        };
    }
    if let Some(millis) = args.period_ms {
        cfg.period = Duration::from_millis(millis);
    }
    if let Some(path) = &args.overlay_out {
        cfg.overlay_path = Some(path.clone());
    }
    if let Some(path) = &args.font {
        cfg.font_path = Some(path.clone());
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Forward operator commands from stdin. EOF ends the reader, not the loop.
fn spawn_command_reader(tx: mpsc::Sender<Trigger>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match Trigger::from_command(&line) {
                Some(trigger) => {
                    if tx.send(trigger).is_err() {
                        break;
                    }
                }
                None => log::warn!("unknown command '{}'; try pause, resume or stop", line.trim()),
            }
        }
        log::debug!("stdin closed; command reader exiting");
    });
}
