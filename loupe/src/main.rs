mod gpio;
mod headless;
mod sim;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use loupe_core::{
    CalibrationFile, CalibrationWriter, CameraSource, Compositor, ControlWorkers, DisplayState,
    DisplayStateStore, OverlayRenderer, PreviewConfig, PreviewController, RunLimits, SystemClock,
};

use headless::HeadlessCompositor;
use sim::{SimCamera, SimOptions};

#[derive(Parser)]
#[command(
    name = "loupe",
    about = "Camera magnifier preview driven by two rotary encoders",
    long_about = "Runs the preview against a simulated camera and a logging compositor. \
                  Encoder and button events are read from stdin, one per line: \
                  `rotate <mode|zoom> <position>`, `press <control>`, `release <control>`, `quit`."
)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Calibration file, overriding the configured path
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Simulated frame rate
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Number of simulated frame buffers (at least 2)
    #[arg(long, default_value_t = 4)]
    buffers: usize,

    /// Simulated frame width, capped by the compositor
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Simulated frame height, capped by the compositor
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = match &cli.config {
        Some(path) => PreviewConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PreviewConfig::default(),
    };
    if let Some(path) = cli.calibration {
        config.calibration_path = path;
    }

    let file = CalibrationFile::new(&config.calibration_path);
    let calibration = file.load_or_default();
    let writer = CalibrationWriter::spawn(file).context("failed to start calibration writer")?;

    let quit = Arc::new(AtomicBool::new(false));
    let compositor = HeadlessCompositor::new(quit.clone());
    let (max_width, max_height) = compositor.max_image_size();

    let mut camera = SimCamera::new(SimOptions {
        fps: cli.fps,
        buffers: cli.buffers,
        width: cli.width.min(max_width),
        height: cli.height.min(max_height),
    });

    let clock = Arc::new(SystemClock);
    let store = Arc::new(DisplayStateStore::new(
        DisplayState::new(calibration, config.zoom_min),
        camera.controls(),
        Box::new(writer),
        clock.clone(),
    ));

    let (workers, senders) =
        ControlWorkers::spawn(store.clone(), &config).context("failed to start control threads")?;
    gpio::spawn_stdin(senders, quit).context("failed to start stdin reader")?;

    let overlay = OverlayRenderer::new(config.overlay.clone(), config.overlay_duration());
    let mut controller =
        PreviewController::new(store, compositor, camera.done_callback(), overlay, clock)
            .with_workers(workers);

    let limits = RunLimits {
        max_frames: cli.frames,
        max_duration: cli.seconds.map(Duration::from_secs),
    };
    let summary = controller
        .run(&mut camera, limits)
        .context("preview failed")?;

    info!(
        "{} frames, {} dropped, {} camera timeouts, {} overlay passes",
        summary.frames,
        summary.dropped,
        summary.timeouts,
        controller.overlay().draw_count()
    );
    let (autofocus, crop) = camera.controls().current();
    info!("camera left with autofocus {:?}, crop {:?}", autofocus, crop);
    Ok(())
}
