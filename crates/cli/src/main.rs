use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use facefeed_core::capture::domain::uploaded_file::{UploadPolicy, UploadedFile};
use facefeed_core::capture::infrastructure::ffmpeg_camera::FfmpegCamera;
use facefeed_core::config::app_config::{AppConfig, Engine};
use facefeed_core::detection::infrastructure::detector_factory::{build_detector, DownloadProgress};
use facefeed_core::overlay::domain::overlay_renderer::{OverlayRenderer, OverlayStyle};
use facefeed_core::overlay::infrastructure::raster_surface::RasterSurface;
use facefeed_core::pipeline::detection_worker::DetectionWorker;
use facefeed_core::pipeline::live_session::{run_job, LiveSession};
use facefeed_core::pipeline::notifier::LogNotifier;
use facefeed_core::pipeline::orchestrator::{Completion, Orchestrator};
use facefeed_core::session::result_store::{BatchStatus, DetectionBatchState};
use facefeed_core::shared::face::DetectedFace;

/// Slack on top of the engine's own timeout before giving up on a job.
const JOB_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);
const LOCAL_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// Face attribute estimation for images and live camera frames.
#[derive(Parser)]
#[command(name = "facefeed")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Detection engine: remote or local.
    #[arg(long, global = true)]
    engine: Option<Engine>,

    /// Config file (defaults to the per-user config).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Face localization confidence threshold for the local engine (0.0-1.0).
    #[arg(long, global = true)]
    confidence: Option<f32>,

    /// TrueType font for overlay labels, replacing the bundled DejaVu Sans.
    #[arg(long, global = true)]
    font: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze an image file.
    Analyze {
        image: PathBuf,

        /// Write the annotated image here (PNG).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Render the overlay at this size instead of the image size, e.g. 640x480.
        #[arg(long)]
        display_size: Option<String>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Capture one camera frame and analyze it.
    Capture {
        /// Camera device (defaults to the configured device).
        #[arg(long)]
        device: Option<String>,

        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Poll the camera until Ctrl-C or the tick limit.
    Watch {
        #[arg(long)]
        device: Option<String>,

        /// Polling interval in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many ticks.
        #[arg(long)]
        max_ticks: Option<usize>,

        /// Rewritten after every state change.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;
    let config = load_config(&cli)?;
    let renderer = OverlayRenderer::new(OverlayStyle::from_config(&config.overlay)?);
    let font = cli.font.clone().or_else(|| config.overlay.font_path.clone());

    let detector = build_detector(&config, Some(download_progress()))?;
    let worker = DetectionWorker::spawn(detector);
    let mut orchestrator = Orchestrator::new(
        UploadPolicy::new(config.max_upload_bytes),
        Box::new(LogNotifier),
    );
    let overlay = Overlay {
        renderer,
        font,
        display_size: None,
    };

    match cli.command {
        Command::Analyze {
            image,
            output,
            display_size,
            json,
        } => {
            let overlay = Overlay {
                display_size: display_size.as_deref().map(parse_size).transpose()?,
                ..overlay
            };
            let file = UploadedFile::from_path(&image)?;
            let job = orchestrator.submit_upload(file)?;
            let completion = run_job(&mut orchestrator, &worker, job, job_timeout(&config))?;
            finish(&orchestrator, completion, json, &overlay, output.as_deref())?;
        }
        Command::Capture { device, output } => {
            let camera = open_camera(&config, device);
            orchestrator.start_stream(Box::new(camera))?;
            let job = orchestrator.capture_now()?;
            let completion = run_job(&mut orchestrator, &worker, job, job_timeout(&config))?;
            let finished = finish(&orchestrator, completion, false, &overlay, output.as_deref());
            orchestrator.stop_stream();
            finished?;
        }
        Command::Watch {
            device,
            interval_ms,
            max_ticks,
            output,
        } => {
            let stop = Arc::new(AtomicBool::new(false));
            let handler_stop = stop.clone();
            ctrlc::set_handler(move || handler_stop.store(true, Ordering::Relaxed))?;

            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.poll_interval());
            let camera = open_camera(&config, device);
            orchestrator.start_stream(Box::new(camera))?;
            log::info!("Watching every {interval:?}; press Ctrl-C to stop");

            let stats = LiveSession::new(&mut orchestrator, &worker, interval, stop)
                .with_max_ticks(max_ticks)
                .run(|orch| {
                    match status_report(orch.state()) {
                        Some(Ok(text)) => println!("{text}"),
                        Some(Err(message)) => eprintln!("Analysis failed: {message}"),
                        None => {}
                    }
                    if let Some(output) = &output {
                        if let Err(e) = overlay.write(orch, output) {
                            log::warn!("Failed to write {}: {e}", output.display());
                        }
                    }
                })?;
            eprintln!(
                "{} poll(s), {} tick(s) skipped while busy",
                stats.polls_submitted, stats.polls_skipped
            );
        }
    }

    Ok(())
}

struct Overlay {
    renderer: OverlayRenderer,
    font: Option<PathBuf>,
    display_size: Option<(u32, u32)>,
}

impl Overlay {
    fn write(&self, orchestrator: &Orchestrator, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let state = orchestrator.state();
        let (width, height) = match (self.display_size, state.source_image()) {
            (Some(size), _) => size,
            (None, Some(image)) => image.dimensions(),
            (None, None) => return Err("nothing to render".into()),
        };
        let mut surface = RasterSurface::new(width, height)?;
        if let Some(font) = &self.font {
            surface = surface.with_font_file(font)?;
        }
        let summary = self
            .renderer
            .render(state, &mut surface, orchestrator.overlay_mode())?;
        surface.save(output)?;
        log::info!(
            "Wrote {} ({} box(es))",
            output.display(),
            summary.boxes_drawn
        );
        Ok(())
    }
}

/// Writes the overlay (when requested) and prints the outcome of an
/// on-demand job. A failed job still writes its preserved image.
fn finish(
    orchestrator: &Orchestrator,
    completion: Completion,
    json: bool,
    overlay: &Overlay,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if matches!(completion, Completion::Discarded) {
        return Err("result was superseded by a newer request".into());
    }
    if let Some(output) = output {
        overlay.write(orchestrator, output)?;
    }
    match completion {
        Completion::Applied { .. } => {
            let faces = orchestrator.state().faces();
            if json {
                println!("{}", serde_json::to_string_pretty(faces)?);
            } else {
                println!("{}", format_faces(faces));
            }
            Ok(())
        }
        Completion::Failed(e) => Err(e.into()),
        Completion::Discarded => Ok(()),
    }
}

/// What a settled batch amounts to: the face listing, or the failure
/// message. `None` while nothing has settled.
fn status_report(state: &DetectionBatchState) -> Option<Result<String, String>> {
    match state.status() {
        BatchStatus::Ready => Some(Ok(format_faces(state.faces()))),
        BatchStatus::Error(message) => Some(Err(message.clone())),
        BatchStatus::Idle | BatchStatus::Processing => None,
    }
}

fn format_faces(faces: &[DetectedFace]) -> String {
    if faces.is_empty() {
        return "No faces were detected in the image.".to_string();
    }
    faces
        .iter()
        .enumerate()
        .map(|(i, face)| {
            let b = &face.bounding_box;
            format!(
                "Face {}: {}  [x={:.0} y={:.0} w={:.0} h={:.0}]",
                i + 1,
                face.label(),
                b.x,
                b.y,
                b.width,
                b.height
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };
    if let Some(engine) = cli.engine {
        config.engine = engine;
    }
    if let Some(confidence) = cli.confidence {
        config.local.confidence = confidence;
    }
    if let Command::Watch {
        interval_ms: Some(ms),
        ..
    } = &cli.command
    {
        config.poll_interval_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(c) = cli.confidence {
        if !(0.0..=1.0).contains(&c) {
            return Err(format!("Confidence must be between 0.0 and 1.0, got {c}").into());
        }
    }
    if let Some(font) = &cli.font {
        if !font.exists() {
            return Err(format!("Font file not found: {}", font.display()).into());
        }
    }
    match &cli.command {
        Command::Analyze {
            image,
            display_size,
            ..
        } => {
            if !image.exists() {
                return Err(format!("Input file not found: {}", image.display()).into());
            }
            if let Some(size) = display_size {
                parse_size(size)?;
            }
        }
        Command::Watch {
            interval_ms: Some(0),
            ..
        } => return Err("Interval must be greater than 0".into()),
        Command::Watch {
            max_ticks: Some(0), ..
        } => return Err("Max ticks must be greater than 0".into()),
        _ => {}
    }
    Ok(())
}

fn open_camera(config: &AppConfig, device: Option<String>) -> FfmpegCamera {
    FfmpegCamera::new(
        device.unwrap_or_else(|| config.camera.device.clone()),
        config.camera.input_format.clone(),
    )
}

fn job_timeout(config: &AppConfig) -> Duration {
    match config.engine {
        Engine::Remote => config.remote.timeout() + JOB_TIMEOUT_MARGIN,
        Engine::Local => LOCAL_JOB_TIMEOUT,
    }
}

fn parse_size(s: &str) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let invalid = || format!("Display size must look like 640x480, got '{s}'");
    let (w, h) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
    let w: u32 = w.trim().parse().map_err(|_| invalid())?;
    let h: u32 = h.trim().parse().map_err(|_| invalid())?;
    if w == 0 || h == 0 {
        return Err(invalid().into());
    }
    Ok((w, h))
}

fn download_progress() -> DownloadProgress {
    Arc::new(|name: &str, downloaded: u64, total: u64| {
        if total > 0 {
            let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
            eprint!("\rDownloading {name}... {pct}%");
            if downloaded >= total {
                eprintln!();
            }
        } else {
            eprint!("\rDownloading {name}... {downloaded} bytes");
        }
    })
}
