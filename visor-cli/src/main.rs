// Visor Command Line Interface
// Headless host for the detection client: images, samples, replays and preferences

mod replay;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use visor_core::{CaptureMode, DetectionResult, MediaFile, MediaKind};
use visor_eye::store::{KeyValueStore, PREFERRED_MODE_KEY, WEBCAM_ALLOWED_KEY};
use visor_eye::{
    CaptureModeController, CaptureRequest, FileStore, HostServices, HttpDetectionClient,
    LogNotifier, MonotonicClock, NoCamera, RasterCanvas, VisorConfig,
};

#[derive(Parser)]
#[command(name = "visor")]
#[command(about = "Visor - helmet detection client for images, recorded video and cameras", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Detection service base URL (overrides the config file)
    #[arg(long, env = "VISOR_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single image and write the overlay
    Analyze {
        /// Image file (.jpg, .jpeg or .png)
        image: PathBuf,

        /// Output file; defaults to <name>_detected.jpg next to the input
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Print the detections as JSON
        #[arg(long)]
        json: bool,
    },

    /// List sample media offered by the service
    Samples,

    /// Download a sample file
    Sample {
        /// Sample name as listed by `visor samples`
        name: String,

        /// Output file; defaults to the sample name
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Replay a directory of frames as a recorded video
    Replay {
        /// Directory of .jpg/.png frames, played in file name order
        dir: PathBuf,

        /// Frame rate of the recording
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Ask the service for annotated frames
        #[arg(long)]
        annotated: bool,

        /// Directory for overlay images; defaults to visor-replay-<timestamp>
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Do not write overlay images
        #[arg(long)]
        no_output: bool,
    },

    /// Show or change the persisted capture mode
    Mode {
        /// New preferred mode (image, video or webcam)
        #[arg(long)]
        set: Option<CaptureMode>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config = load_config(cli.config.as_deref(), cli.endpoint.as_deref())?;
    debug!("Using endpoint {}", config.endpoint);

    match cli.command {
        Commands::Analyze { image, output, json } => {
            analyze_image(config, &image, output, json).await?;
        }
        Commands::Samples => {
            list_samples(&config).await?;
        }
        Commands::Sample { name, output } => {
            fetch_sample(&config, &name, output).await?;
        }
        Commands::Replay {
            dir,
            fps,
            annotated,
            output,
            no_output,
        } => {
            let output = if no_output {
                None
            } else {
                Some(output.unwrap_or_else(default_replay_dir))
            };
            replay_frames(config, &dir, fps, annotated, output).await?;
        }
        Commands::Mode { set } => {
            show_mode(&config, set)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&Path>, endpoint: Option<&str>) -> anyhow::Result<VisorConfig> {
    let mut config = match path {
        Some(path) => VisorConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => VisorConfig::default(),
    };
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint.to_string();
    }
    config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

fn default_output_for(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    image.with_file_name(format!("{}_detected.jpg", stem))
}

fn default_replay_dir() -> PathBuf {
    PathBuf::from(format!(
        "visor-replay-{}",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ))
}

fn print_detections(result: &DetectionResult) {
    let stats = &result.stats;
    if stats.total == 0 {
        println!("✅ No people detected");
        return;
    }
    if stats.without_helmet > 0 {
        println!(
            "⚠️  {} detected, {} without helmet",
            stats.total, stats.without_helmet
        );
    } else {
        println!("✅ {} detected, all wearing helmets", stats.total);
    }
    for detection in &result.detections {
        let b = &detection.bbox;
        println!(
            "   {:<16} {:>3}%  [{:.0}, {:.0}, {:.0}, {:.0}]",
            detection.label,
            detection.confidence_percent(),
            b.x1,
            b.y1,
            b.x2,
            b.y2
        );
    }
}

/// Upload one image through the image mode of the controller
async fn analyze_image(
    config: VisorConfig,
    path: &Path,
    output: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    let file = MediaFile::from_name(name, bytes);
    if file.kind() != MediaKind::Image {
        bail!("Please select an image file (.jpg, .jpeg or .png)");
    }

    let client = Arc::new(HttpDetectionClient::new(&config)?);
    let host = HostServices {
        devices: Arc::new(NoCamera),
        video_loader: Arc::new(NoVideo),
        store: Arc::new(FileStore::new(config.state_path.clone())),
        notifier: Arc::new(LogNotifier),
        clock: Arc::new(MonotonicClock::new()),
    };
    let controller =
        CaptureModeController::new(config, client, host, Box::new(RasterCanvas::default()))?;
    controller.activate(CaptureRequest::UploadImage).await?;

    info!("Analyzing {}", path.display());
    let result = match controller.analyze_image(&file).await {
        Ok(result) => result,
        Err(e) => {
            println!("❌ Detection failed: {}", e);
            return Err(e.into());
        }
    };

    if json {
        let report = json!({
            "file": file.name,
            "stats": result.stats,
            "detections": result.detections,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_detections(&result);
    }

    let output = output.unwrap_or_else(|| default_output_for(path));
    let jpeg = controller.target().with_canvas(|canvas| canvas.encode_jpeg(90))?;
    image::load_from_memory(&jpeg)?
        .save(&output)
        .with_context(|| format!("Cannot write {}", output.display()))?;
    println!("💾 Overlay written to {}", output.display());
    Ok(())
}

/// Video loading is not available for single images
struct NoVideo;

impl visor_eye::VideoLoader for NoVideo {
    fn load(
        &self,
        _file: &MediaFile,
    ) -> Result<Arc<dyn visor_eye::VideoSurface>, visor_eye::VisionError> {
        Err(visor_eye::VisionError::InvalidState(
            "Video playback is only available through `visor replay`".to_string(),
        ))
    }
}

async fn list_samples(config: &VisorConfig) -> anyhow::Result<()> {
    let client = HttpDetectionClient::new(config)?;
    let listing = match client.list_samples().await {
        Ok(listing) => listing,
        Err(e) => {
            println!("❌ Cannot reach {}: {}", client.base_url(), e);
            return Err(e.into());
        }
    };

    if listing.is_empty() {
        println!("No samples available");
        return Ok(());
    }
    println!("🖼️  Images ({}):", listing.images.len());
    for name in &listing.images {
        println!("   {}", name);
    }
    println!("🎞️  Videos ({}):", listing.videos.len());
    for name in &listing.videos {
        println!("   {}", name);
    }
    Ok(())
}

async fn fetch_sample(
    config: &VisorConfig,
    name: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let client = HttpDetectionClient::new(config)?;
    let file = client.fetch_sample(name).await?;
    let output = output.unwrap_or_else(|| PathBuf::from(&file.name));
    std::fs::write(&output, &file.bytes)
        .with_context(|| format!("Cannot write {}", output.display()))?;
    println!(
        "✅ Saved {} ({}, {} bytes) to {}",
        file.name,
        file.mime,
        file.bytes.len(),
        output.display()
    );
    Ok(())
}

async fn replay_frames(
    config: VisorConfig,
    dir: &Path,
    fps: u32,
    annotated: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let client = Arc::new(HttpDetectionClient::new(&config)?);
    let options = replay::ReplayOptions {
        fps,
        annotated,
        output: output.clone(),
    };
    let summary = replay::run(config, client, dir, options).await?;

    println!("✅ Replayed {} frames", summary.frames);
    println!("\n📊 Summary:");
    println!("   Requests:        {}", summary.requests);
    println!("   Failed:          {}", summary.failures);
    println!("   People detected: {}", summary.detections);
    println!("   Without helmet:  {}", summary.without_helmet);
    if let Some(output) = output {
        println!(
            "💾 {} overlays written to {}",
            summary.overlays_written,
            output.display()
        );
    }
    Ok(())
}

fn show_mode(config: &VisorConfig, set: Option<CaptureMode>) -> anyhow::Result<()> {
    let store = FileStore::new(config.state_path.clone());
    if let Some(mode) = set {
        store.set(PREFERRED_MODE_KEY, mode.as_str())?;
        println!("✅ Preferred mode set to {}", mode);
    }

    report_mode(&store)?;
    println!("   Stored in: {}", store.path().display());
    Ok(())
}

fn report_mode(store: &dyn KeyValueStore) -> anyhow::Result<()> {
    match store.get(PREFERRED_MODE_KEY)? {
        Some(mode) => println!("Preferred mode: {}", mode),
        None => println!("Preferred mode: (none)"),
    }
    let webcam = match store.get(WEBCAM_ALLOWED_KEY)?.as_deref() {
        Some("true") => "allowed",
        Some("false") => "denied",
        _ => "unknown",
    };
    println!("Webcam access:  {}", webcam);
    Ok(())
}
