//! classify_demo - end-to-end synthetic run of the live classifier

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use live_classifier::{
    CaptureConfig, FrameSource, InputSpec, LabelDisplay, ModelAsset, Orientation, Pipeline,
    PixelFormat, ResizePolicy,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration in seconds to run the synthetic camera.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Frames per second for the synthetic camera.
    #[arg(long, default_value_t = 15)]
    fps: u32,
    /// Solid camera color as r,g,b (defaults to a moving gradient).
    #[arg(long)]
    color: Option<String>,
    /// Resize policy: stretch, aspect-fill or aspect-fit.
    #[arg(long, default_value = "stretch")]
    policy: ResizePolicy,
    /// Model input side length.
    #[arg(long, default_value_t = 224)]
    size: u32,
    /// Camera frame width.
    #[arg(long, default_value_t = 640)]
    width: u32,
    /// Camera frame height.
    #[arg(long, default_value_t = 480)]
    height: u32,
    /// Sensor rotation: up, 90, 180 or 270.
    #[arg(long, default_value = "up")]
    orientation: Orientation,
    /// Model location (stub://dominant-color, stub://fixed/<label>, or an ONNX path).
    #[arg(long, default_value = "stub://dominant-color")]
    model: String,
    /// Labels file for ONNX models, one label per line.
    #[arg(long)]
    labels: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    let device = match &args.color {
        Some(color) => format!("stub://solid/{}", color),
        None => "stub://demo".to_string(),
    };
    let capture = CaptureConfig {
        device,
        width: args.width,
        height: args.height,
        fps: args.fps,
        pixel_format: PixelFormat::Rgb24,
        orientation: args.orientation,
    };
    let mut model = ModelAsset::new(args.model.clone(), InputSpec::square(args.size));
    model.labels = args.labels.clone();

    let source = FrameSource::from_config(&capture)?;
    let mut pipeline = Pipeline::new(source, model).with_resize_policy(args.policy);
    pipeline.start()?;

    let mut display = LabelDisplay::new(pipeline.subscribe());
    let mut label_changes = 0u64;
    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while Instant::now() < deadline {
        if display.refresh_timeout(Duration::from_millis(100)) {
            label_changes += 1;
            log::info!("label: {}", display.text());
        }
    }
    pipeline.stop();

    let stats = pipeline.stats();
    println!("classify_demo summary:");
    println!("  camera: {} ({}x{} @ {} fps)", capture.device, args.width, args.height, args.fps);
    println!("  frames captured: {}", stats.frames_captured);
    println!("  frames dropped (consumer busy): {}", stats.frames_dropped);
    println!("  buffers built: {}", stats.buffers_built);
    println!("  results published: {}", stats.results_published);
    println!("  label changes: {}", label_changes);
    println!("  final label: {}", display.text());
    if let Some(result) = display.current() {
        for line in result.diagnostic_lines(3) {
            println!("    {}", line);
        }
    }
    Ok(())
}
