use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use refmatch::core::{parse_level, CameraRays};
use refmatch::detect::{load_references, load_rgba};
use refmatch::io::{CatalogReport, EngineConfig, FrameReport, RecognitionReport, ScanReport};
use refmatch::{Engine, Frame, TargetLibrary};
#[cfg(feature = "tracing")]
use tracing_log::LogTracer;
#[cfg(feature = "tracing")]
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log verbosity: off, error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the configured references and print the catalog as JSON
    Enroll {
        /// Engine configuration JSON
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Scan frame images and report what was recognized
    Scan {
        /// Engine configuration JSON
        #[arg(short, long)]
        config: PathBuf,

        /// Write the JSON report here instead of stdout; overrides the
        /// config's `output_path`
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frame image files
        #[arg(required = true)]
        frames: Vec<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let level = parse_level(&args.log_level)
        .ok_or_else(|| format!("unknown log level '{}'", args.log_level))?;
    init_logging(level)?;

    match args.command {
        Commands::Enroll { config } => {
            let (engine, _) = build_engine(&config)?;
            let report = CatalogReport::from_library(engine.library());
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Scan {
            config,
            output,
            frames,
        } => {
            let (mut engine, cfg) = build_engine(&config)?;
            let camera = cfg.camera;
            let mut reports = Vec::with_capacity(frames.len());
            for path in &frames {
                let image = load_rgba(path)?;
                let mut frame = Frame::new(image.view());
                if let Some(cam) = camera.as_ref() {
                    frame = frame.with_camera(cam as &dyn CameraRays);
                }
                let outcome = engine.scan(&frame);
                if let Some(hit) = outcome.recognized() {
                    info!("{}: {hit}", path.display());
                }
                reports.push(FrameReport {
                    path: path.display().to_string(),
                    width: image.width,
                    height: image.height,
                    recognition: outcome.recognized().map(RecognitionReport::from),
                });
            }
            let report = ScanReport {
                frames: reports,
                stats: engine.stats(),
            };
            match output.or_else(|| cfg.output_path.clone()) {
                Some(out) => {
                    report.write_json(&out)?;
                    println!("wrote scan report to {}", out.display());
                }
                None => println!("{}", report.to_json()?),
            }
        }
    }

    Ok(())
}

fn build_engine(path: &Path) -> Result<(Engine, EngineConfig), Box<dyn std::error::Error>> {
    let cfg = EngineConfig::load_json(path)?;
    let references = load_references(&cfg.references)?;
    let engine = Engine::new(cfg.params.clone(), &references)?;
    summarize(engine.library());
    Ok((engine, cfg))
}

fn summarize(library: &TargetLibrary) {
    let keypoints: usize = library.targets().iter().map(|t| t.total_count()).sum();
    info!(
        "catalog: {} targets, {} keypoints total",
        library.len(),
        keypoints
    );
}

fn init_logging(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "tracing")]
    {
        let _ = LogTracer::init_with_filter(level);
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
        Ok(())
    }
    #[cfg(not(feature = "tracing"))]
    {
        refmatch::core::init_with_level(level)?;
        Ok(())
    }
}
