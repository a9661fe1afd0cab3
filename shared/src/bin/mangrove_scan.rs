use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use mangrove_scan::{
    DetectionConfig, Detector, HttpTagSource, LabelSet, OrtEngine, ScanService, TagGate,
};

/// Identify plants in a photo and print the decision as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// ONNX model file
    #[arg(long, value_name = "FILE")]
    pub model: PathBuf,

    /// Label file (one per line, or a JSON array if it ends in .json)
    #[arg(long, value_name = "FILE")]
    pub labels: Option<PathBuf>,

    /// JSON config overriding the default thresholds
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Tagging service endpoint for the plant pre-filter
    #[arg(long, value_name = "URL")]
    pub tag_url: Option<String>,

    /// Bearer token for the tagging service
    #[arg(long, env = "MANGROVE_TAG_API_KEY", hide_env_values = true)]
    pub tag_api_key: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,

    /// Photo to scan
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,
}

fn load_config(path: Option<&PathBuf>) -> Result<DetectionConfig> {
    let Some(path) = path else {
        return Ok(DetectionConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    DetectionConfig::from_json_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(args.config.as_ref())?;
    let labels = args
        .labels
        .as_ref()
        .map_or_else(LabelSet::fallback, |path| LabelSet::load(path));

    info!(model = %args.model.display(), "loading model");
    let engine = OrtEngine::from_file(&args.model, config.input_size, config.layout())
        .context("failed to load model")?;

    let mut service = ScanService::new(Detector::new(config, labels)?);
    if let Some(url) = &args.tag_url {
        let mut source = HttpTagSource::new(url)?;
        if let Some(key) = &args.tag_api_key {
            source = source.with_api_key(key);
        }
        service = service.with_tag_source(Arc::new(source), TagGate::default());
    }
    service.load(engine).await?;

    let image = std::fs::read(&args.image)
        .with_context(|| format!("failed to read image {}", args.image.display()))?;
    let report = service.scan(image).await?;
    service.release().await?;

    if let Some(warning) = report.decision.warning() {
        info!("{warning}");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
