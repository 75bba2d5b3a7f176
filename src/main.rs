use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use tts_article::config::TtsArticleConfig;
use tts_article::logger::init_logger;
use tts_article::notification::ProgressBarObserver;
use tts_article::tts::SynthesisCache;
use tts_article::TtsArticle;

const DEFAULT_CONFIG: &str = "config.toml";

/// Озвучивание статей клонированными голосами
#[derive(Parser, Debug)]
#[command(name = "tts-article", version, about = "Narrate long-form articles with cloned voices")]
struct Cli {
    /// Path to the TOML config (defaults to ./config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Article file, overrides `input_article`
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory, overrides `output_dir`
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of generation workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Remove cached clips before running
    #[arg(long)]
    clean: bool,

    /// Show a progress bar
    #[arg(long)]
    progress: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> Result<TtsArticleConfig> {
    let mut config = match &cli.config {
        Some(path) => TtsArticleConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).is_file() => TtsArticleConfig::from_file(DEFAULT_CONFIG)
            .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG))?,
        None => {
            log::warn!("No config file given and {} not found, using defaults", DEFAULT_CONFIG);
            TtsArticleConfig::default()
        }
    };

    if let Some(input) = &cli.input {
        config.input_article = input.clone();
    }
    if let Some(output) = &cli.output {
        config.output_dir = output.clone();
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let config = load_config(&cli)?;

    if cli.clean {
        let cache = SynthesisCache::new(config.audio_dir(), true);
        cache
            .clear()
            .with_context(|| format!("Failed to clean {}", config.audio_dir().display()))?;
    }

    let mut article =
        TtsArticle::with_http_engine(config).context("Failed to create synthesis engine")?;
    if cli.progress {
        article.add_observer(Box::new(ProgressBarObserver::default()));
    }

    let output = article.process().await.context("Narration failed")?;

    println!("Audio:    {}", output.final_audio.display());
    println!("Metadata: {}", output.metadata_path.display());
    if let Some(subtitles) = &output.subtitle_path {
        println!("Subtitles: {}", subtitles.display());
    }
    println!(
        "{} segments, {:.2}s ({} synthesized, {} reused)",
        output.segment_count, output.total_duration, output.synthesized, output.reused
    );
    Ok(())
}
