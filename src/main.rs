use anyhow::{ensure, Context, Result};
use clap::Parser;

use privacut::{BackgroundRemover, Config, ImageProcessor};

fn main() -> Result<()> {
    let config = Config::parse();

    let log_level = if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    ensure!(
        config.input.exists(),
        "Input path does not exist: {}",
        config.input.display()
    );

    let remover =
        BackgroundRemover::from_config(&config).context("Failed to load segmentation model")?;
    let processor = ImageProcessor::new(remover, config);

    let summary = processor
        .process()
        .context("Failed to process images")?;

    println!(
        "{} image(s) written, {} without background removal, {} failed",
        summary.processed, summary.fallbacks, summary.failed
    );
    Ok(())
}
