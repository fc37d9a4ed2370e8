use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::{
    config::Config,
    errors::{PrivacutError, Result},
    remover::BackgroundRemover,
    traits::InferenceEngine,
};

/// Counts reported after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Images written to the output directory.
    pub processed: usize,
    /// Images written unmodified because background removal failed.
    pub fallbacks: usize,
    /// Images never started because the run was cancelled.
    pub skipped: usize,
    /// Images that could not be read or written; nothing was saved for them.
    pub failed: usize,
}

enum Outcome {
    Removed,
    Fallback,
    Skipped,
    Failed,
}

/// Walks an input file or directory and writes background-removed copies.
pub struct ImageProcessor<E: InferenceEngine> {
    remover: BackgroundRemover<E>,
    config: Config,
    cancellation_token: CancellationToken,
}

impl<E: InferenceEngine> ImageProcessor<E> {
    pub fn new(remover: BackgroundRemover<E>, config: Config) -> Self {
        Self {
            remover,
            config,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Token that stops the run before the next image is started.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn remover(&self) -> &BackgroundRemover<E> {
        &self.remover
    }

    pub fn process(&self) -> Result<ProcessSummary> {
        let input_path = &self.config.input;
        let output_path = &self.config.output_dir;

        if !input_path.exists() {
            return Err(PrivacutError::FileSystem {
                path: input_path.clone(),
                operation: "check input exists".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "input path does not exist",
                ),
            });
        }

        fs::create_dir_all(output_path).map_err(|e| PrivacutError::FileSystem {
            path: output_path.clone(),
            operation: "create output directory".to_string(),
            source: e,
        })?;

        let image_files = self.collect_image_files(input_path);
        if image_files.is_empty() {
            tracing::warn!("No supported images found in {}", input_path.display());
            return Ok(ProcessSummary::default());
        }
        tracing::info!("Processing {} image(s)", image_files.len());

        let format = self.config.output_format()?;
        let pb = ProgressBar::new(image_files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .map_err(|e| PrivacutError::Configuration {
                    message: e.to_string(),
                })?
                .progress_chars("#>-"),
        );

        let outcomes = image_files
            .par_iter()
            .map(|input_file| {
                let outcome = self
                    .process_single_image(input_file, output_path, format)
                    .unwrap_or_else(|e| {
                        tracing::error!("{}: {e}", input_file.display());
                        Outcome::Failed
                    });
                pb.inc(1);
                outcome
            })
            .collect::<Vec<_>>();

        pb.finish_and_clear();

        let mut summary = ProcessSummary::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Removed => summary.processed += 1,
                Outcome::Fallback => {
                    summary.processed += 1;
                    summary.fallbacks += 1;
                }
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }
        tracing::info!(
            processed = summary.processed,
            fallbacks = summary.fallbacks,
            skipped = summary.skipped,
            failed = summary.failed,
            "Finished"
        );
        Ok(summary)
    }

    fn collect_image_files(&self, input_path: &Path) -> Vec<PathBuf> {
        if input_path.is_file() {
            return if self.is_supported_image_format(input_path) {
                vec![input_path.to_path_buf()]
            } else {
                Vec::new()
            };
        }

        let mut image_files = WalkDir::new(input_path)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|path| path.is_file() && self.is_supported_image_format(path))
            .collect::<Vec<_>>();
        image_files.sort();
        image_files
    }

    pub fn is_supported_image_format(&self, path: &Path) -> bool {
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            matches!(
                extension.to_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "webp" | "bmp" | "gif" | "tiff" | "avif"
            )
        } else {
            false
        }
    }

    fn process_single_image(
        &self,
        input_file: &Path,
        output_dir: &Path,
        format: ImageFormat,
    ) -> Result<Outcome> {
        if self.cancellation_token.is_cancelled() {
            return Ok(Outcome::Skipped);
        }

        let image = image::open(input_file)
            .map_err(|e| PrivacutError::ImageProcessing {
                path: input_file.display().to_string(),
                operation: "decode image".to_string(),
                source: Box::new(e),
            })?
            .into_rgb8();
        let image = self.config.rotation()?.apply(&image);

        let removal = self.remover.remove_background_or_original(&image);
        if let Some(failure) = &removal.failure {
            if failure.is_recoverable_by_fallback() {
                tracing::warn!("{}: saved without background removal ({failure})", input_file.display());
            } else {
                tracing::error!("{}: input rejected, saved unmodified ({failure})", input_file.display());
            }
        }

        let output_file = output_dir
            .join(self.get_relative_path(input_file)?)
            .with_extension(&self.config.format);

        if let Some(parent) = output_file.parent() {
            fs::create_dir_all(parent).map_err(|e| PrivacutError::FileSystem {
                path: parent.to_path_buf(),
                operation: "create output directory".to_string(),
                source: e,
            })?;
        }

        removal
            .image
            .save_with_format(&output_file, format)
            .map_err(|e| PrivacutError::ImageProcessing {
                path: output_file.display().to_string(),
                operation: "save image".to_string(),
                source: Box::new(e),
            })?;

        Ok(if removal.is_fallback() {
            Outcome::Fallback
        } else {
            Outcome::Removed
        })
    }

    /// Path of `input_file` relative to the configured input. A single-file input maps
    /// to its own file name.
    pub fn get_relative_path(&self, input_file: &Path) -> Result<PathBuf> {
        let input = &self.config.input;
        if input.is_file() || input == input_file {
            return input_file
                .file_name()
                .map(PathBuf::from)
                .ok_or_else(|| PrivacutError::invalid_input("input file has no file name"));
        }

        input_file
            .strip_prefix(input)
            .map(|p| p.to_path_buf())
            .map_err(|_| PrivacutError::FileSystem {
                path: input_file.to_path_buf(),
                operation: "relative path".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "input file is not inside the input directory",
                ),
            })
    }
}
