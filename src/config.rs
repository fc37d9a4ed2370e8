use clap::Parser;
use image::ImageFormat;
use std::path::PathBuf;

use crate::{
    asset::{ModelLocator, MODEL_FILE_NAME},
    errors::{PrivacutError, Result},
    imageops_ai::Rotation,
    model::EngineOptions,
};

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Image file or directory of images to process
    pub input: PathBuf,

    #[arg(default_value = "output")]
    pub output_dir: PathBuf,

    /// Model file to load directly, bypassing the models/bundled/cache lookup
    #[arg(short, long)]
    pub model_path: Option<PathBuf>,

    /// Primary directory searched for the model file
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Read-only fallback directory searched after the models directory
    #[arg(long)]
    pub bundled_dir: Option<PathBuf>,

    /// Private directory the model is copied into before loading
    #[arg(long, default_value = ".cache/privacut")]
    pub cache_dir: PathBuf,

    #[arg(long, default_value = MODEL_FILE_NAME)]
    pub model_name: String,

    #[arg(short, long, default_value = "png", value_parser = check_format)]
    pub format: String,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Intra-op threads for ONNX Runtime (0 = runtime default)
    #[arg(short, long, default_value_t = 0)]
    pub num_threads: usize,

    /// Clockwise rotation applied before segmentation (0, 90, 180 or 270)
    #[arg(short, long, default_value_t = 0, value_parser = check_rotation, allow_hyphen_values = true)]
    pub rotate: i32,

    /// Skip the zero-tensor warm-up run after loading the model
    #[arg(long)]
    pub no_warm_up: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }

    pub fn rotation(&self) -> Result<Rotation> {
        Rotation::from_degrees(self.rotate)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            device_id: self.device_id,
            intra_threads: self.num_threads,
            warm_up: !self.no_warm_up,
        }
    }

    pub fn model_locator(&self) -> ModelLocator {
        let mut locator = ModelLocator::new(&self.cache_dir).with_file_name(&self.model_name);
        if let Some(dir) = &self.models_dir {
            locator = locator.with_models_dir(dir);
        }
        if let Some(dir) = &self.bundled_dir {
            locator = locator.with_bundled_dir(dir);
        }
        locator
    }

    /// Explicit `--model-path`, otherwise the cached copy resolved by [`ModelLocator`].
    pub fn resolve_model_path(&self) -> Result<PathBuf> {
        match &self.model_path {
            Some(path) => Ok(path.clone()),
            None => self.model_locator().locate(),
        }
    }

    pub fn output_format(&self) -> Result<ImageFormat> {
        ImageFormat::from_extension(&self.format).ok_or_else(|| PrivacutError::Configuration {
            message: format!("{} is not a known image format", self.format),
        })
    }
}

/// Formats that keep the alpha channel produced by compositing.
const ALPHA_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Tiff,
    ImageFormat::Avif,
];

fn check_format(s: &str) -> std::result::Result<String, String> {
    let supported: Vec<_> = ALPHA_FORMATS
        .iter()
        .filter(|f| f.writing_enabled())
        .flat_map(|f| f.extensions_str())
        .map(|s| format!("`{}`", s))
        .collect();
    let supported_message = format!("Supported formats: {}", supported.join(", "));

    let format = ImageFormat::from_extension(s)
        .ok_or(format!("{} is not supported. {}", s, supported_message))?;
    if !ALPHA_FORMATS.contains(&format) || !format.writing_enabled() {
        return Err(format!("{} is not supported. {}", s, supported_message));
    }

    Ok(s.to_string())
}

fn check_rotation(s: &str) -> std::result::Result<i32, String> {
    let degrees = s
        .parse::<i32>()
        .map_err(|e| format!("{} is not a number of degrees: {}", s, e))?;
    Rotation::from_degrees(degrees).map_err(|e| e.to_string())?;
    Ok(degrees)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config = Config::try_parse_from(["privacut", "photos"]).unwrap();

        assert_eq!(config.input, PathBuf::from("photos"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.format, "png");
        assert_eq!(config.model_name, MODEL_FILE_NAME);
        assert_eq!(config.rotation().unwrap(), Rotation::None);
        assert!(config.engine_options().warm_up);
    }

    #[test]
    fn test_parse_options() {
        let config = Config::try_parse_from([
            "privacut",
            "in.jpg",
            "out",
            "--models-dir",
            "ml",
            "--rotate",
            "-90",
            "--no-warm-up",
            "--num-threads",
            "2",
        ])
        .unwrap();

        assert_eq!(config.rotation().unwrap(), Rotation::Clockwise270);
        let options = config.engine_options();
        assert!(!options.warm_up);
        assert_eq!(options.intra_threads, 2);
        assert_eq!(config.model_locator().models_dir, Some(PathBuf::from("ml")));
    }

    #[test]
    fn test_rejects_formats_without_alpha() {
        assert!(check_format("png").is_ok());
        assert!(check_format("jpg").is_err());
        assert!(check_format("nonsense").is_err());
        assert!(Config::try_parse_from(["privacut", "in", "--format", "jpeg"]).is_err());
    }

    #[test]
    fn test_rejects_odd_rotation() {
        assert_eq!(check_rotation("180"), Ok(180));
        assert!(check_rotation("45").is_err());
        assert!(check_rotation("left").is_err());
    }

    #[test]
    fn test_explicit_model_path_skips_lookup() {
        let config =
            Config::try_parse_from(["privacut", "in", "--model-path", "/models/rmbg.onnx"])
                .unwrap();
        assert_eq!(
            config.resolve_model_path().unwrap(),
            PathBuf::from("/models/rmbg.onnx")
        );
    }
}
