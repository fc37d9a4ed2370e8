use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::errors::{PrivacutError, Result};

/// File name of the quantized RMBG-1.4 export.
pub const MODEL_FILE_NAME: &str = "model_quantized.onnx";

/// Resolves the model file and stages a private copy of it in a cache directory.
///
/// Lookup order: existing cache copy, then the primary models directory, then the
/// bundled read-only asset directory.
#[derive(Debug, Clone)]
pub struct ModelLocator {
    pub models_dir: Option<PathBuf>,
    pub bundled_dir: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub file_name: String,
}

impl ModelLocator {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: None,
            bundled_dir: None,
            cache_dir: cache_dir.into(),
            file_name: MODEL_FILE_NAME.to_string(),
        }
    }

    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = Some(dir.into());
        self
    }

    pub fn with_bundled_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundled_dir = Some(dir.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(&self.file_name)
    }

    fn candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        [self.models_dir.as_ref(), self.bundled_dir.as_ref()]
            .into_iter()
            .flatten()
            .map(|dir| dir.join(&self.file_name))
    }

    /// Path of the cached model, copying it into the cache first when needed.
    pub fn locate(&self) -> Result<PathBuf> {
        let cache_path = self.cache_path();
        if cache_path.is_file() {
            tracing::debug!("Using cached model at {}", cache_path.display());
            return Ok(cache_path);
        }

        let Some(source) = self.candidates().find(|path| path.is_file()) else {
            let mut searched = self.candidates().collect::<Vec<_>>();
            searched.push(cache_path);
            return Err(PrivacutError::ModelMissing { searched });
        };

        tracing::info!(
            "Copying model from {} to {}",
            source.display(),
            cache_path.display()
        );
        fs::create_dir_all(&self.cache_dir).map_err(|e| PrivacutError::FileSystem {
            path: self.cache_dir.clone(),
            operation: "create cache directory".to_string(),
            source: e,
        })?;
        copy_model(&source, &cache_path)?;

        Ok(cache_path)
    }
}

/// Copies into `<name>.part` next to `destination` and renames it into place, so an
/// interrupted copy never looks like a cached model.
fn copy_model(source: &Path, destination: &Path) -> Result<()> {
    let partial = partial_path(destination);
    let copy_failed = |operation: String, e: std::io::Error| {
        let _ = fs::remove_file(&partial);
        PrivacutError::FileSystem {
            path: source.to_path_buf(),
            operation,
            source: e,
        }
    };

    fs::copy(source, &partial)
        .map_err(|e| copy_failed(format!("copy model to {}", partial.display()), e))?;
    fs::rename(&partial, destination)
        .map_err(|e| copy_failed(format!("move model into {}", destination.display()), e))?;
    Ok(())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}
