//! Model artifact resolution.
//!
//! A model install is a directory containing a weight file and the vocabulary file that
//! ships alongside it. We prefer the full-precision weights (friendlier to accelerated
//! providers) and fall back to the quantized variant when that's all the user installed.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable overriding the model directory.
pub const MODELS_DIR_ENV: &str = "SOTTO_MODELS_DIR";

/// Full-precision weight file name (preferred).
pub const WEIGHTS_FILE: &str = "ggml-model.bin";

/// Quantized weight file name (fallback).
pub const WEIGHTS_FILE_QUANTIZED: &str = "ggml-model-q8_0.bin";

/// Vocabulary file name. Ships alongside the weights; its absence indicates a broken
/// model install, so we check it before attempting any load.
pub const TOKENS_FILE: &str = "tokens.txt";

/// Resolved on-disk locations of the model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifacts {
    pub weights: PathBuf,
    pub tokens: PathBuf,
    /// True when only the quantized weight variant was available.
    pub quantized: bool,
}

impl ModelArtifacts {
    /// Resolve model artifacts inside `models_dir`.
    ///
    /// Fails with [`Error::Config`] when the weights or the vocabulary file are absent;
    /// callers report this and leave the model unloaded.
    pub fn resolve(models_dir: &Path) -> Result<Self> {
        let full = models_dir.join(WEIGHTS_FILE);
        let quantized = models_dir.join(WEIGHTS_FILE_QUANTIZED);

        let (weights, is_quantized) = if full.is_file() {
            (full, false)
        } else if quantized.is_file() {
            (quantized, true)
        } else {
            return Err(Error::Config(format!(
                "model weights not found in '{}' (expected '{}' or '{}')",
                models_dir.display(),
                WEIGHTS_FILE,
                WEIGHTS_FILE_QUANTIZED,
            )));
        };

        let tokens = models_dir.join(TOKENS_FILE);
        if !tokens.is_file() {
            return Err(Error::Config(format!(
                "vocabulary file not found: '{}'",
                tokens.display()
            )));
        }

        Ok(Self {
            weights,
            tokens,
            quantized: is_quantized,
        })
    }
}

/// The model directory: `SOTTO_MODELS_DIR` when set, otherwise a per-user data dir.
///
/// Falls back to `./models` when the platform has no conventional data dir (some
/// containerized environments).
pub fn default_models_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(MODELS_DIR_ENV) {
        return PathBuf::from(dir);
    }

    dirs::data_dir()
        .map(|d| d.join("sotto").join("models"))
        .unwrap_or_else(|| PathBuf::from("./models"))
}
