//! Error types for DECIMER Core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for DECIMER operations.
pub type Result<T> = std::result::Result<T, DecimerError>;

/// Errors that can occur while loading assets or translating an image.
#[derive(Error, Debug)]
pub enum DecimerError {
    /// Pretrained weights could not be downloaded or extracted.
    #[error("assets unavailable: {0}")]
    AssetUnavailable(String),

    /// Input image could not be read or decoded.
    #[error("image unreadable: {path}: {reason}")]
    ImageUnreadable {
        /// Path of the offending image.
        path: PathBuf,
        /// Underlying decoder message.
        reason: String,
    },

    /// The model produced a token id with no entry in the vocabulary.
    #[error("unknown token id: {0}")]
    UnknownToken(u32),

    /// Grammar string could not be converted to SMILES.
    #[error("grammar error: {0}")]
    Grammar(String),

    /// Model construction or weight lookup error.
    #[error("model error: {0}")]
    Model(String),

    /// Shape mismatch error.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}
