//! Model configuration.

use crate::vision::EfficientNetConfig;
use serde::{Deserialize, Serialize};

/// Hyperparameters of the encoder-decoder transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    /// Number of encoder and decoder layers.
    pub num_layers: usize,
    /// Model (hidden) dimension.
    pub d_model: usize,
    /// Number of attention heads.
    pub num_heads: usize,
    /// Feed-forward inner dimension.
    pub dff: usize,
    /// Rows of the image feature grid.
    pub row_size: usize,
    /// Columns of the image feature grid.
    pub col_size: usize,
    /// Channel dimension of the incoming image features.
    pub feature_dim: usize,
    /// Layer norm epsilon.
    pub layer_norm_eps: f64,
}

impl TransformerConfig {
    /// Dimension of each attention head.
    pub fn head_dim(&self) -> usize {
        self.d_model / self.num_heads
    }

    /// Number of positions in the image feature grid.
    pub fn grid_len(&self) -> usize {
        self.row_size * self.col_size
    }
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            num_layers: 4,
            d_model: 512,
            num_heads: 8,
            dff: 2048,
            row_size: 10,
            col_size: 10,
            feature_dim: 1536,
            layer_norm_eps: 1e-6,
        }
    }
}

/// Configuration stored next to a checkpoint as `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Maximum number of tokens the decoder may emit.
    pub max_length: usize,
    /// Edge length of the square image fed to the feature extractor.
    pub target_size: u32,
    /// Explicit decoder output width, overriding the per-model default.
    pub target_vocab_size: Option<usize>,
    /// Transformer hyperparameters.
    pub transformer: TransformerConfig,
    /// Feature extractor hyperparameters.
    pub efficientnet: EfficientNetConfig,
}

impl ModelConfig {
    /// Load from JSON file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_length: 0,
            target_size: 299,
            target_vocab_size: None,
            transformer: TransformerConfig::default(),
            efficientnet: EfficientNetConfig::b3(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config: ModelConfig = serde_json::from_str(r#"{"max_length": 74}"#).unwrap();
        assert_eq!(config.max_length, 74);
        assert_eq!(config.target_size, 299);
        assert_eq!(config.transformer, TransformerConfig::default());
        assert!(config.target_vocab_size.is_none());
    }

    #[test]
    fn nested_override() {
        let config: ModelConfig = serde_json::from_str(
            r#"{"max_length": 10, "transformer": {"num_layers": 2, "d_model": 64}}"#,
        )
        .unwrap();
        assert_eq!(config.transformer.num_layers, 2);
        assert_eq!(config.transformer.d_model, 64);
        assert_eq!(config.transformer.num_heads, 8);
        assert_eq!(config.transformer.head_dim(), 8);
    }

    #[test]
    fn grid_len() {
        assert_eq!(TransformerConfig::default().grid_len(), 100);
    }
}
