//! Encoder-decoder transformer predicting SELFIES tokens from image features.

use super::layer::{DecoderLayer, EncoderLayer};
use super::positional::{positional_encoding_1d, positional_encoding_2d};
use super::TransformerConfig;
use crate::decode::SequenceModel;
use crate::error::{DecimerError, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{embedding, linear, Embedding, Linear, Module, VarBuilder};

/// Build the decoder self-attention mask for `tokens` (`[batch, seq_len]`).
///
/// A position is blocked (1.0) when it lies in the future or holds the
/// padding id 0. Returns `[batch, 1, seq_len, seq_len]`.
pub fn decoder_mask(tokens: &Tensor) -> Result<Tensor> {
    let (batch, seq_len) = tokens.dims2()?;
    let device = tokens.device();

    let look_ahead: Vec<f32> = (0..seq_len)
        .flat_map(|i| (0..seq_len).map(move |j| if j > i { 1.0 } else { 0.0 }))
        .collect();
    let look_ahead = Tensor::from_vec(look_ahead, (1, 1, seq_len, seq_len), device)?;

    let padding = tokens
        .eq(0u32)?
        .to_dtype(DType::F32)?
        .reshape((batch, 1, 1, seq_len))?;

    Ok(look_ahead.broadcast_maximum(&padding)?)
}

/// Image side: projects features and runs the encoder stack.
#[derive(Debug, Clone)]
struct Encoder {
    embedding: Linear,
    pos_encoding: Tensor,
    layers: Vec<EncoderLayer>,
}

impl Encoder {
    fn new(config: &TransformerConfig, vb: VarBuilder) -> Result<Self> {
        let embedding = linear(config.feature_dim, config.d_model, vb.pp("embedding"))?;
        let pos_encoding =
            positional_encoding_2d(config.row_size, config.col_size, config.d_model, vb.device())?;
        let layers = (0..config.num_layers)
            .map(|i| EncoderLayer::new(config, vb.pp(format!("enc_layers.{}", i))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            embedding,
            pos_encoding,
            layers,
        })
    }

    fn forward(&self, features: &Tensor) -> Result<Tensor> {
        let (_, grid_len, _) = features.dims3()?;
        let max_len = self.pos_encoding.dim(1)?;
        if grid_len > max_len {
            return Err(DecimerError::ShapeMismatch(format!(
                "feature grid has {} positions, encoder supports {}",
                grid_len, max_len
            )));
        }

        let x = self.embedding.forward(features)?.relu()?;
        let mut x = x.broadcast_add(&self.pos_encoding.narrow(1, 0, grid_len)?)?;
        for layer in &self.layers {
            x = layer.forward(&x)?;
        }
        Ok(x)
    }
}

/// Token side: embeds the partial sequence and runs the decoder stack.
#[derive(Debug, Clone)]
struct Decoder {
    embedding: Embedding,
    pos_encoding: Tensor,
    layers: Vec<DecoderLayer>,
    scale: f64,
}

impl Decoder {
    fn new(
        config: &TransformerConfig,
        vocab_size: usize,
        max_positions: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let embedding = embedding(vocab_size, config.d_model, vb.pp("embedding"))?;
        let pos_encoding = positional_encoding_1d(max_positions, config.d_model, vb.device())?;
        let layers = (0..config.num_layers)
            .map(|i| DecoderLayer::new(config, vb.pp(format!("dec_layers.{}", i))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            embedding,
            pos_encoding,
            layers,
            scale: (config.d_model as f64).sqrt(),
        })
    }

    fn forward(&self, tokens: &Tensor, encoded: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let (_, seq_len) = tokens.dims2()?;
        let max_len = self.pos_encoding.dim(1)?;
        if seq_len > max_len {
            return Err(DecimerError::ShapeMismatch(format!(
                "sequence of {} tokens exceeds {} positions",
                seq_len, max_len
            )));
        }

        let x = (self.embedding.forward(tokens)? * self.scale)?;
        let mut x = x.broadcast_add(&self.pos_encoding.narrow(1, 0, seq_len)?)?;
        for layer in &self.layers {
            x = layer.forward(&x, encoded, mask)?;
        }
        Ok(x)
    }
}

/// A transformer model for SELFIES generation.
#[derive(Debug, Clone)]
pub struct Transformer {
    config: TransformerConfig,
    encoder: Encoder,
    decoder: Decoder,
    final_layer: Linear,
    vocab_size: usize,
    device: Device,
}

impl Transformer {
    /// Load a transformer from `vb`.
    ///
    /// # Arguments
    ///
    /// * `config` - Layer hyperparameters
    /// * `vocab_size` - Width of the output distribution
    /// * `max_positions` - Longest token sequence the decoder accepts
    /// * `vb` - Weights rooted at the transformer prefix
    pub fn new(
        config: &TransformerConfig,
        vocab_size: usize,
        max_positions: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        if config.num_heads == 0 || config.d_model % config.num_heads != 0 {
            return Err(DecimerError::Config(format!(
                "d_model {} is not divisible by {} heads",
                config.d_model, config.num_heads
            )));
        }
        let device = vb.device().clone();
        let encoder = Encoder::new(config, vb.pp("encoder"))?;
        let decoder = Decoder::new(config, vocab_size, max_positions, vb.pp("decoder"))?;
        let final_layer = linear(config.d_model, vocab_size, vb.pp("final_layer"))?;

        Ok(Self {
            config: config.clone(),
            encoder,
            decoder,
            final_layer,
            vocab_size,
            device,
        })
    }

    /// Get model configuration.
    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Get device.
    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl SequenceModel for Transformer {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn encode(&self, features: &Tensor) -> Result<Tensor> {
        self.encoder.forward(features)
    }

    fn forward(&self, encoded: &Tensor, tokens: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let decoded = self.decoder.forward(tokens, encoded, mask)?;
        Ok(self.final_layer.forward(&decoded)?)
    }
}
