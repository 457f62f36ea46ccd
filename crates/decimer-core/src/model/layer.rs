//! Transformer layer implementation.
//!
//! Post-norm layers as used by the image captioning transformer:
//! - [`EncoderLayer`]: self-attention, residual + LayerNorm, FFN, residual + LayerNorm
//! - [`DecoderLayer`]: masked self-attention, cross-attention over the
//!   encoded image, FFN; each sub-block followed by residual + LayerNorm

use super::TransformerConfig;
use crate::error::Result;
use candle_core::{Tensor, D};
use candle_nn::{layer_norm, linear, LayerNorm, Linear, Module, VarBuilder};

/// Added to attention scores wherever the mask is 1.
const MASK_PENALTY: f64 = -1e9;

/// Multi-head attention with separate query, key and value projections.
#[derive(Debug, Clone)]
pub struct Attention {
    /// Query projection.
    q_proj: Linear,
    /// Key projection.
    k_proj: Linear,
    /// Value projection.
    v_proj: Linear,
    /// Output projection.
    o_proj: Linear,
    /// Number of attention heads.
    num_heads: usize,
    /// Head dimension.
    head_dim: usize,
}

impl Attention {
    /// Load attention weights (`wq`, `wk`, `wv`, `dense`).
    pub fn new(config: &TransformerConfig, vb: VarBuilder) -> Result<Self> {
        let d = config.d_model;
        Ok(Self {
            q_proj: linear(d, d, vb.pp("wq"))?,
            k_proj: linear(d, d, vb.pp("wk"))?,
            v_proj: linear(d, d, vb.pp("wv"))?,
            o_proj: linear(d, d, vb.pp("dense"))?,
            num_heads: config.num_heads,
            head_dim: config.head_dim(),
        })
    }

    /// Reshape `[batch, seq, d_model]` to `[batch, heads, seq, head_dim]`.
    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = x.dims3()?;
        Ok(x
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    /// Attend from `query` over `key`/`value`.
    ///
    /// # Arguments
    ///
    /// * `query` - `[batch, q_len, d_model]`
    /// * `key_value` - `[batch, kv_len, d_model]`
    /// * `mask` - Optional `[.., q_len, kv_len]` mask, 1 marks blocked positions
    pub fn forward(&self, query: &Tensor, key_value: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let (batch, q_len, _) = query.dims3()?;

        let q = self.split_heads(&self.q_proj.forward(query)?)?;
        let k = self.split_heads(&self.k_proj.forward(key_value)?)?;
        let v = self.split_heads(&self.v_proj.forward(key_value)?)?;

        // Q @ K^T / sqrt(d)
        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.transpose(2, 3)?.contiguous()?)? * scale)?;

        let scores = match mask {
            Some(mask) => scores.broadcast_add(&(mask * MASK_PENALTY)?)?,
            None => scores,
        };

        let weights = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let output = weights.matmul(&v)?;

        // [batch, heads, q_len, head_dim] -> [batch, q_len, d_model]
        let output = output
            .transpose(1, 2)?
            .reshape((batch, q_len, self.num_heads * self.head_dim))?;
        Ok(self.o_proj.forward(&output)?)
    }
}

/// Two-layer feed-forward block with ReLU.
#[derive(Debug, Clone)]
pub struct FeedForward {
    up: Linear,
    down: Linear,
}

impl FeedForward {
    /// Load FFN weights (`ffn.0`, `ffn.1`).
    pub fn new(config: &TransformerConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            up: linear(config.d_model, config.dff, vb.pp("0"))?,
            down: linear(config.dff, config.d_model, vb.pp("1"))?,
        })
    }

    /// Forward pass.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let hidden = self.up.forward(x)?.relu()?;
        Ok(self.down.forward(&hidden)?)
    }
}

/// A single encoder layer.
#[derive(Debug, Clone)]
pub struct EncoderLayer {
    attention: Attention,
    ffn: FeedForward,
    norm1: LayerNorm,
    norm2: LayerNorm,
}

impl EncoderLayer {
    /// Load an encoder layer.
    pub fn new(config: &TransformerConfig, vb: VarBuilder) -> Result<Self> {
        let eps = config.layer_norm_eps;
        Ok(Self {
            attention: Attention::new(config, vb.pp("mha"))?,
            ffn: FeedForward::new(config, vb.pp("ffn"))?,
            norm1: layer_norm(config.d_model, eps, vb.pp("layernorm1"))?,
            norm2: layer_norm(config.d_model, eps, vb.pp("layernorm2"))?,
        })
    }

    /// Forward pass over `[batch, grid_len, d_model]`.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let attn = self.attention.forward(x, x, None)?;
        let out1 = self.norm1.forward(&(x + attn)?)?;
        let ffn = self.ffn.forward(&out1)?;
        Ok(self.norm2.forward(&(out1 + ffn)?)?)
    }
}

/// A single decoder layer.
#[derive(Debug, Clone)]
pub struct DecoderLayer {
    self_attention: Attention,
    cross_attention: Attention,
    ffn: FeedForward,
    norm1: LayerNorm,
    norm2: LayerNorm,
    norm3: LayerNorm,
}

impl DecoderLayer {
    /// Load a decoder layer.
    pub fn new(config: &TransformerConfig, vb: VarBuilder) -> Result<Self> {
        let eps = config.layer_norm_eps;
        Ok(Self {
            self_attention: Attention::new(config, vb.pp("mha1"))?,
            cross_attention: Attention::new(config, vb.pp("mha2"))?,
            ffn: FeedForward::new(config, vb.pp("ffn"))?,
            norm1: layer_norm(config.d_model, eps, vb.pp("layernorm1"))?,
            norm2: layer_norm(config.d_model, eps, vb.pp("layernorm2"))?,
            norm3: layer_norm(config.d_model, eps, vb.pp("layernorm3"))?,
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `x` - Embedded tokens `[batch, seq_len, d_model]`
    /// * `encoded` - Encoder output `[batch, grid_len, d_model]`
    /// * `look_ahead_mask` - `[batch, 1, seq_len, seq_len]`
    pub fn forward(&self, x: &Tensor, encoded: &Tensor, look_ahead_mask: &Tensor) -> Result<Tensor> {
        let attn1 = self.self_attention.forward(x, x, Some(look_ahead_mask))?;
        let out1 = self.norm1.forward(&(attn1 + x)?)?;

        let attn2 = self.cross_attention.forward(&out1, encoded, None)?;
        let out2 = self.norm2.forward(&(attn2 + &out1)?)?;

        let ffn = self.ffn.forward(&out2)?;
        Ok(self.norm3.forward(&(ffn + out2)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn small_config() -> TransformerConfig {
        TransformerConfig {
            num_layers: 1,
            d_model: 16,
            num_heads: 4,
            dff: 32,
            row_size: 2,
            col_size: 2,
            feature_dim: 8,
            layer_norm_eps: 1e-6,
        }
    }

    #[test]
    fn attention_preserves_query_shape() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let attention = Attention::new(&small_config(), vb).unwrap();

        let q = Tensor::randn(0f32, 1., (1, 3, 16), &Device::Cpu).unwrap();
        let kv = Tensor::randn(0f32, 1., (1, 5, 16), &Device::Cpu).unwrap();
        let out = attention.forward(&q, &kv, None).unwrap();
        assert_eq!(out.dims(), &[1, 3, 16]);
    }

    #[test]
    fn masked_future_does_not_leak() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let attention = Attention::new(&small_config(), vb).unwrap();

        let x = Tensor::randn(0f32, 1., (1, 3, 16), &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[0f32, 1., 1.], [0., 0., 1.], [0., 0., 0.]], &Device::Cpu)
            .unwrap()
            .reshape((1, 1, 3, 3))
            .unwrap();
        let full = attention.forward(&x, &x, Some(&mask)).unwrap();

        // Changing the last token must not change the first position's output
        let prefix = x.narrow(1, 0, 2).unwrap();
        let other = Tensor::randn(0f32, 1., (1, 1, 16), &Device::Cpu).unwrap();
        let changed = Tensor::cat(&[&prefix, &other], 1).unwrap();
        let partial = attention.forward(&changed, &changed, Some(&mask)).unwrap();

        let a = full.get(0).unwrap().get(0).unwrap().to_vec1::<f32>().unwrap();
        let b = partial.get(0).unwrap().get(0).unwrap().to_vec1::<f32>().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn decoder_layer_shapes() {
        let config = small_config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let layer = DecoderLayer::new(&config, vb).unwrap();

        let x = Tensor::randn(0f32, 1., (1, 2, 16), &Device::Cpu).unwrap();
        let encoded = Tensor::randn(0f32, 1., (1, 4, 16), &Device::Cpu).unwrap();
        let mask = Tensor::zeros((1, 1, 2, 2), DType::F32, &Device::Cpu).unwrap();
        let out = layer.forward(&x, &encoded, &mask).unwrap();
        assert_eq!(out.dims(), &[1, 2, 16]);
    }
}
