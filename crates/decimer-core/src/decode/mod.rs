//! Autoregressive decoding over a sequence model.
//!
//! The [`SequenceModel`] trait is the seam between the decoding loop and the
//! network that scores the next token. [`GreedyDecoder`] drives any
//! implementation until the end token or the length cap.

mod greedy;

pub use greedy::{DecodeState, GreedyDecoder};

use crate::error::Result;
use crate::model::tokens_to_grammar;
use candle_core::Tensor;

/// A network that scores the next token given image features and a prefix.
pub trait SequenceModel {
    /// Width of the output distribution.
    fn vocab_size(&self) -> usize;

    /// Turn image features into the memory every decode step attends to.
    ///
    /// Runs once per decode. The default hands the features through.
    fn encode(&self, features: &Tensor) -> Result<Tensor> {
        Ok(features.clone())
    }

    /// Score every position of `tokens`.
    ///
    /// # Arguments
    ///
    /// * `encoded` - Output of [`SequenceModel::encode`]
    /// * `tokens` - Token prefix `[1, seq_len]` (u32)
    /// * `mask` - Decoder mask `[1, 1, seq_len, seq_len]`, 1 marks blocked positions
    ///
    /// # Returns
    ///
    /// Logits `[1, seq_len, vocab_size]`
    fn forward(&self, encoded: &Tensor, tokens: &Tensor, mask: &Tensor) -> Result<Tensor>;
}

/// Tokens produced by one decode, without start or end markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Predicted token ids.
    pub token_ids: Vec<u32>,
    /// Predicted SELFIES symbols, parallel to `token_ids`.
    pub tokens: Vec<String>,
}

impl Decoded {
    /// The symbols joined into one SELFIES string.
    pub fn grammar(&self) -> String {
        tokens_to_grammar(&self.tokens)
    }

    /// Number of predicted tokens.
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    /// Check if nothing was predicted.
    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}
