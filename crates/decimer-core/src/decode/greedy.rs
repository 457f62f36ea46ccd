//! Greedy decoding.
//!
//! Starting from `[<start>]`, each step scores the current prefix, takes the
//! highest scoring id at the last position and appends it. Decoding ends when
//! the end token wins or after `max_length` steps, whichever comes first.

use super::{Decoded, SequenceModel};
use crate::error::{DecimerError, Result};
use crate::model::{decoder_mask, SelfiesTokenizer};
use candle_core::Tensor;

/// Progress of a single decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Prefix holds only the start token.
    Started,
    /// `step` tokens have been predicted so far.
    Stepping {
        /// Completed steps.
        step: usize,
    },
    /// No further steps will run.
    Finished,
}

/// Greedy (argmax) decoder bounded by a maximum length.
#[derive(Debug, Clone, Copy)]
pub struct GreedyDecoder {
    max_length: usize,
}

impl GreedyDecoder {
    /// Create a decoder that runs at most `max_length` steps.
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Maximum number of steps.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Decode the tokens for one image.
    ///
    /// # Arguments
    ///
    /// * `model` - Next-token scorer
    /// * `features` - Feature grid, encoded once before the first step
    /// * `tokenizer` - Vocabulary supplying start/end ids and the reverse mapping
    ///
    /// # Errors
    ///
    /// [`DecimerError::UnknownToken`] if the model predicts an id the
    /// vocabulary has no symbol for.
    pub fn decode<M: SequenceModel + ?Sized>(
        &self,
        model: &M,
        features: &Tensor,
        tokenizer: &SelfiesTokenizer,
    ) -> Result<Decoded> {
        let device = features.device();
        let end_token = tokenizer.end_token_id();

        if self.max_length == 0 {
            return Ok(Decoded::default());
        }
        let encoded = model.encode(features)?;
        let mut output = Tensor::new(&[[tokenizer.start_token_id()]], device)?;
        let mut result = Decoded::default();
        let mut state = DecodeState::Started;

        loop {
            state = match state {
                DecodeState::Started => DecodeState::Stepping { step: 0 },
                DecodeState::Stepping { step } if step >= self.max_length => {
                    tracing::debug!(steps = step, "decode reached max length");
                    DecodeState::Finished
                }
                DecodeState::Stepping { step } => {
                    let mask = decoder_mask(&output)?;
                    let logits = model.forward(&encoded, &output, &mask)?;
                    let predicted = last_position_argmax(&logits)?;
                    tracing::trace!(step, token = predicted, "decode step");

                    if predicted == end_token {
                        tracing::debug!(steps = step + 1, "decode hit end token");
                        DecodeState::Finished
                    } else {
                        let symbol = tokenizer
                            .id_to_token(predicted)
                            .ok_or(DecimerError::UnknownToken(predicted))?;
                        result.token_ids.push(predicted);
                        result.tokens.push(symbol);

                        let next = Tensor::new(&[[predicted]], device)?;
                        output = Tensor::cat(&[&output, &next], 1)?;
                        DecodeState::Stepping { step: step + 1 }
                    }
                }
                DecodeState::Finished => break,
            };
        }

        Ok(result)
    }
}

/// Highest scoring id at the last position of `[1, seq_len, vocab]` logits.
///
/// Ties go to the lowest id; NaN never wins.
fn last_position_argmax(logits: &Tensor) -> Result<u32> {
    let (_, seq_len, vocab) = logits.dims3()?;
    if seq_len == 0 || vocab == 0 {
        return Err(DecimerError::ShapeMismatch(format!(
            "cannot pick a token from logits of shape {:?}",
            logits.dims()
        )));
    }
    let scores = logits
        .narrow(1, seq_len - 1, 1)?
        .flatten_all()?
        .to_dtype(candle_core::DType::F32)?
        .to_vec1::<f32>()?;

    let mut best = 0usize;
    for (i, &score) in scores.iter().enumerate() {
        if score > scores[best] || (scores[best].is_nan() && !score.is_nan()) {
            best = i;
        }
    }
    Ok(best as u32)
}
