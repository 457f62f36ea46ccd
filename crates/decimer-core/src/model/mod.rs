//! Model loading and inference.
//!
//! Provides the pieces of the sequence transformer:
//! - Model configuration
//! - SELFIES tokenizer
//! - Checkpoint weight loading
//! - Encoder-decoder forward pass

mod config;
mod layer;
mod loader;
mod positional;
mod tokenizer;
mod transformer;

pub use config::{ModelConfig, TransformerConfig};
pub use layer::{Attention, DecoderLayer, EncoderLayer, FeedForward};
pub use loader::WeightLoader;
pub use positional::{positional_encoding_1d, positional_encoding_2d};
pub use tokenizer::{tokens_to_grammar, SelfiesTokenizer, END_TOKEN, PAD_TOKEN, START_TOKEN, UNK_TOKEN};
pub use transformer::{decoder_mask, Transformer};

#[cfg(test)]
pub(crate) use tokenizer::tests::sample_word_index;
