//! # DECIMER Core
//!
//! Inference pipeline translating an image of a chemical structure into a
//! SMILES string.
//!
//! This crate provides:
//! - **Asset loading** for the pretrained model variants, with one-time
//!   download of the weight archive
//! - **EfficientNet feature extraction** over a normalised input image
//! - **Encoder-decoder transformer** predicting SELFIES tokens
//! - **Greedy decoding** bounded by the model's maximum length
//! - **SELFIES to SMILES** grammar conversion with valence policies

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod assets;
pub mod decode;
pub mod error;
pub mod grammar;
pub mod model;
pub mod runtime;
pub mod vision;

pub use error::{DecimerError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::assets::{AssetConfig, AssetStore, ModelBundle, ModelId, VocabularySource};
    pub use crate::decode::{Decoded, GreedyDecoder, SequenceModel};
    pub use crate::error::{DecimerError, Result};
    pub use crate::grammar::{decode_selfies, ValencePolicy};
    pub use crate::model::{SelfiesTokenizer, Transformer, TransformerConfig};
    pub use crate::runtime::{DeviceConfig, ExecutionContext};
    pub use crate::vision::{EfficientNet, FeatureExtractor};
}
