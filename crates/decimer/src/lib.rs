//! # DECIMER
//!
//! Translate images of chemical structures into SMILES strings.
//!
//! An image is encoded by an EfficientNet feature extractor, a transformer
//! predicts SELFIES tokens greedily, and the SELFIES string is decoded into
//! SMILES under a valence policy:
//! - **Three pretrained variants**: Canonical, Isomeric and Augmented
//! - **One-time weight download** into a local asset directory
//! - **CPU or CUDA** execution through candle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use decimer::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let predictor = Predictor::builder()
//!         .model(ModelId::Isomeric)
//!         .build()?;
//!
//!     let prediction = predictor.predict("caffeine.png")?;
//!     println!("{} -> {}", prediction.selfies, prediction.smiles);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Re-export core crate
pub use decimer_core::*;

mod predictor;

pub use predictor::{Prediction, Predictor, PredictorBuilder, PredictorConfig};

use decimer_core::assets::ModelId;
use std::path::Path;

/// Predict the SMILES of one image with a freshly loaded model.
///
/// Loads the assets of `model` from the default asset root, relative to the
/// working directory, on every call. Build a [`Predictor`] to translate
/// several images or to choose another root.
pub fn predict_smiles(image: impl AsRef<Path>, model: ModelId) -> anyhow::Result<String> {
    Predictor::builder().model(model).build()?.predict_smiles(image)
}

/// Commonly used types.
pub mod prelude {
    pub use crate::predictor::{Prediction, Predictor, PredictorBuilder, PredictorConfig};
    pub use crate::predict_smiles;
    pub use decimer_core::{
        assets::{AssetConfig, ModelId, DEFAULT_ASSET_ROOT},
        decode::Decoded,
        error::{DecimerError, Result},
        grammar::{decode_selfies, ValencePolicy},
        runtime::DeviceConfig,
    };

    // Re-export useful external types
    pub use anyhow;
    pub use tracing;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::tests::{write_checkpoint, write_image, CARBON_ID};
    use decimer_core::assets::DEFAULT_ASSET_ROOT;
    use std::env;

    #[test]
    fn one_shot_reads_default_root() {
        let dir = tempfile::tempdir().unwrap();
        write_checkpoint(&dir.path().join(DEFAULT_ASSET_ROOT), ModelId::Canonical, 5, CARBON_ID);
        write_checkpoint(&dir.path().join(DEFAULT_ASSET_ROOT), ModelId::Isomeric, 3, CARBON_ID);
        let image = write_image(dir.path());

        // Only this test depends on the working directory
        let previous = env::current_dir().unwrap();
        env::set_current_dir(dir.path()).unwrap();
        let isomeric = predict_smiles(&image, ModelId::Isomeric);
        let canonical = predict_smiles(&image, ModelId::Canonical);
        env::set_current_dir(previous).unwrap();

        assert_eq!(isomeric.unwrap(), "CCC");
        assert_eq!(canonical.unwrap(), "CCCCC");
    }
}
