//! Image preprocessing and feature extraction.

mod efficientnet;
mod preprocess;

pub use efficientnet::{EfficientNet, EfficientNetConfig, StageConfig};
pub use preprocess::{image_to_tensor, load_image, IMAGENET_MEAN, IMAGENET_STD};

use crate::error::Result;
use candle_core::{Device, Tensor};
use std::path::Path;

/// A pretrained image encoder producing a grid of feature vectors.
pub trait FeatureExtractor {
    /// Edge length of the square input the encoder expects.
    fn target_size(&self) -> u32;

    /// Map a normalised `[1, 3, size, size]` image to `[1, patches, channels]`.
    fn extract(&self, image: &Tensor) -> Result<Tensor>;
}

/// Load an image file and run it through `extractor`.
///
/// Fails with [`crate::DecimerError::ImageUnreadable`] before any network
/// work if the file cannot be decoded.
pub fn extract_image_features<E: FeatureExtractor + ?Sized>(
    extractor: &E,
    path: &Path,
    device: &Device,
) -> Result<Tensor> {
    let image = load_image(path, extractor.target_size(), device)?;
    extractor.extract(&image)
}
