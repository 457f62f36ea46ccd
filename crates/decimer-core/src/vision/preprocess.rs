//! Image loading and normalisation for the feature extractor.

use crate::error::{DecimerError, Result};
use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;

/// Per-channel ImageNet mean.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel ImageNet standard deviation.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Read an image file and turn it into a `[1, 3, size, size]` tensor.
///
/// Any format the `image` crate decodes is accepted; alpha is dropped.
pub fn load_image(path: &Path, target_size: u32, device: &Device) -> Result<Tensor> {
    let img = image::open(path).map_err(|e| DecimerError::ImageUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    tracing::debug!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        "loaded image"
    );
    image_to_tensor(&img, target_size, device)
}

/// Resize (bilinear, aspect ratio not kept) and normalise a decoded image.
pub fn image_to_tensor(img: &DynamicImage, target_size: u32, device: &Device) -> Result<Tensor> {
    if target_size == 0 {
        return Err(DecimerError::Config("target size must be positive".to_string()));
    }
    let rgb = img
        .resize_exact(target_size, target_size, FilterType::Triangle)
        .to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for c in 0..3 {
        for y in 0..height {
            for x in 0..width {
                let value = rgb.get_pixel(x, y)[c] as f32 / 255.0;
                data.push((value - IMAGENET_MEAN[c]) / IMAGENET_STD[c]);
            }
        }
    }

    Ok(Tensor::from_vec(
        data,
        (1, 3, height as usize, width as usize),
        device,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn white_image_normalises_per_channel() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 5, Rgb([255, 255, 255])));
        let tensor = image_to_tensor(&img, 4, &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[1, 3, 4, 4]);

        let values = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        for c in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            assert!((values[c * 16] - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn load_from_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mol.png");
        RgbImage::from_pixel(32, 20, Rgb([0, 0, 0])).save(&path).unwrap();

        let tensor = load_image(&path, 16, &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[1, 3, 16, 16]);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = load_image(Path::new("/nonexistent/mol.png"), 16, &Device::Cpu).unwrap_err();
        assert!(matches!(err, DecimerError::ImageUnreadable { .. }));
    }

    #[test]
    fn corrupt_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let err = load_image(&path, 16, &Device::Cpu).unwrap_err();
        assert!(matches!(err, DecimerError::ImageUnreadable { .. }));
    }
}
