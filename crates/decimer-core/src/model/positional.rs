//! Sinusoidal position encodings.
//!
//! Position `p` at channel `i` uses the angle `p / 10000^(2*(i/2)/d)`;
//! even channels take its sine and odd channels its cosine. The image grid
//! encoding spends half of the channels on the row index and the other half
//! on the column index.
//!
//! # Reference
//!
//! [Attention Is All You Need](https://arxiv.org/abs/1706.03762)

use crate::error::{DecimerError, Result};
use candle_core::{Device, Tensor};

fn angle(pos: usize, i: usize, d_model: usize) -> f64 {
    let exponent = (2 * (i / 2)) as f64 / d_model as f64;
    pos as f64 / 10000f64.powf(exponent)
}

fn encode_position(pos: usize, d_model: usize, out: &mut Vec<f32>) {
    for i in 0..d_model {
        let a = angle(pos, i, d_model);
        let value = if i % 2 == 0 { a.sin() } else { a.cos() };
        out.push(value as f32);
    }
}

/// Encoding for token positions, shaped `[1, max_positions, d_model]`.
pub fn positional_encoding_1d(max_positions: usize, d_model: usize, device: &Device) -> Result<Tensor> {
    let mut data = Vec::with_capacity(max_positions * d_model);
    for pos in 0..max_positions {
        encode_position(pos, d_model, &mut data);
    }
    Ok(Tensor::from_vec(data, (1, max_positions, d_model), device)?)
}

/// Encoding for a row-major image grid, shaped `[1, rows * cols, d_model]`.
pub fn positional_encoding_2d(
    rows: usize,
    cols: usize,
    d_model: usize,
    device: &Device,
) -> Result<Tensor> {
    if d_model % 2 != 0 {
        return Err(DecimerError::Config(format!(
            "2d position encoding needs an even d_model, got {}",
            d_model
        )));
    }
    let half = d_model / 2;
    let mut data = Vec::with_capacity(rows * cols * d_model);
    for row in 0..rows {
        for col in 0..cols {
            encode_position(row, half, &mut data);
            encode_position(col, half, &mut data);
        }
    }
    Ok(Tensor::from_vec(data, (1, rows * cols, d_model), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_position_alternates_zero_one() {
        let pe = positional_encoding_1d(4, 6, &Device::Cpu).unwrap();
        assert_eq!(pe.dims(), &[1, 4, 6]);
        let row0 = pe.squeeze(0).unwrap().get(0).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(row0, vec![0., 1., 0., 1., 0., 1.]);
    }

    #[test]
    fn channel_zero_is_sine_of_position() {
        let pe = positional_encoding_1d(3, 4, &Device::Cpu).unwrap();
        let values = pe.squeeze(0).unwrap().to_vec2::<f32>().unwrap();
        assert!((values[2][0] - 2f32.sin()).abs() < 1e-6);
        assert!((values[2][1] - 2f32.cos()).abs() < 1e-6);
    }

    #[test]
    fn grid_halves_follow_row_and_column() {
        let pe = positional_encoding_2d(2, 3, 4, &Device::Cpu).unwrap();
        assert_eq!(pe.dims(), &[1, 6, 4]);
        let values = pe.squeeze(0).unwrap().to_vec2::<f32>().unwrap();
        // Cell (1, 2) sits at flat index 5
        assert!((values[5][0] - 1f32.sin()).abs() < 1e-6);
        assert!((values[5][2] - 2f32.sin()).abs() < 1e-6);
        // Same row shares the row half
        assert_eq!(values[3][..2], values[5][..2]);
    }

    #[test]
    fn odd_width_rejected() {
        assert!(positional_encoding_2d(2, 2, 5, &Device::Cpu).is_err());
    }
}
