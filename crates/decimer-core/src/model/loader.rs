//! Checkpoint weight loading.
//!
//! A checkpoint directory holds one or more `.safetensors` files. Their
//! tensors are merged into a single name-indexed map and handed to the
//! network constructors through a [`VarBuilder`]. Tensors the networks never
//! ask for are ignored, so a checkpoint may carry optimizer state or
//! unrelated heads.
//!
//! # Example
//!
//! ```ignore
//! use decimer_core::model::WeightLoader;
//!
//! let loader = WeightLoader::from_dir("Trained_Models/Canonical".as_ref(), &device)?;
//! let vb = loader.var_builder(DType::F32);
//! let transformer = Transformer::new(&config, vocab_size, max_positions, vb.pp("transformer"))?;
//! ```

use crate::error::{DecimerError, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Tensors of one checkpoint directory, merged by name.
pub struct WeightLoader {
    tensors: HashMap<String, Tensor>,
    device: Device,
}

impl WeightLoader {
    /// Load every `.safetensors` file in `dir` onto `device`.
    ///
    /// Files are read in name order and later files win on duplicate
    /// tensor names.
    pub fn from_dir(dir: &Path, device: &Device) -> Result<Self> {
        let mut shards: Vec<PathBuf> = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        shards.retain(|path| path.extension().is_some_and(|ext| ext == "safetensors"));
        shards.sort();

        if shards.is_empty() {
            return Err(DecimerError::Model(format!(
                "no .safetensors files in checkpoint {}",
                dir.display()
            )));
        }

        let mut tensors = HashMap::new();
        for shard in &shards {
            tracing::debug!(file = %shard.display(), "reading checkpoint shard");
            read_shard(shard, device, &mut tensors)?;
        }

        Ok(Self {
            tensors,
            device: device.clone(),
        })
    }

    /// Hand the tensors to network constructors.
    ///
    /// Floating point tensors are converted to `dtype` on lookup.
    pub fn var_builder(&self, dtype: DType) -> VarBuilder<'static> {
        VarBuilder::from_tensors(self.tensors.clone(), dtype, &self.device)
    }

    /// Whether the checkpoint holds a tensor called `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// Number of tensors in the checkpoint.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }
}

fn read_shard(path: &Path, device: &Device, into: &mut HashMap<String, Tensor>) -> Result<()> {
    let bytes = fs::read(path)?;
    let shard = SafeTensors::deserialize(&bytes)
        .map_err(|e| DecimerError::Model(format!("{}: {}", path.display(), e)))?;
    for (name, view) in shard.tensors() {
        let tensor = to_tensor(&name, &view, device)?;
        into.insert(name, tensor);
    }
    Ok(())
}

fn read_values<T: bytemuck::Pod>(data: &[u8]) -> Vec<T> {
    data.chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect()
}

fn to_tensor(name: &str, view: &TensorView, device: &Device) -> Result<Tensor> {
    let shape = view.shape();
    let data = view.data();
    let tensor = match view.dtype() {
        Dtype::F32 => Tensor::from_vec(read_values::<f32>(data), shape, device)?,
        Dtype::F16 => Tensor::from_vec(read_values::<half::f16>(data), shape, device)?,
        Dtype::BF16 => Tensor::from_vec(read_values::<half::bf16>(data), shape, device)?,
        Dtype::I64 => Tensor::from_vec(read_values::<i64>(data), shape, device)?,
        // Step counters are sometimes saved as i32; candle has no such dtype
        Dtype::I32 => {
            let widened: Vec<i64> = read_values::<i32>(data).into_iter().map(i64::from).collect();
            Tensor::from_vec(widened, shape, device)?
        }
        other => {
            return Err(DecimerError::Model(format!(
                "tensor {}: unsupported dtype {:?}",
                name, other
            )))
        }
    };
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_from_nonexistent_dir() {
        let result = WeightLoader::from_dir(Path::new("/nonexistent/path"), &Device::Cpu);
        assert!(result.is_err());
    }

    #[test]
    fn loader_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = WeightLoader::from_dir(dir.path(), &Device::Cpu);
        assert!(matches!(result, Err(DecimerError::Model(_))));
    }

    #[test]
    fn loads_saved_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let weight = Tensor::new(&[[1f32, 2.], [3., 4.]], &Device::Cpu).unwrap();
        let steps = Tensor::new(&[7i64], &Device::Cpu).unwrap();
        let tensors = HashMap::from([
            ("layer.weight".to_string(), weight),
            ("optimizer.step".to_string(), steps),
        ]);
        candle_core::safetensors::save(&tensors, dir.path().join("model.safetensors")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loader = WeightLoader::from_dir(dir.path(), &Device::Cpu).unwrap();
        assert_eq!(loader.len(), 2);
        assert!(loader.contains("optimizer.step"));

        let vb = loader.var_builder(DType::F32);
        let weight = vb.pp("layer").get((2, 2), "weight").unwrap();
        assert_eq!(weight.to_vec2::<f32>().unwrap(), vec![vec![1., 2.], vec![3., 4.]]);
        assert!(vb.get((2, 2), "missing").is_err());
    }
}
