//! Process-wide execution context.
//!
//! Device selection happens once at startup. The resulting
//! [`ExecutionContext`] is passed explicitly to every component that
//! allocates tensors.

use crate::error::{DecimerError, Result};
use candle_core::{DType, Device};
use std::fmt;
use std::str::FromStr;

/// Which compute device to run inference on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceConfig {
    /// Host CPU.
    Cpu,
    /// CUDA device with the given ordinal.
    Cuda(usize),
    /// CUDA device 0 when available, otherwise CPU.
    #[default]
    Auto,
}

impl FromStr for DeviceConfig {
    type Err = DecimerError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "cpu" => Ok(Self::Cpu),
            "auto" => Ok(Self::Auto),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            other => match other.strip_prefix("cuda:") {
                Some(ordinal) => ordinal
                    .parse()
                    .map(Self::Cuda)
                    .map_err(|_| DecimerError::Config(format!("invalid cuda ordinal: {}", s))),
                None => Err(DecimerError::Config(format!("unknown device: {}", s))),
            },
        }
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Device and precision shared by every inference call in the process.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    device: Device,
    dtype: DType,
}

impl ExecutionContext {
    /// Resolve a device configuration into a live context.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let device = match config {
            DeviceConfig::Cpu => Device::Cpu,
            DeviceConfig::Cuda(ordinal) => Device::new_cuda(ordinal)?,
            DeviceConfig::Auto => Device::cuda_if_available(0)?,
        };
        tracing::info!(device = ?device, "execution context ready");
        Ok(Self {
            device,
            dtype: DType::F32,
        })
    }

    /// CPU context, mostly useful in tests.
    pub fn cpu() -> Self {
        Self {
            device: Device::Cpu,
            dtype: DType::F32,
        }
    }

    /// Device tensors are allocated on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Floating point precision of the weights.
    pub fn dtype(&self) -> DType {
        self.dtype
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_device_config() {
        assert_eq!("cpu".parse::<DeviceConfig>().unwrap(), DeviceConfig::Cpu);
        assert_eq!("CUDA".parse::<DeviceConfig>().unwrap(), DeviceConfig::Cuda(0));
        assert_eq!("cuda:2".parse::<DeviceConfig>().unwrap(), DeviceConfig::Cuda(2));
        assert_eq!("auto".parse::<DeviceConfig>().unwrap(), DeviceConfig::Auto);
        assert!("cuda:x".parse::<DeviceConfig>().is_err());
        assert!("tpu".parse::<DeviceConfig>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for config in [DeviceConfig::Cpu, DeviceConfig::Cuda(1), DeviceConfig::Auto] {
            assert_eq!(config.to_string().parse::<DeviceConfig>().unwrap(), config);
        }
    }

    #[test]
    fn cpu_context() {
        let ctx = ExecutionContext::new(DeviceConfig::Cpu).unwrap();
        assert!(ctx.device().is_cpu());
        assert_eq!(ctx.dtype(), DType::F32);
    }
}
