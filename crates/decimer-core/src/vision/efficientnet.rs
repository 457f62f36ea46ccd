//! EfficientNet backbone used as the image feature extractor.
//!
//! Only the convolutional trunk is built: stem, MBConv stages and the 1x1
//! head. The pooling and classification layers are absent, so the output is
//! the last feature map, flattened to `[1, H * W, C]`.
//!
//! Convolutions pad the way TensorFlow's `"same"` mode does, which is
//! asymmetric when the padding total is odd. Checkpoints trained with
//! TensorFlow rely on it.
//!
//! # Reference
//!
//! [EfficientNet: Rethinking Model Scaling for Convolutional Neural Networks](https://arxiv.org/abs/1905.11946)

use super::FeatureExtractor;
use crate::error::{DecimerError, Result};
use candle_core::{Module, ModuleT, Tensor, D};
use candle_nn::{batch_norm, conv2d, conv2d_no_bias, BatchNorm, Conv2d, Conv2dConfig, VarBuilder};
use serde::{Deserialize, Serialize};

/// One MBConv stage before width/depth scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Depthwise kernel size.
    pub kernel: usize,
    /// Number of blocks in the stage.
    pub repeats: usize,
    /// Input channels of the first block.
    pub input_filters: usize,
    /// Output channels of every block.
    pub output_filters: usize,
    /// Channel expansion factor.
    pub expand_ratio: usize,
    /// Stride of the first block.
    pub stride: usize,
}

impl StageConfig {
    /// Stage with the given kernel, block count, channels, expansion and stride.
    pub const fn new(
        kernel: usize,
        repeats: usize,
        input_filters: usize,
        output_filters: usize,
        expand_ratio: usize,
        stride: usize,
    ) -> Self {
        Self {
            kernel,
            repeats,
            input_filters,
            output_filters,
            expand_ratio,
            stride,
        }
    }
}

/// EfficientNet hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EfficientNetConfig {
    /// Channel multiplier.
    pub width_coefficient: f64,
    /// Block count multiplier.
    pub depth_coefficient: f64,
    /// Stem channels before scaling.
    pub stem_channels: usize,
    /// Head channels before scaling.
    pub head_channels: usize,
    /// Channel counts are rounded to multiples of this.
    pub divisor: usize,
    /// Squeeze-excitation ratio relative to block input channels.
    pub se_ratio: f64,
    /// Batch norm epsilon.
    pub batch_norm_eps: f64,
    /// MBConv stages.
    pub stages: Vec<StageConfig>,
}

impl EfficientNetConfig {
    /// Baseline stages shared by every EfficientNet variant.
    pub fn base_stages() -> Vec<StageConfig> {
        vec![
            StageConfig::new(3, 1, 32, 16, 1, 1),
            StageConfig::new(3, 2, 16, 24, 6, 2),
            StageConfig::new(5, 2, 24, 40, 6, 2),
            StageConfig::new(3, 3, 40, 80, 6, 2),
            StageConfig::new(5, 3, 80, 112, 6, 1),
            StageConfig::new(5, 4, 112, 192, 6, 2),
            StageConfig::new(3, 1, 192, 320, 6, 1),
        ]
    }

    fn scaled(width_coefficient: f64, depth_coefficient: f64) -> Self {
        Self {
            width_coefficient,
            depth_coefficient,
            stem_channels: 32,
            head_channels: 1280,
            divisor: 8,
            se_ratio: 0.25,
            batch_norm_eps: 1e-3,
            stages: Self::base_stages(),
        }
    }

    /// EfficientNet-B0.
    pub fn b0() -> Self {
        Self::scaled(1.0, 1.0)
    }

    /// EfficientNet-B3.
    pub fn b3() -> Self {
        Self::scaled(1.2, 1.4)
    }

    /// Scale a channel count by the width coefficient.
    pub fn round_filters(&self, filters: usize) -> usize {
        let divisor = self.divisor.max(1);
        let scaled = filters as f64 * self.width_coefficient;
        let mut rounded = divisor.max((scaled + divisor as f64 / 2.0) as usize / divisor * divisor);
        if (rounded as f64) < 0.9 * scaled {
            rounded += divisor;
        }
        rounded
    }

    /// Scale a block count by the depth coefficient.
    pub fn round_repeats(&self, repeats: usize) -> usize {
        (self.depth_coefficient * repeats as f64).ceil() as usize
    }

    /// Output channels of the head.
    pub fn output_channels(&self) -> usize {
        self.round_filters(self.head_channels)
    }

    /// Edge length of the output grid for a square input of `input` pixels.
    pub fn grid_size(&self, input: usize) -> usize {
        let mut size = input.div_ceil(2);
        for stage in &self.stages {
            if self.round_repeats(stage.repeats) > 0 {
                size = size.div_ceil(stage.stride);
            }
        }
        size
    }
}

impl Default for EfficientNetConfig {
    fn default() -> Self {
        Self::b3()
    }
}

/// Zero-pad the spatial dims of an NCHW tensor like TensorFlow `"same"`.
fn pad_same(x: &Tensor, kernel: usize, stride: usize) -> Result<Tensor> {
    if stride == 0 {
        return Err(DecimerError::Config("convolution stride must be positive".to_string()));
    }
    let mut x = x.clone();
    for dim in [2, 3] {
        let size = x.dim(dim)?;
        if size == 0 {
            return Err(DecimerError::ShapeMismatch(format!(
                "cannot convolve empty spatial dims {:?}",
                x.dims()
            )));
        }
        let out = size.div_ceil(stride);
        let total = ((out - 1) * stride + kernel).saturating_sub(size);
        if total > 0 {
            let before = total / 2;
            x = x.pad_with_zeros(dim, before, total - before)?;
        }
    }
    Ok(x)
}

/// Convolution followed by batch norm, padded `"same"`.
#[derive(Debug, Clone)]
struct ConvBn {
    conv: Conv2d,
    bn: BatchNorm,
    kernel: usize,
    stride: usize,
}

impl ConvBn {
    #[allow(clippy::too_many_arguments)]
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        eps: f64,
        conv_vb: VarBuilder,
        bn_vb: VarBuilder,
    ) -> Result<Self> {
        let cfg = Conv2dConfig {
            stride,
            groups,
            ..Default::default()
        };
        Ok(Self {
            conv: conv2d_no_bias(in_channels, out_channels, kernel, cfg, conv_vb)?,
            bn: batch_norm(out_channels, eps, bn_vb)?,
            kernel,
            stride,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = pad_same(x, self.kernel, self.stride)?;
        let x = self.conv.forward(&x)?;
        Ok(self.bn.forward_t(&x, false)?)
    }
}

/// Squeeze-and-excitation channel gate.
#[derive(Debug, Clone)]
struct SqueezeExcite {
    reduce: Conv2d,
    expand: Conv2d,
}

impl SqueezeExcite {
    fn new(channels: usize, reduced: usize, vb: VarBuilder) -> Result<Self> {
        let cfg = Conv2dConfig::default();
        Ok(Self {
            reduce: conv2d(channels, reduced, 1, cfg, vb.pp("se_reduce"))?,
            expand: conv2d(reduced, channels, 1, cfg, vb.pp("se_expand"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let pooled = x.mean_keepdim(D::Minus1)?.mean_keepdim(D::Minus2)?;
        let gate = self.reduce.forward(&pooled)?.silu()?;
        let gate = candle_nn::ops::sigmoid(&self.expand.forward(&gate)?)?;
        Ok(x.broadcast_mul(&gate)?)
    }
}

/// Mobile inverted bottleneck block.
#[derive(Debug, Clone)]
struct MbConv {
    expand: Option<ConvBn>,
    depthwise: ConvBn,
    se: Option<SqueezeExcite>,
    project: ConvBn,
    residual: bool,
}

impl MbConv {
    fn new(
        config: &EfficientNetConfig,
        input_filters: usize,
        output_filters: usize,
        kernel: usize,
        stride: usize,
        expand_ratio: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let eps = config.batch_norm_eps;
        let channels = input_filters * expand_ratio;

        let expand = if expand_ratio != 1 {
            Some(ConvBn::new(
                input_filters,
                channels,
                1,
                1,
                1,
                eps,
                vb.pp("expand_conv"),
                vb.pp("bn0"),
            )?)
        } else {
            None
        };
        let depthwise = ConvBn::new(
            channels,
            channels,
            kernel,
            stride,
            channels,
            eps,
            vb.pp("depthwise_conv"),
            vb.pp("bn1"),
        )?;
        let se = if config.se_ratio > 0.0 {
            let reduced = ((input_filters as f64 * config.se_ratio) as usize).max(1);
            Some(SqueezeExcite::new(channels, reduced, vb.clone())?)
        } else {
            None
        };
        let project = ConvBn::new(
            channels,
            output_filters,
            1,
            1,
            1,
            eps,
            vb.pp("project_conv"),
            vb.pp("bn2"),
        )?;

        Ok(Self {
            expand,
            depthwise,
            se,
            project,
            residual: stride == 1 && input_filters == output_filters,
        })
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut x = match &self.expand {
            Some(expand) => expand.forward(input)?.silu()?,
            None => input.clone(),
        };
        x = self.depthwise.forward(&x)?.silu()?;
        if let Some(se) = &self.se {
            x = se.forward(&x)?;
        }
        x = self.project.forward(&x)?;
        if self.residual {
            x = (x + input)?;
        }
        Ok(x)
    }
}

/// EfficientNet feature extractor.
#[derive(Debug, Clone)]
pub struct EfficientNet {
    stem: ConvBn,
    blocks: Vec<MbConv>,
    head: ConvBn,
    target_size: u32,
    output_channels: usize,
}

impl EfficientNet {
    /// Build the network from weights rooted at `vb`.
    pub fn new(config: &EfficientNetConfig, target_size: u32, vb: VarBuilder) -> Result<Self> {
        if target_size == 0 {
            return Err(DecimerError::Config("target_size must be positive".to_string()));
        }
        if let Some(stage) = config.stages.iter().find(|s| s.stride == 0 || s.kernel == 0) {
            return Err(DecimerError::Config(format!(
                "stage kernel and stride must be positive: {:?}",
                stage
            )));
        }
        let eps = config.batch_norm_eps;
        let stem_channels = config.round_filters(config.stem_channels);
        let stem = ConvBn::new(
            3,
            stem_channels,
            3,
            2,
            1,
            eps,
            vb.pp("stem.conv"),
            vb.pp("stem.bn"),
        )?;

        let mut blocks = Vec::new();
        let mut last_channels = stem_channels;
        for stage in &config.stages {
            let input_filters = config.round_filters(stage.input_filters);
            let output_filters = config.round_filters(stage.output_filters);
            for repeat in 0..config.round_repeats(stage.repeats) {
                let (input, stride) = if repeat == 0 {
                    (input_filters, stage.stride)
                } else {
                    (output_filters, 1)
                };
                let block = MbConv::new(
                    config,
                    input,
                    output_filters,
                    stage.kernel,
                    stride,
                    stage.expand_ratio,
                    vb.pp(format!("blocks.{}", blocks.len())),
                )?;
                blocks.push(block);
            }
            last_channels = output_filters;
        }

        let output_channels = config.output_channels();
        let head = ConvBn::new(
            last_channels,
            output_channels,
            1,
            1,
            1,
            eps,
            vb.pp("head.conv"),
            vb.pp("head.bn"),
        )?;

        tracing::debug!(
            blocks = blocks.len(),
            output_channels,
            target_size,
            "built efficientnet"
        );

        Ok(Self {
            stem,
            blocks,
            head,
            target_size,
            output_channels,
        })
    }

    /// Number of MBConv blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Channels of every output feature vector.
    pub fn output_channels(&self) -> usize {
        self.output_channels
    }
}

impl FeatureExtractor for EfficientNet {
    fn target_size(&self) -> u32 {
        self.target_size
    }

    fn extract(&self, image: &Tensor) -> Result<Tensor> {
        let (batch, channels, _, _) = image.dims4()?;
        if channels != 3 {
            return Err(DecimerError::ShapeMismatch(format!(
                "expected 3 input channels, got {}",
                channels
            )));
        }

        let mut x = self.stem.forward(image)?.silu()?;
        for block in &self.blocks {
            x = block.forward(&x)?;
        }
        let x = self.head.forward(&x)?.silu()?;

        // NCHW -> NHWC -> [batch, H * W, C]
        let (_, c, h, w) = x.dims4()?;
        Ok(x.permute((0, 2, 3, 1))?.reshape((batch, h * w, c))?)
    }
}
