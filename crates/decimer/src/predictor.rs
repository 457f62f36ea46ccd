//! High-level image to SMILES predictor.

use anyhow::{Context, Result};
use decimer_core::{
    assets::{ArchiveFetcher, AssetConfig, AssetStore, ModelBundle, ModelId},
    decode::{Decoded, GreedyDecoder},
    grammar::{decode_selfies, ValencePolicy},
    model::Transformer,
    runtime::{DeviceConfig, ExecutionContext},
    vision::{extract_image_features, EfficientNet},
};
use std::path::{Path, PathBuf};

/// Configuration for the predictor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictorConfig {
    /// Pretrained variant to load.
    pub model: ModelId,
    /// Where checkpoints live and where to fetch them from.
    pub assets: AssetConfig,
    /// Compute device.
    pub device: DeviceConfig,
    /// Valence constraints applied when decoding SELFIES.
    pub valence_policy: ValencePolicy,
    /// Decode step cap replacing the checkpoint's `max_length`.
    pub max_length_override: Option<usize>,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model: ModelId::default(),
            assets: AssetConfig::default(),
            device: DeviceConfig::default(),
            valence_policy: ValencePolicy::Hypervalent,
            max_length_override: None,
        }
    }
}

/// Builder for creating a [`Predictor`].
pub struct PredictorBuilder {
    config: PredictorConfig,
    fetcher: Option<Box<dyn ArchiveFetcher>>,
}

impl PredictorBuilder {
    /// Create a new predictor builder.
    pub fn new() -> Self {
        Self {
            config: PredictorConfig::default(),
            fetcher: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PredictorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set model variant.
    pub fn model(mut self, model: ModelId) -> Self {
        self.config.model = model;
        self
    }

    /// Set the directory holding checkpoint directories.
    pub fn asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.assets.root = root.into();
        self
    }

    /// Set the weight archive URL.
    pub fn archive_url(mut self, url: impl Into<String>) -> Self {
        self.config.assets.archive_url = url.into();
        self
    }

    /// Set compute device.
    pub fn device(mut self, device: DeviceConfig) -> Self {
        self.config.device = device;
        self
    }

    /// Set valence policy.
    pub fn valence_policy(mut self, policy: ValencePolicy) -> Self {
        self.config.valence_policy = policy;
        self
    }

    /// Cap decoding at `max_length` steps instead of the checkpoint value.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.config.max_length_override = Some(max_length);
        self
    }

    /// Fetch missing weights with `fetcher` instead of HTTP.
    pub fn fetcher(mut self, fetcher: impl ArchiveFetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// Resolve the device, load assets and restore both networks.
    pub fn build(self) -> Result<Predictor> {
        let config = self.config;
        let context =
            ExecutionContext::new(config.device).context("failed to initialise compute device")?;

        let store = match self.fetcher {
            Some(fetcher) => AssetStore::with_fetcher(config.assets.clone(), fetcher),
            None => AssetStore::new(config.assets.clone()),
        };
        let mut bundle = store
            .load(config.model)
            .with_context(|| format!("failed to load {} model assets", config.model))?;
        if let Some(max_length) = config.max_length_override {
            bundle.max_length = max_length;
        }

        let (extractor, transformer) = bundle
            .load_networks(&context)
            .with_context(|| format!("failed to restore {} checkpoint", config.model))?;
        let decoder = GreedyDecoder::new(bundle.max_length);

        tracing::info!(
            model = %config.model,
            max_length = bundle.max_length,
            policy = %config.valence_policy,
            "predictor ready"
        );

        Ok(Predictor {
            config,
            context,
            bundle,
            extractor,
            transformer,
            decoder,
        })
    }
}

impl Default for PredictorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Translates chemical structure images into SMILES.
///
/// Assets are loaded once at build time; the predictor can then be reused
/// for any number of images, one at a time.
pub struct Predictor {
    config: PredictorConfig,
    context: ExecutionContext,
    bundle: ModelBundle,
    extractor: EfficientNet,
    transformer: Transformer,
    decoder: GreedyDecoder,
}

impl Predictor {
    /// Create a new predictor builder.
    pub fn builder() -> PredictorBuilder {
        PredictorBuilder::new()
    }

    /// Get predictor configuration.
    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Loaded model assets.
    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    /// Execution context the networks run in.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Predict the SELFIES tokens for one image.
    pub fn predict_selfies(&self, image: impl AsRef<Path>) -> Result<Decoded> {
        let image = image.as_ref();
        let features = extract_image_features(&self.extractor, image, self.context.device())?;
        let decoded = self
            .decoder
            .decode(&self.transformer, &features, &self.bundle.tokenizer)
            .with_context(|| format!("decoding failed for {}", image.display()))?;
        tracing::debug!(image = %image.display(), tokens = decoded.len(), "predicted SELFIES");
        Ok(decoded)
    }

    /// Predict the SMILES for one image.
    pub fn predict_smiles(&self, image: impl AsRef<Path>) -> Result<String> {
        Ok(self.predict(image)?.smiles)
    }

    /// Predict SELFIES and SMILES for one image.
    pub fn predict(&self, image: impl AsRef<Path>) -> Result<Prediction> {
        let decoded = self.predict_selfies(image)?;
        let selfies = decoded.grammar();
        let smiles = decode_selfies(&selfies, self.config.valence_policy)
            .with_context(|| format!("predicted SELFIES is not decodable: {}", selfies))?;
        Ok(Prediction {
            selfies,
            smiles,
            tokens: decoded.tokens,
        })
    }
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("config", &self.config)
            .field("context", &self.context)
            .field("max_length", &self.bundle.max_length)
            .finish()
    }
}

/// Result of predicting one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// Predicted SELFIES string.
    pub selfies: String,
    /// SMILES decoded from `selfies`.
    pub smiles: String,
    /// Predicted SELFIES symbols, without start and end markers.
    pub tokens: Vec<String>,
}
