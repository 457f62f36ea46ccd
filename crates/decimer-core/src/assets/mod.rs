//! Pretrained model assets.
//!
//! Each [`ModelId`] maps to a checkpoint directory `<root>/<model_id>/`
//! holding:
//! - `tokenizer.json`: SELFIES vocabulary
//! - `config.json`: [`ModelConfig`] including `max_length`
//! - `*.safetensors`: feature extractor and transformer weights
//!
//! All variants ship in one archive. It is downloaded and unpacked into the
//! root the first time any missing variant is requested.

mod fetch;

pub use fetch::{extract_archive, ArchiveFetcher, HttpFetcher};

use crate::error::{DecimerError, Result};
use crate::model::{ModelConfig, SelfiesTokenizer, Transformer, WeightLoader};
use crate::runtime::ExecutionContext;
use crate::vision::EfficientNet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Published location of the v1.0 weight archive.
pub const DEFAULT_ARCHIVE_URL: &str =
    "https://storage.googleapis.com/iupac_models_trained/DECIMER_transformer_models/DECIMER_trained_models_v1.0.zip";

/// Default directory holding one checkpoint directory per model.
pub const DEFAULT_ASSET_ROOT: &str = "Trained_Models";

/// Weight prefix of the image feature extractor.
pub const FEATURE_EXTRACTOR_PREFIX: &str = "feature_extractor";
/// Weight prefix of the sequence transformer.
pub const TRANSFORMER_PREFIX: &str = "transformer";

const ARCHIVE_PART: &str = ".weights.zip.part";
const STAGING_DIR: &str = ".weights.staging";

/// Pretrained model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelId {
    /// Trained on canonical SMILES depictions, no stereochemistry.
    #[default]
    Canonical,
    /// Trained on isomeric SMILES depictions, with stereochemistry.
    Isomeric,
    /// Isomeric depictions with image augmentations.
    Augmented,
}

impl ModelId {
    /// Every variant.
    pub const ALL: [ModelId; 3] = [ModelId::Canonical, ModelId::Isomeric, ModelId::Augmented];

    /// Directory and display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Canonical => "Canonical",
            ModelId::Isomeric => "Isomeric",
            ModelId::Augmented => "Augmented",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = DecimerError;

    fn from_str(s: &str) -> Result<Self> {
        ModelId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                DecimerError::Config(format!(
                    "unknown model '{}', expected one of Canonical, Isomeric, Augmented",
                    s
                ))
            })
    }
}

/// What sizes the transformer's output layer for a model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabularySource {
    /// Output width equals the maximum decode length.
    MaxLength(usize),
    /// Output width equals the tokenizer's vocabulary size.
    Tokenizer(usize),
}

impl VocabularySource {
    /// Resolve the source for `id`.
    pub fn for_model(id: ModelId, tokenizer: &SelfiesTokenizer, max_length: usize) -> Self {
        match id {
            ModelId::Canonical => VocabularySource::MaxLength(max_length),
            ModelId::Isomeric | ModelId::Augmented => {
                VocabularySource::Tokenizer(tokenizer.vocab_size())
            }
        }
    }

    /// Output width.
    pub fn size(&self) -> usize {
        match *self {
            VocabularySource::MaxLength(n) | VocabularySource::Tokenizer(n) => n,
        }
    }
}

/// Where to find and how to fetch pretrained assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetConfig {
    /// Directory containing one checkpoint directory per model.
    pub root: PathBuf,
    /// URL of the shared weight archive.
    pub archive_url: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ASSET_ROOT),
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
        }
    }
}

/// Everything needed to run one model variant. Read-only once loaded.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    /// Model variant.
    pub id: ModelId,
    /// SELFIES vocabulary.
    pub tokenizer: SelfiesTokenizer,
    /// Maximum number of decode steps.
    pub max_length: usize,
    /// Feature extractor input edge length.
    pub target_size: u32,
    /// What sizes the transformer output layer.
    pub vocabulary: VocabularySource,
    /// Checkpoint directory.
    pub checkpoint_dir: PathBuf,
    /// Parsed config.json.
    pub config: ModelConfig,
}

impl ModelBundle {
    /// Read tokenizer and config from a checkpoint directory.
    pub fn from_dir(id: ModelId, checkpoint_dir: &Path) -> Result<Self> {
        let tokenizer = SelfiesTokenizer::from_dir(checkpoint_dir)?;

        let config_path = checkpoint_dir.join("config.json");
        if !config_path.exists() {
            return Err(DecimerError::Model(format!(
                "config.json not found in {}",
                checkpoint_dir.display()
            )));
        }
        let config = ModelConfig::from_file(&config_path)?;
        if config.max_length == 0 {
            return Err(DecimerError::Config(format!(
                "{}: max_length must be positive",
                config_path.display()
            )));
        }

        let vocabulary = VocabularySource::for_model(id, &tokenizer, config.max_length);
        Ok(Self {
            id,
            tokenizer,
            max_length: config.max_length,
            target_size: config.target_size,
            vocabulary,
            checkpoint_dir: checkpoint_dir.to_path_buf(),
            config,
        })
    }

    /// Width of the transformer's output distribution.
    pub fn target_vocab_size(&self) -> usize {
        self.config
            .target_vocab_size
            .unwrap_or_else(|| self.vocabulary.size())
    }

    /// Longest token sequence the decoder must accept.
    pub fn max_positions(&self) -> usize {
        self.target_vocab_size().max(self.max_length + 1)
    }

    /// Restore the feature extractor and transformer from the checkpoint.
    pub fn load_networks(&self, ctx: &ExecutionContext) -> Result<(EfficientNet, Transformer)> {
        let loader = WeightLoader::from_dir(&self.checkpoint_dir, ctx.device())?;
        let vb = loader.var_builder(ctx.dtype());

        let extractor = EfficientNet::new(
            &self.config.efficientnet,
            self.target_size,
            vb.pp(FEATURE_EXTRACTOR_PREFIX),
        )?;
        let transformer = Transformer::new(
            &self.config.transformer,
            self.target_vocab_size(),
            self.max_positions(),
            vb.pp(TRANSFORMER_PREFIX),
        )?;

        tracing::info!(
            model = %self.id,
            tensors = loader.len(),
            vocab = self.target_vocab_size(),
            "restored checkpoint"
        );
        Ok((extractor, transformer))
    }
}

/// Resolves model variants to local checkpoint directories.
pub struct AssetStore {
    config: AssetConfig,
    fetcher: Box<dyn ArchiveFetcher>,
}

impl AssetStore {
    /// Store that downloads over HTTP.
    pub fn new(config: AssetConfig) -> Self {
        Self::with_fetcher(config, HttpFetcher::new())
    }

    /// Store with a custom archive source.
    pub fn with_fetcher(config: AssetConfig, fetcher: impl ArchiveFetcher + 'static) -> Self {
        Self {
            config,
            fetcher: Box::new(fetcher),
        }
    }

    /// Asset configuration.
    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    /// Checkpoint directory for `id`, whether or not it exists yet.
    pub fn checkpoint_dir(&self, id: ModelId) -> PathBuf {
        self.config.root.join(id.as_str())
    }

    /// Make sure the checkpoint directory for `id` exists locally.
    ///
    /// Existing directories are reused untouched. Otherwise the shared
    /// archive is downloaded and unpacked into a staging directory under the
    /// asset root; its model directories are moved into place only once the
    /// whole archive has been extracted.
    pub fn ensure(&self, id: ModelId) -> Result<PathBuf> {
        let dir = self.checkpoint_dir(id);
        if dir.is_dir() {
            tracing::debug!(model = %id, dir = %dir.display(), "using cached checkpoint");
            return Ok(dir);
        }

        tracing::info!(
            model = %id,
            url = %self.config.archive_url,
            dest = %self.config.root.display(),
            "downloading pretrained weights"
        );
        let root = &self.config.root;
        fs::create_dir_all(root).map_err(|e| {
            DecimerError::AssetUnavailable(format!("{}: {}", root.display(), e))
        })?;
        let archive = root.join(ARCHIVE_PART);
        let staging = root.join(STAGING_DIR);
        if staging.exists() {
            let _ = fs::remove_dir_all(&staging);
        }

        let outcome = self
            .fetcher
            .fetch(&self.config.archive_url, &archive)
            .and_then(|()| extract_archive(&archive, &staging))
            .and_then(|_| fetch::install_staged(&staging, root));
        // Leftovers are useless whether or not installation worked
        let _ = fs::remove_file(&archive);
        let _ = fs::remove_dir_all(&staging);
        outcome.map_err(|e| match e {
            DecimerError::AssetUnavailable(_) => e,
            other => DecimerError::AssetUnavailable(format!("{}: {}", self.config.archive_url, other)),
        })?;

        if !dir.is_dir() {
            return Err(DecimerError::AssetUnavailable(format!(
                "archive {} has no {} directory",
                self.config.archive_url, id
            )));
        }
        Ok(dir)
    }

    /// Ensure and read the assets of `id`.
    pub fn load(&self, id: ModelId) -> Result<ModelBundle> {
        let dir = self.ensure(id)?;
        ModelBundle::from_dir(id, &dir)
    }
}

impl fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetStore")
            .field("config", &self.config)
            .finish()
    }
}
