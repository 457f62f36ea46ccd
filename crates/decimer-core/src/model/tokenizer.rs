//! SELFIES token vocabulary.
//!
//! Wraps a HuggingFace word-level tokenizer. Each SELFIES symbol such as
//! `[C]` or `[=Branch1]` is one word; `<start>` and `<end>` delimit a
//! sequence and `<pad>` holds id 0.

use crate::error::{DecimerError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tokenizers::Tokenizer as HfTokenizer;

/// Sequence start marker.
pub const START_TOKEN: &str = "<start>";
/// Sequence end marker.
pub const END_TOKEN: &str = "<end>";
/// Padding marker.
pub const PAD_TOKEN: &str = "<pad>";
/// Out-of-vocabulary marker.
pub const UNK_TOKEN: &str = "<unk>";

/// Bidirectional mapping between SELFIES symbols and token ids.
#[derive(Clone)]
pub struct SelfiesTokenizer {
    /// Underlying HuggingFace tokenizer.
    inner: HfTokenizer,
    start_token_id: u32,
    end_token_id: u32,
    pad_token_id: Option<u32>,
    /// One past the largest id in the vocabulary.
    vocab_size: usize,
}

impl SelfiesTokenizer {
    fn from_inner(inner: HfTokenizer) -> Result<Self> {
        let start_token_id = inner.token_to_id(START_TOKEN).ok_or_else(|| {
            DecimerError::Model(format!("vocabulary is missing {}", START_TOKEN))
        })?;
        let end_token_id = inner
            .token_to_id(END_TOKEN)
            .ok_or_else(|| DecimerError::Model(format!("vocabulary is missing {}", END_TOKEN)))?;
        let pad_token_id = inner.token_to_id(PAD_TOKEN);
        let vocab_size = inner
            .get_vocab(true)
            .values()
            .max()
            .map_or(0, |&id| id as usize + 1);

        Ok(Self {
            inner,
            start_token_id,
            end_token_id,
            pad_token_id,
            vocab_size,
        })
    }

    /// Load a tokenizer from a tokenizer.json file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner = HfTokenizer::from_file(path.as_ref()).map_err(|e| {
            DecimerError::Model(format!(
                "failed to load tokenizer {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_inner(inner)
    }

    /// Load a tokenizer from a checkpoint directory.
    ///
    /// Looks for tokenizer.json in the directory.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let tokenizer_path = dir.as_ref().join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(DecimerError::Model(format!(
                "tokenizer.json not found in {}",
                dir.as_ref().display()
            )));
        }
        Self::from_file(tokenizer_path)
    }

    /// Build a tokenizer from a word index (symbol to id).
    pub fn from_word_index(word_index: &HashMap<String, u32>) -> Result<Self> {
        let json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "WhitespaceSplit" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": word_index,
                "unk_token": UNK_TOKEN,
            },
        });
        let inner = HfTokenizer::from_str(&json.to_string())
            .map_err(|e| DecimerError::Model(format!("invalid word index: {}", e)))?;
        Self::from_inner(inner)
    }

    /// Write the vocabulary as tokenizer.json.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.inner
            .save(path.as_ref(), true)
            .map_err(|e| DecimerError::Model(format!("failed to save tokenizer: {}", e)))
    }

    /// Encode whitespace separated SELFIES symbols to token ids.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| DecimerError::Model(format!("failed to encode text: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Symbol for an id, if the id is in the vocabulary.
    pub fn id_to_token(&self, id: u32) -> Option<String> {
        self.inner.id_to_token(id)
    }

    /// Id for a symbol.
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    /// One past the largest token id.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Number of entries in the vocabulary.
    pub fn len(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Check if the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start token ID.
    pub fn start_token_id(&self) -> u32 {
        self.start_token_id
    }

    /// End token ID.
    pub fn end_token_id(&self) -> u32 {
        self.end_token_id
    }

    /// PAD token ID.
    pub fn pad_token_id(&self) -> Option<u32> {
        self.pad_token_id
    }
}

/// Join symbols into one grammar string with sequence markers removed.
pub fn tokens_to_grammar<S: AsRef<str>>(tokens: &[S]) -> String {
    let joined: String = tokens.iter().map(AsRef::as_ref).collect();
    joined.replace(START_TOKEN, "").replace(END_TOKEN, "")
}

impl std::fmt::Debug for SelfiesTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfiesTokenizer")
            .field("vocab_size", &self.vocab_size)
            .field("start_token_id", &self.start_token_id)
            .field("end_token_id", &self.end_token_id)
            .field("pad_token_id", &self.pad_token_id)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_word_index() -> HashMap<String, u32> {
        [
            (PAD_TOKEN, 0),
            (UNK_TOKEN, 1),
            (START_TOKEN, 2),
            (END_TOKEN, 3),
            ("[C]", 4),
            ("[O]", 5),
            ("[=O]", 6),
            ("[N]", 7),
            ("[Ring1]", 8),
            ("[Branch1]", 9),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn reserved_ids() {
        let tokenizer = SelfiesTokenizer::from_word_index(&sample_word_index()).unwrap();
        assert_eq!(tokenizer.start_token_id(), 2);
        assert_eq!(tokenizer.end_token_id(), 3);
        assert_eq!(tokenizer.pad_token_id(), Some(0));
        assert_eq!(tokenizer.vocab_size(), 10);
        assert_eq!(tokenizer.len(), 10);
    }

    #[test]
    fn reverse_mapping() {
        let tokenizer = SelfiesTokenizer::from_word_index(&sample_word_index()).unwrap();
        assert_eq!(tokenizer.id_to_token(4).as_deref(), Some("[C]"));
        assert_eq!(tokenizer.token_to_id("[=O]"), Some(6));
        assert_eq!(tokenizer.id_to_token(42), None);
    }

    #[test]
    fn missing_end_token_is_rejected() {
        let mut index = sample_word_index();
        index.remove(END_TOKEN);
        let err = SelfiesTokenizer::from_word_index(&index).unwrap_err();
        assert!(err.to_string().contains(END_TOKEN));
    }

    #[test]
    fn encode_symbols() {
        let tokenizer = SelfiesTokenizer::from_word_index(&sample_word_index()).unwrap();
        assert_eq!(tokenizer.encode("[C] [C] [O]").unwrap(), vec![4, 4, 5]);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = SelfiesTokenizer::from_word_index(&sample_word_index()).unwrap();
        tokenizer.save(dir.path().join("tokenizer.json")).unwrap();

        let reloaded = SelfiesTokenizer::from_dir(dir.path()).unwrap();
        assert_eq!(reloaded.end_token_id(), tokenizer.end_token_id());
        assert_eq!(reloaded.id_to_token(7).as_deref(), Some("[N]"));
    }

    #[test]
    fn from_dir_without_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SelfiesTokenizer::from_dir(dir.path()).is_err());
    }

    #[test]
    fn grammar_string_strips_markers() {
        assert_eq!(
            tokens_to_grammar(&["<start>", "[C]", "[C]", "[O]", "<end>"]),
            "[C][C][O]"
        );
        assert_eq!(tokens_to_grammar::<&str>(&[]), "");
    }
}
