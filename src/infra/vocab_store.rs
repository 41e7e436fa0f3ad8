// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// One Vocabulary per language maps tokens to integer ids and
// back. Token ids are meaningless without the exact vocabulary
// they were produced with, so the vocabularies built at the
// start of training are written next to the model checkpoint
// and reloaded verbatim for inference.
//
// A Vocabulary is a HuggingFace WordLevel tokenizer:
//   - pre-tokenizer: WhitespaceSplit (corpora are pre-tokenised
//     or BPE-segmented, so splitting on spaces is enough)
//   - normalizer:    Lowercase, only for lowercased datasets
//   - model:         WordLevel { vocab, unk_token }
//
// Fixed special token ids:
//   <unk> = 0, <pad> = 1, <sos> = 2, <eos> = 3
// Corpus words follow from id 4, most frequent first, ties
// broken alphabetically so the same corpus always yields the
// same ids.

use anyhow::{Context, Result};
use std::{collections::HashMap, path::Path, str::FromStr};
use tokenizers::Tokenizer;

use crate::domain::traits::Persistable;

pub const UNK_TOKEN: &str = "<unk>";
pub const PAD_TOKEN: &str = "<pad>";
pub const SOS_TOKEN: &str = "<sos>";
pub const EOS_TOKEN: &str = "<eos>";

const SPECIAL_TOKENS: [&str; 4] = [UNK_TOKEN, PAD_TOKEN, SOS_TOKEN, EOS_TOKEN];

#[derive(Clone)]
pub struct Vocabulary {
    tokenizer: Tokenizer,
    unk_id:    u32,
    pad_id:    u32,
    sos_id:    u32,
    eos_id:    u32,
}

impl Vocabulary {
    /// Build a vocabulary from cleaned sentences.
    ///
    /// Words seen fewer than `min_freq` times map to `<unk>`.
    /// `max_size` caps the number of corpus words (specials excluded).
    pub fn build(
        texts:     &[String],
        min_freq:  usize,
        max_size:  Option<usize>,
        lowercase: bool,
    ) -> Result<Self> {
        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            let text = if lowercase { text.to_lowercase() } else { text.clone() };
            for word in text.split_whitespace() {
                if SPECIAL_TOKENS.contains(&word) {
                    continue;
                }
                *freq.entry(word.to_string()).or_insert(0) += 1;
            }
        }

        let mut words: Vec<(String, usize)> = freq
            .into_iter()
            .filter(|(_, count)| *count >= min_freq.max(1))
            .collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(max) = max_size {
            words.truncate(max);
        }

        let mut vocab = serde_json::Map::new();
        for (id, token) in SPECIAL_TOKENS.iter().enumerate() {
            vocab.insert(token.to_string(), serde_json::json!(id));
        }
        for (offset, (word, _)) in words.iter().enumerate() {
            vocab.insert(word.clone(), serde_json::json!(SPECIAL_TOKENS.len() + offset));
        }

        let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
            .iter()
            .enumerate()
            .map(|(id, token)| serde_json::json!({
                "id": id, "content": token, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            }))
            .collect();

        let normalizer = if lowercase {
            serde_json::json!({ "type": "Lowercase" })
        } else {
            serde_json::Value::Null
        };

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": normalizer,
            "pre_tokenizer": { "type": "WhitespaceSplit" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        let tokenizer = Tokenizer::from_str(&tokenizer_json.to_string())
            .map_err(|e| anyhow::anyhow!("Cannot build vocabulary tokenizer: {e}"))?;

        let vocabulary = Self::from_tokenizer(tokenizer)?;
        tracing::info!(
            "Built vocabulary: {} entries (min_freq={}, lowercase={})",
            vocabulary.len(),
            min_freq,
            lowercase
        );
        Ok(vocabulary)
    }

    fn from_tokenizer(tokenizer: Tokenizer) -> Result<Self> {
        let lookup = |token: &str| {
            tokenizer
                .token_to_id(token)
                .with_context(|| format!("Vocabulary has no '{token}' entry"))
        };
        let unk_id = lookup(UNK_TOKEN)?;
        let pad_id = lookup(PAD_TOKEN)?;
        let sos_id = lookup(SOS_TOKEN)?;
        let eos_id = lookup(EOS_TOKEN)?;
        Ok(Self { tokenizer, unk_id, pad_id, sos_id, eos_id })
    }

    /// Number of ids. Specials live in the WordLevel vocab itself,
    /// so the model vocabulary size already counts them.
    pub fn len(&self) -> usize {
        self.tokenizer.get_vocab_size(false)
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    pub fn id_to_token(&self, id: u32) -> Option<String> {
        self.tokenizer.id_to_token(id)
    }

    pub fn unk_id(&self) -> u32 { self.unk_id }
    pub fn pad_id(&self) -> u32 { self.pad_id }
    pub fn sos_id(&self) -> u32 { self.sos_id }
    pub fn eos_id(&self) -> u32 { self.eos_id }

    /// Encode a sentence as `<sos> tokens… <eos>`.
    pub fn encode(&self, sentence: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(sentence, false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

        let mut ids = Vec::with_capacity(encoding.get_ids().len() + 2);
        ids.push(self.sos_id);
        ids.extend_from_slice(encoding.get_ids());
        ids.push(self.eos_id);
        Ok(ids)
    }

    /// Map ids back to tokens and join them with single spaces.
    ///
    /// Stops at the first `<eos>`; `<sos>` and `<pad>` are dropped.
    pub fn detokenize(&self, ids: &[u32]) -> String {
        ids.iter()
            .take_while(|&&id| id != self.eos_id)
            .filter(|&&id| id != self.sos_id && id != self.pad_id)
            .map(|&id| self.id_to_token(id).unwrap_or_else(|| UNK_TOKEN.to_string()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vocabulary")
            .field("len", &self.len())
            .field("pad_id", &self.pad_id)
            .field("sos_id", &self.sos_id)
            .field("eos_id", &self.eos_id)
            .finish()
    }
}

impl Persistable for Vocabulary {
    fn save(&self, path: &Path) -> Result<()> {
        self.tokenizer
            .save(path, true)
            .map_err(|e| anyhow::anyhow!("Cannot write vocabulary '{}': {e}", path.display()))?;
        tracing::debug!("Saved vocabulary to '{}'", path.display());
        Ok(())
    }

    fn load(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("Cannot load vocabulary from '{}': {e}", path.display()))?;
        Self::from_tokenizer(tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "a dog runs".to_string(),
            "a cat runs".to_string(),
            "A dog sleeps".to_string(),
        ]
    }

    #[test]
    fn test_special_ids_are_fixed() {
        let vocab = Vocabulary::build(&corpus(), 1, None, false).unwrap();
        assert_eq!(vocab.unk_id(), 0);
        assert_eq!(vocab.pad_id(), 1);
        assert_eq!(vocab.sos_id(), 2);
        assert_eq!(vocab.eos_id(), 3);
    }

    #[test]
    fn test_most_frequent_word_comes_first() {
        let vocab = Vocabulary::build(&corpus(), 1, None, true).unwrap();
        // "a" appears three times once lowercased
        assert_eq!(vocab.token_to_id("a"), Some(4));
    }

    #[test]
    fn test_id_token_round_trip() {
        let vocab = Vocabulary::build(&corpus(), 1, None, false).unwrap();
        for id in 0..vocab.len() as u32 {
            let token = vocab.id_to_token(id).unwrap();
            assert_eq!(vocab.token_to_id(&token), Some(id), "token '{token}'");
        }
    }

    #[test]
    fn test_min_freq_filters_rare_words() {
        let vocab = Vocabulary::build(&corpus(), 2, None, false).unwrap();
        assert!(vocab.token_to_id("dog").is_some());
        assert!(vocab.token_to_id("runs").is_some());
        assert!(vocab.token_to_id("cat").is_none());
    }

    #[test]
    fn test_max_size_caps_corpus_words() {
        let vocab = Vocabulary::build(&corpus(), 1, Some(2), false).unwrap();
        assert_eq!(vocab.len(), SPECIAL_TOKENS.len() + 2);
    }

    #[test]
    fn test_encode_wraps_and_maps_unknowns() {
        let vocab = Vocabulary::build(&corpus(), 1, None, false).unwrap();
        let ids   = vocab.encode("a zebra runs").unwrap();
        assert_eq!(ids.first(), Some(&vocab.sos_id()));
        assert_eq!(ids.last(), Some(&vocab.eos_id()));
        assert_eq!(ids[2], vocab.unk_id());
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_lowercase_normalizer_applies_on_encode() {
        let vocab = Vocabulary::build(&corpus(), 1, None, true).unwrap();
        let ids   = vocab.encode("A DOG").unwrap();
        assert_eq!(ids[1], vocab.token_to_id("a").unwrap());
        assert_eq!(ids[2], vocab.token_to_id("dog").unwrap());
    }

    #[test]
    fn test_detokenize_stops_at_eos() {
        let vocab = Vocabulary::build(&corpus(), 1, None, false).unwrap();
        let mut ids = vocab.encode("a dog runs").unwrap();
        ids.extend(vocab.encode("a cat").unwrap());
        assert_eq!(vocab.detokenize(&ids), "a dog runs");
    }

    #[test]
    fn test_save_and_load_keep_ids() {
        let dir   = tempfile::tempdir().unwrap();
        let path  = dir.path().join("vocab.json");
        let vocab = Vocabulary::build(&corpus(), 1, None, true).unwrap();
        vocab.save(&path).unwrap();

        let loaded = Vocabulary::load(&path).unwrap();
        assert_eq!(loaded.len(), vocab.len());
        assert_eq!(loaded.token_to_id("sleeps"), vocab.token_to_id("sleeps"));
        assert_eq!(loaded.encode("A cat").unwrap(), vocab.encode("A cat").unwrap());
    }
}
