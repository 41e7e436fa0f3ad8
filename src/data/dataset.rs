use anyhow::Result;
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::sentence_pair::SentencePair;
use crate::infra::vocab_store::Vocabulary;

/// One encoded pair. Both sides are `<sos> ids… <eos>`, unpadded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationItem {
    pub source: Vec<u32>,
    pub target: Vec<u32>,
}

pub struct TranslationDataset {
    items: Vec<TranslationItem>,
}

impl TranslationDataset {
    pub fn new(items: Vec<TranslationItem>) -> Self { Self { items } }

    /// Encode sentence pairs with the two vocabularies.
    ///
    /// Pairs with an empty side are dropped, and so are pairs whose
    /// longer side exceeds `max_len` tokens when a limit is given.
    pub fn encode(
        pairs:        &[SentencePair],
        source_vocab: &Vocabulary,
        target_vocab: &Vocabulary,
        max_len:      Option<usize>,
    ) -> Result<Self> {
        let mut items   = Vec::with_capacity(pairs.len());
        let mut skipped = 0usize;

        for pair in pairs {
            let too_long = max_len.is_some_and(|max| pair.max_token_len() > max);
            if pair.has_empty_side() || too_long {
                skipped += 1;
                continue;
            }
            items.push(TranslationItem {
                source: source_vocab.encode(&pair.source)?,
                target: target_vocab.encode(&pair.target)?,
            });
        }

        if skipped > 0 {
            tracing::debug!("Dropped {} empty or over-long pairs", skipped);
        }
        Ok(Self::new(items))
    }

    pub fn items(&self) -> &[TranslationItem] { &self.items }
}

impl Dataset<TranslationItem> for TranslationDataset {
    fn get(&self, index: usize) -> Option<TranslationItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
