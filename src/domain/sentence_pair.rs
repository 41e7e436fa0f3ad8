// ============================================================
// Layer 3 — SentencePair Domain Type
// ============================================================
// One line of a parallel corpus: a sentence in the source
// language and its reference translation in the target language.
//
// Pairs are aligned by line number in the corpus files, so the
// n-th source line always belongs with the n-th target line.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentencePair {
    /// Sentence in the language we translate from
    pub source: String,

    /// Reference translation in the language we translate into
    pub target: String,
}

impl SentencePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Number of whitespace-separated tokens on the longer side
    pub fn max_token_len(&self) -> usize {
        let src = self.source.split_whitespace().count();
        let trg = self.target.split_whitespace().count();
        src.max(trg)
    }

    /// True when either side has no tokens at all
    pub fn has_empty_side(&self) -> bool {
        self.source.trim().is_empty() || self.target.trim().is_empty()
    }
}
