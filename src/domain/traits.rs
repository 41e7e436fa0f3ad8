// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to these traits rather than to
// concrete loaders, vocabularies or models, so any of them can
// be swapped without touching the workflow code.

use anyhow::Result;
use std::path::Path;

use crate::domain::sentence_pair::SentencePair;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
/// Anything that can produce aligned sentence pairs.
///
/// Implementations:
///   - ParallelCorpusLoader → reads `<prefix>.<src>` / `<prefix>.<trg>` files
pub trait CorpusSource {
    /// Load every aligned pair, in corpus order.
    fn load_pairs(&self) -> Result<Vec<SentencePair>>;
}

// ─── SentenceTranslator ───────────────────────────────────────────────────────
/// Anything that can translate a list of sentences.
///
/// The output has exactly one entry per input sentence,
/// in the same order.
pub trait SentenceTranslator {
    fn translate(&self, sentences: &[String]) -> Result<Vec<String>>;
}

// ─── Persistable ──────────────────────────────────────────────────────────────
/// Any component whose state can be saved and restored from disk.
///
/// Implementations:
///   - Vocabulary → saves/loads its WordLevel tokenizer JSON
pub trait Persistable: Sized {
    fn save(&self, path: &Path) -> Result<()>;

    fn load(path: &Path) -> Result<Self>;
}
