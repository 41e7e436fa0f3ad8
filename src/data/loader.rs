// ============================================================
// Layer 4 — Parallel Corpus Loader
// ============================================================
// Reads a bilingual corpus stored as two line-aligned files
// that share a path prefix and differ by language extension:
//
//   data/iwslt2014/train.de-en.bpe.de   ← source sentences
//   data/iwslt2014/train.de-en.bpe.en   ← target sentences
//
// Line n of the source file is the translation of line n of
// the target file, so both files must have the same number of
// lines. A mismatch means the corpus is corrupt and loading
// fails instead of silently mis-aligning every pair after the
// first missing line.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::sentence_pair::SentencePair;
use crate::domain::traits::CorpusSource;

// ─── DatasetKind ──────────────────────────────────────────────────────────────
/// The corpora the harness knows how to train on.
/// Each kind fixes default corpus locations and whether
/// text is lowercased before it reaches the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// IWSLT 2014 German-English, BPE-segmented and cased
    Iwslt2014,
    /// Multi30k image-caption translations, lowercased
    Multi30k,
}

impl DatasetKind {
    pub fn default_train_prefix(&self) -> &'static str {
        match self {
            DatasetKind::Iwslt2014 => "data/iwslt2014/train.de-en.bpe",
            DatasetKind::Multi30k => "data/multi30k/train",
        }
    }

    pub fn default_dev_prefix(&self) -> &'static str {
        match self {
            DatasetKind::Iwslt2014 => "data/iwslt2014/dev.de-en.bpe",
            DatasetKind::Multi30k => "data/multi30k/val",
        }
    }

    pub fn default_test_prefix(&self) -> &'static str {
        match self {
            DatasetKind::Iwslt2014 => "data/iwslt2014/test.de-en.bpe",
            DatasetKind::Multi30k => "data/multi30k/test2016",
        }
    }

    pub fn lowercase(&self) -> bool {
        matches!(self, DatasetKind::Multi30k)
    }
}

/// Build `<prefix>.<lang>`. The language is appended, never
/// substituted for an existing extension (`test.de-en.bpe` → `test.de-en.bpe.de`).
pub fn corpus_file(prefix: impl AsRef<Path>, lang: &str) -> PathBuf {
    let mut name = prefix.as_ref().as_os_str().to_owned();
    name.push(".");
    name.push(lang);
    PathBuf::from(name)
}

// ─── ParallelCorpusLoader ─────────────────────────────────────────────────────
pub struct ParallelCorpusLoader {
    prefix:      String,
    source_lang: String,
    target_lang: String,
}

impl ParallelCorpusLoader {
    pub fn new(
        prefix:      impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            prefix:      prefix.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }

    pub fn source_path(&self) -> PathBuf {
        corpus_file(&self.prefix, &self.source_lang)
    }

    pub fn target_path(&self) -> PathBuf {
        corpus_file(&self.prefix, &self.target_lang)
    }
}

impl CorpusSource for ParallelCorpusLoader {
    fn load_pairs(&self) -> Result<Vec<SentencePair>> {
        let source_path = self.source_path();
        let target_path = self.target_path();

        let sources = read_lines(&source_path)?;
        let targets = read_lines(&target_path)?;

        if sources.len() != targets.len() {
            bail!(
                "Corpus '{}' is misaligned: {} source lines but {} target lines",
                self.prefix,
                sources.len(),
                targets.len()
            );
        }

        let pairs: Vec<SentencePair> = sources
            .into_iter()
            .zip(targets)
            .map(|(s, t)| SentencePair::new(s, t))
            .collect();

        tracing::info!(
            "Loaded {} sentence pairs from '{}' ({} → {})",
            pairs.len(),
            self.prefix,
            self.source_lang,
            self.target_lang
        );
        Ok(pairs)
    }
}

/// Read a text file into one String per line, without the line terminators.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read corpus file '{}'", path.display()))?;
    Ok(text.lines().map(str::to_string).collect())
}

/// Write pairs back out as two line-aligned files under `prefix`.
pub fn write_parallel(
    prefix:      &Path,
    source_lang: &str,
    target_lang: &str,
    pairs:       &[SentencePair],
) -> Result<()> {
    write_side(&corpus_file(prefix, source_lang), pairs.iter().map(|p| p.source.as_str()))?;
    write_side(&corpus_file(prefix, target_lang), pairs.iter().map(|p| p.target.as_str()))?;
    tracing::debug!("Wrote {} pairs to '{}'", pairs.len(), prefix.display());
    Ok(())
}

fn write_side<'a>(path: &Path, lines: impl Iterator<Item = &'a str>) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    let mut out = BufWriter::new(file);
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}
