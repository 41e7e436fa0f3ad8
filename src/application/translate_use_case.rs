// ============================================================
// Layer 2 — Translate Use Case
// ============================================================
// Loads the best checkpoint and translates a file line by line:
//
//   input file  ──► SentenceTranslator ──► output file
//   N lines                                N lines, same order
//
// The production translator is the checkpoint-backed Translator
// from Layer 5; the workflow only sees the domain trait.

use anyhow::{bail, Context, Result};
use burn::prelude::*;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use crate::data::loader::read_lines;
use crate::domain::traits::SentenceTranslator;
use crate::infra::{checkpoint::CheckpointManager, device::DeviceSelector};
use crate::ml::{inferencer::Translator, InferBackend};

pub struct TranslateUseCase<T: SentenceTranslator> {
    translator: T,
}

impl TranslateUseCase<Translator<InferBackend>> {
    pub fn new(
        checkpoint_dir: &str,
        device:         DeviceSelector,
        batch_size:     usize,
        max_decode_len: usize,
    ) -> Result<Self> {
        let device = device.resolve();
        tracing::info!("Using WGPU device: {:?}", device);
        Self::on_device(checkpoint_dir, device, batch_size, max_decode_len)
    }
}

impl<B: Backend> TranslateUseCase<Translator<B>> {
    pub fn on_device(
        checkpoint_dir: &str,
        device:         B::Device,
        batch_size:     usize,
        max_decode_len: usize,
    ) -> Result<Self> {
        let ckpt       = CheckpointManager::new(checkpoint_dir);
        let translator = Translator::from_checkpoint(&ckpt, device, batch_size, max_decode_len)
            .with_context(|| format!("Cannot load a model from '{checkpoint_dir}'"))?;
        Ok(Self::with_translator(translator))
    }
}

impl<T: SentenceTranslator> TranslateUseCase<T> {
    pub fn with_translator(translator: T) -> Self {
        Self { translator }
    }

    /// Translate every line of `input` into `output`. Returns the line count.
    pub fn run(&self, input: &Path, output: &Path) -> Result<usize> {
        let sentences = read_lines(input)?;
        tracing::info!("Translating {} sentences from '{}'", sentences.len(), input.display());

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(output)
            .with_context(|| format!("Cannot create output file '{}'", output.display()))?;
        let mut sink = BufWriter::new(file);

        let written = write_translations(&self.translator, &sentences, &mut sink)?;
        tracing::info!("Wrote {} translations to '{}'", written, output.display());
        Ok(written)
    }
}

/// Write one newline-terminated line per input sentence.
fn write_translations<T, W>(translator: &T, sentences: &[String], sink: &mut W) -> Result<usize>
where
    T: SentenceTranslator,
    W: Write,
{
    let translations = translator.translate(sentences)?;
    if translations.len() != sentences.len() {
        bail!(
            "Translator returned {} lines for {} inputs",
            translations.len(), sentences.len()
        );
    }
    for line in &translations {
        writeln!(sink, "{line}")?;
    }
    sink.flush()?;
    Ok(translations.len())
}
