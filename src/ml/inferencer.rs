// ============================================================
// Layer 5 — Inference Driver
// ============================================================
// Rebuilds the trained model from a checkpoint directory and
// translates sentences greedily:
//
//   1. model_dict.json     → Seq2SeqConfig (dropout forced to 0)
//   2. *_vocab.json        → source / target vocabularies,
//                            sizes checked against the config
//   3. model.mpk           → weights, shapes checked too
//
// Then, batch by batch and in input order:
//
//   sentence → clean → <sos> ids <eos> → pad → greedy decode
//            → cut at <eos> → tokens → "w1 w2 w3"
//
// Every input produces exactly one output line, including empty
// input lines (which decode from an empty source).

use anyhow::Result;
use burn::prelude::*;

use crate::data::{batcher::TranslationBatcher, preprocessor::Preprocessor};
use crate::domain::traits::SentenceTranslator;
use crate::infra::{checkpoint::CheckpointManager, vocab_store::Vocabulary};
use crate::ml::model::{Seq2Seq, Seq2SeqModel};

pub struct Translator<B: Backend> {
    model:          Seq2Seq<B>,
    source_vocab:   Vocabulary,
    target_vocab:   Vocabulary,
    batcher:        TranslationBatcher<B>,
    preprocessor:   Preprocessor,
    batch_size:     usize,
    max_decode_len: usize,
}

impl<B: Backend> Translator<B> {
    pub fn new(
        model:          Seq2Seq<B>,
        source_vocab:   Vocabulary,
        target_vocab:   Vocabulary,
        device:         B::Device,
        batch_size:     usize,
        max_decode_len: usize,
    ) -> Self {
        let batcher = TranslationBatcher::new(device, source_vocab.pad_id());
        Self {
            model,
            source_vocab,
            target_vocab,
            batcher,
            preprocessor: Preprocessor::new(),
            batch_size: batch_size.max(1),
            max_decode_len: max_decode_len.max(1),
        }
    }

    /// Load config, vocabularies and best weights from `ckpt`.
    ///
    /// Fails with a `CheckpointError` if anything is missing,
    /// unreadable, or does not match the rest of the checkpoint.
    pub fn from_checkpoint(
        ckpt:           &CheckpointManager,
        device:         B::Device,
        batch_size:     usize,
        max_decode_len: usize,
    ) -> Result<Self> {
        let metadata = ckpt.load_metadata()?;
        let (source_vocab, target_vocab) = ckpt.load_vocabs(&metadata)?;

        let model_cfg = metadata.model.clone().with_dropout(0.0);
        let model     = ckpt.load_model(model_cfg.init::<B>(&device), &metadata, &device)?;

        tracing::info!(
            "Loaded {:?} model from '{}' ({} source / {} target tokens)",
            model_cfg.kind,
            ckpt.dir().display(),
            source_vocab.len(),
            target_vocab.len(),
        );
        Ok(Self::new(model, source_vocab, target_vocab, device, batch_size, max_decode_len))
    }

    /// Translate every sentence, keeping input order.
    pub fn translate_sentences(&self, sentences: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(sentences.len());

        for (index, chunk) in sentences.chunks(self.batch_size).enumerate() {
            let encoded = chunk
                .iter()
                .map(|s| self.source_vocab.encode(&self.preprocessor.clean(s)))
                .collect::<Result<Vec<_>>>()?;

            let batch  = self.batcher.batch_sources(&encoded);
            let decode = self.model.forward_infer(
                batch.source_ids,
                batch.source_lengths,
                self.target_vocab.sos_id(),
                self.max_decode_len,
            );
            let rows = decode.sequences(Some(self.target_vocab.eos_id()))?;
            out.extend(rows.iter().map(|ids| self.target_vocab.detokenize(ids)));

            tracing::debug!("Translated batch {} ({} sentences)", index + 1, chunk.len());
        }

        Ok(out)
    }
}

impl<B: Backend> SentenceTranslator for Translator<B> {
    fn translate(&self, sentences: &[String]) -> Result<Vec<String>> {
        self.translate_sentences(sentences)
    }
}
