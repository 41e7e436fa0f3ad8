// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// One checkpoint directory per training run:
//
//   checkpoints/
//     config.json          ← full TrainConfig of the run
//     model_dict.json      ← ModelMetadata: architecture + vocab files
//     source_vocab.json    ← source Vocabulary (WordLevel tokenizer)
//     target_vocab.json    ← target Vocabulary
//     model.mpk            ← best weights so far (DefaultRecorder)
//     metrics.csv          ← written by MetricsLogger
//
// Metadata, vocabularies and config are written once before
// training starts. model.mpk is overwritten every time the
// validation loss improves, so it always holds the best model.
//
// DefaultRecorder stores full-precision MessagePack, so weights
// reload bit-for-bit and a reloaded model decodes exactly like
// the one that was saved.
//
// Loading surfaces typed CheckpointError values: a missing file,
// an unreadable file, or parts that do not fit together.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use burn::{
    module::{ModuleVisitor, ParamId},
    prelude::*,
    record::{DefaultRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::application::train_use_case::TrainConfig;
use crate::domain::traits::Persistable;
use crate::infra::vocab_store::Vocabulary;
use crate::ml::model::{ModelKind, Seq2Seq, Seq2SeqConfig, Seq2SeqRecord};

const CONFIG_FILE:       &str = "config.json";
const METADATA_FILE:     &str = "model_dict.json";
const SOURCE_VOCAB_FILE: &str = "source_vocab.json";
const TARGET_VOCAB_FILE: &str = "target_vocab.json";
/// The recorder appends the `.mpk` extension itself.
const MODEL_STEM:        &str = "model";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint file '{}' does not exist; run `train` first", path.display())]
    Missing { path: PathBuf },

    #[error("checkpoint file '{}' cannot be read: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("checkpoint is inconsistent: {0}")]
    Incompatible(String),
}

/// What inference needs to rebuild the network before loading weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model:             Seq2SeqConfig,
    pub source_vocab_file: String,
    pub target_vocab_file: String,
}

impl ModelMetadata {
    pub fn new(model: Seq2SeqConfig) -> Self {
        Self {
            model,
            source_vocab_file: SOURCE_VOCAB_FILE.to_string(),
            target_vocab_file: TARGET_VOCAB_FILE.to_string(),
        }
    }
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the directory (and parents) if needed.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", self.dir.display()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_STEM).with_extension("mpk")
    }

    // ── Config ───────────────────────────────────────────────────────────────
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    // ── Metadata ─────────────────────────────────────────────────────────────
    pub fn save_metadata(&self, metadata: &ModelMetadata) -> Result<()> {
        let path = self.dir.join(METADATA_FILE);
        fs::write(&path, serde_json::to_string_pretty(metadata)?)
            .with_context(|| format!("Cannot write model metadata to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_metadata(&self) -> Result<ModelMetadata, CheckpointError> {
        read_json(&self.dir.join(METADATA_FILE))
    }

    // ── Vocabularies ─────────────────────────────────────────────────────────
    pub fn save_vocabs(&self, source: &Vocabulary, target: &Vocabulary) -> Result<()> {
        source.save(&self.dir.join(SOURCE_VOCAB_FILE))?;
        target.save(&self.dir.join(TARGET_VOCAB_FILE))?;
        Ok(())
    }

    /// Load both vocabularies named by `metadata` and check them against it.
    pub fn load_vocabs(
        &self,
        metadata: &ModelMetadata,
    ) -> Result<(Vocabulary, Vocabulary), CheckpointError> {
        let source = load_vocab(&self.dir.join(&metadata.source_vocab_file))?;
        let target = load_vocab(&self.dir.join(&metadata.target_vocab_file))?;

        let model = &metadata.model;
        if source.len() != model.input_dim {
            return Err(CheckpointError::Incompatible(format!(
                "source vocabulary has {} entries but the model expects {}",
                source.len(), model.input_dim
            )));
        }
        if target.len() != model.output_dim {
            return Err(CheckpointError::Incompatible(format!(
                "target vocabulary has {} entries but the model expects {}",
                target.len(), model.output_dim
            )));
        }
        if target.pad_id() as usize != model.pad_id || target.eos_id() as usize != model.eos_id {
            return Err(CheckpointError::Incompatible(format!(
                "target vocabulary special ids (pad={}, eos={}) differ from the model's (pad={}, eos={})",
                target.pad_id(), target.eos_id(), model.pad_id, model.eos_id
            )));
        }
        Ok((source, target))
    }

    // ── Weights ──────────────────────────────────────────────────────────────
    /// Overwrite model.mpk with the given weights.
    pub fn save_model<B: Backend>(&self, model: &Seq2Seq<B>) -> Result<()> {
        let path = self.dir.join(MODEL_STEM);
        DefaultRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save model to '{}'", path.display()))?;
        tracing::debug!("Saved model weights to '{}'", self.model_path().display());
        Ok(())
    }

    /// Load model.mpk into `model`. The record's layer counts, attention
    /// block and every parameter shape must match the model built from
    /// `metadata`, otherwise nothing is returned.
    pub fn load_model<B: Backend>(
        &self,
        model:    Seq2Seq<B>,
        metadata: &ModelMetadata,
        device:   &B::Device,
    ) -> Result<Seq2Seq<B>, CheckpointError> {
        let file = self.model_path();
        if !file.exists() {
            return Err(CheckpointError::Missing { path: file });
        }

        let record: Seq2SeqRecord<B> = DefaultRecorder::new()
            .load(self.dir.join(MODEL_STEM), device)
            .map_err(|e| CheckpointError::Corrupt { path: file.clone(), reason: format!("{e:?}") })?;

        check_layout(&record, &metadata.model)
            .map_err(|reason| CheckpointError::Incompatible(format!("'{}': {reason}", file.display())))?;

        let expected = ParamShapes::of(&model);
        let model    = model.load_record(record);
        let found    = ParamShapes::of(&model);

        if let Some((index, want, got)) = expected.first_difference(&found) {
            return Err(CheckpointError::Incompatible(format!(
                "'{}': parameter #{index} has shape {got:?}, the {:?} model in the metadata needs {want:?}",
                file.display(), metadata.model.kind
            )));
        }
        Ok(model)
    }
}

// ─── Weight checks ────────────────────────────────────────────────────────────
/// Structural checks that must pass before `load_record`: burn panics on a
/// layer-count mismatch and silently drops an unexpected attention block.
fn check_layout<B: Backend>(record: &Seq2SeqRecord<B>, config: &Seq2SeqConfig) -> Result<(), String> {
    let layers = config.num_layers.max(1);
    if record.encoder.len() != layers || record.decoder.len() != layers {
        return Err(format!(
            "weights have {} encoder / {} decoder layers, metadata says {layers}",
            record.encoder.len(), record.decoder.len()
        ));
    }

    let wants_attention = config.kind == ModelKind::Seq2seqAttention;
    if record.attention.is_some() != wants_attention {
        return Err(format!(
            "weights {} an attention block but the metadata model is {:?}",
            if record.attention.is_some() { "contain" } else { "lack" },
            config.kind
        ));
    }

    let [source_rows, _] = record.source_embedding.weight.val().dims();
    let [_, target_cols] = record.projection.weight.val().dims();
    if (source_rows, target_cols) != (config.input_dim, config.output_dim) {
        return Err(format!(
            "weights have vocabulary sizes {:?}, metadata says {:?}",
            (source_rows, target_cols), (config.input_dim, config.output_dim)
        ));
    }
    Ok(())
}

/// Shapes of every float parameter, in visiting order.
#[derive(Debug, PartialEq)]
struct ParamShapes(Vec<Vec<usize>>);

impl ParamShapes {
    fn of<B: Backend>(model: &Seq2Seq<B>) -> Self {
        let mut shapes = Self(Vec::new());
        model.visit(&mut shapes);
        shapes
    }

    fn first_difference(&self, other: &Self) -> Option<(usize, Vec<usize>, Vec<usize>)> {
        let longest = self.0.len().max(other.0.len());
        (0..longest).find_map(|i| {
            let want = self.0.get(i).cloned().unwrap_or_default();
            let got  = other.0.get(i).cloned().unwrap_or_default();
            (want != got).then_some((i, want, got))
        })
    }
}

impl<B: Backend> ModuleVisitor<B> for ParamShapes {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.0.push(tensor.dims().to_vec());
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CheckpointError> {
    if !path.exists() {
        return Err(CheckpointError::Missing { path: path.to_path_buf() });
    }
    let text = fs::read_to_string(path)
        .map_err(|e| CheckpointError::Corrupt { path: path.to_path_buf(), reason: e.to_string() })?;
    serde_json::from_str(&text)
        .map_err(|e| CheckpointError::Corrupt { path: path.to_path_buf(), reason: e.to_string() })
}

fn load_vocab(path: &Path) -> Result<Vocabulary, CheckpointError> {
    if !path.exists() {
        return Err(CheckpointError::Missing { path: path.to_path_buf() });
    }
    Vocabulary::load(path)
        .map_err(|e| CheckpointError::Corrupt { path: path.to_path_buf(), reason: e.to_string() })
}
