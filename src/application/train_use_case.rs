// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load the parallel corpus           (Layer 4 - data)
//   Step 2: Clean every sentence               (Layer 4 - data)
//   Step 3: Sample + split, or load dev set    (Layer 4 - data)
//   Step 4: Build source/target vocabularies   (Layer 6 - infra)
//   Step 5: Encode train / dev datasets        (Layer 4 - data)
//   Step 6: Save config, vocabs, metadata      (Layer 6 - infra)
//   Step 7: Run the training loop              (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{bail, Result};
use burn::tensor::backend::AutodiffBackend;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::TranslationDataset,
    loader::{write_parallel, DatasetKind, ParallelCorpusLoader},
    preprocessor::Preprocessor,
    splitter::{sample, split_train_val},
};
use crate::domain::{sentence_pair::SentencePair, traits::CorpusSource};
use crate::infra::{
    checkpoint::{CheckpointManager, ModelMetadata},
    device::DeviceSelector,
    vocab_store::Vocabulary,
};
use crate::ml::{
    model::{ModelKind, Seq2SeqConfig},
    policy::TrainingState,
    trainer::run_training,
    TrainBackend,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All knobs for a training run. Saved as config.json in the
// checkpoint directory so a run can be inspected later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub device:         DeviceSelector,
    pub checkpoint_dir: String,
    pub dataset:        DatasetKind,
    /// `<prefix>.<lang>` files for training
    pub train_prefix:   String,
    /// `<prefix>.<lang>` files for validation, unless sampling
    pub dev_prefix:     String,
    pub source_lang:    String,
    pub target_lang:    String,
    /// Train on a random subset of this many pairs, split into train/dev
    pub sample_size:    Option<usize>,
    pub split_ratio:    f64,
    pub model:          ModelKind,
    pub embed_dim:      usize,
    pub hidden_dim:     usize,
    pub num_layers:     usize,
    pub dropout:        f64,
    pub batch_size:     usize,
    pub epochs:         usize,
    pub patience:       usize,
    pub grad_clip:      f64,
    pub lr:             f64,
    pub min_freq:       usize,
    pub max_vocab:      Option<usize>,
    /// Training pairs with more tokens than this on either side are dropped
    pub max_len:        Option<usize>,
    pub log_every:      usize,
    pub seed:           u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let dataset = DatasetKind::Iwslt2014;
        Self {
            device:         DeviceSelector::Auto,
            checkpoint_dir: "checkpoints".to_string(),
            dataset,
            train_prefix:   dataset.default_train_prefix().to_string(),
            dev_prefix:     dataset.default_dev_prefix().to_string(),
            source_lang:    "de".to_string(),
            target_lang:    "en".to_string(),
            sample_size:    None,
            split_ratio:    0.8,
            model:          ModelKind::Seq2seq,
            embed_dim:      256,
            hidden_dim:     512,
            num_layers:     2,
            dropout:        0.5,
            batch_size:     128,
            epochs:         10,
            patience:       10,
            grad_clip:      5.0,
            lr:             1e-3,
            min_freq:       2,
            max_vocab:      None,
            max_len:        Some(100),
            log_every:      100,
            seed:           42,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train on the configured wgpu device.
    pub fn execute(&self) -> Result<TrainingState> {
        let device = self.config.device.resolve();
        tracing::info!("Using WGPU device: {:?}", device);
        self.execute_on::<TrainBackend>(device)
    }

    /// Run the whole pipeline on any autodiff backend.
    pub fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainingState> {
        let cfg = &self.config;

        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir);
        ckpt.prepare()?;
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        // ── Steps 1-3: corpus → cleaned train / dev pairs ─────────────────────
        let preprocessor = Preprocessor::new();
        let train_corpus = load_clean(&cfg.train_prefix, cfg, &preprocessor)?;

        let (train_pairs, dev_pairs) = match cfg.sample_size {
            Some(n) => {
                let sampled = sample(train_corpus, n, &mut rng);
                let (train, dev) = split_train_val(sampled, cfg.split_ratio, &mut rng);

                // Keep the exact sample next to the checkpoint for reproducibility
                let dir = ckpt.dir();
                write_parallel(&dir.join("train.sample_data"), &cfg.source_lang, &cfg.target_lang, &train)?;
                write_parallel(&dir.join("dev.sample_data"), &cfg.source_lang, &cfg.target_lang, &dev)?;
                (train, dev)
            }
            None => {
                let dev = load_clean(&cfg.dev_prefix, cfg, &preprocessor)?;
                (train_corpus, dev)
            }
        };
        tracing::info!("Split: {} train, {} validation pairs", train_pairs.len(), dev_pairs.len());

        // ── Step 4: vocabularies from the training side only ──────────────────
        let lowercase = cfg.dataset.lowercase();
        let sources: Vec<String> = train_pairs.iter().map(|p| p.source.clone()).collect();
        let targets: Vec<String> = train_pairs.iter().map(|p| p.target.clone()).collect();
        let source_vocab = Vocabulary::build(&sources, cfg.min_freq, cfg.max_vocab, lowercase)?;
        let target_vocab = Vocabulary::build(&targets, cfg.min_freq, cfg.max_vocab, lowercase)?;

        // ── Step 5: encode ────────────────────────────────────────────────────
        let train_dataset = TranslationDataset::encode(&train_pairs, &source_vocab, &target_vocab, cfg.max_len)?;
        let dev_dataset   = TranslationDataset::encode(&dev_pairs, &source_vocab, &target_vocab, None)?;
        if train_dataset.items().is_empty() {
            bail!("No training pairs left after filtering '{}'", cfg.train_prefix);
        }
        if dev_dataset.items().is_empty() {
            bail!("The validation set is empty");
        }
        tracing::info!(
            "Encoded {} train / {} validation pairs",
            train_dataset.items().len(),
            dev_dataset.items().len()
        );

        // ── Step 6: everything inference needs, written before training ───────
        let model_cfg = Seq2SeqConfig::new(
            cfg.model,
            source_vocab.len(),
            target_vocab.len(),
            target_vocab.pad_id() as usize,
            target_vocab.eos_id() as usize,
        )
        .with_embed_dim(cfg.embed_dim)
        .with_hidden_dim(cfg.hidden_dim)
        .with_num_layers(cfg.num_layers)
        .with_dropout(cfg.dropout);

        ckpt.save_config(cfg)?;
        ckpt.save_vocabs(&source_vocab, &target_vocab)?;
        ckpt.save_metadata(&ModelMetadata::new(model_cfg.clone()))?;

        // ── Step 7: training loop (Layer 5) ───────────────────────────────────
        run_training::<B>(cfg, &model_cfg, train_dataset, dev_dataset, &target_vocab, &ckpt, device)
    }
}

/// Load `<prefix>.<src>` / `<prefix>.<trg>` and clean both sides.
fn load_clean(prefix: &str, cfg: &TrainConfig, preprocessor: &Preprocessor) -> Result<Vec<SentencePair>> {
    let pairs = ParallelCorpusLoader::new(prefix, cfg.source_lang.as_str(), cfg.target_lang.as_str())
        .load_pairs()?;
    if pairs.is_empty() {
        bail!("Corpus '{prefix}' is empty");
    }
    Ok(pairs
        .iter()
        .map(|p| SentencePair::new(preprocessor.clean(&p.source), preprocessor.clean(&p.target)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_utils::TestAutodiffBackend;
    use std::{fs, path::Path};

    const DE: &[&str] = &[
        "ein hund läuft", "eine katze schläft", "der hund schläft",
        "die katze läuft", "ein mann läuft", "eine frau schläft",
    ];
    const EN: &[&str] = &[
        "a dog runs", "a cat sleeps", "the dog sleeps",
        "the cat runs", "a man runs", "a woman sleeps",
    ];

    fn write_corpus(dir: &Path, name: &str, de: &[&str], en: &[&str]) -> String {
        let prefix = dir.join(name).display().to_string();
        fs::write(format!("{prefix}.de"), de.join("\n")).unwrap();
        fs::write(format!("{prefix}.en"), en.join("\n")).unwrap();
        prefix
    }

    fn tiny_config(dir: &Path) -> TrainConfig {
        TrainConfig {
            checkpoint_dir: dir.join("ckpt").display().to_string(),
            train_prefix:   write_corpus(dir, "train", DE, EN),
            dev_prefix:     write_corpus(dir, "dev", &DE[..2], &EN[..2]),
            embed_dim:      8,
            hidden_dim:     16,
            num_layers:     1,
            dropout:        0.0,
            batch_size:     4,
            epochs:         2,
            patience:       2,
            lr:             1e-2,
            min_freq:       1,
            log_every:      1,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_training_writes_a_complete_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = tiny_config(dir.path());

        let state = TrainUseCase::new(cfg.clone())
            .execute_on::<TestAutodiffBackend>(Default::default())
            .unwrap();

        assert_eq!(state.epochs_run, 2);
        assert_eq!(state.saved_epochs.first(), Some(&1));

        let ckpt = Path::new(&cfg.checkpoint_dir);
        for file in ["config.json", "model_dict.json", "source_vocab.json", "target_vocab.json", "model.mpk", "metrics.csv"] {
            assert!(ckpt.join(file).exists(), "missing {file}");
        }
        let metrics = fs::read_to_string(ckpt.join("metrics.csv")).unwrap();
        assert_eq!(metrics.lines().count(), 3);
    }

    #[test]
    fn test_sampling_writes_the_split_next_to_the_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig { sample_size: Some(4), split_ratio: 0.5, epochs: 1, ..tiny_config(dir.path()) };

        TrainUseCase::new(cfg.clone())
            .execute_on::<TestAutodiffBackend>(Default::default())
            .unwrap();

        let ckpt  = Path::new(&cfg.checkpoint_dir);
        let train = fs::read_to_string(ckpt.join("train.sample_data.de")).unwrap();
        let dev   = fs::read_to_string(ckpt.join("dev.sample_data.en")).unwrap();
        assert_eq!(train.lines().count(), 2);
        assert_eq!(dev.lines().count(), 2);
    }

    #[test]
    fn test_misaligned_corpus_fails_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(dir.path());
        cfg.train_prefix = write_corpus(dir.path(), "broken", DE, &EN[..3]);

        let err = TrainUseCase::new(cfg.clone())
            .execute_on::<TestAutodiffBackend>(Default::default())
            .unwrap_err();
        assert!(err.to_string().contains("misaligned"));
        assert!(!Path::new(&cfg.checkpoint_dir).join("model.mpk").exists());
    }
}
