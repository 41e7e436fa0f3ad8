// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `translate`, and all
// their flags.
//
// clap's derive macros generate:
//   - help text (--help)
//   - error messages for missing or malformed args
//   - type conversion (string → usize, f64, enums, DeviceSelector)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::data::loader::{corpus_file, DatasetKind};
use crate::infra::device::DeviceSelector;
use crate::ml::model::ModelKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a translation model on a parallel corpus
    Train(TrainArgs),

    /// Translate a file with a trained checkpoint
    Translate(TranslateArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Compute device: auto, cpu, gpu or gpu:<index>
    #[arg(long, default_value = "auto")]
    pub device: DeviceSelector,

    /// Directory for config, vocabularies, metrics and the best model
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = DatasetKind::Iwslt2014)]
    pub dataset: DatasetKind,

    /// Training corpus prefix; `<prefix>.<lang>` must exist for both languages
    /// [default: depends on --dataset]
    #[arg(long)]
    pub train_path: Option<String>,

    /// Validation corpus prefix [default: depends on --dataset]
    #[arg(long)]
    pub dev_path: Option<String>,

    #[arg(long, default_value = "de")]
    pub src_lang: String,

    #[arg(long, default_value = "en")]
    pub trg_lang: String,

    /// Train on a random sample of this many pairs, split into train/dev
    #[arg(long)]
    pub sample_size: Option<usize>,

    /// Fraction of the sample used for training
    #[arg(long, default_value_t = 0.8)]
    pub split_ratio: f64,

    #[arg(long, value_enum, default_value_t = ModelKind::Seq2seq)]
    pub model: ModelKind,

    #[arg(long, default_value_t = 256)]
    pub embed_dim: usize,

    #[arg(long, default_value_t = 512)]
    pub hidden_dim: usize,

    /// Stacked LSTM layers in both encoder and decoder
    #[arg(long, default_value_t = 2)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 0.5)]
    pub dropout: f64,

    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub n_epochs: usize,

    /// Epochs without validation improvement before stopping
    #[arg(long, default_value_t = 10)]
    pub patience: usize,

    /// Maximum global gradient L2 norm (0 disables clipping)
    #[arg(long, default_value_t = 5.0)]
    pub grad_clip: f64,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Words seen fewer times than this map to <unk>
    #[arg(long, default_value_t = 2)]
    pub min_freq: usize,

    /// Keep at most this many words per vocabulary (specials excluded)
    #[arg(long)]
    pub max_vocab: Option<usize>,

    /// Drop training pairs with more tokens than this on either side
    #[arg(long, default_value_t = 100)]
    pub max_len: usize,

    /// Log training progress every N batches
    #[arg(long, default_value_t = 100)]
    pub log_every: usize,

    /// Seed for shuffling and sampling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            device:         a.device,
            checkpoint_dir: a.checkpoint_dir,
            dataset:        a.dataset,
            train_prefix:   a.train_path.unwrap_or_else(|| a.dataset.default_train_prefix().to_string()),
            dev_prefix:     a.dev_path.unwrap_or_else(|| a.dataset.default_dev_prefix().to_string()),
            source_lang:    a.src_lang,
            target_lang:    a.trg_lang,
            sample_size:    a.sample_size,
            split_ratio:    a.split_ratio,
            model:          a.model,
            embed_dim:      a.embed_dim,
            hidden_dim:     a.hidden_dim,
            num_layers:     a.num_layers,
            dropout:        a.dropout,
            batch_size:     a.batch_size,
            epochs:         a.n_epochs,
            patience:       a.patience,
            grad_clip:      a.grad_clip,
            lr:             a.lr,
            min_freq:       a.min_freq,
            max_vocab:      a.max_vocab,
            max_len:        (a.max_len > 0).then_some(a.max_len),
            log_every:      a.log_every,
            seed:           a.seed,
        }
    }
}

/// All arguments for the `translate` command
#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Directory written by `train`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Source sentences, one per line
    /// [default: the --dataset test set in --src-lang]
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long, value_enum, default_value_t = DatasetKind::Iwslt2014)]
    pub dataset: DatasetKind,

    #[arg(long, default_value = "de")]
    pub src_lang: String,

    /// Where to write translations, one per input line
    #[arg(long, default_value = "data/output.en")]
    pub output: String,

    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    /// Longest translation, in tokens
    #[arg(long, default_value_t = 100)]
    pub max_decode_len: usize,

    #[arg(long, default_value = "auto")]
    pub device: DeviceSelector,
}

impl TranslateArgs {
    pub fn input_path(&self) -> PathBuf {
        match &self.input {
            Some(path) => PathBuf::from(path),
            None => corpus_file(self.dataset.default_test_prefix(), &self.src_lang),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn train_config(args: &[&str]) -> TrainConfig {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Train(a) => a.into(),
            other => panic!("expected train, got {other:?}"),
        }
    }

    #[test]
    fn test_dataset_picks_default_paths() {
        let cfg = train_config(&["seq2seq-nmt", "train", "--dataset", "multi30k"]);
        assert_eq!(cfg.train_prefix, "data/multi30k/train");
        assert_eq!(cfg.dev_prefix, "data/multi30k/val");
        assert_eq!(cfg.dataset, DatasetKind::Multi30k);
    }

    #[test]
    fn test_explicit_flags_override_defaults() {
        let cfg = train_config(&[
            "seq2seq-nmt", "train",
            "--model", "seq2seq-attention",
            "--train-path", "corpus/train",
            "--n-epochs", "3",
            "--device", "gpu:1",
            "--max-len", "0",
        ]);
        assert_eq!(cfg.model, ModelKind::Seq2seqAttention);
        assert_eq!(cfg.train_prefix, "corpus/train");
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.device, DeviceSelector::Gpu(1));
        assert_eq!(cfg.max_len, None);
    }

    #[test]
    fn test_translate_defaults() {
        let cli = Cli::try_parse_from(["seq2seq-nmt", "translate"]).unwrap();
        let Commands::Translate(a) = cli.command else { panic!("expected translate") };
        assert_eq!(a.output, "data/output.en");
        assert_eq!(a.input_path(), PathBuf::from("data/iwslt2014/test.de-en.bpe.de"));
        assert_eq!(a.device, DeviceSelector::Auto);
    }

    #[test]
    fn test_bad_device_is_rejected() {
        assert!(Cli::try_parse_from(["seq2seq-nmt", "train", "--device", "tpu"]).is_err());
    }
}
