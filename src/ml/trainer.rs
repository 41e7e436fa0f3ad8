// ============================================================
// Layer 5 — Training Loop
// ============================================================
// One epoch, per batch:
//
//   logits = model.forward_train(src, src_len, trg, trg_len)
//   loss   = Σ CE(logits[:, 1:], trg[:, 1:])   (padding ignored)
//   grads  = loss.backward()                   (fresh every step)
//   grads  = clip_global_norm(grads, grad_clip)
//   model  = adam.step(lr, model, grads)
//
// Validation runs the same loss on model.valid(): the inner
// backend, so no autodiff graph is built and dropout is off.
//
// Key Burn points:
//   - Training batches live on B (Autodiff<Wgpu>)
//   - Validation batches must live on B::InnerBackend (Wgpu)
//   - optim.step consumes the model and returns the updated one
//
// The epoch loop itself (best loss, patience, stopping) is in
// policy.rs; this file supplies the EpochDriver that trains,
// validates, logs and writes checkpoints.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{bail, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{sync::Arc, time::Instant};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{TranslationBatch, TranslationBatcher},
    dataset::TranslationDataset,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
    vocab_store::Vocabulary,
};
use crate::ml::{
    clip::{clip_grad_norm, global_grad_norm},
    loss::sequence_loss,
    model::{Seq2Seq, Seq2SeqConfig, Seq2SeqModel},
    policy::{fit, EpochDriver, Schedule, TrainingState, Verdict},
};

/// Ground-truth / prediction pairs printed after each validation
const SAMPLES_TO_LOG: usize = 3;

// ─── Epoch statistics ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochStats {
    /// Summed cross-entropy over every scored token
    pub loss_sum:  f64,
    /// Sum of target lengths
    pub tokens:    usize,
    pub sequences: usize,
    pub batches:   usize,
}

impl EpochStats {
    pub fn add(&mut self, loss: f64, tokens: usize, sequences: usize) {
        self.loss_sum  += loss;
        self.tokens    += tokens;
        self.sequences += sequences;
        self.batches   += 1;
    }

    pub fn avg_token_loss(&self) -> f64 {
        per(self.loss_sum, self.tokens)
    }

    pub fn avg_sequence_loss(&self) -> f64 {
        per(self.loss_sum, self.sequences)
    }

    pub fn avg_batch_loss(&self) -> f64 {
        per(self.loss_sum, self.batches)
    }
}

fn per(total: f64, count: usize) -> f64 {
    if count == 0 { f64::NAN } else { total / count as f64 }
}

/// Knobs every optimisation step needs.
#[derive(Debug, Clone, Copy)]
pub struct StepSettings {
    pub lr:        f64,
    /// Global gradient-norm ceiling; 0 disables clipping
    pub grad_clip: f64,
    pub pad_id:    usize,
    /// Log progress every this many batches
    pub log_every: usize,
}

// ─── One epoch ────────────────────────────────────────────────────────────────
/// Train `model` on every batch once. Returns the updated model.
pub fn train_epoch<B, M, O, I>(
    mut model: M,
    optim:     &mut O,
    batches:   I,
    settings:  &StepSettings,
    epoch:     usize,
) -> Result<(M, EpochStats)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Seq2SeqModel<B>,
    O: Optimizer<M, B>,
    I: IntoIterator<Item = TranslationBatch<B>>,
{
    let mut stats   = EpochStats::default();
    let mut batches = batches.into_iter().peekable();

    while let Some(batch) = batches.next() {
        let tokens    = batch.target_tokens;
        let sequences = batch.batch_size();
        let targets   = batch.target_ids.clone();

        let logits = model.forward_train(
            batch.source_ids, batch.source_lengths, batch.target_ids, batch.target_lengths,
        );
        let loss       = sequence_loss(logits, targets, settings.pad_id);
        let loss_value = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let (grads, grad_norm) = if settings.grad_clip > 0.0 {
            clip_grad_norm::<B, M>(&model, grads, settings.grad_clip)
        } else {
            let norm = global_grad_norm::<B, M>(&model, &grads);
            (grads, norm)
        };
        model = optim.step(settings.lr, model, grads);

        stats.add(loss_value, tokens, sequences);

        let last = batches.peek().is_none();
        if stats.batches == 1 || last || stats.batches % settings.log_every.max(1) == 0 {
            tracing::info!(
                "Epoch {} batch {:>5} | loss/token={:.4} | loss/sentence={:.4} | grad_norm={:.3}",
                epoch,
                stats.batches,
                per(loss_value, tokens),
                per(loss_value, sequences),
                grad_norm,
            );
        }
    }

    if stats.batches == 0 {
        bail!("Epoch {epoch}: the training set produced no batches");
    }
    Ok((model, stats))
}

/// Score `model` on held-out batches without touching its weights.
pub fn validate<B, M, I>(model: &M, batches: I, pad_id: usize) -> Result<EpochStats>
where
    B: Backend,
    M: Seq2SeqModel<B>,
    I: IntoIterator<Item = TranslationBatch<B>>,
{
    score_batches(model, batches, pad_id, |_, _| {})
}

/// [`validate`], also returning one batch picked uniformly at random
/// by reservoir sampling, so sample translations need no second pass.
pub fn validate_sampled<B, M, I, R>(
    model:   &M,
    batches: I,
    pad_id:  usize,
    rng:     &mut R,
) -> Result<(EpochStats, Option<TranslationBatch<B>>)>
where
    B: Backend,
    M: Seq2SeqModel<B>,
    I: IntoIterator<Item = TranslationBatch<B>>,
    R: Rng,
{
    let mut picked = None;
    let stats = score_batches(model, batches, pad_id, |index, batch| {
        if rng.gen_range(0..=index) == 0 {
            picked = Some(batch.clone());
        }
    })?;
    Ok((stats, picked))
}

fn score_batches<B, M, I, F>(model: &M, batches: I, pad_id: usize, mut on_batch: F) -> Result<EpochStats>
where
    B: Backend,
    M: Seq2SeqModel<B>,
    I: IntoIterator<Item = TranslationBatch<B>>,
    F: FnMut(usize, &TranslationBatch<B>),
{
    let mut stats = EpochStats::default();

    for batch in batches {
        on_batch(stats.batches, &batch);

        let tokens    = batch.target_tokens;
        let sequences = batch.batch_size();
        let targets   = batch.target_ids.clone();

        let logits = model.forward_train(
            batch.source_ids, batch.source_lengths, batch.target_ids, batch.target_lengths,
        );
        let loss: f64 = sequence_loss(logits, targets, pad_id).into_scalar().elem::<f64>();
        stats.add(loss, tokens, sequences);
    }

    if stats.batches == 0 {
        bail!("The validation set produced no batches");
    }
    Ok(stats)
}

/// Copy a `[rows, cols]` id tensor to the host, one Vec per row.
fn host_rows<B: Backend>(ids: Tensor<B, 2, Int>) -> Result<Vec<Vec<u32>>> {
    let [rows, cols] = ids.dims();
    let flat = ids
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow::anyhow!("Cannot read target ids: {e:?}"))?;
    Ok(flat.chunks(cols.max(1)).take(rows).map(|r| r.iter().map(|&id| id as u32).collect()).collect())
}

// ─── Full run ─────────────────────────────────────────────────────────────────
struct EpochReport {
    train:   EpochStats,
    valid:   EpochStats,
    started: Instant,
}

/// Owns everything one training run mutates between epochs.
struct TrainingRun<'a, B: AutodiffBackend, O> {
    model:        Seq2Seq<B>,
    optim:        O,
    train_loader: Arc<dyn DataLoader<TranslationBatch<B>>>,
    valid_loader: Arc<dyn DataLoader<TranslationBatch<B::InnerBackend>>>,
    settings:     StepSettings,
    epochs:       usize,
    checkpoints:  &'a CheckpointManager,
    metrics:      MetricsLogger,
    target_vocab: &'a Vocabulary,
    rng:          StdRng,
    last:         Option<EpochReport>,
}

impl<B, O> TrainingRun<'_, B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Seq2Seq<B>, B>,
{
    /// Greedily decode `batch` and log a few reference / prediction pairs.
    fn log_samples(&self, model: &Seq2Seq<B::InnerBackend>, batch: TranslationBatch<B::InnerBackend>) -> Result<()> {
        let [_, target_len] = batch.target_ids.dims();
        let predicted = model
            .forward_infer(
                batch.source_ids,
                batch.source_lengths,
                self.target_vocab.sos_id(),
                target_len.saturating_sub(1).max(1),
            )
            .sequences(Some(self.target_vocab.eos_id()))?;
        let truth = host_rows(batch.target_ids)?;

        for (expected, got) in truth.iter().zip(&predicted).take(SAMPLES_TO_LOG) {
            tracing::info!("  reference:  {}", self.target_vocab.detokenize(expected));
            tracing::info!("  prediction: {}", self.target_vocab.detokenize(got));
        }
        Ok(())
    }
}

impl<B, O> EpochDriver for TrainingRun<'_, B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Seq2Seq<B>, B>,
{
    fn run_epoch(&mut self, epoch: usize) -> Result<f64> {
        let started = Instant::now();

        let (model, train) = train_epoch(
            self.model.clone(),
            &mut self.optim,
            self.train_loader.iter(),
            &self.settings,
            epoch,
        )?;
        self.model = model;

        // model.valid() → Seq2Seq<B::InnerBackend>, dropout disabled
        let model_valid = self.model.valid();
        let (valid, sample) =
            validate_sampled(&model_valid, self.valid_loader.iter(), self.settings.pad_id, &mut self.rng)?;
        if let Some(batch) = sample {
            self.log_samples(&model_valid, batch)?;
        }

        self.last = Some(EpochReport { train, valid, started });
        Ok(valid.loss_sum)
    }

    fn persist_best(&mut self, _epoch: usize) -> Result<()> {
        self.checkpoints.save_model(&self.model.valid())
    }

    fn after_epoch(&mut self, epoch: usize, verdict: Verdict, state: &TrainingState) -> Result<()> {
        let Some(report) = self.last.take() else {
            return Ok(());
        };
        let seconds = report.started.elapsed().as_secs_f64();

        self.metrics.log(&EpochMetrics {
            epoch,
            train_token_loss:    report.train.avg_token_loss(),
            train_sequence_loss: report.train.avg_sequence_loss(),
            train_batch_loss:    report.train.avg_batch_loss(),
            val_token_loss:      report.valid.avg_token_loss(),
            val_sequence_loss:   report.valid.avg_sequence_loss(),
            val_batch_loss:      report.valid.avg_batch_loss(),
            val_total_loss:      report.valid.loss_sum,
            improved:            verdict == Verdict::Improved,
            patience:            state.patience,
            seconds,
        })?;

        println!(
            "Epoch {:>3}/{} | {:>6.1}s | train loss/token={:.4} loss/batch={:.2} | \
             val loss/token={:.4} loss/batch={:.2} | val total={:.2} | best={:.2} (epoch {}) | patience={}",
            epoch,
            self.epochs,
            seconds,
            report.train.avg_token_loss(),
            report.train.avg_batch_loss(),
            report.valid.avg_token_loss(),
            report.valid.avg_batch_loss(),
            report.valid.loss_sum,
            state.best_val_loss,
            state.best_epoch.map_or_else(|| "-".to_string(), |e| e.to_string()),
            state.patience,
        );
        Ok(())
    }
}

/// Train a fresh model until the epochs run out or patience is exhausted.
/// The best model ends up in the checkpoint directory.
pub fn run_training<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    model_cfg:     &Seq2SeqConfig,
    train_dataset: TranslationDataset,
    valid_dataset: TranslationDataset,
    target_vocab:  &Vocabulary,
    checkpoints:   &CheckpointManager,
    device:        B::Device,
) -> Result<TrainingState> {
    let model: Seq2Seq<B> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: {:?}, {} layers, hidden={}, {} parameters",
        model_cfg.kind,
        model_cfg.num_layers,
        model_cfg.hidden_dim,
        model.num_params(),
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let optim = AdamConfig::new().with_epsilon(1e-8).init::<B, Seq2Seq<B>>();

    let pad_id     = model_cfg.pad_id;
    let batch_size = cfg.batch_size.max(1);

    // ── Training data loader (AutodiffBackend, shuffled) ──────────────────────
    let train_loader = DataLoaderBuilder::new(TranslationBatcher::<B>::new(device.clone(), pad_id as u32))
        .batch_size(batch_size)
        .shuffle(cfg.seed)
        .build(train_dataset);

    // ── Validation data loader (InnerBackend, corpus order) ───────────────────
    let valid_loader =
        DataLoaderBuilder::new(TranslationBatcher::<B::InnerBackend>::new(device.clone(), pad_id as u32))
            .batch_size(batch_size)
            .build(valid_dataset);

    let mut run = TrainingRun {
        model,
        optim,
        train_loader,
        valid_loader,
        settings: StepSettings {
            lr:        cfg.lr,
            grad_clip: cfg.grad_clip,
            pad_id,
            log_every: cfg.log_every,
        },
        epochs: cfg.epochs,
        checkpoints,
        metrics: MetricsLogger::new(checkpoints.dir())?,
        target_vocab,
        rng: StdRng::seed_from_u64(cfg.seed),
        last: None,
    };

    let schedule = Schedule { epochs: cfg.epochs, patience: cfg.patience };
    let state    = fit(&mut run, schedule, TrainingState::new())?;

    tracing::info!(
        "Training complete: {} epochs, best validation loss {:.4} at epoch {:?}",
        state.epochs_run, state.best_val_loss, state.best_epoch
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{
        model::ModelKind,
        test_utils::{tiny_batch, tiny_config, TestAutodiffBackend, TestBackend},
    };

    fn settings() -> StepSettings {
        StepSettings { lr: 1.0e-2, grad_clip: 5.0, pad_id: 1, log_every: 10 }
    }

    #[test]
    fn test_averages_divide_the_same_sum() {
        let mut stats = EpochStats::default();
        stats.add(12.0, 6, 2);
        stats.add(8.0, 4, 2);
        assert_eq!(stats.batches, 2);
        assert!((stats.avg_token_loss() - 2.0).abs() < 1e-12);
        assert!((stats.avg_sequence_loss() - 5.0).abs() < 1e-12);
        assert!((stats.avg_batch_loss() - 10.0).abs() < 1e-12);
        assert!(EpochStats::default().avg_token_loss().is_nan());
    }

    #[test]
    fn test_epoch_counts_tokens_and_sentences() {
        let device    = Default::default();
        let model     = tiny_config(ModelKind::Seq2seq).init::<TestAutodiffBackend>(&device);
        let mut optim = AdamConfig::new().init::<TestAutodiffBackend, Seq2Seq<TestAutodiffBackend>>();
        let batches   = vec![tiny_batch::<TestAutodiffBackend>(&device); 3];

        let (_, stats) = train_epoch(model, &mut optim, batches, &settings(), 1).unwrap();
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.sequences, 6);
        // target lengths 4 and 5 per batch
        assert_eq!(stats.tokens, 27);
        assert!(stats.loss_sum.is_finite() && stats.loss_sum > 0.0);
    }

    #[test]
    fn test_repeated_epochs_lower_validation_loss() {
        TestAutodiffBackend::seed(7);
        let device    = Default::default();
        let mut model = tiny_config(ModelKind::Seq2seqAttention).init::<TestAutodiffBackend>(&device);
        let mut optim = AdamConfig::new().init::<TestAutodiffBackend, Seq2Seq<TestAutodiffBackend>>();
        let steady    = StepSettings { lr: 1.0e-3, ..settings() };

        let held_out = || vec![tiny_batch::<TestBackend>(&device)];
        let before   = validate(&model.valid(), held_out(), 1).unwrap();

        for epoch in 1..=60 {
            let batches = vec![tiny_batch::<TestAutodiffBackend>(&device)];
            model = train_epoch(model, &mut optim, batches, &steady, epoch).unwrap().0;
        }
        let after = validate(&model.valid(), held_out(), 1).unwrap();

        assert!(
            after.loss_sum < before.loss_sum * 0.95,
            "loss went from {} to {}", before.loss_sum, after.loss_sum
        );
    }

    #[test]
    fn test_validation_leaves_model_unchanged() {
        let device = Default::default();
        let model  = tiny_config(ModelKind::Seq2seq).init::<TestBackend>(&device);

        let a = validate(&model, vec![tiny_batch::<TestBackend>(&device)], 1).unwrap();
        let b = validate(&model, vec![tiny_batch::<TestBackend>(&device)], 1).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.tokens, 9);
    }

    #[test]
    fn test_sampled_validation_scores_like_validate() {
        let device = Default::default();
        let model  = tiny_config(ModelKind::Seq2seq).init::<TestBackend>(&device);
        let held_out = || vec![tiny_batch::<TestBackend>(&device); 4];
        let mut rng  = StdRng::seed_from_u64(3);

        let plain            = validate(&model, held_out(), 1).unwrap();
        let (stats, sample)  = validate_sampled(&model, held_out(), 1, &mut rng).unwrap();

        assert_eq!(stats, plain);
        assert_eq!(stats.batches, 4);
        assert_eq!(sample.unwrap().batch_size(), 2);
    }

    #[test]
    fn test_reservoir_pick_reaches_every_batch() {
        let device = Default::default();
        let model  = tiny_config(ModelKind::Seq2seq).init::<TestBackend>(&device);
        let mut rng  = StdRng::seed_from_u64(11);
        let mut seen = std::collections::HashSet::new();

        // Batches told apart by their token count: 9, 18 and 27 target tokens
        for _ in 0..40 {
            let batches: Vec<_> = (1..=3)
                .map(|copies| {
                    let mut batch = tiny_batch::<TestBackend>(&device);
                    batch.target_tokens *= copies;
                    batch
                })
                .collect();
            let (_, sample) = validate_sampled(&model, batches, 1, &mut rng).unwrap();
            seen.insert(sample.unwrap().target_tokens);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_empty_batch_source_is_an_error() {
        let device    = Default::default();
        let model     = tiny_config(ModelKind::Seq2seq).init::<TestAutodiffBackend>(&device);
        let mut optim = AdamConfig::new().init::<TestAutodiffBackend, Seq2Seq<TestAutodiffBackend>>();

        let none: Vec<TranslationBatch<TestAutodiffBackend>> = Vec::new();
        assert!(train_epoch(model.clone(), &mut optim, none, &settings(), 1).is_err());
        assert!(validate(&model.valid(), Vec::<TranslationBatch<TestBackend>>::new(), 1).is_err());
    }

    #[test]
    fn test_host_rows_splits_by_row() {
        let ids = Tensor::<TestBackend, 1, Int>::from_ints([2, 5, 3, 2, 6, 1].as_slice(), &Default::default())
            .reshape([2, 3]);
        assert_eq!(host_rows(ids).unwrap(), vec![vec![2, 5, 3], vec![2, 6, 1]]);
    }
}
