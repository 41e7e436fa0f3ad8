// ============================================================
// Layer 4 — Translation Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<TranslationItem>
// into padded tensors.
//
// Unlike fixed-length classification inputs, sentences differ
// in length, so padding happens here, per batch:
//
//   items:   [sos 5 9 eos] [sos 7 eos]
//   ids:     [[2, 5, 9, 3],
//             [2, 7, 3, 1]]        ← 1 = <pad>, trailing only
//   lengths: [4, 3]
//
// Every row is left-aligned and the true length of each row is
// carried next to the ids, because the encoder must stop
// updating its state at the real end of each sentence.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::TranslationItem;

// ─── Batches ──────────────────────────────────────────────────────────────────
/// Aligned source/target tensors for one training or validation step.
#[derive(Debug, Clone)]
pub struct TranslationBatch<B: Backend> {
    /// [batch_size, max_source_len]
    pub source_ids: Tensor<B, 2, Int>,

    /// [batch_size] true source lengths, sos/eos included
    pub source_lengths: Tensor<B, 1, Int>,

    /// [batch_size, max_target_len], each row starts with <sos>
    pub target_ids: Tensor<B, 2, Int>,

    /// [batch_size] true target lengths
    pub target_lengths: Tensor<B, 1, Int>,

    /// Sum of target lengths, kept on the host for loss statistics
    pub target_tokens: usize,

    /// Target lengths on the host
    pub target_lengths_host: Vec<usize>,
}

impl<B: Backend> TranslationBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.target_lengths_host.len()
    }
}

/// Source-only tensors, used at inference time.
#[derive(Debug, Clone)]
pub struct SourceBatch<B: Backend> {
    pub source_ids:     Tensor<B, 2, Int>,
    pub source_lengths: Tensor<B, 1, Int>,
}

// ─── TranslationBatcher ───────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct TranslationBatcher<B: Backend> {
    pub device: B::Device,
    pad_id:     u32,
}

impl<B: Backend> TranslationBatcher<B> {
    pub fn new(device: B::Device, pad_id: u32) -> Self {
        Self { device, pad_id }
    }

    /// Pad source sequences only.
    pub fn batch_sources(&self, sources: &[Vec<u32>]) -> SourceBatch<B> {
        let rows: Vec<&[u32]> = sources.iter().map(Vec::as_slice).collect();
        let (source_ids, source_lengths, _) = self.pad(&rows);
        SourceBatch { source_ids, source_lengths }
    }

    /// Right-pad `rows` to the longest one.
    /// Returns ([rows, max_len] ids, [rows] lengths, host lengths).
    fn pad(&self, rows: &[&[u32]]) -> (Tensor<B, 2, Int>, Tensor<B, 1, Int>, Vec<usize>) {
        let batch_size = rows.len();
        let max_len    = rows.iter().map(|r| r.len()).max().unwrap_or(0);

        let mut flat: Vec<i32> = Vec::with_capacity(batch_size * max_len);
        for row in rows {
            flat.extend(row.iter().map(|&id| id as i32));
            flat.extend(std::iter::repeat(self.pad_id as i32).take(max_len - row.len()));
        }
        let lengths: Vec<usize> = rows.iter().map(|r| r.len()).collect();
        let lengths_i32: Vec<i32> = lengths.iter().map(|&l| l as i32).collect();

        let ids = Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([batch_size, max_len]);
        let lens = Tensor::<B, 1, Int>::from_ints(lengths_i32.as_slice(), &self.device);

        (ids, lens, lengths)
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
impl<B: Backend> Batcher<TranslationItem, TranslationBatch<B>> for TranslationBatcher<B> {
    fn batch(&self, items: Vec<TranslationItem>) -> TranslationBatch<B> {
        let sources: Vec<&[u32]> = items.iter().map(|i| i.source.as_slice()).collect();
        let targets: Vec<&[u32]> = items.iter().map(|i| i.target.as_slice()).collect();

        let (source_ids, source_lengths, _) = self.pad(&sources);
        let (target_ids, target_lengths, target_lengths_host) = self.pad(&targets);

        TranslationBatch {
            source_ids,
            source_lengths,
            target_ids,
            target_lengths,
            target_tokens: target_lengths_host.iter().sum(),
            target_lengths_host,
        }
    }
}
