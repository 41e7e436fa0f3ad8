// ============================================================
// Layer 5 — Sequence Loss
// ============================================================
// Token-level cross-entropy, summed (not averaged) over every
// non-padding target position in the batch.
//
//   loss = - Σ_{b,t : target[b,t] ≠ pad} log softmax(logits[b,t])[target[b,t]]
//
// Summing keeps the per-batch value proportional to the number
// of real tokens, so the epoch statistics can divide by tokens
// or by sentences afterwards without re-weighting.
//
// The decoder's first output position only ever sees <sos> and
// is never trained, so both the logits and the targets drop
// position 0 before scoring.

use burn::{prelude::*, tensor::activation::log_softmax};

/// Summed cross-entropy over positions where `targets != pad_id`.
///
/// logits: [batch, len, vocab], targets: [batch, len] → [1]
pub fn masked_cross_entropy<B: Backend>(
    logits:  Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    pad_id:  usize,
) -> Tensor<B, 1> {
    let [batch, len, _] = logits.dims();

    let log_probs = log_softmax(logits, 2);
    let picked    = log_probs
        .gather(2, targets.clone().unsqueeze_dim::<3>(2))
        .reshape([batch, len]);

    let mask = targets.equal_elem(pad_id as i32).bool_not().float();
    (picked * mask).sum().neg()
}

/// Loss for a teacher-forced pass: skips decoder position 0 on both sides.
pub fn sequence_loss<B: Backend>(
    logits:  Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    pad_id:  usize,
) -> Tensor<B, 1> {
    let [batch, len, vocab] = logits.dims();
    if len < 2 {
        return Tensor::zeros([1], &logits.device());
    }
    masked_cross_entropy(
        logits.slice([0..batch, 1..len, 0..vocab]),
        targets.slice([0..batch, 1..len]),
        pad_id,
    )
}
