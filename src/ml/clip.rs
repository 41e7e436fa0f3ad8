// ============================================================
// Layer 5 — Global Gradient-Norm Clipping
// ============================================================
// Recurrent networks can produce exploding gradients when a
// long sentence multiplies the same recurrent weights many
// times. Clipping rescales ALL gradients together so that
//
//   ‖g‖ = sqrt( Σ_params Σ_elems g² )  ≤  max_norm
//
// Rescaling every gradient by the same factor keeps the update
// direction intact, which per-tensor clipping would not.
//
// Gradients live in a GradientsParams map keyed by ParamId, so
// two module visitors walk the parameters: one sums squares, the
// other rescales each gradient in place.

use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

struct SquaredNorm<'a, B: AutodiffBackend> {
    grads:   &'a GradientsParams,
    sum_sq:  f64,
    _marker: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum_sq += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Rescale<'a, B: AutodiffBackend> {
    grads:   &'a mut GradientsParams,
    scale:   f64,
    _marker: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.scale));
        }
    }
}

/// L2 norm over every gradient that belongs to `model`.
pub fn global_grad_norm<B, M>(model: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm::<B> { grads, sum_sq: 0.0, _marker: PhantomData };
    model.visit(&mut visitor);
    visitor.sum_sq.sqrt()
}

/// Scale all gradients down so their global norm is at most `max_norm`.
/// Returns the norm measured before clipping.
pub fn clip_grad_norm<B, M>(model: &M, mut grads: GradientsParams, max_norm: f64) -> (GradientsParams, f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let total_norm = global_grad_norm::<B, M>(model, &grads);

    if total_norm.is_finite() && total_norm > max_norm {
        let scale = max_norm / (total_norm + 1e-6);
        let mut visitor = Rescale::<B> { grads: &mut grads, scale, _marker: PhantomData };
        model.visit(&mut visitor);
    }

    (grads, total_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{
        loss::sequence_loss,
        model::{ModelKind, Seq2SeqModel},
        test_utils::{tiny_batch, tiny_config, TestAutodiffBackend},
    };

    fn large_grads() -> (crate::ml::model::Seq2Seq<TestAutodiffBackend>, GradientsParams) {
        let device = Default::default();
        let model  = tiny_config(ModelKind::Seq2seq).init::<TestAutodiffBackend>(&device);
        let batch  = tiny_batch::<TestAutodiffBackend>(&device);

        let targets = batch.target_ids.clone();
        let logits  = model.forward_train(
            batch.source_ids, batch.source_lengths, batch.target_ids, batch.target_lengths,
        );
        // Blow the loss up so the raw gradient norm is far above the threshold
        let loss  = sequence_loss(logits, targets, 1).mul_scalar(1.0e4);
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        (model, grads)
    }

    #[test]
    fn test_clipped_norm_never_exceeds_threshold() {
        let (model, grads) = large_grads();
        let max_norm = 5.0;

        let (clipped, before) = clip_grad_norm::<TestAutodiffBackend, _>(&model, grads, max_norm);
        let after = global_grad_norm::<TestAutodiffBackend, _>(&model, &clipped);

        assert!(before > max_norm, "fixture should produce a large gradient, got {before}");
        assert!(after <= max_norm * (1.0 + 1e-4), "norm after clipping: {after}");
        assert!(after > max_norm * 0.99);
    }

    #[test]
    fn test_small_gradients_are_left_alone() {
        let (model, grads) = large_grads();
        let before = global_grad_norm::<TestAutodiffBackend, _>(&model, &grads);

        let (kept, measured) = clip_grad_norm::<TestAutodiffBackend, _>(&model, grads, before * 2.0);
        let after = global_grad_norm::<TestAutodiffBackend, _>(&model, &kept);

        assert!((measured - before).abs() < 1e-9 * before.max(1.0));
        assert!((after - before).abs() <= 1e-6 * before);
    }
}
