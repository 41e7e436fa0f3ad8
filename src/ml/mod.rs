// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer holds the Burn-specific code: the network, the
// loss, gradient clipping, the training loop, the early-stopping
// policy and the inference driver.
//
// What's in this layer:
//
//   model.rs      — LSTM encoder-decoder behind the Seq2SeqModel
//                   trait, optionally with dot-product attention
//
//   loss.rs       — Summed token cross-entropy, padding ignored
//
//   clip.rs       — Global L2 gradient-norm clipping
//
//   policy.rs     — TrainingState + the improved / not-improved
//                   decision that drives checkpointing and
//                   early stopping
//
//   trainer.rs    — One training epoch, validation, and the
//                   full epoch loop wired to the checkpoint store
//
//   inferencer.rs — Reloads a checkpoint and greedily translates
//                   a file of sentences in input order
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Sutskever et al. (2014) Sequence to Sequence Learning
//            Luong et al. (2015) Effective Approaches to Attention

/// Encoder-decoder network and its contract
pub mod model;

/// Sequence cross-entropy
pub mod loss;

/// Global gradient-norm clipping
pub mod clip;

/// Best-loss tracking and patience-based early stopping
pub mod policy;

/// Training loop with validation and checkpointing
pub mod trainer;

/// Inference driver — loads a checkpoint and translates
pub mod inferencer;

/// Backend used for training (gradients tracked)
pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Backend used for validation and inference
pub type InferBackend = burn::backend::Wgpu;
