// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several other layers:
//
//   checkpoint.rs   — The checkpoint directory: config, model
//                     metadata, both vocabularies and the best
//                     weights (Burn DefaultRecorder). Loading
//                     fails with a typed CheckpointError.
//
//   vocab_store.rs  — Word-level vocabularies with fixed special
//                     tokens, stored as HuggingFace tokenizer JSON
//                     so training and inference share one mapping.
//
//   metrics.rs      — Per-epoch CSV of train/validation losses.
//
//   device.rs       — Parses --device once and resolves it to a
//                     wgpu device.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Checkpoint directory layout, saving and loading
pub mod checkpoint;

/// Vocabulary building, encoding, saving and loading
pub mod vocab_store;

/// Training metrics CSV logger
pub mod metrics;

/// Compute device selection
pub mod device;
