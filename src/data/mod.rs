// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw corpus files to padded tensor batches:
//
//   <prefix>.<src> / <prefix>.<trg>
//       │
//       ▼
//   ParallelCorpusLoader → line-aligned SentencePairs
//       │
//       ▼
//   Preprocessor         → whitespace / control-char cleanup
//       │
//       ▼
//   splitter             → optional sample + train/dev split
//       │
//       ▼
//   Vocabulary (infra)   → token ids wrapped in <sos> … <eos>
//       │
//       ▼
//   TranslationDataset   → implements Burn's Dataset trait
//       │
//       ▼
//   TranslationBatcher   → pads each batch, keeps true lengths
//       │
//       ▼
//   DataLoader           → feeds batches to the training loop

/// Reads line-aligned bilingual corpus files
pub mod loader;

/// Cleans one sentence before tokenisation
pub mod preprocessor;

/// Implements Burn's Dataset trait for encoded pairs
pub mod dataset;

/// Implements Burn's Batcher trait with per-batch padding
pub mod batcher;

/// Samples and splits corpora into train/dev sets
pub mod splitter;
