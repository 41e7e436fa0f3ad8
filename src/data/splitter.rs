// ============================================================
// Layer 4 — Corpus Sampler / Train-Dev Splitter
// ============================================================
// Used when training on a subset of a large corpus:
//
//   1. shuffle all pairs (Fisher-Yates via SliceRandom)
//   2. keep the first `sample_size` of them
//   3. split that sample into train / dev by `train_fraction`
//
// The RNG is passed in so a fixed seed reproduces the same
// sample across runs.

use rand::{seq::SliceRandom, Rng};

/// Shuffle `samples` and split into (train, dev).
///
/// `floor(n * train_fraction)` items go to training.
pub fn split_train_val<T, R: Rng + ?Sized>(
    mut samples:    Vec<T>,
    train_fraction: f64,
    rng:            &mut R,
) -> (Vec<T>, Vec<T>) {
    samples.shuffle(rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction.clamp(0.0, 1.0)).floor() as usize;
    let split_at = split_at.min(total);

    let dev = samples.split_off(split_at);

    tracing::debug!(
        "Corpus split: {} train, {} dev ({}% / {}%)",
        samples.len(),
        dev.len(),
        (samples.len() * 100) / total.max(1),
        (dev.len() * 100) / total.max(1),
    );

    (samples, dev)
}

/// Shuffle `samples` and keep at most `sample_size` of them.
pub fn sample<T, R: Rng + ?Sized>(mut samples: Vec<T>, sample_size: usize, rng: &mut R) -> Vec<T> {
    samples.shuffle(rng);
    samples.truncate(sample_size);
    samples
}
