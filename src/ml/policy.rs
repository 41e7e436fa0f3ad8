// ============================================================
// Layer 5 — Validation & Checkpoint Policy
// ============================================================
// After every epoch the total validation loss decides what
// happens next:
//
//   val_loss < best     → IMPROVED      persist model, patience = 0
//   otherwise           → NOT IMPROVED  patience += 1
//                         patience == limit → STOP
//
//        ┌──────────── improved ────────────┐
//        ▼                                  │
//   [ patience = 0 ] ── not improved ──► [ patience = k ] ──► stop
//
// The state starts at best = +inf, patience = 0, so the first
// epoch with a finite loss always improves. Stopping is only
// decided at epoch boundaries.
//
// A tie (equal loss) counts as NOT improved.

use anyhow::Result;

// ─── TrainingState ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingState {
    /// Lowest total validation loss seen so far
    pub best_val_loss: f64,
    /// Epoch that produced `best_val_loss`
    pub best_epoch:    Option<usize>,
    /// Consecutive epochs without improvement
    pub patience:      usize,
    /// Every epoch whose model was written to the checkpoint
    pub saved_epochs:  Vec<usize>,
    /// Last epoch that finished
    pub epochs_run:    usize,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self {
            best_val_loss: f64::INFINITY,
            best_epoch:    None,
            patience:      0,
            saved_epochs:  Vec::new(),
            epochs_run:    0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Improved,
    NotImproved { patience: usize },
    Stop { patience: usize },
}

impl TrainingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one epoch's validation loss into the state.
    ///
    /// `limit` is the patience budget; it is treated as at least 1.
    pub fn record(&mut self, epoch: usize, val_loss: f64, limit: usize) -> Verdict {
        self.epochs_run = epoch;

        if val_loss < self.best_val_loss {
            self.best_val_loss = val_loss;
            self.best_epoch    = Some(epoch);
            self.patience      = 0;
            self.saved_epochs.push(epoch);
            return Verdict::Improved;
        }

        self.patience += 1;
        if self.patience >= limit.max(1) {
            Verdict::Stop { patience: self.patience }
        } else {
            Verdict::NotImproved { patience: self.patience }
        }
    }
}

// ─── Epoch loop ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub epochs:   usize,
    pub patience: usize,
}

/// One training run as seen by the epoch loop.
pub trait EpochDriver {
    /// Train for one epoch, validate, and return the total validation loss.
    fn run_epoch(&mut self, epoch: usize) -> Result<f64>;

    /// Write the current model as the best one.
    fn persist_best(&mut self, epoch: usize) -> Result<()>;

    /// Called once per epoch after the verdict, persisted or not.
    fn after_epoch(&mut self, _epoch: usize, _verdict: Verdict, _state: &TrainingState) -> Result<()> {
        Ok(())
    }
}

/// Run epochs until the schedule is exhausted or patience runs out.
///
/// Resumes after `state.epochs_run`, so a fresh state runs from epoch 1.
pub fn fit<D: EpochDriver>(
    driver:    &mut D,
    schedule:  Schedule,
    mut state: TrainingState,
) -> Result<TrainingState> {
    for epoch in state.epochs_run + 1..=schedule.epochs {
        let val_loss = driver.run_epoch(epoch)?;
        let verdict  = state.record(epoch, val_loss, schedule.patience);

        if verdict == Verdict::Improved {
            driver.persist_best(epoch)?;
            tracing::info!("Epoch {}: validation loss improved to {:.4}, model saved", epoch, val_loss);
        }
        driver.after_epoch(epoch, verdict, &state)?;

        if let Verdict::Stop { patience } = verdict {
            tracing::info!(
                "Early stopping after epoch {} ({} epochs without improvement, best epoch {:?})",
                epoch, patience, state.best_epoch
            );
            break;
        }
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays fixed validation losses and records what the loop asked for.
    struct Scripted {
        losses:    Vec<f64>,
        ran:       Vec<usize>,
        persisted: Vec<usize>,
        patience:  Vec<usize>,
    }

    impl Scripted {
        fn new(losses: &[f64]) -> Self {
            Self { losses: losses.to_vec(), ran: vec![], persisted: vec![], patience: vec![] }
        }
    }

    impl EpochDriver for Scripted {
        fn run_epoch(&mut self, epoch: usize) -> Result<f64> {
            self.ran.push(epoch);
            Ok(self.losses[epoch - 1])
        }

        fn persist_best(&mut self, epoch: usize) -> Result<()> {
            self.persisted.push(epoch);
            Ok(())
        }

        fn after_epoch(&mut self, _epoch: usize, _verdict: Verdict, state: &TrainingState) -> Result<()> {
            self.patience.push(state.patience);
            Ok(())
        }
    }

    #[test]
    fn test_improvements_are_persisted_and_reset_patience() {
        let mut driver = Scripted::new(&[5.0, 3.0, 4.0, 2.0]);
        let schedule   = Schedule { epochs: 4, patience: 10 };

        let state = fit(&mut driver, schedule, TrainingState::new()).unwrap();

        assert_eq!(driver.persisted, vec![1, 2, 4]);
        assert_eq!(driver.patience, vec![0, 0, 1, 0]);
        assert_eq!(state.saved_epochs, vec![1, 2, 4]);
        assert_eq!(state.best_epoch, Some(4));
        assert_eq!(state.best_val_loss, 2.0);
    }

    #[test]
    fn test_patience_exhaustion_stops_before_next_epoch() {
        let mut driver = Scripted::new(&[5.0, 6.0, 7.0, 1.0, 1.0]);
        let schedule   = Schedule { epochs: 5, patience: 2 };

        let state = fit(&mut driver, schedule, TrainingState::new()).unwrap();

        assert_eq!(driver.ran, vec![1, 2, 3]);
        assert_eq!(driver.persisted, vec![1]);
        assert_eq!(state.epochs_run, 3);
        assert_eq!(state.patience, 2);
    }

    #[test]
    fn test_equal_loss_is_not_an_improvement() {
        let mut state = TrainingState::new();
        assert_eq!(state.record(1, 3.0, 5), Verdict::Improved);
        assert_eq!(state.record(2, 3.0, 5), Verdict::NotImproved { patience: 1 });
        assert_eq!(state.best_epoch, Some(1));
    }

    #[test]
    fn test_nan_loss_never_improves() {
        let mut state = TrainingState::new();
        assert_eq!(state.record(1, f64::NAN, 3), Verdict::NotImproved { patience: 1 });
        assert!(state.best_val_loss.is_infinite());
    }

    #[test]
    fn test_runs_all_epochs_when_always_improving() {
        let mut driver = Scripted::new(&[4.0, 3.0, 2.0]);
        let state = fit(&mut driver, Schedule { epochs: 3, patience: 1 }, TrainingState::new()).unwrap();
        assert_eq!(driver.ran, vec![1, 2, 3]);
        assert_eq!(state.saved_epochs, vec![1, 2, 3]);
    }

    #[test]
    fn test_resumes_after_recorded_epochs() {
        let mut driver = Scripted::new(&[9.0, 8.0, 1.0]);
        let resumed    = TrainingState { best_val_loss: 8.0, best_epoch: Some(2), epochs_run: 2, ..TrainingState::new() };

        let state = fit(&mut driver, Schedule { epochs: 3, patience: 2 }, resumed).unwrap();
        assert_eq!(driver.ran, vec![3]);
        assert_eq!(state.best_epoch, Some(3));
    }
}
