// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per epoch to <checkpoint_dir>/metrics.csv.
//
// Losses are reported three ways, all from the same summed
// cross-entropy:
//
//   token loss    = loss_sum / target tokens
//   sequence loss = loss_sum / sentences
//   batch loss    = loss_sum / batches
//
// Example (columns abbreviated):
//   epoch,train_token,train_seq,train_batch,val_token,val_seq,val_batch,val_total,improved,patience,seconds
//   1,6.912301,171.442100,21944.5,6.501200,160.118000,20496.1,48035.4,true,0,41.2
//   2,5.877012,145.103300,18573.2,6.633900,163.386000,20913.4,49015.8,false,1,40.7
//
// Reading it:
//   - val_total_loss is what early stopping compares
//   - a run of `false` rows ends when patience reaches its limit
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const HEADER: &str = "epoch,train_token_loss,train_sequence_loss,train_batch_loss,\
                      val_token_loss,val_sequence_loss,val_batch_loss,val_total_loss,\
                      improved,patience,seconds";

/// One row of metrics for a finished epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:               usize,
    pub train_token_loss:    f64,
    pub train_sequence_loss: f64,
    pub train_batch_loss:    f64,
    pub val_token_loss:      f64,
    pub val_sequence_loss:   f64,
    pub val_batch_loss:      f64,
    /// Summed validation loss, the value early stopping compares
    pub val_total_loss:      f64,
    pub improved:            bool,
    pub patience:            usize,
    pub seconds:             f64,
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Open `<dir>/metrics.csv`, writing the header if the file is new.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{},{:.1}",
            m.epoch,
            m.train_token_loss,
            m.train_sequence_loss,
            m.train_batch_loss,
            m.val_token_loss,
            m.val_sequence_loss,
            m.val_batch_loss,
            m.val_total_loss,
            m.improved,
            m.patience,
            m.seconds,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn row(epoch: usize, improved: bool) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_token_loss:    2.5,
            train_sequence_loss: 20.0,
            train_batch_loss:    40.0,
            val_token_loss:      2.25,
            val_sequence_loss:   18.0,
            val_batch_loss:      36.0,
            val_total_loss:      180.0,
            improved,
            patience:            if improved { 0 } else { 1 },
            seconds:             1.25,
        }
    }

    #[test]
    fn test_header_then_one_row_per_epoch() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&row(1, true)).unwrap();
        logger.log(&row(2, false)).unwrap();

        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("epoch,train_token_loss"));
        assert_eq!(lines[0].split(',').count(), 11);
        assert_eq!(lines[1].split(',').count(), 11);
        assert!(lines[1].starts_with("1,2.500000,20.000000,40.000000,2.250000,18.000000,36.000000,180.000000"));
        assert!(lines[2].contains(",false,1,"));
    }

    #[test]
    fn test_reopening_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        MetricsLogger::new(dir.path()).unwrap().log(&row(1, true)).unwrap();
        MetricsLogger::new(dir.path()).unwrap().log(&row(2, true)).unwrap();

        let text = fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(text.matches("epoch,").count(), 1);
        assert_eq!(text.lines().count(), 3);
    }
}
