//! Post-delivery processing.
//!
//! Writes delivered payloads and session snapshots to the output directory and produces
//! status messages for presentation layers.

use crate::model::Delivery;
use crate::storage;
use std::path::{Path, PathBuf};
use tracing::error;

/// Outcome of writing one artifact, ready for presentation layers.
pub(crate) struct Processed {
    pub path: Option<PathBuf>,
    pub message: String,
}

/// Write a delivered batch result as `ChoanoSimData-{label}.csv` under `out_dir`.
pub(crate) fn process_delivery(out_dir: &Path, delivery: &Delivery) -> Processed {
    write(out_dir.join(delivery.filename()), &delivery.payload)
}

/// Write an interactive snapshot as `ChoanoSimData-step-{n}.csv` under `out_dir`.
pub(crate) fn process_snapshot(out_dir: &Path, step_count: u64, csv: &str) -> Processed {
    write(out_dir.join(storage::snapshot_filename(step_count)), csv)
}

fn write(path: PathBuf, payload: &str) -> Processed {
    match storage::export_csv(&path, payload) {
        Ok(p) => Processed {
            message: format!("Saved: {}", p.display()),
            path: Some(p),
        },
        Err(e) => {
            error!(path = %path.display(), error = %format!("{e:#}"), "export failed");
            Processed {
                path: None,
                message: format!("Export failed: {e:#}"),
            }
        }
    }
}
