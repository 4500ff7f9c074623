//! On-disk output for delivered batch results and session snapshots.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where results land when `--out-dir` is not given.
pub fn default_out_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn snapshot_filename(step_count: u64) -> String {
    format!("ChoanoSimData-step-{step_count}.csv")
}

/// Write a CSV payload to `path`, creating parent directories as needed.
/// Returns the absolute path that was written.
pub fn export_csv(path: &Path, payload: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
    }
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    let written = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("get current directory")?
            .join(path)
    };
    info!(path = %written.display(), bytes = payload.len(), "exported csv");
    Ok(written)
}
