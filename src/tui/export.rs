use crate::model::Delivery;
use crate::orchestrator;
use anyhow::Result;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Write a session snapshot into the output directory and report the path in the status line.
pub fn save_snapshot(state: &mut UiState, step_count: u64, csv: &str) {
    let processed = orchestrator::process_snapshot(&state.out_dir, step_count, csv);
    remember(state, processed.path.as_deref());
    state.info = match processed.path {
        Some(_) => format!("{} (press 'y' to copy path)", processed.message),
        None => processed.message,
    };
}

/// Write a delivered batch result into the output directory.
pub fn save_delivery(state: &mut UiState, delivery: &Delivery) {
    let processed = orchestrator::process_delivery(&state.out_dir, delivery);
    remember(state, processed.path.as_deref());
    if let Some(p) = processed.path {
        state.delivered.push(p);
    }
    state.info = format!("{}: {}", delivery.label, processed.message);
}

fn remember(state: &mut UiState, path: Option<&std::path::Path>) {
    if let Some(p) = path {
        state.last_exported_path = Some(p.to_string_lossy().to_string());
    }
}

/// Initialize the clipboard manager thread if not already initialized.
/// Each copy gets its own clipboard instance that stays alive long enough for
/// clipboard managers to read it.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        // Linux clipboards are served by the owning process.
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue text for the clipboard thread. Returns without waiting for the copy.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_path_is_remembered_for_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = UiState {
            out_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        save_snapshot(&mut state, 12, "Step #12\n");
        let expected = dir.path().join("ChoanoSimData-step-12.csv");
        assert_eq!(
            state.last_exported_path.as_deref(),
            Some(expected.to_string_lossy().as_ref())
        );
        assert!(state.info.contains("press 'y'"));
    }

    #[test]
    fn delivery_is_written_and_listed() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = UiState {
            out_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let delivery = Delivery {
            label: "sexual-240-600".into(),
            payload: "A,B\n1,2".into(),
        };
        save_delivery(&mut state, &delivery);
        assert_eq!(state.delivered.len(), 1);
        assert_eq!(
            std::fs::read_to_string(&state.delivered[0]).unwrap(),
            "A,B\n1,2"
        );
        assert!(state.info.starts_with("sexual-240-600: Saved:"));
    }
}
