use crate::engine::Canvas;
use crate::model::{
    BatchEvent, BatchJob, JobStatus, ReproductionMethod, SessionPhase, SessionSnapshot,
};
use crate::session::SessionEvent;
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::path::PathBuf;

/// Upper bound of the step slider; the multiplier is the square of the slider value.
pub const MAX_SLIDER: f64 = 10.0;
pub const SLIDER_STEP: f64 = 0.5;
pub const DENSITY_STEP: u32 = 10;

pub struct UiState {
    pub tab: usize,
    pub info: String,

    pub canvas: Option<Canvas>,
    pub snapshot: Option<SessionSnapshot>,
    /// Set once the session stopped on an engine failure; no further frames will arrive.
    pub session_error: Option<String>,

    // Values last sent to the session. The engine does not echo them back.
    pub step_slider: f64,
    pub food_density: u32,
    pub reproduction: ReproductionMethod,

    pub jobs: Vec<BatchJob>,
    pub delivered: Vec<PathBuf>,
    pub focused: bool,

    pub out_dir: PathBuf,
    pub last_exported_path: Option<String>,
    /// Last mouse position while the left button is held.
    pub drag_anchor: Option<(u16, u16)>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: 0,
            info: String::new(),
            canvas: None,
            snapshot: None,
            session_error: None,
            step_slider: 1.0,
            food_density: 240,
            reproduction: ReproductionMethod::Asexual,
            jobs: Vec::new(),
            delivered: Vec::new(),
            focused: true,
            out_dir: PathBuf::from("."),
            last_exported_path: None,
            drag_anchor: None,
        }
    }
}

impl UiState {
    pub fn phase(&self) -> SessionPhase {
        self.snapshot
            .map(|s| s.phase)
            .unwrap_or(SessionPhase::Stopped)
    }

    pub fn zoom(&self) -> f64 {
        self.snapshot.map(|s| s.camera.zoom).unwrap_or(1.0)
    }

    /// Move the slider by `delta`, clamped to `0..=MAX_SLIDER`. Returns the new raw value.
    pub fn nudge_slider(&mut self, delta: f64) -> f64 {
        self.step_slider = (self.step_slider + delta).clamp(0.0, MAX_SLIDER);
        self.step_slider
    }

    pub fn nudge_density(&mut self, up: bool) -> u32 {
        self.food_density = if up {
            self.food_density.saturating_add(DENSITY_STEP)
        } else {
            self.food_density.saturating_sub(DENSITY_STEP).max(1)
        };
        self.food_density
    }

    /// Fold a session event into the view. Snapshots are handled by the caller.
    pub fn apply_session_event(&mut self, ev: SessionEvent) {
        match ev {
            SessionEvent::Frame { canvas, snapshot } => {
                self.canvas = Some(canvas);
                self.snapshot = Some(snapshot);
            }
            SessionEvent::State(snapshot) => self.snapshot = Some(snapshot),
            SessionEvent::Snapshot { .. } => {}
            SessionEvent::Fatal(e) => {
                self.info = format!("Simulation stopped: {e}");
                self.session_error = Some(e.to_string());
                if let Some(s) = self.snapshot.as_mut() {
                    s.is_playing = false;
                    s.phase = SessionPhase::Stopped;
                }
            }
        }
    }

    /// Fold a batch event into the job table. Writing delivered files is the caller's job.
    pub fn apply_batch_event(&mut self, ev: &BatchEvent) {
        match ev {
            BatchEvent::Launched { jobs } => {
                self.info = format!("Launched {} batch job(s)", jobs.len());
                self.jobs.extend(jobs.iter().cloned());
            }
            BatchEvent::Progress { job, percent, .. } => {
                if let Some(j) = self.jobs.get_mut(*job) {
                    j.progress_percent = *percent;
                }
            }
            BatchEvent::Queued { job, label } => {
                if let Some(j) = self.jobs.get_mut(*job) {
                    j.status = JobStatus::Completed;
                    j.progress_percent = 100;
                }
                self.info = format!("{label} finished; waiting for focus to deliver");
            }
            BatchEvent::Delivered { job, .. } => {
                if let Some(j) = self.jobs.get_mut(*job) {
                    j.status = JobStatus::Completed;
                    j.progress_percent = 100;
                }
            }
            BatchEvent::Failed { job, label, error } => {
                if let Some(j) = self.jobs.get_mut(*job) {
                    j.status = JobStatus::Failed;
                    j.error = Some(error.clone());
                }
                self.info = format!("{label} failed: {error}");
            }
            BatchEvent::Info(msg) => self.info = msg.clone(),
        }
    }

    pub fn running_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Running))
            .count()
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}
