use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Effective configuration for one process run, embedded in JSON reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub food_density: u32,
    pub reproduction: ReproductionMethod,
    pub step_slider: f64,
    #[serde(with = "humantime_serde")]
    pub frame_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    pub batch: BatchSettings,
    pub out_dir: std::path::PathBuf,
}

/// How much work a single batch run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Replicate worlds averaged into every sample row.
    pub simulations: usize,
    /// Rows written to the result CSV.
    pub samples: usize,
    pub steps_per_sample: usize,
    /// Sample index at which food density switches to the second value.
    pub switch_at_sample: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            simulations: 10,
            samples: 1_000,
            steps_per_sample: 1_000,
            switch_at_sample: 500,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReproductionMethod {
    #[default]
    Asexual,
    Sexual,
}

impl ReproductionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ReproductionMethod::Asexual => "asexual",
            ReproductionMethod::Sexual => "sexual",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ReproductionMethod::Asexual => ReproductionMethod::Sexual,
            ReproductionMethod::Sexual => ReproductionMethod::Asexual,
        }
    }
}

impl fmt::Display for ReproductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReproductionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asexual" => Ok(ReproductionMethod::Asexual),
            "sexual" => Ok(ReproductionMethod::Sexual),
            other => Err(format!(
                "unknown reproduction method '{other}' (expected 'asexual' or 'sexual')"
            )),
        }
    }
}

/// Configuration of one background batch run. Immutable once the job starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchJobConfig {
    pub reproduction_method: ReproductionMethod,
    pub beginning_food_density: u32,
    pub switched_food_density: u32,
}

impl BatchJobConfig {
    pub fn new(method: ReproductionMethod, beginning: u32, switched: u32) -> Self {
        Self {
            reproduction_method: method,
            beginning_food_density: beginning,
            switched_food_density: switched,
        }
    }

    /// `{method}-{beginning}-{switched}`, used for progress tagging and file names.
    pub fn label(&self) -> String {
        format!(
            "{}-{}-{}",
            self.reproduction_method, self.beginning_food_density, self.switched_food_density
        )
    }
}

/// Parses `METHOD:BEGIN:SWITCHED`, e.g. `asexual:240:600`.
impl FromStr for BatchJobConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [method, beginning, switched] = parts.as_slice() else {
            return Err(format!(
                "invalid batch config '{s}' (expected METHOD:BEGIN:SWITCHED)"
            ));
        };
        let method = method.parse::<ReproductionMethod>()?;
        let beginning = beginning
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid beginning food density '{beginning}': {e}"))?;
        let switched = switched
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid switched food density '{switched}': {e}"))?;
        Ok(Self::new(method, beginning, switched))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One background run and its mutable progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: usize,
    pub config: BatchJobConfig,
    pub status: JobStatus,
    pub progress_percent: u8,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BatchJob {
    pub fn pending(id: usize, config: BatchJobConfig) -> Self {
        Self {
            id,
            config,
            status: JobStatus::Pending,
            progress_percent: 0,
            result: None,
            error: None,
        }
    }

    pub fn label(&self) -> String {
        self.config.label()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A completed job's payload, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub label: String,
    pub payload: String,
}

impl Delivery {
    pub fn filename(&self) -> String {
        format!("ChoanoSimData-{}.csv", self.label)
    }
}

/// Events emitted by the batch orchestrator and consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BatchEvent {
    Launched { jobs: Vec<BatchJob> },
    Progress { job: usize, label: String, percent: u8 },
    /// Completed while unfocused; held until focus returns.
    Queued { job: usize, label: String },
    Delivered { job: usize, delivery: Delivery },
    Failed { job: usize, label: String, error: String },
    Info(String),
}

/// Pan/zoom state of the rendered view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Where a pan delta came from. Wheel deltas are subtracted, drag deltas added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PanSource {
    Wheel,
    Drag,
}

/// Size of the render target in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

/// Coarse session controller state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Stopped,
    /// A single manual frame is in flight.
    Stepping,
    Playing,
}

/// Session state published alongside every frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub is_playing: bool,
    pub step_count: u64,
    pub step_multiplier: u32,
    pub camera: Camera,
}
