//! Error types shared by the engine, session and batch layers.

/// Failures raised across the engine boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// The engine could not be instantiated. Fatal to the session; never retried.
    #[error("engine failed to load: {0}")]
    Load(String),

    /// A step or render call failed mid-session.
    #[error("engine runtime error: {0}")]
    Runtime(String),
}

/// A single batch job failed. Siblings are unaffected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobFailure {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("worker ended without reporting a result")]
    Lost,
}
