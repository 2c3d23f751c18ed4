//! Run failure taxonomy. Library functions return `anyhow::Result`; the variants here
//! are attached at the point of failure so callers can `downcast_ref::<RunError>()`.

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Input missing/unreadable, output unwritable, invalid options.
    #[error("setup: {0}")]
    Setup(String),

    /// The worker pool could not be started; nothing was scanned.
    #[error("launch: {0}")]
    Launch(String),

    /// A worker failed or panicked; sibling results were discarded.
    #[error("worker {worker}: {message}")]
    Worker { worker: usize, message: String },

    /// A line did not resolve to a known slug or a well-formed date.
    #[error("data at byte {offset}: {reason}")]
    Data { offset: u64, reason: String },

    #[error("count overflow in cell (path {path_id}, date {date_id})")]
    Overflow { path_id: usize, date_id: usize },
}

impl RunError {
    pub fn setup(msg: impl Into<String>) -> Self {
        RunError::Setup(msg.into())
    }

    pub fn data(offset: u64, reason: impl Into<String>) -> Self {
        RunError::Data { offset, reason: reason.into() }
    }

    /// Short phase label used in the binary's single fatal message.
    pub fn phase(&self) -> &'static str {
        match self {
            RunError::Setup(_) => "setup",
            RunError::Launch(_) => "launch",
            RunError::Worker { .. } => "worker",
            RunError::Data { .. } => "data",
            RunError::Overflow { .. } => "count",
        }
    }
}
