/// Failure of a timer operation.
///
/// Every failing operation leaves the timers exactly as they were.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error("timer '{0}' is already running")]
    AlreadyRunning(String),

    #[error("no started timers available, cannot stop '{0}'")]
    NoOpenInterval(String),

    #[error("timer '{name}' cannot be stopped: the innermost running timer is '{open}'")]
    LabelMismatch { name: String, open: String },

    #[error("not all timers have been stopped: '{0}' is still running")]
    UnstoppedInterval(String),
}

/// Discriminant of a [`TimerError`], for boundaries that map failures to codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyRunning,
    NoOpenInterval,
    LabelMismatch,
    UnstoppedInterval,
}

impl TimerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TimerError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            TimerError::NoOpenInterval(_) => ErrorKind::NoOpenInterval,
            TimerError::LabelMismatch { .. } => ErrorKind::LabelMismatch,
            TimerError::UnstoppedInterval(_) => ErrorKind::UnstoppedInterval,
        }
    }
}

pub type Result<T> = std::result::Result<T, TimerError>;
