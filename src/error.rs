use tictoc_runtime::TimerError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error("a worker thread panicked")]
    WorkerPanicked,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
