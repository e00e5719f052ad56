use thiserror::Error;

pub use fibre::{CloseError, RecvError, SendError, TryRecvError, TrySendError};

/// Errors that stop a worker pool run as a whole.
///
/// Errors returned by the processing function are never reported through this type;
/// they are collected and handed back as the run's result.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
  #[error("Worker count must be positive, got {0}")]
  InvalidWorkerCount(usize),

  #[error("No Tokio runtime is available to spawn workers on")]
  RuntimeUnavailable,

  #[error("Worker {worker} panicked while processing a unit")]
  WorkerPanicked { worker: usize },
}

/// Errors raised by the channel topology operators (fan-out, fan-in, round-robin).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TopologyError {
  #[error("At least one destination channel is required")]
  NoDestinations,

  #[error("Destination channel {index} lost all its receivers while values were still being written")]
  DestinationClosed { index: usize },

  #[error("Sink channel lost all its receivers while sources were still being forwarded")]
  SinkClosed,

  #[error("A fan-in reader task panicked or was aborted")]
  ReaderPanicked,
}
