use crate::channel::{Receiver, Sender};
use crate::error::TopologyError;

use tracing::{debug, error};

/// Sends the `i`-th value read from `source` to `destinations[i % destinations.len()]`
/// until `source` closes.
///
/// Assignment is deterministic for a fixed destination order. Nothing is closed; once this
/// returns every write has landed and the caller may close the destinations with
/// [`close_many`](crate::close_many).
///
/// # Errors
/// - [`TopologyError::NoDestinations`] if `destinations` is empty; `source` is not read.
/// - [`TopologyError::DestinationClosed`] if every receiver of a destination is dropped
///   mid-stream.
pub async fn round_robin<T: Send>(source: &Receiver<T>, destinations: &[Sender<T>]) -> Result<(), TopologyError> {
  if destinations.is_empty() {
    return Err(TopologyError::NoDestinations);
  }

  let mut next = 0usize;
  let mut distributed = 0usize;
  while let Ok(value) = source.recv().await {
    if destinations[next].send(value).await.is_err() {
      error!(index = next, distributed, "Round-robin destination lost its receivers mid-stream.");
      return Err(TopologyError::DestinationClosed { index: next });
    }
    distributed += 1;
    next = (next + 1) % destinations.len();
  }
  debug!(distributed, destinations = destinations.len(), "Round-robin source closed.");
  Ok(())
}
