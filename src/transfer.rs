//! Primitives for moving values on and off channels.

use crate::channel::{Receiver, Sender};
use crate::error::{CloseError, SendError};

use tracing::{debug, warn};

/// Writes `values` onto `dst` in order, waiting whenever the buffer is full.
///
/// `dst` is left open. Loading into a channel whose receivers are all gone is a caller
/// bug: it fails with [`SendError::Closed`] and nothing after the rejected value is written.
pub async fn load<T, I>(dst: &Sender<T>, values: I) -> Result<(), SendError>
where
  T: Send,
  I: IntoIterator<Item = T>,
{
  let mut written = 0usize;
  for value in values {
    if let Err(e) = dst.send(value).await {
      warn!(written, "load: destination has no receivers left.");
      return Err(e);
    }
    written += 1;
  }
  Ok(())
}

/// Collects every value received from `src` until it is closed.
///
/// Does not return while `src` stays open.
pub async fn drain<T: Send>(src: &Receiver<T>) -> Vec<T> {
  let mut out = Vec::new();
  while let Ok(value) = src.recv().await {
    out.push(value);
  }
  debug!(count = out.len(), "Drained channel to completion.");
  out
}

/// Closes every sender handle in `channels`.
///
/// Handles that are already closed are skipped rather than closed twice; the first
/// such handle is reported as [`CloseError`] once all others are closed. A channel
/// reads as closed only once every sender handle to it is closed or dropped.
pub fn close_many<T: Send>(channels: &[Sender<T>]) -> Result<(), CloseError> {
  let mut outcome = Ok(());
  for (index, channel) in channels.iter().enumerate() {
    if let Err(e) = channel.close() {
      warn!(index, "close_many: sender handle was already closed.");
      if outcome.is_ok() {
        outcome = Err(e);
      }
    }
  }
  outcome
}
