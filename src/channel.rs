//! Channel types every source, transfer primitive and topology operator works with.
//!
//! These are fibre's async MPMC handles. Both ends can be cloned. Closing is per handle:
//! [`Sender::close`] retires that sender, and the channel reads as closed once every
//! sender has been closed or dropped and the buffer is drained. Once every receiver is
//! gone, sends fail with [`SendError::Closed`](crate::SendError::Closed) instead of waiting.

pub use fibre::mpmc::{AsyncReceiver as Receiver, AsyncSender as Sender};

/// Creates a bounded channel holding up to `capacity` values.
///
/// A capacity of `0` is raised to `1`; rendezvous channels are not used here.
pub fn bounded<T: Send>(capacity: usize) -> (Sender<T>, Receiver<T>) {
  fibre::mpmc::bounded_async(capacity.max(1))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::{CloseError, RecvError, SendError};

  #[tokio::test]
  async fn buffered_values_survive_close() {
    let (tx, rx) = bounded(0);
    assert_eq!(tx.capacity(), Some(1));
    tx.send("kept").await.unwrap();
    tx.close().unwrap();
    assert_eq!(tx.close(), Err(CloseError));

    assert_eq!(rx.recv().await, Ok("kept"));
    assert_eq!(rx.recv().await, Err(RecvError::Disconnected));
    assert!(rx.is_closed());
  }

  #[tokio::test]
  async fn channel_stays_open_while_a_sender_clone_lives() {
    let (tx, rx) = bounded(2);
    let other = tx.clone();
    tx.close().unwrap();
    assert!(!rx.is_closed());

    other.send(7).await.unwrap();
    drop(other);
    assert_eq!(rx.recv().await, Ok(7));
    assert!(rx.is_closed());
  }

  #[tokio::test]
  async fn send_fails_once_receivers_are_gone() {
    let (tx, rx) = bounded::<u8>(1);
    drop(rx);
    assert!(tx.is_closed());
    assert_eq!(tx.send(1).await, Err(SendError::Closed));
  }
}
