//! Fan-out (one source copied to many destinations) and fan-in (many sources merged into one sink).

use crate::channel::{Receiver, Sender};
use crate::error::TopologyError;
use crate::transfer::close_many;

use futures::future::try_join_all;
use tokio::task::JoinSet;
use tracing::{debug, error, info_span, trace, warn, Instrument};

/// Copies every value from `source` to every destination, in order, until `source` closes.
///
/// The writes for one value run concurrently, and the next value is read only once all of
/// them have landed, so the slowest destination sets the pace. Nothing is closed. With no
/// destinations the source is simply drained.
///
/// # Errors
/// [`TopologyError::DestinationClosed`] if every receiver of a destination is dropped while
/// values are still being written; reading stops at that value.
pub async fn fan_out<T>(source: &Receiver<T>, destinations: &[Sender<T>]) -> Result<(), TopologyError>
where
  T: Clone + Send,
{
  let mut forwarded = 0usize;
  while let Ok(value) = source.recv().await {
    let writes = destinations.iter().enumerate().map(|(index, dst)| {
      let copy = value.clone();
      async move { dst.send(copy).await.map_err(|_| index) }
    });
    if let Err(index) = try_join_all(writes).await {
      error!(index, forwarded, "Fan-out destination lost its receivers mid-stream.");
      return Err(TopologyError::DestinationClosed { index });
    }
    forwarded += 1;
  }
  debug!(forwarded, destinations = destinations.len(), "Fan-out source closed.");
  Ok(())
}

/// Like [`fan_out`], then closes every destination handle once the source has closed and all
/// copies are written. Destinations are closed on the error path too, so their readers
/// terminate once no other sender handles remain.
pub async fn fan_out_and_close<T>(source: &Receiver<T>, destinations: &[Sender<T>]) -> Result<(), TopologyError>
where
  T: Clone + Send,
{
  let outcome = fan_out(source, destinations).await;
  if close_many(destinations).is_err() {
    warn!("Fan-out: some destinations were already closed before the final close.");
  }
  outcome
}

/// Forwards every value from each source into `sink` until all sources have closed.
///
/// One reader task is spawned per source; the call returns only after every reader has
/// finished. Values from one source keep their order; interleaving across sources is
/// unspecified. `sink` is left open. Dropping the returned future aborts the readers.
///
/// # Errors
/// - [`TopologyError::SinkClosed`] if every receiver of the sink is dropped while values
///   are still arriving.
/// - [`TopologyError::ReaderPanicked`] if a reader task failed to complete.
pub async fn fan_in<T>(sink: &Sender<T>, sources: Vec<Receiver<T>>) -> Result<(), TopologyError>
where
  T: Send + 'static,
{
  let mut readers: JoinSet<Result<usize, TopologyError>> = JoinSet::new();
  for (index, source) in sources.into_iter().enumerate() {
    let sink = sink.clone();
    readers.spawn(
      async move {
        let mut forwarded = 0usize;
        while let Ok(value) = source.recv().await {
          if sink.send(value).await.is_err() {
            warn!(forwarded, "Fan-in sink lost its receivers, reader stopping.");
            return Err(TopologyError::SinkClosed);
          }
          forwarded += 1;
        }
        trace!(forwarded, "Fan-in source closed.");
        Ok(forwarded)
      }
      .instrument(info_span!("fan_in_reader", source = index)),
    );
  }

  // Barrier over every reader; the first failure is reported after all have stopped.
  let mut outcome = Ok(());
  let mut forwarded = 0usize;
  while let Some(joined) = readers.join_next().await {
    let result = match joined {
      Ok(result) => result,
      Err(join_error) => {
        error!("Fan-in reader failed to complete: {:?}", join_error);
        Err(TopologyError::ReaderPanicked)
      }
    };
    match result {
      Ok(count) => forwarded += count,
      Err(e) if outcome.is_ok() => outcome = Err(e),
      Err(_) => {}
    }
  }
  debug!(forwarded, "Fan-in complete.");
  outcome
}

/// Like [`fan_in`], then closes the `sink` handle once every source has closed and every
/// forward landed. The reader tasks' sink clones are gone by then, so the sink reads as
/// closed unless the caller still holds other sender handles to it.
pub async fn fan_in_and_close<T>(sink: &Sender<T>, sources: Vec<Receiver<T>>) -> Result<(), TopologyError>
where
  T: Send + 'static,
{
  let outcome = fan_in(sink, sources).await;
  if sink.close().is_err() {
    warn!("Fan-in: sink was already closed before the final close.");
  }
  outcome
}
