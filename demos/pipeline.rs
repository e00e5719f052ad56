//! Round-robin a stream of readings over per-shard channels, fan them back into one sink,
//! and hand the merged stream to a worker pool.

use futures_conduit::{
  bounded, close_many, fan_in_and_close, load, round_robin, worker_pool_from_chan, Context, Receiver, Sender,
};
use std::time::Duration;
use tracing::info;

const SHARDS: usize = 3;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();

  info!("--- Pipeline Example ---");

  let (source_tx, source_rx) = bounded::<u32>(4);
  let (shard_txs, shard_rxs): (Vec<Sender<u32>>, Vec<Receiver<u32>>) = (0..SHARDS).map(|_| bounded(2)).unzip();
  let (sink_tx, sink_rx) = bounded::<u32>(4);

  let producer = tokio::spawn(async move {
    load(&source_tx, 1..=30).await.ok();
    source_tx.close().ok();
  });

  let distributor = tokio::spawn(async move {
    if let Err(e) = round_robin(&source_rx, &shard_txs).await {
      tracing::error!("Distribution failed: {}", e);
    }
    close_many(&shard_txs).ok();
  });

  let merger = tokio::spawn(async move {
    if let Err(e) = fan_in_and_close(&sink_tx, shard_rxs).await {
      tracing::error!("Merge failed: {}", e);
    }
  });

  let ctx = Context::new().with_timeout(Duration::from_secs(5));
  let result = worker_pool_from_chan(&ctx, sink_rx, 4, |_ctx, reading: u32| async move {
    tokio::time::sleep(Duration::from_millis(10)).await;
    if reading % 10 == 0 {
      return Err(format!("reading {} out of range", reading));
    }
    Ok(())
  })
  .await;

  producer.await.ok();
  distributor.await.ok();
  merger.await.ok();

  match result {
    Ok(errors) => info!("Pipeline finished with errors: {:?}", errors),
    Err(e) => tracing::error!("Pool failed: {}", e),
  }
  info!("--- Pipeline Example End ---");
}
