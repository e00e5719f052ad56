use futures_conduit::{Context, WorkerPool};
use std::time::Duration;
use tracing::info;

async fn square(ctx: Context, value: u64) -> Result<(), String> {
  let delay_ms = 100 + (value % 3) * 50;
  info!("Unit {} starting, will sleep for {}ms", value, delay_ms);
  tokio::time::sleep(Duration::from_millis(delay_ms)).await;
  if value == 7 {
    info!("Unit {} is the stop signal, cancelling the run", value);
    ctx.cancel_with_cause("unit 7 reached");
    return Ok(());
  }
  if value % 4 == 3 {
    return Err(format!("unit {} rejected", value));
  }
  info!("Unit {} squared: {}", value, value * value);
  Ok(())
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Basic Usage Example ---");

  let pool = WorkerPool::new(2).name("basic_pool");
  let ctx = Context::new();

  match pool.run_slice(&ctx, (0..12).collect(), square).await {
    Ok(errors) => {
      info!("Run finished with {} error(s).", errors.len());
      for e in errors {
        info!("  {}", e);
      }
    }
    Err(e) => tracing::error!("Run failed: {}", e),
  }

  info!("--- Basic Usage Example End ---");
}
