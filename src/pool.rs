use crate::aggregate::ErrorAggregate;
use crate::channel::Receiver;
use crate::context::Context;
use crate::error::PoolError;
use crate::source::{ChanSource, MapSource, SliceSource, WorkSource};

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_POOL_RUN_ID: AtomicU64 = AtomicU64::new(0);
}

const DEFAULT_POOL_NAME: &str = "worker_pool";

/// How a single worker left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
  Exhausted { processed: usize },
  Cancelled { processed: usize },
  Panicked,
}

impl WorkerExit {
  fn processed(self) -> usize {
    match self {
      WorkerExit::Exhausted { processed } | WorkerExit::Cancelled { processed } => processed,
      WorkerExit::Panicked => 0,
    }
  }
}

/// A fixed-size pool of workers applying one processing function to every unit of a source.
///
/// The pool itself holds only configuration; each `run_*` call spawns `workers` Tokio
/// tasks, waits for all of them, and returns the errors the processing function produced
/// (an empty `Vec` when there were none).
///
/// Every run derives a child of the caller's [`Context`] and passes it to each invocation.
/// Cancelling the caller's context, or calling [`Context::cancel`] from inside the
/// processing function, stops the run: workers finish the unit they are on and take no
/// further units. Units in flight at that moment complete on a best-effort basis; nothing
/// is rolled back and skipped units are not reported.
///
/// Dropping a run's future before it resolves (for example under `tokio::time::timeout`)
/// aborts its workers, so the processing function is not invoked again afterwards.
#[derive(Debug, Clone)]
pub struct WorkerPool {
  pool_name: Arc<String>,
  workers: usize,
  tokio_handle: Option<TokioHandle>,
}

impl WorkerPool {
  pub fn new(workers: usize) -> Self {
    Self {
      pool_name: Arc::new(DEFAULT_POOL_NAME.to_string()),
      workers,
      tokio_handle: None,
    }
  }

  /// Name used in log spans for this pool's runs.
  pub fn name(mut self, pool_name: &str) -> Self {
    self.pool_name = Arc::new(pool_name.to_string());
    self
  }

  /// Runtime the workers are spawned on. Defaults to the runtime of the calling task.
  pub fn runtime(mut self, tokio_handle: TokioHandle) -> Self {
    self.tokio_handle = Some(tokio_handle);
    self
  }

  pub fn pool_name(&self) -> &str {
    &self.pool_name
  }

  pub fn workers(&self) -> usize {
    self.workers
  }

  /// Processes every element of `items`.
  pub async fn run_slice<T, F, Fut, E>(&self, ctx: &Context, items: Vec<T>, f: F) -> Result<Vec<E>, PoolError>
  where
    T: Send + 'static,
    F: Fn(Context, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Send + 'static,
  {
    self.run(ctx, SliceSource::new(items), f).await
  }

  /// Processes every key/value pair of `items`.
  pub async fn run_map<K, V, F, Fut, E>(&self, ctx: &Context, items: HashMap<K, V>, f: F) -> Result<Vec<E>, PoolError>
  where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
    F: Fn(Context, (K, V)) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Send + 'static,
  {
    self.run(ctx, MapSource::new(items), f).await
  }

  /// Processes every value received from `items` until the channel closes or the run is cancelled.
  ///
  /// The channel is never closed by the pool. If the run is cancelled while producers are
  /// still writing, those producers are released only once every receiver handle, including
  /// the caller's own clones, has been dropped.
  pub async fn run_chan<T, F, Fut, E>(&self, ctx: &Context, items: Receiver<T>, f: F) -> Result<Vec<E>, PoolError>
  where
    T: Send + 'static,
    F: Fn(Context, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Send + 'static,
  {
    self.run(ctx, ChanSource::new(items), f).await
  }

  /// Processes every unit of an arbitrary [`WorkSource`].
  ///
  /// # Errors
  /// - [`PoolError::InvalidWorkerCount`] if the pool has zero workers; nothing is read.
  /// - [`PoolError::RuntimeUnavailable`] if no runtime was configured and the caller is not
  ///   running inside one.
  /// - [`PoolError::WorkerPanicked`] if the processing function panicked. The panicking
  ///   worker stops; the remaining workers keep draining the source before this is returned.
  pub async fn run<U, S, F, Fut, E>(&self, ctx: &Context, source: S, f: F) -> Result<Vec<E>, PoolError>
  where
    U: Send + 'static,
    S: WorkSource<U> + 'static,
    F: Fn(Context, U) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Send + 'static,
  {
    if self.workers == 0 {
      warn!(pool_name = %self.pool_name, "Refusing to start a run with zero workers.");
      return Err(PoolError::InvalidWorkerCount(self.workers));
    }

    let tokio_handle = match &self.tokio_handle {
      Some(handle) => handle.clone(),
      None => TokioHandle::try_current().map_err(|_| {
        error!(pool_name = %self.pool_name, "No Tokio runtime available to spawn workers on.");
        PoolError::RuntimeUnavailable
      })?,
    };

    let run_id = NEXT_POOL_RUN_ID.fetch_add(1, AtomicOrdering::Relaxed);
    let run_ctx = ctx.child();
    let source = Arc::new(source);
    let f = Arc::new(f);
    let errors = Arc::new(ErrorAggregate::new());

    info!(
      pool_name = %self.pool_name,
      run_id,
      workers = self.workers,
      units = ?source.remaining(),
      "Starting worker pool run."
    );

    // Owning the workers in a JoinSet ties their lifetime to this future.
    let mut workers: JoinSet<(usize, WorkerExit)> = JoinSet::new();
    for worker in 0..self.workers {
      let worker_future = Self::run_worker::<U, S, F, Fut, E>(worker, run_ctx.clone(), source.clone(), f.clone(), errors.clone())
        .map(move |exit| (worker, exit))
        .instrument(info_span!("pool_worker", pool_name = %*self.pool_name, run_id, worker));
      workers.spawn_on(worker_future, &tokio_handle);
    }

    // Completion barrier: every worker is joined before the aggregate is read.
    let mut first_panicked: Option<usize> = None;
    let mut reported = vec![false; self.workers];
    let mut join_failures = 0usize;
    let mut processed_total = 0usize;
    while let Some(joined) = workers.join_next().await {
      match joined {
        Ok((worker, exit)) => {
          trace!(pool_name = %self.pool_name, run_id, worker, ?exit, "Worker joined.");
          reported[worker] = true;
          processed_total += exit.processed();
          if exit == WorkerExit::Panicked && first_panicked.map_or(true, |w| worker < w) {
            first_panicked = Some(worker);
          }
        }
        Err(join_error) => {
          error!(pool_name = %self.pool_name, run_id, "Error joining worker: {:?}", join_error);
          join_failures += 1;
        }
      }
    }
    if join_failures > 0 {
      // A worker that failed to join never reported its index.
      let unreported = reported.iter().position(|done| !done);
      first_panicked = match (first_panicked, unreported) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
      };
    }

    let collected = errors.take();
    info!(
      pool_name = %self.pool_name,
      run_id,
      processed = processed_total,
      errors = collected.len(),
      cancelled = run_ctx.is_cancelled(),
      "Worker pool run finished."
    );

    match first_panicked {
      Some(worker) => {
        warn!(
          pool_name = %self.pool_name,
          run_id,
          worker,
          "Run failed due to a panicking worker; discarding {} collected error(s).",
          collected.len()
        );
        Err(PoolError::WorkerPanicked { worker })
      }
      None => Ok(collected),
    }
  }

  async fn run_worker<U, S, F, Fut, E>(
    worker: usize,
    ctx: Context,
    source: Arc<S>,
    f: Arc<F>,
    errors: Arc<ErrorAggregate<E>>,
  ) -> WorkerExit
  where
    S: WorkSource<U>,
    F: Fn(Context, U) -> Fut,
    Fut: Future<Output = Result<(), E>>,
  {
    trace!("Worker started.");
    let mut processed = 0usize;

    loop {
      if ctx.is_cancelled() {
        debug!(processed, cause = ?ctx.cause(), "Cancellation observed, worker taking no more units.");
        return WorkerExit::Cancelled { processed };
      }

      let unit = match source.next_unit(&ctx).await {
        Some(unit) => unit,
        None if ctx.is_cancelled() => {
          debug!(processed, "Cancelled while waiting for the next unit.");
          return WorkerExit::Cancelled { processed };
        }
        None => {
          debug!(processed, "Source exhausted, worker stopping.");
          return WorkerExit::Exhausted { processed };
        }
      };

      // The call itself sits inside the async block so a synchronous panic in `f` is caught too.
      let invocation = AssertUnwindSafe(async { (*f)(ctx.clone(), unit).await }).catch_unwind();
      match invocation.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
          trace!("Unit returned an error, collecting it.");
          errors.push(e);
        }
        Err(_panic_payload) => {
          error!(worker, processed, "Processing function panicked; worker stopping.");
          return WorkerExit::Panicked;
        }
      }
      processed += 1;
    }
  }
}

/// Runs `f` over every element of `items` with `n_workers` concurrent workers.
///
/// Returns the errors `f` produced, in no particular order.
pub async fn worker_pool_from_slice<T, F, Fut, E>(
  ctx: &Context,
  items: Vec<T>,
  n_workers: usize,
  f: F,
) -> Result<Vec<E>, PoolError>
where
  T: Send + 'static,
  F: Fn(Context, T) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
  E: Send + 'static,
{
  WorkerPool::new(n_workers).run_slice(ctx, items, f).await
}

/// Runs `f` over every key/value pair of `items` with `n_workers` concurrent workers.
pub async fn worker_pool_from_map<K, V, F, Fut, E>(
  ctx: &Context,
  items: HashMap<K, V>,
  n_workers: usize,
  f: F,
) -> Result<Vec<E>, PoolError>
where
  K: Eq + Hash + Send + 'static,
  V: Send + 'static,
  F: Fn(Context, (K, V)) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
  E: Send + 'static,
{
  WorkerPool::new(n_workers).run_map(ctx, items, f).await
}

/// Runs `f` over every value received from `items` with `n_workers` concurrent workers,
/// until the channel is closed and drained or the context is cancelled.
pub async fn worker_pool_from_chan<T, F, Fut, E>(
  ctx: &Context,
  items: Receiver<T>,
  n_workers: usize,
  f: F,
) -> Result<Vec<E>, PoolError>
where
  T: Send + 'static,
  F: Fn(Context, T) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
  E: Send + 'static,
{
  WorkerPool::new(n_workers).run_chan(ctx, items, f).await
}
