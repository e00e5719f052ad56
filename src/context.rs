use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

/// Cause recorded by [`Context::cancel`].
pub const CANCELED: &str = "context canceled";
/// Cause recorded when a [`Context::with_timeout`] deadline fires.
pub const DEADLINE_EXCEEDED: &str = "context deadline exceeded";

struct Inner {
  token: CancellationToken,
  cause: OnceLock<String>,
  parent: Option<Context>,
  // Stops the deadline timer once the last handle to a `with_timeout` context is dropped.
  _timer_stop: Option<DropGuard>,
}

/// A cloneable, monotone stop signal shared by everything taking part in a run.
///
/// Clones observe the same signal. A [`child`](Self::child) is cancelled together with
/// its parent, but cancelling the child leaves the parent untouched. Cancellation is
/// cooperative: holders check [`is_cancelled`](Self::is_cancelled) or await
/// [`cancelled`](Self::cancelled) between units of work.
#[derive(Clone)]
pub struct Context {
  inner: Arc<Inner>,
}

impl Context {
  pub fn new() -> Self {
    Self::from_token(CancellationToken::new(), None, None)
  }

  fn from_token(token: CancellationToken, parent: Option<Context>, timer_stop: Option<DropGuard>) -> Self {
    Self {
      inner: Arc::new(Inner {
        token,
        cause: OnceLock::new(),
        parent,
        _timer_stop: timer_stop,
      }),
    }
  }

  /// Derives a context that is cancelled when `self` is, and can also be cancelled on its own.
  pub fn child(&self) -> Self {
    Self::from_token(self.inner.token.child_token(), Some(self.clone()), None)
  }

  /// Derives a child context that cancels itself once `timeout` elapses.
  ///
  /// Must be called from within a Tokio runtime; the deadline is tracked by a spawned
  /// timer task. The timer holds no handle to the context: it exits early when the
  /// context is cancelled or when the last handle to it is dropped.
  pub fn with_timeout(&self, timeout: Duration) -> Self {
    let token = self.inner.token.child_token();
    let timer_stop = CancellationToken::new();
    let child = Self::from_token(token.clone(), Some(self.clone()), Some(timer_stop.clone().drop_guard()));
    let weak_inner = Arc::downgrade(&child.inner);
    tokio::spawn(async move {
      tokio::select! {
        _ = token.cancelled() => {
          trace!("Deadline timer stopped, context already cancelled.");
        }
        _ = timer_stop.cancelled() => {
          trace!("Deadline timer stopped, context dropped.");
        }
        _ = tokio::time::sleep(timeout) => {
          if let Some(inner) = weak_inner.upgrade() {
            debug!(?timeout, "Context deadline exceeded.");
            Context { inner }.cancel_with_cause(DEADLINE_EXCEEDED);
          }
        }
      }
    });
    child
  }

  /// Cancels this context (and its children) with the default cause.
  pub fn cancel(&self) {
    self.cancel_with_cause(CANCELED);
  }

  /// Cancels this context, recording `cause` unless it is already cancelled.
  ///
  /// A context already cancelled through its parent keeps reporting the parent's cause.
  pub fn cancel_with_cause(&self, cause: impl Into<String>) {
    if self.is_cancelled() {
      return;
    }
    if self.inner.cause.set(cause.into()).is_ok() {
      if let Some(cause) = self.inner.cause.get() {
        debug!(%cause, "Context cancelled.");
      }
    }
    self.inner.token.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.inner.token.is_cancelled()
  }

  /// Completes once this context is cancelled.
  pub async fn cancelled(&self) {
    self.inner.token.cancelled().await
  }

  /// Why this context was cancelled, or `None` while it is still live.
  ///
  /// A context cancelled through its parent reports the parent's cause.
  pub fn cause(&self) -> Option<String> {
    if !self.is_cancelled() {
      return None;
    }
    if let Some(own) = self.inner.cause.get() {
      return Some(own.clone());
    }
    match &self.inner.parent {
      Some(parent) => parent.cause(),
      None => Some(CANCELED.to_string()),
    }
  }

  /// The underlying token, for integrating with code that selects on `CancellationToken`.
  pub fn token(&self) -> &CancellationToken {
    &self.inner.token
  }
}

impl Default for Context {
  fn default() -> Self {
    Self::new()
  }
}

impl From<CancellationToken> for Context {
  /// Wraps an externally owned token; cancelling that token cancels the context.
  fn from(token: CancellationToken) -> Self {
    Self::from_token(token, None, None)
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context")
      .field("cancelled", &self.is_cancelled())
      .field("cause", &self.inner.cause.get())
      .field("has_parent", &self.inner.parent.is_some())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cancellation_is_monotone_and_first_cause_wins() {
    let ctx = Context::new();
    assert_eq!(ctx.cause(), None);
    ctx.cancel_with_cause("first");
    ctx.cancel_with_cause("second");
    ctx.cancel();
    assert!(ctx.is_cancelled());
    assert_eq!(ctx.cause().as_deref(), Some("first"));
  }

  #[test]
  fn child_follows_parent_but_not_the_reverse() {
    let parent = Context::new();
    let child = parent.child();
    child.cancel();
    assert!(child.is_cancelled());
    assert!(!parent.is_cancelled());

    let other = parent.child();
    parent.cancel_with_cause("shutdown");
    assert!(other.is_cancelled());
    assert_eq!(other.cause().as_deref(), Some("shutdown"));
  }

  #[test]
  fn external_token_drives_context() {
    let token = CancellationToken::new();
    let ctx = Context::from(token.clone());
    token.cancel();
    assert!(ctx.is_cancelled());
    assert_eq!(ctx.cause().as_deref(), Some(CANCELED));
  }

  #[test]
  fn late_cause_does_not_replace_parent_cause() {
    let parent = Context::new();
    let child = parent.child();
    parent.cancel_with_cause("shutdown");
    child.cancel_with_cause("late");
    assert_eq!(child.cause().as_deref(), Some("shutdown"));
  }

  #[tokio::test]
  async fn deadline_timer_does_not_keep_context_alive() {
    let parent = Context::new();
    let ctx = parent.with_timeout(Duration::from_secs(3600));
    let weak_inner = Arc::downgrade(&ctx.inner);
    // Let the timer task start before the last handle goes away.
    tokio::task::yield_now().await;
    drop(ctx);
    assert!(weak_inner.upgrade().is_none());
    assert_eq!(Arc::strong_count(&parent.inner), 1);
  }

  #[tokio::test]
  async fn timeout_cancels_with_deadline_cause() {
    let ctx = Context::new().with_timeout(Duration::from_millis(20));
    tokio::time::timeout(Duration::from_secs(1), ctx.cancelled())
      .await
      .expect("deadline should fire");
    assert_eq!(ctx.cause().as_deref(), Some(DEADLINE_EXCEEDED));
  }
}
