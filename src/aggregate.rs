use std::fmt;

use parking_lot::Mutex;

/// Concurrency-safe, order-irrelevant collection of errors gathered across workers.
///
/// Every append and read goes through the internal mutex.
pub struct ErrorAggregate<E> {
  errors: Mutex<Vec<E>>,
}

impl<E> ErrorAggregate<E> {
  pub fn new() -> Self {
    Self {
      errors: Mutex::new(Vec::new()),
    }
  }

  pub fn push(&self, error: E) {
    self.errors.lock().push(error);
  }

  pub fn len(&self) -> usize {
    self.errors.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Takes every collected error, leaving the aggregate empty.
  pub fn take(&self) -> Vec<E> {
    std::mem::take(&mut *self.errors.lock())
  }

  pub fn into_vec(self) -> Vec<E> {
    self.errors.into_inner()
  }
}

impl<E> Default for ErrorAggregate<E> {
  fn default() -> Self {
    Self::new()
  }
}

impl<E> fmt::Debug for ErrorAggregate<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ErrorAggregate").field("len", &self.len()).finish()
  }
}
