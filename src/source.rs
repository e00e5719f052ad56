use crate::channel::Receiver;
use crate::context::Context;

use std::collections::{hash_map, HashMap};
use std::hash::Hash;
use std::vec;

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;

/// A shared stream of units that any number of workers pull from concurrently.
///
/// Each unit is handed to exactly one caller of [`next_unit`](Self::next_unit).
pub trait WorkSource<U>: Send + Sync {
  /// Takes the next unit, or `None` once the source is exhausted.
  ///
  /// Sources that may wait for input stop waiting and return `None` when `ctx`
  /// is cancelled.
  fn next_unit<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Option<U>>;

  /// Number of units left, if the source knows it up front.
  fn remaining(&self) -> Option<usize> {
    None
  }
}

/// Units drawn from an owned sequence, in order.
pub struct SliceSource<T> {
  items: Mutex<vec::IntoIter<T>>,
}

impl<T> SliceSource<T> {
  pub fn new(items: Vec<T>) -> Self {
    Self {
      items: Mutex::new(items.into_iter()),
    }
  }
}

impl<T: Send> WorkSource<T> for SliceSource<T> {
  fn next_unit<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, Option<T>> {
    future::ready(self.items.lock().next()).boxed()
  }

  fn remaining(&self) -> Option<usize> {
    Some(self.items.lock().len())
  }
}

/// Key/value pairs drawn from an owned map, in the map's iteration order.
pub struct MapSource<K, V> {
  entries: Mutex<hash_map::IntoIter<K, V>>,
}

impl<K, V> MapSource<K, V>
where
  K: Eq + Hash,
{
  pub fn new(items: HashMap<K, V>) -> Self {
    Self {
      entries: Mutex::new(items.into_iter()),
    }
  }
}

impl<K: Send, V: Send> WorkSource<(K, V)> for MapSource<K, V> {
  fn next_unit<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, Option<(K, V)>> {
    future::ready(self.entries.lock().next()).boxed()
  }

  fn remaining(&self) -> Option<usize> {
    Some(self.entries.lock().len())
  }
}

/// Units received from a channel until it is closed.
///
/// The source only reads; closing the channel stays with whoever owns its senders.
pub struct ChanSource<T: Send> {
  rx: Receiver<T>,
}

impl<T: Send> ChanSource<T> {
  pub fn new(rx: Receiver<T>) -> Self {
    Self { rx }
  }
}

impl<T: Send> WorkSource<T> for ChanSource<T> {
  fn next_unit<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Option<T>> {
    async move {
      tokio::select! {
        biased;
        _ = ctx.cancelled() => None,
        unit = self.rx.recv() => unit.ok(),
      }
    }
    .boxed()
  }
}
