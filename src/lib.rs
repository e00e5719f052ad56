//! Tokio-based worker pools and channel topologies with cooperative cancellation.
//!
//! - [`WorkerPool`] and the `worker_pool_from_*` functions run a processing function over a
//!   slice, a map, or a channel with a fixed number of workers and collect its errors.
//! - [`fan_out`], [`fan_in`] and [`round_robin`] redistribute values across channels.
//! - [`load`], [`drain`] and [`close_many`] move values on and off channels.
//! - [`Context`] is the shared, monotone cancellation signal.

mod aggregate;
pub mod channel;
mod context;
mod error;
mod fan;
mod pool;
mod round_robin;
mod source;
mod transfer;

pub use aggregate::ErrorAggregate;
pub use channel::{bounded, Receiver, Sender};
pub use context::{Context, CANCELED, DEADLINE_EXCEEDED};
pub use error::{CloseError, PoolError, RecvError, SendError, TopologyError, TryRecvError, TrySendError};
pub use fan::{fan_in, fan_in_and_close, fan_out, fan_out_and_close};
pub use pool::{worker_pool_from_chan, worker_pool_from_map, worker_pool_from_slice, WorkerPool};
pub use round_robin::round_robin;
pub use source::{ChanSource, MapSource, SliceSource, WorkSource};
pub use transfer::{close_many, drain, load};
