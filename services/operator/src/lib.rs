//! kforge operator library.
//!
//! The crate ships a `kforge-operator` binary. The library surface exposes
//! the controllers and the in-memory store so scenarios can be driven tick by
//! tick from integration tests.

pub mod admission;
pub mod config;
pub mod context;
pub mod controller;
pub mod digest;
pub mod dispatch;
pub mod error;
pub mod expander;
pub mod gc;
pub mod kits;
pub mod store;
pub mod worker;
pub mod workloads;

pub use context::Context;
pub use controller::Controllers;
pub use dispatch::{Dispatcher, Outcome, TickOutcome};
pub use error::{DispatchError, ReconcileError};
pub use worker::{Request, Worker, WorkerConfig};
