//! plugwire plugin runtime.
//!
//! This crate wires the stream adapter, router, dispatcher and client into
//! a plugin process talking to its host over stdin/stdout (or any duplex
//! byte pipe). It is consumed by plugin binaries and by integration tests.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod obs;
pub mod plugin;
pub mod routing;
pub mod transport;

pub use client::{Client, Outbox, PendingResponse};
pub use config::PluginConfig;
pub use dispatch::{Dispatcher, Outcome};
pub use plugin::{Plugin, INITIALIZE_PATH, METRICS_PATH};
pub use routing::{Handler, HandlerError, HandlerResult, Incoming, Params, RouteId, Router};
pub use transport::{Outbound, StreamAdapter};
