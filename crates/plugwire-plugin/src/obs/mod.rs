//! Observability: in-process metrics and log setup.
//!
//! Stdout carries the protocol, so nothing in here ever writes to it.

pub mod log;
pub mod metrics;

pub use log::{init_tracing, HostLogLayer, HostLogSink, LOG_PATH};
pub use metrics::PluginMetrics;
