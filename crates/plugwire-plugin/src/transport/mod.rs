//! Byte stream transport.
//!
//! - `adapter`: owns the duplex byte pipe, drives the frame codec on the
//!   inbound side and writes segmented frames on the outbound side.

pub mod adapter;

pub use adapter::{BoxReader, BoxWriter, Outbound, StreamAdapter, Subscriber};
