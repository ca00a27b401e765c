//! Top-level facade crate for plugwire.
//!
//! Re-exports the wire types and the plugin runtime so plugins can depend on
//! a single crate.

pub mod core {
    pub use plugwire_core::*;
}

pub mod plugin {
    pub use plugwire_plugin::*;
}

pub use plugwire_core::{Channel, ChannelType, Envelope, PlugwireError, Request, Response, Result};
pub use plugwire_plugin::{
    Client, HandlerError, HandlerResult, Incoming, Params, Plugin, PluginConfig, Router,
};
