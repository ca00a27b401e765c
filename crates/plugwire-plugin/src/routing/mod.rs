//! Path routing.
//!
//! - `pattern`: compiled path patterns and extracted parameters.
//! - `router`: ordered route table, handler trait and typed handlers.

pub mod pattern;
pub mod router;

pub use pattern::{Matcher, Params};
pub use router::{Handler, HandlerError, HandlerResult, Incoming, Route, RouteId, Router};
