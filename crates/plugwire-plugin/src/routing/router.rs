use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use plugwire_core::error::Result;
use plugwire_core::Request;

use crate::routing::pattern::{Matcher, Params};

/// `Ok(Some(v))` answers with `v`, `Ok(None)` sends nothing back.
pub type HandlerResult = std::result::Result<Option<Value>, HandlerError>;

/// Failure reported by a handler. Its message becomes the `error` field of
/// the response.
///
/// Any `std::error::Error` converts into it, so handlers can use `?` freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E: std::error::Error> From<E> for HandlerError {
    fn from(e: E) -> Self {
        Self::new(e.to_string())
    }
}

/// What a handler receives: the request and the parameters its route
/// extracted from the path.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub request: Request,
    pub params: Params,
}

impl Incoming {
    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn payload_as<P: DeserializeOwned>(&self) -> Result<P> {
        self.request.payload_as()
    }
}

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, incoming: Incoming) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Incoming) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, incoming: Incoming) -> HandlerResult {
        (self)(incoming).await
    }
}

/// Adapts `Fn(P, Incoming) -> Result<R, HandlerError>` to [`Handler`]:
/// the payload is decoded into `P` and the return value serialized back.
/// A return value serializing to `null` sends no response.
struct TypedHandler<P, R, F> {
    f: F,
    _types: PhantomData<fn(P) -> R>,
}

#[async_trait]
impl<P, R, F, Fut> Handler for TypedHandler<P, R, F>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(P, Incoming) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    async fn call(&self, incoming: Incoming) -> HandlerResult {
        let payload: P = incoming.payload_as()?;
        let out = (self.f)(payload, incoming).await?;
        match serde_json::to_value(out)? {
            Value::Null => Ok(None),
            v => Ok(Some(v)),
        }
    }
}

/// Stable identity of a registered route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(u64);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route#{}", self.0)
    }
}

/// Compiled matcher stored together with its handler.
pub struct Route {
    id: RouteId,
    matcher: Matcher,
    handler: Arc<dyn Handler>,
}

impl Route {
    pub fn id(&self) -> RouteId {
        self.id
    }

    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        self.handler.clone()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("pattern", &self.matcher.pattern())
            .finish()
    }
}

/// Append-only route table; lookup is a registration-order scan and the
/// first match wins. Registering the same pattern twice adds a second,
/// independent route.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    next_id: u64,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<RouteId> {
        let matcher = Matcher::compile(pattern)?;
        let id = RouteId(self.next_id);
        self.next_id += 1;

        tracing::debug!(%id, pattern, "route registered");
        self.routes.push(Route {
            id,
            matcher,
            handler: Arc::new(handler),
        });
        Ok(id)
    }

    /// Register a handler working on a decoded payload `P` and returning a
    /// serializable `R`.
    pub fn route_typed<P, R, F, Fut>(&mut self, pattern: &str, f: F) -> Result<RouteId>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P, Incoming) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.register(
            pattern,
            TypedHandler {
                f,
                _types: PhantomData,
            },
        )
    }

    /// First route matching `path`, with its extracted parameters.
    pub fn dispatch(&self, path: &str) -> Option<(&Route, Params)> {
        self.routes
            .iter()
            .find_map(|r| r.matcher.matches(path).map(|params| (r, params)))
    }

    /// Resolve `path` and invoke the handler. `None` when nothing matches;
    /// otherwise the handler's result, unmodified.
    pub async fn call(&self, path: &str, request: Request) -> Option<HandlerResult> {
        let (route, params) = self.dispatch(path)?;
        let handler = route.handler();
        Some(handler.call(Incoming { request, params }).await)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
