//! Handler trait and type erasure.
//!
//! Middleware and route handlers share one shape:
//!
//! ```text
//! (ctx: &mut Context, next: Next) -> BoxFuture<Outcome>
//! ```
//!
//! A handler may answer (`Ok(Some(response))`), delegate (`next.run(ctx)`),
//! or decline (`Ok(None)`). What "decline" means depends on where the handler
//! sits; see [`Pipeline`](crate::Pipeline) and [`Router`](crate::Router).
//!
//! # How handlers are stored
//!
//! The router and the pipeline hold handlers of *different* types in one list,
//! so every handler is erased behind `Arc<dyn Handler>`:
//!
//! ```text
//! fn auth<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome>
//!        ↓ app.with(auth)
//! Arc::new(auth)                              ← BoxedHandler
//!        ↓ at request time
//! handler.call(ctx, next)                     ← one vtable dispatch
//! ```
//!
//! The per-request cost is one virtual call and one boxed future per handler
//! actually reached.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::pipeline::Next;
use crate::response::Response;

/// A heap-allocated, type-erased future.
///
/// `Send` lets tokio move a request's future across worker threads. The
/// lifetime ties it to the borrowed [`Context`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produces: `Some` is a terminal response, `None` is no
/// response.
pub type Outcome = Result<Option<Response>, Error>;

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// Implemented by every middleware and route handler.
///
/// Any function with the right signature already implements it:
///
/// ```rust
/// use weir::{BoxFuture, Context, Next, Outcome};
///
/// fn hello<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Outcome> {
///     Box::pin(async move { Ok(Some(ctx.text("hello"))) })
/// }
/// ```
///
/// Implement it on a struct when the handler carries configuration, as
/// [`middleware::Trace`](crate::middleware::Trace) does.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        self(ctx, next)
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// An ordered, append-only list of handlers registered for one route.
///
/// ```rust,ignore
/// app.on(Method::POST, "/users", Chain::new(authenticate).then(create_user));
/// ```
#[derive(Clone, Default)]
pub struct Chain(Vec<BoxedHandler>);

impl Chain {
    pub fn new(first: impl Handler) -> Self {
        Self(vec![Arc::new(first)])
    }

    /// Appends a handler; it runs after every handler already in the chain.
    pub fn then(mut self, handler: impl Handler) -> Self {
        self.0.push(Arc::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn as_slice(&self) -> &[BoxedHandler] {
        &self.0
    }
}

/// Anything that can be registered as a route's handler list.
pub trait IntoChain {
    fn into_chain(self) -> Chain;
}

impl IntoChain for Chain {
    fn into_chain(self) -> Chain { self }
}

impl<H: Handler> IntoChain for H {
    fn into_chain(self) -> Chain { Chain::new(self) }
}
