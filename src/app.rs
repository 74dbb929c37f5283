//! The composition root.
//!
//! [`App::handler`] is the one call an adapter makes per request:
//!
//! ```text
//! pool.acquire ─► adapter.fill ─► pipeline ─► router.dispatch ─► adapter.not_found
//!       ▲                                                              │
//!       └──────────── Pooled dropped (always) ◄──── response ◄─────────┘
//! ```

use http::Method;

use crate::adapter::Adapter;
use crate::context::Context;
use crate::handler::{BoxFuture, Handler, IntoChain, Outcome};
use crate::pipeline::{Pipeline, Terminal};
use crate::pool::Pool;
use crate::response::Response;
use crate::router::{RouteTerminal, Router};

/// Routes, middleware and the context pool for one application.
///
/// ```rust,ignore
/// let app = App::new()
///     .with(middleware::Trace)
///     .on(Method::GET, "/users/:id", get_user)
///     .on(Method::GET, "/files/*",   serve_file);
/// ```
///
/// Build it once at startup. `handler` only needs `&self`, so one `App`
/// behind an `Arc` serves every connection.
#[derive(Default)]
pub struct App {
    router: Router,
    pipeline: Pipeline,
    pool: Pool,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// An app that recycles contexts through `pool`.
    pub fn with_pool(pool: Pool) -> Self {
        Self { pool, ..Self::default() }
    }

    /// Registers a route. See [`Router::add`] for path syntax.
    pub fn on(mut self, method: Method, path: &str, chain: impl IntoChain) -> Self {
        self.router.add(method, path, chain);
        self
    }

    /// Appends a middleware; it runs after every middleware already added.
    pub fn with(mut self, middleware: impl Handler) -> Self {
        self.pipeline.push(middleware);
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Handles one request end to end and always returns a response.
    ///
    /// Errors never escape. [`Adapter::error`] sees each one, and the
    /// response is an empty body with [`Error::status`](crate::Error::status)
    /// (500, or 400 for an undecodable path parameter). The context goes back
    /// to the pool however the request ends.
    pub async fn handler<A: Adapter>(&self, req: A::Request, adapter: &A) -> Response {
        let mut ctx = self.pool.acquire();
        let fallback = NotFound(adapter);
        let last = RouteTerminal { router: &self.router, fallback: &fallback };

        let result = match adapter.fill(&mut ctx, req) {
            Ok(()) => self.pipeline.run(&mut ctx, &last).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(res) => res,
            Err(e) => {
                adapter.error(&e);
                Response::status(e.status())
            }
        }
    }
}

/// The adapter's not-found response as a terminal.
struct NotFound<'a, A>(&'a A);

impl<A: Adapter> Terminal for NotFound<'_, A> {
    fn run<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        Box::pin(async move { Ok(Some(self.0.not_found(ctx))) })
    }
}
