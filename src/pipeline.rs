//! Onion-style handler composition.
//!
//! A run walks an ordered handler list with one shared cursor. Each handler
//! receives a [`Next`] pointing at the following index; calling
//! [`Next::run`] moves the cursor forward and runs the rest of the list,
//! then the [`Terminal`] once the list is exhausted:
//!
//! ```text
//!   mw[0] ──next──► mw[1] ──next──► … ──next──► terminal (route dispatch)
//!     ▲               ▲                             │
//!     └───────────────┴──────── response ◄──────────┘
//! ```
//!
//! The cursor starts at -1 and may only advance. Re-entering an index at or
//! below it means some handler ran its continuation twice, and the run fails
//! with [`Error::NextCalledTwice`] before anything downstream executes again.
//! The check is per run, not per handler, so it also catches a clone of
//! `next` leaking into a sibling.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, Ordering};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler, Outcome};
use crate::response::Response;

// ── Terminal ──────────────────────────────────────────────────────────────────

/// What runs once a handler list is exhausted.
///
/// For the app pipeline this is route dispatch; for a route's chain it is the
/// adapter's not-found response. Any
/// `for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome>` works.
pub trait Terminal: Send + Sync {
    fn run<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome>;
}

impl<F> Terminal for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome> + Send + Sync,
{
    fn run<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        self(ctx)
    }
}

// ── Cursor ────────────────────────────────────────────────────────────────────

/// Highest index a run has entered so far.
pub(crate) struct Cursor(AtomicIsize);

impl Cursor {
    pub(crate) fn new() -> Self {
        Self(AtomicIsize::new(-1))
    }

    /// Moves to `index`, failing if the cursor is already there or beyond.
    fn advance(&self, index: usize) -> Result<(), Error> {
        let to = index as isize;
        let prev = self.0.fetch_max(to, Ordering::AcqRel);
        if to <= prev {
            return Err(Error::NextCalledTwice { index });
        }
        Ok(())
    }

    fn passed(&self, index: usize) -> bool {
        self.0.load(Ordering::Acquire) > index as isize
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// How a handler that returns `None` without calling `next` is treated.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decline {
    /// Skip straight to the terminal (app middleware).
    FallThrough,
    /// Stop; the caller normalizes to 204 (route handlers).
    Stop,
}

/// The continuation handed to every handler.
///
/// Cheap to clone, but only one call to [`run`](Next::run) per run of the
/// list is ever honoured.
#[derive(Clone)]
pub struct Next<'a> {
    handlers: &'a [BoxedHandler],
    index: usize,
    cursor: &'a Cursor,
    terminal: &'a dyn Terminal,
    decline: Decline,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        handlers: &'a [BoxedHandler],
        cursor: &'a Cursor,
        terminal: &'a dyn Terminal,
        decline: Decline,
    ) -> Self {
        Self { handlers, index: 0, cursor, terminal, decline }
    }

    /// Runs the rest of the list, then the terminal, and returns whatever
    /// comes back.
    pub fn run(self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            self.cursor.advance(self.index)?;

            let Some(handler) = self.handlers.get(self.index) else {
                return self.terminal.run(ctx).await;
            };

            let next = Next { index: self.index + 1, ..self.clone() };
            match handler.call(ctx, next).await? {
                Some(res) => Ok(Some(res)),
                None if self.decline == Decline::FallThrough && !self.cursor.passed(self.index) => {
                    self.terminal.run(ctx).await
                }
                None => Ok(None),
            }
        })
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("len", &self.handlers.len())
            .finish()
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// The app-level middleware list, run for every request before route dispatch.
///
/// Middleware is append-only and runs in registration order. A middleware
/// that returns `None` without calling `next` falls through to the terminal.
#[derive(Clone, Default)]
pub struct Pipeline {
    middleware: Vec<BoxedHandler>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: impl Handler) {
        self.middleware.push(Arc::new(middleware));
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Runs every middleware around `last` and always yields a response.
    ///
    /// If nothing returned one, a response stored with
    /// [`Context::respond`] is used; failing that, an empty `204 No Content`.
    pub async fn run(&self, ctx: &mut Context, last: &dyn Terminal) -> Result<Response, Error> {
        let cursor = Cursor::new();
        let outcome = Next::new(&self.middleware, &cursor, last, Decline::FallThrough)
            .run(ctx)
            .await?;
        Ok(settle(ctx, outcome))
    }
}

/// Turns "no response" into the stored response or 204.
pub(crate) fn settle(ctx: &mut Context, outcome: Option<Response>) -> Response {
    outcome
        .or_else(|| ctx.response.take())
        .unwrap_or_else(Response::no_content)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use http::StatusCode;

    use super::*;

    fn log(ctx: &mut Context, entry: &str) {
        match ctx.state.get_mut::<Vec<String>>("log") {
            Some(v) => v.push(entry.to_owned()),
            None => ctx.state.insert("log", vec![entry.to_owned()]),
        }
    }

    fn entries(ctx: &Context) -> Vec<String> {
        ctx.state.get::<Vec<String>>("log").cloned().unwrap_or_default()
    }

    fn last_ok<'a>(ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            log(ctx, "last");
            Ok(Some(ctx.text("routed")))
        })
    }

    fn last_none<'a>(_ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        Box::pin(async { Ok(None) })
    }

    /// Logs on the way in and out, delegating to `next`.
    struct Wrap(&'static str);

    impl Handler for Wrap {
        fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
            Box::pin(async move {
                log(ctx, &format!("{} in", self.0));
                let res = next.run(ctx).await?;
                log(ctx, &format!("{} out", self.0));
                Ok(res)
            })
        }
    }

    fn twice<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            next.clone().run(ctx).await?;
            next.run(ctx).await
        })
    }

    fn silent<'a>(_ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async { Ok(None) })
    }

    fn swallow<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            next.run(ctx).await?;
            Ok(None)
        })
    }

    fn deny<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move { Ok(Some(ctx.reply(StatusCode::UNAUTHORIZED))) })
    }

    #[tokio::test]
    async fn middleware_wraps_in_registration_order() {
        let mut pipeline = Pipeline::new();
        pipeline.push(Wrap("a"));
        pipeline.push(Wrap("b"));
        let mut ctx = Context::new();

        let res = pipeline.run(&mut ctx, &last_ok).await.unwrap();

        assert_eq!(res.body(), b"routed");
        assert_eq!(entries(&ctx), ["a in", "b in", "last", "b out", "a out"]);
    }

    #[tokio::test]
    async fn calling_next_twice_fails_the_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut pipeline = Pipeline::new();
        pipeline.push(twice);
        pipeline.push(Count(counter));
        let mut ctx = Context::new();

        let err = pipeline.run(&mut ctx, &last_ok).await.unwrap_err();

        assert!(matches!(err, Error::NextCalledTwice { index: 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct Count(Arc<AtomicUsize>);

    impl Handler for Count {
        fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
            self.0.fetch_add(1, Ordering::SeqCst);
            next.run(ctx)
        }
    }

    #[tokio::test]
    async fn no_response_normalizes_to_204() {
        let mut pipeline = Pipeline::new();
        pipeline.push(Wrap("a"));
        let mut ctx = Context::new();

        let res = pipeline.run(&mut ctx, &last_none).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert!(res.body().is_empty());
    }

    #[tokio::test]
    async fn silent_middleware_falls_through_to_last() {
        let mut pipeline = Pipeline::new();
        pipeline.push(silent);
        let mut ctx = Context::new();

        let res = pipeline.run(&mut ctx, &last_ok).await.unwrap();

        assert_eq!(res.body(), b"routed");
    }

    #[tokio::test]
    async fn discarding_downstream_response_yields_204_without_rerouting() {
        let mut pipeline = Pipeline::new();
        pipeline.push(swallow);
        let mut ctx = Context::new();

        let res = pipeline.run(&mut ctx, &last_ok).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert_eq!(entries(&ctx), ["last"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        let mut pipeline = Pipeline::new();
        pipeline.push(deny);
        pipeline.push(Wrap("never"));
        let mut ctx = Context::new();

        let res = pipeline.run(&mut ctx, &last_ok).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert!(entries(&ctx).is_empty());
    }

    #[tokio::test]
    async fn stored_response_beats_204() {
        fn store<'a>(ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
            Box::pin(async move {
                ctx.respond(StatusCode::ACCEPTED);
                Ok(None)
            })
        }
        let pipeline = Pipeline::new();
        let mut ctx = Context::new();

        let res = pipeline.run(&mut ctx, &store).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
    }

    #[test]
    fn cursor_only_moves_forward() {
        let cursor = Cursor::new();
        assert!(cursor.advance(0).is_ok());
        assert!(cursor.advance(2).is_ok());
        assert!(matches!(cursor.advance(1), Err(Error::NextCalledTwice { index: 1 })));
        assert!(matches!(cursor.advance(2), Err(Error::NextCalledTwice { index: 2 })));
        assert!(cursor.passed(1));
        assert!(!cursor.passed(2));
    }
}
