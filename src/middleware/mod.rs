//! Built-in middleware.
//!
//! Middleware is the right place for cross-cutting concerns: structured
//! tracing, request-id injection, authentication-header inspection. Register
//! it with [`App::with`](crate::App::with); it runs for every request, before
//! route handlers, in registration order.
//!
//! - [`Trace`]: per-request span with method, path, status and latency

mod trace;

pub use trace::Trace;
