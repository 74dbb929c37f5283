//! # weir
//!
//! A request-routing and middleware-dispatch core for pluggable HTTP runtimes.
//!
//! ## The contract
//!
//! The host runtime parses HTTP, terminates TLS and streams bodies. weir
//! does not. An [`Adapter`] fills a pooled [`Context`] from the runtime's
//! native request, and weir does the rest:
//!
//! - Prefix-tree routing with static, `:param` and trailing `*` segments
//! - Onion-style middleware: every handler may answer, delegate with
//!   `next`, or decline
//! - Context pooling, so warm requests reuse the buffers of earlier ones
//!
//! A hyper/tokio [`Server`] ships as the default runtime.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use weir::{App, BoxFuture, Context, Next, Outcome, Server, middleware};
//! use http::Method;
//!
//! #[tokio::main]
//! async fn main() -> weir::Result<()> {
//!     let app = App::new()
//!         .with(middleware::Trace)
//!         .on(Method::GET, "/users/:id", get_user)
//!         .on(Method::GET, "/files/*",   get_file);
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! fn get_user<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Outcome> {
//!     Box::pin(async move {
//!         let id = ctx.param("id").unwrap_or("unknown").to_owned();
//!         Ok(Some(ctx.json(format!(r#"{{"id":"{id}"}}"#))))
//!     })
//! }
//!
//! fn get_file<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Outcome> {
//!     Box::pin(async move {
//!         let rest = ctx.param("*").unwrap_or_default().to_owned();
//!         Ok(Some(ctx.text(rest)))
//!     })
//! }
//! ```

mod adapter;
mod app;
mod context;
mod error;
mod handler;
mod pipeline;
mod pool;
mod response;
mod router;
mod server;

pub mod middleware;

pub use adapter::Adapter;
pub use app::App;
pub use context::{Context, State};
pub use error::{BoxError, Error, Result};
pub use handler::{BoxFuture, BoxedHandler, Chain, Handler, IntoChain, Outcome};
pub use pipeline::{Next, Pipeline, Terminal};
pub use pool::{Pool, Pooled};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Match, Router, WILDCARD_PARAM};
pub use server::{HyperAdapter, Server};
