//! The seam between weir and a host runtime.
//!
//! An adapter knows how to read the runtime's native request. weir knows
//! everything else. [`HyperAdapter`](crate::HyperAdapter) is the bundled
//! one; a serverless or test host implements the trait for its own request
//! type.

use http::StatusCode;
use tracing::error;

use crate::context::Context;
use crate::error::Error;
use crate::response::Response;

/// Fills a [`Context`] from a native request and supplies the responses weir
/// does not build itself.
pub trait Adapter: Send + Sync {
    /// The runtime's native request.
    type Request;

    /// Populates every field the pipeline and handlers will read: at least
    /// `url` and `method`, plus headers, query and body where the runtime
    /// has them.
    ///
    /// `ctx` always arrives empty. Called exactly once per request, and
    /// never awaited: anything asynchronous (such as collecting the body)
    /// must happen before [`App::handler`](crate::App::handler) is called.
    fn fill(&self, ctx: &mut Context, req: Self::Request) -> Result<(), Error>;

    /// The response used when no route matches.
    fn not_found(&self, _ctx: &mut Context) -> Response {
        Response::status(StatusCode::NOT_FOUND)
    }

    /// Called once for every error that escapes the pipeline, before weir
    /// answers with [`Error::status`]. Use it for logging and cleanup; it
    /// cannot change the response.
    fn error(&self, err: &Error) {
        error!(status = err.status().as_u16(), error = %err, "request failed");
    }
}
