//! Minimal weir demo: a few routes, an auth middleware and request tracing.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/
//!   curl http://localhost:3000/users/42
//!   curl http://localhost:3000/files/docs/readme.txt
//!   curl -X POST http://localhost:3000/users -H 'authorization: Bearer alice' -d '{"name":"bob"}'
//!   curl http://localhost:3000/missing

use http::{Method, StatusCode};
use tracing_subscriber::EnvFilter;
use weir::{App, BoxFuture, Chain, Context, Next, Outcome, Pool, Response, Server, middleware};

#[tokio::main]
async fn main() -> weir::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = App::with_pool(Pool::with_max_idle(1024))
        .with(middleware::Trace)
        .on(Method::GET,  "/",          home)
        .on(Method::GET,  "/users/:id", get_user)
        .on(Method::POST, "/users",     Chain::new(authenticate).then(create_user))
        .on(Method::GET,  "/files/*",   get_file);

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

fn home<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Outcome> {
    Box::pin(async move { Ok(Some(ctx.text("home"))) })
}

// GET /users/:id
fn get_user<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        let id = ctx.param("id").unwrap_or("unknown").to_owned();
        Ok(Some(ctx.json(format!(r#"{{"id":"{id}","name":"alice"}}"#))))
    })
}

// Stashes the caller for the next handler in the chain, or answers 401.
fn authenticate<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        let Some(user) = ctx.get("authorization").and_then(|v| v.strip_prefix("Bearer ")) else {
            return Ok(Some(ctx.reply(StatusCode::UNAUTHORIZED)));
        };
        let user = user.to_owned();
        ctx.state.insert("user", user);
        next.run(ctx).await
    })
}

// POST /users
//
// ctx.body() is &[u8]; parse with serde_json::from_slice or whatever you like.
fn create_user<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        if ctx.body().is_empty() {
            return Ok(Some(ctx.reply(StatusCode::BAD_REQUEST)));
        }
        let by = ctx.state.get::<String>("user").cloned().unwrap_or_default();
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/99")
            .json(format!(r#"{{"id":"99","created_by":"{by}"}}"#));
        Ok(Some(ctx.reply(res)))
    })
}

// GET /files/* echoes the unmatched suffix.
fn get_file<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        let rest = ctx.param(weir::WILDCARD_PARAM).unwrap_or_default().to_owned();
        Ok(Some(ctx.text(rest)))
    })
}
