use std::time::Instant;

use tracing::{Instrument, info, info_span};

use crate::context::Context;
use crate::handler::{BoxFuture, Handler, Outcome};
use crate::pipeline::Next;

/// Logs one `info` event per request with its status and latency.
///
/// Everything downstream runs inside a `request` span carrying the method
/// and path, so events emitted by handlers are attributed to the request.
/// Errors are not logged here; [`Adapter::error`](crate::Adapter::error)
/// sees them once they leave the pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Handler for Trace {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        let span = info_span!("request", method = %ctx.method, path = ctx.path());
        Box::pin(
            async move {
                let started = Instant::now();
                let outcome = next.run(ctx).await?;
                let latency_us = started.elapsed().as_micros() as u64;
                // A handler may have stored its response instead of returning it.
                match outcome.as_ref().or(ctx.response.as_ref()) {
                    Some(res) => info!(status = res.status_code().as_u16(), latency_us, "request finished"),
                    None => info!(latency_us, "request finished without a response"),
                }
                Ok(outcome)
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use http::StatusCode;
    use parking_lot::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::pipeline::Pipeline;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn store_accepted<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            ctx.respond(StatusCode::ACCEPTED);
            next.run(ctx).await
        })
    }

    fn none<'a>(_ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        Box::pin(async { Ok(None) })
    }

    async fn traced(handler: impl Handler) -> (StatusCode, String) {
        let logs = Captured::default();
        let subscriber = tracing_subscriber::fmt().with_writer(logs.clone()).with_ansi(false).finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut pipeline = Pipeline::new();
        pipeline.push(Trace);
        pipeline.push(handler);
        let mut ctx = Context::new();
        let res = pipeline.run(&mut ctx, &none).await.unwrap();
        (res.status_code(), logs.text())
    }

    #[tokio::test]
    async fn logs_the_status_of_a_stored_response() {
        let (status, logs) = traced(store_accepted).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(logs.contains("status=202"), "{logs}");
        assert!(!logs.contains("status=204"), "{logs}");
    }

    #[tokio::test]
    async fn no_status_when_nothing_answered() {
        fn pass<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
            next.run(ctx)
        }
        let (status, logs) = traced(pass).await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(logs.contains("request finished without a response"), "{logs}");
        assert!(!logs.contains("status="), "{logs}");
    }
}
