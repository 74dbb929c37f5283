//! The per-request context threaded through middleware and route handlers.
//!
//! A [`Context`] is never built by hand. [`Pool`](crate::Pool) owns every
//! instance, an [`Adapter`](crate::Adapter) fills it from the native request,
//! and it goes back to the pool once [`App::handler`](crate::App::handler)
//! returns. Nothing may hold on to it past that point; the borrow checker
//! enforces this since handlers only ever see `&mut Context`.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use http::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use http::Method;

use crate::error::Error;
use crate::response::{IntoResponse, Response};

/// Mutable state for exactly one in-flight request.
#[derive(Debug)]
pub struct Context {
    /// Path and query as received, e.g. `/users/42?fields=name`.
    pub url: String,
    pub method: Method,
    /// Decoded path parameters captured by the router.
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    /// Free-form bag for middleware to hand data downstream.
    pub state: State,
    pub headers: HeaderMap,
    /// Headers staged by middleware, merged into the response built by
    /// [`Context::reply`].
    pub response_headers: HeaderMap,
    pub body: Bytes,
    /// Set once a terminal response has been produced.
    pub responded: bool,
    /// A terminal response stored with [`Context::respond`] rather than returned.
    pub response: Option<Response>,
}

impl Context {
    pub(crate) fn new() -> Self {
        Self {
            url: String::new(),
            method: Method::GET,
            params: BTreeMap::new(),
            query: BTreeMap::new(),
            state: State::default(),
            headers: HeaderMap::new(),
            response_headers: HeaderMap::new(),
            body: Bytes::new(),
            responded: false,
            response: None,
        }
    }

    /// Empties every data container. Capacity of the string and header maps
    /// is kept for the next request.
    pub(crate) fn reset(&mut self) {
        self.url.clear();
        self.params.clear();
        self.query.clear();
        self.state.clear();
        self.headers.clear();
        self.response_headers.clear();
        self.body = Bytes::new();
        self.responded = false;
        self.response = None;
    }

    /// The pathname: everything in [`url`](Context::url) before `?`.
    pub fn path(&self) -> &str {
        match self.url.split_once('?') {
            Some((path, _)) => path,
            None => &self.url,
        }
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `ctx.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Case-insensitive request header lookup. Non-ASCII values read as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Looks a cookie up across every `Cookie` header of the request.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"'))
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> Result<&str, Error> {
        Ok(std::str::from_utf8(&self.body)?)
    }

    /// Stages a response header. Repeated names are appended, not replaced.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let name = HeaderName::try_from(name)?;
        let value = HeaderValue::try_from(value)?;
        self.response_headers.append(name, value);
        Ok(())
    }

    /// `200 OK` text response carrying the staged headers.
    pub fn text(&mut self, body: impl Into<String>) -> Response {
        self.reply(Response::text(body))
    }

    /// `200 OK` JSON response carrying the staged headers.
    pub fn json(&mut self, body: impl Into<Bytes>) -> Response {
        self.reply(Response::json(body))
    }

    /// Finalizes any response: merges staged headers and marks the request
    /// as responded.
    pub fn reply(&mut self, res: impl IntoResponse) -> Response {
        let mut res = res.into_response();
        res.headers.extend(self.response_headers.drain());
        self.responded = true;
        res
    }

    /// Stores a terminal response on the context instead of returning it.
    /// Used by the pipeline when no handler returns one explicitly.
    pub fn respond(&mut self, res: impl IntoResponse) {
        let res = self.reply(res);
        self.response = Some(res);
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// String-keyed bag of arbitrary values.
///
/// ```rust,ignore
/// ctx.state.insert("user_id", 42_u64);
/// let id: Option<&u64> = ctx.state.get("user_id");
/// ```
#[derive(Default)]
pub struct State(BTreeMap<String, Box<dyn Any + Send + Sync>>);

impl State {
    /// Inserts `value` under `key`, replacing whatever was there.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.0.insert(key.into(), Box::new(value));
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.0.get(key)?.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.0.get_mut(key)?.downcast_mut::<T>()
    }

    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        let boxed = self.0.remove(key)?;
        boxed.downcast::<T>().ok().map(|b| *b)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_strips_query() {
        let mut ctx = Context::new();
        ctx.url.push_str("/a/b?x=1");
        assert_eq!(ctx.path(), "/a/b");
        ctx.url = "/plain".into();
        assert_eq!(ctx.path(), "/plain");
    }

    #[test]
    fn cookie_lookup_spans_headers() {
        let mut ctx = Context::new();
        ctx.headers.append(COOKIE, HeaderValue::from_static("a=1; theme=\"dark\""));
        ctx.headers.append(COOKIE, HeaderValue::from_static("sid=xyz"));
        assert_eq!(ctx.cookie("theme"), Some("dark"));
        assert_eq!(ctx.cookie("sid"), Some("xyz"));
        assert_eq!(ctx.cookie("missing"), None);
    }

    #[test]
    fn reply_merges_staged_headers() {
        let mut ctx = Context::new();
        ctx.set("x-request-id", "abc").unwrap();
        let res = ctx.text("ok");
        assert!(ctx.responded);
        assert_eq!(res.headers()["x-request-id"], "abc");
        assert!(ctx.response_headers.is_empty());
    }

    #[test]
    fn set_rejects_bad_names() {
        let mut ctx = Context::new();
        assert!(matches!(ctx.set("no spaces", "v"), Err(Error::InvalidHeaderName(_))));
    }

    #[test]
    fn body_text_rejects_invalid_utf8() {
        let mut ctx = Context::new();
        ctx.body = Bytes::from_static(&[0xff, 0xfe]);
        assert!(matches!(ctx.body_text(), Err(Error::Utf8(_))));
    }

    #[test]
    fn state_is_typed() {
        let mut state = State::default();
        state.insert("n", 7_u32);
        assert_eq!(state.get::<u32>("n"), Some(&7));
        assert_eq!(state.get::<String>("n"), None);
        *state.get_mut::<u32>("n").unwrap() += 1;
        assert_eq!(state.remove::<u32>("n"), Some(8));
        assert!(state.is_empty());
    }

    #[test]
    fn reset_empties_containers() {
        let mut ctx = Context::new();
        ctx.url.push_str("/x");
        ctx.params.insert("id".into(), "1".into());
        ctx.query.insert("q".into(), "2".into());
        ctx.state.insert("k", ());
        ctx.respond("done");
        ctx.reset();
        assert!(ctx.url.is_empty());
        assert!(ctx.params.is_empty() && ctx.query.is_empty() && ctx.state.is_empty());
        assert!(!ctx.responded);
        assert!(ctx.response.is_none());
    }
}
