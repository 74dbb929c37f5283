//! Prefix-tree request router.
//!
//! Every node owns a static path fragment (`prefix`), an ordered list of
//! static children, at most one `:name` parameter child and at most one
//! trailing `*` wildcard child. Handler chains hang off nodes, keyed by method.
//!
//! ```text
//! add GET /            add GET /users/:id        add GET /files/*
//!
//! (root)
//!   └─ "/"           ← GET home
//!        ├─ "users"
//!        │    └─ :id ← GET user
//!        └─ "files"
//!             └─ *   ← GET file
//! ```
//!
//! # Matching
//!
//! The path is walked once, left to right, with no backtracking. At each node
//! the first static child whose prefix matches at the cursor wins, in
//! insertion order (not longest prefix). Failing that, the parameter child
//! captures the segment starting at the cursor, up to the next `/`; it never
//! starts in the middle of a segment. When neither applies the walk stops.
//! The route matches if the whole path was consumed and the node has a chain
//! for the method; otherwise the last wildcard passed on the walk with a
//! chain for the method takes the rest of the path, provided the rest begins
//! on a segment boundary. No match is not an error: dispatch falls through to
//! the caller's fallback.
//!
//! Insertion keeps sibling prefixes disjoint in the common case. Registering
//! a route whose first fragment is a strict prefix of an existing sibling's
//! (`/abc` then `/ab`) leaves both siblings in place, and requests that both
//! match go to whichever was registered first.
//!
//! Build the tree once at startup. Lookups take `&self` and are safe from any
//! number of threads; registration needs `&mut self`.

use std::collections::HashMap;
use std::ops::Range;

use http::Method;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, Chain, IntoChain, Outcome};
use crate::pipeline::{Cursor, Decline, Next, Terminal, settle};
use crate::response::Response;

/// Parameter name under which a wildcard route receives the unmatched suffix.
pub const WILDCARD_PARAM: &str = "*";

/// The routing trie.
#[derive(Default)]
pub struct Router {
    root: Node,
}

#[derive(Default)]
struct Node {
    prefix: String,
    children: Vec<Node>,
    param_child: Option<Box<Node>>,
    wildcard_child: Option<Box<Node>>,
    handlers: HashMap<Method, Chain>,
    param_name: Option<String>,
}

/// A successful lookup: the chain to run and the decoded path parameters.
pub struct Match<'r> {
    pub chain: &'r Chain,
    pub params: Vec<(String, String)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a chain for `method` and `path`. Returns `self` for chaining.
    ///
    /// ```rust,ignore
    /// Router::new()
    ///     .on(Method::GET,    "/users/:id", get_user)
    ///     .on(Method::DELETE, "/users/:id", delete_user)
    ///     .on(Method::GET,    "/files/*",   serve_file);
    /// ```
    pub fn on(mut self, method: Method, path: &str, chain: impl IntoChain) -> Self {
        self.add(method, path, chain);
        self
    }

    /// Registers a chain for `method` and `path`.
    ///
    /// A single trailing slash is dropped (`/a/` registers `/a`), except for
    /// `/` itself. Registering the same method and path again replaces the
    /// earlier chain.
    pub fn add(&mut self, method: Method, path: &str, chain: impl IntoChain) {
        let method = canonical(method);
        let path = normalize(path);
        debug!(%method, path, "route registered");
        self.root.insert(path, method, chain.into_chain());
    }

    /// Resolves `method` and `path` to a chain.
    ///
    /// Parameters are percent-decoded only once a route has matched. A
    /// parameter that does not decode to UTF-8 fails with
    /// [`Error::MalformedParam`].
    pub fn find<'r>(&'r self, method: &Method, path: &str) -> Result<Option<Match<'r>>, Error> {
        let mut node = &self.root;
        let mut i = 0;
        let mut raw: Vec<(&'r str, Range<usize>)> = Vec::new();
        // (chain, cursor, params captured so far) for the last usable wildcard.
        let mut catch_all = node.catch_all(method, path, 0).map(|chain| (chain, 0, 0));

        while i < path.len() {
            let rest = &path[i..];
            if let Some(child) = node.children.iter().find(|c| rest.starts_with(c.prefix.as_str())) {
                i += child.prefix.len();
                node = child;
            } else if let Some(param) = node.param_child.as_deref() {
                let start = if rest.starts_with('/') {
                    i + 1
                } else if path[..i].ends_with('/') {
                    i
                } else {
                    break;
                };
                let end = path[start..].find('/').map_or(path.len(), |n| start + n);
                if end == start {
                    break;
                }
                raw.push((param.param_name.as_deref().unwrap_or_default(), start..end));
                i = end;
                node = param;
            } else {
                break;
            }
            if let Some(chain) = node.catch_all(method, path, i) {
                catch_all = Some((chain, i, raw.len()));
            }
        }

        if i == path.len() {
            if let Some(chain) = node.handlers.get(method) {
                return decode(path, raw).map(|params| Some(Match { chain, params }));
            }
        }

        let Some((chain, at, captured)) = catch_all else {
            return Ok(None);
        };
        raw.truncate(captured);
        let start = if path[at..].starts_with('/') { at + 1 } else { at };
        raw.push((WILDCARD_PARAM, start..path.len()));
        decode(path, raw).map(|params| Some(Match { chain, params }))
    }

    /// Runs the chain matched for `ctx`, or `fallback` if nothing matched.
    ///
    /// Within a route's chain a handler that returns `None` ends the chain,
    /// and exhausting the chain runs `fallback`. No response becomes an empty
    /// `204 No Content`.
    pub async fn dispatch(&self, ctx: &mut Context, fallback: &dyn Terminal) -> Result<Response, Error> {
        let Some(found) = self.find(&ctx.method, ctx.path())? else {
            let outcome = fallback.run(ctx).await?;
            return Ok(settle(ctx, outcome));
        };

        ctx.params.extend(found.params);
        let cursor = Cursor::new();
        let outcome = Next::new(found.chain.as_slice(), &cursor, fallback, Decline::Stop)
            .run(ctx)
            .await?;
        Ok(settle(ctx, outcome))
    }
}

/// Route dispatch packaged as the pipeline's terminal.
pub(crate) struct RouteTerminal<'r> {
    pub(crate) router: &'r Router,
    pub(crate) fallback: &'r dyn Terminal,
}

impl Terminal for RouteTerminal<'_> {
    fn run<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        Box::pin(async move { self.router.dispatch(ctx, self.fallback).await.map(Some) })
    }
}

impl Node {
    fn insert(&mut self, path: &str, method: Method, chain: Chain) {
        if path.is_empty() {
            self.handlers.insert(method, chain);
            return;
        }

        if let Some(child) = self.children.iter_mut().find(|c| path.starts_with(c.prefix.as_str())) {
            let rest = &path[child.prefix.len()..];
            child.insert(rest, method, chain);
            return;
        }

        if let Some((name, rest)) = param_segment(path) {
            let child = self.param_child.get_or_insert_with(Box::default);
            match child.param_name.as_deref() {
                Some(existing) if existing != name => {
                    warn!(existing, replacement = name, "conflicting parameter names, last one wins");
                    child.param_name = Some(name.to_owned());
                }
                Some(_) => {}
                None => child.param_name = Some(name.to_owned()),
            }
            child.insert(rest, method, chain);
            return;
        }

        if path.strip_prefix('/').unwrap_or(path).starts_with('*') {
            let child = self.wildcard_child.get_or_insert_with(Box::default);
            child.handlers.insert(method, chain);
            return;
        }

        let end = path.bytes().skip(1).position(|b| b == b'/').map_or(path.len(), |n| n + 1);
        let mut child = Node { prefix: path[..end].to_owned(), ..Node::default() };
        if child.prefix == "/" {
            // The walk always enters a "/" child first, so `/:name` and `/*`
            // registered earlier must move below it to stay reachable.
            child.param_child = self.param_child.take();
            child.wildcard_child = self.wildcard_child.take();
        }
        let rest = &path[end..];
        child.insert(rest, method, chain);
        self.children.push(child);
    }

    /// The wildcard chain for `method`, if the wildcard may take `path[at..]`.
    fn catch_all(&self, method: &Method, path: &str, at: usize) -> Option<&Chain> {
        let wildcard = self.wildcard_child.as_deref()?;
        let suffix = &path[at..];
        if !(suffix.is_empty() || suffix.starts_with('/') || path[..at].ends_with('/')) {
            return None;
        }
        wildcard.handlers.get(method)
    }
}

/// Splits `:name/rest` or `/:name/rest` into `("name", "/rest")`.
fn param_segment(path: &str) -> Option<(&str, &str)> {
    let body = path.strip_prefix("/:").or_else(|| path.strip_prefix(':'))?;
    let end = body.find('/').unwrap_or(body.len());
    Some((&body[..end], &body[end..]))
}

fn normalize(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}

/// Uppercases extension methods so `get` and `GET` register the same route.
fn canonical(method: Method) -> Method {
    let upper = method.as_str().to_ascii_uppercase();
    if upper == method.as_str() {
        return method;
    }
    Method::from_bytes(upper.as_bytes()).unwrap_or(method)
}

fn decode(path: &str, raw: Vec<(&str, Range<usize>)>) -> Result<Vec<(String, String)>, Error> {
    raw.into_iter()
        .map(|(name, range)| match urlencoding::decode(&path[range]) {
            Ok(value) => Ok((name.to_owned(), value.into_owned())),
            Err(source) => Err(Error::MalformedParam { name: name.to_owned(), source }),
        })
        .collect()
}
