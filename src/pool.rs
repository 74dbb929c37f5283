//! Context recycling.
//!
//! Every request needs a [`Context`]. Under load, building a fresh one per
//! request means fresh maps and fresh header storage every time. The pool
//! keeps released contexts on a free list instead, so a warm request reuses
//! the buffers an earlier one already grew.
//!
//! ```text
//! acquire ──► free list non-empty? ──yes──► pop (warm)
//!                    │
//!                    no ──► Context::new() (cold)
//!
//! Pooled dropped ──► reset containers ──► push (unless max_idle reached)
//! ```
//!
//! The pool is an explicit handle owned by the [`App`](crate::App), not a
//! process-wide singleton. The free list sits behind a mutex so one pool can
//! serve requests running on several worker threads.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::context::Context;

/// A free list of reusable [`Context`] values.
#[derive(Debug, Default)]
pub struct Pool {
    free: Mutex<Vec<Context>>,
    max_idle: Option<usize>,
    allocated: AtomicUsize,
}

impl Pool {
    /// A pool that keeps every released context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool that keeps at most `max_idle` released contexts; extra ones are
    /// dropped on release.
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self { max_idle: Some(max_idle), ..Self::default() }
    }

    /// Takes a context off the free list, or builds one if the list is empty.
    ///
    /// The returned guard gives the context back when it is dropped, whether
    /// the request succeeded, failed or panicked.
    pub fn acquire(&self) -> Pooled<'_> {
        let warm = self.free.lock().pop();
        let ctx = warm.unwrap_or_else(|| {
            let n = self.allocated.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(allocated = n, "allocating context");
            Context::new()
        });
        Pooled { ctx, pool: self }
    }

    /// Resets `ctx` and returns it to the free list.
    ///
    /// Only data containers are reset. The method is left alone since the
    /// next `fill` always overwrites it.
    pub fn release(&self, mut ctx: Context) {
        ctx.reset();
        let mut free = self.free.lock();
        if self.max_idle.is_none_or(|max| free.len() < max) {
            free.push(ctx);
        }
    }

    /// Number of contexts currently waiting on the free list.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Number of contexts this pool has ever built.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// A [`Context`] on loan from a [`Pool`].
///
/// Derefs to the context. Dropping it releases the context back to the pool.
pub struct Pooled<'p> {
    ctx: Context,
    pool: &'p Pool,
}

impl Deref for Pooled<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.ctx
    }
}

impl DerefMut for Pooled<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }
}

impl Drop for Pooled<'_> {
    fn drop(&mut self) {
        // Context::new() does not allocate; it only stands in until the
        // guard itself goes away.
        let ctx = std::mem::replace(&mut self.ctx, Context::new());
        self.pool.release(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_context_comes_back_empty() {
        let pool = Pool::new();
        {
            let mut ctx = pool.acquire();
            ctx.state.insert("user", "alice".to_owned());
            ctx.params.insert("id".into(), "42".into());
            ctx.query.insert("page".into(), "2".into());
            ctx.respond("done");
        }
        assert_eq!(pool.idle(), 1);

        let ctx = pool.acquire();
        assert!(ctx.state.is_empty());
        assert!(ctx.params.is_empty());
        assert!(ctx.query.is_empty());
        assert!(!ctx.responded);
        assert!(ctx.response.is_none());
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn cold_acquire_allocates_per_outstanding_context() {
        let pool = Pool::new();
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.allocated(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 2);
        let _c = pool.acquire();
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn max_idle_caps_the_free_list() {
        let pool = Pool::with_max_idle(1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn warm_context_keeps_url_capacity() {
        let pool = Pool::new();
        {
            let mut ctx = pool.acquire();
            ctx.url.push_str("/a/fairly/long/path/that/allocates");
        }
        let ctx = pool.acquire();
        assert!(ctx.url.is_empty());
        assert!(ctx.url.capacity() > 0);
    }
}
