//! Cross-thread handle to a context.
//!
//! `Context` itself is single-owner. When several threads need the same
//! registry, wrap it once and clone the handle; every access takes the one
//! mutex, so construction, deletion and decode never interleave.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::context::Context;

#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    inner: Arc<Mutex<Context>>,
}

impl SharedContext {
    pub fn new(ctx: Context) -> Self {
        Self { inner: Arc::new(Mutex::new(ctx)) }
    }

    /// Hold the context until the guard drops.
    pub fn lock(&self) -> MutexGuard<'_, Context> {
        self.inner.lock()
    }

    /// Run `f` with exclusive access.
    pub fn with<T>(&self, f: impl FnOnce(&mut Context) -> T) -> T {
        let mut ctx = self.inner.lock();
        f(&mut ctx)
    }

    /// Number of handles sharing this context.
    pub fn handles(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl From<Context> for SharedContext {
    fn from(ctx: Context) -> Self {
        Self::new(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_handle_is_send_and_sync() {
        assert_send_sync::<SharedContext>();
    }

    #[test]
    fn test_threads_share_one_registry() {
        let shared = SharedContext::from(Context::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        shared.with(|ctx| ctx.create("GenericInt")).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(shared.lock().len(), 100);
        assert_eq!(shared.handles(), 1);
    }
}
