//! One-shot asynchronous execution of store operations.
//!
//! [`dispatch`] runs a unit of work on its own OS thread and hands back a
//! [`StoreChannel`] that yields exactly one result. There is no pool and no
//! queue: every call gets a fresh worker, and a started worker always runs to
//! completion even if nobody reads its result.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use parley_shared::{AppError, AppResult};

/// Receiving side of a dispatched operation.
///
/// Either block on it with [`StoreChannel::recv`] or `.await` it.
#[must_use = "a StoreChannel does nothing unless its result is received"]
pub struct StoreChannel<T> {
    location: &'static str,
    rx: oneshot::Receiver<AppResult<T>>,
}

impl<T> StoreChannel<T> {
    /// Block the current thread until the worker delivers its result.
    ///
    /// Must not be called from within an async runtime; `.await` the channel
    /// there instead.
    pub fn recv(self) -> AppResult<T> {
        let location = self.location;
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(worker_lost(location)))
    }

    /// A channel that is already resolved, for paths that answer without
    /// touching the database.
    pub fn ready(location: &'static str, result: AppResult<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { location, rx }
    }
}

impl<T> Future for StoreChannel<T> {
    type Output = AppResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let location = self.location;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(worker_lost(location))))
    }
}

/// Run `f` on a dedicated worker thread and return the channel its result
/// will be delivered on.
///
/// A panic inside `f` is caught and delivered as an internal error.
pub fn dispatch<T, F>(location: &'static str, f: F) -> StoreChannel<T>
where
    T: Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    let spawned = std::thread::Builder::new()
        .name(format!("store:{location}"))
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
                tracing::error!(location, "store worker panicked");
                Err(AppError::internal(
                    location,
                    "store.dispatch.panic.app_error",
                    "The store operation failed unexpectedly",
                ))
            });
            // The caller may have dropped the channel; the result is discarded.
            let _ = tx.send(result);
        });

    if let Err(e) = spawned {
        // The closure, and with it the sender, was dropped: the receiver
        // resolves to `worker_lost`.
        tracing::error!(location, error = %e, "failed to spawn store worker");
    }

    StoreChannel { location, rx }
}

fn worker_lost(location: &str) -> AppError {
    AppError::internal(
        location,
        "store.dispatch.closed.app_error",
        "The store operation ended without a result",
    )
}
