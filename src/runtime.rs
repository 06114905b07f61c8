//! Shared tokio runtime.
//!
//! Sockets are driven by a multi-threaded runtime that lives for the rest of
//! the process once first used. The public client API is blocking; each call
//! parks the calling thread in [`block_on`] while its future runs.

use std::sync::OnceLock;
use tokio::runtime::Runtime;

use crate::error::{KvError, Result};

/// Global tokio runtime, initialized once on first use.
static RUNTIME: OnceLock<std::result::Result<Runtime, String>> = OnceLock::new();

/// Get (or initialize) the global tokio runtime.
///
/// Worker thread count defaults to the number of CPU cores; override with
/// the `KVLINK_RUNTIME_THREADS` environment variable.
pub fn get_runtime() -> Result<&'static Runtime> {
    let rt = RUNTIME.get_or_init(|| {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all();

        if let Ok(threads) = std::env::var("KVLINK_RUNTIME_THREADS") {
            if let Ok(n) = threads.parse::<usize>() {
                if n > 0 {
                    builder.worker_threads(n);
                }
            }
        }

        builder
            .thread_name("kvlink-rt")
            .build()
            .map_err(|e| e.to_string())
    });
    rt.as_ref()
        .map_err(|e| KvError::System(format!("failed to create tokio runtime: {e}")))
}

/// Block on a future using the global runtime.
///
/// Must NOT be called from within an async context (tokio panics).
pub fn block_on<F, T>(future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    get_runtime()?.block_on(future)
}

/// Spawn a future on the global runtime.
pub fn spawn<F>(future: F) -> Result<tokio::task::JoinHandle<F::Output>>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    Ok(get_runtime()?.spawn(future))
}

// ── Tests ──────────────────────────────────────────────────────────
