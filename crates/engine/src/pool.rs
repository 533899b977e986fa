use std::future::Future;

use futures_util::stream::{self, StreamExt};
use tracing::error;

use common::{Error, Result};

/// Bounded fan-out of independent per-symbol jobs.
///
/// At most `width` jobs are in flight at once. Each job runs on its own
/// spawned task, so a job that panics only loses its own result. Results come
/// back in completion order; callers sort afterwards.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    width: usize,
}

impl WorkerPool {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Run `job` once per symbol and return every `(symbol, result)` pair.
    pub async fn run<T, F, Fut>(&self, symbols: Vec<String>, job: F) -> Vec<(String, Result<T>)>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        stream::iter(symbols)
            .map(|symbol| {
                // Spawned lazily: the stream is only polled while the buffer
                // has room, which is what bounds concurrency.
                let handle = tokio::spawn(job(symbol.clone()));
                async move {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => {
                            error!(symbol = %symbol, error = %e, "Worker task aborted");
                            Err(Error::Other(format!("worker task aborted: {e}")))
                        }
                    };
                    (symbol, result)
                }
            })
            .buffer_unordered(self.width)
            .collect()
            .await
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(5)
    }
}
