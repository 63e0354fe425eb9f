// cache.rs

use thiserror::Error;
use tokio::{sync::Mutex, time::timeout};

use crate::*;

pub const FETCH_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum MetricsError {
    #[error("metrics locked")]
    LockContention,
    #[error("metrics buffer overflow")]
    SerializationOverflow,
}

/// Latest complete snapshot. The sampler publishes, request handlers fetch.
///
/// The lock is only ever held across a plain copy of the snapshot, so a reader
/// sees either the previous cycle or the new one, never a mix.
pub struct MetricsCache {
    snapshot: Mutex<MetricsSnapshot>,
    fetch_timeout: Duration,
}

impl MetricsCache {
    pub fn new(fetch_timeout: Duration) -> Self {
        MetricsCache {
            snapshot: Mutex::new(MetricsSnapshot::default()),
            fetch_timeout,
        }
    }

    /// Waits for the lock as long as it takes; a sample is never dropped.
    pub async fn publish(&self, snapshot: MetricsSnapshot) {
        *self.snapshot.lock().await = snapshot;
    }

    pub async fn fetch(&self) -> Result<MetricsSnapshot, MetricsError> {
        match timeout(self.fetch_timeout, self.snapshot.lock()).await {
            Ok(guard) => Ok(*guard),
            Err(_) => Err(MetricsError::LockContention),
        }
    }

    #[cfg(test)]
    pub(crate) async fn hold(&self) -> tokio::sync::MutexGuard<'_, MetricsSnapshot> {
        self.snapshot.lock().await
    }
}

impl Default for MetricsCache {
    fn default() -> Self {
        Self::new(FETCH_TIMEOUT)
    }
}


// EOF
