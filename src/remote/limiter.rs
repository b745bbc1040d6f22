//! Global cap on concurrent remote calls.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

/// Limits how many remote calls are in progress at once.
///
/// Permits are counted across every operation and caller, so a burst of
/// cache misses queues here instead of hammering the API.
#[derive(Debug, Clone)]
pub struct QueryGate {
    semaphore: Arc<Semaphore>,
}

impl QueryGate {
    /// Create a gate admitting `limit` concurrent calls.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    /// Wait for a permit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the gate has been closed.
    pub async fn acquire(&self) -> Result<QueryPermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::Closed)?;
        Ok(QueryPermit { _permit: permit })
    }

    /// Take a permit if one is free right now.
    #[must_use]
    pub fn try_acquire(&self) -> Option<QueryPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| QueryPermit { _permit: permit })
    }

    /// Permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Refuse all further calls. Waiters are woken with an error.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Held while a remote call is in progress; released on drop.
#[derive(Debug)]
pub struct QueryPermit {
    _permit: OwnedSemaphorePermit,
}
