//! Short-lived memory of each destination's last request and response.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::HandlerKind;
use crate::model::PostDestination;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub kind: HandlerKind,
    pub args: Vec<String>,
    pub recorded_at: Instant,
}

/// Entries older than `expires_in` are dropped when read.
#[derive(Debug)]
pub struct Recorder {
    expires_in: Duration,
    requests: Mutex<HashMap<PostDestination, RequestRecord>>,
    responses: Mutex<HashMap<PostDestination, (u64, Instant)>>,
}

impl Recorder {
    #[must_use]
    pub fn new(expires_in: Duration) -> Self {
        Self {
            expires_in,
            requests: Mutex::new(HashMap::new()),
            responses: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_request(&self, dest: &PostDestination, kind: HandlerKind, args: Vec<String>) {
        let record = RequestRecord {
            kind,
            args,
            recorded_at: Instant::now(),
        };
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dest.clone(), record);
    }

    #[must_use]
    pub fn get_request(&self, dest: &PostDestination) -> Option<RequestRecord> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        match requests.get(dest) {
            Some(record) if record.recorded_at.elapsed() < self.expires_in => Some(record.clone()),
            Some(_) => {
                requests.remove(dest);
                None
            }
            None => None,
        }
    }

    /// Remember the single illust last sent to `dest`.
    pub fn record_response(&self, dest: &PostDestination, illust_id: u64) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dest.clone(), (illust_id, Instant::now()));
    }

    #[must_use]
    pub fn get_response(&self, dest: &PostDestination) -> Option<u64> {
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        match responses.get(dest) {
            Some(&(illust_id, at)) if at.elapsed() < self.expires_in => Some(illust_id),
            Some(_) => {
                responses.remove(dest);
                None
            }
            None => None,
        }
    }
}
