//! In-memory [`PixivApi`] for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::api::{Credential, Cursor, Operation, PixivApi};
use crate::error::{Error, Result};
use crate::model::{Illust, User};

/// Serves canned listings and details, recording every call.
pub struct FakeApi {
    page_size: usize,
    listings: Mutex<HashMap<String, Vec<Illust>>>,
    details: Mutex<HashMap<u64, Illust>>,
    users: Mutex<Vec<User>>,
    calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            listings: Mutex::new(HashMap::new()),
            details: Mutex::new(HashMap::new()),
            users: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Serve `illusts` for `operation`, split into pages.
    pub fn with_listing(self, operation: &Operation, illusts: Vec<Illust>) -> Self {
        self.listings
            .lock()
            .unwrap()
            .insert(operation.to_string(), illusts);
        self
    }

    pub fn with_detail(self, illust: Illust) -> Self {
        self.details.lock().unwrap().insert(illust.id, illust);
        self
    }

    pub fn with_users(self, users: Vec<User>) -> Self {
        *self.users.lock().unwrap() = users;
        self
    }

    /// Number of recorded calls starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PixivApi for FakeApi {
    async fn login(&self, _refresh_token: &str) -> Result<Credential> {
        self.record("login".to_string());
        Ok(Credential {
            access_token: "access".to_string(),
            refresh_token: "test-refresh-token".to_string(),
            expires_in: 3600,
            user_id: 1,
        })
    }

    async fn list_page(
        &self,
        operation: &Operation,
        offset: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Value> {
        let start = cursor
            .and_then(|c| c.pairs().iter().find(|(k, _)| k == "offset"))
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(offset);
        self.record(format!("list:{operation}@{start}"));

        if let Operation::SearchUser { .. } = operation {
            let users = self.users.lock().unwrap().clone();
            let previews: Vec<Value> = users.iter().map(|u| json!({ "user": u })).collect();
            return Ok(json!({ "user_previews": previews, "next_url": null }));
        }

        let listing = self.listings.lock().unwrap().get(&operation.to_string()).cloned();
        let Some(listing) = listing else {
            return Ok(json!({
                "error": {"user_message": "", "message": "Invalid request", "reason": ""}
            }));
        };

        let end = (start + self.page_size).min(listing.len());
        let page = listing.get(start..end).unwrap_or_default();
        let next_url = (end < listing.len()).then(|| {
            format!(
                "https://app-api.pixiv.net{}?offset={end}",
                operation.endpoint()
            )
        });
        Ok(json!({ "illusts": page, "next_url": next_url }))
    }

    async fn illust_detail(&self, illust_id: u64) -> Result<Value> {
        self.record(format!("detail:{illust_id}"));
        match self.details.lock().unwrap().get(&illust_id) {
            Some(illust) => Ok(json!({ "illust": illust })),
            None => Ok(json!({
                "error": {"user_message": "Work not found", "message": "", "reason": ""}
            })),
        }
    }

    async fn user_detail(&self, user_id: u64) -> Result<Value> {
        self.record(format!("user:{user_id}"));
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| json!({ "user": u }))
            .ok_or_else(|| Error::Query("User not found".to_string()))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.record(format!("download:{url}"));
        Ok(url.as_bytes().to_vec())
    }
}
