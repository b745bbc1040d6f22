//! Narrow interfaces to services the core relies on but does not own.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::PostDestination;

/// Persistent binding of chat users to Pixiv accounts.
#[async_trait]
pub trait AccountBinder: Send + Sync {
    /// Pixiv user id bound to the chat user, if any.
    async fn get_binding(&self, user_id: &str) -> Result<Option<u64>>;
}

/// Store for tag translations harvested from fetched items.
#[async_trait]
pub trait TagTranslations: Send + Sync {
    /// Insert or update `tag name -> translated name` pairs.
    async fn insert_many(&self, translations: HashMap<String, String>) -> Result<()>;
}

/// Chat-platform lookup of group roles.
#[async_trait]
pub trait GroupRoleAuthority: Send + Sync {
    /// Whether the sender of `dest` administers the group `dest` points at.
    async fn is_group_admin(&self, dest: &PostDestination) -> Result<bool>;
}

/// Binder with no bindings, for deployments without account linking.
#[derive(Debug, Default)]
pub struct NoAccountBindings;

#[async_trait]
impl AccountBinder for NoAccountBindings {
    async fn get_binding(&self, _user_id: &str) -> Result<Option<u64>> {
        Ok(None)
    }
}

/// Authority that knows no admins.
#[derive(Debug, Default)]
pub struct NoGroupRoles;

#[async_trait]
impl GroupRoleAuthority for NoGroupRoles {
    async fn is_group_admin(&self, _dest: &PostDestination) -> Result<bool> {
        Ok(false)
    }
}

/// Process-local translation table.
#[derive(Debug, Default)]
pub struct InMemoryTagTranslations {
    translations: RwLock<HashMap<String, String>>,
}

impl InMemoryTagTranslations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> Option<String> {
        self.translations
            .read()
            .ok()
            .and_then(|t| t.get(tag).cloned())
    }

    pub fn len(&self) -> usize {
        self.translations.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TagTranslations for InMemoryTagTranslations {
    async fn insert_many(&self, translations: HashMap<String, String>) -> Result<()> {
        self.translations
            .write()
            .map_err(|_| anyhow::anyhow!("tag translation table poisoned"))?
            .extend(translations);
        Ok(())
    }
}
