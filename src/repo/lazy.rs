//! Items whose detail may still have to be fetched.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::Illust;

/// Source of full item details, normally the cached repo.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn illust_detail(&self, illust_id: u64) -> Result<Arc<Illust>>;
}

/// A listing element: either just an id, or an id with its content.
///
/// A loaded item is only ever built from its content, so the id always
/// matches. Once loaded an item never goes back to unloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LazyItem {
    Unloaded(u64),
    Loaded(u64, Arc<Illust>),
}

impl LazyItem {
    #[must_use]
    pub fn unloaded(illust_id: u64) -> Self {
        Self::Unloaded(illust_id)
    }

    #[must_use]
    pub fn loaded(illust: Illust) -> Self {
        Self::Loaded(illust.id, Arc::new(illust))
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            Self::Unloaded(id) | Self::Loaded(id, _) => *id,
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(..))
    }

    #[must_use]
    pub fn loaded_content(&self) -> Option<&Arc<Illust>> {
        match self {
            Self::Loaded(_, illust) => Some(illust),
            Self::Unloaded(_) => None,
        }
    }

    /// Return the content, fetching it through `source` on first use.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, leaving the item unloaded, or a query error
    /// if the source answers with a different item.
    pub async fn resolve(&mut self, source: &dyn DetailSource) -> Result<Arc<Illust>> {
        match self {
            Self::Loaded(_, illust) => Ok(Arc::clone(illust)),
            Self::Unloaded(id) => {
                let id = *id;
                let illust = source.illust_detail(id).await?;
                if illust.id != id {
                    return Err(Error::Query(format!(
                        "requested illust {id} but received {}",
                        illust.id
                    )));
                }
                *self = Self::Loaded(id, Arc::clone(&illust));
                Ok(illust)
            }
        }
    }
}
