//! Cached facade over [`RemoteFetcher`].
//!
//! Each operation derives a [`Fingerprint`] from its arguments and the
//! configured limits, then reads through a [`CacheStore`] with the TTL of its
//! kind. Concurrent misses for one fingerprint share a single remote fetch.

pub mod lazy;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use self::lazy::{DetailSource, LazyItem};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::Result;
use crate::fingerprint::{Fingerprint, OperationKind};
use crate::model::{Illust, RankingMode, User};
use crate::remote::RemoteFetcher;

/// A shared, immutable listing.
pub type Listing = Arc<Vec<LazyItem>>;

pub struct PixivRepo {
    fetcher: Arc<RemoteFetcher>,
    config: Arc<Config>,
    listings: CacheStore<Listing>,
    details: CacheStore<Arc<Illust>>,
    users: CacheStore<Arc<User>>,
    user_searches: CacheStore<Arc<Vec<User>>>,
    images: CacheStore<Arc<Vec<u8>>>,
}

impl PixivRepo {
    #[must_use]
    pub fn new(fetcher: Arc<RemoteFetcher>, config: Arc<Config>) -> Self {
        Self {
            fetcher,
            config,
            listings: CacheStore::new("listings"),
            details: CacheStore::new("illust_detail"),
            users: CacheStore::new("user_detail"),
            user_searches: CacheStore::new("search_user"),
            images: CacheStore::new("download"),
        }
    }

    #[must_use]
    pub fn fetcher(&self) -> &Arc<RemoteFetcher> {
        &self.fetcher
    }

    async fn listing<F, Fut>(&self, key: Fingerprint, ttl: Duration, fetch: F) -> Result<Listing>
    where
        F: FnOnce(Arc<RemoteFetcher>) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<LazyItem>>> + Send + 'static,
    {
        let fetcher = Arc::clone(&self.fetcher);
        self.listings
            .get_or_fetch(key, ttl, move || {
                let fut = fetch(fetcher);
                async move { fut.await.map(Arc::new) }
            })
            .await
    }

    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn illust_ranking(&self, mode: RankingMode) -> Result<Listing> {
        let limit = self.config.ranking.fetch_item;
        let key = Fingerprint::new(OperationKind::Ranking)
            .with("mode", mode)
            .with("limit", limit);
        self.listing(key, self.config.cache_ttl.illust_ranking, move |f| async move {
            f.illust_ranking(mode, 0, limit).await
        })
        .await
    }

    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn search_illust(&self, word: &str) -> Result<Listing> {
        let limit = self.config.random_illust.max_item;
        let key = Fingerprint::new(OperationKind::SearchIllust)
            .with("word", word)
            .with("limit", limit);
        let word = word.to_string();
        self.listing(key, self.config.cache_ttl.search_illust, move |f| async move {
            f.search_illust(&word, 0, limit).await
        })
        .await
    }

    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn user_illusts(&self, user_id: u64) -> Result<Listing> {
        let limit = self.config.random_user_illust.max_item;
        let key = Fingerprint::new(OperationKind::UserIllusts)
            .with("user_id", user_id)
            .with("limit", limit);
        self.listing(key, self.config.cache_ttl.user_illusts, move |f| async move {
            f.user_illusts(user_id, 0, limit).await
        })
        .await
    }

    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn user_bookmarks(&self, user_id: u64) -> Result<Listing> {
        let limit = self.config.random_bookmark.max_item;
        let key = Fingerprint::new(OperationKind::UserBookmarks)
            .with("user_id", user_id)
            .with("limit", limit);
        self.listing(key, self.config.cache_ttl.user_bookmarks, move |f| async move {
            f.user_bookmarks(user_id, 0, limit).await
        })
        .await
    }

    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn related_illusts(&self, illust_id: u64) -> Result<Listing> {
        let limit = self.config.random_related_illust.max_item;
        let key = Fingerprint::new(OperationKind::RelatedIllusts)
            .with("illust_id", illust_id)
            .with("limit", limit);
        self.listing(key, self.config.cache_ttl.related_illusts, move |f| async move {
            f.related_illusts(illust_id, 0, limit).await
        })
        .await
    }

    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn recommended_illusts(&self) -> Result<Listing> {
        let limit = self.config.random_recommended_illust.max_item;
        let key = Fingerprint::new(OperationKind::RecommendedIllusts).with("limit", limit);
        self.listing(key, self.config.cache_ttl.other, move |f| async move {
            f.recommended_illusts(0, limit).await
        })
        .await
    }

    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn search_user(&self, word: &str) -> Result<Arc<Vec<User>>> {
        let key = Fingerprint::new(OperationKind::SearchUser).with("word", word);
        let fetcher = Arc::clone(&self.fetcher);
        let word = word.to_string();
        self.user_searches
            .get_or_fetch(key, self.config.cache_ttl.search_user, move || async move {
                fetcher.search_user(&word).await.map(Arc::new)
            })
            .await
    }

    /// # Errors
    ///
    /// Returns a query error for an unknown or hidden item.
    pub async fn illust_detail(&self, illust_id: u64) -> Result<Arc<Illust>> {
        let key = Fingerprint::new(OperationKind::IllustDetail).with("id", illust_id);
        let fetcher = Arc::clone(&self.fetcher);
        self.details
            .get_or_fetch(key, self.config.cache_ttl.illust_detail, move || async move {
                fetcher.illust_detail(illust_id).await.map(Arc::new)
            })
            .await
    }

    /// # Errors
    ///
    /// Returns a query error for an unknown user.
    pub async fn user_detail(&self, user_id: u64) -> Result<Arc<User>> {
        let key = Fingerprint::new(OperationKind::UserDetail).with("id", user_id);
        let fetcher = Arc::clone(&self.fetcher);
        self.users
            .get_or_fetch(key, self.config.cache_ttl.user_detail, move || async move {
                fetcher.user_detail(user_id).await.map(Arc::new)
            })
            .await
    }

    /// Image bytes of the first page of `illust`.
    ///
    /// # Errors
    ///
    /// Returns the download error.
    pub async fn image(&self, illust: &Arc<Illust>) -> Result<Arc<Vec<u8>>> {
        let key = Fingerprint::new(OperationKind::Download)
            .with("id", illust.id)
            .with("quality", format!("{:?}", self.config.download_quality));
        let fetcher = Arc::clone(&self.fetcher);
        let illust = Arc::clone(illust);
        self.images
            .get_or_fetch(key, self.config.cache_ttl.download, move || async move {
                fetcher.image(&illust).await.map(Arc::new)
            })
            .await
    }
}

#[async_trait]
impl DetailSource for PixivRepo {
    async fn illust_detail(&self, illust_id: u64) -> Result<Arc<Illust>> {
        PixivRepo::illust_detail(self, illust_id).await
    }
}
