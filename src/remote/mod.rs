//! Remote retrieval: paginated listings, details and image downloads.
//!
//! Every call made by [`RemoteFetcher`] holds a [`QueryGate`] permit, is
//! bounded by the configured timeout and is retried on transient failure.
//! Listings are flattened across pages, filtered, and returned as
//! [`LazyItem`]s so that stub entries can be completed later.

pub mod api;
pub mod auth;
#[cfg(test)]
pub(crate) mod fake;
pub mod limiter;
pub mod page;
pub mod retry;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use self::api::{Cursor, Operation, PixivApi};
use self::auth::{refresh_delay, AuthDaemon, Session};
use self::limiter::QueryGate;
use self::page::{
    check_error, flatten, parse_page, IllustFilter, Page, PageLimits, UserPreview,
};
use self::retry::RetryPolicy;
use crate::collaborators::TagTranslations;
use crate::config::{Config, DownloadQuality, RandomQueryConfig};
use crate::constants::{AUTH_RETRY_DELAY_SECS, IMAGE_HOST};
use crate::error::{Error, Result};
use crate::model::{Illust, RankingMode, User};
use crate::repo::lazy::LazyItem;

/// Users returned by a user search.
const SEARCH_USER_LIMIT: usize = 20;

/// Pagination and filtering applied to one listing request.
#[derive(Debug, Clone, Default)]
pub struct ListSettings {
    pub limits: PageLimits,
    pub filter: IllustFilter,
}

impl ListSettings {
    fn random(config: &Config, query: &RandomQueryConfig, limit: usize) -> Self {
        Self {
            limits: PageLimits {
                limit: if limit == 0 { query.max_item } else { limit },
                limit_page: query.max_page,
            },
            filter: IllustFilter {
                block_tags: config.block_tags.clone(),
                min_bookmark: query.min_bookmark,
                min_view: query.min_view,
            },
        }
    }
}

/// Talks to the Pixiv API on behalf of the cache layer.
pub struct RemoteFetcher {
    api: Arc<dyn PixivApi>,
    config: Arc<Config>,
    gate: QueryGate,
    retry: RetryPolicy,
    session: Arc<Session>,
    tags: Option<Arc<dyn TagTranslations>>,
    daemon: Mutex<Option<AuthDaemon>>,
}

impl RemoteFetcher {
    #[must_use]
    pub fn new(api: Arc<dyn PixivApi>, config: Arc<Config>) -> Self {
        Self {
            gate: QueryGate::new(config.simultaneous_query),
            retry: RetryPolicy::default(),
            session: Arc::new(Session::new(config.refresh_token.clone())),
            tags: None,
            daemon: Mutex::new(None),
            api,
            config,
        }
    }

    /// Send translated tag names of fetched items to `tags`.
    #[must_use]
    pub fn with_tag_translations(mut self, tags: Arc<dyn TagTranslations>) -> Self {
        self.tags = Some(tags);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn gate(&self) -> &QueryGate {
        &self.gate
    }

    /// Log in and start the credential refresh task.
    ///
    /// # Errors
    ///
    /// Returns the login error once retries are exhausted.
    pub async fn start(&self) -> Result<()> {
        let timeout = self.config.query_timeout;
        let credential = self
            .call("login", || self.session.login(self.api.as_ref(), timeout))
            .await?;
        info!(user_id = credential.user_id, "Logged in to Pixiv");

        let daemon = AuthDaemon::spawn(
            Arc::clone(&self.api),
            Arc::clone(&self.session),
            refresh_delay(credential.expires_in),
            timeout,
            Duration::from_secs(AUTH_RETRY_DELAY_SECS),
        );
        if let Some(previous) = self.daemon.lock().await.replace(daemon) {
            previous.shutdown().await;
        }
        Ok(())
    }

    /// Stop the refresh task and refuse further calls.
    pub async fn shutdown(&self) {
        if let Some(daemon) = self.daemon.lock().await.take() {
            daemon.shutdown().await;
        }
        self.gate.close();
        info!("Remote fetcher stopped");
    }

    /// Run one remote call under the gate, the timeout and the retry policy.
    async fn call<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry
            .run(what, || {
                let fut = op();
                async move {
                    let _permit = self.gate.acquire().await?;
                    tokio::time::timeout(self.config.query_timeout, fut).await?
                }
            })
            .await
    }

    /// Fetch and decode one page of `operation`.
    ///
    /// # Errors
    ///
    /// Returns a query error if the page carries an error marker.
    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        operation: &Operation,
        offset: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Page<T>> {
        self.call(operation.name(), || async move {
            let raw = self.api.list_page(operation, offset, cursor).await?;
            parse_page(raw, operation.list_field())
        })
        .await
    }

    async fn illusts(
        &self,
        operation: Operation,
        offset: usize,
        settings: ListSettings,
    ) -> Result<Vec<LazyItem>> {
        if offset > 0 && !operation.supports_offset() {
            return Err(Error::Unsupported(format!(
                "{} cannot skip items",
                operation.name()
            )));
        }
        info!(operation = %operation, offset, limit = settings.limits.limit, "Fetching listing");

        let operation = &operation;
        let illusts: Vec<Illust> = flatten(
            |cursor| async move { self.fetch_page(operation, offset, cursor.as_ref()).await },
            settings.limits,
            |illust| settings.filter.accepts(illust),
        )
        .await?;

        let items: Vec<LazyItem> = illusts
            .into_iter()
            .map(|illust| {
                if illust.is_detail_missing() {
                    LazyItem::unloaded(illust.id)
                } else {
                    LazyItem::loaded(illust)
                }
            })
            .collect();

        let detail_missing = items.iter().filter(|i| !i.is_loaded()).count();
        info!(
            operation = %operation,
            count = items.len(),
            detail_missing,
            "Fetched listing"
        );
        self.harvest_tags(
            items
                .iter()
                .filter_map(LazyItem::loaded_content)
                .map(|illust| &**illust),
        );

        Ok(items)
    }

    /// Ranking for `mode`; `limit` 0 means the configured fetch size.
    ///
    /// Only block tags are applied, never popularity thresholds.
    ///
    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn illust_ranking(
        &self,
        mode: RankingMode,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<LazyItem>> {
        let settings = ListSettings {
            limits: PageLimits {
                limit: if limit == 0 { self.config.ranking.fetch_item } else { limit },
                limit_page: 0,
            },
            filter: IllustFilter {
                block_tags: self.config.block_tags.clone(),
                ..IllustFilter::default()
            },
        };
        self.illusts(Operation::Ranking { mode }, skip, settings).await
    }

    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn search_illust(&self, word: &str, skip: usize, limit: usize) -> Result<Vec<LazyItem>> {
        let settings = ListSettings::random(&self.config, &self.config.random_illust, limit);
        let operation = Operation::SearchIllust {
            word: word.to_string(),
        };
        self.illusts(operation, skip, settings).await
    }

    /// Works of `user_id`; 0 means the logged-in account.
    ///
    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn user_illusts(&self, user_id: u64, skip: usize, limit: usize) -> Result<Vec<LazyItem>> {
        let user_id = self.resolve_user(user_id);
        let settings = ListSettings::random(&self.config, &self.config.random_user_illust, limit);
        self.illusts(Operation::UserIllusts { user_id }, skip, settings)
            .await
    }

    /// Public bookmarks of `user_id`; 0 means the logged-in account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for a non-zero `skip`, otherwise the
    /// fetch error.
    pub async fn user_bookmarks(&self, user_id: u64, skip: usize, limit: usize) -> Result<Vec<LazyItem>> {
        let user_id = self.resolve_user(user_id);
        let settings = ListSettings::random(&self.config, &self.config.random_bookmark, limit);
        self.illusts(Operation::UserBookmarks { user_id }, skip, settings)
            .await
    }

    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn related_illusts(
        &self,
        illust_id: u64,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<LazyItem>> {
        let settings = ListSettings::random(&self.config, &self.config.random_related_illust, limit);
        self.illusts(Operation::RelatedIllusts { illust_id }, skip, settings)
            .await
    }

    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn recommended_illusts(&self, skip: usize, limit: usize) -> Result<Vec<LazyItem>> {
        let settings =
            ListSettings::random(&self.config, &self.config.random_recommended_illust, limit);
        self.illusts(Operation::RecommendedIllusts, skip, settings)
            .await
    }

    /// First page of users matching `word`, at most 20.
    ///
    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn search_user(&self, word: &str) -> Result<Vec<User>> {
        info!(word, "Searching users");
        let operation = Operation::SearchUser {
            word: word.to_string(),
        };
        let operation = &operation;
        let previews: Vec<UserPreview> = flatten(
            |cursor| async move { self.fetch_page(operation, 0, cursor.as_ref()).await },
            PageLimits {
                limit: SEARCH_USER_LIMIT,
                limit_page: 1,
            },
            |_| true,
        )
        .await?;
        Ok(previews.into_iter().map(|p| p.user).collect())
    }

    /// # Errors
    ///
    /// Returns a query error for an unknown or hidden item.
    pub async fn illust_detail(&self, illust_id: u64) -> Result<Illust> {
        info!(illust_id, "Fetching illust detail");
        let illust: Illust = self
            .call("illust_detail", || async move {
                extract(self.api.illust_detail(illust_id).await?, "illust")
            })
            .await?;
        self.harvest_tags(std::iter::once(&illust));
        Ok(illust)
    }

    /// # Errors
    ///
    /// Returns a query error for an unknown user.
    pub async fn user_detail(&self, user_id: u64) -> Result<User> {
        info!(user_id, "Fetching user detail");
        self.call("user_detail", || async move {
            extract(self.api.user_detail(user_id).await?, "user")
        })
        .await
    }

    /// Download the first page of `illust` in the configured quality.
    ///
    /// # Errors
    ///
    /// Returns a query error if the item has no URL for that quality.
    pub async fn image(&self, illust: &Illust) -> Result<Vec<u8>> {
        let url = self.image_url(illust)?;
        debug!(illust_id = illust.id, url = %url, "Downloading image");
        let url = url.as_str();
        self.call("download", || self.api.download(url)).await
    }

    /// URL [`Self::image`] downloads from.
    ///
    /// # Errors
    ///
    /// Returns a query error if the item has no URL for the configured quality.
    pub fn image_url(&self, illust: &Illust) -> Result<String> {
        let urls = &illust.image_urls;
        let url = match self.config.download_quality {
            DownloadQuality::Original => illust.original_url(),
            DownloadQuality::Large => Some(urls.large.as_str()),
            DownloadQuality::Medium => Some(urls.medium.as_str()),
            DownloadQuality::SquareMedium => Some(urls.square_medium.as_str()),
        }
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            Error::Query(format!(
                "illust {} has no {:?} image",
                illust.id, self.config.download_quality
            ))
        })?;

        Ok(match &self.config.download_custom_domain {
            Some(domain) => url.replace(IMAGE_HOST, domain),
            None => url.to_string(),
        })
    }

    fn resolve_user(&self, user_id: u64) -> u64 {
        if user_id == 0 {
            self.session.user_id()
        } else {
            user_id
        }
    }

    /// Store translated tag names on a background task.
    fn harvest_tags<'a>(&self, illusts: impl IntoIterator<Item = &'a Illust>) {
        if !self.config.tag_translation_enabled {
            return;
        }
        let Some(store) = &self.tags else {
            return;
        };

        let translations: HashMap<String, String> = illusts
            .into_iter()
            .flat_map(|i| i.tags.iter())
            .filter_map(|t| {
                t.translated_name
                    .as_ref()
                    .map(|translated| (t.name.clone(), translated.clone()))
            })
            .collect();
        if translations.is_empty() {
            return;
        }

        let store = Arc::clone(store);
        tokio::spawn(async move {
            let count = translations.len();
            match store.insert_many(translations).await {
                Ok(()) => debug!(count, "Stored tag translations"),
                Err(e) => warn!(error = %e, "Failed to store tag translations"),
            }
        });
    }
}

/// Check a detail response and decode the object under `field`.
fn extract<T: DeserializeOwned>(mut raw: Value, field: &str) -> Result<T> {
    check_error(&raw)?;
    let value = raw
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| Error::Transient(format!("response has no '{field}' field")))?;
    Ok(serde_json::from_value(value)?)
}
