//! Raw access to the Pixiv app API.
//!
//! [`PixivApi`] returns undecoded JSON so that error markers can be checked
//! before anything is deserialized. [`HttpPixivApi`] is the reqwest-backed
//! implementation.

use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::constants::{APP_USER_AGENT, CLIENT_ID, CLIENT_SECRET, IMAGE_REFERER};
use crate::error::{Error, Result};
use crate::model::RankingMode;

/// A paginated listing the API offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Ranking { mode: RankingMode },
    SearchIllust { word: String },
    SearchUser { word: String },
    UserIllusts { user_id: u64 },
    UserBookmarks { user_id: u64 },
    RelatedIllusts { illust_id: u64 },
    RecommendedIllusts,
}

impl Operation {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ranking { .. } => "illust_ranking",
            Self::SearchIllust { .. } => "search_illust",
            Self::SearchUser { .. } => "search_user",
            Self::UserIllusts { .. } => "user_illusts",
            Self::UserBookmarks { .. } => "user_bookmarks",
            Self::RelatedIllusts { .. } => "related_illusts",
            Self::RecommendedIllusts => "recommended_illusts",
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Ranking { .. } => "/v1/illust/ranking",
            Self::SearchIllust { .. } => "/v1/search/illust",
            Self::SearchUser { .. } => "/v1/search/user",
            Self::UserIllusts { .. } => "/v1/user/illusts",
            Self::UserBookmarks { .. } => "/v1/user/bookmarks/illust",
            Self::RelatedIllusts { .. } => "/v2/illust/related",
            Self::RecommendedIllusts => "/v1/illust/recommended",
        }
    }

    /// Name of the array holding the page's elements.
    #[must_use]
    pub fn list_field(&self) -> &'static str {
        match self {
            Self::SearchUser { .. } => "user_previews",
            _ => "illusts",
        }
    }

    /// The bookmarks endpoint pages by an opaque marker only.
    #[must_use]
    pub fn supports_offset(&self) -> bool {
        !matches!(self, Self::UserBookmarks { .. })
    }

    /// Query parameters of the first page.
    #[must_use]
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Ranking { mode } => vec![
                ("mode", mode.as_str().to_string()),
                ("filter", "for_ios".to_string()),
            ],
            Self::SearchIllust { word } => vec![
                ("word", word.clone()),
                ("search_target", "partial_match_for_tags".to_string()),
                ("sort", "date_desc".to_string()),
                ("filter", "for_ios".to_string()),
            ],
            Self::SearchUser { word } => vec![
                ("word", word.clone()),
                ("filter", "for_ios".to_string()),
            ],
            Self::UserIllusts { user_id } => vec![
                ("user_id", user_id.to_string()),
                ("type", "illust".to_string()),
                ("filter", "for_ios".to_string()),
            ],
            Self::UserBookmarks { user_id } => vec![
                ("user_id", user_id.to_string()),
                ("restrict", "public".to_string()),
                ("filter", "for_ios".to_string()),
            ],
            Self::RelatedIllusts { illust_id } => vec![
                ("illust_id", illust_id.to_string()),
                ("filter", "for_ios".to_string()),
            ],
            Self::RecommendedIllusts => vec![
                ("content_type", "illust".to_string()),
                ("include_ranking_label", "true".to_string()),
                ("filter", "for_ios".to_string()),
            ],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ranking { mode } => write!(f, "illust_ranking({mode})"),
            Self::SearchIllust { word } => write!(f, "search_illust({word})"),
            Self::SearchUser { word } => write!(f, "search_user({word})"),
            Self::UserIllusts { user_id } => write!(f, "user_illusts({user_id})"),
            Self::UserBookmarks { user_id } => write!(f, "user_bookmarks({user_id})"),
            Self::RelatedIllusts { illust_id } => write!(f, "related_illusts({illust_id})"),
            Self::RecommendedIllusts => f.write_str("recommended_illusts"),
        }
    }
}

/// Server-supplied continuation: the query of the `next_url` of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(Vec<(String, String)>);

impl Cursor {
    /// Parse a `next_url`. `viewed` parameters are dropped because the
    /// recommended endpoint rejects its own echo of them.
    #[must_use]
    pub fn from_next_url(next_url: &str) -> Option<Self> {
        let url = Url::parse(next_url).ok()?;
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !k.starts_with("viewed"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(Self(pairs))
        }
    }

    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

/// Result of a refresh-token login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user_id: u64,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("expires_in", &self.expires_in)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Calls the core needs from the remote catalog.
#[async_trait]
pub trait PixivApi: Send + Sync {
    /// Exchange a refresh token for a fresh access token and start using it.
    async fn login(&self, refresh_token: &str) -> Result<Credential>;

    /// One page of `operation`. Without a cursor the first page is requested,
    /// starting at `offset` when non-zero.
    async fn list_page(
        &self,
        operation: &Operation,
        offset: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Value>;

    async fn illust_detail(&self, illust_id: u64) -> Result<Value>;

    async fn user_detail(&self, user_id: u64) -> Result<Value>;

    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed [`PixivApi`].
pub struct HttpPixivApi {
    client: Client,
    base_url: Url,
    auth_url: String,
    access_token: RwLock<Option<String>>,
}

impl HttpPixivApi {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or proxy is invalid.
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.query_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(APP_USER_AGENT);
        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| Error::Unsupported(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build()?;

        let base_url = Url::parse(&config.api_base_url).map_err(|e| {
            Error::Unsupported(format!("invalid API base URL {}: {e}", config.api_base_url))
        })?;

        Ok(Self {
            client,
            base_url,
            auth_url: config.auth_url.clone(),
            access_token: RwLock::new(None),
        })
    }

    fn token(&self) -> Option<String> {
        self.access_token.read().ok().and_then(|t| t.clone())
    }

    fn endpoint_url<K, V>(&self, path: &str, query: impl IntoIterator<Item = (K, V)>) -> Result<Url>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| Error::Unsupported(format!("invalid endpoint {path}: {e}")))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        debug!(url = %url.path(), "GET");
        let mut request = self
            .client
            .get(url)
            .header("Accept-Language", "zh-CN")
            .header("App-OS", "android");
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        // Application errors arrive as 4xx with an `error` object; the caller
        // inspects that marker. Anything else non-2xx is a transport problem.
        if !status.is_success() && body.get("error").is_none() {
            return Err(Error::Transient(format!("HTTP {status}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl PixivApi for HttpPixivApi {
    async fn login(&self, refresh_token: &str) -> Result<Credential> {
        let form = [
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
            ("grant_type", "refresh_token"),
            ("include_policy", "true"),
            ("refresh_token", refresh_token),
        ];
        let response = self.client.post(&self.auth_url).form(&form).send().await?;
        let status = response.status();

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(Error::Query(format!("auth rejected: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(Error::Transient(format!("auth endpoint returned HTTP {status}")));
        }

        let body: Value = response.json().await?;
        let credential = parse_credential(&body)?;

        if let Ok(mut token) = self.access_token.write() {
            *token = Some(credential.access_token.clone());
        }
        Ok(credential)
    }

    async fn list_page(
        &self,
        operation: &Operation,
        offset: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Value> {
        let url = match cursor {
            Some(cursor) => self.endpoint_url(operation.endpoint(), cursor.pairs().iter().cloned())?,
            None => {
                let mut query = operation.query();
                if offset > 0 {
                    query.push(("offset", offset.to_string()));
                }
                self.endpoint_url(operation.endpoint(), query)?
            }
        };
        self.get_json(url).await
    }

    async fn illust_detail(&self, illust_id: u64) -> Result<Value> {
        let url = self.endpoint_url(
            "/v1/illust/detail",
            [("illust_id", illust_id.to_string())],
        )?;
        self.get_json(url).await
    }

    async fn user_detail(&self, user_id: u64) -> Result<Value> {
        let url = self.endpoint_url(
            "/v1/user/detail",
            [("user_id", user_id.to_string()), ("filter", "for_ios".to_string())],
        )?;
        self.get_json(url).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header("Referer", IMAGE_REFERER)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::Query(format!("image not found: {url}")));
        }
        if !status.is_success() {
            return Err(Error::Transient(format!("image download returned HTTP {status}")));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Decode a token response. The user id is sent as a string.
fn parse_credential(body: &Value) -> Result<Credential> {
    let field = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::Transient(format!("token response missing {name}")))
    };

    let user_id = body
        .get("user")
        .and_then(|u| u.get("id"))
        .and_then(|id| id.as_u64().or_else(|| id.as_str().and_then(|s| s.parse().ok())))
        .ok_or_else(|| Error::Transient("token response missing user id".to_string()))?;

    Ok(Credential {
        access_token: field("access_token")?,
        refresh_token: field("refresh_token")?,
        expires_in: body.get("expires_in").and_then(Value::as_u64).unwrap_or(3600),
        user_id,
    })
}
