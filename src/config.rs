use std::time::Duration;

use thiserror::Error;

use crate::constants::{APP_API_BASE, AUTH_TOKEN_URL};
use crate::model::RankingMode;
use crate::random::RandomMethod;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Pixiv API
    pub refresh_token: String,
    pub api_base_url: String,
    pub auth_url: String,
    pub proxy: Option<String>,
    pub query_timeout: Duration,
    pub simultaneous_query: usize,

    // Cache expiry
    pub cache_ttl: CacheTtl,

    // Content policy
    pub block_tags: Vec<String>,
    pub block_action: BlockAction,
    pub download_quality: DownloadQuality,
    pub download_custom_domain: Option<String>,
    pub tag_translation_enabled: bool,

    // Access control
    pub blacklist: Vec<String>,
    pub superusers: Vec<String>,
    pub query_cooldown: Duration,
    pub no_query_cooldown_users: Vec<String>,
    pub max_item_per_query: usize,

    // "more" follow-ups
    pub more_enabled: bool,
    pub query_expires_in: Duration,

    // Queries
    pub illust_query_enabled: bool,
    pub ranking: RankingConfig,
    pub random_illust: RandomQueryConfig,
    pub random_recommended_illust: RandomQueryConfig,
    pub random_related_illust: RandomQueryConfig,
    pub random_user_illust: RandomQueryConfig,
    pub random_bookmark: RandomQueryConfig,
    pub random_bookmark_user_id: Option<u64>,
}

/// Per-kind cache lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtl {
    pub illust_detail: Duration,
    pub user_detail: Duration,
    pub download: Duration,
    pub illust_ranking: Duration,
    pub search_illust: Duration,
    pub search_user: Duration,
    pub user_illusts: Duration,
    pub user_bookmarks: Duration,
    pub related_illusts: Duration,
    pub other: Duration,
}

#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub enabled: bool,
    pub default_mode: RankingMode,
    /// 1-based inclusive range shown when none is requested.
    pub default_range: (usize, usize),
    pub fetch_item: usize,
    pub max_item_per_query: usize,
}

/// Settings shared by every "random X" query.
#[derive(Debug, Clone)]
pub struct RandomQueryConfig {
    pub enabled: bool,
    pub method: RandomMethod,
    pub min_bookmark: u64,
    pub min_view: u64,
    pub max_page: usize,
    pub max_item: usize,
}

/// What to do when an item carries a blocked tag at presentation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAction {
    /// Send the text details but no image
    NoImage,
    /// Send only a notice that the item was blocked
    CompletelyBlock,
    /// Send nothing at all
    NoReply,
}

/// Which image variant to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadQuality {
    Original,
    Large,
    Medium,
    SquareMedium,
}

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;
const UNBOUNDED: usize = 1 << 31;

impl Default for Config {
    fn default() -> Self {
        let random = |method, max_page, max_item| RandomQueryConfig {
            enabled: true,
            method,
            min_bookmark: 0,
            min_view: 0,
            max_page,
            max_item,
        };

        Self {
            refresh_token: String::new(),
            api_base_url: APP_API_BASE.to_string(),
            auth_url: AUTH_TOKEN_URL.to_string(),
            proxy: None,
            query_timeout: Duration::from_secs(60),
            simultaneous_query: 8,

            cache_ttl: CacheTtl {
                illust_detail: Duration::from_secs(7 * DAY),
                user_detail: Duration::from_secs(7 * DAY),
                download: Duration::from_secs(7 * DAY),
                illust_ranking: Duration::from_secs(6 * HOUR),
                search_illust: Duration::from_secs(DAY),
                search_user: Duration::from_secs(DAY),
                user_illusts: Duration::from_secs(DAY),
                user_bookmarks: Duration::from_secs(DAY),
                related_illusts: Duration::from_secs(DAY),
                other: Duration::from_secs(6 * HOUR),
            },

            block_tags: Vec::new(),
            block_action: BlockAction::NoImage,
            download_quality: DownloadQuality::Original,
            download_custom_domain: None,
            tag_translation_enabled: true,

            blacklist: Vec::new(),
            superusers: Vec::new(),
            query_cooldown: Duration::ZERO,
            no_query_cooldown_users: Vec::new(),
            max_item_per_query: 10,

            more_enabled: true,
            query_expires_in: Duration::from_secs(10 * 60),

            illust_query_enabled: true,
            ranking: RankingConfig {
                enabled: true,
                default_mode: RankingMode::Day,
                default_range: (1, 3),
                fetch_item: 150,
                max_item_per_query: 10,
            },
            random_illust: random(RandomMethod::BookmarkProportion, 20, 500),
            random_recommended_illust: random(RandomMethod::Uniform, 40, 1000),
            random_related_illust: random(RandomMethod::BookmarkProportion, 4, 100),
            random_user_illust: random(RandomMethod::TimedeltaProportion, UNBOUNDED, UNBOUNDED),
            random_bookmark: random(RandomMethod::Uniform, UNBOUNDED, UNBOUNDED),
            random_bookmark_user_id: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();

        let ttl = |name: &str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(Duration::from_secs(parse_env_u64(name, default.as_secs())?))
        };

        Ok(Self {
            // Pixiv API
            refresh_token: required_env("PIXIV_REFRESH_TOKEN")?,
            api_base_url: env_or_default("PIXIV_API_BASE_URL", &d.api_base_url),
            auth_url: env_or_default("PIXIV_AUTH_URL", &d.auth_url),
            proxy: optional_env("PIXIV_PROXY"),
            query_timeout: ttl("PIXIV_QUERY_TIMEOUT", d.query_timeout)?,
            simultaneous_query: parse_env_usize("PIXIV_SIMULTANEOUS_QUERY", d.simultaneous_query)?,

            // Cache expiry
            cache_ttl: CacheTtl {
                illust_detail: ttl(
                    "PIXIV_ILLUST_DETAIL_CACHE_EXPIRES_IN",
                    d.cache_ttl.illust_detail,
                )?,
                user_detail: ttl("PIXIV_USER_DETAIL_CACHE_EXPIRES_IN", d.cache_ttl.user_detail)?,
                download: ttl("PIXIV_DOWNLOAD_CACHE_EXPIRES_IN", d.cache_ttl.download)?,
                illust_ranking: ttl(
                    "PIXIV_ILLUST_RANKING_CACHE_EXPIRES_IN",
                    d.cache_ttl.illust_ranking,
                )?,
                search_illust: ttl(
                    "PIXIV_SEARCH_ILLUST_CACHE_EXPIRES_IN",
                    d.cache_ttl.search_illust,
                )?,
                search_user: ttl("PIXIV_SEARCH_USER_CACHE_EXPIRES_IN", d.cache_ttl.search_user)?,
                user_illusts: ttl(
                    "PIXIV_USER_ILLUSTS_CACHE_EXPIRES_IN",
                    d.cache_ttl.user_illusts,
                )?,
                user_bookmarks: ttl(
                    "PIXIV_USER_BOOKMARKS_CACHE_EXPIRES_IN",
                    d.cache_ttl.user_bookmarks,
                )?,
                related_illusts: ttl(
                    "PIXIV_RELATED_ILLUSTS_CACHE_EXPIRES_IN",
                    d.cache_ttl.related_illusts,
                )?,
                other: ttl("PIXIV_OTHER_CACHE_EXPIRES_IN", d.cache_ttl.other)?,
            },

            // Content policy
            block_tags: parse_env_list("PIXIV_BLOCK_TAGS"),
            block_action: parse_block_action(&env_or_default("PIXIV_BLOCK_ACTION", "no_image"))?,
            download_quality: parse_download_quality(&env_or_default(
                "PIXIV_DOWNLOAD_QUANTITY",
                "original",
            ))?,
            download_custom_domain: optional_env("PIXIV_DOWNLOAD_CUSTOM_DOMAIN"),
            tag_translation_enabled: parse_env_bool(
                "PIXIV_TAG_TRANSLATION_ENABLED",
                d.tag_translation_enabled,
            )?,

            // Access control
            blacklist: parse_env_list("BLACKLIST"),
            superusers: parse_env_list("SUPERUSERS"),
            query_cooldown: ttl("PIXIV_QUERY_COOLDOWN", d.query_cooldown)?,
            no_query_cooldown_users: parse_env_list("PIXIV_NO_QUERY_COOLDOWN_USERS"),
            max_item_per_query: parse_env_usize(
                "PIXIV_MAX_ITEM_PER_QUERY",
                d.max_item_per_query,
            )?,

            // "more" follow-ups
            more_enabled: parse_env_bool("PIXIV_MORE_ENABLED", d.more_enabled)?,
            query_expires_in: ttl("PIXIV_QUERY_EXPIRES_IN", d.query_expires_in)?,

            // Queries
            illust_query_enabled: parse_env_bool(
                "PIXIV_ILLUST_QUERY_ENABLED",
                d.illust_query_enabled,
            )?,
            ranking: RankingConfig {
                enabled: parse_env_bool("PIXIV_RANKING_QUERY_ENABLED", d.ranking.enabled)?,
                default_mode: parse_ranking_mode(&env_or_default(
                    "PIXIV_RANKING_DEFAULT_MODE",
                    d.ranking.default_mode.as_str(),
                ))?,
                default_range: parse_range(
                    "PIXIV_RANKING_DEFAULT_RANGE",
                    d.ranking.default_range,
                )?,
                fetch_item: parse_env_usize("PIXIV_RANKING_FETCH_ITEM", d.ranking.fetch_item)?,
                max_item_per_query: parse_env_usize(
                    "PIXIV_RANKING_MAX_ITEM_PER_QUERY",
                    d.ranking.max_item_per_query,
                )?,
            },
            random_illust: RandomQueryConfig::from_env("PIXIV_RANDOM_ILLUST", &d.random_illust)?,
            random_recommended_illust: RandomQueryConfig::from_env(
                "PIXIV_RANDOM_RECOMMENDED_ILLUST",
                &d.random_recommended_illust,
            )?,
            random_related_illust: RandomQueryConfig::from_env(
                "PIXIV_RANDOM_RELATED_ILLUST",
                &d.random_related_illust,
            )?,
            random_user_illust: RandomQueryConfig::from_env(
                "PIXIV_RANDOM_USER_ILLUST",
                &d.random_user_illust,
            )?,
            random_bookmark: RandomQueryConfig::from_env(
                "PIXIV_RANDOM_BOOKMARK",
                &d.random_bookmark,
            )?,
            random_bookmark_user_id: optional_env("PIXIV_RANDOM_BOOKMARK_USER_ID")
                .map(|v| {
                    v.parse().map_err(|e| ConfigError::ParseInt {
                        name: "PIXIV_RANDOM_BOOKMARK_USER_ID".to_string(),
                        source: e,
                    })
                })
                .transpose()?,
        })
    }

    /// Defaults with a placeholder token, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            refresh_token: "test-refresh-token".to_string(),
            ..Self::default()
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_token.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "PIXIV_REFRESH_TOKEN".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.simultaneous_query == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PIXIV_SIMULTANEOUS_QUERY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.query_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "PIXIV_QUERY_TIMEOUT".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }
        let (start, end) = self.ranking.default_range;
        if start == 0 || start > end {
            return Err(ConfigError::InvalidValue {
                name: "PIXIV_RANKING_DEFAULT_RANGE".to_string(),
                message: format!("illegal range {start}-{end}"),
            });
        }
        Ok(())
    }
}

impl RandomQueryConfig {
    fn from_env(prefix: &str, defaults: &Self) -> Result<Self, ConfigError> {
        let method_var = format!("{prefix}_METHOD");
        let method = match optional_env(&method_var) {
            Some(v) => v.parse().map_err(|message| ConfigError::InvalidValue {
                name: method_var,
                message,
            })?,
            None => defaults.method,
        };

        Ok(Self {
            enabled: parse_env_bool(&format!("{prefix}_QUERY_ENABLED"), defaults.enabled)?,
            method,
            min_bookmark: parse_env_u64(&format!("{prefix}_MIN_BOOKMARK"), defaults.min_bookmark)?,
            min_view: parse_env_u64(&format!("{prefix}_MIN_VIEW"), defaults.min_view)?,
            max_page: parse_env_usize(&format!("{prefix}_MAX_PAGE"), defaults.max_page)?,
            max_item: parse_env_usize(&format!("{prefix}_MAX_ITEM"), defaults.max_item)?,
        })
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_list(name: &str) -> Vec<String> {
    optional_env(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_range(name: &str, default: (usize, usize)) -> Result<(usize, usize), ConfigError> {
    let Some(val) = optional_env(name) else {
        return Ok(default);
    };
    let invalid = || ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("expected 'start-end', got '{val}'"),
    };
    let (start, end) = val.split_once('-').ok_or_else(invalid)?;
    let start = start.trim().parse().map_err(|_| invalid())?;
    let end = end.trim().parse().map_err(|_| invalid())?;
    Ok((start, end))
}

fn parse_ranking_mode(value: &str) -> Result<RankingMode, ConfigError> {
    value
        .parse()
        .map_err(|message| ConfigError::InvalidValue {
            name: "PIXIV_RANKING_DEFAULT_MODE".to_string(),
            message,
        })
}

fn parse_block_action(value: &str) -> Result<BlockAction, ConfigError> {
    match value.to_lowercase().as_str() {
        "no_image" => Ok(BlockAction::NoImage),
        "completely_block" => Ok(BlockAction::CompletelyBlock),
        "no_reply" => Ok(BlockAction::NoReply),
        _ => Err(ConfigError::InvalidValue {
            name: "PIXIV_BLOCK_ACTION".to_string(),
            message: format!(
                "must be 'no_image', 'completely_block' or 'no_reply', got '{value}'"
            ),
        }),
    }
}

fn parse_download_quality(value: &str) -> Result<DownloadQuality, ConfigError> {
    match value.to_lowercase().as_str() {
        "original" => Ok(DownloadQuality::Original),
        "large" => Ok(DownloadQuality::Large),
        "medium" => Ok(DownloadQuality::Medium),
        "square_medium" => Ok(DownloadQuality::SquareMedium),
        _ => Err(ConfigError::InvalidValue {
            name: "PIXIV_DOWNLOAD_QUANTITY".to_string(),
            message: format!("unknown image quality '{value}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_block_action() {
        assert_eq!(parse_block_action("no_image").unwrap(), BlockAction::NoImage);
        assert_eq!(
            parse_block_action("COMPLETELY_BLOCK").unwrap(),
            BlockAction::CompletelyBlock
        );
        assert_eq!(parse_block_action("no_reply").unwrap(), BlockAction::NoReply);
        assert!(parse_block_action("shout").is_err());
    }

    #[test]
    fn test_parse_download_quality() {
        assert_eq!(parse_download_quality("large").unwrap(), DownloadQuality::Large);
        assert!(parse_download_quality("huge").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_env_bool("NONEXISTENT_VAR", true).unwrap());
        assert!(!parse_env_bool("NONEXISTENT_VAR", false).unwrap());
    }

    #[test]
    fn test_defaults_validate() {
        assert!(Config::for_testing().validate().is_ok());
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_validate_rejects_reversed_range() {
        let mut config = Config::for_testing();
        config.ranking.default_range = (5, 2);
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        std::env::set_var("PIXIV_REFRESH_TOKEN", "abc");
        std::env::set_var("PIXIV_BLOCK_TAGS", "R-18, gore ,");
        std::env::set_var("PIXIV_RANDOM_ILLUST_METHOD", "uniform");
        std::env::set_var("PIXIV_RANKING_DEFAULT_RANGE", "2-6");
        std::env::set_var("PIXIV_QUERY_COOLDOWN", "30");

        let config = Config::from_env().unwrap();
        assert_eq!(config.refresh_token, "abc");
        assert_eq!(config.block_tags, vec!["R-18".to_string(), "gore".to_string()]);
        assert_eq!(config.random_illust.method, RandomMethod::Uniform);
        assert_eq!(config.ranking.default_range, (2, 6));
        assert_eq!(config.query_cooldown, Duration::from_secs(30));
        assert_eq!(config.cache_ttl.illust_ranking, Duration::from_secs(6 * HOUR));

        for var in [
            "PIXIV_REFRESH_TOKEN",
            "PIXIV_BLOCK_TAGS",
            "PIXIV_RANDOM_ILLUST_METHOD",
            "PIXIV_RANKING_DEFAULT_RANGE",
            "PIXIV_QUERY_COOLDOWN",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_requires_refresh_token() {
        std::env::remove_var("PIXIV_REFRESH_TOKEN");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingEnvVar(name)) if name == "PIXIV_REFRESH_TOKEN"
        ));
    }
}
