//! Domain types: catalog items as returned by the API, and chat-side identities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::constants::DETAIL_UNKNOWN_PLACEHOLDER;

/// A tag attached to an illustration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub translated_name: Option<String>,
}

/// An illustration author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub account: String,
}

/// Resized image variants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrls {
    #[serde(default)]
    pub square_medium: String,
    #[serde(default)]
    pub medium: String,
    #[serde(default)]
    pub large: String,
    #[serde(default)]
    pub original: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSinglePage {
    #[serde(default)]
    pub original_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaPage {
    pub image_urls: ImageUrls,
}

/// A catalog item. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Illust {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    pub image_urls: ImageUrls,
    pub user: User,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub create_date: DateTime<FixedOffset>,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub meta_single_page: MetaSinglePage,
    #[serde(default)]
    pub meta_pages: Vec<MetaPage>,
    #[serde(default)]
    pub total_view: u64,
    #[serde(default)]
    pub total_bookmarks: u64,
}

impl Illust {
    /// Case-insensitive tag match against either the tag or its translation.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| {
            t.name.eq_ignore_ascii_case(tag)
                || t
                    .translated_name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(tag))
        })
    }

    /// Whether any of the given tags is present.
    #[must_use]
    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|t| self.has_tag(t.as_ref()))
    }

    /// Listing endpoints sometimes return a stub carrying a placeholder image
    /// instead of the real detail.
    #[must_use]
    pub fn is_detail_missing(&self) -> bool {
        self.image_urls.large.contains(DETAIL_UNKNOWN_PLACEHOLDER)
    }

    /// URL of the first page at full resolution.
    #[must_use]
    pub fn original_url(&self) -> Option<&str> {
        self.meta_pages.first().map_or_else(
            || self.meta_single_page.original_image_url.as_deref(),
            |p| p.image_urls.original.as_deref(),
        )
    }

    #[must_use]
    pub fn link(&self) -> String {
        format!("https://www.pixiv.net/artworks/{}", self.id)
    }
}

/// Ranking categories accepted by the ranking endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    Day,
    Week,
    Month,
    DayMale,
    DayFemale,
    WeekOriginal,
    WeekRookie,
    DayManga,
}

impl RankingMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::DayMale => "day_male",
            Self::DayFemale => "day_female",
            Self::WeekOriginal => "week_original",
            Self::WeekRookie => "week_rookie",
            Self::DayManga => "day_manga",
        }
    }
}

impl fmt::Display for RankingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "day_male" => Ok(Self::DayMale),
            "day_female" => Ok(Self::DayFemale),
            "week_original" => Ok(Self::WeekOriginal),
            "week_rookie" => Ok(Self::WeekRookie),
            "day_manga" => Ok(Self::DayManga),
            _ => Err(format!("'{s}' is not a valid ranking mode")),
        }
    }
}

/// A chat user, namespaced by the adapter it came from.
///
/// The same numeric id on two adapters is two different users.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserIdentifier {
    pub adapter: String,
    pub user_id: String,
}

impl UserIdentifier {
    #[must_use]
    pub fn new(adapter: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for UserIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.adapter, self.user_id)
    }
}

/// Where a response is delivered: a user, or a user inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostDestination {
    adapter: String,
    user_id: Option<String>,
    group_id: Option<String>,
}

impl PostDestination {
    /// Direct conversation with a user.
    #[must_use]
    pub fn user(adapter: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            user_id: Some(user_id.into()),
            group_id: None,
        }
    }

    /// A user speaking in a group.
    #[must_use]
    pub fn group(
        adapter: impl Into<String>,
        user_id: Option<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            user_id,
            group_id: Some(group_id.into()),
        }
    }

    #[must_use]
    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    /// Identifier of the sending user, if the post is attributed to one.
    #[must_use]
    pub fn identifier(&self) -> Option<UserIdentifier> {
        self.user_id
            .as_deref()
            .map(|uid| UserIdentifier::new(self.adapter.as_str(), uid))
    }

    /// Whether `list` names this user either bare or as `adapter:user_id`.
    #[must_use]
    pub fn user_listed_in<S: AsRef<str>>(&self, list: &[S]) -> bool {
        let Some(identifier) = self.identifier() else {
            return false;
        };
        let qualified = identifier.to_string();
        list.iter()
            .any(|s| s.as_ref() == identifier.user_id || s.as_ref() == qualified)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Build an illust with the fields selection and filtering look at.
    pub fn illust(id: u64, bookmarks: u64, views: u64, tags: &[&str]) -> Illust {
        illust_created(id, bookmarks, views, tags, "2024-01-01T00:00:00+09:00")
    }

    pub fn illust_created(
        id: u64,
        bookmarks: u64,
        views: u64,
        tags: &[&str],
        created: &str,
    ) -> Illust {
        Illust {
            id,
            title: format!("illust {id}"),
            image_urls: ImageUrls {
                large: format!("https://i.pximg.net/c/600x1200/{id}_p0.jpg"),
                ..ImageUrls::default()
            },
            user: User {
                id: 1,
                name: "artist".to_string(),
                account: "artist".to_string(),
            },
            tags: tags
                .iter()
                .map(|t| Tag {
                    name: (*t).to_string(),
                    translated_name: None,
                })
                .collect(),
            create_date: DateTime::parse_from_rfc3339(created).expect("valid timestamp"),
            page_count: 1,
            meta_single_page: MetaSinglePage {
                original_image_url: Some(format!("https://i.pximg.net/img-original/{id}_p0.png")),
            },
            meta_pages: Vec::new(),
            total_view: views,
            total_bookmarks: bookmarks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_api_illust() {
        let json = serde_json::json!({
            "id": 12345,
            "title": "sample",
            "type": "illust",
            "image_urls": {
                "square_medium": "https://i.pximg.net/sq.jpg",
                "medium": "https://i.pximg.net/m.jpg",
                "large": "https://i.pximg.net/l.jpg"
            },
            "user": {"id": 7, "name": "someone", "account": "some1"},
            "tags": [{"name": "風景", "translated_name": "scenery"}],
            "create_date": "2023-05-01T12:00:00+09:00",
            "page_count": 1,
            "meta_single_page": {"original_image_url": "https://i.pximg.net/o.png"},
            "meta_pages": [],
            "total_view": 100,
            "total_bookmarks": 10
        });
        let illust: Illust = serde_json::from_value(json).unwrap();
        assert_eq!(illust.id, 12345);
        assert!(illust.has_tag("scenery"));
        assert!(illust.has_tag("風景"));
        assert_eq!(illust.original_url(), Some("https://i.pximg.net/o.png"));
        assert!(!illust.is_detail_missing());
    }

    #[test]
    fn test_detail_missing_placeholder() {
        let mut illust = fixtures::illust(1, 0, 0, &[]);
        illust.image_urls.large =
            "https://s.pximg.net/common/images/limit_unknown_360.png".to_string();
        assert!(illust.is_detail_missing());
    }

    #[test]
    fn test_ranking_mode_parse() {
        assert_eq!("week_rookie".parse::<RankingMode>(), Ok(RankingMode::WeekRookie));
        assert_eq!("DAY".parse::<RankingMode>(), Ok(RankingMode::Day));
        assert!("yearly".parse::<RankingMode>().is_err());
    }

    #[test]
    fn test_user_identifiers_do_not_collide_across_adapters() {
        let a = PostDestination::user("onebot", "42").identifier().unwrap();
        let b = PostDestination::user("telegram", "42").identifier().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "onebot:42");
    }

    #[test]
    fn test_user_listed_in_bare_or_qualified() {
        let dest = PostDestination::user("onebot", "42");
        assert!(dest.user_listed_in(&["42"]));
        assert!(dest.user_listed_in(&["onebot:42"]));
        assert!(!dest.user_listed_in(&["telegram:42"]));

        let group_only = PostDestination::group("onebot", None, "1000");
        assert!(!group_only.user_listed_in(&["42"]));
    }
}
