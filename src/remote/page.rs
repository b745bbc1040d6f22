//! Page decoding and pagination flattening.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::api::Cursor;
use crate::error::{Error, Result};
use crate::model::{Illust, User};

/// One decoded page of a listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}

/// Element of `user_previews` in user search results.
#[derive(Debug, Clone, Deserialize)]
pub struct UserPreview {
    pub user: User,
}

/// Fail with [`Error::Query`] if the response carries an `error` object.
///
/// The remote fills one of `user_message`, `message` or `reason`.
///
/// # Errors
///
/// Returns the remote's message as a query error.
pub fn check_error(raw: &Value) -> Result<()> {
    let Some(error) = raw.get("error") else {
        return Ok(());
    };
    let message = ["user_message", "message", "reason"]
        .iter()
        .filter_map(|k| error.get(*k).and_then(Value::as_str))
        .find(|m| !m.is_empty())
        .unwrap_or("remote reported an error");
    Err(Error::Query(message.to_string()))
}

/// Validate and decode a raw page whose elements live under `list_field`.
///
/// # Errors
///
/// Returns a query error for an embedded error marker, or a transient error
/// if the page does not decode.
pub fn parse_page<T: DeserializeOwned>(mut raw: Value, list_field: &str) -> Result<Page<T>> {
    check_error(&raw)?;

    let next = raw
        .get("next_url")
        .and_then(Value::as_str)
        .and_then(Cursor::from_next_url);
    let list = raw
        .get_mut(list_field)
        .map(Value::take)
        .ok_or_else(|| Error::Transient(format!("page has no '{list_field}' field")))?;
    let items = serde_json::from_value(list)?;

    Ok(Page { items, next })
}

/// Stop conditions for [`flatten`]. Zero means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageLimits {
    /// Maximum number of items kept.
    pub limit: usize,
    /// Maximum number of pages followed after the first.
    pub limit_page: usize,
}

/// Follow next cursors, collecting the items `keep` accepts.
///
/// Stops when `limits.limit` items were kept, when `limits.limit_page`
/// follow-up pages were requested, or when the server returns no cursor.
/// Rejected items do not count toward the limit.
///
/// # Errors
///
/// Propagates the first error returned by `fetch`.
pub async fn flatten<T, F, Fut, K>(mut fetch: F, limits: PageLimits, mut keep: K) -> Result<Vec<T>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
    K: FnMut(&T) -> bool,
{
    let mut items = Vec::new();
    let mut page = fetch(None).await?;
    let mut pages_followed = 0;

    loop {
        for item in page.items {
            if keep(&item) {
                items.push(item);
                if limits.limit != 0 && items.len() >= limits.limit {
                    return Ok(items);
                }
            }
        }

        let Some(next) = page.next else {
            break;
        };
        if limits.limit_page != 0 && pages_followed >= limits.limit_page {
            break;
        }
        pages_followed += 1;
        page = fetch(Some(next)).await?;
    }

    Ok(items)
}

/// Listing filter applied while flattening.
#[derive(Debug, Clone, Default)]
pub struct IllustFilter {
    pub block_tags: Vec<String>,
    pub min_bookmark: u64,
    pub min_view: u64,
}

impl IllustFilter {
    #[must_use]
    pub fn accepts(&self, illust: &Illust) -> bool {
        !illust.has_any_tag(&self.block_tags)
            && illust.total_bookmarks >= self.min_bookmark
            && illust.total_view >= self.min_view
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;
    use crate::model::fixtures::illust;

    fn page(ids: std::ops::Range<u32>, next: bool) -> Page<u32> {
        Page {
            items: ids.collect(),
            next: next.then(|| {
                Cursor::from_next_url("https://app-api.pixiv.net/v1/x?offset=30").unwrap()
            }),
        }
    }

    #[test]
    fn test_check_error_prefers_user_message() {
        let raw = json!({"error": {"user_message": "", "message": "Invalid illust_id", "reason": "x"}});
        assert_eq!(check_error(&raw), Err(Error::Query("Invalid illust_id".into())));
        assert!(check_error(&json!({"illusts": []})).is_ok());
    }

    #[test]
    fn test_parse_page_reads_next_cursor() {
        let raw = json!({
            "illusts": [1, 2, 3],
            "next_url": "https://app-api.pixiv.net/v1/illust/ranking?mode=day&offset=30"
        });
        let parsed: Page<u32> = parse_page(raw, "illusts").unwrap();
        assert_eq!(parsed.items, vec![1, 2, 3]);
        assert!(parsed.next.is_some());

        let last: Page<u32> = parse_page(json!({"illusts": [], "next_url": null}), "illusts").unwrap();
        assert!(last.next.is_none());
    }

    #[test]
    fn test_parse_page_bad_shape_is_transient() {
        let result: Result<Page<u32>> = parse_page(json!({"illusts": "nope"}), "illusts");
        assert!(matches!(result, Err(Error::Transient(_))));
        let result: Result<Page<u32>> = parse_page(json!({}), "illusts");
        assert!(matches!(result, Err(Error::Transient(_))));
    }

    #[tokio::test]
    async fn test_flatten_respects_item_and_page_limits() {
        let calls = Cell::new(0u32);
        let items = flatten(
            |_cursor| {
                let n = calls.get();
                calls.set(n + 1);
                async move { Ok(page(n * 3..n * 3 + 3, true)) }
            },
            PageLimits {
                limit: 5,
                limit_page: 2,
            },
            |_| true,
        )
        .await
        .unwrap();
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
        assert_eq!(calls.get(), 2);

        calls.set(0);
        let items = flatten(
            |_cursor| {
                let n = calls.get();
                calls.set(n + 1);
                async move { Ok(page(n * 3..n * 3 + 3, true)) }
            },
            PageLimits {
                limit: 100,
                limit_page: 2,
            },
            |_| true,
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 9);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_flatten_stops_without_cursor() {
        let items = flatten(
            |cursor| async move { Ok(page(0..4, cursor.is_none())) },
            PageLimits::default(),
            |_| true,
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 8);
    }

    #[tokio::test]
    async fn test_filtered_items_do_not_count_toward_limit() {
        let items = flatten(
            |cursor| async move {
                if cursor.is_none() {
                    Ok(page(0..10, true))
                } else {
                    Ok(page(10..20, false))
                }
            },
            PageLimits {
                limit: 6,
                limit_page: 0,
            },
            |n| n % 3 == 0,
        )
        .await
        .unwrap();
        assert_eq!(items, vec![0, 3, 6, 9, 12, 15]);
    }

    #[tokio::test]
    async fn test_flatten_propagates_page_error() {
        let result: Result<Vec<u32>> = flatten(
            |cursor| async move {
                if cursor.is_none() {
                    Ok(page(0..2, true))
                } else {
                    Err(Error::Query("rate limited".into()))
                }
            },
            PageLimits::default(),
            |_| true,
        )
        .await;
        assert_eq!(result, Err(Error::Query("rate limited".into())));
    }

    #[test]
    fn test_illust_filter() {
        let filter = IllustFilter {
            block_tags: vec!["R-18".to_string()],
            min_bookmark: 10,
            min_view: 100,
        };
        assert!(filter.accepts(&illust(1, 10, 100, &["cat"])));
        assert!(!filter.accepts(&illust(2, 10, 100, &["r-18"])));
        assert!(!filter.accepts(&illust(3, 9, 100, &[])));
        assert!(!filter.accepts(&illust(4, 10, 99, &[])));
    }
}
