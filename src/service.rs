//! Query execution: look up listings, choose items, resolve their details.

use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::debug;

use crate::config::{Config, RandomQueryConfig};
use crate::error::{Error, Result};
use crate::model::{Illust, RankingMode, User};
use crate::random::RandomSelector;
use crate::repo::{Listing, PixivRepo};

pub struct PixivService {
    repo: Arc<PixivRepo>,
    selector: RandomSelector,
    config: Arc<Config>,
}

impl PixivService {
    #[must_use]
    pub fn new(repo: Arc<PixivRepo>, selector: RandomSelector, config: Arc<Config>) -> Self {
        Self {
            repo,
            selector,
            config,
        }
    }

    #[must_use]
    pub fn repo(&self) -> &Arc<PixivRepo> {
        &self.repo
    }

    /// # Errors
    ///
    /// Returns a query error for an unknown item.
    pub async fn illust_detail(&self, illust_id: u64) -> Result<Arc<Illust>> {
        self.repo.illust_detail(illust_id).await
    }

    /// Items `start..=end` (1-based) of the ranking for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for an empty, reversed or oversized
    /// range, or one reaching past the fetched ranking.
    pub async fn illust_ranking(
        &self,
        mode: RankingMode,
        (start, end): (usize, usize),
    ) -> Result<Vec<Arc<Illust>>> {
        if start == 0 || start > end {
            return Err(Error::BadRequest(format!("Illegal range {start}-{end}")));
        }
        let max = self.config.ranking.max_item_per_query;
        if end - start + 1 > max {
            return Err(Error::BadRequest(format!(
                "At most {max} ranking items can be shown at once"
            )));
        }

        let listing = self.repo.illust_ranking(mode).await?;
        if end > listing.len() {
            return Err(Error::BadRequest(format!(
                "The {mode} ranking only has {} items",
                listing.len()
            )));
        }

        self.resolve_all(listing[start - 1..end].to_vec()).await
    }

    /// # Errors
    ///
    /// Returns [`Error::Empty`] when nothing matches `word`.
    pub async fn random_illust(&self, word: &str, count: usize) -> Result<Vec<Arc<Illust>>> {
        let listing = self.repo.search_illust(word).await?;
        self.pick(&listing, &self.config.random_illust, count).await
    }

    /// # Errors
    ///
    /// Returns [`Error::Empty`] when there are no recommendations.
    pub async fn random_recommended_illust(&self, count: usize) -> Result<Vec<Arc<Illust>>> {
        let listing = self.repo.recommended_illusts().await?;
        self.pick(&listing, &self.config.random_recommended_illust, count)
            .await
    }

    /// # Errors
    ///
    /// Returns [`Error::Empty`] when the item has no related works.
    pub async fn random_related_illust(
        &self,
        illust_id: u64,
        count: usize,
    ) -> Result<Vec<Arc<Illust>>> {
        let listing = self.repo.related_illusts(illust_id).await?;
        self.pick(&listing, &self.config.random_related_illust, count)
            .await
    }

    /// Random works of the first user matching `word`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] when no user matches, or
    /// [`Error::Empty`] when the user has no works.
    pub async fn random_user_illust(
        &self,
        word: &str,
        count: usize,
    ) -> Result<(User, Vec<Arc<Illust>>)> {
        let users = self.repo.search_user(word).await?;
        let user = users
            .first()
            .cloned()
            .ok_or_else(|| Error::BadRequest(format!("No user named {word}")))?;

        let listing = self.repo.user_illusts(user.id).await?;
        let illusts = self
            .pick(&listing, &self.config.random_user_illust, count)
            .await?;
        Ok((user, illusts))
    }

    /// # Errors
    ///
    /// Returns [`Error::Empty`] when the user has no public bookmarks.
    pub async fn random_bookmark(&self, pixiv_user_id: u64, count: usize) -> Result<Vec<Arc<Illust>>> {
        let listing = self.repo.user_bookmarks(pixiv_user_id).await?;
        self.pick(&listing, &self.config.random_bookmark, count)
            .await
    }

    async fn pick(
        &self,
        listing: &Listing,
        query: &RandomQueryConfig,
        count: usize,
    ) -> Result<Vec<Arc<Illust>>> {
        let picked: Vec<_> = {
            let mut rng = rand::thread_rng();
            self.selector
                .select_many(listing, query.method, count, &mut rng)?
                .into_iter()
                .cloned()
                .collect()
        };
        debug!(
            candidates = listing.len(),
            picked = picked.len(),
            method = %query.method,
            "Selected items"
        );
        self.resolve_all(picked).await
    }

    async fn resolve_all(&self, items: Vec<crate::repo::lazy::LazyItem>) -> Result<Vec<Arc<Illust>>> {
        let repo = self.repo.as_ref();
        try_join_all(items.into_iter().map(|mut item| async move { item.resolve(repo).await }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::illust;
    use crate::remote::api::Operation;
    use crate::remote::fake::FakeApi;
    use crate::remote::RemoteFetcher;

    fn service(api: FakeApi, config: Config) -> (Arc<FakeApi>, PixivService) {
        let api = Arc::new(api);
        let config = Arc::new(config);
        let fetcher = Arc::new(RemoteFetcher::new(api.clone(), Arc::clone(&config)));
        let repo = Arc::new(PixivRepo::new(fetcher, Arc::clone(&config)));
        (api, PixivService::new(repo, RandomSelector::default(), config))
    }

    fn ranking_api(count: u64) -> FakeApi {
        FakeApi::new(30).with_listing(
            &Operation::Ranking {
                mode: RankingMode::Day,
            },
            (1..=count).map(|id| illust(id, 0, 0, &[])).collect(),
        )
    }

    #[tokio::test]
    async fn test_ranking_range_is_one_based_inclusive() {
        let (_, service) = service(ranking_api(20), Config::for_testing());
        let items = service.illust_ranking(RankingMode::Day, (2, 4)).await.unwrap();
        let ids: Vec<u64> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_ranking_range_validation() {
        let (api, service) = service(ranking_api(20), Config::for_testing());

        for range in [(0, 3), (5, 2), (1, 11), (19, 21)] {
            let result = service.illust_ranking(RankingMode::Day, range).await;
            assert!(matches!(result, Err(Error::BadRequest(_))), "{range:?}");
        }
        // Only the last range needed the listing, and it was fetched once.
        assert_eq!(api.count("list:"), 1);
    }

    #[tokio::test]
    async fn test_random_illust_resolves_stubs() {
        let mut stub = illust(8, 0, 0, &[]);
        stub.image_urls.large =
            "https://s.pximg.net/common/images/limit_unknown_360.png".to_string();
        let api = FakeApi::new(30)
            .with_listing(&Operation::SearchIllust { word: "cat".into() }, vec![stub])
            .with_detail(illust(8, 3, 3, &["cat"]));
        let (api, service) = service(api, Config::for_testing());

        let picked = service.random_illust("cat", 2).await.unwrap();
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|i| i.has_tag("cat")));
        assert_eq!(api.count("detail:8"), 1);
    }

    #[tokio::test]
    async fn test_random_from_empty_listing() {
        let api = FakeApi::new(30).with_listing(&Operation::RecommendedIllusts, vec![]);
        let (_, service) = service(api, Config::for_testing());
        assert_eq!(service.random_recommended_illust(1).await, Err(Error::Empty));
    }

    #[tokio::test]
    async fn test_random_user_illust_uses_first_match() {
        let api = FakeApi::new(30)
            .with_users(vec![User {
                id: 5,
                name: "painter".into(),
                account: "painter".into(),
            }])
            .with_listing(&Operation::UserIllusts { user_id: 5 }, vec![illust(50, 0, 0, &[])]);
        let (_, service) = service(api, Config::for_testing());

        let (user, illusts) = service.random_user_illust("painter", 1).await.unwrap();
        assert_eq!(user.id, 5);
        assert_eq!(illusts[0].id, 50);
    }

    #[tokio::test]
    async fn test_random_user_illust_unknown_user() {
        let (_, service) = service(FakeApi::new(30), Config::for_testing());
        let result = service.random_user_illust("nobody", 1).await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }
}
