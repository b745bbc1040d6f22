//! Presentation model handed to the chat adapter.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{BlockAction, Config};
use crate::error::Result;
use crate::model::{Illust, PostDestination};
use crate::repo::PixivRepo;

/// Text shown in place of content carrying a blocked tag.
pub const BLOCKED_NOTICE: &str = "This illust was withheld because it carries a blocked tag.";

/// One illust ready to be rendered by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllustMessage {
    pub title: String,
    pub author: String,
    pub create_time: String,
    pub link: String,
    pub image: Option<Arc<Vec<u8>>>,
    pub header: Option<String>,
    pub number: Option<usize>,
    /// Set when the content was withheld; explains why.
    pub block_message: Option<String>,
}

impl IllustMessage {
    /// Build the message for `illust`, downloading its image unless a blocked
    /// tag withholds it. Returns `None` when the block action is to stay silent.
    ///
    /// # Errors
    ///
    /// Returns the image download error.
    pub async fn build(
        illust: &Arc<Illust>,
        repo: &PixivRepo,
        config: &Config,
        header: Option<String>,
        number: Option<usize>,
    ) -> Result<Option<Self>> {
        let mut message = Self {
            title: String::new(),
            author: String::new(),
            create_time: String::new(),
            link: String::new(),
            image: None,
            header,
            number,
            block_message: None,
        };

        if illust.has_any_tag(&config.block_tags) {
            debug!(illust_id = illust.id, action = ?config.block_action, "Illust carries a blocked tag");
            match config.block_action {
                BlockAction::NoReply => return Ok(None),
                BlockAction::CompletelyBlock => {
                    message.block_message = Some(BLOCKED_NOTICE.to_string());
                    return Ok(Some(message));
                }
                BlockAction::NoImage => {
                    message.block_message = Some(BLOCKED_NOTICE.to_string());
                }
            }
        } else {
            message.image = Some(repo.image(illust).await?);
        }

        message.title.clone_from(&illust.title);
        message.author = format!("{} ({})", illust.user.name, illust.user.id);
        message.create_time = illust.create_date.format("%Y-%m-%d %H:%M:%S").to_string();
        message.link = illust.link();
        Ok(Some(message))
    }

    /// Plain-text rendering, used by text-only adapters and logs.
    #[must_use]
    pub fn caption(&self) -> String {
        let mut lines = Vec::new();
        if let Some(header) = &self.header {
            lines.push(header.clone());
        }
        if let Some(notice) = &self.block_message {
            lines.push(notice.clone());
        }
        if !self.title.is_empty() {
            let title = match self.number {
                Some(n) => format!("#{n} {}", self.title),
                None => self.title.clone(),
            };
            lines.push(title);
            lines.push(format!("Author: {}", self.author));
            lines.push(format!("Posted: {}", self.create_time));
            lines.push(self.link.clone());
        }
        lines.join("\n")
    }
}

/// Delivers responses to a chat destination.
#[async_trait]
pub trait Postman: Send + Sync {
    async fn send_plain_text(&self, text: &str, dest: &PostDestination) -> anyhow::Result<()>;

    async fn send_illust(&self, message: IllustMessage, dest: &PostDestination) -> anyhow::Result<()>;
}

/// Send `illusts`, numbering them when there is more than one. The header
/// goes on the first message only.
///
/// # Errors
///
/// Returns the first image download error. Delivery failures are logged.
pub async fn post_illusts(
    illusts: &[Arc<Illust>],
    header: Option<String>,
    repo: &PixivRepo,
    config: &Config,
    postman: &dyn Postman,
    dest: &PostDestination,
) -> Result<()> {
    let numbered = illusts.len() > 1;
    let mut header = header;

    for (i, illust) in illusts.iter().enumerate() {
        let number = numbered.then_some(i + 1);
        let Some(message) = IllustMessage::build(illust, repo, config, header.take(), number).await?
        else {
            continue;
        };
        if let Err(e) = postman.send_illust(message, dest).await {
            warn!(illust_id = illust.id, error = %e, "Failed to deliver illust");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::illust;
    use crate::remote::fake::FakeApi;
    use crate::remote::RemoteFetcher;

    fn repo(config: &Arc<Config>) -> (Arc<FakeApi>, PixivRepo) {
        let api = Arc::new(FakeApi::new(30));
        let fetcher = Arc::new(RemoteFetcher::new(api.clone(), Arc::clone(config)));
        (api, PixivRepo::new(fetcher, Arc::clone(config)))
    }

    fn blocking(action: BlockAction) -> Arc<Config> {
        Arc::new(Config {
            block_tags: vec!["gore".into()],
            block_action: action,
            ..Config::for_testing()
        })
    }

    #[tokio::test]
    async fn test_build_downloads_image() {
        let config = Arc::new(Config::for_testing());
        let (api, repo) = repo(&config);
        let item = Arc::new(illust(3, 0, 0, &["cat"]));

        let message = IllustMessage::build(&item, &repo, &config, Some("hi".into()), None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(message.link, "https://www.pixiv.net/artworks/3");
        assert_eq!(message.author, "artist (1)");
        assert_eq!(message.create_time, "2024-01-01 00:00:00");
        assert!(message.image.is_some());
        assert!(message.block_message.is_none());
        assert_eq!(api.count("download:"), 1);
    }

    #[tokio::test]
    async fn test_block_actions() {
        let item = Arc::new(illust(3, 0, 0, &["Gore"]));

        let config = blocking(BlockAction::NoReply);
        let (_, repo_) = repo(&config);
        assert!(IllustMessage::build(&item, &repo_, &config, None, None)
            .await
            .unwrap()
            .is_none());

        let config = blocking(BlockAction::CompletelyBlock);
        let (api, repo_) = repo(&config);
        let message = IllustMessage::build(&item, &repo_, &config, None, None)
            .await
            .unwrap()
            .unwrap();
        assert!(message.title.is_empty());
        assert_eq!(message.block_message.as_deref(), Some(BLOCKED_NOTICE));
        assert_eq!(api.count("download:"), 0);

        let config = blocking(BlockAction::NoImage);
        let (api, repo_) = repo(&config);
        let message = IllustMessage::build(&item, &repo_, &config, None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.title, "illust 3");
        assert!(message.image.is_none());
        assert_eq!(api.count("download:"), 0);
    }

    #[test]
    fn test_caption_numbers_items() {
        let message = IllustMessage {
            title: "sunset".into(),
            author: "artist (1)".into(),
            create_time: "2024-01-01 00:00:00".into(),
            link: "https://www.pixiv.net/artworks/3".into(),
            image: None,
            header: Some("Ranking".into()),
            number: Some(2),
            block_message: None,
        };
        let caption = message.caption();
        assert!(caption.starts_with("Ranking\n#2 sunset"));
        assert!(caption.ends_with("https://www.pixiv.net/artworks/3"));
    }
}
