//! The bot's commands and the registry wiring them together.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Command, CommandHandler, Handler, HandlerKind, HandlerRegistry, Recorder};
use crate::collaborators::AccountBinder;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::interceptor::Interceptor;
use crate::model::{Illust, PostDestination, RankingMode};
use crate::postman::{post_illusts, Postman};
use crate::service::PixivService;

/// Everything the commands share.
pub struct CommandContext {
    pub service: Arc<PixivService>,
    pub config: Arc<Config>,
    pub postman: Arc<dyn Postman>,
    pub recorder: Arc<Recorder>,
    pub binder: Arc<dyn AccountBinder>,
}

impl CommandContext {
    async fn post(
        &self,
        illusts: &[Arc<Illust>],
        header: Option<String>,
        dest: &PostDestination,
    ) -> Result<Vec<u64>> {
        post_illusts(
            illusts,
            header,
            self.service.repo(),
            &self.config,
            self.postman.as_ref(),
            dest,
        )
        .await?;
        Ok(illusts.iter().map(|i| i.id).collect())
    }

    fn parse_count(&self, arg: Option<&String>) -> Result<usize> {
        let Some(arg) = arg else {
            return Ok(1);
        };
        let max = self.config.max_item_per_query;
        match arg.parse::<usize>() {
            Ok(count) if (1..=max).contains(&count) => Ok(count),
            _ => Err(Error::BadRequest(format!(
                "{arg} is not a valid count (1-{max})"
            ))),
        }
    }
}

fn parse_id(arg: &str) -> Result<u64> {
    arg.parse()
        .map_err(|_| Error::BadRequest(format!("{arg} is not a valid ID")))
}

/// Split `word... [count]`: a trailing number counts items when a word precedes it.
fn split_count(args: &[String]) -> (&[String], Option<&String>) {
    match args.split_last() {
        Some((last, rest)) if !rest.is_empty() && last.parse::<usize>().is_ok() => {
            (rest, Some(last))
        }
        _ => (args, None),
    }
}

/// `N` or `A-B`, both 1-based and inclusive.
fn parse_range(arg: &str) -> Option<(usize, usize)> {
    match arg.split_once('-') {
        Some((start, end)) => Some((start.trim().parse().ok()?, end.trim().parse().ok()?)),
        None => {
            let nth = arg.parse().ok()?;
            Some((nth, nth))
        }
    }
}

pub struct IllustCommand {
    ctx: Arc<CommandContext>,
}

#[async_trait]
impl Command for IllustCommand {
    type Args = u64;

    fn kind(&self) -> HandlerKind {
        HandlerKind::Illust
    }

    fn enabled(&self) -> bool {
        self.ctx.config.illust_query_enabled
    }

    async fn parse_args(&self, args: &[String], _dest: &PostDestination) -> Result<u64> {
        let arg = args
            .first()
            .ok_or_else(|| Error::BadRequest("Please give an illust ID".into()))?;
        parse_id(arg)
    }

    async fn execute(&self, illust_id: u64, dest: &PostDestination) -> Result<Vec<u64>> {
        let illust = self.ctx.service.illust_detail(illust_id).await?;
        self.ctx.post(&[illust], None, dest).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingArgs {
    pub mode: RankingMode,
    pub range: (usize, usize),
}

pub struct RankingCommand {
    ctx: Arc<CommandContext>,
}

#[async_trait]
impl Command for RankingCommand {
    type Args = RankingArgs;

    fn kind(&self) -> HandlerKind {
        HandlerKind::Ranking
    }

    fn enabled(&self) -> bool {
        self.ctx.config.ranking.enabled
    }

    async fn parse_args(&self, args: &[String], _dest: &PostDestination) -> Result<RankingArgs> {
        let ranking = &self.ctx.config.ranking;
        let mut rest = args.iter();
        let mut next = rest.next();

        let mode = match next.map(|a| a.parse::<RankingMode>()) {
            Some(Ok(mode)) => {
                next = rest.next();
                mode
            }
            Some(Err(message)) if next.and_then(|a| parse_range(a)).is_none() => {
                return Err(Error::BadRequest(message));
            }
            _ => ranking.default_mode,
        };

        let range = match next {
            Some(arg) => parse_range(arg)
                .ok_or_else(|| Error::BadRequest(format!("{arg} is not a valid range")))?,
            None => ranking.default_range,
        };
        Ok(RankingArgs { mode, range })
    }

    async fn execute(&self, args: RankingArgs, dest: &PostDestination) -> Result<Vec<u64>> {
        let illusts = self
            .ctx
            .service
            .illust_ranking(args.mode, args.range)
            .await?;
        let (start, end) = args.range;
        let header = format!("{} ranking #{start}-{end}", args.mode);
        self.ctx.post(&illusts, Some(header), dest).await
    }
}

/// `random_illust <word...> [count]`
pub struct RandomIllustCommand {
    ctx: Arc<CommandContext>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordArgs {
    pub word: String,
    pub count: usize,
}

#[async_trait]
impl Command for RandomIllustCommand {
    type Args = WordArgs;

    fn kind(&self) -> HandlerKind {
        HandlerKind::RandomIllust
    }

    fn enabled(&self) -> bool {
        self.ctx.config.random_illust.enabled
    }

    async fn parse_args(&self, args: &[String], _dest: &PostDestination) -> Result<WordArgs> {
        let (words, count) = split_count(args);
        if words.is_empty() {
            return Err(Error::BadRequest("Please give a keyword".into()));
        }
        Ok(WordArgs {
            word: words.join(" "),
            count: self.ctx.parse_count(count)?,
        })
    }

    fn set_count(&self, args: &mut WordArgs, count: usize) {
        args.count = count;
    }

    fn replay_args(&self, args: &WordArgs) -> Option<Vec<String>> {
        Some(vec![args.word.clone()])
    }

    async fn execute(&self, args: WordArgs, dest: &PostDestination) -> Result<Vec<u64>> {
        let illusts = self.ctx.service.random_illust(&args.word, args.count).await?;
        let header = format!("Here are some illusts for {}", args.word);
        self.ctx.post(&illusts, Some(header), dest).await
    }
}

/// `random_user_illust <name...> [count]`
pub struct RandomUserIllustCommand {
    ctx: Arc<CommandContext>,
}

#[async_trait]
impl Command for RandomUserIllustCommand {
    type Args = WordArgs;

    fn kind(&self) -> HandlerKind {
        HandlerKind::RandomUserIllust
    }

    fn enabled(&self) -> bool {
        self.ctx.config.random_user_illust.enabled
    }

    async fn parse_args(&self, args: &[String], _dest: &PostDestination) -> Result<WordArgs> {
        let (words, count) = split_count(args);
        if words.is_empty() {
            return Err(Error::BadRequest("Please give a user name".into()));
        }
        Ok(WordArgs {
            word: words.join(" "),
            count: self.ctx.parse_count(count)?,
        })
    }

    fn set_count(&self, args: &mut WordArgs, count: usize) {
        args.count = count;
    }

    fn replay_args(&self, args: &WordArgs) -> Option<Vec<String>> {
        Some(vec![args.word.clone()])
    }

    async fn execute(&self, args: WordArgs, dest: &PostDestination) -> Result<Vec<u64>> {
        let (user, illusts) = self
            .ctx
            .service
            .random_user_illust(&args.word, args.count)
            .await?;
        let header = format!("Here are some works by {}", user.name);
        self.ctx.post(&illusts, Some(header), dest).await
    }
}

/// `random_recommended [count]`
pub struct RandomRecommendedCommand {
    ctx: Arc<CommandContext>,
}

#[async_trait]
impl Command for RandomRecommendedCommand {
    type Args = usize;

    fn kind(&self) -> HandlerKind {
        HandlerKind::RandomRecommended
    }

    fn enabled(&self) -> bool {
        self.ctx.config.random_recommended_illust.enabled
    }

    async fn parse_args(&self, args: &[String], _dest: &PostDestination) -> Result<usize> {
        self.ctx.parse_count(args.first())
    }

    fn set_count(&self, args: &mut usize, count: usize) {
        *args = count;
    }

    fn replay_args(&self, _args: &usize) -> Option<Vec<String>> {
        Some(Vec::new())
    }

    async fn execute(&self, count: usize, dest: &PostDestination) -> Result<Vec<u64>> {
        let illusts = self.ctx.service.random_recommended_illust(count).await?;
        self.ctx
            .post(&illusts, Some("Here are some recommended illusts".into()), dest)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdArgs {
    pub id: u64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookmarkArgs {
    /// Explicit account; `None` is resolved when the command runs.
    pub pixiv_user_id: Option<u64>,
    pub count: usize,
}

/// `random_bookmark [pixiv_user_id [count]]`
///
/// Without an id, the sender's bound account is used, then the configured
/// default account.
pub struct RandomBookmarkCommand {
    ctx: Arc<CommandContext>,
}

impl RandomBookmarkCommand {
    pub const NO_ACCOUNT: &'static str = "Invalid Pixiv account, or no Pixiv account bound";

    async fn resolve_user(&self, dest: &PostDestination) -> Result<Option<u64>> {
        if let Some(sender) = dest.user_id() {
            let bound = self
                .ctx
                .binder
                .get_binding(sender)
                .await
                .map_err(|e| Error::Transient(format!("account binding lookup failed: {e}")))?;
            if let Some(bound) = bound.filter(|id| *id != 0) {
                debug!(sender, pixiv_user_id = bound, "Using bound Pixiv account");
                return Ok(Some(bound));
            }
        }
        Ok(self.ctx.config.random_bookmark_user_id.filter(|id| *id != 0))
    }
}

#[async_trait]
impl Command for RandomBookmarkCommand {
    type Args = BookmarkArgs;

    fn kind(&self) -> HandlerKind {
        HandlerKind::RandomBookmark
    }

    fn enabled(&self) -> bool {
        self.ctx.config.random_bookmark.enabled
    }

    async fn parse_args(&self, args: &[String], _dest: &PostDestination) -> Result<BookmarkArgs> {
        let explicit = args.first().map(|a| parse_id(a)).transpose()?;
        let count = self.ctx.parse_count(args.get(1))?;
        Ok(BookmarkArgs {
            pixiv_user_id: explicit.filter(|id| *id != 0),
            count,
        })
    }

    fn set_count(&self, args: &mut BookmarkArgs, count: usize) {
        args.count = count;
    }

    fn replay_args(&self, args: &BookmarkArgs) -> Option<Vec<String>> {
        Some(args.pixiv_user_id.map(|id| id.to_string()).into_iter().collect())
    }

    async fn execute(&self, args: BookmarkArgs, dest: &PostDestination) -> Result<Vec<u64>> {
        let user_id = match args.pixiv_user_id {
            Some(id) => Some(id),
            None => self.resolve_user(dest).await?,
        };
        let user_id = user_id.ok_or_else(|| Error::BadRequest(Self::NO_ACCOUNT.into()))?;

        let illusts = self.ctx.service.random_bookmark(user_id, args.count).await?;
        self.ctx
            .post(&illusts, Some("Here is something from the bookmarks".into()), dest)
            .await
    }
}

/// `random_related [illust_id [count]]`
///
/// Without an id, works related to the last single illust sent here are chosen.
pub struct RandomRelatedCommand {
    ctx: Arc<CommandContext>,
}

impl RandomRelatedCommand {
    pub const NO_ILLUST: &'static str = "Which illust? Send one first or give its ID";
}

#[async_trait]
impl Command for RandomRelatedCommand {
    type Args = IdArgs;

    fn kind(&self) -> HandlerKind {
        HandlerKind::RandomRelated
    }

    fn enabled(&self) -> bool {
        self.ctx.config.random_related_illust.enabled
    }

    async fn parse_args(&self, args: &[String], dest: &PostDestination) -> Result<IdArgs> {
        let count = self.ctx.parse_count(args.get(1))?;
        let id = match args.first() {
            Some(arg) => parse_id(arg)?,
            None => self
                .ctx
                .recorder
                .get_response(dest)
                .ok_or_else(|| Error::BadRequest(Self::NO_ILLUST.into()))?,
        };
        Ok(IdArgs { id, count })
    }

    fn set_count(&self, args: &mut IdArgs, count: usize) {
        args.count = count;
    }

    fn replay_args(&self, args: &IdArgs) -> Option<Vec<String>> {
        Some(vec![args.id.to_string()])
    }

    async fn execute(&self, args: IdArgs, dest: &PostDestination) -> Result<Vec<u64>> {
        let illusts = self
            .ctx
            .service
            .random_related_illust(args.id, args.count)
            .await?;
        let header = format!("Here are some illusts related to {}", args.id);
        self.ctx.post(&illusts, Some(header), dest).await
    }
}

/// `more [count]`: repeat the last recordable request for this destination.
pub struct MoreCommand {
    ctx: Arc<CommandContext>,
    registry: Weak<HandlerRegistry>,
}

impl MoreCommand {
    pub const NO_REQUEST: &'static str = "You haven't sent a request yet";
}

#[async_trait]
impl Command for MoreCommand {
    type Args = usize;

    fn kind(&self) -> HandlerKind {
        HandlerKind::More
    }

    fn enabled(&self) -> bool {
        self.ctx.config.more_enabled
    }

    async fn parse_args(&self, args: &[String], _dest: &PostDestination) -> Result<usize> {
        self.ctx.parse_count(args.first())
    }

    async fn execute(&self, count: usize, dest: &PostDestination) -> Result<Vec<u64>> {
        let record = self
            .ctx
            .recorder
            .get_request(dest)
            .ok_or_else(|| Error::BadRequest(Self::NO_REQUEST.into()))?;
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| Error::Unsupported("handlers are shutting down".into()))?;
        let handler = registry
            .get(record.kind)
            .ok_or_else(|| Error::BadRequest(Self::NO_REQUEST.into()))?;

        info!(command = %record.kind, args = ?record.args, count, "Replaying request");
        handler.replay(&record.args, count, dest).await?;
        Ok(Vec::new())
    }
}

/// Register every command. `interceptor` guards each of them.
#[must_use]
pub fn build_registry(ctx: Arc<CommandContext>, interceptor: Interceptor) -> Arc<HandlerRegistry> {
    Arc::new_cyclic(|weak| {
        fn wrap<C: Command>(
            command: C,
            ctx: &CommandContext,
            interceptor: &Interceptor,
        ) -> Arc<dyn Handler> {
            Arc::new(
                CommandHandler::new(command, Arc::clone(&ctx.postman), Arc::clone(&ctx.recorder))
                    .with_interceptor(interceptor.clone()),
            )
        }

        let mut registry = HandlerRegistry::new();
        let c = || Arc::clone(&ctx);
        registry.register(wrap(IllustCommand { ctx: c() }, &ctx, &interceptor));
        registry.register(wrap(RankingCommand { ctx: c() }, &ctx, &interceptor));
        registry.register(wrap(RandomIllustCommand { ctx: c() }, &ctx, &interceptor));
        registry.register(wrap(RandomUserIllustCommand { ctx: c() }, &ctx, &interceptor));
        registry.register(wrap(RandomRecommendedCommand { ctx: c() }, &ctx, &interceptor));
        registry.register(wrap(RandomBookmarkCommand { ctx: c() }, &ctx, &interceptor));
        registry.register(wrap(RandomRelatedCommand { ctx: c() }, &ctx, &interceptor));
        registry.register(wrap(
            MoreCommand {
                ctx: c(),
                registry: weak.clone(),
            },
            &ctx,
            &interceptor,
        ));
        registry
    })
}
