//! Command handling: parse arguments, run admission checks, execute.
//!
//! A [`Command`] supplies the per-kind behaviour. [`CommandHandler`] wraps it
//! with the shared lifecycle and exposes it as an object-safe [`Handler`]
//! that the [`HandlerRegistry`] dispatches to.

pub mod commands;
pub mod recorder;
pub mod registry;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

pub use self::recorder::Recorder;
pub use self::registry::HandlerRegistry;
use crate::error::{Error, Result};
use crate::interceptor::{Interceptor, Verdict};
use crate::model::PostDestination;
use crate::postman::Postman;

/// Every command the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Illust,
    Ranking,
    RandomIllust,
    RandomUserIllust,
    RandomBookmark,
    RandomRecommended,
    RandomRelated,
    More,
}

impl HandlerKind {
    pub const ALL: [Self; 8] = [
        Self::Illust,
        Self::Ranking,
        Self::RandomIllust,
        Self::RandomUserIllust,
        Self::RandomBookmark,
        Self::RandomRecommended,
        Self::RandomRelated,
        Self::More,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Illust => "illust",
            Self::Ranking => "ranking",
            Self::RandomIllust => "random_illust",
            Self::RandomUserIllust => "random_user_illust",
            Self::RandomBookmark => "random_bookmark",
            Self::RandomRecommended => "random_recommended",
            Self::RandomRelated => "random_related",
            Self::More => "more",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown command '{s}'"))
    }
}

/// Why a request ended before execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    BadRequest(String),
    Denied(Option<String>),
}

/// Terminal state of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The command is switched off in configuration.
    Disabled,
    Rejected(Rejection),
    Failed(Error),
}

/// Per-kind behaviour plugged into [`CommandHandler`].
#[async_trait]
pub trait Command: Send + Sync + 'static {
    type Args: Send + Sync;

    fn kind(&self) -> HandlerKind;

    fn enabled(&self) -> bool;

    /// Turn positional arguments into typed ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for missing or malformed arguments.
    async fn parse_args(&self, args: &[String], dest: &PostDestination) -> Result<Self::Args>;

    /// Override the number of items requested, for replays.
    fn set_count(&self, _args: &mut Self::Args, _count: usize) {}

    /// Arguments that reproduce this request later, or `None` if it
    /// cannot be repeated with "more".
    fn replay_args(&self, _args: &Self::Args) -> Option<Vec<String>> {
        None
    }

    /// Run the request and deliver its response. Returns the ids of the
    /// illusts that were sent.
    async fn execute(&self, args: Self::Args, dest: &PostDestination) -> Result<Vec<u64>>;
}

/// Object-safe face of a command, as stored in the registry.
#[async_trait]
pub trait Handler: Send + Sync {
    fn kind(&self) -> HandlerKind;

    /// Run the full lifecycle. At most one message is sent for a failed
    /// request, and none when `silent`.
    async fn handle(&self, args: &[String], dest: &PostDestination, silent: bool) -> Outcome;

    /// Repeat a recorded request with a new count, skipping admission checks.
    ///
    /// # Errors
    ///
    /// Returns the parse or execution error.
    async fn replay(&self, args: &[String], count: usize, dest: &PostDestination) -> Result<()>;
}

pub struct CommandHandler<C> {
    command: C,
    interceptor: Option<Interceptor>,
    postman: Arc<dyn Postman>,
    recorder: Arc<Recorder>,
}

impl<C: Command> CommandHandler<C> {
    #[must_use]
    pub fn new(command: C, postman: Arc<dyn Postman>, recorder: Arc<Recorder>) -> Self {
        Self {
            command,
            interceptor: None,
            postman,
            recorder,
        }
    }

    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    async fn notify(&self, text: &str, dest: &PostDestination, silent: bool) {
        if silent {
            return;
        }
        if let Err(e) = self.postman.send_plain_text(text, dest).await {
            warn!(command = %self.command.kind(), error = %e, "Failed to send reply");
        }
    }

    /// Execute and remember what was done for "more" and related queries.
    async fn run(&self, args: C::Args, dest: &PostDestination) -> Result<()> {
        let replay = self.command.replay_args(&args);
        let sent = self.command.execute(args, dest).await?;

        if let Some(replay) = replay {
            self.recorder.record_request(dest, self.command.kind(), replay);
        }
        if let [illust_id] = sent.as_slice() {
            self.recorder.record_response(dest, *illust_id);
        }
        Ok(())
    }
}

#[async_trait]
impl<C: Command> Handler for CommandHandler<C> {
    fn kind(&self) -> HandlerKind {
        self.command.kind()
    }

    async fn handle(&self, args: &[String], dest: &PostDestination, silent: bool) -> Outcome {
        let kind = self.command.kind();
        if !self.command.enabled() {
            debug!(command = %kind, "Command disabled");
            return Outcome::Disabled;
        }

        let parsed = match self.command.parse_args(args, dest).await {
            Ok(parsed) => parsed,
            Err(e) => {
                let message = e.user_message();
                debug!(command = %kind, ?args, error = %e, "Rejected arguments");
                self.notify(&message, dest, silent).await;
                return Outcome::Rejected(Rejection::BadRequest(message));
            }
        };

        if let Some(interceptor) = &self.interceptor {
            if let Verdict::Deny(message) = interceptor.check(dest).await {
                info!(command = %kind, user = ?dest.identifier(), "Request denied");
                if let Some(text) = &message {
                    self.notify(text, dest, silent).await;
                }
                return Outcome::Rejected(Rejection::Denied(message));
            }
        }

        match self.run(parsed, dest).await {
            Ok(()) => {
                debug!(command = %kind, "Request handled");
                Outcome::Done
            }
            Err(Error::BadRequest(message)) => {
                debug!(command = %kind, %message, "Request rejected during execution");
                self.notify(&message, dest, silent).await;
                Outcome::Rejected(Rejection::BadRequest(message))
            }
            Err(e) => {
                if e.is_retryable() {
                    error!(command = %kind, error = %e, "Request failed");
                } else {
                    warn!(command = %kind, error = %e, "Request failed");
                }
                self.notify(&e.user_message(), dest, silent).await;
                Outcome::Failed(e)
            }
        }
    }

    async fn replay(&self, args: &[String], count: usize, dest: &PostDestination) -> Result<()> {
        let mut parsed = self.command.parse_args(args, dest).await?;
        self.command.set_count(&mut parsed, count);
        self.run(parsed, dest).await
    }
}
