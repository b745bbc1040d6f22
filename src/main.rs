use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pixivbot::collaborators::{InMemoryTagTranslations, NoAccountBindings};
use pixivbot::config::Config;
use pixivbot::handler::commands::{build_registry, CommandContext};
use pixivbot::handler::{HandlerKind, Outcome, Recorder};
use pixivbot::interceptor::{
    BlacklistInterceptor, CooldownInterceptor, Interceptor, SuperuserInterceptor,
};
use pixivbot::model::PostDestination;
use pixivbot::postman::{IllustMessage, Postman};
use pixivbot::random::RandomSelector;
use pixivbot::remote::api::HttpPixivApi;
use pixivbot::remote::RemoteFetcher;
use pixivbot::repo::PixivRepo;
use pixivbot::service::PixivService;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

/// Prints responses to stdout.
struct ConsolePostman;

#[async_trait]
impl Postman for ConsolePostman {
    async fn send_plain_text(&self, text: &str, _dest: &PostDestination) -> Result<()> {
        println!("{text}");
        Ok(())
    }

    async fn send_illust(&self, message: IllustMessage, _dest: &PostDestination) -> Result<()> {
        println!("{}", message.caption());
        if let Some(image) = &message.image {
            println!("[image: {} bytes]", image.len());
        }
        println!();
        Ok(())
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting pixivbot");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    let config = Arc::new(config);

    info!(
        api_base_url = %config.api_base_url,
        simultaneous_query = config.simultaneous_query,
        "Configuration loaded"
    );

    let api = HttpPixivApi::new(&config).context("Failed to build HTTP client")?;
    let mut fetcher = RemoteFetcher::new(Arc::new(api), Arc::clone(&config));
    if config.tag_translation_enabled {
        fetcher = fetcher.with_tag_translations(Arc::new(InMemoryTagTranslations::new()));
    }
    let fetcher = Arc::new(fetcher);
    fetcher.start().await.context("Failed to log in to Pixiv")?;

    let repo = Arc::new(PixivRepo::new(Arc::clone(&fetcher), Arc::clone(&config)));
    let service = Arc::new(PixivService::new(
        repo,
        RandomSelector::default(),
        Arc::clone(&config),
    ));

    let interceptor = Interceptor::All(vec![
        Interceptor::Blacklist(Arc::new(BlacklistInterceptor::new(config.blacklist.clone()))),
        Interceptor::Any(vec![
            Interceptor::Superuser(Arc::new(SuperuserInterceptor::new(
                config.superusers.clone(),
            ))),
            Interceptor::Cooldown(Arc::new(CooldownInterceptor::new(
                config.query_cooldown,
                config.no_query_cooldown_users.clone(),
            ))),
        ]),
    ]);

    let ctx = Arc::new(CommandContext {
        service,
        config: Arc::clone(&config),
        postman: Arc::new(ConsolePostman),
        recorder: Arc::new(Recorder::new(config.query_expires_in)),
        binder: Arc::new(NoAccountBindings),
    });
    let registry = build_registry(ctx, interceptor);

    let kinds: Vec<&str> = registry.kinds().into_iter().map(HandlerKind::as_str).collect();
    info!(commands = ?kinds, "Ready, reading commands from stdin");

    let dest = PostDestination::user("console", "local");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            () = &mut shutdown => break,
        };
        let Some(line) = line else { break };

        let mut words = line.split_whitespace().map(str::to_string);
        let Some(command) = words.next() else {
            continue;
        };
        let args: Vec<String> = words.collect();

        let kind = match command.parse::<HandlerKind>() {
            Ok(kind) => kind,
            Err(message) => {
                warn!(%command, "{message}");
                continue;
            }
        };
        if registry.dispatch(kind, &args, &dest, false).await == Outcome::Disabled {
            println!("{kind} is disabled");
        }
    }

    info!("Shutting down...");
    fetcher.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,pixivbot=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
