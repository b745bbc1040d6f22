//! End-to-end command handling against a mock Pixiv API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pixivbot::collaborators::NoAccountBindings;
use pixivbot::config::Config;
use pixivbot::handler::commands::{build_registry, CommandContext};
use pixivbot::handler::{HandlerKind, HandlerRegistry, Outcome, Recorder, Rejection};
use pixivbot::interceptor::{CooldownInterceptor, Interceptor};
use pixivbot::model::PostDestination;
use pixivbot::postman::{IllustMessage, Postman};
use pixivbot::random::RandomSelector;
use pixivbot::remote::api::HttpPixivApi;
use pixivbot::remote::RemoteFetcher;
use pixivbot::repo::PixivRepo;
use pixivbot::service::PixivService;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Inbox {
    texts: Mutex<Vec<String>>,
    illusts: Mutex<Vec<IllustMessage>>,
}

#[async_trait]
impl Postman for Inbox {
    async fn send_plain_text(&self, text: &str, _dest: &PostDestination) -> anyhow::Result<()> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_illust(&self, message: IllustMessage, _dest: &PostDestination) -> anyhow::Result<()> {
        self.illusts.lock().unwrap().push(message);
        Ok(())
    }
}

async fn setup(server: &MockServer, interceptor: Interceptor) -> (Arc<Inbox>, Arc<HandlerRegistry>) {
    let config = Arc::new(Config {
        api_base_url: server.uri(),
        auth_url: format!("{}/auth/token", server.uri()),
        block_tags: vec!["R-18G".to_string()],
        ..Config::for_testing()
    });
    let api = HttpPixivApi::new(&config).expect("valid config");
    let fetcher = Arc::new(RemoteFetcher::new(Arc::new(api), Arc::clone(&config)));
    let repo = Arc::new(PixivRepo::new(fetcher, Arc::clone(&config)));
    let service = Arc::new(PixivService::new(
        repo,
        RandomSelector::default(),
        Arc::clone(&config),
    ));
    let inbox = Arc::new(Inbox::default());
    let ctx = Arc::new(CommandContext {
        service,
        recorder: Arc::new(Recorder::new(config.query_expires_in)),
        config,
        postman: inbox.clone(),
        binder: Arc::new(NoAccountBindings),
    });
    (inbox, build_registry(ctx, interceptor))
}

fn illust_json(id: u64, server: &str, tags: &[&str]) -> serde_json::Value {
    let tags: Vec<_> = tags.iter().map(|t| json!({"name": t})).collect();
    json!({
        "id": id,
        "title": format!("work {id}"),
        "image_urls": {"large": format!("{server}/img/{id}_large.jpg")},
        "user": {"id": 7, "name": "painter", "account": "painter"},
        "tags": tags,
        "create_date": "2024-03-01T12:00:00+09:00",
        "meta_single_page": {"original_image_url": format!("{server}/img/{id}_p0.png")},
        "total_view": 100,
        "total_bookmarks": 10
    })
}

async fn mount_images(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/img/\d+_p0\.png$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
        .mount(server)
        .await;
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[tokio::test]
async fn test_search_then_more_uses_cached_listing() {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount_images(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/search/illust"))
        .and(query_param("word", "sunset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "illusts": [
                illust_json(1, &uri, &["sunset"]),
                illust_json(2, &uri, &["sunset", "R-18G"]),
                illust_json(3, &uri, &["sunset"])
            ],
            "next_url": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (inbox, registry) = setup(&server, Interceptor::Allow).await;
    let dest = PostDestination::user("onebot", "1");

    let outcome = registry
        .dispatch(HandlerKind::RandomIllust, &args(&["sunset", "2"]), &dest, false)
        .await;
    assert_eq!(outcome, Outcome::Done);

    let outcome = registry
        .dispatch(HandlerKind::More, &args(&["3"]), &dest, false)
        .await;
    assert_eq!(outcome, Outcome::Done);

    let illusts = inbox.illusts.lock().unwrap();
    assert_eq!(illusts.len(), 5);
    // The blocked item never makes it into the listing.
    assert!(illusts.iter().all(|m| m.link != "https://www.pixiv.net/artworks/2"));
    assert!(illusts.iter().all(|m| m.image.is_some()));
    assert_eq!(illusts[0].number, Some(1));
    assert!(illusts[0].header.as_deref().is_some_and(|h| h.contains("sunset")));
}

#[tokio::test]
async fn test_unknown_illust_reports_remote_message_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/illust/detail"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"user_message": "Work has been deleted or the ID does not exist."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (inbox, registry) = setup(&server, Interceptor::Allow).await;
    let dest = PostDestination::user("onebot", "1");

    let outcome = registry
        .dispatch(HandlerKind::Illust, &args(&["123"]), &dest, false)
        .await;
    assert!(matches!(outcome, Outcome::Failed(_)), "{outcome:?}");
    assert_eq!(
        *inbox.texts.lock().unwrap(),
        vec!["Work has been deleted or the ID does not exist.".to_string()]
    );
}

#[tokio::test]
async fn test_cooldown_denies_second_query() {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount_images(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/illust/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "illust": illust_json(9, &uri, &[])
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cooldown = Interceptor::Cooldown(Arc::new(CooldownInterceptor::new(
        Duration::from_secs(3600),
        vec![],
    )));
    let (inbox, registry) = setup(&server, cooldown).await;
    let dest = PostDestination::user("onebot", "1");

    let first = registry
        .dispatch(HandlerKind::Illust, &args(&["9"]), &dest, false)
        .await;
    assert_eq!(first, Outcome::Done);

    let second = registry
        .dispatch(HandlerKind::Illust, &args(&["9"]), &dest, true)
        .await;
    assert!(matches!(second, Outcome::Rejected(Rejection::Denied(Some(_)))));
    // Silent requests send nothing.
    assert!(inbox.texts.lock().unwrap().is_empty());
    assert_eq!(inbox.illusts.lock().unwrap().len(), 1);
}
