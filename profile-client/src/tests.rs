use crate::api::{BrowserlessClient, ContentRequest};
use crate::{FetchSettings, ProfileClient};
use postwatch_core::{FetchError, FetchStage, FetcherFactory, Handle};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMELINE: &str = r#"<html><body>
    <article>
      <a href="/alice/status/1"><time datetime="2024-05-01T10:00:00.000Z">May 1</time></a>
      <div>token sale</div>
    </article>
</body></html>"#;

const HEADER: &str = r#"<html><body>
    <a href="/alice/verified_followers"><span>9,876</span> <span>Followers</span></a>
</body></html>"#;

fn settings(timeout_ms: u64) -> FetchSettings {
    FetchSettings {
        profile_base_url: "https://x.com".to_string(),
        page_load_timeout: Duration::from_millis(timeout_ms),
        element_timeout: Duration::from_millis(timeout_ms),
    }
}

fn client_for(server: &MockServer, timeout_ms: u64) -> ProfileClient {
    let browser = BrowserlessClient::new(&server.uri(), Some("secret".to_string())).unwrap();
    ProfileClient::new(browser, settings(timeout_ms))
}

fn alice() -> Handle {
    Handle::parse("alice").unwrap()
}

#[test]
fn test_content_request_shape() {
    let request = ContentRequest::new(
        "https://x.com/alice",
        "article",
        Duration::from_secs(60),
        Duration::from_secs(50),
    );
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["url"], "https://x.com/alice");
    assert_eq!(json["gotoOptions"]["timeout"], 60_000);
    assert_eq!(json["waitForSelector"]["selector"], "article");
    assert_eq!(json["waitForSelector"]["timeout"], 50_000);
}

#[test]
fn test_huge_timeouts_saturate_instead_of_overflowing() {
    let huge = Duration::from_secs(18_446_744_073_709_551);
    let request = ContentRequest::new("https://x.com/alice", "article", huge, huge);
    assert_eq!(request.budget(), Duration::from_millis(u64::MAX));

    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["gotoOptions"]["timeout"], 18_446_744_073_709_551_000u64);

    let beyond_u64 = Duration::from_secs(u64::MAX);
    let request = ContentRequest::new("https://x.com/alice", "article", beyond_u64, beyond_u64);
    assert_eq!(request.goto_options.timeout, u64::MAX);
    assert_eq!(request.budget(), Duration::from_millis(u64::MAX));
}

#[tokio::test]
async fn test_fetch_performs_two_navigations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .and(query_param("token", "secret"))
        .and(body_partial_json(serde_json::json!({
            "url": "https://x.com/alice",
            "waitForSelector": { "selector": "article" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(TIMELINE))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .and(body_partial_json(serde_json::json!({
            "waitForSelector": { "selector": crate::extract::FOLLOWERS_SELECTOR }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(HEADER))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = client_for(&server, 1_000).fetcher();
    let snapshot = fetcher.fetch(&alice()).await.unwrap();

    assert_eq!(snapshot.posts.len(), 1);
    assert_eq!(snapshot.posts[0].permalink, "https://x.com/alice/status/1");
    assert_eq!(snapshot.follower_count, "9,876 Followers");
}

#[tokio::test]
async fn test_service_timeout_maps_to_fetch_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(408).set_body_string("Timed out"))
        .mount(&server)
        .await;

    let err = client_for(&server, 1_000)
        .fetcher()
        .fetch(&alice())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::Timeout {
            stage: FetchStage::Posts,
            ..
        }
    ));
}

#[tokio::test]
async fn test_slow_service_is_cut_off_client_side() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(TIMELINE)
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    // 2 x 100ms render budget + client slack is well below the 10s delay
    let err = client_for(&server, 100)
        .fetcher()
        .fetch(&alice())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Timeout { .. }));
}

#[tokio::test]
async fn test_server_error_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let err = client_for(&server, 1_000)
        .fetcher()
        .fetch(&alice())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Api { status: 503, .. }));
}
