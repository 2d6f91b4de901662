//! HTTP API against mock sites

use crate::common::{html, orchestrator, test_config, EXAMPLE_PAGE};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use scrapeflow_engine::config::Config;
use scrapeflow_engine::server::{create_router, serve_on, AppState};
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app(config: Config) -> Router {
    create_router(AppState {
        orchestrator: orchestrator(config),
    })
}

fn post_scrape(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/scrape")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_scrape_endpoint() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(EXAMPLE_PAGE))
        .mount(&mock_server)
        .await;

    let response = app(test_config())
        .oneshot(post_scrape(serde_json::json!({ "url": base_url })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["title"], "Example");
    assert_eq!(body["headers"], serde_json::json!([{"tag": "h1", "text": "Welcome"}]));
    assert_eq!(
        body["links"],
        serde_json::json!([{"text": "About", "url": format!("{}/about", base_url)}])
    );
    assert_eq!(body["metaTags"]["description"], "An example page");
    assert_eq!(body["textContent"], "Welcome\nAbout");
    assert_eq!(body["wordCount"], 2);
    assert_eq!(body["images"], serde_json::json!([]));
    assert!(body["scrapedAt"].is_string());
}

#[tokio::test]
async fn test_options_override_defaults() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(html("x".repeat(8 * 1024)))
        .mount(&mock_server)
        .await;

    let response = app(test_config())
        .oneshot(post_scrape(serde_json::json!({
            "url": format!("{}/big", mock_server.uri()),
            "options": { "maxBytes": 1024 }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("1024"));
}

#[tokio::test]
async fn test_robots_denial_is_forbidden() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .mount(&mock_server)
        .await;

    let response = app(test_config())
        .oneshot(post_scrape(serde_json::json!({ "url": mock_server.uri() })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert!(body["error"].is_string());
    assert!(body.get("retryAfterMs").is_none());
}

#[tokio::test]
async fn test_rate_limit_is_forbidden_with_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(EXAMPLE_PAGE))
        .mount(&mock_server)
        .await;

    let mut config = test_config();
    config.policy.requests_per_minute = 1;
    let app = app(config);
    let url = mock_server.uri();

    let first = app
        .clone()
        .oneshot(post_scrape(serde_json::json!({ "url": url })))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_scrape(serde_json::json!({ "url": url })))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
    assert!(second.headers().contains_key(header::RETRY_AFTER));

    let body = json_body(second).await;
    assert!(body["retryAfterMs"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_timeout_is_gateway_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html(EXAMPLE_PAGE).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let response = app(test_config())
        .oneshot(post_scrape(serde_json::json!({
            "url": format!("{}/slow", mock_server.uri()),
            "options": { "timeoutMs": 300 }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_served_over_tcp() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(EXAMPLE_PAGE))
        .mount(&mock_server)
        .await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(serve_on(listener, orchestrator(test_config()), async move {
        let _ = stop_rx.await;
    }));

    let client = reqwest::Client::new();
    let health = client
        .get(format!("http://{}/", addr))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_str(&health).unwrap();
    assert!(health["status"].as_str().unwrap().contains("running"));

    let response = client
        .post(format!("http://{}/api/scrape", addr))
        .header("content-type", "application/json")
        .body(serde_json::json!({ "url": mock_server.uri() }).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(body["title"], "Example");

    drop(client);
    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
