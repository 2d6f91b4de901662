//! Fetch, parse and extract against mock sites

use crate::common::{html, orchestrator, redirect, request, request_with, test_config, EXAMPLE_PAGE};
use scrapeflow_engine::scrape::{Header, Link};
use scrapeflow_engine::{ErrorKind, Stage};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_example_page_end_to_end() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(EXAMPLE_PAGE))
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let result = orchestrator
        .scrape(request(&orchestrator, base_url.clone()))
        .await
        .expect("scrape should succeed");

    assert_eq!(result.title, "Example");
    assert_eq!(
        result.headers,
        vec![Header {
            tag: "h1".to_string(),
            text: "Welcome".to_string()
        }]
    );
    assert_eq!(
        result.links,
        vec![Link {
            text: "About".to_string(),
            url: format!("{}/about", base_url)
        }]
    );
    assert_eq!(result.meta_tags["description"], "An example page");
    assert_eq!(result.text_content, "Welcome\nAbout");
    assert_eq!(result.word_count, 2);
    assert!(!result.rendered);
    assert!(result.scraped_at.is_some());
}

#[tokio::test]
async fn test_repeated_scrapes_are_identical() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html(
            r#"<title>Same</title><meta property="og:type" content="article">
               <h2>Section</h2><a href="x">X</a><img src="/i.png" alt="I">"#,
        ))
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let url = format!("{}/page", mock_server.uri());
    let first = orchestrator.scrape(request(&orchestrator, url.clone())).await.unwrap();
    let second = orchestrator.scrape(request(&orchestrator, url)).await.unwrap();

    assert_eq!(first.meta_tags, second.meta_tags);
    assert_eq!(first.headers, second.headers);
    assert_eq!(first.links, second.links);
    assert_eq!(first.images, second.images);
}

#[tokio::test]
async fn test_links_resolve_against_final_url() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(redirect("/docs/guide/index.html"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/docs/guide/index.html"))
        .respond_with(html(r#"<a href="../api">API</a><img src="logo.png">"#))
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let result = orchestrator
        .scrape(request(&orchestrator, format!("{}/old", base_url)))
        .await
        .unwrap();

    assert_eq!(result.url, format!("{}/docs/guide/index.html", base_url));
    assert_eq!(result.links[0].url, format!("{}/docs/api", base_url));
    assert_eq!(result.images[0].src, format!("{}/docs/guide/logo.png", base_url));
}

async fn mount_redirect_chain(mock_server: &MockServer, hops: usize) {
    for hop in 0..hops {
        Mock::given(method("GET"))
            .and(path(format!("/r{}", hop)))
            .respond_with(redirect(&format!("/r{}", hop + 1)))
            .mount(mock_server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path(format!("/r{}", hops)))
        .respond_with(html("<title>Landed</title>"))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_six_redirects_fail() {
    let mock_server = MockServer::start().await;
    mount_redirect_chain(&mock_server, 6).await;

    let orchestrator = orchestrator(test_config());
    let error = orchestrator
        .scrape(request(&orchestrator, format!("{}/r0", mock_server.uri())))
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::TooManyRedirects);
    assert_eq!(error.stage, Stage::Fetching);
    assert_eq!(error.status_code(), 502);
    assert!(error.message.contains("/r5"), "{}", error.message);
}

#[tokio::test]
async fn test_five_redirects_succeed() {
    let mock_server = MockServer::start().await;
    mount_redirect_chain(&mock_server, 5).await;

    let orchestrator = orchestrator(test_config());
    let result = orchestrator
        .scrape(request(&orchestrator, format!("{}/r0", mock_server.uri())))
        .await
        .unwrap();

    assert_eq!(result.title, "Landed");
    assert_eq!(result.url, format!("{}/r5", mock_server.uri()));
}

#[tokio::test]
async fn test_redirect_loop_terminates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(redirect("/loop"))
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let error = orchestrator
        .scrape(request(&orchestrator, format!("{}/loop", mock_server.uri())))
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::TooManyRedirects);
}

#[tokio::test]
async fn test_oversized_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(html(format!("<p>{}</p>", "x".repeat(64 * 1024))))
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let mut options = orchestrator.default_options();
    options.max_bytes = 4 * 1024;

    let error = orchestrator
        .scrape(request_with(format!("{}/big", mock_server.uri()), options))
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::ResponseTooLarge);
    assert_eq!(error.status_code(), 502);
}

/// Serves a chunked HTML body without `Content-Length` that never ends
async fn endless_chunked_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                if socket.read(&mut request).await.is_err() {
                    return;
                }

                let head = "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ntransfer-encoding: chunked\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }

                let chunk = format!("{:x}\r\n{}\r\n", 1024, "x".repeat(1024));
                // Stops once the client hangs up
                while socket.write_all(chunk.as_bytes()).await.is_ok() {}
            });
        }
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_streamed_body_over_cap() {
    let base_url = endless_chunked_server().await;

    let mut config = test_config();
    config.policy.respect_robots = false;
    let orchestrator = orchestrator(config);
    let mut options = orchestrator.default_options();
    options.max_bytes = 8 * 1024;

    let started = std::time::Instant::now();
    let error = orchestrator
        .scrape(request_with(format!("{}/stream", base_url), options))
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::ResponseTooLarge);
    assert_eq!(error.stage, Stage::Fetching);
    assert_eq!(error.status_code(), 502);
    assert!(error.message.contains("8192"), "{}", error.message);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_retry_on_service_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html("<title>Recovered</title>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let result = orchestrator
        .scrape(request(&orchestrator, format!("{}/flaky", mock_server.uri())))
        .await
        .unwrap();

    assert_eq!(result.title, "Recovered");
}

#[tokio::test]
async fn test_retries_exhausted() {
    let mock_server = MockServer::start().await;

    // One attempt plus two retries
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let error = orchestrator
        .scrape(request(&orchestrator, format!("{}/down", mock_server.uri())))
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::FetchNetworkError);
    assert_eq!(error.status_code(), 502);
}

#[tokio::test]
async fn test_not_found_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let error = orchestrator
        .scrape(request(&orchestrator, format!("{}/missing", mock_server.uri())))
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::FetchNetworkError);
    assert!(error.message.contains("404"), "{}", error.message);
}

#[tokio::test]
async fn test_slow_page_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<title>Late</title>").set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let mut options = orchestrator.default_options();
    options.timeout_ms = 300;

    let started = std::time::Instant::now();
    let error = orchestrator
        .scrape(request_with(format!("{}/slow", mock_server.uri()), options))
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::FetchTimeout);
    assert_eq!(error.stage, Stage::Fetching);
    assert_eq!(error.status_code(), 504);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_unreachable_host() {
    // Nothing listens on the port once the server is dropped
    let uri = {
        let mock_server = MockServer::start().await;
        mock_server.uri()
    };

    let mut config = test_config();
    config.fetcher.max_retries = 0;
    let orchestrator = orchestrator(config);
    let error = orchestrator
        .scrape(request(&orchestrator, format!("{}/", uri)))
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::FetchNetworkError);
    assert_eq!(error.stage, Stage::Fetching);
}

#[tokio::test]
async fn test_declared_charset_decoded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/latin1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            b"<title>Caf\xe9</title><p>cr\xe8me br\xfbl\xe9e</p>".to_vec(),
            "text/html; charset=windows-1252",
        ))
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let result = orchestrator
        .scrape(request(&orchestrator, format!("{}/latin1", mock_server.uri())))
        .await
        .unwrap();

    assert_eq!(result.title, "Café");
    assert_eq!(result.text_content, "crème brûlée");
}

#[tokio::test]
async fn test_binary_response_is_parse_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/image"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G', 0, 0], "image/png"))
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let error = orchestrator
        .scrape(request(&orchestrator, format!("{}/image", mock_server.uri())))
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::ParseError);
    assert_eq!(error.stage, Stage::Parsing);
    assert_eq!(error.status_code(), 500);
}

#[tokio::test]
async fn test_concurrent_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html(EXAMPLE_PAGE).set_delay(Duration::from_millis(200)))
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(test_config());
    let url = format!("{}/page", mock_server.uri());

    let started = std::time::Instant::now();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            let request = request(&orchestrator, url.clone());
            tokio::spawn(async move { orchestrator.scrape(request).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.title, "Example");
    }

    // Eight 200ms pages in parallel, not in sequence
    assert!(started.elapsed() < Duration::from_millis(1500));
}
