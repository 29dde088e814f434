use std::sync::Arc;

use qs_tools::{ContentFetcher, FetchSettings, WebSelectTool, SEARCH_RESULTS_KEY};
use qs_core::Tool;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE: &str = "<html><head><title>标题</title><script>var x = 1;</script></head>\
    <body><h1>正文标题</h1>\n\n\n<p>第一段内容</p><p>第二段内容</p></body></html>";

#[tokio::test]
async fn test_fetch_extracts_text_with_browser_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("user-agent", "Mozilla/5.0"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE, "text/html; charset=utf-8"))
        .mount(&server)
        .await;

    let fetcher = ContentFetcher::new(&FetchSettings::default());
    let outcome = fetcher.fetch(&format!("{}/page", server.uri())).await;

    assert!(outcome.success);
    assert!(outcome.text.contains("第一段内容"));
    assert!(outcome.text.contains("第二段内容"));
    assert!(!outcome.text.contains("var x"));
    assert!(!outcome.text.contains("\n\n"));
}

#[tokio::test]
async fn test_fetch_status_error_is_failure_and_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = ContentFetcher::new(&FetchSettings::default());
    let url = format!("{}/missing", server.uri());
    assert!(!fetcher.fetch(&url).await.success);
    assert!(!fetcher.fetch(&url).await.success);
}

#[tokio::test]
async fn test_fetch_success_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE, "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ContentFetcher::new(&FetchSettings::default());
    let url = format!("{}/page", server.uri());
    let first = fetcher.fetch(&url).await;
    let second = fetcher.fetch(&url).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_select_fetches_and_truncates() {
    let server = MockServer::start().await;
    let long_body = format!("<html><body><p>{}</p></body></html>", "字".repeat(5000));
    Mock::given(method("GET"))
        .and(path("/long"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(long_body, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = Arc::new(ContentFetcher::new(&FetchSettings::default()));
    let tool = WebSelectTool::new(fetcher, 4, 2048);

    let mut params = serde_json::Map::new();
    params.insert("select_ids".into(), serde_json::json!(["0", "1", "9"]));
    params.insert(
        SEARCH_RESULTS_KEY.into(),
        serde_json::json!({
            "0": {"url": format!("{}/long", server.uri()), "title": "长页面", "snippet": "摘要"},
            "1": {"url": format!("{}/broken", server.uri()), "title": "坏页面", "snippet": "摘要"}
        }),
    );

    let out = tool.call(params).await.unwrap();
    let selected = out.as_object().unwrap();
    assert_eq!(selected.len(), 1);

    let page = &selected["0"];
    assert_eq!(page["title"], "长页面");
    assert!(page.get("snippet").is_none());
    assert_eq!(page["content"].as_str().unwrap().chars().count(), 2048);
}
