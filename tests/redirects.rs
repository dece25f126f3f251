//! End-to-end redirect tests over the reqwest binding against local axum servers.

mod common;

use axum::extract::Path;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use common::{closed_port, echo, hangs, init_tracing, redirects_to, redirects_with_hanging_body, sends_json, serve};
use follow_redirects::transport::ReqwestAgent;
use follow_redirects::{
    ClientConfig, ErrorKind, FollowClient, FollowError, RequestEvent, RequestOptions,
};
use futures::StreamExt;
use http::{HeaderValue, Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn url(addr: std::net::SocketAddr, path: &str) -> RequestOptions {
    RequestOptions::parse(&format!("http://{addr}{path}")).unwrap()
}

#[tokio::test]
async fn test_get_follows_redirect_chain() {
    init_tracing();
    let app = Router::new()
        .route("/a", redirects_to(302, "/b"))
        .route("/b", redirects_to(301, "/c"))
        .route("/c", redirects_to(302, "/d"))
        .route("/d", redirects_to(307, "/e"))
        .route("/e", redirects_to(308, "/f"))
        .route("/f", sends_json(json!({"a": "b"})));
    let addr = serve(app).await;

    let client = FollowClient::new();
    let mut request = client.get(url(addr, "/a")).unwrap();
    let response = request.response().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.response_url().as_str(), format!("http://{addr}/f"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"a": "b"}));
}

#[tokio::test]
async fn test_get_without_redirect() {
    let addr = serve(Router::new().route("/a", sends_json(json!({"a": "b"})))).await;
    let mut request = FollowClient::new().get(url(addr, "/a?xyz")).unwrap();
    let response = request.response().await.unwrap();
    assert_eq!(response.response_url().as_str(), format!("http://{addr}/a?xyz"));
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"a": "b"}));
}

#[tokio::test]
async fn test_redirect_status_without_location() {
    let app = Router::new().route("/a", any(|| async { StatusCode::TEMPORARY_REDIRECT }));
    let addr = serve(app).await;
    let mut request = FollowClient::new().get(url(addr, "/a")).unwrap();
    let response = request.response().await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.response_url().as_str(), format!("http://{addr}/a"));
}

#[tokio::test]
async fn test_connection_errors_surface() {
    let closed = closed_port();
    let addr = serve(Router::new().route("/a", redirects_to(302, format!("http://{closed}/b")))).await;
    let mut request = FollowClient::new().get(url(addr, "/a")).unwrap();
    let err = request.response().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
    assert_eq!(err.code(), "ECONNREFUSED");
}

#[tokio::test]
async fn test_socket_events() {
    let addr = serve(Router::new().route("/a", sends_json(json!({})))).await;
    let mut request = FollowClient::new().get(url(addr, "/a")).unwrap();
    match request.next_event().await {
        Some(RequestEvent::Socket(socket)) => assert_eq!(socket.remote_addr, Some(addr)),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(request.socket().and_then(|s| s.remote_addr), Some(addr));
    assert_eq!(request.connection(), request.socket());
}

#[tokio::test]
async fn test_hanging_redirect_bodies_are_dropped() {
    let app = Router::new()
        .route("/a", redirects_with_hanging_body("/b"))
        .route("/b", redirects_with_hanging_body("/c"))
        .route("/c", sends_json(json!({"done": true})));
    let addr = serve(app).await;

    let mut request = FollowClient::new().get(url(addr, "/a")).unwrap();
    let response = tokio::time::timeout(Duration::from_secs(10), request.response())
        .await
        .expect("chain does not wait for redirect bodies")
        .unwrap();
    assert_eq!(response.response_url().as_str(), format!("http://{addr}/c"));
}

#[tokio::test]
async fn test_query_params_survive() {
    let app = Router::new()
        .route("/a", redirects_to(302, "/b?greeting=hello"))
        .route("/b", echo());
    let addr = serve(app).await;
    let mut request = FollowClient::new().get(url(addr, "/a")).unwrap();
    let response = request.response().await.unwrap();
    assert_eq!(
        response.response_url().as_str(),
        format!("http://{addr}/b?greeting=hello")
    );
}

#[tokio::test]
async fn test_abort_in_flight() {
    let addr = serve(Router::new().route("/a", hangs())).await;
    let mut request = FollowClient::new().get(url(addr, "/a")).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(request.aborted().is_none());
    request.abort();
    assert!(request.aborted().is_some());

    assert!(matches!(request.next_event().await, Some(RequestEvent::Abort)));
    assert!(request.next_event().await.is_none());
}

#[tokio::test]
async fn test_post_body_across_307() {
    let app = Router::new()
        .route("/a", redirects_to(307, "/b"))
        .route("/b", redirects_to(307, "/c"))
        .route("/c", echo());
    let addr = serve(app).await;

    let mut request = FollowClient::new().request(
        url(addr, "/a")
            .with_method(Method::POST)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain")),
    );
    request.write("hello ").unwrap().await;
    request.write_encoded("d29ybGQ=", "base64").unwrap().await;
    request.end().unwrap().await;

    let body: Value = request.response().await.unwrap().json().await.unwrap();
    assert_eq!(body["method"], "POST");
    assert_eq!(body["body"], "hello world");
    assert_eq!(body["headers"]["content-type"], "text/plain");
}

#[tokio::test]
async fn test_streamed_body_across_307() {
    let app = Router::new()
        .route("/a", redirects_to(307, "/b"))
        .route("/b", echo());
    let addr = serve(app).await;

    let client = FollowClient::with_config(ClientConfig {
        body_stream_threshold: 16,
        ..Default::default()
    });
    let mut request = client.request(url(addr, "/a").with_method(Method::PUT));
    let payload = "x".repeat(10_000);
    for chunk in payload.as_bytes().chunks(1024) {
        request.write(chunk).unwrap().await;
    }
    request.end().unwrap().await;

    let body: Value = request.response().await.unwrap().json().await.unwrap();
    assert_eq!(body["method"], "PUT");
    assert_eq!(body["body"].as_str().unwrap().len(), payload.len());
}

#[tokio::test]
async fn test_post_302_becomes_get() {
    let app = Router::new()
        .route("/a", redirects_to(302, "/b"))
        .route("/b", echo());
    let addr = serve(app).await;

    let mut request = FollowClient::new().request(
        url(addr, "/a")
            .with_method(Method::POST)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/javascript")),
    );
    request.end_with("a=b").unwrap().await;

    let body: Value = request.response().await.unwrap().json().await.unwrap();
    assert_eq!(body["method"], "GET");
    assert_eq!(body["body"], "");
    assert!(body["headers"].get("content-type").is_none());
    assert!(body["headers"].get("content-length").is_none());
}

#[tokio::test]
async fn test_custom_host_replaced_on_redirect() {
    let addr = serve(Router::new().route("/b", echo())).await;
    let app = Router::new().route("/a", redirects_to(302, format!("http://{addr}/b")));
    let first = serve(app).await;

    let mut request = FollowClient::new()
        .get(url(first, "/a").with_header(header::HOST, HeaderValue::from_static("otherhost.com")))
        .unwrap();
    let response = request.response().await.unwrap();
    assert_eq!(response.response_url().as_str(), format!("http://{addr}/b"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["headers"]["host"], addr.to_string());
}

#[tokio::test]
async fn test_track_redirects() {
    let app = Router::new()
        .route("/a", redirects_to(302, "/b"))
        .route("/b", redirects_to(302, "/c"))
        .route("/c", sends_json(json!({"a": "b"})));
    let addr = serve(app).await;

    let mut request = FollowClient::new()
        .get(url(addr, "/a").with_track_redirects(true))
        .unwrap();
    let response = request.response().await.unwrap();
    let redirects = response.redirects();

    assert_eq!(redirects.len(), 3);
    assert_eq!(redirects[0].url, format!("http://{addr}/a"));
    assert_eq!(redirects[0].status_code, 302);
    assert_eq!(redirects[0].header("location"), Some("/b"));
    assert_eq!(redirects[1].url, format!("http://{addr}/b"));
    assert_eq!(redirects[2].url, format!("http://{addr}/c"));
    assert_eq!(redirects[2].status_code, 200);
    assert_eq!(redirects[2].header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn test_redirects_not_tracked_by_default() {
    let app = Router::new()
        .route("/a", redirects_to(302, "/b"))
        .route("/b", sends_json(json!({})));
    let addr = serve(app).await;
    let mut request = FollowClient::new().get(url(addr, "/a")).unwrap();
    assert!(request.response().await.unwrap().redirects().is_empty());
}

#[tokio::test]
async fn test_follow_redirects_disabled() {
    let app = Router::new()
        .route("/a", redirects_to(302, "/b"))
        .route("/b", sends_json(json!({"a": "b"})));
    let addr = serve(app).await;
    let mut request = FollowClient::new()
        .get(url(addr, "/a").with_follow_redirects(false))
        .unwrap();
    let response = request.response().await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.response_url().as_str(), format!("http://{addr}/a"));
}

async fn countdown(Path(n): Path<u32>) -> impl IntoResponse {
    if n == 0 {
        "done".into_response()
    } else {
        (StatusCode::FOUND, [(header::LOCATION, format!("/r/{}", n - 1))], "").into_response()
    }
}

#[tokio::test]
async fn test_max_redirects() {
    let addr = serve(Router::new().route("/r/{n}", any(countdown))).await;
    let client = FollowClient::new();

    let mut request = client.get(url(addr, "/r/21")).unwrap();
    let response = request.response().await.unwrap();
    assert_eq!(response.response_url().as_str(), format!("http://{addr}/r/0"));

    let mut request = client.get(url(addr, "/r/22")).unwrap();
    let err = request.response().await.unwrap_err();
    assert!(matches!(err, FollowError::TooManyRedirects { limit: 21 }));
    assert!(err.to_string().starts_with("Max redirects exceeded"));

    let mut request = client.get(url(addr, "/r/2").with_max_redirects(1)).unwrap();
    assert_eq!(
        request.response().await.unwrap_err().code(),
        "ERR_FR_TOO_MANY_REDIRECTS"
    );
}

#[tokio::test]
async fn test_max_body_length_per_request() {
    let addr = serve(Router::new().route("/a", echo())).await;
    let mut request = FollowClient::new().request(
        url(addr, "/a")
            .with_method(Method::POST)
            .with_max_body_length(8),
    );
    request.write("12345").unwrap().await;
    request.write("67890").unwrap().await;

    let err = request.response().await.unwrap_err();
    assert!(matches!(err, FollowError::BodyTooLarge { limit: 8 }));
    assert!(request.aborted().is_none());
}

#[tokio::test]
async fn test_unsupported_protocol_redirect() {
    let addr = serve(Router::new().route("/a", redirects_to(302, "about:blank"))).await;
    let mut request = FollowClient::new().get(url(addr, "/a")).unwrap();
    let err = request.response().await.unwrap_err();
    assert_eq!(err.to_string(), "Unsupported protocol about:");
}

#[tokio::test]
async fn test_set_timeout() {
    let addr = serve(Router::new().route("/a", hangs())).await;
    let mut request = FollowClient::new().request(url(addr, "/a"));
    request.set_timeout(Duration::from_millis(100));
    request.end().unwrap().await;

    let err = tokio::time::timeout(Duration::from_secs(10), request.response())
        .await
        .expect("timeout fires")
        .unwrap_err();
    assert_eq!(err.code(), "ETIMEDOUT");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_header_mutation_before_send() {
    let app = Router::new()
        .route("/a", redirects_to(302, "/b"))
        .route("/b", echo());
    let addr = serve(app).await;

    let mut request = FollowClient::new().request(
        url(addr, "/a").with_header("x-drop", HeaderValue::from_static("1")),
    );
    request.set_header("x-custom", "value").unwrap();
    request.remove_header("x-drop");
    assert_eq!(request.get_header("x-custom").unwrap(), "value");
    request.end().unwrap().await;

    let body: Value = request.response().await.unwrap().json().await.unwrap();
    assert_eq!(body["headers"]["x-custom"], "value");
    assert!(body["headers"].get("x-drop").is_none());
}

#[tokio::test]
async fn test_socket_controls_are_accepted() {
    let app = Router::new()
        .route("/a", redirects_to(302, "/b"))
        .route("/b", sends_json(json!({})));
    let addr = serve(app).await;

    let mut request = FollowClient::new().request(url(addr, "/a"));
    request.set_no_delay(true);
    request.set_socket_keep_alive(true, Some(Duration::from_secs(5)));
    request.flush_headers();
    request.end().unwrap().await;
    assert_eq!(request.response().await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_agent_override_per_scheme() {
    let app = Router::new()
        .route("/a", redirects_to(302, "/b"))
        .route("/b", sends_json(json!({})));
    let addr = serve(app).await;

    let agent = Arc::new(ReqwestAgent::from_config("tenant", &ClientConfig::default()));
    let mut request = FollowClient::new()
        .get(url(addr, "/a").with_agent("http", agent))
        .unwrap();
    request.response().await.unwrap();

    let agents: Vec<_> = request.pool_usage().into_iter().map(|usage| usage.agent).collect();
    assert_eq!(agents, ["tenant", "tenant"]);
}

#[tokio::test]
async fn test_streaming_response_body() {
    let addr = serve(Router::new().route("/a", sends_json(json!({"k": "v"})))).await;
    let mut request = FollowClient::new().get(url(addr, "/a")).unwrap();
    let mut response = request.response().await.unwrap();
    let mut collected = Vec::new();
    while let Some(chunk) = response.next().await {
        collected.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(serde_json::from_slice::<Value>(&collected).unwrap(), json!({"k": "v"}));
}
