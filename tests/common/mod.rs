//! Local axum servers for end-to-end tests.

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{any, MethodRouter};
use axum::{Json, Router};
use follow_redirects::protocol::headers::header_snapshot;
use serde_json::json;
use std::net::SocketAddr;

/// Serve `app` on an ephemeral port and return its address.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Address nothing listens on.
pub fn closed_port() -> SocketAddr {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
}

/// Answer any method with a redirect.
pub fn redirects_to(status: u16, location: impl Into<String>) -> MethodRouter {
    let location = location.into();
    any(move || {
        let location = location.clone();
        async move {
            (
                StatusCode::from_u16(status).unwrap(),
                [(header::LOCATION, location)],
            )
        }
    })
}

/// Redirect whose body never finishes.
pub fn redirects_with_hanging_body(location: &'static str) -> MethodRouter {
    any(move || async move {
        (
            StatusCode::FOUND,
            [(header::LOCATION, location)],
            Body::from_stream(futures::stream::pending::<Result<Bytes, std::io::Error>>()),
        )
    })
}

/// Respond with a fixed JSON document.
pub fn sends_json(value: serde_json::Value) -> MethodRouter {
    any(move || {
        let value = value.clone();
        async move { Json(value) }
    })
}

/// Echo method, headers and body as JSON.
pub fn echo() -> MethodRouter {
    any(|method: Method, headers: HeaderMap, body: Bytes| async move {
        Json(json!({
            "method": method.as_str(),
            "headers": header_snapshot(&headers),
            "body": String::from_utf8_lossy(&body),
        }))
    })
}

/// Never respond.
pub fn hangs() -> MethodRouter {
    any(|| async {
        std::future::pending::<()>().await;
        StatusCode::OK.into_response()
    })
}

/// Install a fmt subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
