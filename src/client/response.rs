//! The response handed to the caller once a chain settles.

use crate::error::{Result, TransportError, TransportErrorKind};
use crate::transport::BodyStream;
use crate::types::RedirectRecord;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use url::Url;

/// Final response of a redirect chain.
///
/// Status, headers and body are those of the last hop, untouched. The body streams
/// straight from the underlying client; read it with [`bytes`](Self::bytes),
/// [`text`](Self::text), [`json`](Self::json), or poll the response as a [`Stream`].
pub struct RedirectResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: BodyStream,
    response_url: Url,
    redirects: Vec<RedirectRecord>,
}

impl RedirectResponse {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: BodyStream,
        response_url: Url,
        redirects: Vec<RedirectRecord>,
    ) -> Self {
        RedirectResponse {
            status,
            headers,
            body,
            response_url,
            redirects,
        }
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value as text, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// URL of the hop that produced this response.
    pub fn response_url(&self) -> &Url {
        &self.response_url
    }

    /// Every hop of the chain, the final one included. Empty unless tracking was on.
    pub fn redirects(&self) -> &[RedirectRecord] {
        &self.redirects
    }

    /// Take the body stream.
    pub fn into_body(self) -> BodyStream {
        self.body
    }

    /// Collect the body.
    pub async fn bytes(self) -> Result<Bytes> {
        let mut body = self.body;
        let mut collected = BytesMut::new();
        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk?);
        }
        Ok(collected.freeze())
    }

    /// Collect the body as text, replacing invalid UTF-8.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Collect the body and decode it as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            TransportError::new(TransportErrorKind::Body, format!("invalid JSON body: {e}")).into()
        })
    }
}

impl Stream for RedirectResponse {
    type Item = std::result::Result<Bytes, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.body.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for RedirectResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectResponse")
            .field("status", &self.status)
            .field("response_url", &self.response_url.as_str())
            .field("headers", &self.headers)
            .field("redirects", &self.redirects)
            .finish_non_exhaustive()
    }
}
