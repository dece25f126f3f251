//! Error types for redirect-following requests.
//!
//! Errors travel along two distinct paths:
//!
//! | Path | Used for | Variants |
//! |------|----------|----------|
//! | Synchronous `Result` from a facade call | programmer errors detectable at the call site | [`FollowError::InvalidChunk`], [`FollowError::WriteAfterEnd`], [`FollowError::InvalidHeader`], [`FollowError::InvalidUrl`] |
//! | [`RequestEvent::Error`](crate::RequestEvent::Error) on the event stream | runtime and network conditions | everything else |
//!
//! [`FollowError::kind`] collapses the variants into the coarse [`ErrorKind`] taxonomy and
//! [`FollowError::code`] returns a stable string code suitable for logs and metrics.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FollowError>;

/// Errors produced while driving a redirect chain.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FollowError {
    /// The chain needed more redirects than `max_redirects` allows.
    #[error("Max redirects exceeded (limit {limit}).")]
    TooManyRedirects {
        /// The limit that was in force for the request.
        limit: usize,
    },

    /// The cumulative request body grew past `max_body_length`.
    #[error("Request body larger than max_body_length limit ({limit} bytes)")]
    BodyTooLarge {
        /// The limit that was in force for the request.
        limit: usize,
    },

    /// A hop targeted a scheme with no registered client binding.
    ///
    /// Carries the scheme with its trailing colon, e.g. `"about:"`.
    #[error("Unsupported protocol {0}")]
    UnsupportedProtocol(String),

    /// The `Location` of a redirect response could not be turned into a URL.
    #[error("Redirected request failed: {0}")]
    RedirectionFailure(String),

    /// The underlying client binding failed; propagated verbatim.
    #[error(transparent)]
    Connection(#[from] TransportError),

    /// A body chunk could not be decoded with the requested encoding.
    #[error("invalid body chunk: {0}")]
    InvalidChunk(String),

    /// `write` or `end` was called after the body was already finalized.
    #[error("write after end")]
    WriteAfterEnd,

    /// A header name or value was rejected.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The request URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The caller aborted the request.
    ///
    /// Never emitted on the error channel; only returned by
    /// [`RedirectableRequest::response`](crate::RedirectableRequest::response) so the
    /// future has something to resolve to.
    #[error("request aborted")]
    Aborted,
}

/// Coarse classification of [`FollowError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Redirect count or body size limit exceeded.
    LimitExceeded,
    /// Target scheme has no binding.
    UnsupportedProtocol,
    /// Redirect location was unusable.
    RedirectionFailure,
    /// The underlying client failed.
    ConnectionFailure,
    /// Caller misuse detected synchronously.
    InvalidInput,
    /// Caller-initiated abort.
    Aborted,
}

impl FollowError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FollowError::TooManyRedirects { .. } | FollowError::BodyTooLarge { .. } => {
                ErrorKind::LimitExceeded
            }
            FollowError::UnsupportedProtocol(_) => ErrorKind::UnsupportedProtocol,
            FollowError::RedirectionFailure(_) => ErrorKind::RedirectionFailure,
            FollowError::Connection(_) => ErrorKind::ConnectionFailure,
            FollowError::InvalidChunk(_)
            | FollowError::WriteAfterEnd
            | FollowError::InvalidHeader(_)
            | FollowError::InvalidUrl(_) => ErrorKind::InvalidInput,
            FollowError::Aborted => ErrorKind::Aborted,
        }
    }

    /// Stable string code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            FollowError::TooManyRedirects { .. } => "ERR_FR_TOO_MANY_REDIRECTS",
            FollowError::BodyTooLarge { .. } => "ERR_FR_MAX_BODY_LENGTH_EXCEEDED",
            FollowError::UnsupportedProtocol(_) => "ERR_FR_UNSUPPORTED_PROTOCOL",
            FollowError::RedirectionFailure(_) => "ERR_FR_REDIRECTION_FAILURE",
            FollowError::Connection(e) => e.kind().code(),
            FollowError::InvalidChunk(_) => "ERR_INVALID_ARG_TYPE",
            FollowError::WriteAfterEnd => "ERR_STREAM_WRITE_AFTER_END",
            FollowError::InvalidHeader(_) => "ERR_INVALID_HTTP_TOKEN",
            FollowError::InvalidUrl(_) => "ERR_INVALID_URL",
            FollowError::Aborted => "ERR_FR_ABORTED",
        }
    }

    /// Whether a fresh attempt of the whole request might succeed.
    ///
    /// The controller itself never retries; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            FollowError::Connection(e) => matches!(
                e.kind(),
                TransportErrorKind::Connect | TransportErrorKind::Timeout
            ),
            _ => false,
        }
    }

    /// Whether this error is one of the synchronous invalid-input errors.
    pub fn is_invalid_input(&self) -> bool {
        self.kind() == ErrorKind::InvalidInput
    }
}

/// Failure category reported by an underlying client binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// Connection could not be established (refused, DNS, TLS handshake).
    Connect,
    /// The hop exceeded its configured timeout.
    Timeout,
    /// The request could not be built or sent.
    Request,
    /// Reading or writing a body failed.
    Body,
    /// Anything the binding could not classify.
    Other,
}

impl TransportErrorKind {
    /// Stable string code for this kind.
    pub fn code(self) -> &'static str {
        match self {
            TransportErrorKind::Connect => "ECONNREFUSED",
            TransportErrorKind::Timeout => "ETIMEDOUT",
            TransportErrorKind::Request => "ERR_FR_REQUEST",
            TransportErrorKind::Body => "ERR_FR_BODY",
            TransportErrorKind::Other => "ERR_FR_TRANSPORT",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error reported by an underlying client binding.
///
/// The message keeps the full source chain of the original error so it reaches the
/// caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    /// Create a transport error.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        TransportError {
            kind,
            message: message.into(),
        }
    }

    /// Failure category.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Full error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else if err.is_request() || err.is_builder() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };

        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        TransportError { kind, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            FollowError::TooManyRedirects { limit: 21 }.kind(),
            ErrorKind::LimitExceeded
        );
        assert_eq!(
            FollowError::BodyTooLarge { limit: 8 }.kind(),
            ErrorKind::LimitExceeded
        );
        assert_eq!(
            FollowError::UnsupportedProtocol("about:".into()).kind(),
            ErrorKind::UnsupportedProtocol
        );
        assert_eq!(FollowError::WriteAfterEnd.kind(), ErrorKind::InvalidInput);
        assert!(FollowError::InvalidChunk("x".into()).is_invalid_input());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FollowError::UnsupportedProtocol("about:".into()).to_string(),
            "Unsupported protocol about:"
        );
        assert!(FollowError::TooManyRedirects { limit: 1 }
            .to_string()
            .starts_with("Max redirects exceeded"));
        assert!(FollowError::BodyTooLarge { limit: 8 }
            .to_string()
            .starts_with("Request body larger than max_body_length limit"));
    }

    #[test]
    fn test_connection_errors_pass_through() {
        let transport = TransportError::new(TransportErrorKind::Connect, "connection refused");
        let err = FollowError::from(transport.clone());
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
        assert_eq!(err.code(), "ECONNREFUSED");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            FollowError::TooManyRedirects { limit: 0 }.code(),
            "ERR_FR_TOO_MANY_REDIRECTS"
        );
        assert_eq!(
            FollowError::BodyTooLarge { limit: 0 }.code(),
            "ERR_FR_MAX_BODY_LENGTH_EXCEEDED"
        );
        assert_eq!(FollowError::WriteAfterEnd.code(), "ERR_STREAM_WRITE_AFTER_END");
        assert!(!FollowError::Aborted.is_retryable());
    }
}
