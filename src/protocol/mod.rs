//! HTTP protocol helpers shared by the redirect policy and the bindings.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`headers`] | Entity, credential and host header rules applied across hops |
//!
//! The redirect statuses themselves are listed in [`REDIRECT_STATUSES`].

pub mod headers;

use http::StatusCode;

/// Status codes that may trigger a redirect when accompanied by a `Location`.
pub const REDIRECT_STATUSES: [StatusCode; 6] = [
    StatusCode::MULTIPLE_CHOICES,
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// Whether `status` is one of [`REDIRECT_STATUSES`].
pub fn is_redirect_status(status: StatusCode) -> bool {
    REDIRECT_STATUSES.contains(&status)
}

/// Whether a redirect with `status` must replay the method and body verbatim.
pub fn preserves_method(status: StatusCode) -> bool {
    status == StatusCode::TEMPORARY_REDIRECT || status == StatusCode::PERMANENT_REDIRECT
}
