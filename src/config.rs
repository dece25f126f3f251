//! Process-wide redirect defaults.
//!
//! `max_redirects` and `max_body_length` have process-wide defaults that individual
//! requests may override. The defaults live behind a lock and can only be changed
//! through the setters below. A request reads them exactly once, when
//! [`FollowClient::request`](crate::FollowClient::request) resolves its options, so
//! changing a default never affects a chain that is already running.
//!
//! | Setting | Initial value |
//! |---------|---------------|
//! | `max_redirects` | 21 |
//! | `max_body_length` | 10 MiB |
//!
//! # Examples
//!
//! ```
//! use follow_redirects::config::{self, RedirectDefaults};
//!
//! let defaults = RedirectDefaults::default();
//! assert_eq!(defaults.max_redirects, 21);
//! assert_eq!(defaults.max_body_length, 10 * 1024 * 1024);
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Default redirect limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 21;

/// Default request body ceiling in bytes.
pub const DEFAULT_MAX_BODY_LENGTH: usize = 10 * 1024 * 1024;

/// Process-wide limits applied to requests that do not override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedirectDefaults {
    /// Maximum number of redirects followed per request.
    pub max_redirects: usize,
    /// Maximum cumulative request body size in bytes.
    pub max_body_length: usize,
}

impl RedirectDefaults {
    const INITIAL: RedirectDefaults = RedirectDefaults {
        max_redirects: DEFAULT_MAX_REDIRECTS,
        max_body_length: DEFAULT_MAX_BODY_LENGTH,
    };
}

impl Default for RedirectDefaults {
    fn default() -> Self {
        Self::INITIAL
    }
}

static DEFAULTS: RwLock<RedirectDefaults> = parking_lot::const_rwlock(RedirectDefaults::INITIAL);

/// Snapshot of the current process-wide defaults.
pub fn defaults() -> RedirectDefaults {
    *DEFAULTS.read()
}

/// Replace the process-wide defaults, returning the previous ones.
pub fn set_defaults(defaults: RedirectDefaults) -> RedirectDefaults {
    update(|current| *current = defaults)
}

/// Set the process-wide redirect limit, returning the previous one.
pub fn set_max_redirects(max_redirects: usize) -> usize {
    update(|current| current.max_redirects = max_redirects).max_redirects
}

/// Set the process-wide body ceiling, returning the previous one.
pub fn set_max_body_length(max_body_length: usize) -> usize {
    update(|current| current.max_body_length = max_body_length).max_body_length
}

/// Read-modify-write under one write lock.
fn update(change: impl FnOnce(&mut RedirectDefaults)) -> RedirectDefaults {
    let mut guard = DEFAULTS.write();
    let previous = *guard;
    change(&mut guard);
    tracing::debug!(
        max_redirects = guard.max_redirects,
        max_body_length = guard.max_body_length,
        "redirect defaults updated"
    );
    previous
}
