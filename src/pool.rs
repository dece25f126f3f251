//! Connection pool selection.
//!
//! A pool is whatever the binding uses to reuse connections; the controller only ever
//! sees it as an opaque [`Agent`]. For every hop the selector picks the caller's override
//! for the hop's scheme, or the binding's own pool when there is none, and records which
//! pool served the hop.
//!
//! ```text
//! hop 0  http://a/1   -> agent "http"    (binding default)
//! hop 1  https://b/2  -> agent "tenant"  (override for "https")
//! hop 2  http://a/3   -> agent "http"
//! ```

use crate::transport::ClientBinding;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// A connection pool handed to a binding when a hop is issued.
///
/// Bindings downcast the agent through [`Agent::as_any`] to their concrete pool type.
pub trait Agent: Send + Sync + fmt::Debug {
    /// Name used in logs and in [`PoolUsage`].
    fn label(&self) -> &str;

    /// Concrete pool, for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Which pool served one hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolUsage {
    /// Zero-based hop index.
    pub hop: usize,
    /// Scheme of the hop, without the colon.
    pub scheme: String,
    /// URL requested on the hop.
    pub url: String,
    /// [`Agent::label`] of the pool.
    pub agent: String,
}

/// Per-request pool selection.
#[derive(Debug, Clone, Default)]
pub(crate) struct PoolSelector {
    overrides: HashMap<String, Arc<dyn Agent>>,
}

impl PoolSelector {
    pub(crate) fn new(overrides: HashMap<String, Arc<dyn Agent>>) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(scheme, agent)| (normalize_scheme(&scheme), agent))
            .collect();
        PoolSelector { overrides }
    }

    /// Pick the pool for `url` and describe the choice.
    pub(crate) fn select(
        &self,
        hop: usize,
        url: &Url,
        binding: &dyn ClientBinding,
    ) -> (Arc<dyn Agent>, PoolUsage) {
        let agent = match self.overrides.get(url.scheme()) {
            Some(agent) => Arc::clone(agent),
            None => binding.default_agent(),
        };
        let usage = PoolUsage {
            hop,
            scheme: url.scheme().to_string(),
            url: url.to_string(),
            agent: agent.label().to_string(),
        };
        (agent, usage)
    }
}

/// Accept both `"https"` and `"https:"` as override keys.
fn normalize_scheme(scheme: &str) -> String {
    scheme.trim_end_matches(':').to_ascii_lowercase()
}
