//! Connection settings for the JSON-RPC provider.

use std::fmt;
use tally_core::{TallyError, TallyResult};
use url::Url;

/// GetBlock shared-node gateway; the API key is appended as a path segment.
pub const DEFAULT_ENDPOINT: &str = "https://go.getblock.io/";

/// Where to reach the node.
///
/// Either a full `rpc_url`, or a gateway `endpoint` plus `api_key`.
/// An explicit `rpc_url` wins.
#[derive(Clone)]
pub struct ProviderConfig {
    pub rpc_url: Option<String>,
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
        }
    }
}

impl ProviderConfig {
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Some(rpc_url.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Resolves the final node URL, failing fast on missing or malformed
    /// settings.
    pub fn resolve_url(&self) -> TallyResult<Url> {
        if let Some(raw) = non_blank(self.rpc_url.as_deref()) {
            return parse_http_url(raw);
        }

        let key = non_blank(self.api_key.as_deref()).ok_or_else(|| {
            TallyError::Configuration("either an RPC URL or an API key must be set".into())
        })?;

        let mut base = parse_http_url(&self.endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        base.join(key)
            .map_err(|e| TallyError::Configuration(format!("invalid API key segment: {e}")))
    }
}

// The API key is a credential; keep it out of logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("rpc_url", &self.rpc_url.as_ref().map(|_| "<set>"))
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_http_url(raw: &str) -> TallyResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| TallyError::Configuration(format!("invalid URL {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TallyError::Configuration(format!(
            "unsupported URL scheme {other:?}, expected http or https"
        ))),
    }
}
