//! Session client configuration parsed from environment variables.

use crate::error::SessionError;

pub const DEFAULT_API_URL: &str = "https://under-gestion-api.onrender.com/api";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// What to do when a caller already set `Authorization` on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthHeaderPolicy {
    /// The stored access token always wins.
    #[default]
    Overwrite,
    /// A caller-supplied header is kept; the stored token only fills a gap.
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_ms: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_ms: DEFAULT_REQUEST_TIMEOUT_MS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// API root every relative request path is joined onto. No trailing slash.
    pub base_url: String,
    pub login_path: String,
    pub auth_header_policy: AuthHeaderPolicy,
    pub timeouts: Timeouts,
}

impl SessionConfig {
    /// Config pointing at `base_url` with every other setting at its default.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            auth_header_policy: AuthHeaderPolicy::default(),
            timeouts: Timeouts::default(),
        }
    }

    /// Build typed session config from environment variables.
    ///
    /// Optional:
    /// - `ALMACEN_API_URL`: API root, default the hosted backend
    /// - `ALMACEN_LOGIN_PATH`: redirect target on session death, default `/login`
    /// - `ALMACEN_AUTH_HEADER_POLICY`: `overwrite` (default) or `preserve`
    /// - `ALMACEN_REQUEST_TIMEOUT_MS`: default 15000
    /// - `ALMACEN_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] for an unknown header policy or an
    /// empty API URL.
    pub fn from_env() -> Result<Self, SessionError> {
        let base_url = std::env::var("ALMACEN_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let base_url = normalize_base_url(&base_url);
        if base_url.is_empty() {
            return Err(SessionError::Config("ALMACEN_API_URL is empty".into()));
        }

        let login_path = std::env::var("ALMACEN_LOGIN_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string());
        let auth_header_policy = parse_auth_header_policy(std::env::var("ALMACEN_AUTH_HEADER_POLICY").ok().as_deref())?;
        let timeouts = Timeouts {
            request_ms: env_parse_u64("ALMACEN_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS),
            connect_secs: env_parse_u64("ALMACEN_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { base_url, login_path, auth_header_policy, timeouts })
    }

    /// Join a request path onto the base URL. Absolute URLs pass through.
    #[must_use]
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn parse_auth_header_policy(raw: Option<&str>) -> Result<AuthHeaderPolicy, SessionError> {
    match raw.map(str::trim).unwrap_or("overwrite") {
        "overwrite" => Ok(AuthHeaderPolicy::Overwrite),
        "preserve" => Ok(AuthHeaderPolicy::Preserve),
        other => Err(SessionError::Config(format!(
            "unknown ALMACEN_AUTH_HEADER_POLICY '{other}' (expected 'overwrite' or 'preserve')"
        ))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
