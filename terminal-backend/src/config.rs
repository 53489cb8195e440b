//! Backend endpoint configuration

use std::env;
use std::time::Duration;

use terminal_core::{TerminalError, TerminalResult};
use url::Url;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where the prediction backend lives
///
/// This is the only place REST and push endpoint bases come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base for REST calls, e.g. `http://127.0.0.1:8000`
    pub api_base_url: Url,
    /// Base for push connections, e.g. `ws://127.0.0.1:8000`
    pub ws_base_url: Url,
    /// Deadline applied to every REST request
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            ws_base_url: Url::parse(DEFAULT_WS_URL).expect("default WS URL is valid"),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl BackendConfig {
    /// Build a config from explicit base URLs
    pub fn new(api_base_url: &str, ws_base_url: &str) -> TerminalResult<Self> {
        Ok(Self {
            api_base_url: parse_base(api_base_url, "api", &["http", "https"])?,
            ws_base_url: parse_base(ws_base_url, "ws", &["ws", "wss"])?,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Load configuration from environment variables
    ///
    /// Reads:
    /// - TERMINAL_API_URL: REST base (default `http://127.0.0.1:8000`)
    /// - TERMINAL_WS_URL: push base (default `ws://127.0.0.1:8000`)
    /// - TERMINAL_REQUEST_TIMEOUT_SECS: REST deadline in seconds (default 30)
    pub fn from_env() -> TerminalResult<Self> {
        let api = env::var("TERMINAL_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let ws = env::var("TERMINAL_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string());

        let timeout_secs = match env::var("TERMINAL_REQUEST_TIMEOUT_SECS") {
            Ok(raw) => parse_timeout_secs(&raw)?,
            Err(_) => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Self::new(&api, &ws)?.with_request_timeout(Duration::from_secs(timeout_secs)))
    }

    /// Absolute URL for a REST path such as `getlivedata`
    pub fn api_url(&self, path: &str) -> String {
        join(&self.api_base_url, path)
    }
}

fn parse_base(raw: &str, name: &str, schemes: &[&str]) -> TerminalResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| TerminalError::config(format!("Invalid {} URL '{}': {}", name, raw, e)))?;

    if !schemes.contains(&url.scheme()) {
        return Err(TerminalError::config(format!(
            "Unsupported {} URL scheme '{}' (expected one of {:?})",
            name,
            url.scheme(),
            schemes
        )));
    }

    Ok(url)
}

fn parse_timeout_secs(raw: &str) -> TerminalResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(TerminalError::config(format!(
            "TERMINAL_REQUEST_TIMEOUT_SECS must be a positive integer, got '{}'",
            raw
        ))),
        Ok(secs) => Ok(secs),
    }
}

fn join(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
