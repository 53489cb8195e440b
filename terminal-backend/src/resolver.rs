//! Company name to ticker resolution

use reqwest::Client;
use terminal_core::{Symbol, TerminalError, TerminalResult};
use tracing::{debug, instrument, warn};

use crate::types::{TickerRequest, TickerResponse};

/// Resolves free-text company names to canonical tickers via `/getTicker`
#[derive(Debug, Clone)]
pub struct SymbolResolver {
    client: Client,
    url: String,
}

impl SymbolResolver {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Resolve a company name to its ticker.
    ///
    /// One request, no retries. Transport failures, non-success statuses and
    /// responses without a usable ticker are all reported as
    /// [`TerminalError::Resolution`].
    #[instrument(skip(self))]
    pub async fn resolve(&self, company_name: &str) -> TerminalResult<Symbol> {
        let result = self.request_ticker(company_name).await;

        match &result {
            Ok(symbol) => debug!("[Resolver] '{}' resolved to {}", company_name, symbol),
            Err(e) => warn!("[Resolver] {}", e),
        }

        result
    }

    async fn request_ticker(&self, company_name: &str) -> TerminalResult<Symbol> {
        let fail = |reason: String| TerminalError::resolution(company_name, reason);

        let response = self
            .client
            .post(&self.url)
            .json(&TickerRequest { company_name })
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(fail(format!("status {}", response.status().as_u16())));
        }

        let body: TickerResponse = response
            .json()
            .await
            .map_err(|e| fail(format!("invalid response: {}", e)))?;

        body.ticker
            .as_deref()
            .and_then(Symbol::new)
            .ok_or_else(|| fail("response carried no ticker".to_string()))
    }
}
