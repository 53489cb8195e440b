//! Market data API client
//!
//! Every symbol-scoped operation first resolves its input through
//! [`SymbolResolver`] and only then issues the domain request with the
//! resolved ticker. Errors never escape: they are folded into the
//! `success: false` result shapes callers branch on.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use terminal_core::{
    PredictionResult, SeriesResult, StocksResult, Symbol, TerminalError, TerminalResult,
    TrainingResult,
};
use tracing::{debug, error, info, instrument};

use crate::config::BackendConfig;
use crate::resolver::SymbolResolver;
use crate::types::{
    to_price_points, LiveDataResponse, PredictionResponse, SeriesRequest, StocksResponse,
    TrainingRequest,
};

const TICKER_PATH: &str = "getTicker";
const LIVE_DATA_PATH: &str = "getlivedata";
const PREDICTION_PATH: &str = "predictionOnTechnical";
const TRAINING_PATH: &str = "trainingOnTechnical";
const STOCKS_PATH: &str = "getstocks";

/// Client for the prediction backend REST API
#[derive(Clone)]
pub struct MarketDataClient {
    client: Client,
    config: BackendConfig,
    resolver: SymbolResolver,
}

impl MarketDataClient {
    /// Create a client for the given backend
    pub fn new(config: BackendConfig) -> TerminalResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TerminalError::config(format!("Failed to create HTTP client: {}", e)))?;

        let resolver = SymbolResolver::new(client.clone(), config.api_url(TICKER_PATH));

        Ok(Self {
            client,
            config,
            resolver,
        })
    }

    /// Create a client configured from the environment
    pub fn from_env() -> TerminalResult<Self> {
        Self::new(BackendConfig::from_env()?)
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn resolver(&self) -> &SymbolResolver {
        &self.resolver
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Fetch the price series for a company name or symbol
    #[instrument(skip(self))]
    pub async fn get_live_data(&self, symbol_or_name: &str, timeframe: &str) -> SeriesResult {
        match self.fetch_live_data(symbol_or_name, timeframe).await {
            Ok(result) => result,
            Err(e) => {
                error!("[Backend] Live data for '{}' failed: {}", symbol_or_name, e);
                SeriesResult::from_error(&e)
            }
        }
    }

    /// Fetch the price series together with the model's forecast
    #[instrument(skip(self))]
    pub async fn get_prediction(&self, symbol_or_name: &str, timeframe: &str) -> PredictionResult {
        match self.fetch_prediction(symbol_or_name, timeframe).await {
            Ok(result) => result,
            Err(e) => {
                error!("[Backend] Prediction for '{}' failed: {}", symbol_or_name, e);
                PredictionResult::from_error(&e)
            }
        }
    }

    /// Ask the backend to (re)train its model for a company
    ///
    /// Success is decided by the HTTP status alone.
    #[instrument(skip(self))]
    pub async fn trigger_training(&self, symbol_or_name: &str) -> TrainingResult {
        let outcome = async {
            let ticker = self.resolver.resolve(symbol_or_name).await?;
            let body = TrainingRequest {
                ticker: ticker.as_str(),
            };
            self.post(TRAINING_PATH, &body).await?;
            info!("[Backend] Training finished for {}", ticker);
            Ok::<_, TerminalError>(())
        }
        .await;

        match outcome {
            Ok(()) => TrainingResult::done(),
            Err(e) => {
                error!("[Backend] Training for '{}' failed: {}", symbol_or_name, e);
                TrainingResult::from_error(&e)
            }
        }
    }

    /// List the stocks the backend knows about
    #[instrument(skip(self))]
    pub async fn get_stocks(&self) -> StocksResult {
        let url = self.config.api_url(STOCKS_PATH);
        debug!("[Backend] GET {}", url);

        let outcome = async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(network_error)?;
            let body: StocksResponse = decode(check_status(response)?).await?;
            Ok::<_, TerminalError>(body)
        }
        .await;

        match outcome {
            Ok(body) => StocksResult {
                success: body.success,
                stocks: body.stocks,
            },
            Err(e) => {
                error!("[Backend] Listing stocks failed: {}", e);
                StocksResult::failure()
            }
        }
    }

    // ========================================================================
    // Resolve-then-fetch
    // ========================================================================

    async fn fetch_live_data(&self, input: &str, timeframe: &str) -> TerminalResult<SeriesResult> {
        let ticker = self.resolver.resolve(input).await?;
        // A `null` body is treated like a body without `liveData`
        let response: Option<LiveDataResponse> = self
            .post_json(LIVE_DATA_PATH, &series_request(&ticker, timeframe))
            .await?;

        let (live_data, company) = match response {
            Some(LiveDataResponse {
                live_data: Some(points),
                company,
            }) if !points.is_empty() => (points, company),
            _ => return Ok(SeriesResult::failure(TerminalError::NoData.to_string())),
        };

        let points = to_price_points(&live_data)?;
        debug!("[Backend] {} points of live data for {}", points.len(), ticker);
        Ok(SeriesResult::ok(points, company))
    }

    async fn fetch_prediction(&self, input: &str, timeframe: &str) -> TerminalResult<PredictionResult> {
        let ticker = self.resolver.resolve(input).await?;
        let response: Option<PredictionResponse> = self
            .post_json(PREDICTION_PATH, &series_request(&ticker, timeframe))
            .await?;

        let (live_data, company, forecast) = match response {
            Some(PredictionResponse {
                live_data: Some(points),
                company,
                prediction,
            }) if !points.is_empty() => (points, company, prediction),
            _ => return Ok(PredictionResult::failure(TerminalError::NoData.to_string())),
        };

        let points = to_price_points(&live_data)?;
        let prediction = to_price_points(forecast.as_deref().unwrap_or_default())?;
        debug!(
            "[Backend] {} points and {} forecast points for {}",
            points.len(),
            prediction.len(),
            ticker
        );
        Ok(PredictionResult::ok(points, company, prediction))
    }

    // ========================================================================
    // HTTP helpers
    // ========================================================================

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> TerminalResult<Response> {
        let url = self.config.api_url(path);
        debug!("[Backend] POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(network_error)?;

        check_status(response)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> TerminalResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        decode(self.post(path, body).await?).await
    }
}

fn series_request<'a>(ticker: &'a Symbol, timeframe: &'a str) -> SeriesRequest<'a> {
    SeriesRequest {
        ticker: ticker.as_str(),
        timeframe,
    }
}

fn check_status(response: Response) -> TerminalResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TerminalError::http(status.as_u16()))
    }
}

async fn decode<R: DeserializeOwned>(response: Response) -> TerminalResult<R> {
    response
        .json()
        .await
        .map_err(|e| TerminalError::parse(format!("Failed to parse response: {}", e)))
}

fn network_error(e: reqwest::Error) -> TerminalError {
    if e.is_timeout() {
        TerminalError::network(format!("Request timed out: {}", e))
    } else {
        TerminalError::network(format!("Request failed: {}", e))
    }
}

impl std::fmt::Debug for MarketDataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataClient")
            .field("api_base_url", &self.config.api_base_url.as_str())
            .field("request_timeout", &self.config.request_timeout)
            .finish()
    }
}
