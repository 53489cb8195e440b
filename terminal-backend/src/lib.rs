//! Backend integration for the Stock Market Terminal
//!
//! This crate provides a client for the prediction backend's REST API
//! (ticker resolution, live data, predictions, training, stock listing) and
//! the live update channel that streams price updates over WebSocket.
//!
//! Endpoints are configured through [`BackendConfig`], usually loaded from:
//! - `TERMINAL_API_URL` - REST base URL
//! - `TERMINAL_WS_URL` - WebSocket base URL
//! - `TERMINAL_REQUEST_TIMEOUT_SECS` - REST request deadline

pub mod client;
pub mod config;
pub mod resolver;
pub mod types;
pub mod websocket;

pub use client::MarketDataClient;
pub use config::BackendConfig;
pub use resolver::SymbolResolver;
pub use websocket::{
    ChannelVariant, LiveChannel, LiveChannelConfig, MessageOutcome, ReconnectPolicy, UpdateCallback,
};
