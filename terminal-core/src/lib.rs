//! Core types for the Stock Market Terminal
//!
//! This crate defines the shared data structures used across the terminal:
//! ticker symbols, price series results, the display summary produced from
//! them, and the live update channel protocol.

pub mod error;
pub mod series;
pub mod symbol;
pub mod websocket;

pub use error::{TerminalError, TerminalResult};
pub use series::{
    normalize, DisplaySummary, PredictionResult, PricePoint, SeriesResult, StocksResult,
    TrainingResult,
};
pub use symbol::Symbol;
pub use websocket::{ChannelState, SubscribeMessage, UpdateEnvelope};
