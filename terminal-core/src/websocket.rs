//! Live update channel protocol types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Symbol;

/// Lifecycle state of the live update channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// No connection
    #[default]
    Closed,
    /// Connection attempt in flight
    Connecting,
    /// Connected and receiving updates
    Open,
    /// Waiting out the reconnect delay
    Reconnecting,
}

impl ChannelState {
    /// True while a connection exists or is being established
    pub fn is_active(&self) -> bool {
        !matches!(self, ChannelState::Closed)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Closed => "closed",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Message sent by the client right after connecting on the shared endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeMessage {
    pub action: String,
    pub symbol: Symbol,
}

impl SubscribeMessage {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            action: "subscribe".to_string(),
            symbol,
        }
    }
}

/// Update envelope used by the per-symbol endpoint
///
/// Both fields are optional on the wire; an update is only delivered when
/// `success` is true and `data` is present and truthy.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct UpdateEnvelope {
    #[serde(default)]
    pub success: Option<serde_json::Value>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl UpdateEnvelope {
    /// Consume the envelope, yielding the payload if it should be delivered
    pub fn into_payload(self) -> Option<serde_json::Value> {
        let success = self.success.as_ref().is_some_and(is_truthy);
        match self.data {
            Some(data) if success && is_truthy(&data) => Some(data),
            _ => None,
        }
    }
}

/// JSON truthiness: false, null, 0, NaN and "" are falsy
pub fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;

    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: serde_json::Value) -> UpdateEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_envelope_delivers_payload() {
        let payload = envelope(json!({"success": true, "data": {"price": 101.5}})).into_payload();
        assert_eq!(payload, Some(json!({"price": 101.5})));
    }

    #[test]
    fn test_envelope_requires_both_markers() {
        assert!(envelope(json!({"success": true})).into_payload().is_none());
        assert!(envelope(json!({"data": {"price": 1}})).into_payload().is_none());
        assert!(envelope(json!({"success": false, "data": {"price": 1}}))
            .into_payload()
            .is_none());
        assert!(envelope(json!({"success": true, "data": null})).into_payload().is_none());
        assert!(envelope(json!({"success": true, "data": 0})).into_payload().is_none());
        assert!(envelope(json!({})).into_payload().is_none());
    }

    #[test]
    fn test_subscribe_message_shape() {
        let msg = SubscribeMessage::new(Symbol::new("TSLA").unwrap());
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"action": "subscribe", "symbol": "TSLA"})
        );
    }

    #[test]
    fn test_channel_state_activity() {
        assert!(!ChannelState::Closed.is_active());
        assert!(ChannelState::Reconnecting.is_active());
        assert_eq!(ChannelState::default(), ChannelState::Closed);
    }
}
