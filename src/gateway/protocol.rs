// =============================================================================
// Gateway Wire Protocol
// =============================================================================
//
// Client -> gateway: {"action":"subscribe"|"unsubscribe"|"ping","channels":[...],"requestId":"..."}
// Gateway -> client: {"type":"data"|"error"|"pong"|"subscribed"|"unsubscribed"|"rate_limited","seq":N,"channel":"...","data":...,"timestamp":"...","requestId":"..."}
// =============================================================================

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAction {
    Subscribe,
    Unsubscribe,
    Ping,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    pub action: ClientAction,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default, rename = "requestId")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "requestId")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerMessage {
    fn bare(kind: &'static str) -> Self {
        Self { kind, seq: None, channel: None, data: None, timestamp: None, request_id: None, error: None }
    }

    pub fn data(channel: &str, seq: u64, timestamp: DateTime<FixedOffset>, payload: serde_json::Value) -> Self {
        Self { channel: Some(channel.to_string()), seq: Some(seq), timestamp: Some(timestamp), data: Some(payload), ..Self::bare("data") }
    }

    pub fn pong() -> Self {
        Self::bare("pong")
    }

    pub fn subscribed(channel: &str, request_id: Option<String>) -> Self {
        Self { channel: Some(channel.to_string()), request_id, ..Self::bare("subscribed") }
    }

    pub fn unsubscribed(channel: &str, request_id: Option<String>) -> Self {
        Self { channel: Some(channel.to_string()), request_id, ..Self::bare("unsubscribed") }
    }

    pub fn error(message: impl Into<String>, request_id: Option<String>) -> Self {
        Self { error: Some(message.into()), request_id, ..Self::bare("error") }
    }

    pub fn acl_denied(message: impl Into<String>, request_id: Option<String>) -> Self {
        Self { error: Some(message.into()), request_id, ..Self::bare("acl_denied") }
    }

    pub fn quota_exceeded(message: impl Into<String>, request_id: Option<String>) -> Self {
        Self { error: Some(message.into()), request_id, ..Self::bare("quota_exceeded") }
    }

    pub fn rate_limited() -> Self {
        Self::bare("rate_limited")
    }
}
