//! Inbound messages (backend → client)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::Channel;
use crate::values::Timestamp;

/// Envelope received from the backend, tagged with its channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub channel: Channel,
    #[serde(default)]
    pub data: Value,
    /// Echo of the outbound request id, present on replies
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Set when the backend signals a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl ServerMessage {
    /// Channel update
    pub fn update(channel: Channel, data: Value) -> Self {
        Self {
            channel,
            data,
            request_id: None,
            error: None,
            timestamp: None,
        }
    }

    /// Successful reply to a request
    pub fn reply(channel: Channel, request_id: impl Into<String>, data: Value) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::update(channel, data)
        }
    }

    /// Failed reply to a request
    pub fn error_reply(
        channel: Channel,
        request_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Some(request_id.into()),
            error: Some(error.into()),
            ..Self::update(channel, Value::Null)
        }
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Returns true if this message answers a request
    pub fn is_reply(&self) -> bool {
        self.request_id.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_channel_update() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"prices","data":[{"symbol":"BTC","price":"1"}]}"#)
                .unwrap();
        assert_eq!(msg.channel, Channel::Prices);
        assert!(!msg.is_reply());
        assert!(msg.data.is_array());
    }

    #[test]
    fn test_parse_reply_with_error() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "ai-response",
            "requestId": "r-1",
            "error": "model overloaded"
        }))
        .unwrap();
        assert_eq!(msg.channel, Channel::AiChat);
        assert!(msg.is_reply());
        assert_eq!(msg.error_message(), Some("model overloaded"));
        assert_eq!(msg.data, Value::Null);
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        let result = serde_json::from_str::<ServerMessage>(r#"{"type":"weather","data":{}}"#);
        assert!(result.is_err());
    }
}
