//! Outbound messages (client → backend)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{Channel, SubscriptionKey};

/// Envelope sent from the client to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Start receiving updates for a channel
    Subscribe {
        channel: Channel,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        params: Vec<String>,
    },
    /// Stop receiving updates for a channel
    Unsubscribe {
        channel: Channel,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        params: Vec<String>,
    },
    /// Request expecting exactly one reply echoing `request_id`
    Request {
        channel: Channel,
        #[serde(rename = "requestId")]
        request_id: String,
        payload: Value,
    },
    /// Application-level keepalive
    Ping,
}

impl ClientMessage {
    pub fn subscribe(key: &SubscriptionKey) -> Self {
        ClientMessage::Subscribe {
            channel: key.channel,
            params: key.params.clone(),
        }
    }

    pub fn unsubscribe(key: &SubscriptionKey) -> Self {
        ClientMessage::Unsubscribe {
            channel: key.channel,
            params: key.params.clone(),
        }
    }

    pub fn request(channel: Channel, request_id: impl Into<String>, payload: Value) -> Self {
        ClientMessage::Request {
            channel,
            request_id: request_id.into(),
            payload,
        }
    }

    /// Channel this message targets, if any
    pub fn channel(&self) -> Option<Channel> {
        match self {
            ClientMessage::Subscribe { channel, .. }
            | ClientMessage::Unsubscribe { channel, .. }
            | ClientMessage::Request { channel, .. } => Some(*channel),
            ClientMessage::Ping => None,
        }
    }

    /// Subscription key for subscribe/unsubscribe messages
    pub fn key(&self) -> Option<SubscriptionKey> {
        match self {
            ClientMessage::Subscribe { channel, params }
            | ClientMessage::Unsubscribe { channel, params } => {
                Some(SubscriptionKey::new(*channel, params.iter().cloned()))
            }
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            ClientMessage::Request { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_serialization() {
        let key = SubscriptionKey::new(Channel::Prices, ["ETH", "BTC"]);
        let json = serde_json::to_value(ClientMessage::subscribe(&key)).unwrap();
        assert_eq!(
            json,
            json!({ "type": "subscribe", "channel": "prices", "params": ["BTC", "ETH"] })
        );
    }

    #[test]
    fn test_subscribe_without_params_omits_field() {
        let key = SubscriptionKey::channel(Channel::Market);
        let json = serde_json::to_string(&ClientMessage::subscribe(&key)).unwrap();
        assert_eq!(json, r#"{"type":"subscribe","channel":"market"}"#);
    }

    #[test]
    fn test_request_carries_request_id() {
        let msg = ClientMessage::request(Channel::AiChat, "abc-123", json!({ "message": "hi" }));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "request");
        assert_eq!(json["requestId"], "abc-123");
        assert_eq!(msg.request_id(), Some("abc-123"));
    }

    #[test]
    fn test_ping_serialization() {
        let json = serde_json::to_string(&ClientMessage::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }
}
