//! Live-update wire frames

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Identifies one subscription on both ends of the push connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a subscription watches: a data type plus an optional parameter,
/// e.g. `("inventory", Some("sku-42"))`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub data_type: String,
    pub param: Option<String>,
}

impl Topic {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            param: None,
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    /// Content store path that serves the topic's current data
    pub fn poll_path(&self) -> String {
        match &self.param {
            Some(param) => format!("/{}/{}", self.data_type, param),
            None => format!("/{}", self.data_type),
        }
    }

    /// Parse `data_type[:param]`
    pub fn parse(raw: &str) -> Option<Self> {
        let (data_type, param) = match raw.split_once(':') {
            Some((data_type, param)) => (data_type, Some(param)),
            None => (raw, None),
        };
        if data_type.is_empty() || param.is_some_and(str::is_empty) {
            return None;
        }

        let topic = Topic::new(data_type);
        Some(match param {
            Some(param) => topic.with_param(param),
            None => topic,
        })
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            Some(param) => write!(f, "{}:{}", self.data_type, param),
            None => f.write_str(&self.data_type),
        }
    }
}

/// Client → server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    #[serde(rename_all = "camelCase")]
    Subscribe {
        subscription_id: SubscriptionId,
        data_type: String,
        topic_param: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Unsubscribe {
        subscription_id: SubscriptionId,
        data_type: String,
        topic_param: Option<String>,
    },
}

impl ControlFrame {
    pub fn subscribe(id: SubscriptionId, topic: &Topic) -> Self {
        ControlFrame::Subscribe {
            subscription_id: id,
            data_type: topic.data_type.clone(),
            topic_param: topic.param.clone(),
        }
    }

    pub fn unsubscribe(id: SubscriptionId, topic: &Topic) -> Self {
        ControlFrame::Unsubscribe {
            subscription_id: id,
            data_type: topic.data_type.clone(),
            topic_param: topic.param.clone(),
        }
    }
}

/// Server → client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    #[serde(rename_all = "camelCase")]
    Update {
        subscription_id: SubscriptionId,
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(default)]
        subscription_id: Option<SubscriptionId>,
        message: String,
    },
}

impl InboundFrame {
    /// Parse one text frame; anything unrecognized is a protocol error
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| EngineError::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_frame_shape() {
        let id = SubscriptionId::new();
        let topic = Topic::new("inventory").with_param("sku-42");
        let frame = serde_json::to_value(ControlFrame::subscribe(id, &topic)).unwrap();

        assert_eq!(
            frame,
            json!({
                "type": "subscribe",
                "subscriptionId": id.to_string(),
                "dataType": "inventory",
                "topicParam": "sku-42",
            })
        );
    }

    #[test]
    fn test_parse_update_frame() {
        let id = SubscriptionId::new();
        let raw = format!(r#"{{"type":"update","subscriptionId":"{id}","payload":{{"stock":3}}}}"#);

        let frame: InboundFrame = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Update {
                subscription_id: id,
                payload: json!({"stock": 3}),
            }
        );
    }

    #[test]
    fn test_error_frame_without_subscription() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"type":"error","message":"rate limited"}"#).unwrap();
        assert!(matches!(
            frame,
            InboundFrame::Error { subscription_id: None, .. }
        ));
    }

    #[test]
    fn test_unknown_frame_rejected() {
        assert!(matches!(
            InboundFrame::decode(r#"{"type":"hello"}"#),
            Err(EngineError::Protocol(_))
        ));
        assert!(matches!(
            InboundFrame::decode(r#"{"type":"update","subscriptionId":"not-a-uuid","payload":1}"#),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn test_topic_paths() {
        assert_eq!(Topic::new("cart").poll_path(), "/cart");
        assert_eq!(
            Topic::new("inventory").with_param("sku-1").poll_path(),
            "/inventory/sku-1"
        );
        assert_eq!(
            Topic::parse("inventory:sku-1"),
            Some(Topic::new("inventory").with_param("sku-1"))
        );
        assert_eq!(Topic::parse("cart"), Some(Topic::new("cart")));
        assert_eq!(Topic::parse(":x"), None);
        assert_eq!(Topic::parse("cart:"), None);
    }
}
