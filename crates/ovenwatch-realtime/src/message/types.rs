//! Wire message definitions.
//!
//! Outbound frames share one envelope, `{ type, data?, timestamp }`. Inbound
//! frames are decoded in two steps: the envelope check (a JSON object with a
//! string `type`) and the typed decode into [`InboundMessage`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ovenwatch_core::error::AppError;
use ovenwatch_core::result::AppResult;

use super::validator::{validate_frame, valid_topics};

/// Prefix applied to the type of replayed backlog messages.
pub const QUEUED_PREFIX: &str = "queued_";

/// Messages sent by the server to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl OutboundMessage {
    /// Creates a message stamped with the current time.
    pub fn new(kind: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: now_millis(),
        }
    }

    /// Creates a message with a payload.
    pub fn with_data(kind: impl Into<String>, data: Value) -> Self {
        Self::new(kind, Some(data))
    }

    /// `pong` reply to a client ping.
    pub fn pong() -> Self {
        Self::new("pong", None)
    }

    /// `welcome` sent once a transport opens.
    pub fn welcome(connection_id: &str, available: &[String]) -> Self {
        let now = now_millis();
        Self {
            kind: "welcome".to_string(),
            data: Some(serde_json::json!({
                "connectionId": connection_id,
                "serverTime": now,
                "availableSubscriptions": available,
            })),
            timestamp: now,
        }
    }

    /// `alert_acknowledged` fan-out after a client acknowledges an alert.
    pub fn alert_acknowledged(alert_id: &Value, acknowledged_by: &str) -> Self {
        Self::with_data(
            "alert_acknowledged",
            serde_json::json!({
                "alertId": alert_id,
                "acknowledgedBy": acknowledged_by,
            }),
        )
    }

    /// Copy re-tagged as replayed backlog; the enqueue timestamp is kept.
    pub fn as_queued(&self) -> Self {
        Self {
            kind: format!("{QUEUED_PREFIX}{}", self.kind),
            data: self.data.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Serializes to a text frame.
    pub fn to_frame(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages sent by subscribers to the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Liveness probe; answered with `pong`.
    Ping {
        /// Client timestamp in whatever form the client sent; ignored.
        #[serde(default)]
        timestamp: Option<Value>,
    },
    /// Add topics.
    Subscribe {
        /// Requested topics; non-strings are filtered out.
        #[serde(default)]
        subscriptions: Vec<Value>,
    },
    /// Remove topics.
    Unsubscribe {
        /// Topics to drop.
        #[serde(default)]
        subscriptions: Vec<Value>,
    },
    /// Acknowledge an alert on behalf of this connection.
    AcknowledgeAlert {
        /// Alert identifier, echoed back verbatim.
        #[serde(rename = "alertId")]
        alert_id: Value,
    },
}

impl InboundMessage {
    /// Topics carried by a subscribe/unsubscribe, restricted to well-formed
    /// strings.
    pub fn topics(&self) -> Vec<String> {
        match self {
            Self::Subscribe { subscriptions } | Self::Unsubscribe { subscriptions } => {
                valid_topics(subscriptions.iter().filter_map(Value::as_str))
            }
            _ => Vec::new(),
        }
    }
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A recognized message.
    Message(InboundMessage),
    /// Well-typed envelope with a type this server does not handle.
    Unknown(String),
}

impl Decoded {
    /// Type tag of the decoded frame.
    pub fn type_tag(&self) -> &str {
        match self {
            Self::Message(InboundMessage::Ping { .. }) => "ping",
            Self::Message(InboundMessage::Subscribe { .. }) => "subscribe",
            Self::Message(InboundMessage::Unsubscribe { .. }) => "unsubscribe",
            Self::Message(InboundMessage::AcknowledgeAlert { .. }) => "acknowledge_alert",
            Self::Unknown(kind) => kind,
        }
    }
}

const KNOWN_TYPES: [&str; 4] = ["ping", "subscribe", "unsubscribe", "acknowledge_alert"];

/// Checks the envelope of a raw frame and returns its type tag.
///
/// A frame passing this check counts as a liveness signal even if the typed
/// decode later fails.
pub fn envelope_type(raw: &str) -> AppResult<(String, Value)> {
    validate_frame(raw)?;
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AppError::protocol(format!("frame is not JSON: {e}")))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::protocol("frame has no string `type`"))?
        .to_string();
    Ok((kind, value))
}

/// Typed decode of an envelope that already passed [`envelope_type`].
pub fn decode(kind: &str, value: Value) -> AppResult<Decoded> {
    if !KNOWN_TYPES.contains(&kind) {
        return Ok(Decoded::Unknown(kind.to_string()));
    }
    serde_json::from_value(value)
        .map(Decoded::Message)
        .map_err(|e| AppError::protocol(format!("malformed `{kind}` payload: {e}")))
}

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: &str) -> AppResult<Decoded> {
        let (kind, value) = envelope_type(raw)?;
        decode(&kind, value)
    }

    #[test]
    fn test_decode_subscribe_filters_non_strings() {
        let decoded = parse(r#"{"type":"subscribe","subscriptions":["metrics",7,null,"alerts",""]}"#)
            .expect("decode");
        let Decoded::Message(msg) = decoded else {
            panic!("expected a known message");
        };
        assert_eq!(msg.topics(), vec!["metrics".to_string(), "alerts".to_string()]);
    }

    #[test]
    fn test_decode_ping_with_timestamp() {
        let decoded = parse(r#"{"type":"ping","timestamp":1700000000000}"#).expect("decode");
        assert_eq!(decoded.type_tag(), "ping");

        for raw in [
            r#"{"type":"ping","timestamp":1700000000000.25}"#,
            r#"{"type":"ping","timestamp":"2026-01-01T00:00:00Z"}"#,
            r#"{"type":"ping"}"#,
        ] {
            assert_eq!(parse(raw).expect("decode").type_tag(), "ping", "{raw}");
        }
    }

    #[test]
    fn test_decode_acknowledge_alert() {
        let decoded = parse(r#"{"type":"acknowledge_alert","alertId":"memoryUsage_warning"}"#)
            .expect("decode");
        assert_eq!(
            decoded,
            Decoded::Message(InboundMessage::AcknowledgeAlert {
                alert_id: json!("memoryUsage_warning"),
            })
        );
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let decoded = parse(r#"{"type":"dance","moves":3}"#).expect("decode");
        assert_eq!(decoded, Decoded::Unknown("dance".to_string()));
    }

    #[test]
    fn test_missing_type_is_protocol_error() {
        let err = parse(r#"{"subscriptions":["metrics"]}"#).unwrap_err();
        assert_eq!(err.kind, ovenwatch_core::error::ErrorKind::Protocol);
        assert!(parse("[1,2,3]").is_err());
        assert!(parse("not json").is_err());
    }

    #[test]
    fn test_malformed_known_type_is_protocol_error() {
        let err = parse(r#"{"type":"subscribe","subscriptions":"metrics"}"#).unwrap_err();
        assert_eq!(err.kind, ovenwatch_core::error::ErrorKind::Protocol);
        assert!(parse(r#"{"type":"acknowledge_alert"}"#).is_err());
    }

    #[test]
    fn test_welcome_shape() {
        let msg = OutboundMessage::welcome("ws_1", &["metrics".to_string()]);
        let value: Value = serde_json::from_str(&msg.to_frame().expect("frame")).expect("json");
        assert_eq!(value["type"], "welcome");
        assert_eq!(value["data"]["connectionId"], "ws_1");
        assert_eq!(value["data"]["availableSubscriptions"], json!(["metrics"]));
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn test_as_queued_keeps_timestamp() {
        let msg = OutboundMessage {
            kind: "metrics_update".to_string(),
            data: None,
            timestamp: 42,
        };
        let queued = msg.as_queued();
        assert_eq!(queued.kind, "queued_metrics_update");
        assert_eq!(queued.timestamp, 42);
        let frame = queued.to_frame().expect("frame");
        assert!(!frame.contains("\"data\""));
    }
}
