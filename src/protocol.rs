//! Wire format of the device API.
//!
//! Every transport frame carries exactly one JSON object:
//!
//! ```text
//! client → device   {"path": "/system.recording-unit-serial", "method": "GET", "id": 1}
//!                   {"path": "/recorder:started", "method": "POST", "id": 2, "body": null}
//! device → client   {"id": 1, "body": "SN123"}                 response
//!                   {"signal": "sig-7", "body": []}             signal event
//! ```
//!
//! Inbound frames are classified once, by [`InboundFrame::decode`], into a
//! response, a signal event or an invalid frame. Nothing downstream inspects
//! raw JSON shape.

// Rust guideline compliant 2026-02

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolViolation;

/// Per-connection request identifier. Starts at 1.
pub type MessageId = u64;

/// Payload of one signal event.
pub type SignalBody = Vec<Value>;

/// Device-assigned token naming an active signal subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(String);

impl SignalId {
    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read a signal identifier as the device sends it: a non-empty string
    /// or a number (normalized to its decimal text).
    pub(crate) fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SignalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SignalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Local subscription identifier, unique per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Request method understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read a property or resource.
    Get,
    /// Set a property, invoke an action or (un)subscribe to a signal.
    Post,
}

/// A request description, not yet bound to a message identifier.
///
/// The identifier is assigned by the connection when the request is sent;
/// callers cannot set it.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    path: String,
    method: Method,
    params: Option<Value>,
    body: Option<Value>,
}

impl Request {
    /// A `GET` request without parameters.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::Get,
            params: None,
            body: None,
        }
    }

    /// A `POST` request. The device API always expects a body on `POST`,
    /// so `None` goes out as JSON `null`.
    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            path: path.into(),
            method: Method::Post,
            params: None,
            body: Some(body.unwrap_or(Value::Null)),
        }
    }

    /// Attach query parameters.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Target path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Serialize into a wire frame stamped with `id`.
    ///
    /// # Errors
    ///
    /// Fails only if a params or body value cannot be serialized.
    pub fn encode(&self, id: MessageId) -> serde_json::Result<String> {
        serde_json::to_string(&WireRequest {
            path: &self.path,
            method: self.method,
            id,
            params: self.params.as_ref(),
            body: self.body.as_ref(),
        })
    }
}

/// Field order matches what the device's own web client sends.
#[derive(Serialize)]
struct WireRequest<'a> {
    path: &'a str,
    method: Method,
    id: MessageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a Value>,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Response to the request carrying `id`. A missing body decodes as `null`.
    Response {
        /// Identifier of the originating request.
        id: MessageId,
        /// Response payload.
        body: Value,
    },
    /// Event pushed for an active signal subscription.
    Signal {
        /// Device-assigned signal identifier.
        signal_id: SignalId,
        /// Event payload.
        body: SignalBody,
    },
    /// Anything else.
    Invalid(ProtocolViolation),
}

impl InboundFrame {
    /// Classify a raw text frame.
    ///
    /// A frame carrying an `id` field is always a response, whatever else it
    /// contains. A frame carrying both `signal` and `body` is a signal event.
    pub fn decode(text: &str) -> Self {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return Self::Invalid(ProtocolViolation::MalformedJson(e.to_string())),
        };
        let Value::Object(mut fields) = value else {
            return Self::Invalid(ProtocolViolation::NotAnObject);
        };

        if let Some(raw_id) = fields.remove("id") {
            let Some(id) = raw_id.as_u64() else {
                return Self::Invalid(ProtocolViolation::InvalidMessageId(raw_id.to_string()));
            };
            let body = fields.remove("body").unwrap_or(Value::Null);
            return Self::Response { id, body };
        }

        match (fields.remove("signal"), fields.remove("body")) {
            (Some(signal), Some(body)) => {
                let Some(signal_id) = SignalId::from_json(&signal) else {
                    return Self::Invalid(ProtocolViolation::InvalidSignalId(signal.to_string()));
                };
                match body {
                    Value::Array(body) => Self::Signal { signal_id, body },
                    _ => Self::Invalid(ProtocolViolation::InvalidSignalBody(signal_id)),
                }
            }
            _ => Self::Invalid(ProtocolViolation::Unrecognized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(frame: &str) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[test]
    fn test_get_request_frame() {
        let frame = Request::get("/system.recording-unit-serial").encode(1).unwrap();
        assert_eq!(
            parse(&frame),
            json!({"path": "/system.recording-unit-serial", "method": "GET", "id": 1})
        );
    }

    #[test]
    fn test_get_request_with_params() {
        let frame = Request::get("/recordings")
            .with_params(json!({"help": true}))
            .encode(4)
            .unwrap();
        assert_eq!(
            parse(&frame),
            json!({"path": "/recordings", "method": "GET", "id": 4, "params": {"help": true}})
        );
    }

    #[test]
    fn test_post_without_body_sends_null() {
        let frame = Request::post("/recorder:started", None).encode(2).unwrap();
        let value = parse(&frame);
        assert_eq!(value["method"], "POST");
        assert_eq!(value["id"], 2);
        assert!(value.as_object().unwrap().contains_key("body"));
        assert!(value["body"].is_null());
    }

    #[test]
    fn test_post_field_order_path_first() {
        let frame = Request::post("/recorder!start", None).encode(3).unwrap();
        assert!(frame.starts_with(r#"{"path":"/recorder!start","method":"POST","id":3"#));
    }

    #[test]
    fn test_decode_response() {
        assert_eq!(
            InboundFrame::decode(r#"{"id":1,"body":"SN123"}"#),
            InboundFrame::Response {
                id: 1,
                body: json!("SN123")
            }
        );
    }

    #[test]
    fn test_decode_response_without_body_is_null() {
        assert_eq!(
            InboundFrame::decode(r#"{"id":8}"#),
            InboundFrame::Response {
                id: 8,
                body: Value::Null
            }
        );
    }

    #[test]
    fn test_id_wins_over_signal_shape() {
        let frame = InboundFrame::decode(r#"{"id":5,"signal":"sig-1","body":[1]}"#);
        assert!(matches!(frame, InboundFrame::Response { id: 5, .. }));
    }

    #[test]
    fn test_decode_signal_event() {
        assert_eq!(
            InboundFrame::decode(r#"{"signal":"sig-7","body":[]}"#),
            InboundFrame::Signal {
                signal_id: SignalId::from("sig-7"),
                body: vec![]
            }
        );
    }

    #[test]
    fn test_decode_numeric_signal_id() {
        let frame = InboundFrame::decode(r#"{"signal":42,"body":["a"]}"#);
        assert_eq!(
            frame,
            InboundFrame::Signal {
                signal_id: SignalId::from("42"),
                body: vec![json!("a")]
            }
        );
    }

    #[test]
    fn test_decode_empty_signal_id_is_invalid() {
        assert_eq!(
            InboundFrame::decode(r#"{"signal":"","body":[]}"#),
            InboundFrame::Invalid(ProtocolViolation::InvalidSignalId("\"\"".to_string()))
        );
    }

    #[test]
    fn test_signal_id_from_json_accepts_strings_and_numbers() {
        assert_eq!(SignalId::from_json(&json!("sig-7")), Some(SignalId::from("sig-7")));
        assert_eq!(SignalId::from_json(&json!(12)), Some(SignalId::from("12")));
        assert_eq!(SignalId::from_json(&json!("")), None);
        assert_eq!(SignalId::from_json(&json!(true)), None);
        assert_eq!(SignalId::from_json(&Value::Null), None);
    }

    #[test]
    fn test_decode_unrecognized_shape() {
        assert_eq!(
            InboundFrame::decode(r#"{"foo":"bar"}"#),
            InboundFrame::Invalid(ProtocolViolation::Unrecognized)
        );
    }

    #[test]
    fn test_decode_signal_without_body_is_unrecognized() {
        assert_eq!(
            InboundFrame::decode(r#"{"signal":"sig-7"}"#),
            InboundFrame::Invalid(ProtocolViolation::Unrecognized)
        );
    }

    #[test]
    fn test_decode_signal_body_must_be_array() {
        assert_eq!(
            InboundFrame::decode(r#"{"signal":"sig-7","body":{"x":1}}"#),
            InboundFrame::Invalid(ProtocolViolation::InvalidSignalBody(SignalId::from("sig-7")))
        );
    }

    #[test]
    fn test_decode_negative_id_is_invalid() {
        assert!(matches!(
            InboundFrame::decode(r#"{"id":-1,"body":null}"#),
            InboundFrame::Invalid(ProtocolViolation::InvalidMessageId(_))
        ));
    }

    #[test]
    fn test_decode_non_object_and_garbage() {
        assert_eq!(
            InboundFrame::decode("[1,2,3]"),
            InboundFrame::Invalid(ProtocolViolation::NotAnObject)
        );
        assert!(matches!(
            InboundFrame::decode("not json"),
            InboundFrame::Invalid(ProtocolViolation::MalformedJson(_))
        ));
    }
}
