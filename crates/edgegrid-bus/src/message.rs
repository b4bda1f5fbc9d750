//! The routable message envelope.
//!
//! On the wire a message is a flat JSON object:
//! `{id, parentID, timestamp, source, group, resource, operation, content, sync}`.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use edgegrid_core::Operation;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BusError, BusResult};

/// Message body.
///
/// Bytes travel as base64 strings, structured bodies as nested JSON.
/// A received string always stays `Text`; base64-wrapped documents are
/// unwrapped when the body is processed (see [`Content::payload`]).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Content {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Content {
    /// Serialize `value` into a structured body.
    pub fn json<T: Serialize>(value: &T) -> BusResult<Self> {
        serde_json::to_value(value)
            .map(Content::Json)
            .map_err(|e| BusError::ContentDecode(e.to_string()))
    }

    /// The body as bytes, whatever form it arrived in.
    pub fn data(&self) -> Vec<u8> {
        match self {
            Content::Empty => Vec::new(),
            Content::Text(text) => text.as_bytes().to_vec(),
            Content::Bytes(bytes) => bytes.clone(),
            Content::Json(serde_json::Value::String(text)) => text.as_bytes().to_vec(),
            Content::Json(value) => serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    /// The body bytes to process. A string that is not JSON itself but
    /// is the base64 encoding of a JSON document yields the document.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Content::Text(text) | Content::Json(serde_json::Value::String(text)) => {
                unwrap_base64_json(text).unwrap_or_else(|| text.as_bytes().to_vec())
            }
            other => other.data(),
        }
    }

    /// Textual view of string-like bodies.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            Content::Json(serde_json::Value::String(text)) => Some(text),
            _ => None,
        }
    }

    /// Decode the body into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> BusResult<T> {
        let decoded = match self {
            Content::Json(value) => serde_json::from_value(value.clone()),
            other => serde_json::from_slice(&other.payload()),
        };
        decoded.map_err(|e| BusError::ContentDecode(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Empty => true,
            Content::Text(text) => text.is_empty(),
            Content::Bytes(bytes) => bytes.is_empty(),
            Content::Json(value) => value.is_null(),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Bytes(bytes)
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        Content::Json(value)
    }
}

impl Serialize for Content {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Content::Empty => serializer.serialize_none(),
            Content::Text(text) => serializer.serialize_str(text),
            Content::Bytes(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            Content::Json(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Null => Content::Empty,
            serde_json::Value::String(text) => Content::Text(text),
            other => Content::Json(other),
        })
    }
}

fn unwrap_base64_json(text: &str) -> Option<Vec<u8>> {
    if serde_json::from_str::<IgnoredAny>(text).is_ok() {
        return None;
    }
    let bytes = BASE64.decode(text.as_bytes()).ok()?;
    serde_json::from_slice::<IgnoredAny>(&bytes).ok()?;
    Some(bytes)
}

/// A routable bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "parentID", default)]
    pub parent_id: String,
    /// Creation time, Unix milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub content: Content,
    /// Set by the bus on `send_sync`; never by callers.
    #[serde(default)]
    sync: bool,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// A blank message with a fresh id and the current timestamp.
    pub fn new() -> Self {
        Self {
            id: new_id(),
            parent_id: String::new(),
            timestamp: now_millis(),
            source: String::new(),
            group: String::new(),
            resource: String::new(),
            operation: String::new(),
            content: Content::Empty,
            sync: false,
        }
    }

    pub fn build_router(
        mut self,
        source: impl Into<String>,
        group: impl Into<String>,
        resource: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        self.source = source.into();
        self.group = group.into();
        self.resource = resource.into();
        self.operation = operation.into();
        self
    }

    pub fn fill_body(mut self, content: impl Into<Content>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = parent_id.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Same route and body under a fresh id and timestamp.
    pub fn renewed(&self) -> Self {
        let mut clone = self.clone();
        clone.id = new_id();
        clone.timestamp = now_millis();
        clone.sync = false;
        clone
    }

    /// Same message with the sync flag cleared, for one-way relays.
    pub fn forwarded(&self) -> Self {
        let mut clone = self.clone();
        clone.sync = false;
        clone
    }

    /// A `response` to this message carrying `content`.
    pub fn new_response(&self, content: impl Into<Content>) -> Self {
        self.reply(Operation::Response, content.into())
    }

    /// An `error` reply to this message carrying a reason.
    pub fn new_error(&self, reason: impl Into<String>) -> Self {
        self.reply(Operation::Error, Content::Text(reason.into()))
    }

    fn reply(&self, operation: Operation, content: Content) -> Self {
        Message::new()
            .build_router(
                self.source.clone(),
                self.group.clone(),
                self.resource.clone(),
                operation.as_str(),
            )
            .with_parent_id(self.id.clone())
            .fill_body(content)
    }

    /// True when the sender is blocked waiting for a correlated reply.
    pub fn is_sync(&self) -> bool {
        self.sync
    }

    pub(crate) fn mark_sync(&mut self) {
        self.sync = true;
    }

    pub fn operation_kind(&self) -> Option<Operation> {
        Operation::parse(&self.operation)
    }

    pub fn is_error(&self) -> bool {
        self.operation_kind() == Some(Operation::Error)
    }

    pub fn to_wire(&self) -> BusResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| BusError::ContentDecode(e.to_string()))
    }

    pub fn from_wire(bytes: &[u8]) -> BusResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| BusError::ContentDecode(e.to_string()))
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_ids_are_unique() {
        let a = Message::new();
        let b = Message::new();
        assert_ne!(a.id, b.id);
        assert!(a.timestamp > 0);
        assert!(!a.is_sync());
    }

    #[test]
    fn response_correlates_to_request() {
        let req = Message::new()
            .build_router("edged", "meta", "ns/configmap/cm", "query")
            .fill_body("");
        let resp = req.new_response(json!(["x"]));

        assert_eq!(resp.parent_id, req.id);
        assert_ne!(resp.id, req.id);
        assert_eq!(resp.operation, "response");
        assert_eq!(resp.resource, "ns/configmap/cm");

        let err = req.new_error("boom");
        assert!(err.is_error());
        assert_eq!(err.parent_id, req.id);
        assert_eq!(err.content.as_str(), Some("boom"));
    }

    #[test]
    fn wire_format_field_names() {
        let msg = Message::new()
            .build_router("metamanager", "resource", "ns/pod/p", "update")
            .with_parent_id("abc")
            .fill_body(json!({"k": "v"}));
        let wire: serde_json::Value = serde_json::from_slice(&msg.to_wire().unwrap()).unwrap();

        assert_eq!(wire["parentID"], "abc");
        assert_eq!(wire["operation"], "update");
        assert_eq!(wire["content"], json!({"k": "v"}));
        assert_eq!(wire["sync"], false);
    }

    #[test]
    fn bytes_travel_as_base64() {
        let msg = Message::new().fill_body(b"{\"a\":1}".to_vec());
        let wire: serde_json::Value = serde_json::from_slice(&msg.to_wire().unwrap()).unwrap();
        assert_eq!(wire["content"], "eyJhIjoxfQ==");

        let back = Message::from_wire(&msg.to_wire().unwrap()).unwrap();
        assert_eq!(back.content.payload(), b"{\"a\":1}".to_vec());
        assert_eq!(back.content.decode::<serde_json::Value>().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn base64_shaped_text_survives_the_wire() {
        for text in ["disconnected", "abcd", "AAAA", "connected", "OK"] {
            let msg = Message::new().fill_body(text);
            let back = Message::from_wire(&msg.to_wire().unwrap()).unwrap();
            assert_eq!(back.content, Content::Text(text.into()));
            assert_eq!(back.content.as_str(), Some(text));
            assert_eq!(back.content.payload(), text.as_bytes().to_vec());
        }
    }

    #[test]
    fn json_text_is_never_unwrapped() {
        // "1234" is valid base64, but also a JSON number.
        assert_eq!(Content::Text("1234".into()).payload(), b"1234".to_vec());
        assert_eq!(Content::Text(r#"{"k":"v"}"#.into()).payload(), br#"{"k":"v"}"#.to_vec());
    }

    #[test]
    fn plain_strings_stay_text() {
        let raw = br#"{"id":"1","operation":"node-connection-event","content":"connected"}"#;
        let msg = Message::from_wire(raw).unwrap();
        assert_eq!(msg.content, Content::Text("connected".into()));
        assert_eq!(msg.parent_id, "");
    }

    #[test]
    fn nested_object_content_is_accepted() {
        let raw = br#"{"id":"1","content":{"data":{"k":"v"}},"sync":true}"#;
        let msg = Message::from_wire(raw).unwrap();
        assert!(msg.is_sync());
        assert_eq!(msg.content.data(), br#"{"data":{"k":"v"}}"#.to_vec());
    }

    #[test]
    fn decode_from_every_form() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct Obj {
            k: String,
        }
        let want = Obj { k: "v".into() };
        assert_eq!(Content::Json(json!({"k": "v"})).decode::<Obj>().unwrap(), want);
        assert_eq!(Content::Text(r#"{"k":"v"}"#.into()).decode::<Obj>().unwrap(), want);
        assert_eq!(Content::Bytes(br#"{"k":"v"}"#.to_vec()).decode::<Obj>().unwrap(), want);
        assert!(Content::Text("not json".into()).decode::<Obj>().is_err());
    }
}
