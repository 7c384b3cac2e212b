//! Netmon Common - Shared protocol payloads for the request monitor
//!
//! This crate contains the network event payloads delivered by the debugging
//! protocol, the capture file format used to replay them, and serialization
//! helpers shared by the engine and the CLI.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to serialize capture: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),

    #[error("Failed to deserialize capture: {0}")]
    Deserialize(#[from] rmp_serde::decode::Error),

    #[error("Invalid JSON capture: {0}")]
    Json(#[from] serde_json::Error),
}

/// Opaque identifier of a tracked request (the protocol's event actor)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id given to an editable copy of this request
    pub fn clone_id(&self) -> RequestId {
        RequestId(format!("{}{}", self.0, constants::CLONE_SUFFIX))
    }

    /// For a clone id, the id of the request it was copied from
    pub fn original_id(&self) -> Option<RequestId> {
        self.0
            .strip_suffix(constants::CLONE_SUFFIX)
            .map(|orig| RequestId(orig.to_string()))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for RequestId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Generate an id for a request that was not observed through the protocol
pub fn new_request_id() -> RequestId {
    RequestId(Uuid::new_v4().to_string())
}

/// A possibly truncated string whose full text lives on the debuggee side.
///
/// Short bodies are delivered inline; long ones as a reference that must be
/// resolved through the body-fetch service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LongString {
    Inline(String),
    #[serde(rename_all = "camelCase")]
    Actor {
        actor: String,
        length: u64,
        initial: String,
    },
}

impl Default for LongString {
    fn default() -> Self {
        LongString::Inline(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Header list as reported by the protocol, with its raw byte size
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderList {
    pub headers: Vec<Header>,
    #[serde(default)]
    pub headers_size: u64,
}

impl HeaderList {
    pub fn new(headers: Vec<Header>) -> Self {
        let headers_size = headers
            .iter()
            .map(|h| (h.name.len() + h.value.len() + 2) as u64)
            .sum();
        Self {
            headers,
            headers_size,
        }
    }

    /// Case-insensitive header lookup
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieList {
    pub cookies: Vec<Cookie>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDataBody {
    pub text: LongString,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPostData {
    pub post_data: PostDataBody,
    #[serde(default)]
    pub post_data_discarded: bool,
}

impl RequestPostData {
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            post_data: PostDataBody {
                text: LongString::Inline(text.into()),
            },
            post_data_discarded: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: LongString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseContent {
    pub content: ContentBody,
    #[serde(default)]
    pub content_discarded: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub blocked: f64,
    pub dns: f64,
    pub connect: f64,
    pub send: f64,
    pub wait: f64,
    pub receive: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTimings {
    pub timings: Timings,
    pub total_time: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub filename: String,
    pub line_number: u32,
    #[serde(default)]
    pub function_name: Option<String>,
}

/// What initiated a request, as a content policy type number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cause {
    #[serde(rename = "type")]
    pub kind: u32,
    #[serde(default)]
    pub loading_document_uri: Option<String>,
    #[serde(default)]
    pub stacktrace: Vec<StackFrame>,
}

impl Cause {
    pub fn type_name(&self) -> &'static str {
        load_cause_string(self.kind)
    }
}

/// Map a content policy type number to its display name
pub fn load_cause_string(kind: u32) -> &'static str {
    match kind {
        2 => "script",
        3 => "img",
        4 => "stylesheet",
        5 => "object",
        6 => "document",
        7 => "subdocument",
        10 => "ping",
        11 => "xhr",
        12 => "objectSubdoc",
        14 => "font",
        15 => "media",
        16 => "websocket",
        17 => "csp",
        18 => "xslt",
        19 => "beacon",
        20 => "fetch",
        21 => "imageset",
        22 => "webManifest",
        _ => "other",
    }
}

/// Initial fields of a request, delivered once when it is first observed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    /// RFC 3339 timestamp of when the request started
    pub started_date_time: String,
    pub method: String,
    pub url: String,
    #[serde(default, rename = "isXHR")]
    pub is_xhr: bool,
    #[serde(default)]
    pub cause: Option<Cause>,
    #[serde(default)]
    pub from_cache: Option<bool>,
    #[serde(default)]
    pub from_service_worker: Option<bool>,
}

/// Partial update to a request.
///
/// These are the only fields an update may touch; anything else in the
/// payload (including `id`) is dropped while decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transferred_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_timings: Option<EventTimings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<HeaderList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_headers_from_upload_stream: Option<HeaderList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_cookies: Option<CookieList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_post_data: Option<RequestPostData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HeaderList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_cookies: Option<CookieList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content: Option<ResponseContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content_data_uri: Option<String>,
}

/// Events delivered by the network event source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NetworkEvent {
    /// A new request was observed
    Add { id: RequestId, data: NewRequest },

    /// More information about an already observed request
    Update { id: RequestId, data: RequestUpdate },

    /// The page navigated and the request list was reset
    Clear,
}

/// A recorded stream of network events plus the long string bodies they
/// reference, keyed by actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    pub events: Vec<NetworkEvent>,
    #[serde(default)]
    pub long_strings: HashMap<String, String>,
}

impl Capture {
    /// Serialize the capture to MessagePack bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Deserialize from MessagePack bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(rmp_serde::from_slice(data)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Constants for the protocol
pub mod constants {
    /// Suffix appended to the id of an editable copy of a request
    pub const CLONE_SUFFIX: &str = "-clone";

    /// Default mime type assumed when response content arrives without one
    pub const FALLBACK_MIME_TYPE: &str = "text/plain";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_id_helpers() {
        let id = RequestId::from("server1.conn0.netEvent42");
        let clone = id.clone_id();

        assert_eq!(clone.as_str(), "server1.conn0.netEvent42-clone");
        assert_eq!(clone.original_id(), Some(id.clone()));
        assert_eq!(id.original_id(), None);
    }

    #[test]
    fn test_update_ignores_unknown_fields() {
        let json = r#"{
            "type": "update",
            "id": "req-1",
            "data": { "id": "hijacked", "isCustom": true, "status": "200", "totalTime": 12.5 }
        }"#;

        let event: NetworkEvent = serde_json::from_str(json).unwrap();
        match event {
            NetworkEvent::Update { id, data } => {
                assert_eq!(id.as_str(), "req-1");
                assert_eq!(data.status.as_deref(), Some("200"));
                assert_eq!(data.total_time, Some(12.5));
                assert!(data.url.is_none());
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_long_string_forms() {
        let inline: LongString = serde_json::from_str(r#""a=1&b=2""#).unwrap();
        assert_eq!(inline, LongString::Inline("a=1&b=2".to_string()));

        let actor: LongString = serde_json::from_str(
            r#"{ "actor": "longstr7", "length": 70000, "initial": "iVBORw0KGgo" }"#,
        )
        .unwrap();
        assert!(matches!(
            actor,
            LongString::Actor { length: 70000, ref initial, .. } if initial == "iVBORw0KGgo"
        ));
    }

    #[test]
    fn test_capture_msgpack() {
        let mut capture = Capture::default();
        capture.events.push(NetworkEvent::Add {
            id: RequestId::from("a"),
            data: NewRequest {
                started_date_time: "2016-11-02T10:00:00.000Z".to_string(),
                method: "GET".to_string(),
                url: "https://example.com/logo.png".to_string(),
                ..Default::default()
            },
        });
        capture.events.push(NetworkEvent::Update {
            id: RequestId::from("a"),
            data: RequestUpdate {
                mime_type: Some("image/png".to_string()),
                response_content: Some(ResponseContent {
                    content: ContentBody {
                        mime_type: None,
                        text: LongString::Actor {
                            actor: "longstr1".to_string(),
                            length: 4,
                            initial: String::new(),
                        },
                        encoding: Some("base64".to_string()),
                    },
                    content_discarded: false,
                }),
                ..Default::default()
            },
        });
        capture.events.push(NetworkEvent::Clear);
        capture
            .long_strings
            .insert("longstr1".to_string(), "AAAA".to_string());

        let bytes = capture.to_bytes().unwrap();
        let decoded = Capture::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, capture);
    }

    #[test]
    fn test_header_list_size() {
        let list = HeaderList::new(vec![
            Header::new("Content-Type", "text/plain"),
            Header::new("X-Id", "7"),
        ]);

        assert_eq!(list.headers_size, (12 + 10 + 2) + (4 + 1 + 2));
        assert_eq!(list.get("content-type"), Some("text/plain"));
        assert_eq!(list.get("accept"), None);
    }

    #[test]
    fn test_cause_names() {
        assert_eq!(load_cause_string(11), "xhr");
        assert_eq!(load_cause_string(3), "img");
        assert_eq!(load_cause_string(999), "other");
    }
}
