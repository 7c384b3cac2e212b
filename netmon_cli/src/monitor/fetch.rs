//! Resolving long string bodies and the helpers built on top of them

use async_trait::async_trait;
use base64::Engine;
use netmon_common::{Capture, Header, HeaderList, LongString};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Long string '{0}' is not available")]
    Missing(String),
}

/// Service resolving a [`LongString`] to its full text
#[async_trait]
pub trait BodyFetcher: Send + Sync {
    async fn get_string(&self, text: &LongString) -> Result<String, FetchError>;
}

/// Serves long strings recorded alongside a capture
#[derive(Debug, Clone, Default)]
pub struct CaptureFetcher {
    long_strings: HashMap<String, String>,
}

impl CaptureFetcher {
    pub fn new(long_strings: HashMap<String, String>) -> Self {
        Self { long_strings }
    }

    pub fn from_capture(capture: &Capture) -> Self {
        Self::new(capture.long_strings.clone())
    }
}

#[async_trait]
impl BodyFetcher for CaptureFetcher {
    async fn get_string(&self, text: &LongString) -> Result<String, FetchError> {
        match text {
            LongString::Inline(text) => Ok(text.clone()),
            LongString::Actor { actor, .. } => self
                .long_strings
                .get(actor)
                .cloned()
                .ok_or_else(|| FetchError::Missing(actor.clone())),
        }
    }
}

/// Build a `data:` URI for a response body. Bodies without a transfer
/// encoding are base64 encoded here.
pub fn form_data_uri(mime_type: &str, encoding: Option<&str>, text: &str) -> String {
    match encoding {
        Some(encoding) => format!("data:{};{},{}", mime_type, encoding, text),
        None => format!(
            "data:{};base64,{}",
            mime_type,
            base64::engine::general_purpose::STANDARD.encode(text)
        ),
    }
}

/// Headers at the top of a multipart upload stream.
///
/// The block ends at the first blank line; text starting with a boundary
/// (`---`) has none. Folded lines become extra headers under the previous
/// name.
pub fn headers_from_multipart_text(text: &str) -> Vec<Header> {
    let mut headers = Vec::new();
    if text.is_empty() || text.starts_with("---") {
        return headers;
    }
    let Some(end) = text.find("\r\n\r\n") else {
        return headers;
    };

    let mut last_name: Option<String> = None;
    for line in text[..end].split("\r\n") {
        if let Some(name) = &last_name {
            if line.starts_with(char::is_whitespace) {
                headers.push(Header::new(name.clone(), line.trim()));
                continue;
            }
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_string();
        headers.push(Header::new(name.clone(), value.trim()));
        last_name = Some(name);
    }
    headers
}

/// Upload stream headers with their accumulated size
pub fn upload_stream_headers(post_data: &str) -> HeaderList {
    HeaderList::new(headers_from_multipart_text(post_data))
}
