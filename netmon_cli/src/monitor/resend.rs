//! Edit-and-resend: turning an edited copy of a request into a new request

use super::fetch::{BodyFetcher, FetchError};
use super::store::Record;
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use netmon_common::{
    new_request_id, ContentBody, Header, HeaderList, LongString, NetworkEvent, NewRequest,
    RequestId, RequestPostData, RequestUpdate, ResponseContent,
};
use reqwest::{Client, Method};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Headers the HTTP client manages itself
const SKIPPED_HEADERS: [&str; 3] = ["host", "content-length", "transfer-encoding"];

#[derive(Debug, Error)]
pub enum ResendError {
    #[error("Invalid method '{0}'")]
    InvalidMethod(String),

    #[error("Request has no URL")]
    MissingUrl,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Event channel closed")]
    ChannelClosed,
}

/// The request to send, built from an edited copy
#[derive(Debug, Clone, PartialEq)]
pub struct CustomRequest {
    pub url: String,
    pub method: String,
    pub http_version: Option<String>,
    pub headers: Option<Vec<Header>>,
    pub body: Option<LongString>,
}

impl CustomRequest {
    pub fn from_record(record: &Record) -> Self {
        Self {
            url: record.url.clone().unwrap_or_default(),
            method: record.method.clone().unwrap_or_else(|| "GET".to_string()),
            http_version: record.http_version.clone(),
            headers: record.request_headers.as_ref().map(|h| h.headers.clone()),
            body: record
                .request_post_data
                .as_ref()
                .map(|p| p.post_data.text.clone()),
        }
    }
}

/// Changes made in the resend form. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomEdit {
    pub method: Option<String>,
    pub url: Option<String>,
    pub headers: Option<Vec<Header>>,
    pub body: Option<String>,
}

impl CustomEdit {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn into_update(self) -> RequestUpdate {
        RequestUpdate {
            method: self.method,
            url: self.url,
            request_headers: self.headers.map(HeaderList::new),
            request_post_data: self.body.map(RequestPostData::inline),
            ..Default::default()
        }
    }
}

/// Sends a custom request and reports the id it will be tracked under
#[async_trait]
pub trait ResendTransport: Send + Sync {
    async fn send(&self, request: CustomRequest) -> Result<RequestId, ResendError>;
}

/// Sends custom requests over HTTP and reports them to the panel as
/// ordinary network events.
pub struct HttpResendTransport {
    client: Client,
    fetcher: Arc<dyn BodyFetcher>,
    events: mpsc::Sender<NetworkEvent>,
}

impl HttpResendTransport {
    pub fn new(
        fetcher: Arc<dyn BodyFetcher>,
        events: mpsc::Sender<NetworkEvent>,
    ) -> Result<Self, ResendError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            fetcher,
            events,
        })
    }

    fn build_request(
        &self,
        request: &CustomRequest,
        body: Option<String>,
    ) -> Result<reqwest::Request, ResendError> {
        if request.url.is_empty() {
            return Err(ResendError::MissingUrl);
        }
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ResendError::InvalidMethod(request.method.clone()))?;

        let mut builder = self.client.request(method, &request.url);
        for header in request.headers.iter().flatten() {
            if SKIPPED_HEADERS
                .iter()
                .any(|skipped| header.name.eq_ignore_ascii_case(skipped))
            {
                continue;
            }
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        Ok(builder.build()?)
    }

    async fn report(&self, event: NetworkEvent) -> Result<(), ResendError> {
        self.events
            .send(event)
            .await
            .map_err(|_| ResendError::ChannelClosed)
    }
}

#[async_trait]
impl ResendTransport for HttpResendTransport {
    async fn send(&self, request: CustomRequest) -> Result<RequestId, ResendError> {
        let body = match &request.body {
            Some(text) => Some(self.fetcher.get_string(text).await?),
            None => None,
        };
        let http_request = self.build_request(&request, body.clone())?;

        let id = new_request_id();
        debug!("{} {} as {}", request.method, request.url, id);

        self.report(NetworkEvent::Add {
            id: id.clone(),
            data: NewRequest {
                started_date_time: Utc::now().to_rfc3339(),
                method: request.method.clone(),
                url: request.url.clone(),
                ..Default::default()
            },
        })
        .await?;
        self.report(NetworkEvent::Update {
            id: id.clone(),
            data: RequestUpdate {
                request_headers: request.headers.clone().map(HeaderList::new),
                request_post_data: body.map(RequestPostData::inline),
                ..Default::default()
            },
        })
        .await?;

        let started = Instant::now();
        let response = self.client.execute(http_request).await?;

        let status = response.status();
        let http_version = format!("{:?}", response.version());
        let response_headers = HeaderList::new(
            response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| Header::new(name.as_str(), value))
                })
                .collect(),
        );
        let mime_type = response_headers.get("content-type").map(str::to_string);
        let bytes = response.bytes().await?;
        let total_time = started.elapsed().as_secs_f64() * 1000.0;

        let content_size = bytes.len() as u64;
        let (text, encoding) = match String::from_utf8(bytes.to_vec()) {
            Ok(text) => (text, None),
            Err(_) => (
                base64::engine::general_purpose::STANDARD.encode(&bytes),
                Some("base64".to_string()),
            ),
        };

        self.report(NetworkEvent::Update {
            id: id.clone(),
            data: RequestUpdate {
                status: Some(status.as_u16().to_string()),
                status_text: status.canonical_reason().map(str::to_string),
                http_version: Some(http_version),
                transferred_size: Some(response_headers.headers_size + content_size),
                response_headers: Some(response_headers),
                mime_type: mime_type.clone(),
                content_size: Some(content_size),
                response_content: Some(ResponseContent {
                    content: ContentBody {
                        mime_type,
                        text: LongString::Inline(text),
                        encoding,
                    },
                    content_discarded: false,
                }),
                total_time: Some(total_time),
                ..Default::default()
            },
        })
        .await?;

        Ok(id)
    }
}
