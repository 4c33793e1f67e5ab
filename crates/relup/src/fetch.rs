//! Pluggable GET transport.
//!
//! The updater reaches the network only through [`Requester`]. Production code
//! uses [`HttpRequester`]; tests script responses with [`ScriptedRequester`].

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

use crate::config::UpdaterConfig;
use crate::error::FetchError;

/// Response body handed back by a [`Requester`].
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait Requester: Send + Sync {
    /// GET `url` and return its body.
    ///
    /// `Ok(None)` means the transport claimed success but produced no body;
    /// the updater rejects that as [`FetchError::MissingStream`].
    async fn fetch(&self, url: &str) -> Result<Option<ByteStream>, FetchError>;
}

/// Wrap an in-memory buffer as a [`ByteStream`].
#[must_use]
pub fn stream_from_bytes(bytes: impl Into<Vec<u8>>) -> ByteStream {
    Box::pin(std::io::Cursor::new(bytes.into()))
}

/// Drain a body completely.
///
/// # Errors
/// Returns [`FetchError::Body`] if the underlying stream fails mid-read.
pub async fn read_body(url: &str, mut stream: ByteStream) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    stream
        .read_to_end(&mut body)
        .await
        .map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })?;
    Ok(body)
}

/// reqwest-backed requester that streams response bodies.
#[derive(Debug, Clone)]
pub struct HttpRequester {
    client: reqwest::Client,
}

impl HttpRequester {
    /// Build a client with the configured timeouts and user agent.
    ///
    /// # Errors
    /// Returns an error when the TLS backend or client cannot be initialized.
    pub fn new(config: &UpdaterConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Requester for HttpRequester {
    async fn fetch(&self, url: &str) -> Result<Option<ByteStream>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(
            "GET {url} -> {status} ({} bytes announced)",
            response
                .content_length()
                .map_or_else(|| "unknown".to_string(), |len| len.to_string())
        );

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Some(Box::pin(StreamReader::new(body))))
    }
}

type Handler = Box<dyn FnOnce(&str) -> Result<Option<ByteStream>, FetchError> + Send>;

/// Requester that answers from a queue of handlers, one per call, in order.
#[derive(Default)]
pub struct ScriptedRequester {
    handlers: Mutex<VecDeque<Handler>>,
    requested: Mutex<Vec<String>>,
}

impl ScriptedRequester {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_request<F>(&self, handler: F)
    where
        F: FnOnce(&str) -> Result<Option<ByteStream>, FetchError> + Send + 'static,
    {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Box::new(handler));
    }

    pub fn push_bytes(&self, body: impl Into<Vec<u8>>) {
        let body = body.into();
        self.handle_request(move |_| Ok(Some(stream_from_bytes(body))));
    }

    pub fn push_error(&self, details: impl Into<String>) {
        let details = details.into();
        self.handle_request(move |url| Err(FetchError::transport(url, details)));
    }

    /// URLs requested so far, in call order.
    #[must_use]
    pub fn requested_urls(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Requester for ScriptedRequester {
    async fn fetch(&self, url: &str) -> Result<Option<ByteStream>, FetchError> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let handler = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match handler {
            Some(handler) => handler(url),
            None => Err(FetchError::NoMoreHandlers {
                url: url.to_string(),
            }),
        }
    }
}
