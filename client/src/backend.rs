//! Backend contract and its HTTP implementation.
//!
//! The engine only talks to the backend through [`Backend`], so the polling
//! and conversion logic can run against an in-memory double in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use feedwatch_common::config::Config;
use feedwatch_common::protocol::{NewStream, PlayResponse, Stream, StreamId};

use crate::error::BackendError;

/// Source of truth for streams and conversion sessions.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `GET /api/streams`
    async fn list_streams(&self) -> Result<Vec<Stream>, BackendError>;

    /// `POST /api/streams`
    async fn create_stream(&self, stream: &NewStream) -> Result<Stream, BackendError>;

    /// `POST /api/play/{id}`
    async fn start_conversion(&self, id: &StreamId) -> Result<PlayResponse, BackendError>;

    /// `POST /api/stop/{id}`
    async fn stop_conversion(&self, id: &StreamId) -> Result<(), BackendError>;
}

/// [`Backend`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(&config.backend_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request and return the body of a successful response.
    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, BackendError> {
        let request_err = |source| BackendError::Request {
            endpoint: endpoint.to_string(),
            source,
        };

        let resp = request.send().await.map_err(request_err)?;
        let status = resp.status();
        let body = resp.text().await.map_err(request_err)?;

        if !status.is_success() {
            return Err(BackendError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, BackendError> {
        serde_json::from_str(body).map_err(|source| BackendError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_streams(&self) -> Result<Vec<Stream>, BackendError> {
        let endpoint = "GET /api/streams";
        let body = self
            .send(endpoint, self.client.get(self.url("/api/streams")))
            .await?;
        let streams: Vec<Stream> = Self::decode(endpoint, &body)?;
        debug!("{endpoint}: {} stream(s)", streams.len());
        Ok(streams)
    }

    async fn create_stream(&self, stream: &NewStream) -> Result<Stream, BackendError> {
        let endpoint = "POST /api/streams";
        let body = self
            .send(endpoint, self.client.post(self.url("/api/streams")).json(stream))
            .await?;
        Self::decode(endpoint, &body)
    }

    async fn start_conversion(&self, id: &StreamId) -> Result<PlayResponse, BackendError> {
        let endpoint = format!("POST /api/play/{id}");
        let body = self
            .send(&endpoint, self.client.post(self.url(&format!("/api/play/{id}"))))
            .await?;
        Self::decode(&endpoint, &body)
    }

    async fn stop_conversion(&self, id: &StreamId) -> Result<(), BackendError> {
        let endpoint = format!("POST /api/stop/{id}");
        match self
            .send(&endpoint, self.client.post(self.url(&format!("/api/stop/{id}"))))
            .await
        {
            Ok(_) => Ok(()),
            // Nothing left to stop.
            Err(e) if e.is_not_found() => {
                debug!("{endpoint}: no active conversion");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

// ─── test double ─────────────────────────────────────────────────────────


// ─── tests ───────────────────────────────────────────────────────────────
