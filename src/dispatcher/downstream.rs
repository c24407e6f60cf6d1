use async_trait::async_trait;
use reqwest::{Method, header::CONTENT_TYPE};
use serde_json::Value;
use thiserror::Error;

use crate::types::ServiceInstance;

#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("failed to build downstream client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {replica} failed: {source}")]
    Transport {
        replica: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{replica} returned status {status}")]
    Status {
        replica: String,
        status: u16,
        body: String,
    },
}

/// One logical request, addressed relative to whichever replica serves it.
#[derive(Debug, Clone, PartialEq)]
pub struct DownstreamRequest {
    pub method: Method,
    /// Path plus optional query string, starting with `/`.
    pub path: String,
    pub body: Option<Value>,
}

impl DownstreamRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path, Some(body))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamResponse {
    pub status: u16,
    /// `Content-Type` reported by the replica, if any.
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl DownstreamResponse {
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// The capability of sending one request to one replica. Anything other
/// than a 2xx response is an error.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn call(
        &self,
        replica: &ServiceInstance,
        request: &DownstreamRequest,
    ) -> Result<DownstreamResponse, DownstreamError>;
}

/// Plain HTTP/JSON downstream. Per-call timeouts come from the breaker.
#[derive(Debug, Clone)]
pub struct HttpDownstream {
    client: reqwest::Client,
}

impl HttpDownstream {
    pub fn new() -> Result<Self, DownstreamError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(DownstreamError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Downstream for HttpDownstream {
    async fn call(
        &self,
        replica: &ServiceInstance,
        request: &DownstreamRequest,
    ) -> Result<DownstreamResponse, DownstreamError> {
        let url = format!("{}{}", replica.base_url(), request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| DownstreamError::Transport {
                replica: replica.endpoint(),
                source,
            })?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|source| DownstreamError::Transport {
                replica: replica.endpoint(),
                source,
            })?;

        if !status.is_success() {
            return Err(DownstreamError::Status {
                replica: replica.endpoint(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(DownstreamResponse {
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
        })
    }
}
