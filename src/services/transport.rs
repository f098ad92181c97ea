//! Single-request HTTP transport.
//!
//! Issues one GET, lets the client undo gzip/deflate, and classifies the
//! response. Retrying is someone else's job.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::Result;
use crate::models::HttpConfig;
use crate::utils::http::create_async_client;

/// Classified result of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// HTTP 200 with a decoded body
    Success(Vec<u8>),
    /// HTTP 200 with nothing in it; terminal for this target
    Empty,
    /// HTTP 429
    RateLimited,
    /// HTTP 401
    Unauthorized,
    /// Anything else: network, timeout, decode failure, other status
    TransientError(String),
}

impl FetchOutcome {
    /// Classify a status code and (already decoded) body.
    pub fn classify(status: StatusCode, body: std::result::Result<Vec<u8>, String>) -> Self {
        match status {
            StatusCode::OK => match body {
                Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Self::Empty,
                Ok(bytes) => Self::Success(bytes),
                Err(cause) => Self::TransientError(format!("body decode failed: {cause}")),
            },
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            StatusCode::UNAUTHORIZED => Self::Unauthorized,
            other => Self::TransientError(format!("HTTP {}", other.as_u16())),
        }
    }
}

/// Something that can perform one fetch.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// reqwest-backed transport with a fixed header bag.
#[derive(Debug, Clone)]
pub struct TransportClient {
    client: Client,
}

impl TransportClient {
    /// Build the client; headers are fixed for its lifetime.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }
}

#[async_trait]
impl Transport for TransportClient {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::TransientError(e.to_string()),
        };
        let status = response.status();
        if status != StatusCode::OK {
            return FetchOutcome::classify(status, Ok(Vec::new()));
        }
        let body = response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| e.to_string());
        FetchOutcome::classify(status, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_statuses() {
        assert_eq!(
            FetchOutcome::classify(StatusCode::OK, Ok(b"{}".to_vec())),
            FetchOutcome::Success(b"{}".to_vec())
        );
        assert_eq!(
            FetchOutcome::classify(StatusCode::OK, Ok(b" \n".to_vec())),
            FetchOutcome::Empty
        );
        assert_eq!(
            FetchOutcome::classify(StatusCode::TOO_MANY_REQUESTS, Ok(Vec::new())),
            FetchOutcome::RateLimited
        );
        assert_eq!(
            FetchOutcome::classify(StatusCode::UNAUTHORIZED, Ok(Vec::new())),
            FetchOutcome::Unauthorized
        );
        assert!(matches!(
            FetchOutcome::classify(StatusCode::NO_CONTENT, Ok(Vec::new())),
            FetchOutcome::TransientError(_)
        ));
        assert!(matches!(
            FetchOutcome::classify(StatusCode::OK, Err("corrupt deflate stream".into())),
            FetchOutcome::TransientError(cause) if cause.contains("corrupt")
        ));
    }
}
