//! Readiness probe for the primary service

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// The probe got no HTTP response at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("probe of {url} failed: {message}")]
pub struct ProbeError {
    pub url: String,
    pub message: String,
}

#[async_trait]
pub trait Prober: Send + Sync {
    /// Issue a GET request. Any HTTP response, whatever its status, is `Ok`.
    async fn probe(&self, url: &str) -> Result<u16, ProbeError>;
}

/// Prober on top of `reqwest`
#[derive(Debug, Clone, Default)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> Result<u16, ProbeError> {
        let response = self.client.get(url).send().await.map_err(|e| ProbeError {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(response.status().as_u16())
    }
}
