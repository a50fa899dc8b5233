//! Remote ingestion transport.

use crate::error::{AirqError, Result};
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Delivers one submission address to the remote endpoint.
///
/// `Ok` means the endpoint accepted the record. Every other outcome
/// (connection failure, non-success status) is an `Err` and the caller
/// decides whether to retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, uri: &Url) -> Result<()>;
}

/// HTTP GET of the submission address.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("airq_chords/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, uri: &Url) -> Result<()> {
        let response = self.client.get(uri.clone()).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AirqError::transport_error(format!(
                "{} responded {}",
                uri.host_str().unwrap_or("endpoint"),
                status
            )))
        }
    }
}
