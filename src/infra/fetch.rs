//! HTTP retrieval of source images.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Client;
use tracing::debug;

use crate::application::jobs::{FetchError, ImageFetcher};

use super::error::InfraError;

const SOURCE: &str = "infra::fetch";

/// `reqwest`-backed fetcher with a per-request timeout and a body size cap.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
    max_body_bytes: u64,
}

impl HttpImageFetcher {
    pub fn new(
        timeout: Duration,
        max_body_bytes: u64,
        user_agent: &str,
    ) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            client,
            max_body_bytes,
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let limit = self.max_body_bytes;
        if response.content_length().is_some_and(|length| length > limit) {
            return Err(FetchError::TooLarge { limit });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?
        {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(target = SOURCE, url, bytes = body.len(), "fetched source image");
        Ok(body.freeze())
    }
}
