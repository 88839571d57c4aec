//! Remote resource retrieval.
//!
//! [`ResourceFetcher`] is the seam between assembly and the network. The
//! production implementation is [`HttpFetcher`]; tests substitute doubles.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use avatarforge_core::config::fetch::FetchConfig;
use avatarforge_core::error::AppError;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Url;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::error::ConversionError;

/// Retrieves remote resources. Never retries.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Stream `url` into `dest`, overwriting it, and return `dest`.
    ///
    /// On a non-success status `dest` is never created. On a transport
    /// failure after the file was created, the partial file is removed.
    async fn fetch_to_file(&self, url: &Url, dest: &Path) -> Result<PathBuf, ConversionError>;

    /// Read `url` fully into memory.
    async fn fetch_bytes(&self, url: &Url) -> Result<Bytes, ConversionError>;
}

/// HTTP(S) fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    /// Build a fetcher from configuration.
    pub fn new(config: &FetchConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_bytes: config.max_resource_bytes,
        })
    }

    /// Largest accepted body, in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    async fn send(&self, url: &Url) -> Result<reqwest::Response, ConversionError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ConversionError::FetchTransport {
                uri: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConversionError::FetchStatus {
                uri: url.to_string(),
                status: status.to_string(),
            });
        }

        if let Some(len) = response.content_length()
            && len > self.max_bytes
        {
            return Err(ConversionError::ResourceTooLarge {
                uri: url.to_string(),
                limit: self.max_bytes,
            });
        }

        Ok(response)
    }

    async fn stream_to_file(
        &self,
        url: &Url,
        response: reqwest::Response,
        dest: &Path,
    ) -> Result<u64, ConversionError> {
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| ConversionError::FetchTransport {
                uri: url.to_string(),
                source,
            })?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(ConversionError::ResourceTooLarge {
                    uri: url.to_string(),
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    #[instrument(skip(self), fields(url = %url, dest = %dest.display()))]
    async fn fetch_to_file(&self, url: &Url, dest: &Path) -> Result<PathBuf, ConversionError> {
        let response = self.send(url).await?;

        match self.stream_to_file(url, response, dest).await {
            Ok(written) => {
                debug!(bytes = written, "Resource downloaded");
                Ok(dest.to_path_buf())
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(dest).await
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(error = %remove_err, "Failed to remove partial download");
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_bytes(&self, url: &Url) -> Result<Bytes, ConversionError> {
        let response = self.send(url).await?;
        let mut stream = response.bytes_stream();
        let mut buf = BytesMut::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| ConversionError::FetchTransport {
                uri: url.to_string(),
                source,
            })?;
            if (buf.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(ConversionError::ResourceTooLarge {
                    uri: url.to_string(),
                    limit: self.max_bytes,
                });
            }
            buf.extend_from_slice(&chunk);
        }

        debug!(bytes = buf.len(), "Resource read");
        Ok(buf.freeze())
    }
}
