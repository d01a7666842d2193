use std::time::Duration;

use reqwest::Client;

use crate::runtime::contract::FetchError;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads artifact bytes from a presigned location.
pub trait ArtifactFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Presigned URL client. Performs a single GET per call and never retries.
#[derive(Debug, Clone)]
pub struct HttpArtifactFetcher {
    client: Client,
}

impl HttpArtifactFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| FetchError::Network(format!("failed to build http client: {error}")))?;
        Ok(Self { client })
    }

    async fn fetch_body(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(network_error)? {
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

impl ArtifactFetcher for HttpArtifactFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(self.fetch_body(url))
        })
    }
}

fn network_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Network(format!("request timed out: {error}"))
    } else {
        FetchError::Network(error.to_string())
    }
}
