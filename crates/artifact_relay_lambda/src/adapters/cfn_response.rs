use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::adapters::fetch::FETCH_TIMEOUT;
use crate::handlers::clean_bucket::CustomResourceResponse;

/// Delivers the custom resource result back to CloudFormation.
pub trait ResponseSender {
    fn send(&self, response_url: &str, response: &CustomResourceResponse) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct HttpResponseSender {
    client: Client,
}

impl HttpResponseSender {
    pub fn new() -> Result<Self, String> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|error| format!("failed to build http client: {error}"))?;
        Ok(Self { client })
    }

    async fn put_response(&self, response_url: &str, body: String) -> Result<(), String> {
        // presigned response URLs are signed without a content type
        let response = self
            .client
            .put(response_url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await
            .map_err(|error| format!("failed to send custom resource response: {error}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!(
                "custom resource response rejected with status {}",
                status.as_u16()
            ));
        }
        Ok(())
    }
}

impl ResponseSender for HttpResponseSender {
    fn send(&self, response_url: &str, response: &CustomResourceResponse) -> Result<(), String> {
        let body = serde_json::to_string(response)
            .map_err(|error| format!("failed to serialize custom resource response: {error}"))?;

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(self.put_response(response_url, body))
        })
    }
}
