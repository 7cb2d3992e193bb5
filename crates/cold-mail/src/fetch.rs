/// Retrieval of career pages by URL.
use std::time::Duration;

use reqwest::Url;
use tracing::{debug, info};

use crate::error::FetchError;

pub const USER_AGENT: &str = "cold-email-generator";

pub struct DocumentFetcher {
    http: reqwest::Client,
    timeout: Duration,
}

impl DocumentFetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http, timeout })
    }

    /// GET `url` and return the body as text. Only http(s) URLs are accepted.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = parse_url(url)?;
        debug!(url = %parsed, "fetching page");

        let resp = self
            .http
            .get(parsed)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(|e| self.request_error(url, e))?;
        info!(url, bytes = body.len(), "page fetched");
        Ok(body)
    }

    fn request_error(&self, url: &str, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                source,
            }
        }
    }
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let parsed = Url::parse(url.trim()).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(invalid(format!("unsupported scheme `{other}`"))),
    }
}
