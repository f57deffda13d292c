//! reqwest-backed [`Fetcher`].

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::debug;

use super::traits::{Fetcher, Request, Response};
use crate::error::FetchError;

#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(timeout: Duration, session_cookie: Option<&str>) -> Result<Self> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(cookie) = session_cookie {
      let value = reqwest::header::HeaderValue::from_str(cookie)
        .map_err(|e| eyre!("Invalid session cookie: {}", e))?;
      headers.insert(reqwest::header::COOKIE, value);
    }

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }

  async fn send(&self, request: &Request) -> Result<Response, reqwest::Error> {
    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(str::to_string);
    let url = response.url().to_string();
    let body = response.bytes().await?.to_vec();

    debug!(%url, status, bytes = body.len(), "fetched");
    Ok(Response {
      url,
      status,
      content_type,
      body,
    })
  }
}

impl Fetcher for HttpFetcher {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
    Box::pin(async move {
      self.send(request).await.map_err(|e| FetchError::Network {
        url: request.url.to_string(),
        reason: e.to_string(),
      })
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rejects_invalid_cookie() {
    assert!(HttpFetcher::new(Duration::from_secs(1), Some("bad\ncookie")).is_err());
    assert!(HttpFetcher::new(Duration::from_secs(1), Some("session=abc")).is_ok());
  }
}
