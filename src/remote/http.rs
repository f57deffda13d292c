//! reqwest implementation of [`RemoteApi`].

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{RemoteApi, Session};
use crate::config::ServerConfig;
use crate::error::RemoteError;

/// HTTP client for the HoopTutor server
#[derive(Clone)]
pub struct HttpRemote {
  client: reqwest::Client,
  base: Url,
  config: ServerConfig,
  session_cookie: Option<String>,
}

impl HttpRemote {
  pub fn new(config: &ServerConfig, session_cookie: Option<String>) -> Result<Self> {
    let base =
      Url::parse(&config.url).map_err(|e| eyre!("Invalid server url {}: {}", config.url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      config: config.clone(),
      session_cookie,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
    self
      .base
      .join(path)
      .map_err(|e| RemoteError::Network(format!("invalid endpoint {}: {}", path, e)))
  }

  fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, RemoteError> {
    let url = self.endpoint(path)?;
    debug!(%method, %url, "remote request");

    let builder = self.client.request(method, url);
    Ok(match &self.session_cookie {
      Some(cookie) => builder.header(reqwest::header::COOKIE, cookie),
      None => builder,
    })
  }

  async fn send(builder: RequestBuilder) -> Result<reqwest::Response, RemoteError> {
    let response = builder.send().await?;
    check_status(response.status())?;
    Ok(response)
  }

  async fn get_json(&self, path: &str) -> Result<Value, RemoteError> {
    let response = Self::send(self.request(Method::GET, path)?).await?;
    response
      .json::<Value>()
      .await
      .map_err(|e| RemoteError::Decode(e.to_string()))
  }
}

/// Map an HTTP status onto the remote error taxonomy.
fn check_status(status: StatusCode) -> Result<(), RemoteError> {
  if status == StatusCode::UNAUTHORIZED {
    Err(RemoteError::Unauthorized)
  } else if !status.is_success() {
    Err(RemoteError::Status(status.as_u16()))
  } else {
    Ok(())
  }
}

impl RemoteApi for HttpRemote {
  fn fetch_session(&self) -> BoxFuture<'_, Result<Session, RemoteError>> {
    Box::pin(async move {
      let value = self.get_json(&self.config.session_path).await?;
      serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))
    })
  }

  fn push_favorites(&self, favorites: Vec<String>) -> BoxFuture<'_, Result<(), RemoteError>> {
    Box::pin(async move {
      let builder = self
        .request(Method::PUT, &self.config.favorites_path)?
        .json(&json!({ "favorites": favorites }));
      Self::send(builder).await?;
      Ok(())
    })
  }

  fn fetch_catalogue(&self) -> BoxFuture<'_, Result<Value, RemoteError>> {
    Box::pin(async move { self.get_json(&self.config.catalog_path).await })
  }

  fn logout(&self) -> BoxFuture<'_, Result<(), RemoteError>> {
    Box::pin(async move {
      Self::send(self.request(Method::POST, &self.config.logout_path)?).await?;
      Ok(())
    })
  }
}
