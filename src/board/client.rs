use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no cookie in handshake response")]
    NoCookie,
}

/// Outgoing HTTP to the board, presenting the browser identity and auth cookie.
#[derive(Clone)]
pub struct BoardClient {
    http: reqwest::Client,
    user_agent: String,
    auth_cookie: String,
    auth_token: Option<String>,
}

impl BoardClient {
    pub fn new(config: &Config) -> Result<Self, BoardError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.fetch_timeout)
            .build()?;

        Ok(Self {
            http,
            user_agent: config.user_agent.clone(),
            auth_cookie: config.auth_cookie.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Performs the initial handshake against `url` and keeps the first
    /// cookie the origin hands out as the auth token.
    pub async fn acquire_token(&mut self, url: &str) -> Result<(), BoardError> {
        let res = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let token = res
            .cookies()
            .next()
            .map(|c| c.value().to_string())
            .ok_or(BoardError::NoCookie)?;

        info!("Acquired auth token from {}", url);
        self.auth_token = Some(token);
        Ok(())
    }

    /// Sends an authenticated GET. Errors only on transport or URL failures;
    /// the status is left to the caller.
    pub async fn get(&self, url: &str) -> Result<Response, reqwest::Error> {
        let mut req = self.http.get(url).header(USER_AGENT, &self.user_agent);
        if let Some(token) = &self.auth_token {
            req = req.header(COOKIE, format!("{}={}", self.auth_cookie, token));
        }
        req.send().await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, BoardError> {
        let res = self.get(url).await?;
        if res.status() != StatusCode::OK {
            warn!("GET {} returned {}", url, res.status());
            return Err(BoardError::Status(res.status()));
        }
        let body = res.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
