//! Short-lived stream-authentication tokens.
//!
//! The event stream cannot carry the regular `Authorization` header, so each
//! connection attempt first exchanges the caller's API credentials for a token
//! that is passed in the stream URL's query string.

use async_trait::async_trait;
use log::*;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{token_error, Error, TokenErrorKind};

/// Path of the token endpoint, relative to the API base URL.
pub const TOKEN_PATH: &str = "/events/token";

/// Source of stream-authentication tokens. Called once per connection attempt.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<String, Error>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Requests stream tokens from the platform REST API with `POST /events/token`.
pub struct HttpTokenProvider {
    client: reqwest::Client,
    endpoint: String,
    bearer_token: Option<String>,
}

impl HttpTokenProvider {
    /// Builds a provider with its own HTTP client.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("learnstream/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Builds a provider on top of an already configured HTTP client, e.g. one
    /// that attaches the application's API credentials by default.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), TOKEN_PATH),
            bearer_token: None,
        }
    }

    /// Attaches `Authorization: Bearer <token>` to every token request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self) -> Result<String, Error> {
        debug!("Requesting event stream token from {}", self.endpoint);

        let mut request = self.client.post(&self.endpoint);
        if let Some(bearer) = &self.bearer_token {
            request = request.bearer_auth(bearer);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(token_error(
                TokenErrorKind::Rejected(status.as_u16()),
                &format!("token endpoint returned {status}"),
            ));
        }

        let body: TokenResponse = response.json().await?;
        if body.token.is_empty() {
            return Err(token_error(
                TokenErrorKind::InvalidResponse,
                "token endpoint returned an empty token",
            ));
        }

        Ok(body.token)
    }
}
