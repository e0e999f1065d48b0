//! Authenticated HTTP client for Microsoft Graph.
//!
//! `GraphClient` wraps a `reqwest::Client` and a `TokenProvider` behind a
//! `Mutex`, exposing JSON helpers for the three call shapes the report
//! needs: a relative `get` for the first page of a collection, an absolute
//! `get_url` for following `@odata.nextLink` cursors, and `post` for the
//! `$batch` endpoint.
//!
//! Token lifecycle:
//! - Lazy acquisition: the first request with no cached token refreshes.
//! - Expiry-aware: an expired token reads as `None` and is refreshed.
//! - One-shot 401 retry: on `401 Unauthorized` the cached token is dropped,
//!   refreshed once, and the request retried once. A second 401 is returned
//!   to the caller as `GraphError::Api`.

use crate::auth::TokenProvider;
use crate::error::GraphError;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tokio::sync::Mutex;

/// Graph beta root. The co-management health fields on managed devices
/// are only exposed on beta.
pub const BASE_URL: &str = "https://graph.microsoft.com/beta/";

/// Covers TCP + TLS handshake only.
const API_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Full round-trip limit for a single page or batch call.
const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn build_api_client() -> crate::error::Result<Client> {
    Ok(Client::builder()
        .connect_timeout(API_CONNECT_TIMEOUT)
        .timeout(API_REQUEST_TIMEOUT)
        .build()?)
}

/// Authenticated HTTP client for the Graph REST API.
///
/// `auth` sits behind a `Mutex` because refreshing needs `&mut`. The lock
/// is held only for the token check/refresh, never across a request.
pub struct GraphClient {
    client: Client,
    base_url: String,
    auth: Mutex<TokenProvider>,
}

impl GraphClient {
    /// Creates a client against [`BASE_URL`].
    pub fn new(auth: TokenProvider) -> crate::error::Result<Self> {
        Self::with_base_url(auth, BASE_URL)
    }

    /// Points the client at a different root, e.g. a wiremock server or the
    /// `v1.0` endpoint. A trailing slash is added if missing.
    pub fn with_base_url(auth: TokenProvider, base_url: &str) -> crate::error::Result<Self> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Ok(GraphClient {
            client: build_api_client()?,
            base_url,
            auth: Mutex::new(auth),
        })
    }

    /// Root that relative paths are appended to, always ending in `/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn bearer_token(&self) -> crate::error::Result<String> {
        let mut auth = self.auth.lock().await;
        if auth.token().is_none() {
            auth.refresh_token().await?;
        }

        auth.token().map(str::to_owned).ok_or_else(|| GraphError::Auth {
            message: "token missing after refresh".to_string(),
            source: None,
        })
    }

    async fn force_refresh(&self) -> crate::error::Result<String> {
        let mut auth = self.auth.lock().await;
        auth.invalidate();
        auth.refresh_token().await?;

        auth.token().map(str::to_owned).ok_or_else(|| GraphError::Auth {
            message: "token missing after forced refresh".to_string(),
            source: None,
        })
    }

    /// Sends an authenticated JSON request to an absolute URL and
    /// deserializes the response.
    ///
    /// Non-2xx statuses other than a first 401 become `GraphError::Api`
    /// with the body text preserved. Nothing else is retried.
    async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> crate::error::Result<T> {
        let token = self.bearer_token().await?;
        let resp = self
            .build_request(method.clone(), url, &token, body)
            .send()
            .await?;

        let resp = if resp.status() == StatusCode::UNAUTHORIZED {
            let fresh_token = self.force_refresh().await?;
            self.build_request(method, url, &fresh_token, body)
                .send()
                .await?
        } else {
            resp
        };

        decode_json(resp).await
    }

    fn build_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&B>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, url).bearer_auth(token);
        if let Some(payload) = body {
            req = req.json(payload);
        }
        req
    }

    /// GET a path relative to the base URL.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> crate::error::Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.send_json::<T, ()>(Method::GET, &url, None).await
    }

    /// GET an absolute URL, as handed out in `@odata.nextLink`.
    pub async fn get_url<T: DeserializeOwned>(&self, url: &str) -> crate::error::Result<T> {
        self.send_json::<T, ()>(Method::GET, url, None).await
    }

    /// POST a JSON body to a path relative to the base URL.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> crate::error::Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.send_json(Method::POST, &url, Some(body)).await
    }
}

async fn decode_json<T: DeserializeOwned>(resp: Response) -> crate::error::Result<T> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(GraphError::Api { status, body: text });
    }
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let client =
            GraphClient::with_base_url(TokenProvider::with_token("t"), "http://localhost:1234")
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234/");
    }

    #[test]
    fn default_base_url_is_graph_beta() {
        let client = GraphClient::new(TokenProvider::with_token("t")).unwrap();
        assert_eq!(client.base_url(), "https://graph.microsoft.com/beta/");
    }
}
