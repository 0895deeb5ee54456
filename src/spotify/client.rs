use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, header::RETRY_AFTER};
use serde_json::Value;

use crate::{error::ApiError, types::CurrentUser, utils};

/// Read access to the paginated library endpoints of the Web API.
///
/// The pager only depends on this trait, so tests can serve scripted pages
/// without an HTTP server. [`SpotifyClient`] is the production implementation.
#[async_trait]
pub trait LibraryApi: Send + Sync {
    /// Requests one page of `path` and returns the raw paging object.
    ///
    /// # Arguments
    ///
    /// * `path` - Endpoint path relative to the API base, e.g. `/me/playlists`
    /// * `access_token` - Bearer token sent in the `Authorization` header
    /// * `offset` - Index of the first item of the page
    /// * `limit` - Maximum number of items on the page
    ///
    /// # Returns
    ///
    /// The decoded JSON body. Item extraction is left to the caller because
    /// playlists and saved tracks nest their items differently.
    ///
    /// # Errors
    ///
    /// - [`ApiError::RateLimited`] for a 429 response, carrying `Retry-After`
    /// - [`ApiError::Unauthorized`] for a 401 response
    /// - [`ApiError::Status`] for any other non-success status
    /// - [`ApiError::Transport`] when the request could not be sent
    /// - [`ApiError::Decode`] when the body is not JSON
    async fn get_page(
        &self,
        path: &str,
        access_token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Value, ApiError>;
}

#[async_trait]
impl<T: LibraryApi + ?Sized> LibraryApi for Arc<T> {
    async fn get_page(
        &self,
        path: &str,
        access_token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Value, ApiError> {
        (**self).get_page(path, access_token, offset, limit).await
    }
}

/// HTTP client for the Spotify Web API.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: Client,
    api_url: String,
}

impl SpotifyClient {
    /// Creates a client for the API rooted at `api_url`.
    ///
    /// A trailing slash on `api_url` is ignored so endpoint paths can always
    /// start with `/`.
    ///
    /// # Example
    ///
    /// ```
    /// let client = SpotifyClient::new("https://api.spotify.com/v1/");
    /// let user = client.current_user(&token.access_token).await?;
    /// ```
    pub fn new(api_url: impl Into<String>) -> Self {
        SpotifyClient {
            http: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetches the profile of the user the access token belongs to.
    ///
    /// # Arguments
    ///
    /// * `access_token` - Bearer token of the signed-in user
    ///
    /// # Errors
    ///
    /// Fails with the same [`ApiError`] variants as [`LibraryApi::get_page`],
    /// with [`ApiError::Decode`] when the profile lacks required fields.
    pub async fn current_user(&self, access_token: &str) -> Result<CurrentUser, ApiError> {
        let url = format!("{uri}/me", uri = self.api_url);
        log::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        check_status(response)
            .await?
            .json::<CurrentUser>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LibraryApi for SpotifyClient {
    async fn get_page(
        &self,
        path: &str,
        access_token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Value, ApiError> {
        let url = format!("{uri}{path}", uri = self.api_url, path = path);
        log::debug!("GET {} offset={} limit={}", url, offset, limit);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("offset", offset), ("limit", limit)])
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        check_status(response)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = utils::parse_retry_after(
                response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            Err(ApiError::RateLimited { retry_after })
        }
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            })
        }
    }
}

// The Web API wraps errors as {"error": {"status": 500, "message": "..."}}.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
