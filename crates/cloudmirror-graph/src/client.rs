//! Microsoft Graph API client
//!
//! Provides a typed HTTP client for interacting with the Microsoft Graph API.
//! Handles authentication headers, endpoint construction, and turning error
//! statuses into [`GraphError`] values.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cloudmirror_graph::client::GraphClient;
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), cloudmirror_graph::GraphError> {
//! let client = GraphClient::new("access-token-here");
//! let url = client.endpoint(&["me", "drive", "items", "root"])?;
//! let response = client.send(client.request_url(Method::GET, url)).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, warn};
use url::Url;

use crate::GraphError;

/// Base URL for Microsoft Graph API v1.0
const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default retry-after duration when header is missing (30 seconds)
pub(crate) const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

// ============================================================================
// Error body
// ============================================================================

/// `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Extracts a readable message from a Graph error body
///
/// Falls back to the raw text when the body is not the usual envelope.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => match (error.code, error.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code,
            (None, Some(message)) => message,
            (None, None) => body.to_string(),
        },
        Err(_) => body.trim().to_string(),
    }
}

/// Parses a `Retry-After` header value
///
/// Supports both integer seconds and HTTP-date formats. Falls back to
/// `default` when the value cannot be parsed.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Ok(secs) = u64::try_from((target - now).num_seconds()) {
                return Duration::from_secs(secs.min(3600));
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

// ============================================================================
// GraphClient
// ============================================================================

/// HTTP client for Microsoft Graph API calls
///
/// Wraps `reqwest::Client` with authentication headers and base URL
/// construction for the Microsoft Graph API.
#[derive(Debug, Clone)]
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Current OAuth2 access token
    access_token: String,
}

impl GraphClient {
    /// Creates a new GraphClient with the given access token
    ///
    /// # Arguments
    /// * `access_token` - A valid OAuth2 access token for Microsoft Graph
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, GRAPH_BASE_URL)
    }

    /// Creates a new GraphClient with a custom base URL (useful for testing)
    ///
    /// # Arguments
    /// * `access_token` - A valid OAuth2 access token
    /// * `base_url` - Custom base URL for API requests
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Updates the access token (e.g., after a token refresh)
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
        debug!("Updated GraphClient access token");
    }

    /// Returns a reference to the current access token
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// Automatically prepends the base URL and adds the Authorization header.
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, PUT, DELETE, etc.)
    /// * `path` - API path relative to base URL (e.g., "/me/drive")
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.access_token)
    }

    /// Creates an authenticated request builder for an absolute URL
    ///
    /// Used for endpoints built with [`endpoint`](Self::endpoint) and for
    /// `@odata.nextLink` page URLs.
    pub fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.access_token)
    }

    /// Creates an unauthenticated request builder
    ///
    /// Upload session URLs are pre-authenticated; sending a bearer token to
    /// them is rejected by the service.
    pub fn request_unauthenticated(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Builds an API URL from path segments, percent-encoding each one
    ///
    /// Segments may contain any character a file name can; `/`, `#`, `?`,
    /// `%` and spaces are escaped.
    ///
    /// # Errors
    /// Returns [`GraphError::InvalidResponse`] if the base URL cannot carry
    /// path segments.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, GraphError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GraphError::InvalidResponse(format!("bad base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| {
                GraphError::InvalidResponse(format!("base URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a request and turns non-success statuses into errors
    ///
    /// # Errors
    /// - [`GraphError::NetworkError`] if the request could not be sent
    /// - A status-classified [`GraphError`] for any non-2xx response
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, GraphError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER));
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);

        debug!(status = status.as_u16(), %message, "Graph request failed");
        Err(GraphError::from_status(status, message, retry_after))
    }

    /// Sends a request and deserializes a JSON success body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GraphError> {
        let response = self.send(request).await?;
        parse_json(response).await
    }
}

/// Deserializes a response body, reporting malformed JSON as an invalid response
pub(crate) async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, GraphError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GraphError::InvalidResponse(format!("malformed JSON body: {e}")))
}
