//! Shared blocking HTTP plumbing.
//!
//! Every out-of-band request (downloads, celebration enrichment, reward
//! API) goes through a client built here so user agent, timeouts and
//! redirect handling stay consistent.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION};
use url::Url;

/// Upper bound on establishing a connection, independent of the total
/// request timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Error during an out-of-band fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("client error: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("failed to read body: {0}")]
    Body(String),
}

/// How the client treats redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirects {
    Follow,
    /// Surface 3xx responses to the caller (the reward API uses a redirect
    /// to the login page to signal a missing session).
    Surface,
}

/// Build a blocking client with the shell's user agent. `timeout` bounds
/// the whole request including the body read.
pub fn build_client(
    user_agent: &str,
    timeout: Duration,
    redirects: Redirects,
) -> Result<Client, FetchError> {
    let policy = match redirects {
        Redirects::Follow => reqwest::redirect::Policy::limited(10),
        Redirects::Surface => reqwest::redirect::Policy::none(),
    };
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .timeout(timeout)
        .redirect(policy)
        .build()
        .map_err(|e| FetchError::Client(e.to_string()))
}

/// Attach the session token, if any, as a bearer credential.
pub fn with_auth(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(t) if !t.is_empty() => request.header(AUTHORIZATION, format!("Bearer {t}")),
        _ => request,
    }
}

/// GET a URL and decode the body as arbitrary JSON.
pub fn fetch_json(
    client: &Client,
    url: &Url,
    token: Option<&str>,
) -> Result<serde_json::Value, FetchError> {
    let request = client
        .get(url.as_str())
        .header(ACCEPT, "application/json")
        .header(ACCEPT_LANGUAGE, "ru-RU,ru;q=0.9,en;q=0.8");
    let response = with_auth(request, token)
        .send()
        .map_err(|e| FetchError::Request(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    response
        .json::<serde_json::Value>()
        .map_err(|e| FetchError::Body(e.to_string()))
}

/// Content type of a response without parameters, lowercased.
pub fn content_type(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}
