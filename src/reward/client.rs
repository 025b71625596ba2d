use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use url::Url;

use super::{map_error_status, ClaimRequest, RewardAdConfig, RewardClaimResult, RewardError};
use crate::net::fetch::{build_client, with_auth, Redirects};

const API_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for `GET config` / `POST claim`.
pub struct RewardClient {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl RewardClient {
    /// Redirects are surfaced, not followed: the API answers unauthenticated
    /// calls with a redirect to the login page.
    pub fn new(base: Url, user_agent: &str, token: Option<String>) -> Result<Self, RewardError> {
        let http = build_client(user_agent, API_TIMEOUT, Redirects::Surface)
            .map_err(|e| RewardError::Network(e.to_string()))?;
        Ok(Self::with_client(http, base, token))
    }

    pub fn with_client(http: Client, mut base: Url, token: Option<String>) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { http, base, token }
    }

    fn endpoint(&self, name: &str) -> Result<Url, RewardError> {
        self.base
            .join(name)
            .map_err(|e| RewardError::Malformed(format!("bad endpoint {name}: {e}")))
    }

    pub fn config(&self) -> Result<RewardAdConfig, RewardError> {
        let url = self.endpoint("config")?;
        let request = self.http.get(url.as_str()).header(ACCEPT, "application/json");
        let response = with_auth(request, self.token.as_deref())
            .send()
            .map_err(|e| RewardError::Network(e.to_string()))?;
        decode(response)
    }

    pub fn claim(&self, claim: &ClaimRequest) -> Result<RewardClaimResult, RewardError> {
        let url = self.endpoint("claim")?;
        let request = self
            .http
            .post(url.as_str())
            .header(ACCEPT, "application/json")
            .json(claim);
        let response = with_auth(request, self.token.as_deref())
            .send()
            .map_err(|e| RewardError::Network(e.to_string()))?;
        let result: RewardClaimResult = decode(response)?;
        log::info!(
            "reward claimed: {} coins (transaction {})",
            result.coins_awarded,
            result.transaction_id
        );
        Ok(result)
    }
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RewardError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|e| RewardError::Network(e.to_string()))?;
    if !status.is_success() {
        log::warn!("reward API answered HTTP {}", status.as_u16());
        return Err(map_error_status(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| RewardError::Malformed(e.to_string()))
}
