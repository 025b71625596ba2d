//! Rewarded-ad gamification.
//!
//! `client` talks to the reward-ads API, `flow` runs the
//! fetch-config → show-ad → claim sequence in either simulated or live
//! mode.

pub mod client;
pub mod flow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-defined reward placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAdConfig {
    pub placement_id: String,
    pub reward_amount: i64,
    pub currency: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub requires_authentication: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClaimRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_unit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_id: Option<String>,
}

/// Outcome of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardClaimResult {
    pub transaction_id: String,
    pub coins_awarded: i64,
    #[serde(default)]
    pub balance_after: Option<i64>,
    #[serde(default)]
    pub unlimited_balance: bool,
    #[serde(default)]
    pub reward_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewardError {
    #[error("войдите в аккаунт, чтобы получить награду")]
    NotAuthenticated,
    #[error("награды за рекламу временно недоступны")]
    Disabled,
    #[error("{0}")]
    InvalidPayload(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Malformed(String),
}

const GENERIC_BAD_REQUEST: &str = "Некорректные данные запроса награды";

/// Map a non-success reward API response to a typed error.
pub fn map_error_status(status: u16, body: &str) -> RewardError {
    match status {
        300..=399 | 401 => RewardError::NotAuthenticated,
        503 => RewardError::Disabled,
        400 => RewardError::InvalidPayload(bad_request_message(body)),
        _ => RewardError::Network(format!("HTTP {status}")),
    }
}

fn bad_request_message(body: &str) -> String {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) else {
        return GENERIC_BAD_REQUEST.to_string();
    };
    let field = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let code = field("error").or_else(|| field("code"));
    match code {
        Some("ad_unit_mismatch") => {
            "Рекламный блок не совпадает с настройками награды".to_string()
        }
        Some("reward_mismatch") => "Награда не соответствует просмотренной рекламе".to_string(),
        Some("invalid_request") => "Некорректный запрос на начисление награды".to_string(),
        other => field("message")
            .or_else(|| field("detail"))
            .or(other)
            .unwrap_or(GENERIC_BAD_REQUEST)
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_unit_mismatch_is_invalid_payload() {
        let err = map_error_status(400, r#"{"error":"ad_unit_mismatch"}"#);
        assert_eq!(
            err,
            RewardError::InvalidPayload("Рекламный блок не совпадает с настройками награды".into())
        );
    }

    #[test]
    fn status_table() {
        assert_eq!(map_error_status(302, ""), RewardError::NotAuthenticated);
        assert_eq!(map_error_status(401, ""), RewardError::NotAuthenticated);
        assert_eq!(map_error_status(503, ""), RewardError::Disabled);
        assert_eq!(map_error_status(500, ""), RewardError::Network("HTTP 500".into()));
        assert_eq!(map_error_status(404, "{}"), RewardError::Network("HTTP 404".into()));
    }

    #[test]
    fn bad_request_fallbacks() {
        assert_eq!(
            map_error_status(400, r#"{"error":"quota","detail":"Лимит на сегодня исчерпан"}"#),
            RewardError::InvalidPayload("Лимит на сегодня исчерпан".into())
        );
        assert_eq!(
            map_error_status(400, r#"{"error":"quota"}"#),
            RewardError::InvalidPayload("quota".into())
        );
        assert_eq!(
            map_error_status(400, "<html>"),
            RewardError::InvalidPayload(GENERIC_BAD_REQUEST.into())
        );
    }

    #[test]
    fn dto_defaults() {
        let config: RewardAdConfig = serde_json::from_str(
            r#"{"placement_id":"rewarded_main","reward_amount":15,"currency":"coins"}"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert!(!config.requires_authentication);

        let claim: RewardClaimResult =
            serde_json::from_str(r#"{"transaction_id":"t-1","coins_awarded":15,"unlimited_balance":true}"#)
                .unwrap();
        assert_eq!(claim.balance_after, None);
        assert!(claim.unlimited_balance);

        let body = serde_json::to_string(&ClaimRequest {
            ad_unit_id: Some("unit".into()),
            reward_id: None,
        })
        .unwrap();
        assert_eq!(body, r#"{"ad_unit_id":"unit"}"#);
    }
}
