//! "Book finished" celebration data.
//!
//! Built straight from the page payload, or enriched by a small API call
//! when the payload names one. Enrichment failures fall back to the
//! payload so the overlay always shows.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use reqwest::blocking::Client;
use serde_json::Value;
use url::Url;

use super::{first_int, first_str, BookFinishedPayload, COVER_KEYS, POINTS_KEYS, TITLE_KEYS};
use crate::app::ShellEvent;
use crate::context::AppContext;
use crate::net::fetch::{build_client, fetch_json, Redirects};

const DEFAULT_TITLE: &str = "Книга";
const NO_POINTS_TEXT: &str = "Книга прочитана!";
const REWARD_TEXT_KEYS: [&str; 3] = ["reward_text", "rewardText", "message"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CelebrationData {
    pub title: String,
    pub reward_text: String,
    pub cover_url: Option<String>,
}

impl CelebrationData {
    pub fn from_payload(payload: &BookFinishedPayload) -> Self {
        Self {
            title: payload
                .title
                .clone()
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            reward_text: reward_text(payload.points),
            cover_url: payload.cover_url.clone(),
        }
    }

    /// Overlay enrichment response fields on top of the payload.
    /// Accepts the fields at the top level or under `data`/`book`.
    pub fn from_response(payload: &BookFinishedPayload, response: &Value) -> Self {
        let mut data = Self::from_payload(payload);
        let scopes = [Some(response), response.get("data"), response.get("book")];

        for obj in scopes.into_iter().flatten().filter_map(Value::as_object) {
            if let Some(title) = first_str(obj, &TITLE_KEYS) {
                data.title = title;
            }
            if let Some(cover) = first_str(obj, &COVER_KEYS) {
                data.cover_url = Some(cover);
            }
            if let Some(text) = first_str(obj, &REWARD_TEXT_KEYS) {
                data.reward_text = text;
            } else if let Some(points) = first_int(obj, &POINTS_KEYS) {
                data.reward_text = reward_text(Some(points));
            }
        }
        data
    }

    /// Make a relative cover reference absolute against `base`.
    pub fn resolve_cover(&mut self, base: &Url) {
        if let Some(cover) = &self.cover_url {
            if let Ok(absolute) = base.join(cover) {
                self.cover_url = Some(absolute.to_string());
            }
        }
    }
}

/// `+5 баллов за чтение`, with Russian plural agreement.
pub fn reward_text(points: Option<i64>) -> String {
    match points {
        Some(n) if n > 0 => format!("+{n} {} за чтение", points_word(n)),
        Some(n) if n < 0 => format!("{n} {} за чтение", points_word(n)),
        _ => NO_POINTS_TEXT.to_string(),
    }
}

fn points_word(n: i64) -> &'static str {
    let n = n.unsigned_abs();
    match (n % 10, n % 100) {
        (_, 11..=14) => "баллов",
        (1, _) => "балл",
        (2..=4, _) => "балла",
        _ => "баллов",
    }
}

/// Fetch enrichment data; any failure returns the payload-only rendition.
pub fn enrich(
    client: &Client,
    api: &Url,
    token: Option<&str>,
    payload: &BookFinishedPayload,
) -> CelebrationData {
    match fetch_json(client, api, token) {
        Ok(response) => CelebrationData::from_response(payload, &response),
        Err(e) => {
            log::warn!("celebration enrichment via {api} failed: {e}");
            CelebrationData::from_payload(payload)
        }
    }
}

/// Runs enrichment on behalf of the controller.
pub trait Enricher {
    /// The result must arrive on `done` as [`ShellEvent::CelebrationReady`].
    fn start(&self, payload: BookFinishedPayload, api: Url, done: Sender<ShellEvent>);
}

/// Enrichment over HTTP on a background thread, with a short timeout.
pub struct HttpEnricher {
    ctx: Arc<AppContext>,
    client: Client,
}

impl HttpEnricher {
    pub fn new(ctx: Arc<AppContext>) -> Result<Self, crate::net::fetch::FetchError> {
        let client = build_client(
            &ctx.config.user_agent,
            ctx.config.enrichment_timeout,
            Redirects::Follow,
        )?;
        Ok(Self { ctx, client })
    }
}

impl Enricher for HttpEnricher {
    fn start(&self, payload: BookFinishedPayload, api: Url, done: Sender<ShellEvent>) {
        let ctx = Arc::clone(&self.ctx);
        let client = self.client.clone();

        std::thread::spawn(move || {
            let token = ctx.token();
            let data = enrich(&client, &api, token.as_deref(), &payload);
            let _ = done.send(ShellEvent::CelebrationReady(data));
        });
    }
}
