//! In-page → app message channel.
//!
//! The site posts small JSON objects to the shell. Field aliases are
//! resolved here, once, into canonical payload types; nothing downstream
//! looks at raw keys.

pub mod celebration;

use serde_json::{Map, Value};

const KIND_KEYS: [&str; 2] = ["type", "event"];
const API_KEYS: [&str; 3] = ["api_url", "apiUrl", "api"];
pub(crate) const POINTS_KEYS: [&str; 3] = ["points", "reward", "coins"];
pub(crate) const TITLE_KEYS: [&str; 2] = ["title", "bookTitle"];
pub(crate) const COVER_KEYS: [&str; 3] = ["cover", "cover_url", "coverUrl"];

/// A recognised message from the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMessage {
    BookFinished(BookFinishedPayload),
    /// Well-formed but not handled by the shell.
    Other { kind: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFinishedPayload {
    pub title: Option<String>,
    pub points: Option<i64>,
    pub api_url: Option<String>,
    pub cover_url: Option<String>,
}

impl PageMessage {
    /// Parse a raw channel message. Anything unusable yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("dropping non-JSON page message: {e}");
                return None;
            }
        };
        // Some bridges double-encode the payload as a JSON string.
        if let Value::String(inner) = &value {
            value = serde_json::from_str(inner).ok()?;
        }

        let obj = value.as_object()?;
        let kind = first_str(obj, &KIND_KEYS)?;
        if normalize_kind(&kind).starts_with("bookfinished") {
            Some(PageMessage::BookFinished(BookFinishedPayload::from_object(obj)))
        } else {
            Some(PageMessage::Other { kind })
        }
    }
}

impl BookFinishedPayload {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            title: first_str(obj, &TITLE_KEYS),
            points: first_int(obj, &POINTS_KEYS),
            api_url: first_str(obj, &API_KEYS),
            cover_url: first_str(obj, &COVER_KEYS),
        }
    }
}

/// Lowercase and strip separators: `Book-Finished` → `bookfinished`.
fn normalize_kind(kind: &str) -> String {
    kind.chars()
        .filter(|c| !matches!(c, '_' | '-' | '.' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// First non-blank string under any of `keys`.
pub(crate) fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// First integer under any of `keys`; numeric strings count.
pub(crate) fn first_int(obj: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}
