//! Locally persisted session state: terms acceptance and offline notes.

pub mod notes;
pub mod terms;
