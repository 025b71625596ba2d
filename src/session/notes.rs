//! Offline notes: short user-written texts kept on the device, newest first.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NOTES_FILE: &str = "offline_notes.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineNote {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotesError {
    #[error("note text is empty")]
    EmptyText,
    #[error("notes storage: {0}")]
    Io(#[from] io::Error),
    #[error("notes encoding: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct NoteStore {
    path: PathBuf,
    notes: Vec<OfflineNote>,
}

impl NoteStore {
    /// Load notes from `dir`. A missing or corrupt file yields an empty list.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(NOTES_FILE);
        let notes = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Vec<OfflineNote>>(&raw).unwrap_or_else(|e| {
                log::warn!("ignoring unreadable notes file {}: {e}", path.display());
                Vec::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                log::warn!("could not read {}: {e}", path.display());
                Vec::new()
            }
        };
        Self { path, notes }
    }

    /// Notes, newest first.
    pub fn list(&self) -> &[OfflineNote] {
        &self.notes
    }

    pub fn add(&mut self, text: &str) -> Result<OfflineNote, NotesError> {
        self.add_at(text, Utc::now())
    }

    pub fn add_at(&mut self, text: &str, now: DateTime<Utc>) -> Result<OfflineNote, NotesError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(NotesError::EmptyText);
        }

        let mut stamp = now.timestamp_millis();
        while self.notes.iter().any(|n| n.id == stamp.to_string()) {
            stamp += 1;
        }
        let note = OfflineNote {
            id: stamp.to_string(),
            text: text.to_string(),
            created_at: now,
        };

        self.notes.insert(0, note.clone());
        if let Err(e) = self.save() {
            self.notes.remove(0);
            return Err(e);
        }
        Ok(note)
    }

    /// Remove a note by id; `false` when no such note exists.
    pub fn delete(&mut self, id: &str) -> Result<bool, NotesError> {
        let Some(index) = self.notes.iter().position(|n| n.id == id) else {
            return Ok(false);
        };
        let removed = self.notes.remove(index);
        if let Err(e) = self.save() {
            self.notes.insert(index, removed);
            return Err(e);
        }
        Ok(true)
    }

    fn save(&self) -> Result<(), NotesError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.notes)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
