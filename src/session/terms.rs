//! One-time terms acceptance gate, checked at every cold start before the
//! first page load.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MARKER_FILE: &str = "terms_accepted.json";

/// Durable storage for the acceptance marker.
pub trait MarkerStore {
    fn exists(&self) -> io::Result<bool>;
    fn write(&self, accepted_at: DateTime<Utc>) -> io::Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct MarkerRecord {
    accepted_at: DateTime<Utc>,
}

/// Marker kept as a small JSON file in the support directory.
pub struct FileMarker {
    path: PathBuf,
}

impl FileMarker {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(MARKER_FILE),
        }
    }

    /// When the terms were accepted, if the marker is readable.
    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        let raw = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str::<MarkerRecord>(&raw)
            .ok()
            .map(|r| r.accepted_at)
    }
}

impl MarkerStore for FileMarker {
    fn exists(&self) -> io::Result<bool> {
        self.path.try_exists()
    }

    fn write(&self, accepted_at: DateTime<Utc>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string(&MarkerRecord { accepted_at })?;
        fs::write(&self.path, body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentAnswer {
    Accept,
    Decline,
    /// The prompt closed without an explicit answer; it is shown again.
    Dismissed,
}

/// Blocking, non-dismissible consent dialog.
pub trait ConsentPrompt {
    fn ask(&mut self) -> ConsentAnswer;
}

/// Ends the application after the user declines.
pub trait Terminator {
    fn terminate(&mut self);
}

pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&mut self) {
        log::info!("terms declined, exiting");
        std::process::exit(0);
    }
}

pub struct TermsGate<S, P, T> {
    store: S,
    prompt: P,
    terminator: T,
}

impl<S: MarkerStore, P: ConsentPrompt, T: Terminator> TermsGate<S, P, T> {
    pub fn new(store: S, prompt: P, terminator: T) -> Self {
        Self {
            store,
            prompt,
            terminator,
        }
    }

    /// `true` once the terms are accepted. Declining terminates the app.
    pub fn ensure_accepted(&mut self) -> bool {
        match self.store.exists() {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                log::warn!("terms marker check failed ({e}), continuing");
                return true;
            }
        }

        loop {
            match self.prompt.ask() {
                ConsentAnswer::Accept => {
                    if let Err(e) = self.store.write(Utc::now()) {
                        log::warn!("could not persist terms acceptance: {e}");
                    }
                    return true;
                }
                ConsentAnswer::Decline => {
                    self.terminator.terminate();
                    return false;
                }
                ConsentAnswer::Dismissed => continue,
            }
        }
    }

    pub fn into_parts(self) -> (S, P, T) {
        (self.store, self.prompt, self.terminator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<ConsentAnswer>, usize);

    impl ConsentPrompt for Scripted {
        fn ask(&mut self) -> ConsentAnswer {
            self.1 += 1;
            self.0.pop_front().unwrap_or(ConsentAnswer::Dismissed)
        }
    }

    fn scripted(answers: &[ConsentAnswer]) -> Scripted {
        Scripted(answers.iter().copied().collect(), 0)
    }

    #[derive(Default)]
    struct Recorder(Cell<bool>);

    impl Terminator for &Recorder {
        fn terminate(&mut self) {
            self.0.set(true);
        }
    }

    struct CountingStore {
        present: Cell<bool>,
        writes: Cell<usize>,
    }

    impl MarkerStore for &CountingStore {
        fn exists(&self) -> io::Result<bool> {
            Ok(self.present.get())
        }
        fn write(&self, _: DateTime<Utc>) -> io::Result<()> {
            self.writes.set(self.writes.get() + 1);
            self.present.set(true);
            Ok(())
        }
    }

    struct BrokenStore;

    impl MarkerStore for BrokenStore {
        fn exists(&self) -> io::Result<bool> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
        }
        fn write(&self, _: DateTime<Utc>) -> io::Result<()> {
            unreachable!("fail-open path never writes")
        }
    }

    #[test]
    fn accept_persists_marker_file() {
        let dir = tempfile::tempdir().unwrap();
        let exit = Recorder::default();
        let mut gate = TermsGate::new(
            FileMarker::in_dir(dir.path()),
            scripted(&[ConsentAnswer::Dismissed, ConsentAnswer::Accept]),
            &exit,
        );
        assert!(gate.ensure_accepted());
        assert!(!exit.0.get());

        let (store, prompt, _) = gate.into_parts();
        assert_eq!(prompt.1, 2);
        assert!(store.exists().unwrap());
        assert!(store.accepted_at().is_some());
    }

    #[test]
    fn second_check_is_a_no_op() {
        let store = CountingStore {
            present: Cell::new(false),
            writes: Cell::new(0),
        };
        let exit = Recorder::default();
        let mut gate = TermsGate::new(&store, scripted(&[ConsentAnswer::Accept]), &exit);
        assert!(gate.ensure_accepted());
        assert!(gate.ensure_accepted());
        assert!(gate.ensure_accepted());

        let (_, prompt, _) = gate.into_parts();
        assert_eq!(prompt.1, 1);
        assert_eq!(store.writes.get(), 1);
    }

    #[test]
    fn decline_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let exit = Recorder::default();
        let mut gate = TermsGate::new(
            FileMarker::in_dir(dir.path()),
            scripted(&[ConsentAnswer::Decline]),
            &exit,
        );
        assert!(!gate.ensure_accepted());
        assert!(exit.0.get());
        assert!(!dir.path().join(MARKER_FILE).exists());
    }

    #[test]
    fn unreadable_storage_fails_open() {
        let exit = Recorder::default();
        let mut gate = TermsGate::new(BrokenStore, scripted(&[]), &exit);
        assert!(gate.ensure_accepted());
        let (_, prompt, _) = gate.into_parts();
        assert_eq!(prompt.1, 0);
    }
}
