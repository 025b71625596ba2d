//! Page lifecycle for `NavigationController`.
//!
//! Covers the loading/timeout/error transitions, connectivity handling,
//! the local history cache used for offline back-navigation, and
//! `reload`/`go_back`.

use std::time::Instant;

use super::{NavigationController, NavigationState, Phase, Timer};
use crate::platform::{Notice, Platform, WebView};

/// Linear history of page starts with a cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationHistory {
    entries: Vec<String>,
    cursor: usize,
}

impl NavigationHistory {
    /// Record a page start. Pushing from a non-tip cursor drops the forward
    /// entries first; re-pushing the current entry is a no-op.
    pub fn push(&mut self, url: &str) {
        if self.current() == Some(url) {
            return;
        }
        if !self.entries.is_empty() {
            // Truncate forward history before pushing
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(url.to_string());
        self.cursor = self.entries.len() - 1;
    }

    /// Step the cursor back and return the entry it lands on.
    pub fn back(&mut self) -> Option<&str> {
        if self.cursor == 0 || self.entries.is_empty() {
            return None;
        }
        self.cursor -= 1;
        self.current()
    }

    pub fn current(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(String::as_str)
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl<W: WebView, P: Platform> NavigationController<W, P> {
    /// Enter `Loading` with a fresh timeout, replacing any armed one.
    pub(super) fn begin_load(&mut self, now: Instant) {
        self.phase = Phase::Loading;
        self.state = NavigationState::loading();
        self.generation += 1;
        self.timer = Some(Timer {
            generation: self.generation,
            deadline: now + self.load_timeout,
        });
    }

    pub(super) fn page_started(&mut self, url: String) {
        log::debug!("page started: {url}");
        self.history.push(&url);
        self.begin_load(Instant::now());
    }

    pub(super) fn page_finished(&mut self, url: &str) {
        log::debug!("page finished: {url}");
        self.timer = None;
        self.phase = Phase::Loaded;
        self.state = NavigationState::default();
        self.recovering = false;
        self.back_walk = false;
        self.pending_reload = false;
    }

    pub(super) fn resource_error(&mut self, main_frame: Option<bool>, description: &str) {
        if main_frame == Some(false) {
            log::debug!("ignoring sub-resource error: {description}");
            return;
        }
        log::warn!("page load failed: {description}");
        self.timer = None;
        self.phase = Phase::Errored;
        self.state = NavigationState {
            is_loading: false,
            has_error: true,
            has_timed_out: false,
        };
        self.recovering = false;
        self.back_walk = false;
        if self.offline {
            self.pending_reload = true;
        }
    }

    pub(super) fn timeout_fired(&mut self, generation: u64) {
        match self.timer {
            Some(timer) if timer.generation == generation => self.timer = None,
            _ => {
                log::debug!("stale timeout {generation} ignored");
                return;
            }
        }
        if !self.state.is_loading {
            return;
        }

        // The underlying load is left running; it may still finish.
        if self.back_walk {
            self.back_walk = false;
            self.phase = Phase::Loaded;
            self.state = NavigationState::default();
            self.platform.show_notice(Notice::CachedVersion);
            return;
        }
        log::info!("page load timed out after {:?}", self.load_timeout);
        self.phase = Phase::TimedOut;
        self.state = NavigationState {
            is_loading: false,
            has_error: false,
            has_timed_out: true,
        };
        self.recovering = false;
        if self.offline {
            self.pending_reload = true;
        }
    }

    /// Fire the armed timeout if its deadline has passed.
    pub fn poll_timeout(&mut self, now: Instant) {
        if let Some(timer) = self.timer {
            if now >= timer.deadline {
                self.handle(super::ShellEvent::TimeoutFired {
                    generation: timer.generation,
                });
            }
        }
    }

    pub(super) fn connectivity_changed(&mut self, online: bool) {
        if online != self.offline {
            return;
        }
        self.offline = !online;

        if !online {
            log::info!("went offline; auto-reload suspended");
            if self.phase == Phase::Loading {
                self.pending_reload = true;
            }
            return;
        }

        let needs_reload =
            self.pending_reload || matches!(self.phase, Phase::Errored | Phase::TimedOut);
        log::info!("back online (reload: {needs_reload})");
        if needs_reload {
            self.reload();
            self.recovering = true;
        }
    }

    /// Clear error/timeout flags and load the current page again.
    pub fn reload(&mut self) {
        if self.disposed {
            return;
        }
        self.back_walk = false;
        self.pending_reload = false;
        self.begin_load(Instant::now());
        match self.history.current() {
            Some(_) => self.webview.reload(),
            None => {
                let home = self.origin.base().to_string();
                self.webview.load_url(&home);
            }
        }
    }

    /// Handle a back gesture. Returns `false` when there is nowhere to go,
    /// so the caller may close the app.
    pub fn go_back(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        if !self.offline {
            if self.webview.can_go_back() {
                // Step the cache with the browser so the replayed start is a no-op.
                self.history.back();
                self.webview.go_back();
                return true;
            }
            return false;
        }

        // Offline: the browser's own history would refetch; replay our cache.
        let Some(url) = self.history.back().map(str::to_string) else {
            return false;
        };
        log::info!("offline back to cached {url}");
        self.back_walk = true;
        self.begin_load(Instant::now());
        self.webview.load_url(&url);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(urls: &[&str]) -> NavigationHistory {
        let mut h = NavigationHistory::default();
        for url in urls {
            h.push(url);
        }
        h
    }

    #[test]
    fn push_moves_cursor_to_tip() {
        let h = history(&["/a", "/b", "/c"]);
        assert_eq!(h.cursor(), 2);
        assert_eq!(h.current(), Some("/c"));
    }

    #[test]
    fn push_from_middle_truncates_forward_entries() {
        let mut h = history(&["/a", "/b", "/c", "/d"]);
        assert_eq!(h.back(), Some("/c"));
        assert_eq!(h.back(), Some("/b"));
        h.push("/x");
        assert_eq!(h.entries(), ["/a", "/b", "/x"]);
        assert_eq!(h.cursor(), 2);
    }

    #[test]
    fn repeated_entry_is_not_duplicated() {
        let mut h = history(&["/a", "/b"]);
        h.back();
        h.push("/a");
        assert_eq!(h.entries(), ["/a", "/b"]);
        assert_eq!(h.cursor(), 0);
    }

    #[test]
    fn back_stops_at_first_entry() {
        let mut h = history(&["/a"]);
        assert!(!h.can_go_back());
        assert_eq!(h.back(), None);
        assert_eq!(NavigationHistory::default().back(), None);
    }
}
