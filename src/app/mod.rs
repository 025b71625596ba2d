//! `NavigationController`: owner of the embedded browser session.
//!
//! This module declares the controller, its typed events and the state it
//! exposes to the UI. Behaviour is split across the sibling sub-modules:
//!
//! - `navigation`: page lifecycle, timeout, connectivity, history, back/reload
//! - `requests`: per-navigation policy decisions, downloads, page messages

pub mod navigation;
pub mod requests;


use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use crate::bridge::celebration::{CelebrationData, Enricher};
use crate::config::{CrossOriginPolicy, ShellConfig, SiteOrigin};
use crate::net::download::{DownloadError, Downloader};
use crate::platform::{CrossOriginChoice, FileChooserParams, Platform, WebView};

pub use navigation::NavigationHistory;

// ─── Events ──────────────────────────────────────────────────────────────────

/// Everything that can happen to the browser session, in arrival order.
#[derive(Debug, Clone)]
pub enum ShellEvent {
    PageStarted { url: String },
    PageFinished { url: String },
    /// `main_frame` is `None` when the platform does not report it.
    ResourceError {
        main_frame: Option<bool>,
        description: String,
    },
    TimeoutFired { generation: u64 },
    ConnectivityChanged { online: bool },
    CrossOriginChoice { url: String, choice: CrossOriginChoice },
    /// The platform's own download callback fired for `url`.
    DownloadRequested { url: String },
    DownloadFinished {
        url: String,
        result: Result<PathBuf, DownloadError>,
    },
    PageMessage { payload: String },
    CelebrationReady(CelebrationData),
    FileChooserRequested(FileChooserParams),
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigationState {
    pub is_loading: bool,
    pub has_error: bool,
    pub has_timed_out: bool,
}

impl NavigationState {
    fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Loaded,
    Errored,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    Prevent,
}

/// Snapshot for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub phase: Phase,
    pub navigation: NavigationState,
    pub offline_overlay: bool,
    /// Shown right after reconnecting while the automatic reload runs.
    pub recovery_overlay: bool,
    pub downloads_in_flight: usize,
    pub celebration: Option<CelebrationData>,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    generation: u64,
    deadline: Instant,
}

// ─── Controller ──────────────────────────────────────────────────────────────

pub struct NavigationController<W, P> {
    origin: SiteOrigin,
    load_timeout: Duration,
    cross_origin: CrossOriginPolicy,
    webview: W,
    platform: P,
    downloader: Box<dyn Downloader>,
    enricher: Box<dyn Enricher>,
    events_tx: Sender<ShellEvent>,
    events_rx: Receiver<ShellEvent>,
    state: NavigationState,
    phase: Phase,
    offline: bool,
    pending_reload: bool,
    recovering: bool,
    /// An offline back step is loading a cached history entry.
    back_walk: bool,
    history: NavigationHistory,
    timer: Option<Timer>,
    generation: u64,
    pending_cross_origin: Option<String>,
    approved_cross_origin: Option<String>,
    downloads_in_flight: usize,
    celebration: Option<CelebrationData>,
    disposed: bool,
}

impl<W: WebView, P: Platform> NavigationController<W, P> {
    pub fn new(
        config: &ShellConfig,
        webview: W,
        platform: P,
        downloader: Box<dyn Downloader>,
        enricher: Box<dyn Enricher>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            origin: config.origin.clone(),
            load_timeout: config.load_timeout,
            cross_origin: config.cross_origin,
            webview,
            platform,
            downloader,
            enricher,
            events_tx,
            events_rx,
            state: NavigationState::default(),
            phase: Phase::Idle,
            offline: false,
            pending_reload: false,
            recovering: false,
            back_walk: false,
            history: NavigationHistory::default(),
            timer: None,
            generation: 0,
            pending_cross_origin: None,
            approved_cross_origin: None,
            downloads_in_flight: 0,
            celebration: None,
            disposed: false,
        }
    }

    /// Issue the first load. Call after the terms gate has passed.
    pub fn start(&mut self, online: bool) {
        self.offline = !online;
        let home = self.origin.base().to_string();
        log::info!("loading {home} ({})", if online { "online" } else { "offline" });
        self.begin_load(Instant::now());
        self.webview.load_url(&home);
    }

    /// Queue handle for platform callbacks and background jobs.
    pub fn sender(&self) -> Sender<ShellEvent> {
        self.events_tx.clone()
    }

    /// Handle every queued event; returns how many were processed.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    pub fn handle(&mut self, event: ShellEvent) {
        if self.disposed {
            log::debug!("dropping {event:?} after dispose");
            return;
        }
        match event {
            ShellEvent::PageStarted { url } => self.page_started(url),
            ShellEvent::PageFinished { url } => self.page_finished(&url),
            ShellEvent::ResourceError {
                main_frame,
                description,
            } => self.resource_error(main_frame, &description),
            ShellEvent::TimeoutFired { generation } => self.timeout_fired(generation),
            ShellEvent::ConnectivityChanged { online } => self.connectivity_changed(online),
            ShellEvent::CrossOriginChoice { url, choice } => self.cross_origin_chosen(&url, choice),
            ShellEvent::DownloadRequested { url } => self.download_requested(&url),
            ShellEvent::DownloadFinished { url, result } => self.download_finished(&url, result),
            ShellEvent::PageMessage { payload } => self.page_message(&payload),
            ShellEvent::CelebrationReady(data) => self.celebration_ready(data),
            ShellEvent::FileChooserRequested(params) => self.file_chooser(&params),
        }
    }

    /// Stop timers and ignore anything that arrives afterwards.
    pub fn dispose(&mut self) {
        self.timer = None;
        self.pending_cross_origin = None;
        self.disposed = true;
        log::debug!("navigation controller disposed");
    }

    pub fn view(&self) -> ViewState {
        ViewState {
            phase: self.phase,
            navigation: self.state,
            offline_overlay: self.offline,
            recovery_overlay: self.recovering,
            downloads_in_flight: self.downloads_in_flight,
            celebration: self.celebration.clone(),
        }
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }

    /// Generation of the armed load timeout, if any.
    pub fn armed_timeout(&self) -> Option<u64> {
        self.timer.map(|t| t.generation)
    }

    /// Close the celebration overlay.
    pub fn dismiss_celebration(&mut self) -> Option<CelebrationData> {
        self.celebration.take()
    }

    pub fn webview(&self) -> &W {
        &self.webview
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }
}
