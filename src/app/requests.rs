//! Navigation requests and out-of-band work for `NavigationController`.
//!
//! Every navigation attempt is classified by the URL policy and turned
//! into an allow/prevent decision plus, where needed, a download, an
//! external handoff or a cross-origin prompt. Page messages and file
//! chooser requests are handled here as well.

use std::path::PathBuf;

use url::Url;

use super::{NavigationController, NavigationDecision};
use crate::bridge::celebration::CelebrationData;
use crate::bridge::PageMessage;
use crate::config::CrossOriginPolicy;
use crate::net::cookies::parse_cookie_string;
use crate::net::download::{DownloadError, DownloadRequest};
use crate::net::policy::{classify, is_same_origin, UrlClass};
use crate::platform::{CrossOriginChoice, FileChooserParams, Notice, Platform, WebView};

impl<W: WebView, P: Platform> NavigationController<W, P> {
    /// Decide a navigation attempt. Must answer immediately; anything that
    /// needs the user or the network continues through events.
    pub fn on_navigation_request(&mut self, url: &str) -> NavigationDecision {
        if self.disposed {
            return NavigationDecision::Prevent;
        }
        if self.approved_cross_origin.as_deref() == Some(url) {
            self.approved_cross_origin = None;
            return NavigationDecision::Allow;
        }

        let class = classify(url, &self.origin);
        log::debug!("navigation {url} classified as {class:?}");
        match class {
            UrlClass::SameOrigin => NavigationDecision::Allow,
            UrlClass::Download => {
                self.start_download(url);
                NavigationDecision::Prevent
            }
            UrlClass::ExternalScheme => {
                self.open_external(url);
                NavigationDecision::Prevent
            }
            UrlClass::CrossOriginWeb => {
                match self.cross_origin {
                    CrossOriginPolicy::Prompt => {
                        self.pending_cross_origin = Some(url.to_string());
                        self.platform.request_cross_origin_choice(url);
                    }
                    CrossOriginPolicy::OpenExternally => self.open_external(url),
                }
                NavigationDecision::Prevent
            }
        }
    }

    pub(super) fn cross_origin_chosen(&mut self, url: &str, choice: CrossOriginChoice) {
        if self.pending_cross_origin.as_deref() != Some(url) {
            log::debug!("stale cross-origin answer for {url}");
            return;
        }
        self.pending_cross_origin = None;
        match choice {
            CrossOriginChoice::OpenExternally => self.open_external(url),
            CrossOriginChoice::StayInApp => {
                self.approved_cross_origin = Some(url.to_string());
                self.webview.load_url(url);
            }
            CrossOriginChoice::Cancel => {}
        }
    }

    fn open_external(&mut self, url: &str) {
        if let Err(e) = self.platform.open_external(url) {
            log::warn!("external handoff of {url} failed: {e}");
            self.platform
                .show_notice(Notice::UnsupportedLink(url.to_string()));
        }
    }

    fn resolve(&self, url: &str) -> Option<Url> {
        Url::parse(url).ok().or_else(|| self.origin.join(url))
    }

    fn start_download(&mut self, url: &str) {
        let Some(parsed) = self.resolve(url) else {
            log::warn!("cannot download unparseable {url}");
            self.platform
                .show_notice(Notice::DownloadFailed(url.to_string()));
            return;
        };
        let cookies = self
            .webview
            .cookie_string()
            .map(|raw| parse_cookie_string(&raw))
            .unwrap_or_default();

        log::info!("intercepted download {parsed} ({} cookies)", cookies.len());
        self.downloads_in_flight += 1;
        self.downloader.start(
            DownloadRequest {
                url: parsed,
                cookies,
            },
            self.events_tx.clone(),
        );
    }

    pub(super) fn download_requested(&mut self, url: &str) {
        self.start_download(url);
    }

    pub(super) fn download_finished(&mut self, url: &str, result: Result<PathBuf, DownloadError>) {
        self.downloads_in_flight = self.downloads_in_flight.saturating_sub(1);
        match result {
            Ok(path) => {
                if let Err(e) = self.platform.open_file(&path) {
                    log::info!("no handler for {} ({e})", path.display());
                    self.platform.show_notice(Notice::DownloadSaved(path));
                }
            }
            Err(e) => {
                log::warn!("download of {url} failed: {e}");
                self.platform
                    .show_notice(Notice::DownloadFailed(e.to_string()));
            }
        }
    }

    pub(super) fn page_message(&mut self, payload: &str) {
        let Some(message) = PageMessage::parse(payload) else {
            return;
        };
        let finished = match message {
            PageMessage::BookFinished(finished) => finished,
            PageMessage::Other { kind } => {
                log::debug!("unhandled page message '{kind}'");
                return;
            }
        };

        let api = finished
            .api_url
            .as_deref()
            .and_then(|raw| self.resolve(raw))
            .filter(|api| {
                let allowed = is_same_origin(api, &self.origin);
                if !allowed {
                    log::warn!("refusing cross-origin celebration API {api}");
                }
                allowed
            });
        match api {
            Some(api) => self.enricher.start(finished, api, self.events_tx.clone()),
            None => self.celebration_ready(CelebrationData::from_payload(&finished)),
        }
    }

    pub(super) fn celebration_ready(&mut self, mut data: CelebrationData) {
        data.resolve_cover(self.origin.base());
        log::info!("celebrating '{}'", data.title);
        self.celebration = Some(data);
    }

    pub(super) fn file_chooser(&mut self, params: &FileChooserParams) {
        let mut files = self.platform.pick_files(params);
        if !params.multi.allows_multiple() {
            files.truncate(1);
        }
        self.webview.deliver_files(files);
    }
}
