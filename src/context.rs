//! Per-session application context.
//!
//! One `AppContext` is created at startup and handed to every component
//! that needs the origin, the HTTP client or the session token. Nothing
//! reads these through globals.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::blocking::Client;

use crate::config::{ShellConfig, SiteOrigin};
use crate::net::fetch::{build_client, FetchError, Redirects};

/// Whole-request limit for downloads. Large PDFs on slow mobile links take
/// minutes; stalled connections are caught by the connect timeout.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
}

pub struct AppContext {
    pub config: ShellConfig,
    http: Client,
    auth: RwLock<AuthState>,
}

impl AppContext {
    pub fn new(config: ShellConfig) -> Result<Arc<Self>, FetchError> {
        let http = build_client(&config.user_agent, TRANSFER_TIMEOUT, Redirects::Follow)?;
        Ok(Arc::new(Self {
            config,
            http,
            auth: RwLock::new(AuthState::default()),
        }))
    }

    pub fn origin(&self) -> &SiteOrigin {
        &self.config.origin
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn set_token(&self, token: Option<String>) {
        let token = token.filter(|t| !t.is_empty());
        if let Ok(mut auth) = self.auth.write() {
            log::info!("session token {}", if token.is_some() { "set" } else { "cleared" });
            auth.token = token;
        }
    }

    pub fn token(&self) -> Option<String> {
        self.auth.read().ok().and_then(|a| a.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}
