//! Shell configuration.
//!
//! The site origin is derived once from the configured base URL and never
//! changes for the lifetime of the process. Everything else lives in
//! [`ShellConfig`], which the binary fills from CLI arguments and
//! environment variables.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Origin used when the configured site URL is missing or invalid.
pub const DEFAULT_SITE_URL: &str = "https://kalejdoskopknig.ru/";

/// Default user agent sent with every out-of-band request.
pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Linux; Android 14; Mobile) ReadTogether/",
    env!("CARGO_PKG_VERSION")
);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid site URL '{url}': {reason}")]
    InvalidSiteUrl { url: String, reason: String },
    #[error("invalid value '{value}' for {name}; valid options: {valid}")]
    InvalidChoice {
        name: &'static str,
        value: String,
        valid: &'static str,
    },
}

/// Scheme, host and optional explicit port of the wrapped site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteOrigin {
    base: Url,
    host: String,
    port: Option<u16>,
}

impl SiteOrigin {
    /// Parse and normalize a site URL: http(s) only, host required, query
    /// and fragment dropped, path always ending in `/`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSiteUrl {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut base = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        let host = match base.host_str() {
            Some(h) if !h.is_empty() => h.to_ascii_lowercase(),
            _ => return Err(invalid("missing host")),
        };

        base.set_query(None);
        base.set_fragment(None);
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            port: base.port(),
            host,
            base,
        })
    }

    /// Resolve the configured value, falling back to [`DEFAULT_SITE_URL`].
    pub fn from_config(raw: Option<&str>) -> Self {
        if let Some(raw) = raw.filter(|r| !r.trim().is_empty()) {
            match Self::parse(raw) {
                Ok(origin) => return origin,
                Err(e) => log::warn!("{e}; falling back to {DEFAULT_SITE_URL}"),
            }
        }
        Self::default()
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn scheme(&self) -> &str {
        self.base.scheme()
    }

    /// Lowercased host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, `None` when the scheme default is used.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Resolve a possibly relative reference against the site base.
    pub fn join(&self, reference: &str) -> Option<Url> {
        self.base.join(reference).ok()
    }
}

impl Default for SiteOrigin {
    fn default() -> Self {
        let base = Url::parse(DEFAULT_SITE_URL).expect("default site URL is valid");
        Self {
            host: base.host_str().unwrap_or_default().to_string(),
            port: base.port(),
            base,
        }
    }
}

/// What to do with http(s) links that leave the site origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossOriginPolicy {
    /// Ask the user whether to open externally or continue in the app.
    Prompt,
    /// Hand off to the external browser without asking.
    OpenExternally,
}

impl std::str::FromStr for CrossOriginPolicy {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prompt" | "ask" => Ok(Self::Prompt),
            "external" | "open-externally" => Ok(Self::OpenExternally),
            _ => Err(ConfigError::InvalidChoice {
                name: "cross-origin policy",
                value: s.to_string(),
                valid: "prompt, external",
            }),
        }
    }
}

/// Whether reward ads are claimed against the server or simulated locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardMode {
    Simulated,
    Live,
}

impl std::str::FromStr for RewardMode {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simulated" | "sim" | "debug" => Ok(Self::Simulated),
            "live" | "release" => Ok(Self::Live),
            _ => Err(ConfigError::InvalidChoice {
                name: "reward mode",
                value: s.to_string(),
                valid: "simulated, live",
            }),
        }
    }
}

impl std::fmt::Display for RewardMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RewardMode::Simulated => write!(f, "simulated"),
            RewardMode::Live => write!(f, "live"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub origin: SiteOrigin,
    /// Time a page may spend loading before the timeout overlay is shown.
    pub load_timeout: Duration,
    pub cross_origin: CrossOriginPolicy,
    pub reward_mode: RewardMode,
    /// Base of the reward-ads API (`config` and `claim` are resolved against it).
    pub reward_api: Url,
    /// How long the simulated ad is shown.
    pub ad_duration: Duration,
    pub enrichment_timeout: Duration,
    /// Application-private support directory (terms marker, notes).
    pub data_dir: PathBuf,
    /// Application-private documents directory; downloads land under it
    /// when the platform has no downloads directory.
    pub documents_dir: PathBuf,
    pub user_agent: String,
}

impl ShellConfig {
    pub fn new(origin: SiteOrigin) -> Self {
        let reward_api = origin
            .join("api/rewards/")
            .unwrap_or_else(|| origin.base().clone());
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("readtogether");
        let documents_dir = data_dir.join("documents");

        Self {
            origin,
            load_timeout: Duration::from_secs(5),
            cross_origin: CrossOriginPolicy::Prompt,
            reward_mode: RewardMode::Simulated,
            reward_api,
            ad_duration: Duration::from_secs(5),
            enrichment_timeout: Duration::from_secs(4),
            data_dir,
            documents_dir,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self::new(SiteOrigin::default())
    }
}
