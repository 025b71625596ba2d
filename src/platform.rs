//! Platform capabilities consumed by the shell.
//!
//! The embedded browser widget and the OS integrations are black boxes;
//! the controller only talks to them through these traits. `system`
//! holds the desktop/headless implementations used by the binary.

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("no handler for {0}")]
    NoHandler(String),
    #[error("platform call failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The embedded browser surface. Owned exclusively by the controller.
pub trait WebView {
    fn load_url(&mut self, url: &str);
    fn reload(&mut self);
    fn can_go_back(&self) -> bool;
    fn go_back(&mut self);
    /// `document.cookie` read through the script-evaluation bridge.
    fn cookie_string(&mut self) -> Option<String>;
    /// Complete a pending file-chooser request.
    fn deliver_files(&mut self, files: Vec<PathBuf>);
}

/// Whether a file chooser may return several files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiSelect {
    Single,
    Multiple,
    /// The platform did not say; treated as single selection.
    Unsupported,
}

impl MultiSelect {
    pub fn allows_multiple(self) -> bool {
        matches!(self, MultiSelect::Multiple)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChooserParams {
    pub accept_types: Vec<String>,
    pub multi: MultiSelect,
}

/// Answer to the cross-origin prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossOriginChoice {
    OpenExternally,
    StayInApp,
    Cancel,
}

/// Transient, non-blocking user notices (snackbars/toasts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    UnsupportedLink(String),
    CachedVersion,
    DownloadSaved(PathBuf),
    DownloadFailed(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::UnsupportedLink(url) => write!(f, "Не удалось открыть ссылку: {url}"),
            Notice::CachedVersion => write!(f, "Нет сети: показана сохранённая версия страницы"),
            Notice::DownloadSaved(path) => write!(f, "Файл сохранён: {}", path.display()),
            Notice::DownloadFailed(reason) => write!(f, "Не удалось скачать файл: {reason}"),
        }
    }
}

/// OS and UI integrations around the browser surface.
pub trait Platform {
    /// Hand a URL to the default external application.
    fn open_external(&mut self, url: &str) -> Result<(), PlatformError>;
    /// Open a downloaded file with its default handler.
    fn open_file(&mut self, path: &Path) -> Result<(), PlatformError>;
    /// Present the open-externally/stay-in-app choice. The answer comes back
    /// later as a `CrossOriginChoice` event.
    fn request_cross_origin_choice(&mut self, url: &str);
    fn show_notice(&mut self, notice: Notice);
    fn pick_files(&mut self, params: &FileChooserParams) -> Vec<PathBuf>;
}

pub mod system {
    //! Implementations backed by the host OS.

    use std::path::Path;
    use std::process::Command;

    use super::PlatformError;

    #[cfg(target_os = "macos")]
    const OPENER: &str = "open";
    #[cfg(target_os = "windows")]
    const OPENER: &str = "explorer";
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    const OPENER: &str = "xdg-open";

    /// Launch the OS default handler for a URL or path.
    pub fn open_with_default(target: &str) -> Result<(), PlatformError> {
        let status = Command::new(OPENER).arg(target).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(PlatformError::NoHandler(target.to_string()))
        }
    }

    pub fn open_path(path: &Path) -> Result<(), PlatformError> {
        open_with_default(&path.to_string_lossy())
    }
}
