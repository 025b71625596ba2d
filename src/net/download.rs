//! Download interceptor.
//!
//! Same-origin navigations that point at printable documents are fetched
//! out of band with the page's cookies, saved locally and handed to the
//! platform's default handler. Transfers run on a background thread and
//! report back through the controller's event channel.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, COOKIE};
use tempfile::NamedTempFile;
use url::Url;

use crate::app::ShellEvent;
use crate::config::ShellConfig;
use crate::context::AppContext;
use crate::net::cookies::{cookie_header, Cookie};
use crate::net::fetch::{content_type, with_auth};

/// Extensions kept as-is when the URL already carries one.
const KNOWN_EXTENSIONS: [&str; 5] = ["pdf", "html", "htm", "epub", "txt"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with HTTP {0}")]
    Status(u16),
    #[error("could not save file: {0}")]
    Storage(String),
}

impl From<io::Error> for DownloadError {
    fn from(e: io::Error) -> Self {
        DownloadError::Storage(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: Url,
    pub cookies: Vec<Cookie>,
}

/// Where downloaded files land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLocation {
    /// Platform downloads directory, when one exists.
    pub downloads: Option<PathBuf>,
    /// Application-private documents directory.
    pub documents: PathBuf,
}

impl DownloadLocation {
    pub fn resolve(config: &ShellConfig) -> Self {
        Self {
            downloads: dirs::download_dir(),
            documents: config.documents_dir.clone(),
        }
    }

    pub fn target_dir(&self) -> PathBuf {
        self.downloads
            .clone()
            .unwrap_or_else(|| self.documents.join("downloads"))
    }
}

/// Fetch `url` and save it under `location`, returning the saved path.
pub fn download(
    client: &Client,
    url: &Url,
    cookies: &[Cookie],
    token: Option<&str>,
    location: &DownloadLocation,
) -> Result<PathBuf, DownloadError> {
    let mut request = client
        .get(url.as_str())
        .header(ACCEPT, "application/pdf,text/html;q=0.9,*/*;q=0.8");
    if let Some(header) = cookie_header(cookies) {
        request = request.header(COOKIE, header);
    }
    let mut response = with_auth(request, token)
        .send()
        .map_err(|e| DownloadError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status(status.as_u16()));
    }

    let name = file_name_for(url, content_type(response.headers()).as_deref());
    let dir = location.target_dir();
    fs::create_dir_all(&dir)?;

    // Each transfer writes its own partial file, dropped (and deleted) on error.
    let mut partial = tempfile::Builder::new()
        .prefix(".download-")
        .suffix(".part")
        .tempfile_in(&dir)?;
    let bytes = response
        .copy_to(&mut partial)
        .map_err(|e| DownloadError::Network(e.to_string()))?;

    let path = persist_unique(partial, &dir, &name)?;
    log::info!("downloaded {bytes} bytes from {url} to {}", path.display());
    Ok(path)
}

/// Local file name for a download: the last path segment, sanitized, with
/// an extension inferred from the content type when it has none.
pub fn file_name_for(url: &Url, content_type: Option<&str>) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("");
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    let mut name = sanitize_file_name(&decoded);
    if name.is_empty() {
        name = "download".to_string();
    }
    if !has_known_extension(&name) {
        name.push('.');
        name.push_str(extension_for(content_type));
    }
    name
}

pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned.trim().trim_matches('.').to_string()
}

fn has_known_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty() && KNOWN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        None => false,
    }
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some(ct) if ct.contains("html") => "html",
        _ => "pdf",
    }
}

/// `name`, then `stem (1).ext`, `stem (2).ext`, ...
fn candidates<'a>(dir: &'a Path, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    std::iter::once(dir.join(name)).chain((1u32..).map(move |n| match ext {
        Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
        None => dir.join(format!("{stem} ({n})")),
    }))
}

/// Move a finished partial file to the first free candidate name. The
/// no-clobber persist is atomic, so concurrent transfers never share or
/// overwrite a target.
fn persist_unique(
    mut partial: NamedTempFile,
    dir: &Path,
    name: &str,
) -> Result<PathBuf, DownloadError> {
    for path in candidates(dir, name) {
        match partial.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => partial = e.file,
            Err(e) => return Err(e.error.into()),
        }
    }
    Err(DownloadError::Storage(format!("no free name for {name}")))
}

/// Starts transfers on behalf of the controller.
pub trait Downloader {
    /// Begin a transfer; the outcome must arrive on `done` as
    /// [`ShellEvent::DownloadFinished`].
    fn start(&self, request: DownloadRequest, done: Sender<ShellEvent>);
}

/// Downloads over HTTP on a background thread.
pub struct HttpDownloader {
    ctx: Arc<AppContext>,
    location: DownloadLocation,
}

impl HttpDownloader {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let location = DownloadLocation::resolve(&ctx.config);
        Self { ctx, location }
    }
}

impl Downloader for HttpDownloader {
    fn start(&self, request: DownloadRequest, done: Sender<ShellEvent>) {
        let ctx = Arc::clone(&self.ctx);
        let location = self.location.clone();

        std::thread::spawn(move || {
            let token = ctx.token();
            let result = download(
                ctx.http(),
                &request.url,
                &request.cookies,
                token.as_deref(),
                &location,
            );
            let _ = done.send(ShellEvent::DownloadFinished {
                url: request.url.to_string(),
                result,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::test_support::{local_client as client, serve_once};

    #[test]
    fn names_from_last_segment() {
        let url = Url::parse("https://site.ru/books/42/print-review").unwrap();
        assert_eq!(file_name_for(&url, Some("application/pdf")), "print-review.pdf");
        assert_eq!(file_name_for(&url, Some("text/html")), "print-review.html");
        assert_eq!(file_name_for(&url, None), "print-review.pdf");

        let url = Url::parse("https://site.ru/files/Guide.PDF?x=1").unwrap();
        assert_eq!(file_name_for(&url, Some("text/html")), "Guide.PDF");

        let url = Url::parse("https://site.ru/reports/monthly-print/").unwrap();
        assert_eq!(file_name_for(&url, None), "monthly-print.pdf");

        let url = Url::parse("https://site.ru/").unwrap();
        assert_eq!(file_name_for(&url, None), "download.pdf");
    }

    #[test]
    fn decodes_and_sanitizes() {
        let url = Url::parse("https://site.ru/files/%D0%94%D1%8E%D0%BD%D0%B0%3A%20%D0%BE%D1%82%D0%B7%D1%8B%D0%B2.pdf").unwrap();
        assert_eq!(file_name_for(&url, None), "Дюна_ отзыв.pdf");
        assert_eq!(sanitize_file_name("a<b>|c?.pdf"), "a_b__c_.pdf");
        assert_eq!(sanitize_file_name("..\u{7}.."), "_");
    }

    #[test]
    fn falls_back_to_documents_dir() {
        let location = DownloadLocation {
            downloads: None,
            documents: PathBuf::from("/data/app/documents"),
        };
        assert_eq!(location.target_dir(), PathBuf::from("/data/app/documents/downloads"));
    }

    #[test]
    fn does_not_overwrite_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("review.pdf"), b"old").unwrap();
        fs::write(dir.path().join("review (1).pdf"), b"old").unwrap();

        let mut partial = NamedTempFile::new_in(dir.path()).unwrap();
        partial.write_all(b"new").unwrap();
        let path = persist_unique(partial, dir.path(), "review.pdf").unwrap();

        assert_eq!(path, dir.path().join("review (2).pdf"));
        assert_eq!(fs::read(dir.path().join("review.pdf")).unwrap(), b"old");
        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn concurrent_downloads_of_one_document_keep_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let location = DownloadLocation {
            downloads: Some(dir.path().to_path_buf()),
            documents: dir.path().to_path_buf(),
        };
        let bodies: [&'static [u8]; 2] = [
            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 6\r\nConnection: close\r\n\r\nfirst!",
            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 6\r\nConnection: close\r\n\r\nsecond",
        ];

        let transfers: Vec<_> = bodies
            .into_iter()
            .map(|body| {
                let (base, server) = serve_once(body);
                let location = location.clone();
                let transfer = std::thread::spawn(move || {
                    let url = Url::parse(&format!("{base}/books/42/print-review")).unwrap();
                    download(&client(), &url, &[], None, &location)
                });
                (transfer, server)
            })
            .collect();

        let mut saved = Vec::new();
        for (transfer, server) in transfers {
            saved.push(transfer.join().unwrap().unwrap());
            server.join().unwrap();
        }
        saved.sort();
        assert_eq!(
            saved,
            [dir.path().join("print-review (1).pdf"), dir.path().join("print-review.pdf")]
        );

        let mut contents: Vec<Vec<u8>> = saved.iter().map(|p| fs::read(p).unwrap()).collect();
        contents.sort();
        assert_eq!(contents, [b"first!".to_vec(), b"second".to_vec()]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn forwards_cookies_and_saves_body() {
        let (base, server) = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 8\r\nConnection: close\r\n\r\n%PDF-1.7",
        );
        let dir = tempfile::tempdir().unwrap();
        let location = DownloadLocation {
            downloads: Some(dir.path().to_path_buf()),
            documents: dir.path().to_path_buf(),
        };
        let url = Url::parse(&format!("{base}/books/42/print-review")).unwrap();
        let cookies = vec![Cookie { name: "sessionid".into(), value: "abc=".into() }];

        let path = download(&client(), &url, &cookies, Some("jwt"), &location).unwrap();
        assert_eq!(path, dir.path().join("print-review.pdf"));
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-1.7");

        let request = server.join().unwrap().to_ascii_lowercase();
        assert!(request.contains("cookie: sessionid=abc="));
        assert!(request.contains("authorization: bearer jwt"));
    }

    #[test]
    fn non_success_status_is_a_network_error() {
        let (base, server) = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let dir = tempfile::tempdir().unwrap();
        let location = DownloadLocation {
            downloads: Some(dir.path().to_path_buf()),
            documents: dir.path().to_path_buf(),
        };
        let url = Url::parse(&format!("{base}/a.pdf")).unwrap();

        let err = download(&client(), &url, &[], None, &location).unwrap_err();
        assert_eq!(err, DownloadError::Status(404));
        server.join().unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
