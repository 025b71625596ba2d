//! Origin & URL policy.
//!
//! Classifies every candidate navigation against the configured site
//! origin. The controller turns the class into allow/prevent decisions.

use url::Url;

use crate::config::SiteOrigin;

/// Report endpoint that always produces a printable document.
pub const MONTHLY_PRINT_PATH: &str = "/reports/monthly-print";
/// Last path segment of `/books/<id>/.../print-review` links.
pub const REVIEW_PRINT_SEGMENT: &str = "print-review";

/// Schemes that never load inside the embedded browser.
const HANDOFF_SCHEMES: [&str; 3] = ["tel", "mailto", "sms"];
/// Non-web schemes the embedded browser renders itself.
const INLINE_SCHEMES: [&str; 3] = ["data", "blob", "about"];

/// Classification of a candidate navigation URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlClass {
    SameOrigin,
    CrossOriginWeb,
    ExternalScheme,
    Download,
}

/// Classify `candidate` against `origin`.
///
/// Relative references are resolved against the site base. Anything else
/// that fails to parse is treated as navigable.
pub fn classify(candidate: &str, origin: &SiteOrigin) -> UrlClass {
    let url = match Url::parse(candidate) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => match origin.join(candidate) {
            Some(url) => url,
            None => return UrlClass::SameOrigin,
        },
        Err(e) => {
            log::debug!("unparseable navigation '{candidate}' ({e}), allowing");
            return UrlClass::SameOrigin;
        }
    };
    classify_url(&url, origin)
}

/// Classify an already parsed URL.
pub fn classify_url(url: &Url, origin: &SiteOrigin) -> UrlClass {
    let scheme = url.scheme();
    if HANDOFF_SCHEMES.contains(&scheme) {
        return UrlClass::ExternalScheme;
    }
    if INLINE_SCHEMES.contains(&scheme) {
        return UrlClass::SameOrigin;
    }
    if !matches!(scheme, "http" | "https") {
        return UrlClass::ExternalScheme;
    }

    if !is_same_origin(url, origin) {
        return UrlClass::CrossOriginWeb;
    }
    if is_download_path(url.path()) {
        UrlClass::Download
    } else {
        UrlClass::SameOrigin
    }
}

/// Host (and explicit port) test against the site origin, subdomains included.
pub fn is_same_origin(url: &Url, origin: &SiteOrigin) -> bool {
    let host = match url.host_str() {
        None | Some("") => return true,
        Some(h) => h.to_ascii_lowercase(),
    };
    if !host_matches(&host, origin.host()) {
        return false;
    }
    match origin.port() {
        Some(port) => url.port_or_known_default() == Some(port),
        None => true,
    }
}

fn host_matches(host: &str, origin_host: &str) -> bool {
    host == origin_host
        || host
            .strip_suffix(origin_host)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Same-origin paths that must be fetched out of band instead of rendered.
pub fn is_download_path(path: &str) -> bool {
    if path.to_ascii_lowercase().ends_with(".pdf") {
        return true;
    }
    if path.trim_end_matches('/') == MONTHLY_PRINT_PATH {
        return true;
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    segments.len() >= 3
        && segments.first() == Some(&"books")
        && segments.last() == Some(&REVIEW_PRINT_SEGMENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(raw: &str) -> SiteOrigin {
        SiteOrigin::parse(raw).unwrap()
    }

    #[test]
    fn relative_and_anchor_links_stay_in_view() {
        let o = origin("https://site.ru/");
        for candidate in ["#comments", "/club/feed", "club/feed?page=2", "?q=dune", ""] {
            assert_eq!(classify(candidate, &o), UrlClass::SameOrigin, "{candidate}");
        }
    }

    #[test]
    fn host_table() {
        let o = origin("https://site.ru/");
        assert_eq!(classify("https://site.ru/a", &o), UrlClass::SameOrigin);
        assert_eq!(classify("https://sub.site.ru/a", &o), UrlClass::SameOrigin);
        assert_eq!(classify("https://SITE.RU/a", &o), UrlClass::SameOrigin);
        assert_eq!(classify("http://site.ru/a", &o), UrlClass::SameOrigin);
        assert_eq!(classify("https://evilsite.ru/a", &o), UrlClass::CrossOriginWeb);
        assert_eq!(classify("https://site.ru.evil.com/a", &o), UrlClass::CrossOriginWeb);
    }

    #[test]
    fn explicit_port_must_match() {
        let o = origin("http://localhost:8080/");
        assert_eq!(classify("http://localhost:8080/books", &o), UrlClass::SameOrigin);
        assert_eq!(classify("http://localhost:9090/books", &o), UrlClass::CrossOriginWeb);
        assert_eq!(classify("http://localhost/books", &o), UrlClass::CrossOriginWeb);

        let no_port = origin("https://site.ru/");
        assert_eq!(classify("https://site.ru:8443/x", &no_port), UrlClass::SameOrigin);
    }

    #[test]
    fn download_paths() {
        let o = origin("https://kalejdoskopknig.ru/");
        assert_eq!(
            classify("https://kalejdoskopknig.ru/books/42/print-review", &o),
            UrlClass::Download
        );
        assert_eq!(classify("https://kalejdoskopknig.ru/files/Guide.PDF", &o), UrlClass::Download);
        assert_eq!(classify("/reports/monthly-print", &o), UrlClass::Download);
        assert_eq!(classify("/reports/monthly-print/", &o), UrlClass::Download);
        assert_eq!(classify("/books/print-review", &o), UrlClass::SameOrigin);
        assert_eq!(classify("/books/42/review", &o), UrlClass::SameOrigin);
        assert_eq!(classify("/reports/monthly-print/extra", &o), UrlClass::SameOrigin);
        // Cross-origin PDFs are not intercepted.
        assert_eq!(classify("https://other.org/a.pdf", &o), UrlClass::CrossOriginWeb);
    }

    #[test]
    fn schemes() {
        let o = origin("https://site.ru/");
        assert_eq!(classify("tel:+79990000000", &o), UrlClass::ExternalScheme);
        assert_eq!(classify("mailto:club@site.ru", &o), UrlClass::ExternalScheme);
        assert_eq!(classify("sms:+79990000000", &o), UrlClass::ExternalScheme);
        assert_eq!(classify("intent://scan/#Intent;end", &o), UrlClass::ExternalScheme);
        assert_eq!(classify("tg://resolve?domain=club", &o), UrlClass::ExternalScheme);
        assert_eq!(classify("about:blank", &o), UrlClass::SameOrigin);
        assert_eq!(classify("data:text/html,hi", &o), UrlClass::SameOrigin);
        assert_eq!(classify("blob:https://site.ru/uuid", &o), UrlClass::SameOrigin);
    }

    #[test]
    fn malformed_urls_fail_open() {
        let o = origin("https://site.ru/");
        assert_eq!(classify("http://[::1", &o), UrlClass::SameOrigin);
        assert_eq!(classify("https://exa mple.com/", &o), UrlClass::SameOrigin);
    }
}
