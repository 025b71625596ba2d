//! Cookie handling for authenticated out-of-band requests.
//!
//! The embedded browser only exposes `document.cookie` through its script
//! bridge, so cookies arrive as a single `name=value; name2=value2` string.

/// A single cookie pair scraped from the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Parse a `document.cookie` string. The first `=` splits name from value;
/// values may contain `=` themselves. Pairs without a name are dropped.
pub fn parse_cookie_string(raw: &str) -> Vec<Cookie> {
    // Script bridges hand back JSON-encoded strings on some platforms.
    let raw = raw.trim();
    let raw = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw);

    raw.split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Cookie {
                name: name.to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

/// Render cookies as a `Cookie` request header value, `None` when empty.
pub fn cookie_header(cookies: &[Cookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_equals() {
        let cookies = parse_cookie_string("sessionid=abc; token=a=b==; theme=dark");
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies[1].name, "token");
        assert_eq!(cookies[1].value, "a=b==");
    }

    #[test]
    fn tolerates_quotes_and_junk() {
        let cookies = parse_cookie_string("\"a=1; ; =orphan; flag\"");
        assert_eq!(
            cookies,
            vec![
                Cookie { name: "a".into(), value: "1".into() },
                Cookie { name: "flag".into(), value: "".into() },
            ]
        );
    }

    #[test]
    fn header_roundtrip_and_empty() {
        let cookies = parse_cookie_string("csrftoken=x; sessionid=y");
        assert_eq!(cookie_header(&cookies).as_deref(), Some("csrftoken=x; sessionid=y"));
        assert_eq!(cookie_header(&parse_cookie_string("")), None);
    }
}
