use http::Uri;
use thiserror::Error;

/// Origins accepted when the configuration names none: any Firefox or
/// Chromium extension page.
pub const DEFAULT_ALLOWLIST: [&str; 2] = ["moz-extension://*", "chrome-extension://*"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OriginRejection {
    #[error("malformed Origin header")]
    Malformed,
    #[error("origin '{origin}' is not in the allowlist")]
    NotAllowed { origin: String },
}

/// Decides which `Origin` headers may open a bridge connection.
///
/// - No header at all is allowed; command-line clients do not send one.
/// - Loopback origins (`localhost`, `127.0.0.1`, `[::1]`, any port) are
///   always allowed.
/// - Anything else must match an allowlist pattern, where `*` matches any
///   run of characters.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowlist: Vec<String>,
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWLIST.iter().map(|p| p.to_string()).collect())
    }
}

impl OriginPolicy {
    pub fn new(allowlist: Vec<String>) -> Self {
        Self { allowlist }
    }

    pub fn allowlist(&self) -> &[String] {
        &self.allowlist
    }

    pub fn check(&self, origin: Option<&str>) -> Result<(), OriginRejection> {
        let origin = match origin {
            None => return Ok(()),
            Some(o) if o.trim().is_empty() => return Err(OriginRejection::Malformed),
            Some(o) => o,
        };

        if is_loopback(origin) || self.allowlist.iter().any(|p| wildcard_match(p, origin)) {
            return Ok(());
        }

        Err(OriginRejection::NotAllowed {
            origin: origin.to_string(),
        })
    }
}

/// `true` for http(s) origins whose host is a loopback name.
fn is_loopback(origin: &str) -> bool {
    let Ok(uri) = origin.parse::<Uri>() else {
        return false;
    };
    if !matches!(uri.scheme_str(), Some("http" | "https")) {
        return false;
    }
    matches!(
        uri.host(),
        Some("localhost" | "127.0.0.1" | "[::1]" | "::1")
    )
}

/// Match `value` against `pattern`, where each `*` stands for any run of
/// characters, including none.
fn wildcard_match(pattern: &str, value: &str) -> bool {
    let Some((head, rest)) = pattern.split_once('*') else {
        return pattern == value;
    };
    let Some(mut remaining) = value.strip_prefix(head) else {
        return false;
    };

    let (middle, tail) = match rest.rsplit_once('*') {
        Some((middle, tail)) => (middle, tail),
        None => ("", rest),
    };
    for piece in middle.split('*').filter(|p| !p.is_empty()) {
        match remaining.find(piece) {
            Some(at) => remaining = &remaining[at + piece.len()..],
            None => return false,
        }
    }
    remaining.len() >= tail.len() && remaining.ends_with(tail)
}
