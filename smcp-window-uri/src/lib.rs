//! Parser and builder for `window://` resource identifiers.
//!
//! A window URI identifies a desktop-like resource exposed by an MCP server:
//!
//! ```text
//! window://<host>[/<seg>...][?priority=N&fullscreen=B]
//! ```
//!
//! `host` names the owning MCP connection, the path segments are an opaque,
//! percent-encoded hierarchy chosen by that server, `priority` is an integer
//! in `[0, 100]` used to order windows within a server, and `fullscreen`
//! marks a window that should be shown exclusively for its server.

use std::fmt;
use std::str::FromStr;

use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;
use percent_encoding::percent_decode_str;
use percent_encoding::utf8_percent_encode;

const SCHEME: &str = "window";

/// Characters left unescaped in a path segment, matching common URI path
/// conventions (everything but the reserved delimiters).
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WindowUriError {
    #[error("invalid scheme `{0}`, expected `window`")]
    InvalidScheme(String),
    #[error("missing host in window URI")]
    MissingHost,
    #[error("invalid priority `{0}`, expected an integer in [0, 100]")]
    InvalidPriority(String),
    #[error("invalid fullscreen value `{0}`")]
    InvalidFullscreen(String),
}

/// A parsed `window://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowUri {
    host: String,
    segments: Vec<String>,
    priority: Option<u8>,
    fullscreen: Option<bool>,
}

impl WindowUri {
    /// Build a URI from its constituent parts, percent-encoding path segments.
    pub fn build(
        host: impl Into<String>,
        segments: impl IntoIterator<Item = impl Into<String>>,
        priority: Option<u8>,
        fullscreen: Option<bool>,
    ) -> Self {
        Self {
            host: host.into(),
            segments: segments.into_iter().map(Into::into).collect(),
            priority,
            fullscreen,
        }
    }

    pub fn parse(input: &str) -> Result<Self, WindowUriError> {
        let rest = input
            .strip_prefix(&format!("{SCHEME}://"))
            .ok_or_else(|| {
                let scheme = input.split("://").next().unwrap_or(input);
                WindowUriError::InvalidScheme(scheme.to_string())
            })?;

        let (authority_and_path, query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q)),
            None => (rest, None),
        };

        let mut parts = authority_and_path.splitn(2, '/');
        let host = parts.next().unwrap_or("");
        if host.is_empty() {
            return Err(WindowUriError::MissingHost);
        }
        let path = parts.next().unwrap_or("");

        let segments = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/')
                .map(|seg| {
                    percent_decode_str(seg)
                        .decode_utf8()
                        .map(|cow| cow.into_owned())
                        .unwrap_or_else(|_| seg.to_string())
                })
                .collect()
        };

        let mut priority = None;
        let mut fullscreen = None;
        if let Some(q) = query {
            for pair in q.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                match key {
                    "priority" => {
                        let n: u16 = value
                            .parse()
                            .map_err(|_| WindowUriError::InvalidPriority(value.to_string()))?;
                        if n > 100 {
                            return Err(WindowUriError::InvalidPriority(value.to_string()));
                        }
                        priority = Some(n as u8);
                    }
                    "fullscreen" => {
                        fullscreen = Some(parse_bool(value)?);
                    }
                    _ => {}
                }
            }
        }

        Ok(Self {
            host: host.to_string(),
            segments,
            priority,
            fullscreen,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn priority(&self) -> Option<u8> {
        self.priority
    }

    /// The priority used for ordering purposes: missing priority sorts as 0.
    pub fn ordering_priority(&self) -> u8 {
        self.priority.unwrap_or(0)
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen.unwrap_or(false)
    }
}

fn parse_bool(value: &str) -> Result<bool, WindowUriError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(WindowUriError::InvalidFullscreen(other.to_string())),
    }
}

impl fmt::Display for WindowUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}://{}", self.host)?;
        for seg in &self.segments {
            write!(f, "/{}", utf8_percent_encode(seg, SEGMENT_ENCODE_SET))?;
        }

        let mut query = Vec::new();
        if let Some(p) = self.priority {
            query.push(format!("priority={p}"));
        }
        if let Some(b) = self.fullscreen {
            query.push(format!("fullscreen={b}"));
        }
        if !query.is_empty() {
            write!(f, "?{}", query.join("&"))?;
        }
        Ok(())
    }
}

impl FromStr for WindowUri {
    type Err = WindowUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal() {
        let u = WindowUri::parse("window://com.example.mcp").expect("parse");
        assert_eq!(u.host(), "com.example.mcp");
        assert!(u.segments().is_empty());
        assert_eq!(u.priority(), None);
        assert!(!u.fullscreen());
    }

    #[test]
    fn parse_with_paths() {
        let u = WindowUri::parse("window://com.example.mcp/dashboard/main").expect("parse");
        assert_eq!(u.segments(), ["dashboard", "main"]);
    }

    #[test]
    fn parse_with_query_params() {
        let u = WindowUri::parse("window://com.example.mcp/page?priority=90&fullscreen=true")
            .expect("parse");
        assert_eq!(u.segments(), ["page"]);
        assert_eq!(u.priority(), Some(90));
        assert!(u.fullscreen());
    }

    #[test]
    fn priority_bounds_and_types() {
        assert_eq!(WindowUri::parse("window://x?priority=0").expect("parse").priority(), Some(0));
        assert_eq!(
            WindowUri::parse("window://x?priority=100").expect("parse").priority(),
            Some(100)
        );
        assert!(WindowUri::parse("window://x?priority=101").is_err());
        assert!(WindowUri::parse("window://x?priority=abc").is_err());
    }

    #[test]
    fn fullscreen_variants() {
        for (val, expected) in [
            ("true", true),
            ("1", true),
            ("yes", true),
            ("on", true),
            ("false", false),
            ("0", false),
            ("no", false),
            ("off", false),
        ] {
            let u = WindowUri::parse(&format!("window://x?fullscreen={val}")).expect("parse");
            assert_eq!(u.fullscreen(), expected, "value {val}");
        }
    }

    #[test]
    fn fullscreen_invalid() {
        assert!(WindowUri::parse("window://x?fullscreen=maybe").is_err());
    }

    #[test]
    fn build_uri_basic_and_roundtrip() {
        let u = WindowUri::build(
            "com.example.mcp",
            ["dashboard", "main"],
            Some(80),
            Some(false),
        );
        let s = u.to_string();
        assert!(s.starts_with("window://com.example.mcp/dashboard/main"));
        assert!(s.contains("priority=80"));
        assert!(s.contains("fullscreen=false"));

        let u2 = WindowUri::parse(&s).expect("roundtrip parse");
        assert_eq!(u2.host(), "com.example.mcp");
        assert_eq!(u2.segments(), ["dashboard", "main"]);
        assert_eq!(u2.priority(), Some(80));
        assert!(!u2.fullscreen());
    }

    #[test]
    fn build_uri_encoding() {
        let u = WindowUri::build("h", ["A B", "c/d"], None, None);
        let s = u.to_string();
        assert!(s.contains("A%20B"));
        assert!(s.contains("c%2Fd"));
        let u2 = WindowUri::parse(&s).expect("parse");
        assert_eq!(u2.segments(), ["A B", "c/d"]);
    }

    #[test]
    fn build_uri_optional_params() {
        let u = WindowUri::build("h", Vec::<String>::new(), None, None);
        assert_eq!(u.to_string(), "window://h");
    }

    #[test]
    fn invalid_scheme_and_missing_host() {
        assert!(WindowUri::parse("http://x").is_err());
        assert!(WindowUri::parse("window://").is_err());
    }

    #[test]
    fn from_str_matches_parse() {
        let a: WindowUri = "window://x/y".parse().expect("from_str");
        let b = WindowUri::parse("window://x/y").expect("parse");
        assert_eq!(a, b);
    }
}
