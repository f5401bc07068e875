//! Raw HTTP request templates.
//!
//! Exploit mode works from a raw HTTP/1.1 message containing an injection
//! marker. The template keeps the original text; payload substitution
//! rewrites the first marker occurrence and reparses.

use crate::error::{Error, Result};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::path::Path;
use url::Url;

/// Accepted injection markers, all equivalent.
pub const MARKERS: [&str; 3] = ["<PAYLOAD>", "<FUZZ>", "<INJECT>"];

/// A parsed raw HTTP request with an optional injection marker.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    /// Headers in original order with original casing; look up through
    /// [`RequestTemplate::header`].
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub raw: String,
    /// Byte offset of the marker in `raw`, with the marker token itself.
    pub marker: Option<(usize, &'static str)>,
}

impl RequestTemplate {
    /// Parse a raw HTTP request. Line endings may be CRLF or LF. A `Host`
    /// header is required unless the request-target is absolute-form.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.replace("\r\n", "\n");

        let marker = MARKERS
            .iter()
            .filter_map(|m| raw.find(m).map(|pos| (pos, *m)))
            .min_by_key(|(pos, _)| *pos);

        let mut lines = raw.split('\n');
        let request_line = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::InvalidRequest("empty request".into()))?;

        let mut parts = request_line.split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| Error::InvalidRequest(format!("invalid request line: {request_line}")))?
            .to_string();
        let mut path = parts
            .next()
            .ok_or_else(|| Error::InvalidRequest(format!("invalid request line: {request_line}")))?
            .to_string();

        let mut headers = Vec::new();
        let mut host = String::new();
        let mut body_lines = Vec::new();
        let mut in_headers = true;

        for line in lines {
            if in_headers {
                if line.trim().is_empty() {
                    in_headers = false;
                    continue;
                }
                if let Some(idx) = line.find(':') {
                    if idx > 0 {
                        let key = line[..idx].trim().to_string();
                        let value = line[idx + 1..].trim().to_string();
                        if key.eq_ignore_ascii_case("host") {
                            host = value.clone();
                        }
                        headers.push((key, value));
                    }
                }
            } else {
                body_lines.push(line);
            }
        }

        let body = body_lines.join("\n");

        // Absolute-form request-target: take scheme and host from it and
        // rewrite the target to origin-form.
        let mut scheme = "https".to_string();
        if path.starts_with("http://") || path.starts_with("https://") {
            if let Ok(parsed) = Url::parse(&path) {
                scheme = parsed.scheme().to_string();
                if let Some(h) = parsed.host_str() {
                    host = match parsed.port() {
                        Some(p) => format!("{h}:{p}"),
                        None => h.to_string(),
                    };
                }
                let mut origin = parsed.path().to_string();
                if let Some(q) = parsed.query() {
                    origin.push('?');
                    origin.push_str(q);
                }
                path = origin;
            }
        }

        if host.is_empty() {
            return Err(Error::InvalidRequest("no Host header found in request".into()));
        }

        Ok(Self {
            method,
            scheme,
            host,
            path,
            headers,
            body,
            raw,
            marker,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::InvalidRequest(format!("failed to read request file: {e}")))?;
        Self::parse(&content)
    }

    /// Build a minimal GET template from a URL, for detect mode.
    pub fn from_url(raw_url: &str) -> Result<Self> {
        let with_scheme = if raw_url.starts_with("http://") || raw_url.starts_with("https://") {
            raw_url.to_string()
        } else {
            format!("https://{raw_url}")
        };

        let parsed = Url::parse(&with_scheme)
            .map_err(|e| Error::InvalidRequest(format!("invalid URL: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidRequest("missing host in URL".into()))?;
        let host = match parsed.port() {
            Some(p) => format!("{host}:{p}"),
            None => host.to_string(),
        };

        let mut path = parsed.path().to_string();
        if let Some(q) = parsed.query() {
            path.push('?');
            path.push_str(q);
        }
        if path.is_empty() {
            path = "/".to_string();
        }

        let raw = format!(
            "GET {path} HTTP/1.1\nHost: {host}\nUser-Agent: blindsight/1.0\nAccept: */*\nConnection: close\n"
        );

        let mut template = Self::parse(&raw)?;
        template.scheme = parsed.scheme().to_string();
        Ok(template)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn target_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path)
    }

    /// Whether the marker sits in the request line, which forces URL query
    /// encoding of the payload.
    pub fn marker_in_request_line(&self) -> bool {
        match self.marker {
            Some((pos, _)) => {
                let first_line_end = self.raw.find('\n').unwrap_or(self.raw.len());
                pos < first_line_end
            }
            None => false,
        }
    }

    /// Replace the first marker occurrence with the payload. The payload is
    /// query-encoded when the marker is in the request line, literal
    /// otherwise.
    pub fn substitute(&self, payload: &str) -> String {
        let Some((_, marker)) = self.marker else {
            return self.raw.clone();
        };

        let encoded;
        let payload = if self.marker_in_request_line() {
            encoded = utf8_percent_encode(payload, NON_ALPHANUMERIC).to_string();
            encoded.as_str()
        } else {
            payload
        };

        self.raw.replacen(marker, payload, 1)
    }

    /// A new template with the payload injected, keeping this template's
    /// scheme (the `--plain-http` override survives substitution).
    pub fn build(&self, payload: &str) -> Result<RequestTemplate> {
        let mut built = Self::parse(&self.substitute(payload))?;
        built.scheme = self.scheme.clone();
        Ok(built)
    }
}

/// Read URLs from a file, one per line, skipping blanks and `#` comments.
pub fn load_url_file(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path.as_ref())
        .map_err(|e| Error::InvalidRequest(format!("failed to open URL file: {e}")))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Parse every readable request file in a directory, skipping entries that
/// are not valid requests.
pub fn load_request_directory(dir: impl AsRef<Path>) -> Result<Vec<RequestTemplate>> {
    let entries = std::fs::read_dir(dir.as_ref())
        .map_err(|e| Error::InvalidRequest(format!("failed to read directory: {e}")))?;

    let mut templates = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        if let Ok(template) = RequestTemplate::from_file(&path) {
            templates.push(template);
        }
    }
    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQ: &str = "GET /item?id=1'+AND+IF(<INJECT>,1,2)--+- HTTP/1.1\nHost: target.example\nUser-Agent: test\n\n";

    #[test]
    fn parses_request_line_and_headers() {
        let t = RequestTemplate::parse(REQ).unwrap();
        assert_eq!(t.method, "GET");
        assert_eq!(t.host, "target.example");
        assert_eq!(t.scheme, "https");
        assert!(t.path.starts_with("/item?id=1"));
        assert_eq!(t.header("user-agent"), Some("test"));
        assert!(t.marker.is_some());
        assert!(t.marker_in_request_line());
    }

    #[test]
    fn missing_host_is_rejected() {
        let err = RequestTemplate::parse("GET /x HTTP/1.1\nAccept: */*\n").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn absolute_form_target_sets_scheme_and_host() {
        let raw = "GET http://alt.example:8080/a?b=<PAYLOAD> HTTP/1.1\nHost: ignored.example\n\n";
        let t = RequestTemplate::parse(raw).unwrap();
        assert_eq!(t.scheme, "http");
        assert_eq!(t.host, "alt.example:8080");
        assert_eq!(t.path, "/a?b=<PAYLOAD>");
    }

    #[test]
    fn request_line_payload_is_query_encoded() {
        let t = RequestTemplate::parse(REQ).unwrap();
        let out = t.substitute("1='a'");
        assert!(out.contains("1%3D%27a%27"), "got: {out}");
        assert!(!out.contains("<INJECT>"));
    }

    #[test]
    fn body_payload_is_literal() {
        let raw = "POST /login HTTP/1.1\nHost: t\nContent-Type: application/x-www-form-urlencoded\n\nuser=x&check=<FUZZ>";
        let t = RequestTemplate::parse(raw).unwrap();
        assert!(!t.marker_in_request_line());
        let out = t.substitute("'q'='q'");
        assert!(out.ends_with("check='q'='q'"));
    }

    #[test]
    fn only_first_marker_is_replaced() {
        let raw = "GET /x?a=<PAYLOAD>&b=<PAYLOAD> HTTP/1.1\nHost: t\n\n";
        let t = RequestTemplate::parse(raw).unwrap();
        let out = t.substitute("1");
        assert_eq!(out.matches("<PAYLOAD>").count(), 1);
    }

    #[test]
    fn earliest_marker_wins() {
        let raw = "GET /x?a=<FUZZ>&b=<PAYLOAD> HTTP/1.1\nHost: t\n\n";
        let t = RequestTemplate::parse(raw).unwrap();
        assert_eq!(t.marker.unwrap().1, "<FUZZ>");
    }

    #[test]
    fn from_url_builds_get_template() {
        let t = RequestTemplate::from_url("example.com/search?q=1").unwrap();
        assert_eq!(t.method, "GET");
        assert_eq!(t.scheme, "https");
        assert_eq!(t.host, "example.com");
        assert_eq!(t.path, "/search?q=1");
        assert!(t.marker.is_none());
    }

    #[test]
    fn build_preserves_scheme_override() {
        let mut t = RequestTemplate::parse(REQ).unwrap();
        t.scheme = "http".to_string();
        let built = t.build("3=3").unwrap();
        assert_eq!(built.scheme, "http");
    }
}
