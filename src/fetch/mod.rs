use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use url::Url;

use crate::payload::RawAuditPayload;

mod http;

pub use http::HttpAuditSource;

/// Identifies which upstream record to load. Mirrors the page query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportQuery {
    pub row: Option<String>,
    pub client: Option<String>,
}

impl ReportQuery {
    pub fn row(row: impl Into<String>) -> Self {
        Self {
            row: Some(row.into()),
            client: None,
        }
    }

    pub fn client(client: impl Into<String>) -> Self {
        Self {
            row: None,
            client: Some(client.into()),
        }
    }

    /// Parse `?row=12&client=abc`. Unknown keys are ignored.
    pub fn from_query_string(query: &str) -> Self {
        let mut out = Self::default();
        let trimmed = query.trim_start_matches('?');
        for (key, value) in url::form_urlencoded::parse(trimmed.as_bytes()) {
            match key.as_ref() {
                "row" => out.row = Some(value.into_owned()),
                "client" => out.client = Some(value.into_owned()),
                _ => {}
            }
        }
        out
    }

    /// The single key forwarded upstream; `client` wins over `row`.
    pub fn forwarded(&self) -> Option<(&'static str, &str)> {
        non_blank(&self.client)
            .map(|c| ("client", c))
            .or_else(|| non_blank(&self.row).map(|r| ("row", r)))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Transport failure or non-success status. `status` is `None` when no
    /// response arrived at all.
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Upstream answered but reported an error of its own.
    Upstream(String),
    /// Body was not a JSON object.
    Malformed(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Http { .. } => "http",
            FetchError::Upstream(_) => "upstream",
            FetchError::Malformed(_) => "malformed",
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http {
                status: Some(code),
                message,
            } => write!(f, "failed to fetch data: HTTP {}: {}", code, message),
            FetchError::Http {
                status: None,
                message,
            } => write!(f, "failed to fetch data: {}", message),
            FetchError::Upstream(message) => write!(f, "{}", message),
            FetchError::Malformed(reason) => write!(f, "malformed response: {}", reason),
        }
    }
}

impl std::error::Error for FetchError {}

#[async_trait]
pub trait AuditSource {
    async fn fetch(&self, query: &ReportQuery) -> Result<RawAuditPayload, FetchError>;
}

/// Append at most one forwarded key to the base endpoint.
pub fn build_url(base: &str, query: &ReportQuery) -> Result<Url, FetchError> {
    let mut url = Url::parse(base).map_err(|e| FetchError::Http {
        status: None,
        message: format!("invalid endpoint {}: {}", base, e),
    })?;
    if let Some((key, value)) = query.forwarded() {
        url.query_pairs_mut().append_pair(key, value);
    }
    Ok(url)
}

/// Parse a response body and surface an upstream `error` field.
pub fn parse_body(body: &[u8]) -> Result<RawAuditPayload, FetchError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    let payload = RawAuditPayload::from_value(value)
        .ok_or_else(|| FetchError::Malformed("expected a JSON object".to_string()))?;
    if let Some(message) = payload.get("error").and_then(upstream_error_message) {
        return Err(FetchError::Upstream(message));
    }
    Ok(payload)
}

// Falsy values (null, false, 0, "") do not count as an error.
fn upstream_error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://example.test/macros/exec";

    #[test]
    fn base_url_unmodified_without_keys() {
        let url = build_url(BASE, &ReportQuery::default()).unwrap();
        assert_eq!(url.as_str(), BASE);
    }

    #[test]
    fn client_takes_precedence_over_row() {
        let q = ReportQuery {
            row: Some("12".into()),
            client: Some("acme".into()),
        };
        let url = build_url(BASE, &q).unwrap();
        assert_eq!(url.as_str(), format!("{}?client=acme", BASE));
    }

    #[test]
    fn blank_client_falls_back_to_row() {
        let q = ReportQuery {
            row: Some("7".into()),
            client: Some("  ".into()),
        };
        let url = build_url(BASE, &q).unwrap();
        assert_eq!(url.query(), Some("row=7"));
    }

    #[test]
    fn values_are_encoded() {
        let url = build_url(BASE, &ReportQuery::client("a&b c")).unwrap();
        assert_eq!(url.query(), Some("client=a%26b+c"));
    }

    #[test]
    fn query_string_parsing() {
        let q = ReportQuery::from_query_string("?row=12&tab=costs&client=x%20y");
        assert_eq!(q.row.as_deref(), Some("12"));
        assert_eq!(q.client.as_deref(), Some("x y"));
        assert_eq!(ReportQuery::from_query_string(""), ReportQuery::default());
    }

    #[test]
    fn upstream_error_field() {
        let err = parse_body(br#"{"error":"not found"}"#).unwrap_err();
        assert_eq!(err, FetchError::Upstream("not found".into()));
        assert_eq!(err.kind(), "upstream");
    }

    #[test]
    fn falsy_error_fields_are_ignored() {
        for body in [
            r#"{"error":null,"revenue":1}"#,
            r#"{"error":"","revenue":1}"#,
            r#"{"error":false,"revenue":1}"#,
        ] {
            assert!(parse_body(body.as_bytes()).is_ok(), "{}", body);
        }
        let err = parse_body(br#"{"error":{"code":4}}"#).unwrap_err();
        assert_eq!(err, FetchError::Upstream(r#"{"code":4}"#.into()));
    }

    #[test]
    fn malformed_bodies() {
        assert!(matches!(parse_body(b"<html>"), Err(FetchError::Malformed(_))));
        assert!(matches!(parse_body(b"[1,2]"), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn display_messages() {
        let e = FetchError::Http {
            status: Some(503),
            message: "Service Unavailable".into(),
        };
        assert_eq!(e.to_string(), "failed to fetch data: HTTP 503: Service Unavailable");
        assert_eq!(FetchError::Upstream("not found".into()).to_string(), "not found");
    }
}
