use async_trait::async_trait;
use reqwest::Client;

use crate::fetch::{build_url, parse_body, AuditSource, FetchError, ReportQuery};
use crate::logging::{log, log_fetch_failure, log_fetch_start, obj, v_num, Domain, Level, TimedScope};
use crate::payload::RawAuditPayload;

/// Fetches the audit record from the spreadsheet script endpoint.
/// One GET per call; no timeout, no retry.
pub struct HttpAuditSource {
    client: Client,
    base: String,
}

impl HttpAuditSource {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base: base.into(),
        }
    }

    pub fn with_client(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    async fn fetch_once(&self, query: &ReportQuery) -> Result<RawAuditPayload, FetchError> {
        let url = build_url(&self.base, query)?;
        log_fetch_start(url.as_str());

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: Some(status.as_u16()),
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            });
        }

        let body = resp.bytes().await.map_err(|e| FetchError::Http {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;
        log(
            Level::Debug,
            Domain::Fetch,
            "response",
            obj(&[
                ("status", v_num(status.as_u16() as f64)),
                ("bytes", v_num(body.len() as f64)),
            ]),
        );
        parse_body(&body)
    }
}

#[async_trait]
impl AuditSource for HttpAuditSource {
    async fn fetch(&self, query: &ReportQuery) -> Result<RawAuditPayload, FetchError> {
        let _timing = TimedScope::new(Domain::Fetch, "http_fetch");
        let result = self.fetch_once(query).await;
        if let Err(e) = &result {
            log_fetch_failure(e.kind(), &e.to_string());
        }
        result
    }
}
