//! Runs the reqwest-backed source against a local one-shot HTTP responder.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use profitaudit::{AuditSource, FetchError, HttpAuditSource, ReportQuery};

/// Serve exactly one canned response; the handle yields the request line.
fn serve_once(status: &str, content_type: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).unwrap_or(0) == 0 || header == "\r\n" {
                break;
            }
        }
        stream.write_all(response.as_bytes()).expect("write");
        stream.flush().ok();
        request_line.trim_end().to_string()
    });
    (format!("http://{}/macros/exec", addr), handle)
}

// Proxy settings from the environment must not intercept loopback traffic.
fn local_source(base: String) -> HttpAuditSource {
    let client = reqwest::Client::builder().no_proxy().build().expect("client");
    HttpAuditSource::with_client(client, base)
}

// ---------------------------------------------------------------------------
// Success path
// ---------------------------------------------------------------------------
#[tokio::test]
async fn fetch_returns_parsed_object_untouched() {
    let body = r#"{"companyName":"Acme","revenue":"$1,000","extra":{"kept":true}}"#;
    let (base, server) = serve_once("200 OK", "application/json", body);
    let source = local_source(base);

    let raw = source.fetch(&ReportQuery::row("12")).await.expect("payload");
    assert_eq!(raw.get("companyName").unwrap(), "Acme");
    assert_eq!(raw.get("revenue").unwrap(), "$1,000");
    assert_eq!(raw.get("extra").unwrap()["kept"], true);

    let request_line = server.join().unwrap();
    assert_eq!(request_line, "GET /macros/exec?row=12 HTTP/1.1");
}

#[tokio::test]
async fn client_key_is_forwarded_instead_of_row() {
    let (base, server) = serve_once("200 OK", "application/json", "{}");
    let source = local_source(base);
    let query = ReportQuery {
        row: Some("3".into()),
        client: Some("acme-co".into()),
    };
    source.fetch(&query).await.expect("payload");
    assert_eq!(server.join().unwrap(), "GET /macros/exec?client=acme-co HTTP/1.1");
}

#[tokio::test]
async fn no_keys_requests_base_url() {
    let (base, server) = serve_once("200 OK", "application/json", "{}");
    local_source(base)
        .fetch(&ReportQuery::default())
        .await
        .expect("payload");
    assert_eq!(server.join().unwrap(), "GET /macros/exec HTTP/1.1");
}

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------
#[tokio::test]
async fn non_success_status_is_http_error() {
    let (base, server) = serve_once("500 Internal Server Error", "text/plain", "boom");
    let err = local_source(base)
        .fetch(&ReportQuery::row("1"))
        .await
        .unwrap_err();
    match err {
        FetchError::Http { status, .. } => assert_eq!(status, Some(500)),
        other => panic!("expected http error, got {:?}", other),
    }
    server.join().unwrap();
}

#[tokio::test]
async fn upstream_error_field_is_business_failure() {
    let (base, server) = serve_once("200 OK", "application/json", r#"{"error":"not found"}"#);
    let err = local_source(base)
        .fetch(&ReportQuery::client("missing"))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Upstream("not found".into()));
    server.join().unwrap();
}

#[tokio::test]
async fn html_body_is_malformed() {
    let (base, server) = serve_once("200 OK", "text/html", "<html>sign in</html>");
    let err = local_source(base)
        .fetch(&ReportQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Malformed(_)), "{:?}", err);
    server.join().unwrap();
}

#[tokio::test]
async fn unreachable_endpoint_is_http_error_without_status() {
    // bind then drop to get a port nothing listens on
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let err = local_source(format!("http://127.0.0.1:{}/exec", port))
        .fetch(&ReportQuery::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "http");
    assert!(matches!(err, FetchError::Http { status: None, .. }));
}
