//! Drives the HTTP sources against a throwaway single-shot server.

use std::time::Duration;

use faultline_ingest::{
    Criteria, ElasticsearchLogSource, JaegerTraceSource, LogFactSource, RequestContext,
    SourceError, TraceFactSource,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serve one canned response; the first request line is sent back over the
/// returned channel.
async fn serve_once(status: &'static str, body: String) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = vec![0u8; 16 * 1024];
        let n = socket.read(&mut buf).await.unwrap_or(0);
        let request = String::from_utf8_lossy(&buf[..n]).to_string();
        let first_line = request.lines().next().unwrap_or_default().to_string();
        let _ = tx.send(first_line);

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });

    (format!("http://{addr}"), rx)
}

#[tokio::test]
async fn jaeger_source_fetches_and_decodes_traces() {
    let body = serde_json::json!({
        "data": [{
            "traceID": "t1",
            "spans": [{
                "traceID": "t1",
                "spanID": "s1",
                "operationName": "GET /orders",
                "references": [],
                "duration": 42_000,
                "tags": [{"key": "http.status_code", "value": 500}],
                "processID": "p1"
            }],
            "processes": {"p1": {"serviceName": "api-gateway"}}
        }]
    })
    .to_string();
    let (base, request_line) = serve_once("200 OK", body).await;

    let source = JaegerTraceSource::new(&base, Duration::from_secs(5)).expect("source");
    let facts = source
        .fetch_traces(&RequestContext::new(), "api-gateway")
        .await
        .expect("fetch");

    let rendered: Vec<String> = facts.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            r#"span("t1", "s1", "", "api-gateway", "GET /orders", 42)"#,
            r#"tag("t1", "s1", "http.status_code", "500")"#,
        ]
    );
    let line = request_line.await.expect("request line");
    assert!(line.starts_with("GET /api/traces?service=api-gateway "), "{line}");
}

#[tokio::test]
async fn jaeger_non_ok_status_is_an_error() {
    let (base, _request_line) = serve_once("503 Service Unavailable", "{}".to_string()).await;
    let source = JaegerTraceSource::new(&base, Duration::from_secs(5)).expect("source");
    let err = source
        .fetch_traces(&RequestContext::new(), "api-gateway")
        .await
        .expect_err("should fail");
    assert!(matches!(err, SourceError::Status { status: 503, .. }), "{err}");
}

#[tokio::test]
async fn elasticsearch_source_posts_a_search() {
    let body = serde_json::json!({
        "hits": {"hits": [
            {"_id": "doc-1", "_source": {"service": "order-service", "status": 500}}
        ]}
    })
    .to_string();
    let (base, request_line) = serve_once("200 OK", body).await;

    let source =
        ElasticsearchLogSource::new(&base, "logs", Duration::from_secs(5)).expect("source");
    let facts = source
        .fetch_logs(&RequestContext::new(), &Criteria::new())
        .await
        .expect("fetch");

    let rendered: Vec<String> = facts.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            r#"log.field("doc-1", "service", "order-service")"#,
            r#"log.field("doc-1", "status", "500")"#,
        ]
    );
    let line = request_line.await.expect("request line");
    assert!(line.starts_with("POST /logs/_search "), "{line}");
}

#[tokio::test]
async fn canceled_context_stops_the_fetch() {
    // Nothing listens here; the canceled context must win before any I/O.
    let source =
        JaegerTraceSource::new("http://127.0.0.1:9", Duration::from_secs(5)).expect("source");
    let ctx = RequestContext::new();
    ctx.cancel();
    let err = source
        .fetch_traces(&ctx, "api-gateway")
        .await
        .expect_err("canceled");
    assert!(err.is_canceled(), "{err}");
}
