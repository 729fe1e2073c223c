//! `faultline serve`: HTTP/1 transport over [`QueryOrchestrator`].
//!
//! Routes:
//! - `POST /query`: JSON `{"query": "..."}` → `{"results": [...], "count": n}`
//! - `GET /healthz`: liveness
//!
//! One task per connection. On Ctrl-C/SIGTERM the listener stops accepting,
//! open connections finish their in-flight request, then the process exits.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use faultline_query::{ErrorKind, QueryError, QueryOrchestrator, QueryRequest, RequestContext};

/// Request bodies above this size are rejected with 413.
const MAX_BODY_BYTES: usize = 1 << 20;
/// How long open connections get to drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub ready_file: Option<PathBuf>,
}

struct ServerState {
    orchestrator: QueryOrchestrator,
}

pub fn cmd_serve(config: ServerConfig, orchestrator: QueryOrchestrator) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(async move { serve_async(config, orchestrator).await })
}

async fn serve_async(config: ServerConfig, orchestrator: QueryOrchestrator) -> Result<()> {
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {}: {e}", config.listen))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;
    info!(addr = %bound, "listening");

    if let Some(path) = config.ready_file.as_ref() {
        let payload = serde_json::json!({
            "version": "faultline_server_ready_v1",
            "addr": bound.to_string(),
            "pid": std::process::id(),
        });
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::write(path, serde_json::to_string_pretty(&payload).unwrap_or_default())
            .map_err(|e| anyhow!("serve: failed to write ready file {}: {e}", path.display()))?;
    }

    let state = Arc::new(ServerState { orchestrator });
    // Every connection holds a receiver; `closed()` resolves once all of
    // them are gone.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let state = state.clone();
                let mut shutdown_rx = shutdown_rx.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| handle_request(req, state.clone()));
                    let conn = http1::Builder::new().serve_connection(io, service);
                    tokio::pin!(conn);
                    let result = tokio::select! {
                        res = conn.as_mut() => res,
                        _ = shutdown_rx.changed() => {
                            conn.as_mut().graceful_shutdown();
                            conn.await
                        }
                    };
                    if let Err(e) = result {
                        debug!(%peer, error = %e, "connection error");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received; draining connections");
                break;
            }
        }
    }

    drop(listener);
    drop(shutdown_rx);
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(DRAIN_TIMEOUT, shutdown_tx.closed())
        .await
        .is_err()
    {
        warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "connections still open after drain timeout");
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Cancels the request's context when the handler future is dropped, e.g.
/// because the client went away mid-request.
struct CancelOnDrop(RequestContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = match (&method, path.as_str()) {
        (&Method::POST, "/query") => handle_query(req, &state).await,
        (&Method::GET, "/healthz") => respond(StatusCode::OK, TEXT, "ok\n"),
        (_, "/query") => method_not_allowed("POST"),
        (_, "/healthz") => method_not_allowed("GET"),
        _ => error_reply(StatusCode::NOT_FOUND, "not found"),
    };

    debug!(%method, %path, status = resp.status().as_u16(), "handled request");
    Ok(resp)
}

async fn handle_query(req: Request<Incoming>, state: &ServerState) -> Response<Full<Bytes>> {
    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let status = if e.downcast_ref::<LengthLimitError>().is_some() {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::BAD_REQUEST
            };
            return error_reply(status, &format!("failed to read request body: {e}"));
        }
    };
    let request: QueryRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_reply(StatusCode::BAD_REQUEST, &format!("invalid request body: {e}"));
        }
    };

    let guard = CancelOnDrop(RequestContext::new());
    match state.orchestrator.execute(&guard.0, &request).await {
        Ok(response) => json_reply(StatusCode::OK, &response),
        Err(e) => query_error_reply(&e),
    }
}

const TEXT: &str = "text/plain; charset=utf-8";
const JSON: &str = "application/json";

/// Body of every non-2xx JSON reply.
#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

fn json_reply<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, JSON, body),
        Err(e) => {
            error!(error = %e, "failed to encode response body");
            respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, "internal server error\n")
        }
    }
}

fn error_reply(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_reply(status, &ErrorBody { error: message })
}

/// Shape errors are the caller's fault (400); everything else is ours (500)
/// and only its category leaves the process.
fn query_error_reply(e: &QueryError) -> Response<Full<Bytes>> {
    let status = match e.kind() {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => {
            warn!(error = %e, canceled = e.is_canceled(), "query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_reply(status, &e.public_message())
}

fn method_not_allowed(allow: &'static str) -> Response<Full<Bytes>> {
    let mut resp = error_reply(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    resp.headers_mut().insert(ALLOW, HeaderValue::from_static(allow));
    resp
}

#[cfg(test)]
mod tests {
    use faultline_query::{Cancellation, QueryShapeError};
    use http_body_util::BodyExt;

    use super::*;

    async fn body_json(resp: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn shape_errors_are_bad_requests_with_their_message() {
        let resp = query_error_reply(&QueryError::from(QueryShapeError::EmptyQuery));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers()[CONTENT_TYPE], JSON);
        assert_eq!(body_json(resp).await, serde_json::json!({ "error": "query is empty" }));
    }

    #[tokio::test]
    async fn internal_errors_only_name_their_category() {
        let resp = query_error_reply(&QueryError::from(Cancellation::DeadlineExceeded));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(
            body["error"].as_str(),
            Some(Cancellation::DeadlineExceeded.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn wrong_method_lists_the_allowed_one() {
        let resp = method_not_allowed("POST");
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers()[ALLOW], "POST");
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({ "error": "method not allowed" })
        );
    }

    #[test]
    fn health_replies_are_plain_text() {
        let resp = respond(StatusCode::OK, TEXT, "ok\n");
        assert_eq!(resp.headers()[CONTENT_TYPE], TEXT);
    }
}
