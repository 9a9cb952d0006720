//! HTTP surface for the session transport.
//!
//! `GET /sse` opens a session and streams its events. The first event is
//! `endpoint`, whose data is the URL to POST messages to. `POST /messages`
//! accepts a JSON-RPC message for a session and answers `202 Accepted`; the
//! JSON-RPC response travels back over the event stream.

use super::sessions::{SessionEvent, SessionManager};
use crate::core::error::ToolError;
use crate::mcp::server::encode_response;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const SSE_PATH: &str = "/sse";
pub const MESSAGES_PATH: &str = "/messages";

pub fn router(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route(SSE_PATH, get(open_stream))
        .route(MESSAGES_PATH, post(post_message))
        .with_state(manager)
}

/// Serves until `shutdown` fires, then closes every session before the
/// listener is released.
pub async fn serve(
    listener: TcpListener,
    manager: Arc<SessionManager>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    info!(addr = ?addr, "SSE transport listening");

    let teardown = manager.clone();
    let signal = shutdown.clone();
    let app = router(manager);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.cancelled().await;
            // Ends the event streams so the graceful shutdown can finish.
            teardown.shutdown();
        })
        .await?;
    info!("SSE transport stopped");
    Ok(())
}

/// Closes the session when the client's event stream is dropped.
struct SessionGuard {
    manager: Arc<SessionManager>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.manager.close(&self.session_id) {
            debug!(session = %self.session_id, "Event stream dropped");
        }
    }
}

async fn open_stream(
    State(manager): State<Arc<SessionManager>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let (session_id, events) = manager
        .open()
        .map_err(|err| (StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{MESSAGES_PATH}?sessionId={session_id}"));
    let guard = SessionGuard {
        manager,
        session_id,
    };
    let updates = stream::unfold((events, guard), |(mut events, guard)| async move {
        let event = events.recv().await?;
        Some((Ok::<_, Infallible>(to_event(event)), (events, guard)))
    });
    Ok(Sse::new(stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(updates)))
}

fn to_event(event: SessionEvent) -> Event {
    match event {
        SessionEvent::Message(response) => Event::default()
            .event("message")
            .data(encode_response(&response)),
        SessionEvent::Keepalive => Event::default().comment("keepalive"),
    }
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Body form used when the session id is not in the query string.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "sessionId")]
    session_id: String,
    message: Value,
}

async fn post_message(
    State(manager): State<Arc<SessionManager>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let routed = match query.session_id {
        Some(session_id) => Ok((session_id, body)),
        None => serde_json::from_str::<Envelope>(&body)
            .map(|envelope| (envelope.session_id, envelope.message.to_string()))
            .map_err(|err| err.to_string()),
    };
    let (session_id, message) = match routed {
        Ok(routed) => routed,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Missing sessionId: {err}"),
            )
                .into_response();
        }
    };

    match manager.send(&session_id, message) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err @ ToolError::SessionNotFound(_)) => {
            warn!(session = %session_id, "Message for unknown session");
            (StatusCode::NOT_FOUND, err.to_string()).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SystemClock;
    use crate::core::config::{ConfigStore, EnvOverrides};
    use crate::core::pdf::PopplerInspector;
    use crate::core::upload::tests::FakeRemote;
    use crate::tools::ToolContext;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Splits a streamed body into trimmed, non-empty lines.
    #[derive(Default)]
    struct SseLineBuffer {
        buffer: Vec<u8>,
    }

    impl SseLineBuffer {
        fn push(&mut self, chunk: &[u8]) -> Vec<String> {
            self.buffer.extend_from_slice(chunk);
            let mut lines = Vec::new();
            while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=newline).collect();
                if let Ok(text) = std::str::from_utf8(&line) {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        lines.push(trimmed.to_string());
                    }
                }
            }
            lines
        }
    }

    fn manager(dir: &TempDir) -> Arc<SessionManager> {
        let ctx = ToolContext::new(
            Arc::new(ConfigStore::new(
                dir.path().join("config.toml"),
                EnvOverrides::default(),
            )),
            Arc::new(FakeRemote::default()),
            Arc::new(PopplerInspector),
        );
        Arc::new(SessionManager::new(ctx, Arc::new(SystemClock)))
    }

    #[test]
    fn line_buffer_handles_partial_chunks() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"event: endp").is_empty());
        assert_eq!(
            buffer.push(b"oint\r\ndata: /messages\n\n"),
            vec!["event: endpoint", "data: /messages"]
        );
    }

    #[tokio::test]
    async fn unknown_session_gets_404() {
        let dir = TempDir::new().expect("tempdir");
        let manager = manager(&dir);
        let response = router(manager.clone())
            .oneshot(
                Request::post("/messages?sessionId=missing")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn body_envelope_routes_to_an_open_session() {
        let dir = TempDir::new().expect("tempdir");
        let manager = manager(&dir);
        let (session_id, mut events) = manager.open().expect("open");

        let body = json!({
            "sessionId": session_id,
            "message": {"jsonrpc": "2.0", "id": 5, "method": "tools/list"}
        });
        let response = router(manager.clone())
            .oneshot(
                Request::post("/messages")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::Message(_))
        ));
    }

    #[tokio::test]
    async fn missing_session_id_is_a_bad_request() {
        let dir = TempDir::new().expect("tempdir");
        let response = router(manager(&dir))
            .oneshot(
                Request::post("/messages")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn event_stream_round_trip_over_http() {
        let dir = TempDir::new().expect("tempdir");
        let manager = manager(&dir);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(listener, manager.clone(), shutdown.clone()));

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{addr}{SSE_PATH}"))
            .send()
            .await
            .expect("open stream");
        let mut body = response.bytes_stream();
        let mut lines = SseLineBuffer::default();

        let mut endpoint = None;
        while endpoint.is_none() {
            let chunk = body.next().await.expect("chunk").expect("bytes");
            endpoint = lines
                .push(&chunk)
                .into_iter()
                .find_map(|line| line.strip_prefix("data:").map(|data| data.trim().to_string()));
        }
        let endpoint = endpoint.expect("endpoint event");
        assert!(endpoint.starts_with("/messages?sessionId="));

        let posted = client
            .post(format!("http://{addr}{endpoint}"))
            .body(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string())
            .send()
            .await
            .expect("post");
        assert_eq!(posted.status().as_u16(), 202);

        let mut reply = None;
        while reply.is_none() {
            let chunk = body.next().await.expect("chunk").expect("bytes");
            reply = lines
                .push(&chunk)
                .into_iter()
                .filter_map(|line| line.strip_prefix("data:").map(|data| data.trim().to_string()))
                .find(|data| data.starts_with('{'));
        }
        let reply: Value = serde_json::from_str(&reply.expect("reply")).expect("json");
        assert_eq!(reply["id"], json!(1));
        assert_eq!(reply["result"], json!({}));

        shutdown.cancel();
        server.await.expect("join").expect("serve");
        assert!(manager.is_empty());
    }
}
