//! Connection Hub: axum WebSocket endpoint, session lifecycle and the
//! inbound command grammar. The Hub is the sole async global listener
//! registered on the Output Dispatcher; wiring is done at construction
//! time via `OutputDispatcher::subscribe_global_async` rather than a
//! process-global registry, avoiding a cyclic reference between the two.

pub mod protocol;
pub mod session;

use crate::dispatch::{DispatchError, OutputDispatcher};
use crate::error::HubError;
use crate::model::OutputEvent;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use protocol::{InboundCommand, OutboundEnvelope, OutboundPayload};
use session::{SessionId, SessionManager};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Commands the Hub cannot satisfy itself (`project_select`,
/// `project_start`, `project_stop`) are forwarded to whatever owns
/// project lifecycle (the Orchestrator) through this trait, keeping the
/// Hub decoupled from the orchestrator's internals (dependency
/// injection, not a registry singleton).
pub trait ProjectController: Send + Sync {
    fn select_project(&self, project: &str) -> Result<(), String>;
    fn start_project(&self, project: &str) -> Result<(), String>;
    fn stop_project(&self, project: &str) -> Result<(), String>;
    fn project_exists(&self, project: &str) -> bool;
}

pub struct ConnectionHub {
    sessions: SessionManager,
    controller: Arc<dyn ProjectController>,
    gesture_update_interval: Duration,
    max_connections: usize,
    last_sent: Mutex<HashMap<(SessionId, String), Instant>>,
    envelope_counter: AtomicU64,
}

impl ConnectionHub {
    pub fn new(
        controller: Arc<dyn ProjectController>,
        gesture_update_interval: Duration,
        max_connections: usize,
    ) -> Self {
        ConnectionHub {
            sessions: SessionManager::new(),
            controller,
            gesture_update_interval,
            max_connections,
            last_sent: Mutex::new(HashMap::new()),
            envelope_counter: AtomicU64::new(1),
        }
    }

    fn next_envelope_id(&self) -> u64 {
        self.envelope_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.session_count()
    }

    /// Registers this hub as the dispatcher's sole global async listener
    /// The returned handle is retained by the caller if it ever needs to
    /// unsubscribe (e.g. during orchestrated shutdown).
    pub fn attach(self: &Arc<Self>, dispatcher: &OutputDispatcher) {
        let hub = self.clone();
        dispatcher.subscribe_global_async(move |event: &OutputEvent| {
            let hub = hub.clone();
            let event = event.clone();
            Box::pin(async move {
                hub.on_event(&event).await;
                Ok(())
            }) as BoxFuture<'static, Result<(), DispatchError>>
        });
    }

    /// Looks up every session subscribed to `event.project` and pushes a
    /// `gesture_data` message to each, coalescing to at most one outbound
    /// send per (session, project) pair per `gesture_update_interval`.
    async fn on_event(&self, event: &OutputEvent) {
        let subscribers = self.sessions.subscribers_of(&event.project);
        if subscribers.is_empty() {
            return;
        }

        let now = Instant::now();
        for session in subscribers {
            let key = (session.id, event.project.clone());
            let should_send = {
                let mut last_sent = self.last_sent.lock();
                match last_sent.get(&key) {
                    Some(&prev) if now.duration_since(prev) < self.gesture_update_interval => false,
                    _ => {
                        last_sent.insert(key, now);
                        true
                    }
                }
            };
            if !should_send {
                continue;
            }

            let envelope = OutboundEnvelope::new(
                self.next_envelope_id(),
                Self::now_ms(),
                OutboundPayload::GestureData {
                    project: event.project.clone(),
                    timestamp: event.timestamp_ms as f64 / 1000.0,
                    data: event.data.clone(),
                },
            );
            if let Err(err) = session.send(envelope) {
                warn!(session_id = session.id, error = %err, "gesture_data delivery failed");
            }
        }
    }

    /// Handles one inbound command, returning the response payload to
    /// send back on the same session.
    fn handle_command(&self, id: SessionId, command: InboundCommand) -> OutboundPayload {
        match command {
            InboundCommand::Ping => OutboundPayload::Pong,
            InboundCommand::Subscribe { project } => {
                if !self.controller.project_exists(&project) {
                    return error_payload(&HubError::ProjectNotFound(project));
                }
                match self.sessions.subscribe(id, &project) {
                    Ok(()) => OutboundPayload::Subscribed { project },
                    Err(err) => error_payload(&err),
                }
            }
            InboundCommand::Unsubscribe { project } => {
                if !self.controller.project_exists(&project) {
                    return error_payload(&HubError::ProjectNotFound(project));
                }
                match self.sessions.unsubscribe(id, &project) {
                    Ok(()) => OutboundPayload::Unsubscribed { project },
                    Err(err) => error_payload(&err),
                }
            }
            InboundCommand::ProjectSelect { project } => {
                match self.sessions.select_project(id, &project) {
                    Ok(()) => match self.controller.select_project(&project) {
                        Ok(()) => OutboundPayload::ProjectSelected { project },
                        Err(message) => OutboundPayload::Error {
                            code: "project_select_failed".to_string(),
                            message,
                        },
                    },
                    Err(err) => error_payload(&err),
                }
            }
            InboundCommand::ProjectStart { project } => match self.controller.start_project(&project) {
                Ok(()) => OutboundPayload::StatusChange {
                    project,
                    status: "running".to_string(),
                },
                Err(message) => OutboundPayload::Error {
                    code: "project_start_failed".to_string(),
                    message,
                },
            },
            InboundCommand::ProjectStop { project } => match self.controller.stop_project(&project) {
                Ok(()) => OutboundPayload::StatusChange {
                    project,
                    status: "stopped".to_string(),
                },
                Err(message) => OutboundPayload::Error {
                    code: "project_stop_failed".to_string(),
                    message,
                },
            },
        }
    }

    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket) {
        if self.sessions.session_count() >= self.max_connections {
            warn!(
                max = self.max_connections,
                "rejecting connection: max_websocket_connections reached"
            );
            let (mut ws_tx, _ws_rx) = socket.split();
            let envelope = OutboundEnvelope::new(
                self.next_envelope_id(),
                Self::now_ms(),
                OutboundPayload::Error {
                    code: "connection_limit_reached".to_string(),
                    message: format!(
                        "server already has {} active connections",
                        self.max_connections
                    ),
                },
            );
            if let Ok(text) = serde_json::to_string(&envelope) {
                let _ = ws_tx.send(Message::Text(text)).await;
            }
            let _ = ws_tx.close().await;
            return;
        }

        let (mut ws_tx, mut ws_rx) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundEnvelope>();
        let session = self.sessions.register(tx);
        let session_id = session.id;

        let welcome = OutboundEnvelope::new(
            self.next_envelope_id(),
            Self::now_ms(),
            OutboundPayload::Connected {
                session_id: session_id.to_string(),
            },
        );
        if session.send(welcome).is_err() {
            self.sessions.remove(session_id);
            return;
        }

        let forward_task = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let text = match serde_json::to_string(&envelope) {
                    Ok(text) => text,
                    Err(err) => {
                        error!(error = %err, "failed to serialize outbound envelope");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(err) => {
                    debug!(session_id, error = %err, "websocket read error");
                    break;
                }
            };
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let command: InboundCommand = match serde_json::from_str(&text) {
                Ok(cmd) => cmd,
                Err(err) => {
                    let _ = session.send(OutboundEnvelope::new(
                        self.next_envelope_id(),
                        Self::now_ms(),
                        OutboundPayload::Error {
                            code: "invalid_command".to_string(),
                            message: err.to_string(),
                        },
                    ));
                    continue;
                }
            };
            let response = self.handle_command(session_id, command);
            if session
                .send(OutboundEnvelope::new(
                    self.next_envelope_id(),
                    Self::now_ms(),
                    response,
                ))
                .is_err()
            {
                break;
            }
        }

        self.sessions.remove(session_id);
        forward_task.abort();
        info!(session_id, "session closed");
    }

    /// Broadcasts `server_shutdown` to every connected session, best
    /// effort and bounded. Called once from the orchestrator's stop path.
    pub fn broadcast_shutdown(&self) {
        for session in self.sessions.all_sessions() {
            let envelope = OutboundEnvelope::new(
                self.next_envelope_id(),
                Self::now_ms(),
                OutboundPayload::ServerShutdown,
            );
            if let Err(err) = session.send(envelope) {
                warn!(session_id = session.id, error = %err, "shutdown broadcast failed");
            }
        }
    }
}

fn error_payload(err: &HubError) -> OutboundPayload {
    let code = match err {
        HubError::SessionNotFound(_) => "session_not_found",
        HubError::ProjectNotFound(_) => "project_not_found",
        HubError::SendFailed(_, _) => "send_failed",
    };
    OutboundPayload::Error {
        code: code.to_string(),
        message: err.to_string(),
    }
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<ConnectionHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| hub.handle_socket(socket))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubController;
    impl ProjectController for StubController {
        fn select_project(&self, _project: &str) -> Result<(), String> {
            Ok(())
        }
        fn start_project(&self, _project: &str) -> Result<(), String> {
            Ok(())
        }
        fn stop_project(&self, _project: &str) -> Result<(), String> {
            Ok(())
        }
        fn project_exists(&self, _project: &str) -> bool {
            true
        }
    }

    struct RejectingController;
    impl ProjectController for RejectingController {
        fn select_project(&self, _project: &str) -> Result<(), String> {
            Ok(())
        }
        fn start_project(&self, _project: &str) -> Result<(), String> {
            Ok(())
        }
        fn stop_project(&self, _project: &str) -> Result<(), String> {
            Ok(())
        }
        fn project_exists(&self, _project: &str) -> bool {
            false
        }
    }

    fn hub() -> ConnectionHub {
        ConnectionHub::new(Arc::new(StubController), Duration::from_millis(33), 10)
    }

    #[test]
    fn ping_returns_pong() {
        let hub = hub();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = hub.sessions.register(tx);
        let response = hub.handle_command(session.id, InboundCommand::Ping);
        assert!(matches!(response, OutboundPayload::Pong));
    }

    #[test]
    fn project_select_is_atomic_unsubscribe_all_then_subscribe() {
        let hub = hub();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = hub.sessions.register(tx);
        hub.handle_command(
            session.id,
            InboundCommand::Subscribe {
                project: "finger_count".to_string(),
            },
        );
        hub.handle_command(
            session.id,
            InboundCommand::ProjectSelect {
                project: "volume_control".to_string(),
            },
        );
        assert!(!session.is_subscribed("finger_count"));
        assert!(session.is_subscribed("volume_control"));
    }

    #[tokio::test]
    async fn gesture_update_interval_coalesces_rapid_events() {
        let hub = Arc::new(hub());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = hub.sessions.register(tx);
        hub.sessions.subscribe(session.id, "finger_count").unwrap();

        let event = OutputEvent {
            event_type: "gesture_data".to_string(),
            project: "finger_count".to_string(),
            timestamp_ms: 0,
            data: serde_json::json!({}),
        };

        hub.on_event(&event).await;
        hub.on_event(&event).await;

        // welcome wasn't sent via on_event, so only one gesture_data should appear.
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn subscribe_to_unknown_project_is_rejected() {
        let hub = ConnectionHub::new(
            Arc::new(RejectingController),
            Duration::from_millis(33),
            10,
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = hub.sessions.register(tx);
        let response = hub.handle_command(
            session.id,
            InboundCommand::Subscribe {
                project: "nonexistent".to_string(),
            },
        );
        match response {
            OutboundPayload::Error { code, .. } => assert_eq!(code, "project_not_found"),
            other => panic!("expected project_not_found error, got {other:?}"),
        }
        assert!(!session.is_subscribed("nonexistent"));
    }

    #[test]
    fn connections_beyond_max_are_rejected_without_registering() {
        let hub = ConnectionHub::new(Arc::new(StubController), Duration::from_millis(33), 1);
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.sessions.register(tx);
        assert_eq!(hub.session_count(), 1);
        // handle_socket's cap check is exercised end-to-end in the websocket
        // integration tests; here we just confirm the accounting it relies on.
        assert!(hub.session_count() >= hub.max_connections);
    }
}
