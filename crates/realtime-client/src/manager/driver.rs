//! Per-connection task: handshake, session loop and automatic reconnection.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::state::{ConnectionState, StatePublisher};
use crate::backoff::Backoff;
use crate::endpoint::Endpoint;
use crate::notification::Notification;
use crate::options::{ClientOptions, TransportKind};
use crate::protocol::{EnginePacket, Handshake, SocketPacket};
use crate::timers::sleep_or_cancel;
use crate::transport::{self, Transport};
use crate::{CredentialSource, EVENT_NOTIFICATION_SEND, RealtimeError};

/// Upper bound on the goodbye exchange when a connection is torn down.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

pub(super) enum Command {
    Emit(SocketPacket),
}

/// Why the driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DriverExit {
    Cancelled,
    /// The server closed the namespace ("io server disconnect").
    ServerDisconnect,
    Rejected,
    Exhausted,
    CredentialGone,
}

enum SessionEnd {
    Cancelled,
    ServerDisconnect,
    Lost(String),
}

struct Session {
    transport: Transport,
    handshake: Handshake,
    sid: String,
}

pub(super) struct Driver {
    pub(super) endpoint: Endpoint,
    pub(super) options: ClientOptions,
    pub(super) credentials: Arc<dyn CredentialSource>,
    pub(super) token: String,
    pub(super) publisher: StatePublisher,
    pub(super) notifications: broadcast::Sender<Notification>,
    pub(super) commands: mpsc::UnboundedReceiver<Command>,
    pub(super) cancel: CancellationToken,
    pub(super) http: reqwest::Client,
}

impl Driver {
    pub(super) async fn run(mut self) -> DriverExit {
        let mut backoff = Backoff::new(
            self.options.reconnection_delay,
            self.options.reconnection_delay_max,
            self.options.randomization_factor,
        );
        let mut preferred: Option<TransportKind> = None;

        loop {
            self.drop_pending_commands();
            let transports = self.transport_order(preferred);

            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => return DriverExit::Cancelled,
                result = tokio::time::timeout(self.options.timeout, self.establish(&transports)) => {
                    result.unwrap_or(Err(RealtimeError::Timeout))
                }
            };

            let failure = match attempt {
                Ok(mut session) => {
                    backoff.reset();
                    if self.options.remember_upgrade {
                        preferred = Some(session.transport.kind());
                    }
                    tracing::info!(
                        endpoint = %self.endpoint,
                        sid = %session.sid,
                        transport = %session.transport.kind(),
                        "Realtime channel connected"
                    );
                    self.publisher.publish(ConnectionState::Connected {
                        sid: session.sid.clone(),
                    });

                    match self.run_session(&mut session).await {
                        SessionEnd::Cancelled => {
                            let _ = tokio::time::timeout(CLOSE_GRACE, self.leave(&mut session)).await;
                            return DriverExit::Cancelled;
                        }
                        SessionEnd::ServerDisconnect => {
                            tracing::info!(reason = "io server disconnect", "Server closed the realtime session");
                            let _ = tokio::time::timeout(CLOSE_GRACE, session.transport.close()).await;
                            self.publisher.publish(ConnectionState::Disconnected { error: None });
                            return DriverExit::ServerDisconnect;
                        }
                        SessionEnd::Lost(reason) => {
                            tracing::warn!(reason = %reason, "Realtime connection lost");
                            self.publisher.publish(ConnectionState::Disconnected {
                                error: Some(reason.clone()),
                            });
                            reason
                        }
                    }
                }
                Err(RealtimeError::Rejected(message)) => {
                    tracing::warn!(error = %message, "Realtime connection rejected");
                    self.publisher.publish(ConnectionState::Disconnected {
                        error: Some(message),
                    });
                    return DriverExit::Rejected;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Realtime connection attempt failed");
                    let reason = e.to_string();
                    self.publisher.publish(ConnectionState::Disconnected {
                        error: Some(reason.clone()),
                    });
                    reason
                }
            };

            if self.cancel.is_cancelled() {
                return DriverExit::Cancelled;
            }
            if backoff.attempt() >= self.options.reconnection_attempts {
                tracing::error!(
                    attempts = backoff.attempt(),
                    error = %failure,
                    "Reconnection attempts exhausted"
                );
                self.publisher.publish(ConnectionState::Failed { error: failure });
                return DriverExit::Exhausted;
            }

            let delay = backoff.next_delay();
            let attempt = backoff.attempt();
            self.publisher.publish(ConnectionState::Reconnecting { attempt });
            tracing::info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting realtime channel"
            );
            if sleep_or_cancel(&self.cancel, delay).await {
                return DriverExit::Cancelled;
            }

            match self.credentials.bearer_token().filter(|t| !t.trim().is_empty()) {
                Some(token) => self.token = token,
                None => {
                    tracing::info!("Credential removed; abandoning reconnection");
                    self.publisher.publish(ConnectionState::Disconnected {
                        error: Some("credential unavailable".into()),
                    });
                    return DriverExit::CredentialGone;
                }
            }
        }
    }

    fn transport_order(&self, preferred: Option<TransportKind>) -> Vec<TransportKind> {
        let mut order = self.options.transports.clone();
        if let Some(kind) = preferred {
            if let Some(pos) = order.iter().position(|k| *k == kind) {
                let first = order.remove(pos);
                order.insert(0, first);
            }
        }
        order
    }

    fn drop_pending_commands(&mut self) {
        while let Ok(Command::Emit(packet)) = self.commands.try_recv() {
            tracing::debug!(packet = %packet.encode(), "Dropping emit queued while disconnected");
        }
    }

    /// Engine handshake followed by the namespace connect.
    async fn establish(&self, transports: &[TransportKind]) -> Result<Session, RealtimeError> {
        let (mut transport, handshake) =
            transport::open(&self.endpoint, &self.options, transports, &self.token, &self.http)
                .await?;

        let namespace = self.endpoint.namespace();
        let join = SocketPacket::Connect {
            namespace: namespace.to_string(),
            data: None,
        };
        transport.send(&EnginePacket::Message(join.encode())).await?;

        loop {
            match transport.recv().await? {
                Some(EnginePacket::Message(text)) => match SocketPacket::decode(&text)? {
                    SocketPacket::Connect { namespace: ns, data } if ns == namespace => {
                        let sid = data
                            .as_ref()
                            .and_then(|d| d.get("sid"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        return Ok(Session {
                            transport,
                            handshake,
                            sid,
                        });
                    }
                    SocketPacket::ConnectError { namespace: ns, data } if ns == namespace => {
                        transport.close().await;
                        return Err(RealtimeError::Rejected(SocketPacket::error_message(
                            data.as_ref(),
                        )));
                    }
                    other => {
                        tracing::debug!(packet = ?other, "Ignoring packet before namespace connect");
                    }
                },
                Some(EnginePacket::Ping(data)) => transport.send(&EnginePacket::Pong(data)).await?,
                Some(EnginePacket::Close) | None => return Err(RealtimeError::Closed),
                Some(_) => {}
            }
        }
    }

    async fn run_session(&mut self, session: &mut Session) -> SessionEnd {
        let window = session.handshake.liveness_window();
        let namespace = self.endpoint.namespace().to_string();

        // Only inbound packets move the deadline; our own emits do not.
        let mut deadline = Instant::now() + window;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return SessionEnd::Cancelled,

                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(window_ms = window.as_millis() as u64, "No ping from server");
                    return SessionEnd::Lost("ping timeout".into());
                }

                Some(Command::Emit(packet)) = self.commands.recv() => {
                    let message = EnginePacket::Message(packet.encode());
                    if let Err(e) = session.transport.send(&message).await {
                        tracing::warn!(error = %e, "Failed to send realtime packet");
                        return SessionEnd::Lost("transport error".into());
                    }
                }

                received = session.transport.recv() => {
                    deadline = Instant::now() + window;
                    match received {
                        Err(e) => {
                            tracing::warn!(error = %e, "Realtime transport error");
                            return SessionEnd::Lost("transport error".into());
                        }
                        Ok(None) | Ok(Some(EnginePacket::Close)) => {
                            return SessionEnd::Lost("transport close".into());
                        }
                        Ok(Some(EnginePacket::Ping(data))) => {
                            if session.transport.send(&EnginePacket::Pong(data)).await.is_err() {
                                return SessionEnd::Lost("transport error".into());
                            }
                        }
                        Ok(Some(EnginePacket::Message(text))) => {
                            if let Some(end) = self.handle_message(&namespace, &text) {
                                return end;
                            }
                        }
                        Ok(Some(_)) => {}
                    }
                }
            }
        }
    }

    fn handle_message(&self, namespace: &str, text: &str) -> Option<SessionEnd> {
        let packet = match SocketPacket::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed socket packet");
                return None;
            }
        };
        if packet.namespace() != namespace {
            tracing::trace!(namespace = packet.namespace(), "Ignoring packet for other namespace");
            return None;
        }

        match packet {
            SocketPacket::Event { name, args, .. } if name == EVENT_NOTIFICATION_SEND => {
                // Listeners are detached as soon as the connection is torn down.
                if self.cancel.is_cancelled() {
                    return None;
                }
                match Notification::from_event_args(&args) {
                    Ok(notification) => {
                        tracing::debug!(notification_id = notification.id, "Notification received");
                        let _ = self.notifications.send(notification);
                    }
                    Err(e) => tracing::warn!(error = %e, "Discarding malformed notification payload"),
                }
            }
            SocketPacket::Event { name, .. } => {
                tracing::debug!(event = %name, "Unhandled realtime event");
            }
            SocketPacket::Disconnect { .. } => return Some(SessionEnd::ServerDisconnect),
            SocketPacket::ConnectError { data, .. } => {
                return Some(SessionEnd::Lost(SocketPacket::error_message(data.as_ref())));
            }
            SocketPacket::Connect { .. } | SocketPacket::Ack { .. } => {}
        }
        None
    }

    /// Client-initiated goodbye: namespace disconnect, then engine close.
    async fn leave(&self, session: &mut Session) {
        let goodbye = SocketPacket::Disconnect {
            namespace: self.endpoint.namespace().to_string(),
        };
        let _ = session
            .transport
            .send(&EnginePacket::Message(goodbye.encode()))
            .await;
        session.transport.close().await;
        tracing::debug!(sid = %session.sid, "Realtime session closed by client");
    }
}
