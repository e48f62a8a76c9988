//! Realtime channel: a long-lived WebSocket to the stats server.
//!
//! Frames are JSON objects of the form `{"event": "<name>", "data": ...}`.
//! The client announces itself with `presence:join`, keeps the connection
//! alive with `presence:ping`, and receives `stats:updated` whenever the
//! server's snapshot changes.

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::url::ws_url;
use crate::config::RealtimeConfig;
use crate::error::SyncError;
use crate::models::UserStatsSnapshot;
use crate::sync::Backoff;

/// Where and as whom to connect.
#[derive(Debug, Clone)]
pub struct RealtimeCredentials {
    pub server_url: String,
    pub user_id: String,
    pub token: String,
}

impl RealtimeCredentials {
    pub fn new(
        server_url: impl Into<String>,
        user_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            user_id: user_id.into(),
            token: token.into(),
        }
    }

    /// Full WebSocket URL including the token query parameter.
    pub fn url(&self) -> String {
        format!(
            "{}?token={}",
            ws_url(&self.server_url, "/realtime"),
            urlencoding::encode(&self.token)
        )
    }
}

/// Messages exchanged over the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ChannelMessage {
    /// Sent by the client right after connecting.
    #[serde(rename = "presence:join")]
    PresenceJoin {
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// Periodic liveness ping from the client.
    #[serde(rename = "presence:ping")]
    PresencePing,
    /// Server push of the authoritative snapshot.
    #[serde(rename = "stats:updated")]
    StatsUpdated(UserStatsSnapshot),
}

impl ChannelMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// What the channel reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A connection was (re)established and presence announced.
    Connected,
    /// The server pushed a snapshot.
    Snapshot(UserStatsSnapshot),
}

enum SessionEnd {
    Closed,
    Shutdown,
}

/// Reconnecting WebSocket client.
///
/// Runs until the shutdown flag flips, its sender is dropped, or the event
/// receiver goes away. Failures are logged and followed by a reconnect.
pub struct RealtimeChannel {
    config: RealtimeConfig,
    credentials: RealtimeCredentials,
    events: mpsc::UnboundedSender<ChannelEvent>,
    shutdown: watch::Receiver<bool>,
}

impl RealtimeChannel {
    pub fn new(
        config: RealtimeConfig,
        credentials: RealtimeCredentials,
        events: mpsc::UnboundedSender<ChannelEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            credentials,
            events,
            shutdown,
        }
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let mut backoff = Backoff::new(self.config.reconnect_base, self.config.reconnect_max);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self.session(&mut backoff).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => {
                    tracing::info!("Realtime channel closed by server");
                }
                Err(e) => {
                    tracing::warn!("Realtime channel error: {}", e);
                }
            }

            let delay = backoff.next_delay();
            tracing::debug!("Reconnecting realtime channel in {:?}", delay);
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown.changed() => break,
            }
        }

        tracing::debug!("Realtime channel stopped");
    }

    async fn session(&mut self, backoff: &mut Backoff) -> Result<SessionEnd, SyncError> {
        let url = self.credentials.url();
        let (ws_stream, _) = timeout(self.config.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| SyncError::WebSocket("Connection timed out".to_string()))?
            .map_err(|e| SyncError::WebSocket(e.to_string()))?;

        let (mut sender, mut receiver) = ws_stream.split();
        backoff.reset();

        let join = ChannelMessage::PresenceJoin {
            user_id: self.credentials.user_id.clone(),
        };
        send_message(&mut sender, &join).await?;
        tracing::info!(
            "Realtime channel connected for '{}'",
            self.credentials.user_id
        );

        if self.events.send(ChannelEvent::Connected).is_err() {
            return Ok(SessionEnd::Shutdown);
        }

        let mut heartbeat = interval_at(
            Instant::now() + self.config.heartbeat,
            self.config.heartbeat,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    send_message(&mut sender, &ChannelMessage::PresencePing).await?;
                }
                _ = self.shutdown.changed() => {
                    let _ = sender.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                msg = receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => match ChannelMessage::decode(text.as_str()) {
                        Ok(ChannelMessage::StatsUpdated(snapshot)) => {
                            if self.events.send(ChannelEvent::Snapshot(snapshot)).is_err() {
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                        Ok(other) => {
                            tracing::debug!("Ignoring realtime message: {:?}", other);
                        }
                        Err(e) => {
                            tracing::warn!("Unreadable realtime message: {}", e);
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        sender
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| SyncError::WebSocket(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                    Some(Ok(_)) => {
                        // Binary and pong frames carry nothing for us
                    }
                    Some(Err(e)) => return Err(SyncError::WebSocket(e.to_string())),
                },
            }
        }
    }
}

async fn send_message<S>(sender: &mut S, message: &ChannelMessage) -> Result<(), SyncError>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = message
        .encode()
        .map_err(|e| SyncError::WebSocket(e.to_string()))?;
    sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| SyncError::WebSocket(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_url() {
        let credentials = RealtimeCredentials::new("https://api.example.com", "u1", "a b&c");
        assert_eq!(
            credentials.url(),
            "wss://api.example.com/realtime?token=a%20b%26c"
        );
    }

    #[test]
    fn test_presence_messages_json() {
        let join = ChannelMessage::PresenceJoin {
            user_id: "u1".to_string(),
        };
        assert_eq!(
            join.encode().unwrap(),
            r#"{"event":"presence:join","data":{"userId":"u1"}}"#
        );
        assert_eq!(
            ChannelMessage::PresencePing.encode().unwrap(),
            r#"{"event":"presence:ping"}"#
        );
    }

    #[test]
    fn test_decode_stats_updated() {
        let text = r#"{"event":"stats:updated","data":{"xp":77,"updatedAt":"2024-01-02T00:00:00Z"}}"#;
        match ChannelMessage::decode(text).unwrap() {
            ChannelMessage::StatsUpdated(snapshot) => {
                assert_eq!(snapshot.xp, 77);
                assert!(snapshot.updated_at.is_some());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_event_fails() {
        assert!(ChannelMessage::decode(r#"{"event":"chat:message","data":{}}"#).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown_while_reconnecting() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let channel = RealtimeChannel::new(
            RealtimeConfig::default(),
            RealtimeCredentials::new("http://127.0.0.1:1", "u1", "t"),
            events_tx,
            shutdown_rx,
        );

        let handle = channel.spawn();
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(events_rx.try_recv().is_err());
    }
}
