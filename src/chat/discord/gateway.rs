use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::events::{GatewayPayload, Hello, decode_dispatch, opcode};
use super::{GATEWAY_URL, INTENTS};
use crate::chat::{ChatError, ChatEvent, EventHandler};

const DEFAULT_RECONNECT_DELAY_SECONDS: u64 = 5;
const MAX_RECONNECT_DELAY_SECONDS: u64 = 300;
/// Close code Discord sends for an invalid token.
const AUTHENTICATION_FAILED: u16 = 4004;

/// Keeps a gateway connection alive and forwards decoded events to the
/// handler, one task per event.
pub struct Gateway {
    token: String,
    url: String,
    handler: Arc<dyn EventHandler>,
}

impl Gateway {
    pub fn new(token: &str, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            token: token.to_string(),
            url: GATEWAY_URL.to_string(),
            handler,
        }
    }

    /// Runs until the token is rejected. Every other disconnect is retried
    /// with exponential backoff, reset once a session reaches READY.
    pub async fn run(&self) -> Result<(), ChatError> {
        let mut reconnect_delay_seconds = DEFAULT_RECONNECT_DELAY_SECONDS;
        loop {
            info!(url = %self.url, "Connecting to Discord gateway...");
            match self.session(&mut reconnect_delay_seconds).await {
                Ok(reason) => warn!(reason = %reason, "Gateway session ended."),
                Err(ChatError::AuthenticationFailed(reason)) => {
                    error!(reason = %reason, "Discord rejected the bot token. Not reconnecting.");
                    return Err(ChatError::AuthenticationFailed(reason));
                }
                Err(e) => error!(error = %e, "Gateway session failed."),
            }

            info!(delay_seconds = reconnect_delay_seconds, "Sleeping before next connection attempt.");
            tokio::time::sleep(Duration::from_secs(reconnect_delay_seconds)).await;
            reconnect_delay_seconds = (reconnect_delay_seconds * 2).min(MAX_RECONNECT_DELAY_SECONDS);
        }
    }

    /// One connection from HELLO to disconnect. `Ok` carries the reason a
    /// reconnect is needed.
    async fn session(&self, reconnect_delay_seconds: &mut u64) -> Result<String, ChatError> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await.map_err(ws_error)?;
        let (mut write, mut read) = ws_stream.split();

        let hello = loop {
            let Some(frame) = read.next().await else {
                return Ok("stream ended before HELLO".to_string());
            };
            if let WsMessage::Text(text) = frame.map_err(ws_error)? {
                let payload: GatewayPayload = serde_json::from_str(text.as_str())?;
                if payload.op == opcode::HELLO {
                    break serde_json::from_value::<Hello>(payload.d)?;
                }
            }
        };
        let interval = Duration::from_millis(hello.heartbeat_interval);
        debug!(interval_ms = hello.heartbeat_interval, "Received HELLO.");

        write
            .send(WsMessage::Text(identify_payload(&self.token).to_string().into()))
            .await
            .map_err(ws_error)?;

        // First beat is jittered so reconnecting bots do not beat in lockstep.
        let first_beat = Instant::now() + interval.mul_f64(rand::random::<f64>());
        let mut heartbeat = interval_at(first_beat, interval);
        let mut sequence: Option<u64> = None;
        let mut acknowledged = true;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if !acknowledged {
                        return Ok("heartbeat was not acknowledged".to_string());
                    }
                    acknowledged = false;
                    write
                        .send(WsMessage::Text(heartbeat_payload(sequence).to_string().into()))
                        .await
                        .map_err(ws_error)?;
                }
                frame = read.next() => {
                    let Some(frame) = frame else {
                        return Ok("stream ended".to_string());
                    };
                    match frame.map_err(ws_error)? {
                        WsMessage::Text(text) => {
                            let payload: GatewayPayload = serde_json::from_str(text.as_str())?;
                            if payload.s.is_some() {
                                sequence = payload.s;
                            }
                            match payload.op {
                                opcode::DISPATCH => {
                                    self.dispatch(payload, reconnect_delay_seconds);
                                }
                                opcode::HEARTBEAT => {
                                    write
                                        .send(WsMessage::Text(heartbeat_payload(sequence).to_string().into()))
                                        .await
                                        .map_err(ws_error)?;
                                }
                                opcode::HEARTBEAT_ACK => acknowledged = true,
                                opcode::RECONNECT => return Ok("server requested reconnect".to_string()),
                                opcode::INVALID_SESSION => return Ok("session invalidated".to_string()),
                                other => debug!(op = other, "Ignoring gateway opcode."),
                            }
                        }
                        WsMessage::Close(frame) => {
                            let code = frame.as_ref().map(|f| u16::from(f.code));
                            if code == Some(AUTHENTICATION_FAILED) {
                                return Err(ChatError::AuthenticationFailed(
                                    "gateway closed with 4004".to_string(),
                                ));
                            }
                            return Ok(format!("closed by server with code {code:?}"));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn dispatch(&self, payload: GatewayPayload, reconnect_delay_seconds: &mut u64) {
        let Some(event_name) = payload.t else {
            return;
        };
        let event = match decode_dispatch(&event_name, payload.d) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                warn!(event = %event_name, error = %e, "Failed to decode gateway event.");
                return;
            }
        };

        if let ChatEvent::Ready { user, .. } = &event {
            info!(bot = %user.name, "Connected to Discord.");
            *reconnect_delay_seconds = DEFAULT_RECONNECT_DELAY_SECONDS;
        }

        let handler = self.handler.clone();
        tokio::spawn(async move {
            handler.handle(event).await;
        });
    }
}

fn ws_error(e: tokio_tungstenite::tungstenite::Error) -> ChatError {
    ChatError::Gateway(e.to_string())
}

fn identify_payload(token: &str) -> Value {
    json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "vps-deployer",
                "device": "vps-deployer",
            },
        },
    })
}

fn heartbeat_payload(sequence: Option<u64>) -> Value {
    json!({ "op": opcode::HEARTBEAT, "d": sequence })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intents_cover_messages_and_members() {
        assert_eq!(INTENTS, 1 | 2 | 512 | 4096 | 32768);
    }

    #[test]
    fn test_identify_payload() {
        let payload = identify_payload("secret");
        assert_eq!(payload["op"], 2);
        assert_eq!(payload["d"]["token"], "secret");
        assert_eq!(payload["d"]["intents"], INTENTS);
    }

    #[test]
    fn test_heartbeat_carries_last_sequence() {
        assert_eq!(heartbeat_payload(None), json!({ "op": 1, "d": null }));
        assert_eq!(heartbeat_payload(Some(42))["d"], 42);
    }
}
