//! WebSocket handler for the session attach channel.
//!
//! One connection serves one session at a time: the client joins with
//! `join-session`, then streams `audio-chunk` messages (JSON with base64 or
//! byte-array payloads, or raw binary frames). Outbound traffic is pumped
//! from an unbounded channel whose sender doubles as the session's socket
//! handle in the registry, so a reconnect simply swaps the sender.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::audio::AudioData;
use crate::error::ParleyError;
use crate::events::SessionEvent;
use crate::session::SessionOrchestrator;
use crate::utils::now_millis;

/// Incoming attach-channel messages.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum WsIncoming {
    JoinSession {
        session_id: String,
    },
    AudioChunk {
        session_id: String,
        audio_data: AudioData,
    },
    Ping,
}

fn to_message(event: &SessionEvent) -> Option<Message> {
    serde_json::to_string(event)
        .ok()
        .map(|s| Message::Text(s.into()))
}

fn error_event(error: &ParleyError) -> SessionEvent {
    SessionEvent::Error {
        message: error.to_string(),
        code: error.code().to_string(),
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state.orchestrator))
}

/// Main attach-channel connection loop.
async fn handle_ws(socket: WebSocket, orchestrator: Arc<SessionOrchestrator>) {
    let (mut sender, mut receiver) = socket.split();

    // The tx half is the socket handle handed to the registry; this task
    // pumps whatever the orchestrator emits out to the wire.
    let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
    let mut joined: Option<String> = None;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(event) => {
                        if let Some(msg) = to_message(&event) {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break, // all senders gone
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsIncoming>(&text) {
                            Ok(WsIncoming::JoinSession { session_id }) => {
                                match orchestrator.attach(&session_id, tx.clone()).await {
                                    Ok(()) => {
                                        log::info!("[WS] Joined session {}", session_id);
                                        joined = Some(session_id);
                                    }
                                    Err(e) => {
                                        log::warn!("[WS] Join failed for {}: {}", session_id, e);
                                        let _ = tx.send(error_event(&e));
                                    }
                                }
                            }
                            Ok(WsIncoming::AudioChunk { session_id, audio_data }) => {
                                if joined.as_deref() != Some(session_id.as_str()) {
                                    let _ = tx.send(SessionEvent::Error {
                                        message: format!(
                                            "Not joined to session {}",
                                            session_id
                                        ),
                                        code: "INVALID_SESSION".to_string(),
                                    });
                                    continue;
                                }
                                if let Err(e) =
                                    orchestrator.handle_audio(&session_id, &audio_data).await
                                {
                                    let _ = tx.send(error_event(&e));
                                }
                            }
                            Ok(WsIncoming::Ping) => {
                                let _ = tx.send(SessionEvent::Pong {
                                    timestamp: now_millis(),
                                });
                            }
                            Err(_) => {} // Unknown message type, ignore
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        // Raw PCM for the joined session
                        if let Some(session_id) = &joined {
                            if let Err(e) =
                                orchestrator.handle_audio_binary(session_id, &data).await
                            {
                                let _ = tx.send(error_event(&e));
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    // Socket drop clears only the handle; registry state, the watchdog, and
    // any in-flight finalization survive for reconnect.
    if let Some(session_id) = &joined {
        orchestrator.detach_if_current(session_id, &tx).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_message_parses() {
        let parsed: WsIncoming =
            serde_json::from_str(r#"{"type": "join-session", "sessionId": "s1"}"#).unwrap();
        assert!(matches!(parsed, WsIncoming::JoinSession { session_id } if session_id == "s1"));
    }

    #[test]
    fn audio_chunk_accepts_base64_strings() {
        let parsed: WsIncoming = serde_json::from_str(
            r#"{"type": "audio-chunk", "sessionId": "s1", "audioData": "AAEC"}"#,
        )
        .unwrap();
        match parsed {
            WsIncoming::AudioChunk { audio_data, .. } => {
                assert!(matches!(audio_data, AudioData::Text(_)));
            }
            _ => panic!("expected audio-chunk"),
        }
    }

    #[test]
    fn audio_chunk_accepts_byte_arrays() {
        let parsed: WsIncoming = serde_json::from_str(
            r#"{"type": "audio-chunk", "sessionId": "s1", "audioData": [0, 1, 255]}"#,
        )
        .unwrap();
        match parsed {
            WsIncoming::AudioChunk { audio_data, .. } => {
                assert!(matches!(audio_data, AudioData::Bytes(b) if b == vec![0, 1, 255]));
            }
            _ => panic!("expected audio-chunk"),
        }
    }

    #[test]
    fn ping_parses() {
        let parsed: WsIncoming = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(parsed, WsIncoming::Ping));
    }

    #[test]
    fn error_event_carries_stable_code() {
        let event = error_event(&ParleyError::SessionNotFound("s1".into()));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "SESSION_NOT_FOUND");
    }
}
