//! JSON hub protocol framing
//!
//! Every frame is a JSON object terminated by the ASCII record separator
//! (0x1E). A websocket text message may carry several frames.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{HubEvent, HubInvocation, MESSAGES_READ, RECEIVE_MESSAGE};
use crate::models::{ConversationId, RawMessage};

/// Frame terminator
pub const RECORD_SEPARATOR: char = '\u{1e}';

const TYPE_INVOCATION: u8 = 1;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

/// Decoded protocol frame
#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    Invocation { target: String, arguments: Vec<Value> },
    Ping,
    Close { error: Option<String> },
    /// Frame types this client does not act on (stream items, completions, ...)
    Other(u8),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

fn terminate(mut payload: String) -> String {
    payload.push(RECORD_SEPARATOR);
    payload
}

/// First frame sent after the websocket opens
pub fn handshake_request() -> String {
    terminate(json!({ "protocol": "json", "version": 1 }).to_string())
}

/// Check the server's handshake answer (`{}` on success)
pub fn parse_handshake_response(frame: &str) -> Result<(), String> {
    let response: HandshakeResponse =
        serde_json::from_str(frame).map_err(|e| format!("malformed handshake response: {}", e))?;
    match response.error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Split a websocket text payload into frames
pub fn split_frames(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|frame| !frame.is_empty())
}

/// Decode a single frame
pub fn decode_frame(frame: &str) -> Result<HubFrame, serde_json::Error> {
    let raw: RawFrame = serde_json::from_str(frame)?;
    Ok(match raw.kind {
        TYPE_INVOCATION => HubFrame::Invocation {
            target: raw.target.unwrap_or_default(),
            arguments: raw.arguments,
        },
        TYPE_PING => HubFrame::Ping,
        TYPE_CLOSE => HubFrame::Close { error: raw.error },
        other => HubFrame::Other(other),
    })
}

/// Encode a non-blocking invocation (no invocation id, no completion expected)
pub fn encode_invocation(invocation: &HubInvocation) -> String {
    terminate(
        json!({
            "type": TYPE_INVOCATION,
            "target": invocation.target,
            "arguments": invocation.arguments,
        })
        .to_string(),
    )
}

/// Keep-alive frame
pub fn ping_frame() -> String {
    terminate(json!({ "type": TYPE_PING }).to_string())
}

/// Map an invocation frame to a client event
///
/// Unknown targets and malformed arguments are logged and skipped; they never
/// tear the connection down.
pub fn invocation_to_event(target: &str, mut arguments: Vec<Value>) -> Option<HubEvent> {
    match target {
        RECEIVE_MESSAGE => {
            if arguments.is_empty() {
                warn!("ReceiveMessage without payload");
                return None;
            }
            match serde_json::from_value::<RawMessage>(arguments.swap_remove(0)) {
                Ok(raw) => Some(HubEvent::ReceiveMessage(raw)),
                Err(e) => {
                    warn!(error = %e, "Malformed ReceiveMessage payload");
                    None
                }
            }
        }
        MESSAGES_READ => {
            if arguments.is_empty() {
                warn!("MessagesRead without conversation id");
                return None;
            }
            match serde_json::from_value::<ConversationId>(arguments.swap_remove(0)) {
                Ok(id) => Some(HubEvent::MessagesRead(id)),
                Err(e) => {
                    warn!(error = %e, "Malformed MessagesRead conversation id");
                    None
                }
            }
        }
        other => {
            debug!(target_method = %other, "Ignoring unknown hub invocation");
            None
        }
    }
}
