//! Presence/signaling envelopes exchanged with browser clients.
//!
//! Every frame is a JSON object tagged by `type`. Room membership and peer
//! metadata are opaque to the simulation engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Meta = Map<String, Value>;

pub const DEFAULT_ROOM: &str = "default";

fn default_room() -> String {
    DEFAULT_ROOM.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

/// Frames sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    Join {
        #[serde(default = "default_room")]
        room: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        meta: Meta,
    },
    Leave,
    MetaUpdate {
        #[serde(default)]
        meta: Meta,
    },
    Offer {
        target: String,
        #[serde(default)]
        payload: Value,
    },
    Answer {
        target: String,
        #[serde(default)]
        payload: Value,
    },
    Candidate {
        target: String,
        #[serde(default)]
        payload: Value,
    },
}

impl ClientMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Signaling frames destined for another member.
    pub fn as_signal(&self) -> Option<(SignalKind, &str, &Value)> {
        match self {
            Self::Offer { target, payload } => Some((SignalKind::Offer, target, payload)),
            Self::Answer { target, payload } => Some((SignalKind::Answer, target, payload)),
            Self::Candidate { target, payload } => Some((SignalKind::Candidate, target, payload)),
            _ => None,
        }
    }
}

/// One room member as exposed to other members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    pub user: String,
    pub meta: Meta,
}

/// Frames sent by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    UpdateList {
        listeners: Vec<Listener>,
        /// Unix seconds.
        ts: f64,
    },
    Offer {
        from: String,
        target: String,
        payload: Value,
    },
    Answer {
        from: String,
        target: String,
        payload: Value,
    },
    Candidate {
        from: String,
        target: String,
        payload: Value,
    },
    Error {
        msg: String,
    },
}

impl ServerMessage {
    pub fn relay(kind: SignalKind, from: &str, target: &str, payload: &Value) -> Self {
        let (from, target, payload) = (from.to_string(), target.to_string(), payload.clone());
        match kind {
            SignalKind::Offer => Self::Offer {
                from,
                target,
                payload,
            },
            SignalKind::Answer => Self::Answer {
                from,
                target,
                payload,
            },
            SignalKind::Candidate => Self::Candidate {
                from,
                target,
                payload,
            },
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error { msg: msg.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_defaults() {
        let msg = ClientMessage::parse(r#"{"type":"JOIN"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                room: "default".to_string(),
                user: None,
                meta: Meta::new(),
            }
        );
    }

    #[test]
    fn test_join_full() {
        let msg = ClientMessage::parse(
            r#"{"type":"JOIN","room":"lab","user":"alice","meta":{"role":"seed"}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Join { room, user, meta } => {
                assert_eq!(room, "lab");
                assert_eq!(user.as_deref(), Some("alice"));
                assert_eq!(meta["role"], "seed");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_leave_and_meta_update() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"LEAVE"}"#).unwrap(),
            ClientMessage::Leave
        );
        let update = ClientMessage::parse(r#"{"type":"META_UPDATE","meta":{"x":1}}"#).unwrap();
        assert!(matches!(update, ClientMessage::MetaUpdate { meta } if meta["x"] == 1));
    }

    #[test]
    fn test_signal_frames() {
        let msg =
            ClientMessage::parse(r#"{"type":"CANDIDATE","target":"bob","payload":{"sdpMid":"0"}}"#)
                .unwrap();
        let (kind, target, payload) = msg.as_signal().unwrap();
        assert_eq!(kind, SignalKind::Candidate);
        assert_eq!(target, "bob");
        assert_eq!(payload["sdpMid"], "0");

        assert!(ClientMessage::Leave.as_signal().is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ClientMessage::parse(r#"{"type":"PING"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"target":"bob"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"type":"OFFER"}"#).is_err());
    }

    #[test]
    fn test_server_frames_serialization() {
        let update = ServerMessage::UpdateList {
            listeners: vec![Listener {
                user: "alice".to_string(),
                meta: Meta::new(),
            }],
            ts: 1.5,
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"type": "UPDATE_LIST", "listeners": [{"user": "alice", "meta": {}}], "ts": 1.5})
        );

        let relay = ServerMessage::relay(SignalKind::Offer, "alice", "bob", &json!({"sdp": "x"}));
        assert_eq!(
            serde_json::to_value(&relay).unwrap(),
            json!({"type": "OFFER", "from": "alice", "target": "bob", "payload": {"sdp": "x"}})
        );

        assert_eq!(
            serde_json::to_value(ServerMessage::error("First message must be JOIN")).unwrap(),
            json!({"type": "ERROR", "msg": "First message must be JOIN"})
        );
    }
}
