//! Room membership for the presence relay.
//!
//! Each member owns a bounded outbox feeding its socket task. A member whose
//! outbox is closed or full is treated as gone and dropped on the next send.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use simnet_core::message::Meta;
use simnet_core::{Listener, ServerMessage, SignalKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Frames a member may have queued before it is dropped as a slow reader.
pub const OUTBOX_CAPACITY: usize = 64;

pub type Outbox = mpsc::Sender<ServerMessage>;
pub type Inbox = mpsc::Receiver<ServerMessage>;

pub fn outbox() -> (Outbox, Inbox) {
    mpsc::channel(OUTBOX_CAPACITY)
}

/// Identifies one socket, so a replaced connection cannot evict its successor.
pub type ConnId = u64;

struct Member {
    user: String,
    meta: Meta,
    conn: ConnId,
    outbox: Outbox,
}

#[derive(Default)]
pub struct Rooms {
    rooms: HashMap<String, Vec<Member>>,
    next_conn: ConnId,
}

impl Rooms {
    /// Add `user` to `room`, or replace the existing member of that name in
    /// place. The old outbox is dropped, which closes the old socket task.
    pub fn join(&mut self, room: &str, user: &str, meta: Meta, outbox: Outbox) -> ConnId {
        let conn = self.next_conn;
        self.next_conn += 1;

        let members = self.rooms.entry(room.to_string()).or_default();
        let member = Member {
            user: user.to_string(),
            meta,
            conn,
            outbox,
        };
        match members.iter_mut().find(|m| m.user == user) {
            Some(existing) => {
                debug!("Replacing connection for {} in {}", user, room);
                *existing = member;
            }
            None => members.push(member),
        }
        conn
    }

    /// Returns false if `conn` no longer owns the membership.
    pub fn update_meta(&mut self, room: &str, user: &str, conn: ConnId, meta: Meta) -> bool {
        match self.member_mut(room, user, conn) {
            Some(member) => {
                member.meta = meta;
                true
            }
            None => false,
        }
    }

    pub fn leave(&mut self, room: &str, user: &str, conn: ConnId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let before = members.len();
        members.retain(|m| !(m.user == user && m.conn == conn));
        let removed = members.len() != before;
        if members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }

    pub fn listeners(&self, room: &str) -> Vec<Listener> {
        self.rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .map(|m| Listener {
                        user: m.user.clone(),
                        meta: m.meta.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Send the current member list to everyone in `room`. Members that
    /// cannot take it are dropped and the rest get the corrected list.
    /// Returns how many members received the final list.
    pub fn broadcast(&mut self, room: &str) -> usize {
        loop {
            let update = ServerMessage::UpdateList {
                listeners: self.listeners(room),
                ts: unix_seconds(),
            };
            let Some(members) = self.rooms.get_mut(room) else {
                return 0;
            };
            let before = members.len();
            members.retain(|m| deliver(room, m, update.clone()));
            let delivered = members.len();
            if members.is_empty() {
                self.rooms.remove(room);
                return 0;
            }
            if delivered == before {
                return delivered;
            }
        }
    }

    /// Forward a signaling frame to `target` in the same room. A target that
    /// cannot take the frame is dropped and the room is told.
    pub fn relay(
        &mut self,
        room: &str,
        from: &str,
        kind: SignalKind,
        target: &str,
        payload: &Value,
    ) -> bool {
        let Some(member) = self
            .rooms
            .get(room)
            .and_then(|members| members.iter().find(|m| m.user == target))
        else {
            return false;
        };
        if deliver(room, member, ServerMessage::relay(kind, from, target, payload)) {
            return true;
        }
        let conn = member.conn;
        if self.leave(room, target, conn) {
            self.broadcast(room);
        }
        false
    }

    fn member_mut(&mut self, room: &str, user: &str, conn: ConnId) -> Option<&mut Member> {
        self.rooms
            .get_mut(room)?
            .iter_mut()
            .find(|m| m.user == user && m.conn == conn)
    }
}

fn deliver(room: &str, member: &Member, msg: ServerMessage) -> bool {
    match member.outbox.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Outbox full for {} in {}, dropping member", member.user, room);
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Dropping closed member {} from {}", member.user, room);
            false
        }
    }
}

fn unix_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Room contents as exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomView {
    pub room: String,
    pub listeners: Vec<Listener>,
}

/// Shared relay state. Every change that alters a room's member list is
/// followed by a broadcast while the lock is still held, so members see
/// updates in the order they happened.
#[derive(Clone, Default)]
pub struct RelayState {
    inner: Arc<RwLock<Rooms>>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, room: &str, user: &str, meta: Meta, outbox: Outbox) -> ConnId {
        let mut rooms = self.inner.write().await;
        let conn = rooms.join(room, user, meta, outbox);
        let members = rooms.broadcast(room);
        info!("👋 {} joined {} ({} member(s))", user, room, members);
        conn
    }

    pub async fn update_meta(&self, room: &str, user: &str, conn: ConnId, meta: Meta) {
        let mut rooms = self.inner.write().await;
        if rooms.update_meta(room, user, conn, meta) {
            rooms.broadcast(room);
        }
    }

    pub async fn leave(&self, room: &str, user: &str, conn: ConnId) {
        let mut rooms = self.inner.write().await;
        if rooms.leave(room, user, conn) {
            info!("🚪 {} left {}", user, room);
            rooms.broadcast(room);
        }
    }

    pub async fn relay(
        &self,
        room: &str,
        from: &str,
        kind: SignalKind,
        target: &str,
        payload: &Value,
    ) {
        if !self.inner.write().await.relay(room, from, kind, target, payload) {
            warn!("Could not deliver {:?} from {} to {} in {}", kind, from, target, room);
        }
    }

    pub async fn room(&self, room: &str) -> RoomView {
        RoomView {
            room: room.to_string(),
            listeners: self.inner.read().await.listeners(room),
        }
    }
}
