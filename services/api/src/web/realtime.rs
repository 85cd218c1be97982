//! services/api/src/web/realtime.rs
//!
//! Per-user broadcast rooms. Every WebSocket a user holds subscribes to the
//! room keyed by their user id. Delivery is best effort: a lagging or absent
//! subscriber simply misses messages.

use crate::web::protocol::ServerMessage;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const ROOM_CAPACITY: usize = 64;

#[derive(Clone, Default)]
pub struct RealtimeHub {
    rooms: Arc<DashMap<Uuid, broadcast::Sender<ServerMessage>>>,
}

impl RealtimeHub {
    pub fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<ServerMessage> {
        self.rooms
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Returns how many connections received the message.
    pub fn publish(&self, user_id: Uuid, message: ServerMessage) -> usize {
        match self.rooms.get(&user_id) {
            Some(room) => room.send(message).unwrap_or(0),
            None => 0,
        }
    }

    /// Drops the room once its last subscriber is gone.
    pub fn release(&self, user_id: Uuid) {
        self.rooms
            .remove_if(&user_id, |_, room| room.receiver_count() == 0);
    }
}
