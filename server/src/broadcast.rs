//! Socket bookkeeping and ordered event fanout
//!
//! This module handles the server side of every open websocket:
//! - Connection registration, capacity limits and removal
//! - Binding a socket to the player it speaks for
//! - Per-socket outbound queues that preserve production order
//!
//! The hub is owned by the session actor, so events are queued in exactly
//! the order the state changes happened. Delivery is best effort: a socket
//! that has gone away simply misses the event and catches up on reconnect.

use log::{debug, error, info};
use shared::{CommandReply, GameEvent, OutboundMessage};
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::sync::mpsc;

pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// An open websocket and the player it is bound to, if any
#[derive(Debug)]
pub struct Connection {
    /// Unique connection identifier assigned by the server
    pub id: u32,
    /// Set by `join_game` or `reconnect`
    pub player: Option<String>,
    /// When the socket was accepted
    pub connected_at: Instant,
    /// Serialized frames waiting to be written to the socket
    sender: mpsc::UnboundedSender<String>,
}

impl Connection {
    pub fn new(id: u32, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            player: None,
            connected_at: Instant::now(),
            sender,
        }
    }

    fn push(&self, frame: String) -> bool {
        self.sender.send(frame).is_ok()
    }
}

pub struct BroadcastHub {
    /// Open sockets indexed by connection id
    connections: BTreeMap<u32, Connection>,
    /// Maximum number of concurrent sockets allowed
    max_connections: usize,
}

impl BroadcastHub {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            max_connections,
        }
    }

    /// Registers a socket. Returns false if the server is at capacity.
    pub fn add_connection(&mut self, id: u32, sender: mpsc::UnboundedSender<String>) -> bool {
        if self.connections.len() >= self.max_connections {
            return false;
        }

        debug!("Connection {} opened", id);
        self.connections.insert(id, Connection::new(id, sender));
        true
    }

    /// Removes a socket, returning it so the caller can update presence
    pub fn remove_connection(&mut self, id: u32) -> Option<Connection> {
        let removed = self.connections.remove(&id);
        if let Some(conn) = &removed {
            info!(
                "Connection {} closed after {:.1}s",
                conn.id,
                conn.connected_at.elapsed().as_secs_f32()
            );
        }
        removed
    }

    /// Binds a socket to a player. Returns the previously bound player.
    pub fn bind(&mut self, id: u32, player_name: &str) -> Option<String> {
        self.connections
            .get_mut(&id)
            .and_then(|conn| conn.player.replace(player_name.to_string()))
    }

    pub fn contains(&self, id: u32) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn player_of(&self, id: u32) -> Option<&str> {
        self.connections.get(&id).and_then(|c| c.player.as_deref())
    }

    /// Forgets every binding; used when the game is reset
    pub fn unbind_all(&mut self) {
        for conn in self.connections.values_mut() {
            conn.player = None;
        }
    }

    pub fn reply(&self, id: u32, reply: CommandReply) {
        let Some(conn) = self.connections.get(&id) else {
            debug!("Dropping reply for closed connection {}", id);
            return;
        };

        match serde_json::to_string(&OutboundMessage::Result(reply)) {
            Ok(frame) => {
                if !conn.push(frame) {
                    debug!("Connection {} no longer accepts frames", id);
                }
            }
            Err(e) => error!("Failed to serialize reply: {}", e),
        }
    }

    /// Queues an event on every open socket. Returns how many accepted it.
    pub fn broadcast(&self, event: &GameEvent) -> usize {
        let frame = match serde_json::to_string(&OutboundMessage::Event(event.clone())) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.kind(), e);
                return 0;
            }
        };

        let delivered = self
            .connections
            .values()
            .filter(|conn| conn.push(frame.clone()))
            .count();

        debug!(
            "Broadcast {} to {}/{} connections",
            event.kind(),
            delivered,
            self.connections.len()
        );
        delivered
    }

    /// Returns the number of open sockets
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
