//! Outbound event routing
//!
//! Handlers never talk to sockets. They push [`Outgoing`] entries into an
//! [`Outbox`] and the arena hands the outbox to a [`Broadcaster`] once the
//! handler has finished mutating the world.

use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::ws::protocol::ServerMsg;

use super::connection::Connection;
use super::state::PlayerId;

/// Who should receive an outgoing event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Only(PlayerId),
    AllExcept(PlayerId),
}

impl Audience {
    pub fn includes(&self, id: &PlayerId) -> bool {
        match self {
            Audience::All => true,
            Audience::Only(target) => target == id,
            Audience::AllExcept(excluded) => excluded != id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Outgoing {
    pub audience: Audience,
    pub msg: ServerMsg,
}

/// Ordered list of events produced by one handler invocation
#[derive(Debug, Default)]
pub struct Outbox {
    entries: Vec<Outgoing>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_all(&mut self, msg: ServerMsg) {
        self.push(Audience::All, msg);
    }

    pub fn to_one(&mut self, id: PlayerId, msg: ServerMsg) {
        self.push(Audience::Only(id), msg);
    }

    pub fn to_others(&mut self, id: PlayerId, msg: ServerMsg) {
        self.push(Audience::AllExcept(id), msg);
    }

    pub fn push(&mut self, audience: Audience, msg: ServerMsg) {
        self.entries.push(Outgoing { audience, msg });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Outgoing> {
        self.entries.iter()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Outgoing> + '_ {
        self.entries.drain(..)
    }
}

/// Sending half of one connection's outbound queue
#[derive(Debug, Clone)]
pub struct Outbound {
    player_id: PlayerId,
    tx: mpsc::Sender<ServerMsg>,
}

impl Outbound {
    pub fn new(player_id: PlayerId, tx: mpsc::Sender<ServerMsg>) -> Self {
        Self { player_id, tx }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Fire-and-forget delivery; a full queue drops the message for this client only
    pub fn deliver(&self, msg: ServerMsg) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(player_id = %self.player_id, "Client lagging, dropping outbound event");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(player_id = %self.player_id, "Outbound channel closed");
            }
        }
    }
}

/// Table of live connections; delivers outbox entries to them
#[derive(Debug, Default)]
pub struct Broadcaster {
    connections: HashMap<PlayerId, Connection>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, connection: Connection) {
        self.connections.insert(connection.player_id(), connection);
    }

    /// Remove a connection. Dropping the returned value stops its spawn timer.
    pub fn detach(&mut self, id: &PlayerId) -> Option<Connection> {
        self.connections.remove(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn dispatch(&self, outbox: &mut Outbox) {
        for Outgoing { audience, msg } in outbox.drain() {
            match audience {
                Audience::Only(id) => {
                    if let Some(connection) = self.connections.get(&id) {
                        connection.outbound().deliver(msg);
                    }
                }
                _ => {
                    for (id, connection) in &self.connections {
                        if audience.includes(id) {
                            connection.outbound().deliver(msg.clone());
                        }
                    }
                }
            }
        }
    }
}
