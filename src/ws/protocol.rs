//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::game::state::{Circle, CircleId, Player, PlayerId, WorldBounds};

/// Movement direction sent with `move`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub x: f64,
    pub y: f64,
}

/// One entry of a `commandCirclesMove` batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOrder {
    pub circle_id: String,
    pub target_x: f64,
    pub target_y: f64,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMsg {
    /// Walk the avatar for `delta` seconds
    Move { direction: Direction, delta: f64 },

    /// Change display name
    SetName { name: String },

    /// Start (`marked` absent or true) or stop a manual drag
    MarkCircle {
        circle_id: String,
        #[serde(default)]
        marked: Option<bool>,
    },

    /// Drag a marked circle to a point
    MoveCircle { circle_id: String, x: f64, y: f64 },

    /// Queue automatic movement for several circles
    CommandCirclesMove { moves: Vec<MoveOrder> },
}

/// Join snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub self_id: PlayerId,
    pub world: WorldBounds,
    pub players: Vec<Player>,
    pub circles: Vec<Circle>,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMsg {
    /// Sent once, right after connecting
    Init(InitPayload),

    PlayerJoined(Player),
    PlayerMoved(Player),
    PlayerUpdated(Player),
    PlayerLeft(PlayerId),

    CircleSpawned(Circle),
    CircleUpdated(Circle),
    CirclesRemoved { circle_ids: Vec<CircleId> },
}
