//! Connection lifecycle: join snapshot, spawn timer ownership, disconnect cleanup

use tracing::info;

use crate::ws::protocol::{InitPayload, ServerMsg};

use super::broadcast::{Outbound, Outbox};
use super::rules::sanitize_name;
use super::spawner::SpawnTimer;
use super::state::{Player, PlayerId, SimulationWorld};

/// A live client: its outbound queue and the spawn timer bound to it
#[derive(Debug)]
pub struct Connection {
    outbound: Outbound,
    spawner: Option<SpawnTimer>,
}

impl Connection {
    pub fn new(outbound: Outbound, spawner: SpawnTimer) -> Self {
        Self {
            outbound,
            spawner: Some(spawner),
        }
    }

    /// A connection that spawns nothing
    pub fn detached(outbound: Outbound) -> Self {
        Self {
            outbound,
            spawner: None,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.outbound.player_id()
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    #[cfg(test)]
    pub fn is_spawning(&self) -> bool {
        self.spawner.as_ref().is_some_and(SpawnTimer::is_running)
    }
}

/// Register a new player and queue the join snapshot plus the join announcement
pub fn join(
    world: &mut SimulationWorld,
    player_id: PlayerId,
    proposed_name: Option<&str>,
    outbox: &mut Outbox,
) -> Player {
    let name = proposed_name.and_then(sanitize_name);
    let player = world.create_player(player_id, name);
    world.insert_player(player.clone());

    outbox.to_one(
        player_id,
        ServerMsg::Init(InitPayload {
            self_id: player_id,
            world: world.bounds,
            players: world.players().cloned().collect(),
            circles: world.circles().cloned().collect(),
        }),
    );
    outbox.to_others(player_id, ServerMsg::PlayerJoined(player.clone()));

    info!(
        player_id = %player_id,
        name = %player.name,
        players = world.player_count(),
        "Player joined arena"
    );
    player
}

/// Remove a player and everything it owns. Every step is unconditional.
pub fn leave(world: &mut SimulationWorld, player_id: PlayerId, outbox: &mut Outbox) {
    let removed = world.remove_circles_owned_by(&player_id);
    if !removed.is_empty() {
        outbox.to_all(ServerMsg::CirclesRemoved {
            circle_ids: removed.clone(),
        });
    }

    if world.remove_player(&player_id).is_some() {
        outbox.to_all(ServerMsg::PlayerLeft(player_id));
    }

    info!(
        player_id = %player_id,
        circles_removed = removed.len(),
        players = world.player_count(),
        "Player left arena"
    );
}
