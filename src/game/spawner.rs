//! Per-connection circle spawning

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::ws::protocol::ServerMsg;

use super::arena::ArenaCommand;
use super::broadcast::Outbox;
use super::state::{CircleId, PlayerId, SimulationWorld};

/// Periodic timer asking the arena to spawn a circle for one player.
///
/// The timer task is aborted when this value is dropped, so it can never
/// outlive the [`Connection`](super::connection::Connection) that owns it.
#[derive(Debug)]
pub struct SpawnTimer {
    player_id: PlayerId,
    handle: JoinHandle<()>,
}

impl SpawnTimer {
    /// Start firing every `period`, first firing one full period from now
    pub fn start(
        player_id: PlayerId,
        period: Duration,
        arena_tx: mpsc::WeakSender<ArenaCommand>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(tx) = arena_tx.upgrade() else {
                    break;
                };
                if tx.send(ArenaCommand::Spawn { player_id }).await.is_err() {
                    break;
                }
            }
            debug!(player_id = %player_id, "Arena closed, stopping spawn timer");
        });

        Self { player_id, handle }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for SpawnTimer {
    fn drop(&mut self) {
        self.handle.abort();
        debug!(player_id = %self.player_id, "Spawn timer cancelled");
    }
}

/// Create a circle at the owner's position, resolve it, and announce it.
/// A firing for a player that already left is ignored.
pub fn spawn_circle(world: &mut SimulationWorld, owner: PlayerId, outbox: &mut Outbox) -> Option<CircleId> {
    let id = world.insert_circle_for(&owner)?;
    world.resolve_circle(id);

    let circle = world.circle(&id)?.clone();
    outbox.to_all(ServerMsg::CircleSpawned(circle));
    Some(id)
}
