//! The arena actor: single owner of the world and the authoritative tick loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::util::time::{tick_duration, LapTimer};
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::broadcast::{Broadcaster, Outbound, Outbox};
use super::connection::{self, Connection};
use super::rules::SPAWN_INTERVAL;
use super::spawner::{spawn_circle, SpawnTimer};
use super::state::{PlayerId, SimulationWorld};
use super::{commands, movement};

/// Inbound arena traffic. Everything that mutates the world goes through here.
#[derive(Debug)]
pub enum ArenaCommand {
    Join {
        player_id: PlayerId,
        name: Option<String>,
        outbound: mpsc::Sender<ServerMsg>,
    },
    Leave {
        player_id: PlayerId,
    },
    Client {
        player_id: PlayerId,
        msg: ClientMsg,
    },
    Spawn {
        player_id: PlayerId,
    },
}

/// The arena task has stopped
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("Arena is no longer running")]
pub struct ArenaClosed;

/// Arena construction options
#[derive(Debug, Clone)]
pub struct ArenaSettings {
    pub seed: u64,
    pub spawn_interval: Duration,
    pub tick_interval: Duration,
    pub command_capacity: usize,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            seed: rand::random(),
            spawn_interval: SPAWN_INTERVAL,
            tick_interval: tick_duration(),
            command_capacity: 1024,
        }
    }
}

/// Cloneable front door to a running arena
#[derive(Clone)]
pub struct ArenaHandle {
    command_tx: mpsc::Sender<ArenaCommand>,
    player_count: Arc<AtomicUsize>,
    circle_count: Arc<AtomicUsize>,
}

impl ArenaHandle {
    pub async fn join(
        &self,
        player_id: PlayerId,
        name: Option<String>,
        outbound: mpsc::Sender<ServerMsg>,
    ) -> Result<(), ArenaClosed> {
        self.send(ArenaCommand::Join {
            player_id,
            name,
            outbound,
        })
        .await
    }

    pub async fn submit(&self, player_id: PlayerId, msg: ClientMsg) -> Result<(), ArenaClosed> {
        self.send(ArenaCommand::Client { player_id, msg }).await
    }

    pub async fn leave(&self, player_id: PlayerId) -> Result<(), ArenaClosed> {
        self.send(ArenaCommand::Leave { player_id }).await
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn circle_count(&self) -> usize {
        self.circle_count.load(Ordering::Relaxed)
    }

    async fn send(&self, command: ArenaCommand) -> Result<(), ArenaClosed> {
        self.command_tx.send(command).await.map_err(|_| ArenaClosed)
    }
}

/// The authoritative arena
pub struct Arena {
    world: SimulationWorld,
    clients: Broadcaster,
    settings: ArenaSettings,
    command_rx: mpsc::Receiver<ArenaCommand>,
    /// Handed to spawn timers so their firings queue behind other commands
    /// without keeping the arena alive
    spawn_tx: mpsc::WeakSender<ArenaCommand>,
    player_count: Arc<AtomicUsize>,
    circle_count: Arc<AtomicUsize>,
}

impl Arena {
    pub fn new(settings: ArenaSettings) -> (Self, ArenaHandle) {
        let (command_tx, command_rx) = mpsc::channel(settings.command_capacity);
        let player_count = Arc::new(AtomicUsize::new(0));
        let circle_count = Arc::new(AtomicUsize::new(0));

        let spawn_tx = command_tx.downgrade();
        let handle = ArenaHandle {
            command_tx,
            player_count: player_count.clone(),
            circle_count: circle_count.clone(),
        };

        let arena = Self {
            world: SimulationWorld::new(settings.seed),
            clients: Broadcaster::new(),
            settings,
            command_rx,
            spawn_tx,
            player_count,
            circle_count,
        };

        (arena, handle)
    }

    /// Run until every handle is gone.
    ///
    /// Commands and ticks are handled one at a time inside a single select
    /// loop, so no handler ever observes another one half-way through.
    pub async fn run(mut self) {
        info!(
            seed = self.settings.seed,
            tick_ms = self.settings.tick_interval.as_secs_f64() * 1000.0,
            "Arena started"
        );

        let mut ticker = interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut lap = LapTimer::new();

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = ticker.tick() => {
                    let dt = lap.lap_secs();
                    self.tick(dt);
                }
            }
        }

        info!("Arena stopped");
    }

    fn handle_command(&mut self, command: ArenaCommand) {
        let mut outbox = Outbox::new();

        match command {
            ArenaCommand::Join {
                player_id,
                name,
                outbound,
            } => {
                if self.clients.contains(&player_id) {
                    warn!(player_id = %player_id, "Duplicate join ignored");
                    return;
                }
                let timer = SpawnTimer::start(
                    player_id,
                    self.settings.spawn_interval,
                    self.spawn_tx.clone(),
                );
                self.clients
                    .attach(Connection::new(Outbound::new(player_id, outbound), timer));
                connection::join(&mut self.world, player_id, name.as_deref(), &mut outbox);
                debug!(connections = self.clients.len(), "Connection attached");
            }
            ArenaCommand::Leave { player_id } => {
                // Dropping the connection aborts its spawn timer
                drop(self.clients.detach(&player_id));
                connection::leave(&mut self.world, player_id, &mut outbox);
                debug!(connections = self.clients.len(), "Connection detached");
            }
            ArenaCommand::Client { player_id, msg } => {
                if let Err(reason) = commands::apply(&mut self.world, player_id, msg, &mut outbox) {
                    debug!(player_id = %player_id, %reason, "Dropped client command");
                }
            }
            ArenaCommand::Spawn { player_id } => {
                if let Some(circle_id) = spawn_circle(&mut self.world, player_id, &mut outbox) {
                    debug!(player_id = %player_id, circle_id = %circle_id, "Circle spawned");
                }
            }
        }

        self.publish(&mut outbox);
    }

    fn tick(&mut self, dt: f64) {
        // Circles only exist while their owners are connected
        if self.clients.is_empty() {
            return;
        }
        let mut outbox = Outbox::new();
        movement::advance_commanded(&mut self.world, dt, &mut outbox);
        self.publish(&mut outbox);
    }

    fn publish(&mut self, outbox: &mut Outbox) {
        self.player_count
            .store(self.world.player_count(), Ordering::Relaxed);
        self.circle_count
            .store(self.world.circle_count(), Ordering::Relaxed);
        self.clients.dispatch(outbox);
    }
}
