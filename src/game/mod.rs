//! Arena simulation modules

pub mod arena;
pub mod broadcast;
pub mod collision;
pub mod commands;
pub mod connection;
pub mod movement;
pub mod rules;
pub mod spawner;
pub mod state;

pub use arena::{Arena, ArenaClosed, ArenaCommand, ArenaHandle, ArenaSettings};
pub use state::{Circle, CircleId, Player, PlayerId, SimulationWorld, WorldBounds};
