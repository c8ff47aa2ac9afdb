//! Commanded circle movement, advanced once per tick

use crate::ws::protocol::ServerMsg;

use super::broadcast::Outbox;
use super::rules::{ARRIVAL_EPSILON, CIRCLE_SPEED};
use super::state::{CircleId, SimulationWorld};

/// Advance every commanded circle by `dt` seconds.
///
/// Marked circles are skipped. Each circle that ends the tick somewhere new
/// is announced once; untouched circles produce nothing. Returns the ids of
/// the circles that moved.
pub fn advance_commanded(world: &mut SimulationWorld, dt: f64, outbox: &mut Outbox) -> Vec<CircleId> {
    let max_step = CIRCLE_SPEED * dt.max(0.0);
    let mut moved = Vec::new();

    for id in world.commanded_circles() {
        let Some(target) = world.movement(&id).copied() else {
            continue;
        };
        let Some(circle) = world.circle_mut(&id) else {
            world.clear_movement(&id);
            continue;
        };
        if circle.marked_by == Some(circle.owner_id) {
            continue;
        }

        let (start_x, start_y) = (circle.x, circle.y);
        let dx = target.target_x - circle.x;
        let dy = target.target_y - circle.y;
        let remaining = (dx * dx + dy * dy).sqrt();

        if remaining <= ARRIVAL_EPSILON || max_step >= remaining {
            circle.x = target.target_x;
            circle.y = target.target_y;
            world.clear_movement(&id);
        } else {
            circle.x += dx / remaining * max_step;
            circle.y += dy / remaining * max_step;
        }
        world.resolve_circle(id);

        if let Some(circle) = world.circle(&id) {
            if circle.x != start_x || circle.y != start_y {
                moved.push(id);
            }
        }
    }

    for id in &moved {
        if let Some(circle) = world.circle(id) {
            outbox.to_all(ServerMsg::CircleUpdated(circle.clone()));
        }
    }
    moved
}
