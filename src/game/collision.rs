//! Collision resolution for circles against player footprints and other circles
//!
//! The resolver is a bounded fixed-point approximation, not a physics engine.
//! Passes always run in the same order:
//!
//! 1. clamp into world bounds
//! 2. push out of player squares in join order (up to [`MAX_RESOLUTION_ITERATIONS`] sweeps)
//! 3. push out of other circles (up to [`MAX_RESOLUTION_ITERATIONS`] sweeps)
//! 4. push out of player squares again
//! 5. clamp into world bounds
//!
//! Under extreme density the iteration caps can be exhausted and leave a
//! residual overlap. That is accepted; termination is what the caps buy.

use std::collections::BTreeMap;

use rand::Rng;

use super::rules::{MAX_RESOLUTION_ITERATIONS, SEPARATION_PADDING};
use super::state::{Circle, CircleId, Player, PlayerRoster, SimulationWorld, WorldBounds};

/// Below this distance two points are treated as coincident
const COINCIDENT_EPSILON: f64 = 1e-9;

/// Collision system for separating overlapping entities
pub struct CollisionResolver;

impl CollisionResolver {
    /// Run the full ordered resolution for one circle and return its new center
    pub fn resolve<R: Rng>(
        circle_id: CircleId,
        x: f64,
        y: f64,
        radius: f64,
        bounds: &WorldBounds,
        players: &PlayerRoster,
        circles: &BTreeMap<CircleId, Circle>,
        rng: &mut R,
    ) -> (f64, f64) {
        let (x, y) = bounds.clamp(x, y, radius);
        let (x, y) = Self::separate_from_players(x, y, radius, players, rng);
        let (x, y) = Self::separate_from_circles(circle_id, x, y, radius, circles, rng);
        let (x, y) = Self::separate_from_players(x, y, radius, players, rng);
        bounds.clamp(x, y, radius)
    }

    /// Sweep every player footprint until nothing overlaps or the cap is reached
    pub fn separate_from_players<R: Rng>(
        mut x: f64,
        mut y: f64,
        radius: f64,
        players: &PlayerRoster,
        rng: &mut R,
    ) -> (f64, f64) {
        for _ in 0..MAX_RESOLUTION_ITERATIONS {
            let mut adjusted = false;
            for player in players.iter() {
                if let Some((nx, ny)) =
                    Self::push_out_of_square(x, y, radius, player.x, player.y, Player::HALF_SIZE, rng)
                {
                    x = nx;
                    y = ny;
                    adjusted = true;
                }
            }
            if !adjusted {
                break;
            }
        }
        (x, y)
    }

    /// Sweep every other circle until nothing overlaps or the cap is reached
    pub fn separate_from_circles<R: Rng>(
        circle_id: CircleId,
        mut x: f64,
        mut y: f64,
        radius: f64,
        circles: &BTreeMap<CircleId, Circle>,
        rng: &mut R,
    ) -> (f64, f64) {
        for _ in 0..MAX_RESOLUTION_ITERATIONS {
            let mut adjusted = false;
            for other in circles.values() {
                if other.id == circle_id {
                    continue;
                }
                if let Some((nx, ny)) =
                    Self::push_out_of_circle(x, y, radius, other.x, other.y, other.radius, rng)
                {
                    x = nx;
                    y = ny;
                    adjusted = true;
                }
            }
            if !adjusted {
                break;
            }
        }
        (x, y)
    }

    /// Push a circle out of an axis-aligned square.
    /// Returns `None` when they do not overlap.
    pub fn push_out_of_square<R: Rng>(
        x: f64,
        y: f64,
        radius: f64,
        square_x: f64,
        square_y: f64,
        half_size: f64,
        rng: &mut R,
    ) -> Option<(f64, f64)> {
        let left = square_x - half_size;
        let right = square_x + half_size;
        let top = square_y - half_size;
        let bottom = square_y + half_size;

        let closest_x = x.clamp(left, right);
        let closest_y = y.clamp(top, bottom);
        let dx = x - closest_x;
        let dy = y - closest_y;
        let dist = (dx * dx + dy * dy).sqrt();

        if dist >= radius {
            return None;
        }

        if dist > COINCIDENT_EPSILON {
            let push = radius - dist + SEPARATION_PADDING;
            return Some((x + dx / dist * push, y + dy / dist * push));
        }

        // Center sits inside the square: exit through the nearest edge
        let clearance = radius + SEPARATION_PADDING;
        let exits = [
            (x - left, (left - clearance, y)),
            (right - x, (right + clearance, y)),
            (y - top, (x, top - clearance)),
            (bottom - y, (x, bottom + clearance)),
        ];
        let nearest = exits
            .iter()
            .map(|(d, _)| *d)
            .fold(f64::INFINITY, f64::min);
        let candidates: Vec<(f64, f64)> = exits
            .iter()
            .filter(|(d, _)| (*d - nearest).abs() <= COINCIDENT_EPSILON)
            .map(|(_, target)| *target)
            .collect();

        let pick = rng.gen_range(0..candidates.len());
        Some(candidates[pick])
    }

    /// Push a circle away from another circle.
    /// Returns `None` when they do not overlap.
    pub fn push_out_of_circle<R: Rng>(
        x: f64,
        y: f64,
        radius: f64,
        other_x: f64,
        other_y: f64,
        other_radius: f64,
        rng: &mut R,
    ) -> Option<(f64, f64)> {
        let dx = x - other_x;
        let dy = y - other_y;
        let dist = (dx * dx + dy * dy).sqrt();
        let min_dist = radius + other_radius;

        if dist >= min_dist {
            return None;
        }

        if dist > COINCIDENT_EPSILON {
            let push = min_dist - dist + SEPARATION_PADDING;
            return Some((x + dx / dist * push, y + dy / dist * push));
        }

        let angle = rng.gen_range(0.0..std::f64::consts::TAU);
        let push = min_dist + SEPARATION_PADDING;
        Some((other_x + angle.cos() * push, other_y + angle.sin() * push))
    }
}

impl SimulationWorld {
    /// Resolve one circle against the rest of the world and store the result.
    /// Returns `true` if the circle's position changed.
    pub fn resolve_circle(&mut self, id: CircleId) -> bool {
        let Some(circle) = self.circles.get(&id) else {
            return false;
        };
        let (x, y, radius) = (circle.x, circle.y, circle.radius);

        let (nx, ny) = CollisionResolver::resolve(
            id,
            x,
            y,
            radius,
            &self.bounds,
            &self.players,
            &self.circles,
            &mut self.rng,
        );

        match self.circles.get_mut(&id) {
            Some(circle) => {
                circle.x = nx;
                circle.y = ny;
                nx != x || ny != y
            }
            None => false,
        }
    }
}
