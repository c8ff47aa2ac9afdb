//! Authoritative world state: players, circles and in-flight commanded movements

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::rules::{
    CIRCLE_RADIUS, DEFAULT_PLAYER_NAME, PLAYER_PALETTE, PLAYER_SIZE, WORLD_BORDER, WORLD_HEIGHT,
    WORLD_WIDTH,
};

/// Per-connection ephemeral identity
pub type PlayerId = Uuid;

/// Monotonically assigned circle identity, sent on the wire as a decimal string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CircleId(u64);

impl CircleId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for CircleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CircleId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl Serialize for CircleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Fixed world dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorldBounds {
    pub width: f64,
    pub height: f64,
    pub border: f64,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            width: WORLD_WIDTH,
            height: WORLD_HEIGHT,
            border: WORLD_BORDER,
        }
    }
}

impl WorldBounds {
    /// Clamp a center point so an entity of the given half-extent stays inside the border
    pub fn clamp(&self, x: f64, y: f64, margin: f64) -> (f64, f64) {
        let inset = self.border + margin;
        (
            x.max(inset).min(self.width - inset),
            y.max(inset).min(self.height - inset),
        )
    }

    #[cfg(test)]
    pub fn contains(&self, x: f64, y: f64, margin: f64) -> bool {
        let inset = self.border + margin;
        x >= inset && x <= self.width - inset && y >= inset && y <= self.height - inset
    }
}

/// A connected participant's avatar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    pub id: PlayerId,
    pub x: f64,
    pub y: f64,
    pub color: String,
    pub name: String,
}

impl Player {
    pub const HALF_SIZE: f64 = PLAYER_SIZE / 2.0;
}

/// A collectible entity owned by exactly one player
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Circle {
    pub id: CircleId,
    pub owner_id: PlayerId,
    pub color: String,
    pub radius: f64,
    pub x: f64,
    pub y: f64,
    pub marked_by: Option<PlayerId>,
}

impl Circle {
    pub fn is_marked(&self) -> bool {
        self.marked_by.is_some()
    }
}

/// Players kept in join order.
///
/// Iteration follows join order so the collision sweep, and with it every
/// resolved position, is reproducible for a given seed.
#[derive(Debug, Default)]
pub struct PlayerRoster {
    seats: HashMap<PlayerId, u64>,
    players: BTreeMap<u64, Player>,
    next_seat: u64,
}

impl PlayerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.seats.get(id).and_then(|seat| self.players.get(seat))
    }

    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        let seat = self.seats.get(id)?;
        self.players.get_mut(seat)
    }

    /// Insert or replace a player. A replaced player keeps its original seat.
    pub fn insert(&mut self, player: Player) {
        let seat = match self.seats.get(&player.id) {
            Some(seat) => *seat,
            None => {
                let seat = self.next_seat;
                self.next_seat += 1;
                self.seats.insert(player.id, seat);
                seat
            }
        };
        self.players.insert(seat, player);
    }

    pub fn remove(&mut self, id: &PlayerId) -> Option<Player> {
        let seat = self.seats.remove(id)?;
        self.players.remove(&seat)
    }

    /// Players in join order
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.players.len()
    }
}

/// Automatic travel target for a circle, advanced by the tick loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandedMovement {
    pub target_x: f64,
    pub target_y: f64,
}

/// The single aggregate holding every piece of shared state
pub struct SimulationWorld {
    pub bounds: WorldBounds,
    pub(crate) players: PlayerRoster,
    pub(crate) circles: BTreeMap<CircleId, Circle>,
    pub(crate) movements: HashMap<CircleId, CommandedMovement>,
    pub(crate) rng: ChaCha8Rng,
    next_circle_id: u64,
}

impl SimulationWorld {
    pub fn new(seed: u64) -> Self {
        Self::with_bounds(WorldBounds::default(), seed)
    }

    pub fn with_bounds(bounds: WorldBounds, seed: u64) -> Self {
        Self {
            bounds,
            players: PlayerRoster::new(),
            circles: BTreeMap::new(),
            movements: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_circle_id: 1,
        }
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// Players in join order
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn circle(&self, id: &CircleId) -> Option<&Circle> {
        self.circles.get(id)
    }

    pub fn circle_mut(&mut self, id: &CircleId) -> Option<&mut Circle> {
        self.circles.get_mut(id)
    }

    /// Circles in id order
    pub fn circles(&self) -> impl Iterator<Item = &Circle> {
        self.circles.values()
    }

    pub fn circle_count(&self) -> usize {
        self.circles.len()
    }

    pub fn movement(&self, id: &CircleId) -> Option<&CommandedMovement> {
        self.movements.get(id)
    }

    pub fn set_movement(&mut self, id: CircleId, movement: CommandedMovement) {
        self.movements.insert(id, movement);
    }

    pub fn clear_movement(&mut self, id: &CircleId) -> Option<CommandedMovement> {
        self.movements.remove(id)
    }

    /// Ids of circles with a pending commanded movement, in id order
    pub fn commanded_circles(&self) -> Vec<CircleId> {
        let mut ids: Vec<CircleId> = self.movements.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn insert_player(&mut self, player: Player) {
        self.players.insert(player);
    }

    pub fn remove_player(&mut self, id: &PlayerId) -> Option<Player> {
        self.players.remove(id)
    }

    /// Build a new player at a random in-bounds position with a random palette color
    pub fn create_player(&mut self, id: PlayerId, name: Option<String>) -> Player {
        let (x, y) = self.random_position(Player::HALF_SIZE);
        let color = PLAYER_PALETTE
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(PLAYER_PALETTE[0])
            .to_string();

        Player {
            id,
            x,
            y,
            color,
            name: name.unwrap_or_else(|| DEFAULT_PLAYER_NAME.to_string()),
        }
    }

    /// Add a circle for `owner` at the owner's current position.
    /// Returns `None` if the owner is gone.
    pub fn insert_circle_for(&mut self, owner: &PlayerId) -> Option<CircleId> {
        let player = self.players.get(owner)?;
        let id = CircleId(self.next_circle_id);
        self.next_circle_id += 1;

        let circle = Circle {
            id,
            owner_id: player.id,
            color: player.color.clone(),
            radius: CIRCLE_RADIUS,
            x: player.x,
            y: player.y,
            marked_by: None,
        };
        self.circles.insert(id, circle);
        Some(id)
    }

    /// Remove every circle owned by `owner` together with their pending movements
    pub fn remove_circles_owned_by(&mut self, owner: &PlayerId) -> Vec<CircleId> {
        let owned: Vec<CircleId> = self
            .circles
            .values()
            .filter(|c| c.owner_id == *owner)
            .map(|c| c.id)
            .collect();

        for id in &owned {
            self.circles.remove(id);
            self.movements.remove(id);
        }
        owned
    }

    fn random_position(&mut self, margin: f64) -> (f64, f64) {
        let inset = self.bounds.border + margin;
        let max_x = (self.bounds.width - inset).max(inset);
        let max_y = (self.bounds.height - inset).max(inset);
        let x = self.rng.gen_range(inset..=max_x);
        let y = self.rng.gen_range(inset..=max_y);
        self.bounds.clamp(x, y, margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_ids_are_monotonic_and_unique() {
        let mut world = SimulationWorld::new(7);
        let owner = Uuid::new_v4();
        let player = world.create_player(owner, None);
        world.insert_player(player);

        let a = world.insert_circle_for(&owner).unwrap();
        let b = world.insert_circle_for(&owner).unwrap();
        world.remove_circles_owned_by(&owner);
        let c = world.insert_circle_for(&owner).unwrap();

        assert!(a < b && b < c);
    }

    #[test]
    fn circle_inherits_owner_color_and_position() {
        let mut world = SimulationWorld::new(1);
        let owner = Uuid::new_v4();
        let player = world.create_player(owner, Some("Ann".into()));
        let (x, y, color) = (player.x, player.y, player.color.clone());
        world.insert_player(player);

        let id = world.insert_circle_for(&owner).unwrap();
        let circle = world.circle(&id).unwrap();
        assert_eq!(circle.owner_id, owner);
        assert_eq!(circle.color, color);
        assert_eq!((circle.x, circle.y), (x, y));
        assert_eq!(circle.marked_by, None);
    }

    #[test]
    fn no_circle_for_unknown_owner() {
        let mut world = SimulationWorld::new(1);
        assert!(world.insert_circle_for(&Uuid::new_v4()).is_none());
        assert_eq!(world.circle_count(), 0);
    }

    #[test]
    fn spawn_positions_stay_inside_border() {
        let mut world = SimulationWorld::new(99);
        for _ in 0..200 {
            let player = world.create_player(Uuid::new_v4(), None);
            assert!(world.bounds.contains(player.x, player.y, Player::HALF_SIZE));
            assert!(PLAYER_PALETTE.contains(&player.color.as_str()));
            assert_eq!(player.name, DEFAULT_PLAYER_NAME);
        }
    }

    #[test]
    fn removing_owner_circles_drops_their_movements() {
        let mut world = SimulationWorld::new(3);
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        for id in [owner, other] {
            let player = world.create_player(id, None);
            world.insert_player(player);
        }
        let mine = world.insert_circle_for(&owner).unwrap();
        let theirs = world.insert_circle_for(&other).unwrap();
        world.set_movement(
            mine,
            CommandedMovement {
                target_x: 500.0,
                target_y: 500.0,
            },
        );

        assert_eq!(world.remove_circles_owned_by(&owner), vec![mine]);
        assert!(world.movement(&mine).is_none());
        assert!(world.circle(&theirs).is_some());
    }

    #[test]
    fn circle_id_wire_form_is_a_string() {
        let json = serde_json::to_string(&CircleId::new(42)).unwrap();
        assert_eq!(json, "\"42\"");
        assert_eq!("42".parse::<CircleId>().unwrap(), CircleId::new(42));
        assert!("abc".parse::<CircleId>().is_err());
    }

    #[test]
    fn roster_iterates_in_join_order() {
        let mut world = SimulationWorld::new(8);
        let ids: Vec<PlayerId> = (1..=5u128).rev().map(Uuid::from_u128).collect();
        for id in &ids {
            let player = world.create_player(*id, None);
            world.insert_player(player);
        }
        world.remove_player(&ids[1]);
        let rejoined = world.create_player(ids[1], None);
        world.insert_player(rejoined);

        let order: Vec<PlayerId> = world.players().map(|p| p.id).collect();
        assert_eq!(order, vec![ids[0], ids[2], ids[3], ids[4], ids[1]]);

        // Replacing an existing player keeps its seat
        let mut renamed = world.player(&ids[2]).unwrap().clone();
        renamed.name = "Renamed".into();
        world.insert_player(renamed);
        assert_eq!(world.players().nth(1).unwrap().name, "Renamed");
        assert_eq!(world.player_count(), 5);
    }
}
