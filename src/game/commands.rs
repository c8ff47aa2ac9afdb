//! Validation and application of client commands
//!
//! A rejected command changes nothing and sends nothing. The reason is only
//! reported back to the caller for logging.

use tracing::trace;

use crate::ws::protocol::{ClientMsg, Direction, MoveOrder, ServerMsg};

use super::broadcast::Outbox;
use super::rules::{sanitize_name, MAX_MOVE_DELTA, PLAYER_SPEED};
use super::state::{CircleId, CommandedMovement, Player, PlayerId, SimulationWorld};

/// Why a command was discarded
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandRejected {
    #[error("Unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("Unknown circle {0:?}")]
    UnknownCircle(String),

    #[error("Circle {0} is owned by another player")]
    NotOwner(CircleId),

    #[error("Circle {0} is not being dragged by the issuer")]
    NotMarked(CircleId),

    #[error("Non-finite numeric input")]
    NonFinite,

    #[error("Name is empty after sanitizing")]
    EmptyName,

    #[error("Name is unchanged")]
    UnchangedName,
}

/// Apply one client command issued by `issuer`
pub fn apply(
    world: &mut SimulationWorld,
    issuer: PlayerId,
    msg: ClientMsg,
    outbox: &mut Outbox,
) -> Result<(), CommandRejected> {
    match msg {
        ClientMsg::Move { direction, delta } => move_player(world, issuer, direction, delta, outbox),
        ClientMsg::SetName { name } => set_name(world, issuer, &name, outbox),
        ClientMsg::MarkCircle { circle_id, marked } => {
            mark_circle(world, issuer, &circle_id, marked.unwrap_or(true), outbox)
        }
        ClientMsg::MoveCircle { circle_id, x, y } => {
            move_circle(world, issuer, &circle_id, x, y, outbox)
        }
        ClientMsg::CommandCirclesMove { moves } => {
            command_circles_move(world, issuer, &moves, outbox)
        }
    }
}

/// Step the issuer's avatar along `direction` for `delta` seconds
pub fn move_player(
    world: &mut SimulationWorld,
    issuer: PlayerId,
    direction: Direction,
    delta: f64,
    outbox: &mut Outbox,
) -> Result<(), CommandRejected> {
    if !(direction.x.is_finite() && direction.y.is_finite() && delta.is_finite()) {
        return Err(CommandRejected::NonFinite);
    }

    let bounds = world.bounds;
    let player = world
        .player_mut(&issuer)
        .ok_or(CommandRejected::UnknownPlayer(issuer))?;

    let delta = delta.clamp(0.0, MAX_MOVE_DELTA);
    let (mut dx, mut dy) = (direction.x, direction.y);
    let length = (dx * dx + dy * dy).sqrt();
    if length > 1.0 {
        dx /= length;
        dy /= length;
    }

    let step = PLAYER_SPEED * delta;
    let (x, y) = bounds.clamp(player.x + dx * step, player.y + dy * step, Player::HALF_SIZE);
    player.x = x;
    player.y = y;

    outbox.to_all(ServerMsg::PlayerMoved(player.clone()));
    Ok(())
}

pub fn set_name(
    world: &mut SimulationWorld,
    issuer: PlayerId,
    raw: &str,
    outbox: &mut Outbox,
) -> Result<(), CommandRejected> {
    let player = world
        .player_mut(&issuer)
        .ok_or(CommandRejected::UnknownPlayer(issuer))?;
    let name = sanitize_name(raw).ok_or(CommandRejected::EmptyName)?;
    if name == player.name {
        return Err(CommandRejected::UnchangedName);
    }

    player.name = name;
    outbox.to_all(ServerMsg::PlayerUpdated(player.clone()));
    Ok(())
}

/// Start or stop a manual drag. Marking always preempts commanded movement.
pub fn mark_circle(
    world: &mut SimulationWorld,
    issuer: PlayerId,
    raw_id: &str,
    marked: bool,
    outbox: &mut Outbox,
) -> Result<(), CommandRejected> {
    let id = owned_circle(world, issuer, raw_id)?;

    if marked {
        world.clear_movement(&id);
    } else if world.circle(&id).and_then(|c| c.marked_by) != Some(issuer) {
        return Err(CommandRejected::NotMarked(id));
    }

    let circle = world
        .circle_mut(&id)
        .ok_or_else(|| CommandRejected::UnknownCircle(raw_id.to_string()))?;
    circle.marked_by = marked.then_some(issuer);

    outbox.to_all(ServerMsg::CircleUpdated(circle.clone()));
    Ok(())
}

/// Drag a marked circle to an explicit point
pub fn move_circle(
    world: &mut SimulationWorld,
    issuer: PlayerId,
    raw_id: &str,
    x: f64,
    y: f64,
    outbox: &mut Outbox,
) -> Result<(), CommandRejected> {
    if !(x.is_finite() && y.is_finite()) {
        return Err(CommandRejected::NonFinite);
    }
    let id = owned_circle(world, issuer, raw_id)?;

    let bounds = world.bounds;
    let circle = world
        .circle_mut(&id)
        .ok_or_else(|| CommandRejected::UnknownCircle(raw_id.to_string()))?;
    if circle.marked_by != Some(issuer) {
        return Err(CommandRejected::NotMarked(id));
    }

    let (cx, cy) = bounds.clamp(x, y, circle.radius);
    circle.x = cx;
    circle.y = cy;
    world.clear_movement(&id);
    world.resolve_circle(id);

    if let Some(circle) = world.circle(&id) {
        outbox.to_all(ServerMsg::CircleUpdated(circle.clone()));
    }
    Ok(())
}

/// Queue automatic movement for a batch of the issuer's circles.
///
/// Entries naming unknown or foreign circles are skipped; the rest still
/// apply. Each touched circle is announced once after the whole batch.
pub fn command_circles_move(
    world: &mut SimulationWorld,
    issuer: PlayerId,
    moves: &[MoveOrder],
    outbox: &mut Outbox,
) -> Result<(), CommandRejected> {
    if world.player(&issuer).is_none() {
        return Err(CommandRejected::UnknownPlayer(issuer));
    }

    let mut touched: Vec<CircleId> = Vec::new();
    for order in moves {
        match command_one(world, issuer, order) {
            Ok(id) => {
                if !touched.contains(&id) {
                    touched.push(id);
                }
            }
            Err(reason) => {
                trace!(player_id = %issuer, circle_id = %order.circle_id, %reason, "Skipping move order");
            }
        }
    }

    for id in touched {
        if let Some(circle) = world.circle(&id) {
            outbox.to_all(ServerMsg::CircleUpdated(circle.clone()));
        }
    }
    Ok(())
}

fn command_one(
    world: &mut SimulationWorld,
    issuer: PlayerId,
    order: &MoveOrder,
) -> Result<CircleId, CommandRejected> {
    if !(order.target_x.is_finite() && order.target_y.is_finite()) {
        return Err(CommandRejected::NonFinite);
    }
    let id = owned_circle(world, issuer, &order.circle_id)?;

    let bounds = world.bounds;
    let circle = world
        .circle_mut(&id)
        .ok_or_else(|| CommandRejected::UnknownCircle(order.circle_id.clone()))?;
    circle.marked_by = None;

    let (target_x, target_y) = bounds.clamp(order.target_x, order.target_y, circle.radius);
    if target_x == circle.x && target_y == circle.y {
        world.clear_movement(&id);
    } else {
        world.set_movement(id, CommandedMovement { target_x, target_y });
    }

    world.resolve_circle(id);
    Ok(id)
}

/// Look up a circle by its wire id and check the issuer owns it
fn owned_circle(
    world: &SimulationWorld,
    issuer: PlayerId,
    raw_id: &str,
) -> Result<CircleId, CommandRejected> {
    let circle = raw_id
        .parse::<CircleId>()
        .ok()
        .and_then(|id| world.circle(&id))
        .ok_or_else(|| CommandRejected::UnknownCircle(raw_id.to_string()))?;

    if circle.owner_id != issuer {
        return Err(CommandRejected::NotOwner(circle.id));
    }
    Ok(circle.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::connection::join;
    use crate::game::spawner::spawn_circle;
    use uuid::Uuid;

    struct Fixture {
        world: SimulationWorld,
        outbox: Outbox,
        owner: PlayerId,
        intruder: PlayerId,
        circle: CircleId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut world = SimulationWorld::new(8);
            let mut outbox = Outbox::new();
            let owner = Uuid::new_v4();
            let intruder = Uuid::new_v4();
            join(&mut world, owner, Some("Owner"), &mut outbox);
            join(&mut world, intruder, Some("Intruder"), &mut outbox);

            // Park the players far apart so resolution does not interfere
            world.player_mut(&owner).unwrap().x = 1000.0;
            world.player_mut(&owner).unwrap().y = 1000.0;
            world.player_mut(&intruder).unwrap().x = 7000.0;
            world.player_mut(&intruder).unwrap().y = 5000.0;

            let circle = spawn_circle(&mut world, owner, &mut outbox).unwrap();
            outbox.drain().for_each(drop);
            Self {
                world,
                outbox,
                owner,
                intruder,
                circle,
            }
        }

        fn circle_id(&self) -> String {
            self.circle.to_string()
        }

        fn apply(&mut self, issuer: PlayerId, msg: ClientMsg) -> Result<(), CommandRejected> {
            apply(&mut self.world, issuer, msg, &mut self.outbox)
        }

        fn updates(&mut self) -> Vec<ServerMsg> {
            self.outbox.drain().map(|o| o.msg).collect()
        }
    }

    fn order(id: &str, x: f64, y: f64) -> MoveOrder {
        MoveOrder {
            circle_id: id.to_string(),
            target_x: x,
            target_y: y,
        }
    }

    #[test]
    fn move_clamps_delta_and_broadcasts() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        fx.apply(
            owner,
            ClientMsg::Move {
                direction: Direction { x: 1.0, y: 0.0 },
                delta: 5.0,
            },
        )
        .unwrap();

        let player = fx.world.player(&owner).unwrap();
        assert!((player.x - (1000.0 + PLAYER_SPEED * MAX_MOVE_DELTA)).abs() < 1e-9);
        assert!(matches!(fx.updates().as_slice(), [ServerMsg::PlayerMoved(p)] if p.id == owner));
    }

    #[test]
    fn move_normalizes_long_direction_and_ignores_negative_delta() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        fx.apply(
            owner,
            ClientMsg::Move {
                direction: Direction { x: 30.0, y: 40.0 },
                delta: 0.1,
            },
        )
        .unwrap();
        let p = fx.world.player(&owner).unwrap();
        let step = PLAYER_SPEED * 0.1;
        assert!((p.x - (1000.0 + 0.6 * step)).abs() < 1e-9);
        assert!((p.y - (1000.0 + 0.8 * step)).abs() < 1e-9);

        let before = (p.x, p.y);
        fx.apply(
            owner,
            ClientMsg::Move {
                direction: Direction { x: 1.0, y: 0.0 },
                delta: -3.0,
            },
        )
        .unwrap();
        let p = fx.world.player(&owner).unwrap();
        assert_eq!((p.x, p.y), before);
    }

    #[test]
    fn move_stops_at_world_border() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        fx.world.player_mut(&owner).unwrap().x = 61.0;
        fx.apply(
            owner,
            ClientMsg::Move {
                direction: Direction { x: -1.0, y: 0.0 },
                delta: 0.1,
            },
        )
        .unwrap();
        let bounds = fx.world.bounds;
        assert_eq!(fx.world.player(&owner).unwrap().x, bounds.border + Player::HALF_SIZE);
    }

    #[test]
    fn non_finite_move_is_rejected_without_side_effects() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        let result = fx.apply(
            owner,
            ClientMsg::Move {
                direction: Direction { x: f64::NAN, y: 0.0 },
                delta: 0.1,
            },
        );
        assert_eq!(result, Err(CommandRejected::NonFinite));
        assert!(fx.updates().is_empty());
    }

    #[test]
    fn set_name_updates_once_and_skips_unchanged_or_empty() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        fx.apply(owner, ClientMsg::SetName { name: "  Renamed ".into() })
            .unwrap();
        assert_eq!(fx.world.player(&owner).unwrap().name, "Renamed");
        assert_eq!(fx.updates().len(), 1);

        assert_eq!(
            fx.apply(owner, ClientMsg::SetName { name: "Renamed".into() }),
            Err(CommandRejected::UnchangedName)
        );
        assert_eq!(
            fx.apply(owner, ClientMsg::SetName { name: "   ".into() }),
            Err(CommandRejected::EmptyName)
        );
        assert!(fx.updates().is_empty());
    }

    #[test]
    fn marking_twice_equals_marking_once() {
        let mut fx = Fixture::new();
        let (owner, id) = (fx.owner, fx.circle_id());
        let mark = || ClientMsg::MarkCircle {
            circle_id: id.clone(),
            marked: Some(true),
        };

        fx.apply(owner, mark()).unwrap();
        let once = fx.world.circle(&fx.circle).unwrap().clone();
        fx.apply(owner, mark()).unwrap();
        let twice = fx.world.circle(&fx.circle).unwrap().clone();

        assert_eq!(once, twice);
        assert_eq!(twice.marked_by, Some(owner));
    }

    #[test]
    fn marking_defaults_to_true_and_cancels_commanded_movement() {
        let mut fx = Fixture::new();
        let (owner, circle) = (fx.owner, fx.circle);
        fx.apply(
            owner,
            ClientMsg::CommandCirclesMove {
                moves: vec![order(&fx.circle_id(), 3000.0, 3000.0)],
            },
        )
        .unwrap();
        assert!(fx.world.movement(&circle).is_some());

        fx.apply(
            owner,
            ClientMsg::MarkCircle {
                circle_id: fx.circle_id(),
                marked: None,
            },
        )
        .unwrap();
        assert!(fx.world.movement(&circle).is_none());
        assert_eq!(fx.world.circle(&circle).unwrap().marked_by, Some(owner));
    }

    #[test]
    fn unmarking_requires_an_active_mark() {
        let mut fx = Fixture::new();
        let (owner, circle) = (fx.owner, fx.circle);
        let unmark = ClientMsg::MarkCircle {
            circle_id: fx.circle_id(),
            marked: Some(false),
        };
        assert_eq!(
            fx.apply(owner, unmark.clone()),
            Err(CommandRejected::NotMarked(circle))
        );
        assert!(fx.updates().is_empty());

        fx.apply(
            owner,
            ClientMsg::MarkCircle {
                circle_id: fx.circle_id(),
                marked: Some(true),
            },
        )
        .unwrap();
        fx.apply(owner, unmark).unwrap();
        assert_eq!(fx.world.circle(&circle).unwrap().marked_by, None);
    }

    #[test]
    fn foreign_connection_cannot_touch_the_circle() {
        let mut fx = Fixture::new();
        let (intruder, circle) = (fx.intruder, fx.circle);
        let before = fx.world.circle(&circle).unwrap().clone();

        let attempts = vec![
            ClientMsg::MarkCircle {
                circle_id: fx.circle_id(),
                marked: Some(true),
            },
            ClientMsg::MoveCircle {
                circle_id: fx.circle_id(),
                x: 4000.0,
                y: 4000.0,
            },
        ];
        for msg in attempts {
            assert_eq!(fx.apply(intruder, msg), Err(CommandRejected::NotOwner(circle)));
        }
        fx.apply(
            intruder,
            ClientMsg::CommandCirclesMove {
                moves: vec![order(&fx.circle_id(), 4000.0, 4000.0)],
            },
        )
        .unwrap();

        assert_eq!(fx.world.circle(&circle).unwrap(), &before);
        assert!(fx.world.movement(&circle).is_none());
        assert!(fx.updates().is_empty());
    }

    #[test]
    fn move_circle_requires_mark_and_resolves() {
        let mut fx = Fixture::new();
        let (owner, circle) = (fx.owner, fx.circle);
        let drag = |x, y| ClientMsg::MoveCircle {
            circle_id: circle.to_string(),
            x,
            y,
        };

        assert_eq!(
            fx.apply(owner, drag(2500.0, 2500.0)),
            Err(CommandRejected::NotMarked(circle))
        );

        fx.apply(
            owner,
            ClientMsg::MarkCircle {
                circle_id: fx.circle_id(),
                marked: Some(true),
            },
        )
        .unwrap();
        fx.updates();

        fx.apply(owner, drag(2500.0, 2500.0)).unwrap();
        let c = fx.world.circle(&circle).unwrap();
        assert_eq!((c.x, c.y), (2500.0, 2500.0));
        assert_eq!(fx.updates().len(), 1);

        // Dragging onto the owner's own square pushes the circle out of it
        fx.apply(owner, drag(1000.0, 1005.0)).unwrap();
        let c = fx.world.circle(&circle).unwrap();
        assert!((c.y - 1000.0).abs() >= Player::HALF_SIZE + c.radius);

        // Dragging past the border clamps
        fx.apply(owner, drag(-100.0, 100.0)).unwrap();
        let c = fx.world.circle(&circle).unwrap();
        assert_eq!(c.x, fx.world.bounds.border + c.radius);
    }

    #[test]
    fn command_unmarks_clamps_and_installs_movement() {
        let mut fx = Fixture::new();
        let (owner, circle) = (fx.owner, fx.circle);
        fx.apply(
            owner,
            ClientMsg::MarkCircle {
                circle_id: fx.circle_id(),
                marked: Some(true),
            },
        )
        .unwrap();
        fx.updates();

        fx.apply(
            owner,
            ClientMsg::CommandCirclesMove {
                moves: vec![order(&fx.circle_id(), -500.0, 2000.0)],
            },
        )
        .unwrap();

        let c = fx.world.circle(&circle).unwrap();
        assert_eq!(c.marked_by, None);
        let movement = fx.world.movement(&circle).unwrap();
        assert_eq!(movement.target_x, fx.world.bounds.border + c.radius);
        assert_eq!(movement.target_y, 2000.0);
        assert!(matches!(fx.updates().as_slice(), [ServerMsg::CircleUpdated(c)] if c.id == circle));
    }

    #[test]
    fn command_to_current_position_drops_movement() {
        let mut fx = Fixture::new();
        let (owner, circle) = (fx.owner, fx.circle);
        fx.apply(
            owner,
            ClientMsg::CommandCirclesMove {
                moves: vec![order(&fx.circle_id(), 3000.0, 3000.0)],
            },
        )
        .unwrap();
        assert!(fx.world.movement(&circle).is_some());

        let c = fx.world.circle(&circle).unwrap().clone();
        fx.apply(
            owner,
            ClientMsg::CommandCirclesMove {
                moves: vec![order(&fx.circle_id(), c.x, c.y)],
            },
        )
        .unwrap();
        assert!(fx.world.movement(&circle).is_none());
    }

    #[test]
    fn command_skips_bad_entries_and_broadcasts_each_circle_once() {
        let mut fx = Fixture::new();
        let (owner, circle) = (fx.owner, fx.circle);
        let second = spawn_circle(&mut fx.world, owner, &mut fx.outbox).unwrap();
        fx.updates();

        fx.apply(
            owner,
            ClientMsg::CommandCirclesMove {
                moves: vec![
                    order(&circle.to_string(), 3000.0, 3000.0),
                    order("not-a-circle", 1.0, 1.0),
                    order("99999", 1.0, 1.0),
                    order(&second.to_string(), 3500.0, 3000.0),
                    order(&circle.to_string(), 3100.0, 3000.0),
                ],
            },
        )
        .unwrap();

        let updated: Vec<CircleId> = fx
            .updates()
            .into_iter()
            .filter_map(|m| match m {
                ServerMsg::CircleUpdated(c) => Some(c.id),
                _ => None,
            })
            .collect();
        assert_eq!(updated, vec![circle, second]);
        assert_eq!(fx.world.movement(&circle).unwrap().target_x, 3100.0);
    }

    #[test]
    fn stale_circle_id_is_a_no_op() {
        let mut fx = Fixture::new();
        let owner = fx.owner;
        let result = fx.apply(
            owner,
            ClientMsg::MoveCircle {
                circle_id: "12345".into(),
                x: 10.0,
                y: 10.0,
            },
        );
        assert!(matches!(result, Err(CommandRejected::UnknownCircle(_))));
        assert!(fx.updates().is_empty());
    }
}
