//! Fixed gameplay constants shared by every connection

use std::time::Duration;

/// Arena width in world units
pub const WORLD_WIDTH: f64 = 8000.0;
/// Arena height in world units
pub const WORLD_HEIGHT: f64 = 6000.0;
/// Thickness of the impassable border on every edge
pub const WORLD_BORDER: f64 = 40.0;

/// Player walking speed (units per second)
pub const PLAYER_SPEED: f64 = 200.0;
/// Side length of the square player footprint
pub const PLAYER_SIZE: f64 = 40.0;
/// Largest `move` delta honored, in seconds
pub const MAX_MOVE_DELTA: f64 = 0.1;

/// Radius of every circle
pub const CIRCLE_RADIUS: f64 = 12.0;
/// Speed of commanded circle movement (units per second)
pub const CIRCLE_SPEED: f64 = PLAYER_SPEED / 5.0;
/// Remaining distance at which a commanded circle counts as arrived
pub const ARRIVAL_EPSILON: f64 = 0.5;

/// Passes per resolver stage before giving up on dense overlap
pub const MAX_RESOLUTION_ITERATIONS: usize = 6;
/// Extra separation added when pushing entities apart
pub const SEPARATION_PADDING: f64 = 0.5;

/// Interval between circle spawns for each connected player
pub const SPAWN_INTERVAL: Duration = Duration::from_millis(1000);

/// Display name limits
pub const NAME_MAX_CHARS: usize = 20;
pub const DEFAULT_PLAYER_NAME: &str = "Player";

/// Colors handed out to joining players
pub const PLAYER_PALETTE: [&str; 5] = ["#ff595e", "#ffca3a", "#8ac926", "#1982c4", "#6a4c93"];

/// Trim and truncate a proposed display name.
/// Returns `None` when nothing printable is left.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let truncated: String = raw.trim().chars().take(NAME_MAX_CHARS).collect();
    let trimmed = truncated.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
