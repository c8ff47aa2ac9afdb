//! Arena Server - authoritative simulation for a shared 2D arena
//!
//! Players walk square avatars around a bounded world, each owns circles
//! that spawn on a timer, and every change is pushed to all connected
//! clients over WebSocket.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
