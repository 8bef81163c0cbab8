//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! Game rules never run here; match data is routed to `runtime/` sessions.

pub mod protocol;
pub mod server;

pub use protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
pub use server::{GameServer, GameServerError, ServerConfig};
