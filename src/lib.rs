//! # Tic-Tac-Toe Match Server
//!
//! Authoritative two-player tic-tac-toe, hosted as in-process matches behind
//! a WebSocket front end.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TIC-TAC-TOE SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Rules (pure, no I/O)                      │
//! │  ├── board.rs    - Board, marks, win/draw evaluation         │
//! │  ├── state.rs    - Match state and wire JSON                 │
//! │  ├── input.rs    - Opcodes and move payloads                 │
//! │  ├── tick.rs     - Authoritative move processing             │
//! │  └── lifecycle.rs- Match handler callbacks                   │
//! │                                                              │
//! │  runtime/        - Match hosting                             │
//! │  ├── handler.rs  - Match / Dispatcher traits                 │
//! │  ├── session.rs  - One tokio task per match                  │
//! │  ├── registry.rs - Match types and live matches              │
//! │  └── matchmaker.rs - FIFO pairing                            │
//! │                                                              │
//! │  network/        - WebSocket front end                       │
//! │  ├── server.rs   - Connections, auth, routing                │
//! │  └── protocol.rs - Message types                             │
//! │                                                              │
//! │  module.rs       - Registration and matchmaker hook          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//!
//! Each match's state belongs to exactly one session task. Callbacks for a
//! match never run concurrently, so `game/` has no locks. Players reach a
//! match only through its [`MatchHandle`](runtime::MatchHandle).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod module;
pub mod network;
pub mod runtime;

// Re-export commonly used types
pub use game::board::{Board, Mark, Outcome};
pub use game::lifecycle::TicTacToeMatch;
pub use game::state::{MatchState, PlayerId};
pub use module::{init_module, matchmaker_matched};
pub use runtime::{MatchId, MatchRegistry, RuntimeError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Match tick rate (Hz)
pub const TICK_RATE: u32 = 5;

/// Name the match type is registered under.
pub const MATCH_MODULE: &str = "tictactoe";

/// Label reported for every tic-tac-toe match.
pub const MATCH_LABEL: &str = "TicTacToe_Match";
