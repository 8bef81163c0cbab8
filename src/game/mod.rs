//! Game Logic Module
//!
//! Tic-tac-toe rules. Nothing here touches the network or the clock.
//!
//! ## Module Structure
//!
//! - `board`: Cells, marks, win/draw evaluation
//! - `state`: Match state and its JSON wire form
//! - `input`: Opcodes and move payloads
//! - `tick`: Authoritative move processing
//! - `lifecycle`: The match handler (join, leave, tick, terminate)

pub mod board;
pub mod input;
pub mod lifecycle;
pub mod state;
pub mod tick;

// Re-export key types
pub use board::{check_outcome, Board, Mark, Outcome};
pub use input::{MatchData, Move, MoveError, OpCode};
pub use lifecycle::TicTacToeMatch;
pub use state::{MatchPhase, MatchState, PlayerId};
pub use tick::TickResult;
