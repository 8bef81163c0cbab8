//! Inbound Match Data
//!
//! Opcodes and player actions as they arrive from participants, plus decoding
//! of the move payload. Decoding errors are reported; legality is not checked
//! here (see `tick`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::board::BOARD_CELLS;
use crate::game::state::PlayerId;

// =============================================================================
// OPCODES
// =============================================================================

/// Message opcodes. `Move` is inbound only, the rest are outbound only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum OpCode {
    /// Player places a mark.
    Move = 1,
    /// State after an ordinary move.
    Update = 2,
    /// Terminal state (win, draw, or forfeit).
    GameOver = 3,
    /// Second player joined, game ready.
    PlayerJoin = 4,
}

impl OpCode {
    /// Numeric wire value.
    #[inline]
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Look up an opcode by wire value.
    pub fn from_code(code: i64) -> Option<OpCode> {
        match code {
            1 => Some(OpCode::Move),
            2 => Some(OpCode::Update),
            3 => Some(OpCode::GameOver),
            4 => Some(OpCode::PlayerJoin),
            _ => None,
        }
    }
}

// =============================================================================
// MATCH DATA
// =============================================================================

/// One queued action from a participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchData {
    /// Who sent it.
    pub sender: PlayerId,
    /// Raw opcode; unknown values are kept so the handler can ignore them.
    pub op_code: i64,
    /// Raw payload bytes.
    pub data: Vec<u8>,
}

impl MatchData {
    /// Create match data.
    pub fn new(sender: PlayerId, op_code: i64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            sender,
            op_code,
            data: data.into(),
        }
    }

    /// Convenience: a `Move` action for `position`.
    pub fn move_to(sender: PlayerId, position: i64) -> Self {
        let payload = format!(r#"{{"position":{position}}}"#);
        Self::new(sender, OpCode::Move.code(), payload)
    }

    /// Parsed opcode, `None` for unknown values.
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_code(self.op_code)
    }
}

// =============================================================================
// MOVE PAYLOAD
// =============================================================================

/// Move payload: `{"position": n}`.
///
/// `position` is decoded as a signed integer so that out-of-range values
/// (negative or above 8) are a legality failure rather than a decode failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    /// Target cell.
    pub position: i64,
}

impl Move {
    /// Decode a move payload.
    pub fn decode(data: &[u8]) -> Result<Move, MoveError> {
        serde_json::from_slice(data).map_err(MoveError::Malformed)
    }

    /// Board index, if on the board.
    pub fn cell(&self) -> Option<usize> {
        usize::try_from(self.position)
            .ok()
            .filter(|&p| p < BOARD_CELLS)
    }
}

/// Move decoding errors.
#[derive(Debug, Error)]
pub enum MoveError {
    /// Payload was not a valid `{"position": <integer>}` document.
    #[error("Could not decode move data: {0}")]
    Malformed(#[from] serde_json::Error),
}
