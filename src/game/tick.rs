//! Authoritative Tick
//!
//! Drains one batch of queued actions against the match state. Actions are
//! handled strictly in arrival order; every accepted move is broadcast before
//! the next action is looked at.

use tracing::{debug, warn};

use crate::game::board::Mark;
use crate::game::input::{MatchData, Move, MoveError, OpCode};
use crate::game::lifecycle::broadcast_state;
use crate::game::state::{MatchState, MAX_PLAYERS};
use crate::runtime::handler::{Dispatcher, MatchContext};

/// Result of a tick.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickResult {
    /// Moves applied this tick.
    pub applied: usize,
    /// Actions dropped (wrong opcode, wrong turn, malformed, illegal).
    pub discarded: usize,
    /// Actions left unprocessed because the game ended mid-batch.
    pub skipped: usize,
    /// Whether the game ended this tick.
    pub match_ended: bool,
}

/// Why an action was dropped.
#[derive(Debug)]
pub enum Discard {
    /// Opcode is not `Move`.
    NotAMove,
    /// Sender is not on the roster.
    UnknownPlayer,
    /// Sender's mark is not the one to move.
    NotYourTurn,
    /// Payload did not decode.
    Malformed(MoveError),
    /// Position outside 0..=8.
    OutOfRange(i64),
    /// Cell already holds a mark.
    Occupied(usize),
}

/// Check an action against the current state.
///
/// Checks run in a fixed order: opcode, sender and turn, payload, position.
/// Returns the cell and mark to play.
pub fn validate_action(state: &MatchState, msg: &MatchData) -> Result<(usize, Mark), Discard> {
    if msg.opcode() != Some(OpCode::Move) {
        return Err(Discard::NotAMove);
    }

    let mark = state.mark_of(&msg.sender).ok_or(Discard::UnknownPlayer)?;
    if mark != state.current_turn {
        return Err(Discard::NotYourTurn);
    }

    let mv = Move::decode(&msg.data).map_err(Discard::Malformed)?;
    let cell = mv.cell().ok_or(Discard::OutOfRange(mv.position))?;
    if !state.board.is_empty_at(cell) {
        return Err(Discard::Occupied(cell));
    }

    Ok((cell, mark))
}

/// Run one tick.
///
/// Does nothing unless two players are seated and the game is live. Stops at
/// the action that ends the game; the rest of the batch is dropped.
pub fn tick(
    ctx: &MatchContext,
    dispatcher: &mut dyn Dispatcher,
    state: &mut MatchState,
    messages: Vec<MatchData>,
) -> TickResult {
    let mut result = TickResult::default();

    if state.game_over || state.players.len() < MAX_PLAYERS {
        return result;
    }

    let total = messages.len();
    for (index, msg) in messages.into_iter().enumerate() {
        let (cell, mark) = match validate_action(state, &msg) {
            Ok(action) => action,
            Err(Discard::Malformed(e)) => {
                warn!(match_id = %ctx.match_id, sender = %msg.sender, "{}", e);
                result.discarded += 1;
                continue;
            }
            Err(_) => {
                result.discarded += 1;
                continue;
            }
        };

        let ended = state.apply_move(cell, mark);
        result.applied += 1;

        let op_code = if ended { OpCode::GameOver } else { OpCode::Update };
        broadcast_state(ctx, dispatcher, op_code, state);

        if ended {
            result.match_ended = true;
            result.skipped = total - index - 1;
            if result.skipped > 0 {
                debug!(
                    match_id = %ctx.match_id,
                    skipped = result.skipped,
                    "Game ended mid-batch, dropping remaining actions"
                );
            }
            break;
        }
    }

    result
}
