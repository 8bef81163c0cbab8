//! Match State Definitions
//!
//! The authoritative record of one match. Uses BTreeMap for the roster so
//! serialization order is stable across broadcasts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::game::board::{check_outcome, Board, Mark, Outcome};

/// Maximum players in a match.
pub const MAX_PLAYERS: usize = 2;

/// Namespace for deriving user ids from device ids.
const DEVICE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_5a3e_9c2b_4e70_8a41_2d7c_b3e9_f015);

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique participant identifier.
///
/// Serializes as the hyphenated UUID string, so it can key a JSON object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Random id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable id for a device. The same device always maps to the same player.
    pub fn from_device_id(device_id: &str) -> Self {
        Self(Uuid::new_v5(&DEVICE_NAMESPACE, device_id.as_bytes()))
    }

    /// Parse from a UUID string.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// =============================================================================
// MATCH PHASE
// =============================================================================

/// Derived lifecycle phase of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPhase {
    /// Fewer than two players have joined.
    Forming,
    /// Two players, game in progress.
    Active,
    /// Game over.
    Finished,
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Complete state of a match.
///
/// This is exactly what gets broadcast to participants:
///
/// ```json
/// {"board":["X","","","","","","","",""],"currentTurn":"O","winner":"","gameOver":false,
///  "players":{"<uuid>":"X","<uuid>":"O"}}
/// ```
///
/// `winner` is `""` both during play and after a draw; check `gameOver`
/// (or use [`MatchState::outcome`]) before reading anything into it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    /// The board.
    pub board: Board,

    /// Mark to move next. Frozen once the game is over.
    pub current_turn: Mark,

    /// Winning mark, if any.
    #[serde(with = "mark_or_empty")]
    pub winner: Option<Mark>,

    /// Set once, never cleared.
    pub game_over: bool,

    /// Roster: participant -> assigned mark.
    pub players: BTreeMap<PlayerId, Mark>,
}

impl MatchState {
    /// Fresh match: empty board, X to move, nobody joined.
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            current_turn: Mark::X,
            winner: None,
            game_over: false,
            players: BTreeMap::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        if self.game_over {
            MatchPhase::Finished
        } else if self.players.len() >= MAX_PLAYERS {
            MatchPhase::Active
        } else {
            MatchPhase::Forming
        }
    }

    /// Whether the roster has room.
    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    /// Mark assigned to `player`.
    pub fn mark_of(&self, player: &PlayerId) -> Option<Mark> {
        self.players.get(player).copied()
    }

    /// Add a player. Gets X unless someone already holds it, else O.
    pub fn assign_mark(&mut self, player: PlayerId) -> Mark {
        let x_taken = self.players.values().any(|&m| m == Mark::X);
        let mark = if x_taken { Mark::O } else { Mark::X };
        self.players.insert(player, mark);
        mark
    }

    /// Place the current player's mark and resolve the result.
    ///
    /// Caller has already checked the position is legal. Returns `true` if this
    /// move ended the game.
    pub(crate) fn apply_move(&mut self, position: usize, mark: Mark) -> bool {
        if !self.board.place(position, mark) {
            return false;
        }

        let (winner, is_draw) = check_outcome(&self.board);
        if winner.is_some() || is_draw {
            self.finish(winner);
        } else {
            self.current_turn = self.current_turn.other();
        }
        self.game_over
    }

    /// End the game. No-op if already over.
    pub(crate) fn finish(&mut self, winner: Option<Mark>) {
        if self.game_over {
            return;
        }
        self.game_over = true;
        self.winner = winner;
    }

    /// Typed terminal result. `None` while the game is still running.
    pub fn outcome(&self) -> Option<Outcome> {
        if !self.game_over {
            return None;
        }
        Some(match self.winner {
            Some(mark) => Outcome::Win(mark),
            None => Outcome::Draw,
        })
    }

    /// Serialize to the broadcast payload.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a broadcast payload.
    pub fn from_payload(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}

/// `Option<Mark>` as `"X"` / `"O"` / `""`.
mod mark_or_empty {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<Mark>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.map(Mark::as_str).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Mark>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Mark::parse_cell(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(n: u128) -> PlayerId {
        PlayerId(Uuid::from_u128(n))
    }

    #[test]
    fn test_initial_state() {
        let state = MatchState::new();
        assert_eq!(state.board, Board::new());
        assert_eq!(state.current_turn, Mark::X);
        assert_eq!(state.winner, None);
        assert!(!state.game_over);
        assert!(state.players.is_empty());
        assert_eq!(state.phase(), MatchPhase::Forming);
    }

    #[test]
    fn test_assign_marks_in_join_order() {
        let mut state = MatchState::new();
        // Higher uuid first, to show ordering comes from arrival not key order.
        assert_eq!(state.assign_mark(player(9)), Mark::X);
        assert_eq!(state.assign_mark(player(1)), Mark::O);
        assert_eq!(state.mark_of(&player(9)), Some(Mark::X));
        assert_eq!(state.mark_of(&player(1)), Some(Mark::O));
        assert_eq!(state.phase(), MatchPhase::Active);
    }

    #[test]
    fn test_assign_mark_fills_the_free_mark() {
        let mut state = MatchState::new();
        state.assign_mark(player(1));
        state.assign_mark(player(2));
        state.players.remove(&player(1));

        // X left; the newcomer takes X, not a second O.
        assert_eq!(state.assign_mark(player(3)), Mark::X);
        assert_eq!(state.mark_of(&player(2)), Some(Mark::O));
    }

    #[test]
    fn test_apply_move_flips_turn() {
        let mut state = MatchState::new();
        assert!(!state.apply_move(4, Mark::X));
        assert_eq!(state.board.get(4), Some(Mark::X));
        assert_eq!(state.current_turn, Mark::O);
    }

    #[test]
    fn test_winning_move_freezes_turn() {
        let mut state = MatchState::new();
        state.apply_move(0, Mark::X);
        state.apply_move(3, Mark::O);
        state.apply_move(1, Mark::X);
        state.apply_move(4, Mark::O);
        assert!(state.apply_move(2, Mark::X));
        assert!(state.game_over);
        assert_eq!(state.winner, Some(Mark::X));
        assert_eq!(state.current_turn, Mark::X);
        assert_eq!(state.outcome(), Some(Outcome::Win(Mark::X)));
        assert_eq!(state.phase(), MatchPhase::Finished);
    }

    #[test]
    fn test_finish_is_monotonic() {
        let mut state = MatchState::new();
        state.finish(Some(Mark::O));
        state.finish(None);
        assert!(state.game_over);
        assert_eq!(state.winner, Some(Mark::O));
    }

    #[test]
    fn test_draw_outcome_distinct_from_in_progress() {
        let mut state = MatchState::new();
        assert_eq!(state.outcome(), None);
        state.finish(None);
        assert_eq!(state.winner, None);
        assert_eq!(state.outcome(), Some(Outcome::Draw));
    }

    #[test]
    fn test_wire_format() {
        let mut state = MatchState::new();
        let p1 = player(1);
        state.assign_mark(p1);
        state.apply_move(0, Mark::X);

        let value: serde_json::Value = serde_json::from_slice(&state.to_payload().unwrap()).unwrap();
        assert_eq!(value["board"][0], "X");
        assert_eq!(value["board"][1], "");
        assert_eq!(value["board"].as_array().unwrap().len(), 9);
        assert_eq!(value["currentTurn"], "O");
        assert_eq!(value["winner"], "");
        assert_eq!(value["gameOver"], false);
        assert_eq!(value["players"][p1.to_string()], "X");
    }

    #[test]
    fn test_payload_roundtrip() {
        let mut state = MatchState::new();
        state.assign_mark(player(1));
        state.assign_mark(player(2));
        state.finish(Some(Mark::O));

        let parsed = MatchState::from_payload(&state.to_payload().unwrap()).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_device_id_is_stable() {
        let a = PlayerId::from_device_id("device-abc-123");
        let b = PlayerId::from_device_id("device-abc-123");
        let c = PlayerId::from_device_id("device-xyz-789");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(PlayerId::parse(&a.to_string()), Some(a));
    }
}
