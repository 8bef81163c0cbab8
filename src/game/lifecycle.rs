//! Match Lifecycle
//!
//! Tic-tac-toe's implementation of the runtime [`Match`] contract: roster
//! management, forfeit on departure, and delegation of move handling to
//! [`tick`](crate::game::tick::tick).

use std::collections::BTreeMap;

use tracing::{debug, error, info};

use crate::game::input::{MatchData, OpCode};
use crate::game::state::{MatchState, PlayerId, MAX_PLAYERS};
use crate::game::tick::tick;
use crate::runtime::handler::{
    Dispatcher, JoinDecision, Match, MatchContext, MatchInit, MatchParams,
};
use crate::{MATCH_LABEL, TICK_RATE};

/// Reason given when a third participant tries to join.
pub const REJECT_FULL: &str = "Match is full";

/// Reason given when a participant already on the roster tries to join again.
pub const REJECT_ALREADY_JOINED: &str = "Already joined this match";

/// Reason given when someone tries to join a finished match.
pub const REJECT_GAME_OVER: &str = "Match is over";

/// Serialize `state` and broadcast it under `op_code`.
pub(crate) fn broadcast_state(
    ctx: &MatchContext,
    dispatcher: &mut dyn Dispatcher,
    op_code: OpCode,
    state: &MatchState,
) {
    match state.to_payload() {
        Ok(payload) => dispatcher.broadcast(op_code.code(), payload),
        Err(e) => error!(match_id = %ctx.match_id, "Failed to serialize match state: {}", e),
    }
}

/// The tic-tac-toe match handler. Stateless; all state lives in [`MatchState`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TicTacToeMatch;

impl Match for TicTacToeMatch {
    type State = MatchState;

    fn init(&self, ctx: &MatchContext, _params: &MatchParams) -> MatchInit<MatchState> {
        debug!(match_id = %ctx.match_id, "Match initialized");
        MatchInit {
            state: MatchState::new(),
            tick_rate: TICK_RATE,
            label: MATCH_LABEL.to_string(),
        }
    }

    fn join_attempt(
        &self,
        _ctx: &MatchContext,
        state: &MatchState,
        presence: &PlayerId,
        _metadata: &BTreeMap<String, String>,
    ) -> JoinDecision {
        if state.players.contains_key(presence) {
            return JoinDecision::Reject(REJECT_ALREADY_JOINED.to_string());
        }
        if state.game_over {
            return JoinDecision::Reject(REJECT_GAME_OVER.to_string());
        }
        if state.players.len() >= MAX_PLAYERS {
            return JoinDecision::Reject(REJECT_FULL.to_string());
        }
        JoinDecision::Accept
    }

    fn join(
        &self,
        ctx: &MatchContext,
        dispatcher: &mut dyn Dispatcher,
        state: &mut MatchState,
        presences: &[PlayerId],
    ) {
        for presence in presences {
            let mark = state.assign_mark(*presence);
            info!(match_id = %ctx.match_id, "Player {} joined as {}", presence, mark);
        }

        // Only announce once the match is full.
        if state.players.len() == MAX_PLAYERS {
            broadcast_state(ctx, dispatcher, OpCode::PlayerJoin, state);
            info!(match_id = %ctx.match_id, "Both players have joined, broadcasting initial state");
        }
    }

    fn leave(
        &self,
        ctx: &MatchContext,
        dispatcher: &mut dyn Dispatcher,
        state: &mut MatchState,
        presences: &[PlayerId],
    ) {
        let was_active = !state.game_over && state.players.len() == MAX_PLAYERS;

        let departed: Vec<PlayerId> = presences
            .iter()
            .filter(|p| state.players.contains_key(*p))
            .copied()
            .collect();

        for player in &departed {
            state.players.remove(player);
            info!(match_id = %ctx.match_id, "Player {} left the match", player);
        }

        // A player walked out of a live game: the one still seated wins.
        if was_active && state.players.len() == 1 {
            let remaining = state.players.values().next().copied();
            state.finish(remaining);
            broadcast_state(ctx, dispatcher, OpCode::GameOver, state);
            info!(match_id = %ctx.match_id, "A player left mid-game, declaring winner");
        }
    }

    fn tick(
        &self,
        ctx: &MatchContext,
        dispatcher: &mut dyn Dispatcher,
        state: &mut MatchState,
        messages: Vec<MatchData>,
    ) {
        let result = tick(ctx, dispatcher, state, messages);
        if result.match_ended {
            info!(match_id = %ctx.match_id, tick = ctx.tick, winner = ?state.winner, "Game over");
        }
    }

    fn signal(
        &self,
        _ctx: &MatchContext,
        _dispatcher: &mut dyn Dispatcher,
        _state: &mut MatchState,
        data: String,
    ) -> String {
        data
    }

    fn terminate(
        &self,
        ctx: &MatchContext,
        _dispatcher: &mut dyn Dispatcher,
        state: MatchState,
        grace_seconds: u32,
    ) -> MatchState {
        debug!(match_id = %ctx.match_id, grace_seconds, "Match terminating");
        state
    }
}
