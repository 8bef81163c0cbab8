//! Match Handler Interface
//!
//! The contract between the runtime and a game. The runtime owns scheduling
//! and delivery; a [`Match`] implementation owns the rules.
//!
//! Every callback for one match runs on that match's session task, one at a
//! time, so implementations never need interior locking. State is a concrete
//! associated type passed by `&mut`; `terminate` takes it by value so nothing
//! can touch it afterwards.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::input::MatchData;
use crate::game::state::PlayerId;

/// Unique match identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub Uuid);

impl MatchId {
    /// Random id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a UUID string.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Parameters passed to match creation.
pub type MatchParams = BTreeMap<String, serde_json::Value>;

/// Per-callback context.
#[derive(Clone, Debug)]
pub struct MatchContext {
    /// Match being driven.
    pub match_id: MatchId,
    /// Ticks elapsed since the match started.
    pub tick: u64,
}

impl MatchContext {
    /// Context at tick 0.
    pub fn new(match_id: MatchId) -> Self {
        Self { match_id, tick: 0 }
    }
}

/// What `init` hands back to the runtime.
#[derive(Clone, Debug)]
pub struct MatchInit<S> {
    /// Initial state.
    pub state: S,
    /// Ticks per second.
    pub tick_rate: u32,
    /// Display label.
    pub label: String,
}

/// Admission decision for a join attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinDecision {
    /// Let the participant in.
    Accept,
    /// Turn them away, with a human-readable reason.
    Reject(String),
}

impl JoinDecision {
    /// Whether the join may proceed.
    pub fn is_accepted(&self) -> bool {
        matches!(self, JoinDecision::Accept)
    }
}

/// Outbound delivery to every participant of a match.
///
/// Fire-and-forget: implementations log delivery problems, they do not report
/// them back to the match.
pub trait Dispatcher {
    /// Send `data` tagged with `op_code` to all current presences.
    fn broadcast(&mut self, op_code: i64, data: Vec<u8>);
}

/// A game's lifecycle callbacks.
pub trait Match: Send + 'static {
    /// Authoritative state, exclusively owned by one session.
    type State: Send + 'static;

    /// Create the initial state, tick rate and label.
    fn init(&self, ctx: &MatchContext, params: &MatchParams) -> MatchInit<Self::State>;

    /// Decide whether `presence` may join. Must not change state.
    fn join_attempt(
        &self,
        ctx: &MatchContext,
        state: &Self::State,
        presence: &PlayerId,
        metadata: &BTreeMap<String, String>,
    ) -> JoinDecision;

    /// Admitted participants have joined.
    fn join(
        &self,
        ctx: &MatchContext,
        dispatcher: &mut dyn Dispatcher,
        state: &mut Self::State,
        presences: &[PlayerId],
    );

    /// Participants have left.
    fn leave(
        &self,
        ctx: &MatchContext,
        dispatcher: &mut dyn Dispatcher,
        state: &mut Self::State,
        presences: &[PlayerId],
    );

    /// One tick, with the actions queued since the last one in arrival order.
    fn tick(
        &self,
        ctx: &MatchContext,
        dispatcher: &mut dyn Dispatcher,
        state: &mut Self::State,
        messages: Vec<MatchData>,
    );

    /// Out-of-band request; the returned string goes back to the caller.
    fn signal(
        &self,
        ctx: &MatchContext,
        dispatcher: &mut dyn Dispatcher,
        state: &mut Self::State,
        data: String,
    ) -> String;

    /// The match is ending. Returns the final state.
    fn terminate(
        &self,
        ctx: &MatchContext,
        dispatcher: &mut dyn Dispatcher,
        state: Self::State,
        grace_seconds: u32,
    ) -> Self::State;
}

/// Dispatcher that records broadcasts instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    /// Everything broadcast so far, in order.
    pub messages: Vec<(i64, Vec<u8>)>,
}

impl RecordingDispatcher {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opcodes broadcast so far.
    pub fn op_codes(&self) -> Vec<i64> {
        self.messages.iter().map(|(op, _)| *op).collect()
    }

    /// Most recent broadcast.
    pub fn last(&self) -> Option<&(i64, Vec<u8>)> {
        self.messages.last()
    }

    /// Forget everything recorded.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Dispatcher for RecordingDispatcher {
    fn broadcast(&mut self, op_code: i64, data: Vec<u8>) {
        self.messages.push((op_code, data));
    }
}
