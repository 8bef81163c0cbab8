//! Match Runtime
//!
//! Hosts matches in-process: registers match types, spawns one session task
//! per match, pairs players, and routes broadcasts to connected presences.
//! This layer is the scheduler the game logic assumes; the rules live in `game/`.

pub mod handler;
pub mod matchmaker;
pub mod registry;
pub mod session;

pub use handler::{
    Dispatcher, JoinDecision, Match, MatchContext, MatchId, MatchInit, MatchParams,
    RecordingDispatcher,
};
pub use matchmaker::{Matchmaker, MatchmakerEntry};
pub use registry::{MatchCreator, MatchRegistry, MatchSummary};
pub use session::{MatchHandle, MatchSession, SessionConfig};

/// Runtime errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// A match type with this name is already registered.
    #[error("Match module already registered: {0}")]
    DuplicateMatchModule(String),

    /// No match type with this name is registered.
    #[error("Match module not found: {0}")]
    MatchModuleNotFound(String),

    /// A matchmaker matched hook is already registered.
    #[error("Matchmaker matched hook already registered")]
    MatchmakerHookRegistered,

    /// Nothing registered to turn matchmaker results into matches.
    #[error("No matchmaker matched hook registered")]
    NoMatchmakerHook,

    /// No live match with this id.
    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    /// The match session has ended.
    #[error("Match closed: {0}")]
    MatchClosed(MatchId),

    /// The match refused the join.
    #[error("Join rejected: {0}")]
    JoinRejected(String),

    /// Match creation attempted outside a tokio runtime.
    #[error("No async runtime available to host the match")]
    NoRuntime,
}
