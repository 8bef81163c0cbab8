//! Module Registration
//!
//! Wires tic-tac-toe into a [`MatchRegistry`]: the match type and the hook
//! that turns a matchmaker pairing into a match.

use tracing::{error, info};

use crate::game::lifecycle::TicTacToeMatch;
use crate::runtime::{MatchCreator, MatchId, MatchParams, MatchRegistry, MatchmakerEntry, RuntimeError};
use crate::MATCH_MODULE;

/// Register the tic-tac-toe match type and the matchmaker matched hook.
pub fn init_module(registry: &mut MatchRegistry) -> Result<(), RuntimeError> {
    registry.register_match(MATCH_MODULE, || TicTacToeMatch)?;
    registry.register_matchmaker_matched(matchmaker_matched)?;
    info!("Tic-tac-toe module loaded");
    Ok(())
}

/// Create one match for a group of matched players and return its id.
///
/// Players join it themselves once they receive the id. Creation errors are
/// returned as-is.
pub fn matchmaker_matched(
    creator: &dyn MatchCreator,
    entries: &[MatchmakerEntry],
) -> Result<MatchId, RuntimeError> {
    let match_id = creator.match_create(MATCH_MODULE, MatchParams::new()).map_err(|e| {
        error!("Error creating match: {}", e);
        e
    })?;

    info!(match_id = %match_id, players = entries.len(), "Created match from matchmaker");
    Ok(match_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PlayerId;
    use crate::runtime::SessionConfig;
    use std::cell::RefCell;
    use uuid::Uuid;

    /// Records create calls and answers with a fixed result.
    struct StubCreator {
        result: Result<MatchId, RuntimeError>,
        calls: RefCell<Vec<String>>,
    }

    impl MatchCreator for StubCreator {
        fn match_create(&self, module: &str, _params: MatchParams) -> Result<MatchId, RuntimeError> {
            self.calls.borrow_mut().push(module.to_string());
            self.result.clone()
        }
    }

    fn entries() -> Vec<MatchmakerEntry> {
        (1..=2)
            .map(|n| MatchmakerEntry {
                player_id: PlayerId(Uuid::from_u128(n)),
                ticket: Uuid::from_u128(n + 100),
            })
            .collect()
    }

    #[test]
    fn test_matched_creates_one_tictactoe_match() {
        let id = MatchId(Uuid::from_u128(7));
        let creator = StubCreator { result: Ok(id), calls: RefCell::new(Vec::new()) };

        assert_eq!(matchmaker_matched(&creator, &entries()), Ok(id));
        assert_eq!(*creator.calls.borrow(), vec!["tictactoe".to_string()]);
    }

    #[test]
    fn test_matched_propagates_creation_failure() {
        let failure = RuntimeError::MatchModuleNotFound("tictactoe".to_string());
        let creator = StubCreator { result: Err(failure.clone()), calls: RefCell::new(Vec::new()) };

        assert_eq!(matchmaker_matched(&creator, &entries()), Err(failure));
        assert_eq!(creator.calls.borrow().len(), 1);
    }

    #[test]
    fn test_init_module_registers_once() {
        let mut registry = MatchRegistry::new(SessionConfig::default());
        init_module(&mut registry).unwrap();
        assert!(registry.has_module("tictactoe"));
        assert_eq!(
            init_module(&mut registry),
            Err(RuntimeError::DuplicateMatchModule("tictactoe".to_string()))
        );
    }

    #[tokio::test]
    async fn test_registered_hook_creates_live_match() {
        let mut registry = MatchRegistry::new(SessionConfig::default());
        init_module(&mut registry).unwrap();

        let id = registry.matchmaker_matched(&entries()).unwrap();
        let handle = registry.get(&id).unwrap();
        assert_eq!(handle.label(), "TicTacToe_Match");
        assert_eq!(handle.tick_rate(), 5);
    }
}
