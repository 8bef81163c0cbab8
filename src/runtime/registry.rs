//! Match Registry
//!
//! Named match types, the matchmaker matched hook, and the table of live
//! matches.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::runtime::handler::{Match, MatchId, MatchParams};
use crate::runtime::matchmaker::MatchmakerEntry;
use crate::runtime::session::{MatchHandle, MatchSession, SessionConfig};
use crate::runtime::RuntimeError;

/// Something that can create matches by module name.
pub trait MatchCreator {
    /// Create and start a match of type `module`.
    fn match_create(&self, module: &str, params: MatchParams) -> Result<MatchId, RuntimeError>;
}

type Spawner =
    Box<dyn Fn(MatchId, &MatchParams, SessionConfig) -> Result<MatchHandle, RuntimeError> + Send + Sync>;

type MatchmakerHook =
    Box<dyn Fn(&dyn MatchCreator, &[MatchmakerEntry]) -> Result<MatchId, RuntimeError> + Send + Sync>;

/// Listing entry for a live match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchSummary {
    /// Match id.
    pub id: MatchId,
    /// Match label.
    pub label: String,
    /// Presences currently in the match.
    pub size: usize,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Registry of match types and live matches.
pub struct MatchRegistry {
    config: SessionConfig,
    factories: BTreeMap<String, Spawner>,
    matchmaker_matched: Option<MatchmakerHook>,
    matches: RwLock<BTreeMap<MatchId, MatchHandle>>,
}

impl MatchRegistry {
    /// Empty registry; sessions it creates use `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            factories: BTreeMap::new(),
            matchmaker_matched: None,
            matches: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a match type under `name`. `factory` builds a fresh handler
    /// for each match.
    pub fn register_match<M, F>(&mut self, name: &str, factory: F) -> Result<(), RuntimeError>
    where
        M: Match,
        F: Fn() -> M + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(RuntimeError::DuplicateMatchModule(name.to_string()));
        }

        let spawner: Spawner = Box::new(move |id: MatchId, params: &MatchParams, config: SessionConfig| {
            MatchSession::spawn(factory(), id, params, config)
        });
        self.factories.insert(name.to_string(), spawner);
        info!("Registered match module '{}'", name);
        Ok(())
    }

    /// Register the hook that turns a matchmaker result into a match.
    pub fn register_matchmaker_matched<F>(&mut self, hook: F) -> Result<(), RuntimeError>
    where
        F: Fn(&dyn MatchCreator, &[MatchmakerEntry]) -> Result<MatchId, RuntimeError>
            + Send
            + Sync
            + 'static,
    {
        if self.matchmaker_matched.is_some() {
            return Err(RuntimeError::MatchmakerHookRegistered);
        }
        self.matchmaker_matched = Some(Box::new(hook));
        Ok(())
    }

    /// Run the matchmaker matched hook for one group of players.
    pub fn matchmaker_matched(&self, entries: &[MatchmakerEntry]) -> Result<MatchId, RuntimeError> {
        let hook = self.matchmaker_matched.as_ref().ok_or(RuntimeError::NoMatchmakerHook)?;
        hook(self, entries)
    }

    /// Whether a match type is registered.
    pub fn has_module(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Look up a live match.
    pub fn get(&self, id: &MatchId) -> Option<MatchHandle> {
        let matches = self.matches.read().unwrap_or_else(PoisonError::into_inner);
        matches.get(id).filter(|h| !h.is_closed()).cloned()
    }

    /// Live matches, oldest first.
    pub fn list(&self) -> Vec<MatchSummary> {
        let matches = self.matches.read().unwrap_or_else(PoisonError::into_inner);
        let mut summaries: Vec<MatchSummary> = matches
            .values()
            .filter(|h| !h.is_closed())
            .map(|h| MatchSummary {
                id: h.id(),
                label: h.label().to_string(),
                size: h.size(),
                created_at: h.created_at(),
            })
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    /// Matches in the table, ended or not.
    pub fn match_count(&self) -> usize {
        self.matches.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop handles of ended sessions. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut matches = self.matches.write().unwrap_or_else(PoisonError::into_inner);
        let before = matches.len();
        matches.retain(|_, h| !h.is_closed());
        let removed = before - matches.len();
        if removed > 0 {
            debug!("Removed {} ended matches", removed);
        }
        removed
    }

    /// Terminate every live match.
    pub async fn terminate_all(&self, grace_seconds: u32) {
        let handles: Vec<MatchHandle> = {
            let mut matches = self.matches.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *matches).into_values().collect()
        };

        for handle in handles {
            if let Err(e) = handle.terminate(grace_seconds).await {
                debug!("Terminate skipped: {}", e);
            }
        }
    }
}

impl MatchCreator for MatchRegistry {
    fn match_create(&self, module: &str, params: MatchParams) -> Result<MatchId, RuntimeError> {
        let spawner = self
            .factories
            .get(module)
            .ok_or_else(|| RuntimeError::MatchModuleNotFound(module.to_string()))?;

        let id = MatchId::new_v4();
        let handle = spawner(id, &params, self.config.clone()).map_err(|e| {
            warn!("Failed to create '{}' match: {}", module, e);
            e
        })?;

        self.matches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle);
        Ok(id)
    }
}

impl std::fmt::Debug for MatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchRegistry")
            .field("modules", &self.factories.keys().collect::<Vec<_>>())
            .field("matches", &self.match_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::lifecycle::TicTacToeMatch;
    use crate::game::state::PlayerId;
    use std::time::Duration;
    use uuid::Uuid;

    fn registry() -> MatchRegistry {
        let mut registry = MatchRegistry::new(SessionConfig::default());
        registry.register_match("tictactoe", || TicTacToeMatch).unwrap();
        registry
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let mut registry = registry();
        assert_eq!(
            registry.register_match("tictactoe", || TicTacToeMatch),
            Err(RuntimeError::DuplicateMatchModule("tictactoe".to_string()))
        );
        assert!(registry.has_module("tictactoe"));
    }

    #[test]
    fn test_unknown_module() {
        let registry = registry();
        assert_eq!(
            registry.match_create("chess", MatchParams::new()),
            Err(RuntimeError::MatchModuleNotFound("chess".to_string()))
        );
    }

    #[test]
    fn test_create_outside_runtime_fails_without_registering() {
        let registry = registry();
        assert_eq!(
            registry.match_create("tictactoe", MatchParams::new()),
            Err(RuntimeError::NoRuntime)
        );
        assert_eq!(registry.match_count(), 0);
    }

    #[test]
    fn test_hook_missing_and_duplicate() {
        let mut registry = registry();
        assert_eq!(registry.matchmaker_matched(&[]), Err(RuntimeError::NoMatchmakerHook));

        registry
            .register_matchmaker_matched(|creator, _| creator.match_create("tictactoe", MatchParams::new()))
            .unwrap();
        assert_eq!(
            registry.register_matchmaker_matched(|_, _| Err(RuntimeError::NoRuntime)),
            Err(RuntimeError::MatchmakerHookRegistered)
        );
    }

    #[tokio::test]
    async fn test_create_get_list() {
        let registry = registry();
        let id = registry.match_create("tictactoe", MatchParams::new()).unwrap();

        let handle = registry.get(&id).unwrap();
        assert_eq!(handle.id(), id);
        assert!(registry.get(&MatchId(Uuid::new_v4())).is_none());

        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].label, "TicTacToe_Match");
        assert_eq!(list[0].size, 0);
    }

    #[tokio::test]
    async fn test_cleanup_drops_ended_matches() {
        let registry = registry();
        let id = registry.match_create("tictactoe", MatchParams::new()).unwrap();
        let handle = registry.get(&id).unwrap();
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        handle.join(PlayerId(Uuid::from_u128(1)), BTreeMap::new(), tx).await.unwrap();
        handle.leave(PlayerId(Uuid::from_u128(1))).await.unwrap();

        tokio::time::timeout(Duration::from_secs(3), async {
            while !handle.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(registry.get(&id).is_none());
        assert_eq!(registry.cleanup(), 1);
        assert_eq!(registry.match_count(), 0);
    }

    #[tokio::test]
    async fn test_terminate_all() {
        let registry = registry();
        let id = registry.match_create("tictactoe", MatchParams::new()).unwrap();
        let handle = registry.get(&id).unwrap();

        registry.terminate_all(0).await;
        assert_eq!(registry.match_count(), 0);

        tokio::time::timeout(Duration::from_secs(3), async {
            while !handle.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
