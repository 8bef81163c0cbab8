//! Matchmaker
//!
//! First-come first-served pairing. Players hold a ticket while queued; every
//! pass takes the two oldest tickets and hands them on as one match.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::game::state::{PlayerId, MAX_PLAYERS};

/// A queued player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchmakerEntry {
    /// Who is waiting.
    pub player_id: PlayerId,
    /// Ticket handed back to the client; used to cancel.
    pub ticket: Uuid,
}

#[derive(Debug)]
struct Queued {
    entry: MatchmakerEntry,
    queued_at: Instant,
}

/// Matchmaking queue.
#[derive(Debug, Default)]
pub struct Matchmaker {
    queue: VecDeque<Queued>,
}

impl Matchmaker {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a player. A player already in the queue keeps their ticket.
    pub fn add(&mut self, player_id: PlayerId) -> Uuid {
        if let Some(queued) = self.queue.iter().find(|q| q.entry.player_id == player_id) {
            return queued.entry.ticket;
        }

        let ticket = Uuid::new_v4();
        self.queue.push_back(Queued {
            entry: MatchmakerEntry { player_id, ticket },
            queued_at: Instant::now(),
        });
        ticket
    }

    /// Cancel a ticket. Returns the entry if it was queued.
    pub fn remove(&mut self, ticket: Uuid) -> Option<MatchmakerEntry> {
        let index = self.queue.iter().position(|q| q.entry.ticket == ticket)?;
        self.queue.remove(index).map(|q| q.entry)
    }

    /// Drop whatever ticket `player_id` holds.
    pub fn remove_player(&mut self, player_id: &PlayerId) -> Option<MatchmakerEntry> {
        let index = self.queue.iter().position(|q| &q.entry.player_id == player_id)?;
        self.queue.remove(index).map(|q| q.entry)
    }

    /// Whether `player_id` is waiting.
    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.ticket_of(player_id).is_some()
    }

    /// Ticket held by `player_id`, if queued.
    pub fn ticket_of(&self, player_id: &PlayerId) -> Option<Uuid> {
        self.queue
            .iter()
            .find(|q| &q.entry.player_id == player_id)
            .map(|q| q.entry.ticket)
    }

    /// Pair off as many full groups as are waiting, oldest first.
    pub fn take_matches(&mut self) -> Vec<Vec<MatchmakerEntry>> {
        let mut matches = Vec::new();
        while self.queue.len() >= MAX_PLAYERS {
            let group = self.queue.drain(..MAX_PLAYERS).map(|q| q.entry).collect();
            matches.push(group);
        }
        matches
    }

    /// Remove and return tickets older than `max_wait`.
    pub fn expire(&mut self, max_wait: Duration) -> Vec<MatchmakerEntry> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.queue.retain(|q| {
            if now.duration_since(q.queued_at) > max_wait {
                expired.push(q.entry.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    /// Tickets waiting.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(n: u128) -> PlayerId {
        PlayerId(Uuid::from_u128(n))
    }

    #[test]
    fn test_add_is_idempotent_per_player() {
        let mut mm = Matchmaker::new();
        let t1 = mm.add(player(1));
        let t2 = mm.add(player(1));
        assert_eq!(t1, t2);
        assert_eq!(mm.len(), 1);
        assert!(mm.contains(&player(1)));
        assert_eq!(mm.ticket_of(&player(1)), Some(t1));
        assert_eq!(mm.ticket_of(&player(2)), None);
    }

    #[test]
    fn test_pairs_oldest_first() {
        let mut mm = Matchmaker::new();
        mm.add(player(1));
        mm.add(player(2));
        mm.add(player(3));

        let matches = mm.take_matches();
        assert_eq!(matches.len(), 1);
        let ids: Vec<_> = matches[0].iter().map(|e| e.player_id).collect();
        assert_eq!(ids, vec![player(1), player(2)]);
        assert_eq!(mm.len(), 1);
        assert!(mm.contains(&player(3)));
    }

    #[test]
    fn test_single_player_waits() {
        let mut mm = Matchmaker::new();
        mm.add(player(1));
        assert!(mm.take_matches().is_empty());
        assert_eq!(mm.len(), 1);
    }

    #[test]
    fn test_remove_by_ticket_and_player() {
        let mut mm = Matchmaker::new();
        let t1 = mm.add(player(1));
        mm.add(player(2));

        assert_eq!(mm.remove(t1).map(|e| e.player_id), Some(player(1)));
        assert!(mm.remove(t1).is_none());
        assert!(mm.remove(Uuid::new_v4()).is_none());

        assert!(mm.remove_player(&player(2)).is_some());
        assert!(mm.is_empty());
    }

    #[test]
    fn test_expire() {
        let mut mm = Matchmaker::new();
        mm.add(player(1));
        let fresh = mm.add(player(2));
        assert!(mm.expire(Duration::from_secs(60)).is_empty());

        mm.queue[0].queued_at = Instant::now() - Duration::from_secs(300);
        let expired = mm.expire(Duration::from_secs(60));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].player_id, player(1));
        assert_eq!(mm.len(), 1);
        assert_eq!(mm.ticket_of(&player(2)), Some(fresh));
    }
}
