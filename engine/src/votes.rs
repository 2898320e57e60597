//! Per-player like/dislike tallies. Purely advisory: the engine never acts
//! on `skip_advised` itself, only surfaces it for the admin to see.

use std::collections::HashMap;

use payloads::{ManagerId, PlayerId, VoteValue};

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    likes: u32,
    dislikes: u32,
}

#[derive(Debug, Default, Clone)]
pub struct VoteTally {
    tallies: HashMap<PlayerId, Tally>,
    votes: HashMap<(PlayerId, ManagerId), VoteValue>,
}

#[derive(Debug, Clone, Copy)]
pub struct TallyView {
    pub likes: u32,
    pub dislikes: u32,
    /// The vote just recorded (from `record`) or the given voter's standing
    /// vote, if any (from `view`).
    pub self_value: Option<VoteValue>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` as `voter`'s vote on `player_id`, replacing any prior
    /// vote by the same voter. Returns the updated tally.
    pub fn record(
        &mut self,
        voter: ManagerId,
        player_id: PlayerId,
        value: VoteValue,
    ) -> TallyView {
        let tally = self.tallies.entry(player_id).or_default();
        if let Some(previous) = self.votes.get(&(player_id, voter)) {
            match previous {
                VoteValue::Like => tally.likes -= 1,
                VoteValue::Dislike => tally.dislikes -= 1,
            }
        }
        match value {
            VoteValue::Like => tally.likes += 1,
            VoteValue::Dislike => tally.dislikes += 1,
        }
        self.votes.insert((player_id, voter), value);
        TallyView {
            likes: tally.likes,
            dislikes: tally.dislikes,
            self_value: Some(value),
        }
    }

    /// The aggregate tally together with `voter`'s own standing vote, if any.
    pub fn view(&self, player_id: &PlayerId, voter: &ManagerId) -> TallyView {
        let tally = self.tallies.get(player_id).copied().unwrap_or_default();
        TallyView {
            likes: tally.likes,
            dislikes: tally.dislikes,
            self_value: self.votes.get(&(*player_id, *voter)).copied(),
        }
    }

    /// Raw aggregate likes/dislikes, with no particular voter's perspective.
    pub fn counts(&self, player_id: &PlayerId) -> (u32, u32) {
        let tally = self.tallies.get(player_id).copied().unwrap_or_default();
        (tally.likes, tally.dislikes)
    }

    /// `dislikes >= ceil(active_manager_count * dislike_fraction)`.
    pub fn skip_advised(
        &self,
        player_id: &PlayerId,
        active_manager_count: u32,
        dislike_fraction: f64,
    ) -> bool {
        let tally = self.tallies.get(player_id).copied().unwrap_or_default();
        let threshold =
            (active_manager_count as f64 * dislike_fraction).ceil() as u32;
        tally.dislikes >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voter(n: u128) -> ManagerId {
        ManagerId(uuid::Uuid::from_u128(n))
    }

    fn ply(n: u128) -> PlayerId {
        PlayerId(uuid::Uuid::from_u128(n))
    }

    #[test]
    fn revoting_replaces_not_accumulates() {
        let mut tally = VoteTally::new();
        let p = ply(1);
        tally.record(voter(1), p, VoteValue::Like);
        let view = tally.record(voter(1), p, VoteValue::Dislike);
        assert_eq!(view.likes, 0);
        assert_eq!(view.dislikes, 1);
    }

    #[test]
    fn skip_advised_uses_ceil_of_fraction() {
        let mut tally = VoteTally::new();
        let p = ply(1);
        tally.record(voter(1), p, VoteValue::Dislike);
        tally.record(voter(2), p, VoteValue::Dislike);
        // 5 active managers * 0.6 = 3, ceil -> 3; 2 dislikes isn't enough yet
        assert!(!tally.skip_advised(&p, 5, 0.6));
        tally.record(voter(3), p, VoteValue::Dislike);
        assert!(tally.skip_advised(&p, 5, 0.6));
    }
}
