//! Append-only per-player bid history. Sequence numbers are assigned dense
//! and monotonic within a player; `invalidate` flips a flag rather than
//! renumbering, so history queries stay stable after an undo.

use std::collections::HashMap;

use payloads::{BidId, ManagerId, PlayerId};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct Bid {
    pub bid_id: BidId,
    pub player_id: PlayerId,
    pub bidder_id: ManagerId,
    pub amount: Decimal,
    pub previous_amount: Decimal,
    pub sequence: u32,
    pub timer_remaining_ms_at_placement: u64,
    pub valid: bool,
    pub placed_at: jiff::Timestamp,
}

#[derive(Debug, Default, Clone)]
pub struct BidLog {
    by_player: HashMap<PlayerId, Vec<Bid>>,
}

impl BidLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        player_id: PlayerId,
        bidder_id: ManagerId,
        amount: Decimal,
        previous_amount: Decimal,
        timer_remaining_ms_at_placement: u64,
        placed_at: jiff::Timestamp,
    ) -> Bid {
        let entries = self.by_player.entry(player_id).or_default();
        let sequence = entries.len() as u32 + 1;
        let bid = Bid {
            bid_id: BidId(uuid::Uuid::new_v4()),
            player_id,
            bidder_id,
            amount,
            previous_amount,
            sequence,
            timer_remaining_ms_at_placement,
            valid: true,
            placed_at,
        };
        entries.push(bid.clone());
        bid
    }

    /// Invalidates the most recent valid bid on `player_id`, returning it.
    pub fn invalidate_latest_valid(&mut self, player_id: &PlayerId) -> Option<Bid> {
        let entries = self.by_player.get_mut(player_id)?;
        let latest = entries.iter_mut().rev().find(|b| b.valid)?;
        latest.valid = false;
        Some(latest.clone())
    }

    pub fn current_top(&self, player_id: &PlayerId) -> Option<&Bid> {
        self.by_player
            .get(player_id)?
            .iter()
            .filter(|b| b.valid)
            .max_by_key(|b| b.amount)
    }

    pub fn history(&self, player_id: &PlayerId) -> Vec<Bid> {
        self.by_player.get(player_id).cloned().unwrap_or_default()
    }

    pub fn valid_history(&self, player_id: &PlayerId) -> Vec<Bid> {
        self.by_player
            .get(player_id)
            .map(|bids| bids.iter().filter(|b| b.valid).cloned().collect())
            .unwrap_or_default()
    }

    pub fn valid_count(&self, player_id: &PlayerId) -> usize {
        self.by_player
            .get(player_id)
            .map(|bids| bids.iter().filter(|b| b.valid).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bidder(n: u128) -> ManagerId {
        ManagerId(uuid::Uuid::from_u128(n))
    }

    fn ply(n: u128) -> PlayerId {
        PlayerId(uuid::Uuid::from_u128(n))
    }

    fn now() -> jiff::Timestamp {
        jiff::Timestamp::constant(0, 0)
    }

    #[test]
    fn sequence_numbers_are_dense_and_monotonic() {
        let mut log = BidLog::new();
        let p = ply(1);
        log.append(p, bidder(1), dec!(100), dec!(0), 30_000, now());
        log.append(p, bidder(2), dec!(105), dec!(100), 29_000, now());
        let history = log.history(&p);
        assert_eq!(history[0].sequence, 1);
        assert_eq!(history[1].sequence, 2);
    }

    #[test]
    fn invalidate_latest_then_current_top_falls_back() {
        let mut log = BidLog::new();
        let p = ply(1);
        log.append(p, bidder(1), dec!(100), dec!(0), 30_000, now());
        log.append(p, bidder(2), dec!(105), dec!(100), 29_000, now());
        let invalidated = log.invalidate_latest_valid(&p).unwrap();
        assert_eq!(invalidated.bidder_id, bidder(2));
        let top = log.current_top(&p).unwrap();
        assert_eq!(top.bidder_id, bidder(1));
        assert_eq!(log.valid_count(&p), 1);
    }
}
