//! Authoritative per-manager balance projection. The sole writer of a
//! manager's balance; operations are invoked only from inside the owning
//! auction's serialized command flow (see `engine.rs`), so no internal
//! locking is needed here.

use std::collections::HashMap;

use payloads::{ManagerId, PlayerId};
use rust_decimal::Decimal;

use crate::errors::{EngineResult, insufficient_balance, unknown_manager};

#[derive(Debug, Clone)]
struct ManagerAccount {
    initial_balance: Decimal,
    spent: Decimal,
    /// At most one reservation per player this manager currently holds the
    /// high bid on.
    reservations: HashMap<PlayerId, Decimal>,
    won_players: Vec<PlayerId>,
}

impl ManagerAccount {
    fn reserved_total(&self) -> Decimal {
        self.reservations.values().copied().sum()
    }

    fn available(&self) -> Decimal {
        self.initial_balance - self.spent - self.reserved_total()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Ledger {
    accounts: HashMap<ManagerId, ManagerAccount>,
}

#[derive(Debug, Clone)]
pub struct ManagerProjection {
    pub manager_id: ManagerId,
    pub initial_balance: Decimal,
    pub spent: Decimal,
    pub reserved: Decimal,
    pub available: Decimal,
    pub won_players: Vec<PlayerId>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_account(&mut self, manager_id: ManagerId, initial_balance: Decimal) {
        self.accounts.insert(
            manager_id,
            ManagerAccount {
                initial_balance,
                spent: Decimal::ZERO,
                reservations: HashMap::new(),
                won_players: Vec::new(),
            },
        );
    }

    fn account(&self, manager_id: &ManagerId) -> EngineResult<&ManagerAccount> {
        self.accounts
            .get(manager_id)
            .ok_or_else(|| unknown_manager(format!("no such manager {manager_id}")))
    }

    fn account_mut(
        &mut self,
        manager_id: &ManagerId,
    ) -> EngineResult<&mut ManagerAccount> {
        self.accounts
            .get_mut(manager_id)
            .ok_or_else(|| unknown_manager(format!("no such manager {manager_id}")))
    }

    pub fn available_for(&self, manager_id: &ManagerId) -> EngineResult<Decimal> {
        Ok(self.account(manager_id)?.available())
    }

    pub fn reservation_on(
        &self,
        manager_id: &ManagerId,
        player_id: &PlayerId,
    ) -> EngineResult<Decimal> {
        Ok(self
            .account(manager_id)?
            .reservations
            .get(player_id)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    /// Replaces any existing reservation this manager holds on `player_id`
    /// with `amount`. Fails if the manager cannot cover the incremental
    /// amount out of their remaining available balance.
    pub fn reserve(
        &mut self,
        manager_id: &ManagerId,
        player_id: PlayerId,
        amount: Decimal,
    ) -> EngineResult<()> {
        let account = self.account_mut(manager_id)?;
        let existing = account
            .reservations
            .get(&player_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let delta = amount - existing;
        if delta > account.available() {
            return Err(insufficient_balance(format!(
                "manager {manager_id} has {} available, needs {delta} more",
                account.available()
            )));
        }
        account.reservations.insert(player_id, amount);
        Ok(())
    }

    pub fn release_reservation(
        &mut self,
        manager_id: &ManagerId,
        player_id: &PlayerId,
    ) -> EngineResult<()> {
        self.account_mut(manager_id)?.reservations.remove(player_id);
        Ok(())
    }

    /// Moves a manager's reservation on `player_id` to spent, recording the
    /// player as won. Used at resolution time.
    pub fn commit(
        &mut self,
        manager_id: &ManagerId,
        player_id: PlayerId,
        amount: Decimal,
    ) -> EngineResult<()> {
        let account = self.account_mut(manager_id)?;
        account.reservations.remove(&player_id);
        account.spent += amount;
        account.won_players.push(player_id);
        Ok(())
    }

    /// Reverses a previous `commit`, used when a durable write that was
    /// supposed to make a resolved sale final ultimately fails and the sale
    /// has to be unwound.
    pub fn revert_commit(&mut self, manager_id: &ManagerId, player_id: &PlayerId, amount: Decimal) {
        if let Some(account) = self.accounts.get_mut(manager_id) {
            account.spent -= amount;
            account.won_players.retain(|p| p != player_id);
        }
    }

    pub fn projection(&self, manager_id: &ManagerId) -> EngineResult<ManagerProjection> {
        let account = self.account(manager_id)?;
        Ok(ManagerProjection {
            manager_id: *manager_id,
            initial_balance: account.initial_balance,
            spent: account.spent,
            reserved: account.reserved_total(),
            available: account.available(),
            won_players: account.won_players.clone(),
        })
    }

    pub fn all_projections(&self) -> Vec<ManagerProjection> {
        self.accounts
            .keys()
            .map(|id| self.projection(id).expect("key came from accounts map"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn mgr(n: u128) -> ManagerId {
        ManagerId(uuid::Uuid::from_u128(n))
    }

    fn ply(n: u128) -> PlayerId {
        PlayerId(uuid::Uuid::from_u128(n))
    }

    #[test]
    fn reserve_then_commit_moves_balance_to_spent() {
        let mut ledger = Ledger::new();
        ledger.open_account(mgr(1), dec!(500));
        ledger.reserve(&mgr(1), ply(1), dec!(100)).unwrap();
        assert_eq!(ledger.available_for(&mgr(1)).unwrap(), dec!(400));
        ledger.commit(&mgr(1), ply(1), dec!(100)).unwrap();
        assert_eq!(ledger.available_for(&mgr(1)).unwrap(), dec!(400));
        let proj = ledger.projection(&mgr(1)).unwrap();
        assert_eq!(proj.spent, dec!(100));
        assert_eq!(proj.reserved, dec!(0));
        assert_eq!(proj.won_players, vec![ply(1)]);
    }

    #[test]
    fn reserve_rejects_when_insufficient() {
        let mut ledger = Ledger::new();
        ledger.open_account(mgr(1), dec!(100));
        ledger.reserve(&mgr(1), ply(1), dec!(60)).unwrap();
        // replacing the reservation with 120 needs 60 more, only 40 available
        let err = ledger.reserve(&mgr(1), ply(1), dec!(120)).unwrap_err();
        assert_eq!(err.kind, payloads::ErrorKind::InsufficientBalance);
    }

    #[test]
    fn release_frees_the_reservation() {
        let mut ledger = Ledger::new();
        ledger.open_account(mgr(1), dec!(500));
        ledger.reserve(&mgr(1), ply(1), dec!(100)).unwrap();
        ledger.release_reservation(&mgr(1), &ply(1)).unwrap();
        assert_eq!(ledger.available_for(&mgr(1)).unwrap(), dec!(500));
    }
}
