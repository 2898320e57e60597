//! Players, categories, and base values. Read-mostly: the engine mutates a
//! player's live fields (status, current bid, high bidder) directly on the
//! entries held here as the session progresses.

use std::collections::HashMap;

use payloads::requests::PlayerSpec;
use payloads::{Category, ManagerId, PlayerId, PlayerStatus};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct Player {
    pub player_id: PlayerId,
    pub display_name: String,
    pub category: Category,
    pub base_value: Decimal,
    pub status: PlayerStatus,
    pub current_bid: Decimal,
    pub current_high_bidder: Option<ManagerId>,
    pub total_bids: u32,
    pub final_price: Option<Decimal>,
    pub final_winner: Option<ManagerId>,
}

impl Player {
    fn from_spec(spec: PlayerSpec) -> Self {
        Self {
            player_id: spec.player_id,
            display_name: spec.display_name,
            category: spec.category,
            base_value: spec.base_value,
            status: PlayerStatus::Available,
            current_bid: Decimal::ZERO,
            current_high_bidder: None,
            total_bids: 0,
            final_price: None,
            final_winner: None,
        }
    }
}

/// Catalog::cursor() walks `category_order`, and within each category the
/// order players were supplied in, to determine which player comes next.
#[derive(Debug, Clone)]
pub struct Catalog {
    category_order: Vec<Category>,
    /// player ids grouped by category, in catalog order
    queues: HashMap<Category, Vec<PlayerId>>,
    players: HashMap<PlayerId, Player>,
}

impl Catalog {
    pub fn new(category_order: Vec<Category>, specs: Vec<PlayerSpec>) -> Self {
        let mut queues: HashMap<Category, Vec<PlayerId>> = HashMap::new();
        let mut players = HashMap::new();
        for spec in specs {
            queues.entry(spec.category.clone()).or_default().push(spec.player_id);
            players.insert(spec.player_id, Player::from_spec(spec));
        }
        Self {
            category_order,
            queues,
            players,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn all_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// The player id at (category_index, player_index), if any.
    pub fn player_at(&self, category_index: usize, player_index: usize) -> Option<PlayerId> {
        let category = self.category_order.get(category_index)?;
        self.queues.get(category)?.get(player_index).copied()
    }

    pub fn category_len(&self, category_index: usize) -> usize {
        self.category_order
            .get(category_index)
            .and_then(|c| self.queues.get(c))
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn category_at(&self, category_index: usize) -> Option<&Category> {
        self.category_order.get(category_index)
    }

    pub fn category_count(&self) -> usize {
        self.category_order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: u128, category: &str) -> PlayerSpec {
        PlayerSpec {
            player_id: PlayerId(uuid::Uuid::from_u128(id)),
            display_name: format!("player-{id}"),
            category: Category::new(category),
            base_value: Decimal::ONE,
        }
    }

    #[test]
    fn player_at_walks_category_order_then_queue_order() {
        let catalog = Catalog::new(
            vec![Category::new("GK"), Category::new("DEF")],
            vec![spec(1, "GK"), spec(2, "DEF"), spec(3, "DEF")],
        );
        assert_eq!(catalog.player_at(0, 0), Some(PlayerId(uuid::Uuid::from_u128(1))));
        assert_eq!(catalog.player_at(1, 0), Some(PlayerId(uuid::Uuid::from_u128(2))));
        assert_eq!(catalog.player_at(1, 1), Some(PlayerId(uuid::Uuid::from_u128(3))));
        assert_eq!(catalog.player_at(1, 2), None);
        assert_eq!(catalog.category_len(1), 2);
    }
}
