use crate::{AuctionId, Category, ManagerId, PlayerId, VoteValue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A player as given to the engine at auction creation time. The engine
/// assigns no identity of its own; callers supply one per player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSpec {
    pub player_id: PlayerId,
    pub display_name: String,
    pub category: Category,
    pub base_value: Decimal,
}

/// Per-auction tunables. Every field has a default matching the spec's
/// config table; omit a field in JSON to take the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
    pub initial_bid_ms: u64,
    pub anti_snipe_threshold_ms: u64,
    pub anti_snipe_extension_ms: u64,
    pub min_increment: Decimal,
    pub category_order: Vec<Category>,
    pub dislike_fraction: f64,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            initial_bid_ms: 30_000,
            anti_snipe_threshold_ms: 10_000,
            anti_snipe_extension_ms: 15_000,
            min_increment: Decimal::ONE,
            category_order: vec![
                Category::new("GK"),
                Category::new("DEF"),
                Category::new("MID"),
                Category::new("ATT"),
            ],
            dislike_fraction: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuction {
    pub name: String,
    pub admin_id: ManagerId,
    pub players: Vec<PlayerSpec>,
    pub managers: Vec<ManagerBudget>,
    #[serde(default)]
    pub config: AuctionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerBudget {
    pub manager_id: ManagerId,
    pub initial_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAuction {
    pub auction_id: AuctionId,
    pub admin_id: ManagerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopAuction {
    pub auction_id: AuctionId,
    pub admin_id: ManagerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueAuction {
    pub auction_id: AuctionId,
    pub admin_id: ManagerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalCall {
    pub auction_id: AuctionId,
    pub admin_id: ManagerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skip {
    pub auction_id: AuctionId,
    pub admin_id: ManagerId,
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Undo {
    pub auction_id: AuctionId,
    pub admin_id: ManagerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBid {
    pub auction_id: AuctionId,
    pub bidder_id: ManagerId,
    pub player_id: PlayerId,
    pub amount: Decimal,
    /// Supplied by the client so a retried request after a dropped response
    /// isn't charged twice.
    #[serde(default)]
    pub client_bid_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub auction_id: AuctionId,
    pub voter_id: ManagerId,
    pub player_id: PlayerId,
    pub value: VoteValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSnapshot {
    pub auction_id: AuctionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBidHistory {
    pub auction_id: AuctionId,
    pub player_id: PlayerId,
    /// If false, invalidated (undone) bids are omitted.
    #[serde(default)]
    pub include_invalid: bool,
}
