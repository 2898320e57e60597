use crate::{
    AuctionId, AuctionStatus, BidId, Category, EventId, ManagerId, PlayerId,
    PlayerStatus, VoteValue,
};
use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerView {
    pub manager_id: ManagerId,
    pub initial_balance: Decimal,
    pub spent: Decimal,
    pub reserved: Decimal,
    pub available: Decimal,
    pub won_players: Vec<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    pub category: Category,
    pub index: usize,
    pub player_id: Option<PlayerId>,
}

/// Full read model for an auction, used both as the command-success payload
/// and to resync a reconnecting subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionSnapshot {
    pub auction_id: AuctionId,
    pub name: String,
    pub status: AuctionStatus,
    pub cursor: Cursor,
    pub players: Vec<PlayerView>,
    pub managers: Vec<ManagerView>,
    pub votes: Vec<VoteTallyView>,
    pub timer_remaining_ms: Option<u64>,
    pub last_event_seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidView {
    pub bid_id: BidId,
    pub player_id: PlayerId,
    pub bidder_id: ManagerId,
    pub amount: Decimal,
    pub previous_amount: Decimal,
    pub sequence: u32,
    pub timer_remaining_ms_at_placement: u64,
    pub valid: bool,
    pub placed_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteTallyView {
    pub player_id: PlayerId,
    pub likes: u32,
    pub dislikes: u32,
    pub skip_advised: bool,
    /// The calling voter's own recorded vote, if any. `None` on a snapshot
    /// taken without a specific voter's perspective (e.g. cold-start replay).
    pub self_value: Option<VoteValue>,
}

/// A single totally-ordered, per-auction broadcast event. `seq` is strictly
/// increasing within an auction and matches BidLog sequencing where the
/// event concerns a bid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub event_id: EventId,
    pub auction_id: AuctionId,
    pub seq: u64,
    pub server_ts: Timestamp,
    pub payload: BroadcastPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BroadcastPayload {
    /// Sent once to a subscriber immediately after it connects, before any
    /// live event, so it can catch up without a separate round trip.
    Resync {
        snapshot: AuctionSnapshot,
    },
    AuctionStarted {
        cursor: Cursor,
    },
    AuctionStopped,
    AuctionContinued,
    AuctionCompleted,
    CategoryCompleted {
        category: Category,
    },
    NextPlayer {
        player_id: PlayerId,
    },
    BidAccepted {
        bid: BidView,
    },
    BidRejected {
        player_id: PlayerId,
        reason: crate::ErrorKind,
    },
    BidUndone {
        player_id: PlayerId,
        invalidated_bid_id: BidId,
    },
    PlayerSold {
        player_id: PlayerId,
        winner: ManagerId,
        final_price: Decimal,
    },
    PlayerUnsold {
        player_id: PlayerId,
    },
    PlayerSkipped {
        player_id: PlayerId,
    },
    TimerTick {
        player_id: PlayerId,
        remaining_ms: u64,
    },
    VoteRecorded {
        player_id: PlayerId,
        tally: VoteTallyView,
    },
}

/// The outcome of a single command, mirroring the spec's
/// `{success, errorKind, message}` / snapshot contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandOutcome {
    Ok { snapshot: AuctionSnapshot },
    Err { error_kind: crate::ErrorKind, message: String },
}
