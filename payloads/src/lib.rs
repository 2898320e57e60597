pub mod requests;
pub mod responses;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id type wrappers help ensure we don't mix up ids for different entities.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
pub struct AuctionId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
pub struct PlayerId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
pub struct ManagerId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
pub struct BidId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
pub struct EventId(pub Uuid);

/// A category tag (e.g. "GK", "DEF", "MID", "ATT"). Kept as a plain string
/// rather than a closed enum so an auction's category order is configurable.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
pub struct Category(pub String);

impl Category {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    Draft,
    Ongoing,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerStatus {
    Available,
    Active,
    Sold,
    Unsold,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteValue {
    Like,
    Dislike,
}

/// Caller-visible error kinds (see the engine's error handling design).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error,
)]
pub enum ErrorKind {
    #[error("auction is not in the required state for this command")]
    WrongState,
    #[error("caller is not the auction's admin owner")]
    NotOwner,
    #[error("player is not the current active player")]
    NotActivePlayer,
    #[error("bidder already holds the high bid on this player")]
    SelfOutbid,
    #[error(
        "bid amount does not exceed the current price by the minimum increment"
    )]
    AmountTooLow,
    #[error("manager's available balance is insufficient for this bid")]
    InsufficientBalance,
    #[error("there is no valid bid to undo")]
    NothingToUndo,
    #[error("auction has no players to sell")]
    EmptyCatalog,
    #[error("command was cancelled before it was processed")]
    Cancelled,
    #[error("a durable write failed")]
    PersistenceError,
    #[error("unknown auction id")]
    UnknownAuction,
    #[error("unknown player id")]
    UnknownPlayer,
    #[error("unknown manager id")]
    UnknownManager,
}
