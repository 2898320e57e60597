//! The write-behind journal the engine depends on for durability. Real
//! deployments back this with a document store; the engine only ever sees
//! this narrow trait, the same way the rest of this codebase keeps its
//! domain logic behind a handle rather than reaching into a concrete
//! transport or session layer.

use async_trait::async_trait;
use payloads::responses::{AuctionSnapshot, BidView};
use payloads::AuctionId;

#[derive(Debug, thiserror::Error)]
#[error("persistence write failed: {0}")]
pub struct PersistenceWriteError(pub String);

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Durably records a single accepted or undone bid.
    async fn write_bid(
        &self,
        auction_id: AuctionId,
        bid: BidView,
    ) -> Result<(), PersistenceWriteError>;

    /// Durably records the full auction state, used at resolution
    /// boundaries (sold/unsold/completed) so cold-start replay has a
    /// recent base to fast-forward from.
    async fn write_snapshot(
        &self,
        snapshot: AuctionSnapshot,
    ) -> Result<(), PersistenceWriteError>;
}

/// A sink that accepts every write instantly. Useful for tests and for
/// running the engine with no durability at all.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn write_bid(
        &self,
        _auction_id: AuctionId,
        _bid: BidView,
    ) -> Result<(), PersistenceWriteError> {
        Ok(())
    }

    async fn write_snapshot(
        &self,
        _snapshot: AuctionSnapshot,
    ) -> Result<(), PersistenceWriteError> {
        Ok(())
    }
}

/// An in-process sink that just keeps the latest writes in memory, useful
/// for integration tests that want to assert on what would have been
/// persisted without standing up a real store.
#[derive(Debug, Default)]
pub struct InMemorySink {
    bids: tokio::sync::Mutex<Vec<(AuctionId, BidView)>>,
    snapshots: tokio::sync::Mutex<Vec<AuctionSnapshot>>,
}

#[async_trait]
impl PersistenceSink for InMemorySink {
    async fn write_bid(
        &self,
        auction_id: AuctionId,
        bid: BidView,
    ) -> Result<(), PersistenceWriteError> {
        self.bids.lock().await.push((auction_id, bid));
        Ok(())
    }

    async fn write_snapshot(
        &self,
        snapshot: AuctionSnapshot,
    ) -> Result<(), PersistenceWriteError> {
        self.snapshots.lock().await.push(snapshot);
        Ok(())
    }
}

impl InMemorySink {
    pub async fn bid_count(&self) -> usize {
        self.bids.lock().await.len()
    }

    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.lock().await.len()
    }
}
