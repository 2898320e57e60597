//! Fan-out of totally-ordered engine events to every subscriber of an
//! auction. Backed by `tokio::sync::broadcast`, whose bounded ring buffer
//! already gives us the required semantics: a slow subscriber that falls
//! behind the buffer is told it lagged (`RecvError::Lagged`) and can resync
//! via a snapshot rather than stalling the sender.

use payloads::responses::{AuctionSnapshot, BroadcastEvent, BroadcastPayload};
use payloads::{AuctionId, EventId};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

pub struct Broadcaster {
    auction_id: AuctionId,
    tx: broadcast::Sender<BroadcastEvent>,
    next_seq: u64,
}

impl Broadcaster {
    pub fn new(auction_id: AuctionId) -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            auction_id,
            tx,
            next_seq: 1,
        }
    }

    /// Assigns the next sequence number and fans the event out. Returns the
    /// assigned sequence number even if there are currently no subscribers.
    pub fn emit(&mut self, time_source: &crate::time::TimeSource, payload: BroadcastPayload) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let event = BroadcastEvent {
            event_id: EventId(uuid::Uuid::new_v4()),
            auction_id: self.auction_id,
            seq,
            server_ts: time_source.now(),
            payload,
        };
        // No subscribers is not an error; the event is simply not observed.
        let _ = self.tx.send(event);
        seq
    }

    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    /// Subscribes to the live event stream. The caller is expected to pair
    /// this with `resync_event` to hand the new subscriber a catch-up frame
    /// out of band, rather than fanning a `Resync` event out to everyone.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    /// Builds a `Resync` frame carrying `snapshot`, addressed to a single new
    /// subscriber. Deliberately does not go through `tx`: every subscriber
    /// already connected would otherwise receive it too, burning a buffer
    /// slot and pushing them closer to the lag/disconnect threshold for an
    /// event that isn't theirs.
    pub fn resync_event(
        &self,
        time_source: &crate::time::TimeSource,
        snapshot: AuctionSnapshot,
    ) -> BroadcastEvent {
        BroadcastEvent {
            event_id: EventId(uuid::Uuid::new_v4()),
            auction_id: self.auction_id,
            seq: self.next_seq.saturating_sub(1),
            server_ts: time_source.now(),
            payload: BroadcastPayload::Resync { snapshot },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeSource;

    fn auction() -> AuctionId {
        AuctionId(uuid::Uuid::from_u128(1))
    }

    #[cfg(feature = "mock-time")]
    #[tokio::test]
    async fn events_are_observed_in_emitted_order() {
        let time_source = TimeSource::new(jiff::Timestamp::constant(0, 0));
        let mut broadcaster = Broadcaster::new(auction());
        let mut rx = broadcaster.subscribe();
        broadcaster.emit(&time_source, BroadcastPayload::AuctionStarted {
            cursor: payloads::responses::Cursor {
                category: payloads::Category::new("GK"),
                index: 0,
                player_id: None,
            },
        });
        broadcaster.emit(&time_source, BroadcastPayload::AuctionStopped);
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.seq < second.seq);
    }
}
