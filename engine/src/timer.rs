//! A single logical countdown timer bound to an auction's current active
//! player. Scheduling is monotonic-clock based (`tokio::time`), independent
//! of the wall-clock `TimeSource` used for event timestamps. Every
//! arm/extend/cancel bumps a generation counter; a fired timer carries the
//! generation it was armed with, and the engine drops any fire whose
//! generation doesn't match the timer's current one.

use std::time::Duration;

use payloads::PlayerId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct TimerFired {
    pub player_id: PlayerId,
    pub tick: u64,
}

pub struct Timer {
    fired_tx: mpsc::UnboundedSender<TimerFired>,
    generation: u64,
    handle: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
    frozen_remaining_ms: Option<u64>,
    current_player: Option<PlayerId>,
}

impl Timer {
    pub fn new(fired_tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            fired_tx,
            generation: 0,
            handle: None,
            deadline: None,
            frozen_remaining_ms: None,
            current_player: None,
        }
    }

    fn abort_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Starts a fresh countdown of `ms` for `player_id`, discarding whatever
    /// was previously armed.
    pub fn arm(&mut self, player_id: PlayerId, ms: u64) {
        self.abort_handle();
        self.generation += 1;
        let tick = self.generation;
        self.current_player = Some(player_id);
        self.frozen_remaining_ms = None;
        let deadline = Instant::now() + Duration::from_millis(ms);
        self.deadline = Some(deadline);
        let tx = self.fired_tx.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(TimerFired { player_id, tick });
        }));
    }

    /// Sets remaining time to `max(remaining, ms)`. A no-op extension still
    /// re-arms so the generation advances and any stale pending fire is
    /// superseded.
    pub fn extend(&mut self, ms: u64) {
        let Some(player_id) = self.current_player else {
            return;
        };
        let current_remaining = self.remaining_ms().unwrap_or(0);
        self.arm(player_id, current_remaining.max(ms));
    }

    /// Suspends the countdown, capturing the remaining time for `resume`.
    pub fn freeze(&mut self) {
        let remaining = self.remaining_ms();
        self.abort_handle();
        self.generation += 1;
        self.deadline = None;
        self.frozen_remaining_ms = remaining;
    }

    /// Resumes a previously frozen countdown for the same player.
    pub fn resume(&mut self) {
        if let (Some(player_id), Some(remaining)) =
            (self.current_player, self.frozen_remaining_ms)
        {
            self.arm(player_id, remaining);
        }
    }

    /// Stops the timer entirely; no further fires are expected.
    pub fn cancel(&mut self) {
        self.abort_handle();
        self.generation += 1;
        self.current_player = None;
        self.deadline = None;
        self.frozen_remaining_ms = None;
    }

    pub fn remaining_ms(&self) -> Option<u64> {
        if let Some(remaining) = self.frozen_remaining_ms {
            return Some(remaining);
        }
        let deadline = self.deadline?;
        Some(deadline.saturating_duration_since(Instant::now()).as_millis() as u64)
    }

    pub fn is_tick_current(&self, tick: u64) -> bool {
        tick == self.generation
    }

    pub fn current_player(&self) -> Option<PlayerId> {
        self.current_player
    }

    /// Captures enough of the countdown to restore it later with `restore`,
    /// used to undo a command's timer side effects if its durable write
    /// fails.
    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            generation: self.generation,
            deadline: self.deadline,
            frozen_remaining_ms: self.frozen_remaining_ms,
            current_player: self.current_player,
        }
    }

    /// Restores a prior snapshot, re-arming the countdown task (at the
    /// restored generation, so its tick is still the one the engine treats
    /// as current) if one was active when the snapshot was taken.
    pub fn restore(&mut self, snap: TimerSnapshot) {
        self.abort_handle();
        self.generation = snap.generation;
        self.current_player = snap.current_player;
        self.frozen_remaining_ms = snap.frozen_remaining_ms;
        self.deadline = snap.deadline;
        if let (Some(deadline), Some(player_id)) = (snap.deadline, snap.current_player) {
            let tick = self.generation;
            let tx = self.fired_tx.clone();
            self.handle = Some(tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                let _ = tx.send(TimerFired { player_id, tick });
            }));
        }
    }
}

/// Opaque point-in-time capture of a `Timer`, produced by `Timer::snapshot`.
pub struct TimerSnapshot {
    generation: u64,
    deadline: Option<Instant>,
    frozen_remaining_ms: Option<u64>,
    current_player: Option<PlayerId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_duration_with_matching_tick() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = Timer::new(tx);
        let player_id = PlayerId(uuid::Uuid::from_u128(1));
        timer.arm(player_id, 1_000);
        tokio::time::advance(Duration::from_millis(1_001)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.player_id, player_id);
        assert!(timer.is_tick_current(fired.tick));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_invalidates_the_stale_tick() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = Timer::new(tx);
        let player_id = PlayerId(uuid::Uuid::from_u128(1));
        timer.arm(player_id, 1_000);
        let stale_tick_guess = 1;
        timer.arm(player_id, 5_000);
        assert!(!timer.is_tick_current(stale_tick_guess));
        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn extend_never_shortens_remaining() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timer = Timer::new(tx);
        let player_id = PlayerId(uuid::Uuid::from_u128(1));
        timer.arm(player_id, 2_000);
        timer.extend(15_000);
        assert!(timer.remaining_ms().unwrap() >= 14_000);
    }

    #[tokio::test(start_paused = true)]
    async fn freeze_then_resume_preserves_remaining() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timer = Timer::new(tx);
        let player_id = PlayerId(uuid::Uuid::from_u128(1));
        timer.arm(player_id, 10_000);
        tokio::time::advance(Duration::from_millis(4_000)).await;
        timer.freeze();
        let frozen = timer.remaining_ms().unwrap();
        assert!(frozen <= 6_000 && frozen > 5_000);
        tokio::time::advance(Duration::from_millis(3_000)).await;
        timer.resume();
        assert!(timer.remaining_ms().unwrap() <= frozen);
    }
}
