//! The session state machine. All mutating operations for one auction run
//! through `AuctionActor`'s command loop in FIFO order; different auctions
//! run independently, each on its own spawned task, so there is never a
//! lock shared across auctions on the hot path.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use payloads::requests::{AuctionConfig, CreateAuction};
use payloads::responses::{
    AuctionSnapshot, BidView, BroadcastEvent, BroadcastPayload, Cursor, ManagerView,
    PlayerView, VoteTallyView,
};
use payloads::{AuctionId, AuctionStatus, ManagerId, PlayerId, PlayerStatus, VoteValue};
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::instrument;
use uuid::Uuid;

use crate::bidlog::BidLog;
use crate::broadcaster::Broadcaster;
use crate::catalog::Catalog;
use crate::errors::{
    amount_too_low, empty_catalog, insufficient_balance, nothing_to_undo,
    not_active_player, not_owner, persistence_error, self_outbid, unknown_auction,
    unknown_player, wrong_state, EngineResult,
};
use crate::ledger::Ledger;
use crate::persistence::PersistenceSink;
use crate::time::TimeSource;
use crate::timer::{Timer, TimerFired, TimerSnapshot};
use crate::votes::VoteTally;

/// Delays between command-independent persistence retries at timer expiry
/// (the engine has no caller to fail the command back to), before the
/// resolved player is forced `Unsold` instead.
const TIMER_PERSIST_RETRY_DELAYS_MS: [u64; 4] = [100, 200, 400, 2_000];

const CLIENT_BID_DEDUP_CAP: usize = 512;

/// The command queue's item type. Every variant carries the originating
/// caller's identity and a channel to deliver the resulting snapshot or
/// error back to the submitter.
enum Command {
    Start {
        admin_id: ManagerId,
        respond: Responder<AuctionSnapshot>,
    },
    Stop {
        admin_id: ManagerId,
        respond: Responder<AuctionSnapshot>,
    },
    Continue {
        admin_id: ManagerId,
        respond: Responder<AuctionSnapshot>,
    },
    FinalCall {
        admin_id: ManagerId,
        respond: Responder<AuctionSnapshot>,
    },
    Skip {
        admin_id: ManagerId,
        player_id: PlayerId,
        respond: Responder<AuctionSnapshot>,
    },
    Undo {
        admin_id: ManagerId,
        respond: Responder<AuctionSnapshot>,
    },
    PlaceBid {
        bidder_id: ManagerId,
        player_id: PlayerId,
        amount: Decimal,
        client_bid_id: Option<Uuid>,
        respond: Responder<AuctionSnapshot>,
    },
    Vote {
        voter_id: ManagerId,
        player_id: PlayerId,
        value: VoteValue,
        respond: Responder<AuctionSnapshot>,
    },
    Snapshot {
        respond: Responder<AuctionSnapshot>,
    },
    BidHistory {
        player_id: PlayerId,
        include_invalid: bool,
        respond: oneshot::Sender<Vec<BidView>>,
    },
    Subscribe {
        respond: oneshot::Sender<(BroadcastEvent, broadcast::Receiver<BroadcastEvent>)>,
    },
}

type Responder<T> = oneshot::Sender<EngineResult<T>>;

/// A cheap, cloneable reference to a running auction's actor. Submitting a
/// command is an async round trip through the actor's single-threaded
/// command queue.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<Command>,
}

macro_rules! admin_command {
    ($name:ident, $variant:ident) => {
        pub async fn $name(&self, admin_id: ManagerId) -> EngineResult<AuctionSnapshot> {
            self.call(|respond| Command::$variant { admin_id, respond }).await
        }
    };
}

impl EngineHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(Responder<T>) -> Command,
    ) -> EngineResult<T> {
        let (respond, recv) = oneshot::channel();
        self.cmd_tx
            .send(build(respond))
            .await
            .map_err(|_| crate::errors::cancelled("auction actor is no longer running"))?;
        recv.await
            .map_err(|_| crate::errors::cancelled("auction actor dropped the response channel"))?
    }

    admin_command!(start, Start);
    admin_command!(stop, Stop);
    admin_command!(continue_auction, Continue);
    admin_command!(final_call, FinalCall);
    admin_command!(undo, Undo);

    pub async fn skip(
        &self,
        admin_id: ManagerId,
        player_id: PlayerId,
    ) -> EngineResult<AuctionSnapshot> {
        self.call(|respond| Command::Skip { admin_id, player_id, respond }).await
    }

    pub async fn place_bid(
        &self,
        bidder_id: ManagerId,
        player_id: PlayerId,
        amount: Decimal,
        client_bid_id: Option<Uuid>,
    ) -> EngineResult<AuctionSnapshot> {
        self.call(|respond| Command::PlaceBid {
            bidder_id,
            player_id,
            amount,
            client_bid_id,
            respond,
        })
        .await
    }

    pub async fn vote(
        &self,
        voter_id: ManagerId,
        player_id: PlayerId,
        value: VoteValue,
    ) -> EngineResult<AuctionSnapshot> {
        self.call(|respond| Command::Vote { voter_id, player_id, value, respond }).await
    }

    pub async fn snapshot(&self) -> EngineResult<AuctionSnapshot> {
        self.call(|respond| Command::Snapshot { respond }).await
    }

    pub async fn bid_history(
        &self,
        player_id: PlayerId,
        include_invalid: bool,
    ) -> Vec<BidView> {
        let (respond, recv) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::BidHistory { player_id, include_invalid, respond })
            .await
            .is_err()
        {
            return Vec::new();
        }
        recv.await.unwrap_or_default()
    }

    /// Subscribes to this auction's event stream. The returned `Resync`
    /// event is addressed only to this subscriber (it is not replayed on the
    /// shared stream), and should be delivered to the caller ahead of
    /// whatever the receiver subsequently yields.
    pub async fn subscribe(
        &self,
    ) -> EngineResult<(BroadcastEvent, broadcast::Receiver<BroadcastEvent>)> {
        let (respond, recv) = oneshot::channel();
        self.cmd_tx
            .send(Command::Subscribe { respond })
            .await
            .map_err(|_| crate::errors::cancelled("auction actor is no longer running"))?;
        recv.await
            .map_err(|_| crate::errors::cancelled("auction actor dropped the response channel"))
    }
}

/// Top-level registry: one `EngineHandle` per auction, each backed by its
/// own actor task. Auctions run fully independently of one another.
pub struct Engine {
    auctions: tokio::sync::Mutex<HashMap<AuctionId, EngineHandle>>,
    persistence: Arc<dyn PersistenceSink>,
    time_source: TimeSource,
}

impl Engine {
    pub fn new(persistence: Arc<dyn PersistenceSink>, time_source: TimeSource) -> Self {
        Self {
            auctions: tokio::sync::Mutex::new(HashMap::new()),
            persistence,
            time_source,
        }
    }

    #[instrument(skip(self, req))]
    pub async fn create_auction(&self, req: CreateAuction) -> EngineResult<AuctionId> {
        if req.players.is_empty() || req.config.category_order.is_empty() {
            return Err(empty_catalog(
                "auction must be created with at least one player and a non-empty category order",
            ));
        }
        if let Some(player) = req
            .players
            .iter()
            .find(|p| !req.config.category_order.contains(&p.category))
        {
            return Err(empty_catalog(format!(
                "player {} has category {} which is not in the configured category order",
                player.player_id, player.category
            )));
        }
        let auction_id = AuctionId(Uuid::new_v4());
        let state = AuctionState::new(auction_id, req);
        let handle = spawn_actor(state, self.persistence.clone(), self.time_source.clone());
        self.auctions.lock().await.insert(auction_id, handle);
        Ok(auction_id)
    }

    async fn handle_for(&self, auction_id: &AuctionId) -> EngineResult<EngineHandle> {
        self.auctions
            .lock()
            .await
            .get(auction_id)
            .cloned()
            .ok_or_else(|| unknown_auction(format!("no such auction {auction_id}")))
    }

    pub async fn start(&self, auction_id: AuctionId, admin_id: ManagerId) -> EngineResult<AuctionSnapshot> {
        self.handle_for(&auction_id).await?.start(admin_id).await
    }

    pub async fn stop(&self, auction_id: AuctionId, admin_id: ManagerId) -> EngineResult<AuctionSnapshot> {
        self.handle_for(&auction_id).await?.stop(admin_id).await
    }

    pub async fn continue_auction(
        &self,
        auction_id: AuctionId,
        admin_id: ManagerId,
    ) -> EngineResult<AuctionSnapshot> {
        self.handle_for(&auction_id).await?.continue_auction(admin_id).await
    }

    pub async fn final_call(
        &self,
        auction_id: AuctionId,
        admin_id: ManagerId,
    ) -> EngineResult<AuctionSnapshot> {
        self.handle_for(&auction_id).await?.final_call(admin_id).await
    }

    pub async fn skip(
        &self,
        auction_id: AuctionId,
        admin_id: ManagerId,
        player_id: PlayerId,
    ) -> EngineResult<AuctionSnapshot> {
        self.handle_for(&auction_id).await?.skip(admin_id, player_id).await
    }

    pub async fn undo(&self, auction_id: AuctionId, admin_id: ManagerId) -> EngineResult<AuctionSnapshot> {
        self.handle_for(&auction_id).await?.undo(admin_id).await
    }

    pub async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder_id: ManagerId,
        player_id: PlayerId,
        amount: Decimal,
        client_bid_id: Option<Uuid>,
    ) -> EngineResult<AuctionSnapshot> {
        self.handle_for(&auction_id)
            .await?
            .place_bid(bidder_id, player_id, amount, client_bid_id)
            .await
    }

    pub async fn vote(
        &self,
        auction_id: AuctionId,
        voter_id: ManagerId,
        player_id: PlayerId,
        value: VoteValue,
    ) -> EngineResult<AuctionSnapshot> {
        self.handle_for(&auction_id).await?.vote(voter_id, player_id, value).await
    }

    pub async fn snapshot(&self, auction_id: AuctionId) -> EngineResult<AuctionSnapshot> {
        self.handle_for(&auction_id).await?.snapshot().await
    }

    pub async fn bid_history(
        &self,
        auction_id: AuctionId,
        player_id: PlayerId,
        include_invalid: bool,
    ) -> EngineResult<Vec<BidView>> {
        Ok(self
            .handle_for(&auction_id)
            .await?
            .bid_history(player_id, include_invalid)
            .await)
    }

    pub async fn subscribe(
        &self,
        auction_id: AuctionId,
    ) -> EngineResult<(BroadcastEvent, broadcast::Receiver<BroadcastEvent>)> {
        self.handle_for(&auction_id).await?.subscribe().await
    }
}

/// The mutable state a single auction's actor owns exclusively. `Clone` is
/// used to take a pre-mutation backup that a command can be rolled back to
/// if its durable write fails.
#[derive(Clone)]
struct AuctionState {
    auction_id: AuctionId,
    name: String,
    admin_id: ManagerId,
    status: AuctionStatus,
    config: AuctionConfig,
    catalog: Catalog,
    ledger: Ledger,
    bidlog: BidLog,
    votes: VoteTally,
    category_index: usize,
    player_index: usize,
    current_player_id: Option<PlayerId>,
    /// Keyed snapshots are `Arc`-wrapped so the per-command rollback backup
    /// (`self.state.clone()`) only bumps refcounts here instead of
    /// deep-cloning up to `CLIENT_BID_DEDUP_CAP` full snapshots on every
    /// mutating command.
    client_bid_dedup: HashMap<Uuid, Arc<AuctionSnapshot>>,
    client_bid_dedup_order: VecDeque<Uuid>,
}

impl AuctionState {
    fn new(auction_id: AuctionId, req: CreateAuction) -> Self {
        let CreateAuction {
            name,
            admin_id,
            players,
            managers,
            config,
        } = req;
        let mut ledger = Ledger::new();
        for manager in managers {
            ledger.open_account(manager.manager_id, manager.initial_balance);
        }
        let catalog = Catalog::new(config.category_order.clone(), players);
        Self {
            auction_id,
            name,
            admin_id,
            status: AuctionStatus::Draft,
            config,
            catalog,
            ledger,
            bidlog: BidLog::new(),
            votes: VoteTally::new(),
            category_index: 0,
            player_index: 0,
            current_player_id: None,
            client_bid_dedup: HashMap::new(),
            client_bid_dedup_order: VecDeque::new(),
        }
    }

    fn require_admin(&self, caller: &ManagerId) -> EngineResult<()> {
        if &self.admin_id != caller {
            return Err(not_owner(format!("{caller} is not the admin of this auction")));
        }
        Ok(())
    }

    fn cursor(&self) -> Cursor {
        Cursor {
            category: self
                .catalog
                .category_at(self.category_index)
                .cloned()
                .unwrap_or_else(|| payloads::Category::new("")),
            index: self.player_index,
            player_id: self.current_player_id,
        }
    }

    fn active_manager_count(&self) -> u32 {
        self.ledger.all_projections().len() as u32
    }

    fn snapshot(&self, timer: &Timer, last_event_seq: u64) -> AuctionSnapshot {
        let manager_count = self.active_manager_count();
        let players = self
            .catalog
            .all_players()
            .map(|p| PlayerView {
                player_id: p.player_id,
                display_name: p.display_name.clone(),
                category: p.category.clone(),
                base_value: p.base_value,
                status: p.status,
                current_bid: p.current_bid,
                current_high_bidder: p.current_high_bidder,
                total_bids: p.total_bids,
                final_price: p.final_price,
                final_winner: p.final_winner,
            })
            .collect();
        let managers = self
            .ledger
            .all_projections()
            .into_iter()
            .map(|proj| ManagerView {
                manager_id: proj.manager_id,
                initial_balance: proj.initial_balance,
                spent: proj.spent,
                reserved: proj.reserved,
                available: proj.available,
                won_players: proj.won_players,
            })
            .collect();
        let votes = self
            .catalog
            .all_players()
            .map(|p| {
                let (likes, dislikes) = self.votes.counts(&p.player_id);
                let skip_advised = self.votes.skip_advised(
                    &p.player_id,
                    manager_count,
                    self.config.dislike_fraction,
                );
                VoteTallyView {
                    player_id: p.player_id,
                    likes,
                    dislikes,
                    skip_advised,
                    self_value: None,
                }
            })
            .collect();
        AuctionSnapshot {
            auction_id: self.auction_id,
            name: self.name.clone(),
            status: self.status,
            cursor: self.cursor(),
            players,
            managers,
            votes,
            timer_remaining_ms: timer.remaining_ms(),
            last_event_seq,
        }
    }

    /// Arms the player at the current cursor as active, or resolves straight
    /// through to `completed` if the catalog has been exhausted.
    fn arm_current_player(&mut self, timer: &mut Timer) -> Vec<BroadcastPayload> {
        let mut events = Vec::new();
        loop {
            if self.category_index >= self.catalog.category_count() {
                self.status = AuctionStatus::Completed;
                self.current_player_id = None;
                timer.cancel();
                events.push(BroadcastPayload::AuctionCompleted);
                return events;
            }
            match self.catalog.player_at(self.category_index, self.player_index) {
                Some(player_id) => {
                    self.current_player_id = Some(player_id);
                    if let Some(player) = self.catalog.player_mut(&player_id) {
                        player.status = PlayerStatus::Active;
                    }
                    timer.arm(player_id, self.config.initial_bid_ms);
                    events.push(BroadcastPayload::NextPlayer { player_id });
                    return events;
                }
                None => {
                    events.push(BroadcastPayload::CategoryCompleted {
                        category: self
                            .catalog
                            .category_at(self.category_index)
                            .cloned()
                            .unwrap_or_else(|| payloads::Category::new("")),
                    });
                    self.category_index += 1;
                    self.player_index = 0;
                }
            }
        }
    }

    /// Resolves the current active player (sold/unsold), then advances the
    /// cursor and arms the next player (or completes the auction).
    fn resolve_and_advance(&mut self, timer: &mut Timer) -> Vec<BroadcastPayload> {
        let mut events = Vec::new();
        let Some(player_id) = self.current_player_id else {
            return events;
        };
        let top_bid = self.bidlog.current_top(&player_id).cloned();
        match top_bid {
            Some(bid) => {
                let winner = bid.bidder_id;
                let price = bid.amount;
                if let Err(e) = self.ledger.commit(&winner, player_id, price) {
                    tracing::error!(%e, "ledger commit failed at resolution; treating player as unsold");
                    if let Some(player) = self.catalog.player_mut(&player_id) {
                        player.status = PlayerStatus::Unsold;
                    }
                    events.push(BroadcastPayload::PlayerUnsold { player_id });
                } else {
                    if let Some(player) = self.catalog.player_mut(&player_id) {
                        player.status = PlayerStatus::Sold;
                        player.final_price = Some(price);
                        player.final_winner = Some(winner);
                    }
                    events.push(BroadcastPayload::PlayerSold {
                        player_id,
                        winner,
                        final_price: price,
                    });
                }
            }
            None => {
                if let Some(player) = self.catalog.player_mut(&player_id) {
                    player.status = PlayerStatus::Unsold;
                }
                events.push(BroadcastPayload::PlayerUnsold { player_id });
            }
        }
        self.player_index += 1;
        events.extend(self.arm_current_player(timer));
        events
    }

    fn remember_client_bid(&mut self, client_bid_id: Uuid, snapshot: AuctionSnapshot) {
        if self.client_bid_dedup.contains_key(&client_bid_id) {
            return;
        }
        if self.client_bid_dedup_order.len() >= CLIENT_BID_DEDUP_CAP {
            if let Some(oldest) = self.client_bid_dedup_order.pop_front() {
                self.client_bid_dedup.remove(&oldest);
            }
        }
        self.client_bid_dedup_order.push_back(client_bid_id);
        self.client_bid_dedup.insert(client_bid_id, Arc::new(snapshot));
    }
}

fn spawn_actor(
    state: AuctionState,
    persistence: Arc<dyn PersistenceSink>,
    time_source: TimeSource,
) -> EngineHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (fired_tx, fired_rx) = mpsc::unbounded_channel();
    let timer = Timer::new(fired_tx);
    let broadcaster = Broadcaster::new(state.auction_id);
    let mut tick_interval = tokio::time::interval(StdDuration::from_secs(1));
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let actor = AuctionActor {
        state,
        timer,
        broadcaster,
        persistence,
        time_source,
        cmd_rx,
        fired_rx,
        tick_interval,
    };
    tokio::spawn(actor.run());
    EngineHandle { cmd_tx }
}

struct AuctionActor {
    state: AuctionState,
    timer: Timer,
    broadcaster: Broadcaster,
    persistence: Arc<dyn PersistenceSink>,
    time_source: TimeSource,
    cmd_rx: mpsc::Receiver<Command>,
    fired_rx: mpsc::UnboundedReceiver<TimerFired>,
    tick_interval: tokio::time::Interval,
}

impl AuctionActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                fired = self.fired_rx.recv() => {
                    match fired {
                        Some(fired) => self.handle_timer_fired(fired).await,
                        None => {}
                    }
                }
                _ = self.tick_interval.tick() => {
                    self.emit_timer_tick();
                }
            }
            // Completion doesn't stop the actor: snapshot/history queries
            // still need to be served until every handle is dropped.
        }
    }

    fn broadcast(&mut self, payload: BroadcastPayload) {
        self.broadcaster.emit(&self.time_source, payload);
    }

    /// Coarse (>=1Hz) countdown ping for UI display, independent of the
    /// bid/extension-driven `TimerTick`s emitted elsewhere.
    fn emit_timer_tick(&mut self) {
        if self.state.status != AuctionStatus::Ongoing {
            return;
        }
        let Some(player_id) = self.state.current_player_id else {
            return;
        };
        let Some(remaining_ms) = self.timer.remaining_ms() else {
            return;
        };
        self.broadcast(BroadcastPayload::TimerTick { player_id, remaining_ms });
    }

    /// Persists `snapshot`, retrying with backoff (100/200/400ms, capped at
    /// 2s) since a timer-expiry resolution has no caller to fail back to.
    async fn persist_snapshot_with_backoff(&self, snapshot: &AuctionSnapshot) -> bool {
        if self.persistence.write_snapshot(snapshot.clone()).await.is_ok() {
            return true;
        }
        for &delay_ms in TIMER_PERSIST_RETRY_DELAYS_MS.iter() {
            tokio::time::sleep(StdDuration::from_millis(delay_ms)).await;
            if self.persistence.write_snapshot(snapshot.clone()).await.is_ok() {
                return true;
            }
        }
        false
    }

    /// Finishes a command that already mutated `self.state`/`self.timer`:
    /// persists the resulting snapshot and, only on success, broadcasts
    /// `events` and returns it. On a persistence failure the mutation is
    /// rolled back to `state_backup`/`timer_backup` and the command fails
    /// with `PersistenceError` instead.
    async fn finish_mutation(
        &mut self,
        state_backup: AuctionState,
        timer_backup: TimerSnapshot,
        events: Vec<BroadcastPayload>,
    ) -> EngineResult<AuctionSnapshot> {
        let snapshot = self.state.snapshot(&self.timer, self.broadcaster.last_seq());
        if let Err(e) = self.persistence.write_snapshot(snapshot.clone()).await {
            tracing::error!(%e, "failed to persist auction snapshot; reverting command");
            self.state = state_backup;
            self.timer.restore(timer_backup);
            return Err(persistence_error(e.to_string()));
        }
        for event in events {
            self.broadcast(event);
        }
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    async fn handle_timer_fired(&mut self, fired: TimerFired) {
        if !self.timer.is_tick_current(fired.tick) {
            return;
        }
        if self.state.current_player_id != Some(fired.player_id) {
            return;
        }
        if self.state.status != AuctionStatus::Ongoing {
            return;
        }
        let resolved_player_id = fired.player_id;
        let events = self.state.resolve_and_advance(&mut self.timer);
        let snapshot = self.state.snapshot(&self.timer, self.broadcaster.last_seq());

        if self.persist_snapshot_with_backoff(&snapshot).await {
            for event in events {
                self.broadcast(event);
            }
            return;
        }

        tracing::error!(
            player_id = %resolved_player_id,
            "snapshot persistence exhausted retries at timer expiry; forcing player unsold"
        );
        if let Some(player) = self.state.catalog.player_mut(&resolved_player_id) {
            if player.status == PlayerStatus::Sold {
                if let (Some(winner), Some(price)) = (player.final_winner, player.final_price) {
                    self.state.ledger.revert_commit(&winner, &resolved_player_id, price);
                }
            }
            player.status = PlayerStatus::Unsold;
            player.final_price = None;
            player.final_winner = None;
        }
        self.broadcast(BroadcastPayload::PlayerUnsold { player_id: resolved_player_id });
    }

    #[instrument(skip(self, cmd))]
    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { admin_id, respond } => {
                let result = self.do_start(admin_id).await;
                let _ = respond.send(result);
            }
            Command::Stop { admin_id, respond } => {
                let result = self.do_stop(admin_id).await;
                let _ = respond.send(result);
            }
            Command::Continue { admin_id, respond } => {
                let result = self.do_continue(admin_id).await;
                let _ = respond.send(result);
            }
            Command::FinalCall { admin_id, respond } => {
                let result = self.do_final_call(admin_id).await;
                let _ = respond.send(result);
            }
            Command::Skip { admin_id, player_id, respond } => {
                let result = self.do_skip(admin_id, player_id).await;
                let _ = respond.send(result);
            }
            Command::Undo { admin_id, respond } => {
                let result = self.do_undo(admin_id).await;
                let _ = respond.send(result);
            }
            Command::PlaceBid {
                bidder_id,
                player_id,
                amount,
                client_bid_id,
                respond,
            } => {
                let result = self.do_place_bid(bidder_id, player_id, amount, client_bid_id).await;
                let _ = respond.send(result);
            }
            Command::Vote { voter_id, player_id, value, respond } => {
                let result = self.do_vote(voter_id, player_id, value).await;
                let _ = respond.send(result);
            }
            Command::Snapshot { respond } => {
                let snapshot = self.state.snapshot(&self.timer, self.broadcaster.last_seq());
                let _ = respond.send(Ok(snapshot));
            }
            Command::BidHistory { player_id, include_invalid, respond } => {
                let history = if include_invalid {
                    self.state.bidlog.history(&player_id)
                } else {
                    self.state.bidlog.valid_history(&player_id)
                };
                let views = history.into_iter().map(to_bid_view).collect();
                let _ = respond.send(views);
            }
            Command::Subscribe { respond } => {
                let snapshot = self.state.snapshot(&self.timer, self.broadcaster.last_seq());
                let resync = self.broadcaster.resync_event(&self.time_source, snapshot);
                let rx = self.broadcaster.subscribe();
                let _ = respond.send((resync, rx));
            }
        }
    }

    async fn do_start(&mut self, admin_id: ManagerId) -> EngineResult<AuctionSnapshot> {
        if self.state.status != AuctionStatus::Draft {
            return Err(wrong_state("auction is not in draft"));
        }
        self.state.require_admin(&admin_id)?;
        if self.state.catalog.is_empty() || self.state.config.category_order.is_empty() {
            return Err(empty_catalog(
                "auction has no players or no usable category order",
            ));
        }

        let state_backup = self.state.clone();
        let timer_backup = self.timer.snapshot();

        self.state.status = AuctionStatus::Ongoing;
        self.state.category_index = 0;
        self.state.player_index = 0;
        let mut events = vec![BroadcastPayload::AuctionStarted { cursor: self.state.cursor() }];
        events.extend(self.state.arm_current_player(&mut self.timer));

        self.finish_mutation(state_backup, timer_backup, events).await
    }

    async fn do_stop(&mut self, admin_id: ManagerId) -> EngineResult<AuctionSnapshot> {
        self.state.require_admin(&admin_id)?;
        if self.state.status == AuctionStatus::Paused {
            return Ok(self.state.snapshot(&self.timer, self.broadcaster.last_seq()));
        }
        if self.state.status != AuctionStatus::Ongoing {
            return Err(wrong_state("auction is not ongoing"));
        }

        let state_backup = self.state.clone();
        let timer_backup = self.timer.snapshot();

        self.timer.freeze();
        self.state.status = AuctionStatus::Paused;
        let events = vec![BroadcastPayload::AuctionStopped];

        self.finish_mutation(state_backup, timer_backup, events).await
    }

    async fn do_continue(&mut self, admin_id: ManagerId) -> EngineResult<AuctionSnapshot> {
        self.state.require_admin(&admin_id)?;
        if self.state.status != AuctionStatus::Paused {
            return Err(wrong_state("auction is not paused"));
        }

        let state_backup = self.state.clone();
        let timer_backup = self.timer.snapshot();

        self.timer.resume();
        self.state.status = AuctionStatus::Ongoing;
        let events = vec![BroadcastPayload::AuctionContinued];

        self.finish_mutation(state_backup, timer_backup, events).await
    }

    async fn do_final_call(&mut self, admin_id: ManagerId) -> EngineResult<AuctionSnapshot> {
        self.state.require_admin(&admin_id)?;
        if self.state.status != AuctionStatus::Ongoing {
            return Err(wrong_state("auction is not ongoing"));
        }

        let state_backup = self.state.clone();
        let timer_backup = self.timer.snapshot();

        let events = self.state.resolve_and_advance(&mut self.timer);

        self.finish_mutation(state_backup, timer_backup, events).await
    }

    async fn do_skip(
        &mut self,
        admin_id: ManagerId,
        player_id: PlayerId,
    ) -> EngineResult<AuctionSnapshot> {
        self.state.require_admin(&admin_id)?;
        if self.state.status != AuctionStatus::Ongoing {
            return Err(wrong_state("auction is not ongoing"));
        }
        if self.state.current_player_id != Some(player_id) {
            return Err(not_active_player("player is not the current active player"));
        }
        if self.state.bidlog.valid_count(&player_id) > 0 {
            return Err(wrong_state("player already has accepted bids, use final call instead"));
        }

        let state_backup = self.state.clone();
        let timer_backup = self.timer.snapshot();

        if let Some(player) = self.state.catalog.player_mut(&player_id) {
            player.status = PlayerStatus::Skipped;
        }
        self.state.player_index += 1;
        let mut events = vec![BroadcastPayload::PlayerSkipped { player_id }];
        events.extend(self.state.arm_current_player(&mut self.timer));

        self.finish_mutation(state_backup, timer_backup, events).await
    }

    async fn do_undo(&mut self, admin_id: ManagerId) -> EngineResult<AuctionSnapshot> {
        self.state.require_admin(&admin_id)?;
        if self.state.status != AuctionStatus::Ongoing {
            return Err(wrong_state("auction is not ongoing"));
        }
        let Some(player_id) = self.state.current_player_id else {
            return Err(nothing_to_undo("there is no active player"));
        };

        let state_backup = self.state.clone();
        let timer_backup = self.timer.snapshot();

        let invalidated = match self.state.bidlog.invalidate_latest_valid(&player_id) {
            Some(b) => b,
            None => return Err(nothing_to_undo("there is no valid bid to undo")),
        };
        self.state.ledger.release_reservation(&invalidated.bidder_id, &player_id).ok();
        let remaining_top = self.state.bidlog.current_top(&player_id).cloned();
        match &remaining_top {
            Some(bid) => {
                if let Err(e) = self.state.ledger.reserve(&bid.bidder_id, player_id, bid.amount) {
                    self.state = state_backup;
                    self.timer.restore(timer_backup);
                    return Err(e);
                }
                if let Some(player) = self.state.catalog.player_mut(&player_id) {
                    player.current_bid = bid.amount;
                    player.current_high_bidder = Some(bid.bidder_id);
                }
            }
            None => {
                if let Some(player) = self.state.catalog.player_mut(&player_id) {
                    player.current_bid = Decimal::ZERO;
                    player.current_high_bidder = None;
                }
            }
        }
        if let Some(player) = self.state.catalog.player_mut(&player_id) {
            player.total_bids = player.total_bids.saturating_sub(1);
        }
        let events = vec![BroadcastPayload::BidUndone {
            player_id,
            invalidated_bid_id: invalidated.bid_id,
        }];

        self.finish_mutation(state_backup, timer_backup, events).await
    }

    async fn do_place_bid(
        &mut self,
        bidder_id: ManagerId,
        player_id: PlayerId,
        amount: Decimal,
        client_bid_id: Option<Uuid>,
    ) -> EngineResult<AuctionSnapshot> {
        if let Some(client_bid_id) = client_bid_id {
            if let Some(cached) = self.state.client_bid_dedup.get(&client_bid_id) {
                return Ok((**cached).clone());
            }
        }

        if self.state.status != AuctionStatus::Ongoing {
            return Err(wrong_state("auction is not ongoing"));
        }
        if self.state.current_player_id != Some(player_id) {
            return Err(not_active_player("player is not the current active player"));
        }
        let player = self
            .state
            .catalog
            .player(&player_id)
            .ok_or_else(|| unknown_player(format!("no such player {player_id}")))?;
        if player.current_high_bidder == Some(bidder_id) {
            return Err(self_outbid("bidder already holds the high bid on this player"));
        }
        let minimum = if player.current_bid.is_zero() {
            player.base_value
        } else {
            player.current_bid + self.state.config.min_increment
        };
        if amount < minimum {
            return Err(amount_too_low(format!(
                "amount {amount} is below the minimum of {minimum}"
            )));
        }
        let previous_amount = player.current_bid;
        let previous_bidder = player.current_high_bidder;
        let timer_remaining = self.timer.remaining_ms().unwrap_or(0);

        let state_backup = self.state.clone();
        let timer_backup = self.timer.snapshot();

        self.state.ledger.reserve(&bidder_id, player_id, amount).map_err(|e| {
            if e.kind == payloads::ErrorKind::InsufficientBalance {
                insufficient_balance(e.detail)
            } else {
                e
            }
        })?;
        if let Some(previous_bidder) = previous_bidder {
            self.state.ledger.release_reservation(&previous_bidder, &player_id).ok();
        }

        let bid = self.state.bidlog.append(
            player_id,
            bidder_id,
            amount,
            previous_amount,
            timer_remaining,
            self.time_source.now(),
        );

        if let Some(player) = self.state.catalog.player_mut(&player_id) {
            player.current_bid = amount;
            player.current_high_bidder = Some(bidder_id);
            player.total_bids += 1;
        }

        let bid_view = to_bid_view(bid);
        let mut events = vec![BroadcastPayload::BidAccepted { bid: bid_view.clone() }];

        if timer_remaining < self.state.config.anti_snipe_threshold_ms {
            self.timer.extend(self.state.config.anti_snipe_extension_ms);
            if let Some(remaining_ms) = self.timer.remaining_ms() {
                events.push(BroadcastPayload::TimerTick { player_id, remaining_ms });
            }
        }

        let snapshot = self.state.snapshot(&self.timer, self.broadcaster.last_seq());
        if let Err(e) = self.persistence.write_bid(self.state.auction_id, bid_view).await {
            tracing::error!(%e, "failed to persist bid; reverting");
            self.state = state_backup;
            self.timer.restore(timer_backup);
            return Err(persistence_error(e.to_string()));
        }
        if let Err(e) = self.persistence.write_snapshot(snapshot.clone()).await {
            tracing::error!(%e, "failed to persist auction snapshot after bid; reverting");
            self.state = state_backup;
            self.timer.restore(timer_backup);
            return Err(persistence_error(e.to_string()));
        }

        for event in events {
            self.broadcast(event);
        }

        if let Some(client_bid_id) = client_bid_id {
            self.state.remember_client_bid(client_bid_id, snapshot.clone());
        }
        Ok(snapshot)
    }

    async fn do_vote(
        &mut self,
        voter_id: ManagerId,
        player_id: PlayerId,
        value: VoteValue,
    ) -> EngineResult<AuctionSnapshot> {
        let state_backup = self.state.clone();
        let timer_backup = self.timer.snapshot();

        let tally = self.state.votes.record(voter_id, player_id, value);
        let skip_advised = self.state.votes.skip_advised(
            &player_id,
            self.state.active_manager_count(),
            self.state.config.dislike_fraction,
        );
        let events = vec![BroadcastPayload::VoteRecorded {
            player_id,
            tally: VoteTallyView {
                player_id,
                likes: tally.likes,
                dislikes: tally.dislikes,
                skip_advised,
                self_value: tally.self_value,
            },
        }];

        self.finish_mutation(state_backup, timer_backup, events).await
    }
}

fn to_bid_view(bid: crate::bidlog::Bid) -> BidView {
    BidView {
        bid_id: bid.bid_id,
        player_id: bid.player_id,
        bidder_id: bid.bidder_id,
        amount: bid.amount,
        previous_amount: bid.previous_amount,
        sequence: bid.sequence,
        timer_remaining_ms_at_placement: bid.timer_remaining_ms_at_placement,
        valid: bid.valid,
        placed_at: bid.placed_at,
    }
}
