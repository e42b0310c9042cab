//! Completion orchestrator: reacts to game snapshots from the store's change
//! stream, propagates results, invalidates cached standings and triggers
//! auto-seeding once a division's pools are done.

use crate::advance::{AdvancePolicy, AdvancementResult, advance_outcome};
use crate::cache::{CacheInvalidator, CacheKey};
use crate::ledger::{Debounce, Debouncer, ProcessedLedger};
use crate::seeding::{SeedingReport, auto_seed_brackets, check_pools_complete, pool_results_digest};
use crate::store::Store;
use crate::{EngineError, EngineResult, Game, GameId, GameStatus};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Minimum spacing between pool-completion checks of one division.
    pub debounce: Duration,
    /// How long a processed game stays in the idempotency ledger.
    pub ledger_ttl: Duration,
    pub store_retries: u32,
    pub retry_delay: Duration,
    pub corrections: AdvancePolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
            ledger_ttl: Duration::from_secs(6 * 60 * 60),
            store_retries: 3,
            retry_delay: Duration::from_millis(250),
            corrections: AdvancePolicy::Reject,
        }
    }
}

/// Things worth telling whoever drives the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Advanced(AdvancementResult),
    AdvanceFailed { game_id: GameId, error: EngineError },
    PoolsComplete { division_id: String },
    Seeded(SeedingReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub advanced: u64,
    pub failed: u64,
    pub skipped_duplicates: u64,
    pub pool_checks: u64,
    pub seeding_runs: u64,
}

#[derive(Debug, Default)]
struct Counters {
    advanced: AtomicU64,
    failed: AtomicU64,
    skipped_duplicates: AtomicU64,
    pool_checks: AtomicU64,
    seeding_runs: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct CompletionOrchestrator<S: Store, C: CacheInvalidator> {
    store: Arc<S>,
    cache: Arc<C>,
    settings: EngineSettings,
    ledger: Mutex<ProcessedLedger>,
    last_seen: Mutex<HashMap<GameId, (GameStatus, Instant)>>,
    awaiting_retry: Mutex<HashSet<GameId>>,
    game_locks: Mutex<HashMap<GameId, Arc<tokio::sync::Mutex<()>>>>,
    debouncer: Mutex<Debouncer>,
    /// Pool results digest each division was last seeded from.
    seeded: Mutex<HashMap<String, u64>>,
    counters: Counters,
    events: Option<mpsc::Sender<EngineEvent>>,
}

impl<S: Store, C: CacheInvalidator> CompletionOrchestrator<S, C> {
    pub fn new(store: Arc<S>, cache: Arc<C>, settings: EngineSettings) -> Self {
        Self {
            ledger: Mutex::new(ProcessedLedger::new(settings.ledger_ttl)),
            debouncer: Mutex::new(Debouncer::new(settings.debounce)),
            store,
            cache,
            settings,
            last_seen: Mutex::new(HashMap::new()),
            awaiting_retry: Mutex::new(HashSet::new()),
            game_locks: Mutex::new(HashMap::new()),
            seeded: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            events: None,
        }
    }

    /// Report advancement, failures and seeding on `events`.
    pub fn with_events(mut self, events: mpsc::Sender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn stats(&self) -> OrchestratorStats {
        let c = &self.counters;
        OrchestratorStats {
            advanced: c.advanced.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            skipped_duplicates: c.skipped_duplicates.load(Ordering::Relaxed),
            pool_checks: c.pool_checks.load(Ordering::Relaxed),
            seeding_runs: c.seeding_runs.load(Ordering::Relaxed),
        }
    }

    pub fn is_processed(&self, game: &Game) -> bool {
        locked(&self.ledger).is_processed(&game.id, game.fingerprint(), Instant::now())
    }

    pub fn is_awaiting_retry(&self, game_id: &str) -> bool {
        locked(&self.awaiting_retry).contains(game_id)
    }

    /// Games whose last status is still remembered.
    pub fn tracked_games(&self) -> usize {
        locked(&self.last_seen).len()
    }

    /// Drop ledger and status entries older than the ledger TTL.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.settings.ledger_ttl;
        let mut evicted = locked(&self.ledger).evict_expired(now);

        let retrying = locked(&self.awaiting_retry).clone();
        let mut last_seen = locked(&self.last_seen);
        let before = last_seen.len();
        last_seen.retain(|id, (_, seen_at)| {
            retrying.contains(id) || now.duration_since(*seen_at) < ttl
        });
        evicted += before - last_seen.len();
        evicted
    }

    fn game_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = locked(&self.game_locks);
        Arc::clone(locks.entry(id.to_owned()).or_default())
    }

    fn release_game_lock(&self, id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = locked(&self.game_locks);
        // The map and `lock` are the only holders: nobody is queued behind us.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
    }

    async fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events
            && events.send(event).await.is_err()
        {
            debug!("engine event receiver is gone");
        }
    }

    // -----------------------------------------------------------------------
    // Notification handling
    // -----------------------------------------------------------------------

    /// Handle one game snapshot. Snapshots of the same game are serialized;
    /// different games proceed concurrently.
    pub async fn on_game_changed(self: &Arc<Self>, game: Game) {
        let id = game.id.clone();
        let lock = self.game_lock(&id);
        {
            let _guard = lock.lock().await;
            self.handle_snapshot(game).await;
        }
        self.release_game_lock(&id, lock);
    }

    async fn handle_snapshot(self: &Arc<Self>, game: Game) {
        let previous = locked(&self.last_seen)
            .insert(game.id.clone(), (game.status, Instant::now()))
            .map(|(status, _)| status);
        if game.status != GameStatus::Completed {
            if previous == Some(GameStatus::Completed) {
                // Reopened; a later completion is a fresh transition.
                locked(&self.ledger).forget(&game.id);
            }
            return;
        }

        let transition = previous != Some(GameStatus::Completed);
        let retry = self.is_awaiting_retry(&game.id);
        let recorded = locked(&self.ledger).lookup(&game.id, Instant::now());
        let duplicate = recorded.is_some_and(|entry| entry.fingerprint == game.fingerprint());
        let corrected = recorded.is_some_and(|entry| entry.fingerprint != game.fingerprint());

        if duplicate || !(transition || retry || corrected) {
            bump(&self.counters.skipped_duplicates);
            debug!("{} already handled", game.id);
            return;
        }
        if corrected {
            info!("score correction on {}: {}-{}", game.id, game.score_a, game.score_b);
        }
        self.process(&game).await;
    }

    async fn process(self: &Arc<Self>, game: &Game) {
        self.invalidate_for(game);

        let mut succeeded = true;
        if game.bracket.is_some() || !game.advances.is_empty() {
            match self.advance_with_retries(game).await {
                Ok(result) => {
                    for failure in result.failures() {
                        if let Err(e) = &failure.result {
                            warn!("{} could not be placed in {}: {e}", failure.team, failure.target);
                        }
                    }
                    if result.has_retryable_failure() {
                        succeeded = false;
                    } else {
                        bump(&self.counters.advanced);
                    }
                    self.emit(EngineEvent::Advanced(result)).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!("advancing {} failed: {e}", game.id);
                    } else {
                        warn!("advancing {} failed: {e}", game.id);
                    }
                    succeeded = false;
                    self.emit(EngineEvent::AdvanceFailed { game_id: game.id.clone(), error: e })
                        .await;
                }
            }
        }

        if succeeded {
            locked(&self.ledger).mark(&game.id, game.fingerprint(), Instant::now());
            locked(&self.awaiting_retry).remove(&game.id);
        } else {
            bump(&self.counters.failed);
            locked(&self.awaiting_retry).insert(game.id.clone());
        }

        if game.pool.is_some() {
            self.schedule_pool_check(&game.division_id).await;
        }
    }

    fn invalidate_for(&self, game: &Game) {
        self.cache.invalidate(&CacheKey::Division(game.division_id.clone()));
        if let Some(pool_id) = game.pool_id() {
            self.cache.invalidate(&CacheKey::Pool(pool_id.to_owned()));
        }
        for team in [game.team_a(), game.team_b()].into_iter().flatten() {
            self.cache.invalidate(&CacheKey::Team(team.to_owned()));
        }
    }

    async fn advance_with_retries(&self, game: &Game) -> EngineResult<AdvancementResult> {
        let mut attempt = 0;
        loop {
            let result = advance_outcome(self.store.as_ref(), game, self.settings.corrections).await;
            let retryable = match &result {
                Ok(r) => r.has_retryable_failure(),
                Err(e) => e.is_retryable(),
            };
            if !retryable || attempt >= self.settings.store_retries {
                return result;
            }
            attempt += 1;
            warn!("store trouble advancing {}, retry {attempt}/{}", game.id, self.settings.store_retries);
            tokio::time::sleep(self.settings.retry_delay).await;
        }
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, mut op: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.settings.store_retries => {
                    attempt += 1;
                    warn!("{what}: {e}, retry {attempt}/{}", self.settings.store_retries);
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                other => return other,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Pool completion
    // -----------------------------------------------------------------------

    async fn schedule_pool_check(self: &Arc<Self>, division_id: &str) {
        let decision = locked(&self.debouncer).poll(division_id, Instant::now());
        match decision {
            Debounce::Run => self.run_pool_check(division_id).await,
            Debounce::Deferred { at } => {
                debug!("pool check for {division_id} deferred");
                let this = Arc::clone(self);
                let division_id = division_id.to_owned();
                tokio::spawn(async move {
                    tokio::time::sleep_until(at).await;
                    locked(&this.debouncer).fire(&division_id, Instant::now());
                    this.run_pool_check(&division_id).await;
                });
            }
            Debounce::Coalesced => debug!("pool check for {division_id} already pending"),
        }
    }

    async fn run_pool_check(&self, division_id: &str) {
        bump(&self.counters.pool_checks);
        let store = self.store.as_ref();
        let complete = match self
            .with_retries("pool completion check", || check_pools_complete(store, division_id))
            .await
        {
            Ok(complete) => complete,
            Err(e) => {
                error!("pool completion check for {division_id} failed: {e}");
                return;
            }
        };
        if !complete {
            return;
        }
        info!("all pools of {division_id} are complete");
        self.emit(EngineEvent::PoolsComplete { division_id: division_id.to_owned() }).await;

        let format = match store.division(division_id).await {
            Ok(division) => division.map(|d| d.format).unwrap_or_default(),
            Err(e) => {
                error!("loading division {division_id}: {e}");
                return;
            }
        };
        if !format.seeds_from_pools() {
            debug!("division {division_id} does not seed brackets from pools");
            return;
        }

        let digest = match self
            .with_retries("pool results digest", || pool_results_digest(store, division_id))
            .await
        {
            Ok(digest) => digest,
            Err(e) => {
                error!("reading pool results of {division_id}: {e}");
                return;
            }
        };
        if locked(&self.seeded).insert(division_id.to_owned(), digest) == Some(digest) {
            debug!("division {division_id} already seeded from these results");
            return;
        }

        match self
            .with_retries("auto-seeding", || auto_seed_brackets(store, division_id))
            .await
        {
            Ok(report) => {
                bump(&self.counters.seeding_runs);
                self.emit(EngineEvent::Seeded(report)).await;
            }
            Err(e) => {
                locked(&self.seeded).remove(division_id);
                error!("auto-seeding {division_id} failed: {e}");
            }
        }
    }
}

/// A worker task draining one game's notifications in arrival order.
struct GameQueue {
    tx: mpsc::UnboundedSender<Game>,
    pending: Arc<AtomicUsize>,
}

impl GameQueue {
    fn spawn<S: Store, C: CacheInvalidator>(orchestrator: Arc<CompletionOrchestrator<S, C>>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Game>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(game) = rx.recv().await {
                orchestrator.on_game_changed(game).await;
                worker_pending.fetch_sub(1, Ordering::AcqRel);
            }
        });
        Self { tx, pending }
    }

    fn push(&self, game: Game) -> Result<(), Game> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(game).map_err(|mpsc::error::SendError(game)| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            game
        })
    }

    fn is_idle(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }
}

fn sweep_period(settings: &EngineSettings) -> Duration {
    settings.ledger_ttl.clamp(Duration::from_secs(1), Duration::from_secs(10 * 60))
}

/// Feed every notification from `changes` to the orchestrator. Snapshots of
/// one game are handled in the order they were published; different games
/// run concurrently. Expired bookkeeping is swept periodically.
pub fn spawn_listener<S: Store, C: CacheInvalidator>(
    orchestrator: Arc<CompletionOrchestrator<S, C>>,
    mut changes: broadcast::Receiver<Game>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut queues: HashMap<GameId, GameQueue> = HashMap::new();
        let mut sweep = tokio::time::interval(sweep_period(orchestrator.settings()));
        // The first tick is immediate and there is nothing to sweep yet.
        sweep.tick().await;

        loop {
            tokio::select! {
                received = changes.recv() => match received {
                    Ok(game) => dispatch(&orchestrator, &mut queues, game),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("change stream lagged, {missed} notifications dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!("change stream closed");
                        break;
                    }
                },
                _ = sweep.tick() => {
                    queues.retain(|_, queue| !queue.is_idle());
                    let evicted = orchestrator.evict_expired();
                    if evicted > 0 {
                        debug!("swept {evicted} expired entries, {} game queues busy", queues.len());
                    }
                }
            }
        }
    })
}

fn dispatch<S: Store, C: CacheInvalidator>(
    orchestrator: &Arc<CompletionOrchestrator<S, C>>,
    queues: &mut HashMap<GameId, GameQueue>,
    game: Game,
) {
    let id = game.id.clone();
    let queue = queues
        .entry(id.clone())
        .or_insert_with(|| GameQueue::spawn(Arc::clone(orchestrator)));
    if let Err(game) = queue.push(game) {
        warn!("worker for {id} stopped, starting another");
        let fresh = GameQueue::spawn(Arc::clone(orchestrator));
        if fresh.push(game).is_err() {
            error!("dropping notification for {id}");
        }
        queues.insert(id, fresh);
    }
}
