//! Persistence and change-notification interface, plus an in-memory store.
//!
//! The engine never assumes a particular database: it reads and writes whole
//! records by id, queries games by a single field, and listens to a stream of
//! game snapshots. `MemoryStore` is the reference implementation used by the
//! desk binary and the tests.

use crate::{Bracket, Division, EngineError, EngineResult, Game, Pool};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{RwLock, broadcast};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Query-by-field for games.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameQuery {
    Division(String),
    Pool(String),
    Bracket(String),
    /// Games with an advancement edge into this game id.
    FeedsInto(String),
}

impl GameQuery {
    pub fn matches(&self, game: &Game) -> bool {
        match self {
            GameQuery::Division(id) => game.division_id == *id,
            GameQuery::Pool(id) => game.pool_id() == Some(id.as_str()),
            GameQuery::Bracket(id) => game.bracket_id() == Some(id.as_str()),
            GameQuery::FeedsInto(id) => game.advances.iter().any(|a| a.to == *id),
        }
    }
}

pub trait Store: Send + Sync + 'static {
    fn game(&self, id: &str) -> impl Future<Output = EngineResult<Option<Game>>> + Send;
    fn put_game(&self, game: Game) -> impl Future<Output = EngineResult<()>> + Send;
    fn delete_game(&self, id: &str) -> impl Future<Output = EngineResult<()>> + Send;
    fn query_games(&self, query: GameQuery) -> impl Future<Output = EngineResult<Vec<Game>>> + Send;

    fn pool(&self, id: &str) -> impl Future<Output = EngineResult<Option<Pool>>> + Send;
    fn put_pool(&self, pool: Pool) -> impl Future<Output = EngineResult<()>> + Send;
    fn pools_in_division(&self, division_id: &str) -> impl Future<Output = EngineResult<Vec<Pool>>> + Send;

    fn bracket(&self, id: &str) -> impl Future<Output = EngineResult<Option<Bracket>>> + Send;
    fn put_bracket(&self, bracket: Bracket) -> impl Future<Output = EngineResult<()>> + Send;
    fn brackets_in_division(
        &self,
        division_id: &str,
    ) -> impl Future<Output = EngineResult<Vec<Bracket>>> + Send;

    fn division(&self, id: &str) -> impl Future<Output = EngineResult<Option<Division>>> + Send;
    fn put_division(&self, division: Division) -> impl Future<Output = EngineResult<()>> + Send;

    /// Current state of every game whose record changes from now on.
    fn subscribe(&self) -> broadcast::Receiver<Game>;
}

/// Fetch a game that must exist.
pub async fn require_game<S: Store>(store: &S, id: &str) -> EngineResult<Game> {
    store
        .game(id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("game {id}")))
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Everything a `MemoryStore` holds. Ordered maps keep listings deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub divisions: BTreeMap<String, Division>,
    pub pools: BTreeMap<String, Pool>,
    pub brackets: BTreeMap<String, Bracket>,
    pub games: BTreeMap<String, Game>,
}

#[derive(Debug)]
pub struct MemoryStore {
    data: RwLock<Snapshot>,
    changes: broadcast::Sender<Game>,
    outage: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            data: RwLock::new(Snapshot::default()),
            changes,
            outage: AtomicU32::new(0),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `calls` store calls fail with `StoreUnavailable`.
    pub fn fail_next(&self, calls: u32) {
        self.outage.store(calls, Ordering::SeqCst);
    }

    fn check_available(&self) -> EngineResult<()> {
        let failed = self
            .outage
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(EngineError::StoreUnavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.data.read().await.clone()
    }

    pub async fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.data.read().await)
    }
}

impl Store for MemoryStore {
    async fn game(&self, id: &str) -> EngineResult<Option<Game>> {
        self.check_available()?;
        Ok(self.data.read().await.games.get(id).cloned())
    }

    async fn put_game(&self, game: Game) -> EngineResult<()> {
        self.check_available()?;
        let mut data = self.data.write().await;
        if data.games.get(&game.id) == Some(&game) {
            return Ok(());
        }
        data.games.insert(game.id.clone(), game.clone());
        drop(data);
        // No subscribers is fine.
        let _ = self.changes.send(game);
        Ok(())
    }

    async fn delete_game(&self, id: &str) -> EngineResult<()> {
        self.check_available()?;
        self.data.write().await.games.remove(id);
        Ok(())
    }

    async fn query_games(&self, query: GameQuery) -> EngineResult<Vec<Game>> {
        self.check_available()?;
        let data = self.data.read().await;
        Ok(data.games.values().filter(|g| query.matches(g)).cloned().collect())
    }

    async fn pool(&self, id: &str) -> EngineResult<Option<Pool>> {
        self.check_available()?;
        Ok(self.data.read().await.pools.get(id).cloned())
    }

    async fn put_pool(&self, pool: Pool) -> EngineResult<()> {
        self.check_available()?;
        self.data.write().await.pools.insert(pool.id.clone(), pool);
        Ok(())
    }

    async fn pools_in_division(&self, division_id: &str) -> EngineResult<Vec<Pool>> {
        self.check_available()?;
        let data = self.data.read().await;
        Ok(data.pools.values().filter(|p| p.division_id == division_id).cloned().collect())
    }

    async fn bracket(&self, id: &str) -> EngineResult<Option<Bracket>> {
        self.check_available()?;
        Ok(self.data.read().await.brackets.get(id).cloned())
    }

    async fn put_bracket(&self, bracket: Bracket) -> EngineResult<()> {
        self.check_available()?;
        self.data.write().await.brackets.insert(bracket.id.clone(), bracket);
        Ok(())
    }

    async fn brackets_in_division(&self, division_id: &str) -> EngineResult<Vec<Bracket>> {
        self.check_available()?;
        let data = self.data.read().await;
        Ok(data.brackets.values().filter(|b| b.division_id == division_id).cloned().collect())
    }

    async fn division(&self, id: &str) -> EngineResult<Option<Division>> {
        self.check_available()?;
        Ok(self.data.read().await.divisions.get(id).cloned())
    }

    async fn put_division(&self, division: Division) -> EngineResult<()> {
        self.check_available()?;
        self.data.write().await.divisions.insert(division.id.clone(), division);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Game> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GameStatus, Slot};

    fn game(id: &str, pool: Option<&str>) -> Game {
        Game {
            id: id.into(),
            tournament_id: "t".into(),
            division_id: "d1".into(),
            slot_a: Slot::team("A"),
            slot_b: Slot::team("B"),
            score_a: 0,
            score_b: 0,
            status: GameStatus::Scheduled,
            start_time: None,
            bracket: None,
            pool: pool.map(|p| crate::PoolPlacement { pool_id: p.into(), game_number: 1 }),
            advances: vec![],
        }
    }

    #[tokio::test]
    async fn put_then_query_by_field() {
        let store = MemoryStore::new();
        store.put_game(game("g1", Some("pa"))).await.unwrap();
        store.put_game(game("g2", Some("pb"))).await.unwrap();

        let pool_a = store.query_games(GameQuery::Pool("pa".into())).await.unwrap();
        assert_eq!(pool_a.len(), 1);
        assert_eq!(pool_a[0].id, "g1");
        let all = store.query_games(GameQuery::Division("d1".into())).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn feeders_are_found_by_target() {
        let store = MemoryStore::new();
        let mut feeder = game("g1", None);
        feeder.division_id = "other".into();
        feeder.advances = vec![crate::Advance::loser("g2")];
        store.put_game(feeder).await.unwrap();
        store.put_game(game("g2", None)).await.unwrap();

        let feeds = store.query_games(GameQuery::FeedsInto("g2".into())).await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].id, "g1");
        assert!(store.query_games(GameQuery::FeedsInto("g1".into())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn changes_are_broadcast_once_per_real_change() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        let mut g = game("g1", None);
        store.put_game(g.clone()).await.unwrap();
        store.put_game(g.clone()).await.unwrap();
        g.score_a = 3;
        store.put_game(g.clone()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().score_a, 0);
        assert_eq!(rx.recv().await.unwrap().score_a, 3);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn simulated_outage_fails_then_recovers() {
        let store = MemoryStore::new();
        store.fail_next(2);
        assert!(matches!(store.game("x").await, Err(EngineError::StoreUnavailable(_))));
        assert!(store.game("x").await.is_err());
        assert_eq!(store.game("x").await, Ok(None));
    }

    #[tokio::test]
    async fn require_game_reports_missing_ids() {
        let store = MemoryStore::new();
        assert!(matches!(require_game(&store, "nope").await, Err(EngineError::NotFound(_))));
    }
}
