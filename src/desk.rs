use crate::commands::HELP;
use crate::render;
use crate::state::messages::DeskCommand;
use anyhow::{Context, anyhow};
use bracket_engine::cache::{CacheInvalidator, CacheKey, StandingsCache};
use bracket_engine::config::Configurator;
use bracket_engine::orchestrator::CompletionOrchestrator;
use bracket_engine::seeding::pool_standings;
use bracket_engine::standings::division_standings;
use bracket_engine::store::{GameQuery, MemoryStore, Store};
use bracket_engine::{GameStatus, Seed};
use std::path::PathBuf;
use std::sync::Arc;

pub type DeskOrchestrator = CompletionOrchestrator<MemoryStore, StandingsCache>;

/// What the operator drives: the store, its configurator and the standings cache.
pub struct Desk {
    store: Arc<MemoryStore>,
    cache: Arc<StandingsCache>,
    configurator: Configurator<MemoryStore>,
    orchestrator: Arc<DeskOrchestrator>,
    snapshot_path: PathBuf,
}

impl Desk {
    pub fn new(
        store: Arc<MemoryStore>,
        cache: Arc<StandingsCache>,
        orchestrator: Arc<DeskOrchestrator>,
        snapshot_path: PathBuf,
    ) -> Self {
        Self {
            configurator: Configurator::new(Arc::clone(&store)),
            store,
            cache,
            orchestrator,
            snapshot_path,
        }
    }

    pub fn configurator(&self) -> &Configurator<MemoryStore> {
        &self.configurator
    }

    /// Run one command and return the text to print.
    pub async fn execute(&self, command: DeskCommand) -> anyhow::Result<String> {
        match command {
            DeskCommand::Games { scope } => self.games(scope).await,
            DeskCommand::Start { game } => {
                let game = self.configurator.update_game(&game, GameStatus::InProgress, None).await?;
                Ok(format!("{} is under way", game.id))
            }
            DeskCommand::Score { game, score_a, score_b } => {
                let current = self
                    .store
                    .game(&game)
                    .await?
                    .ok_or_else(|| anyhow!("no game {game}"))?;
                let status = match current.status {
                    GameStatus::Completed => GameStatus::Completed,
                    _ => GameStatus::InProgress,
                };
                let game = self
                    .configurator
                    .update_game(&game, status, Some((score_a, score_b)))
                    .await?;
                Ok(format!("{} {}-{} ({})", game.id, game.score_a, game.score_b, game.status.label()))
            }
            DeskCommand::Final { game, score_a, score_b } => {
                let game = self
                    .configurator
                    .update_game(&game, GameStatus::Completed, Some((score_a, score_b)))
                    .await?;
                Ok(format!("{} final {}-{}", game.id, game.score_a, game.score_b))
            }
            DeskCommand::Cancel { game } => {
                let game = self.configurator.update_game(&game, GameStatus::Cancelled, None).await?;
                Ok(format!("{} cancelled", game.id))
            }
            DeskCommand::Standings { scope } => self.standings(&scope).await,
            DeskCommand::Link { from, outcome, to } => {
                let changed = self.configurator.link_games(&from, outcome, &to).await?;
                Ok(if changed {
                    format!("{} of {from} advances to {to}", outcome.label())
                } else {
                    "already linked".to_string()
                })
            }
            DeskCommand::Unlink { from, to } => {
                let removed = self.configurator.unlink_games(&from, &to).await?;
                Ok(format!("removed {removed} edge(s) from {from} to {to}"))
            }
            DeskCommand::Seed { bracket, position, team } => {
                let seed = match &team {
                    Some(name) => Seed::Team { name: name.clone() },
                    None => Seed::Open,
                };
                self.configurator.set_seed(&bracket, position, seed).await?;
                Ok(format!(
                    "{bracket} seed {position}: {}",
                    team.as_deref().unwrap_or("open")
                ))
            }
            DeskCommand::Teams { pool, teams } => {
                let before = self
                    .store
                    .pool(&pool)
                    .await?
                    .ok_or_else(|| anyhow!("no pool called {pool}"))?;
                let mut touched = teams.clone();
                touched.extend(before.teams);
                let games = self.configurator.update_pool_teams(&pool, teams).await?;

                self.cache.invalidate(&CacheKey::Pool(pool.clone()));
                self.cache.invalidate(&CacheKey::Division(before.division_id));
                for team in touched {
                    self.cache.invalidate(&CacheKey::Team(team));
                }
                Ok(format!("{pool} regenerated with {games} games"))
            }
            DeskCommand::Snapshot => {
                let json = self.store.to_json().await?;
                tokio::fs::write(&self.snapshot_path, json)
                    .await
                    .with_context(|| format!("writing {}", self.snapshot_path.display()))?;
                Ok(format!("wrote {}", self.snapshot_path.display()))
            }
            DeskCommand::Stats => Ok(render::stats_line(&self.orchestrator.stats())),
            DeskCommand::Help => Ok(HELP.to_string()),
            DeskCommand::Quit => Ok(String::new()),
        }
    }

    async fn games(&self, scope: Option<String>) -> anyhow::Result<String> {
        let games = match scope {
            None => self.store.snapshot().await.games.into_values().collect(),
            Some(id) => {
                let query = if self.store.pool(&id).await?.is_some() {
                    GameQuery::Pool(id)
                } else if self.store.bracket(&id).await?.is_some() {
                    GameQuery::Bracket(id)
                } else if self.store.division(&id).await?.is_some() {
                    GameQuery::Division(id)
                } else {
                    return Err(anyhow!("no pool, bracket or division called {id}"));
                };
                let mut games = self.store.query_games(query).await?;
                games.sort_by_key(|g| g.display_number());
                games
            }
        };
        Ok(render::games_table(&games))
    }

    async fn standings(&self, scope: &str) -> anyhow::Result<String> {
        let store = self.store.as_ref();
        if let Some(pool) = store.pool(scope).await? {
            let table = self
                .cache
                .get_or_load(CacheKey::Pool(pool.id.clone()), || pool_standings(store, &pool))
                .await?;
            return Ok(render::standings_table(&pool.name, &table));
        }
        if let Some(division) = store.division(scope).await? {
            let games = store.query_games(GameQuery::Division(division.id.clone())).await?;
            let table = self
                .cache
                .get_or_compute(CacheKey::Division(division.id.clone()), || division_standings(&games));
            return Ok(render::standings_table(&division.name, &table));
        }
        Err(anyhow!("no pool or division called {scope}"))
    }
}
