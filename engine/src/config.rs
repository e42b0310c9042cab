//! Tournament configuration input and the configurator that validates it and
//! writes pools, brackets and their generated games to the store.
//!
//! Every operation validates completely before writing, so a rejected
//! configuration leaves the store untouched.

use crate::graph::AdvancementGraph;
use crate::schedule::{
    GameSkeleton, first_round_pairs, generate_bracket_games, generate_pool_games, seed_slot,
    validate_bracket_size, validate_pool_teams,
};
use crate::store::{GameQuery, Store, require_game};
use crate::{
    Advance, Bracket, BracketRound, Division, DivisionFormat, EngineError, EngineResult, Game,
    GameStatus, Outcome, Pool, Seed, SeedingSource,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub divisions: Vec<DivisionConfig>,
}

impl TournamentConfig {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidConfiguration(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub format: DivisionFormat,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub brackets: Vec<BracketConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub id: String,
    pub name: String,
    pub teams: Vec<String>,
    #[serde(default)]
    pub advancement_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketConfig {
    pub id: String,
    pub name: String,
    pub size: u32,
    #[serde(default)]
    pub seeding_source: SeedingSource,
    /// Missing trailing seeds are open.
    #[serde(default)]
    pub seeds: Vec<SeedConfig>,
    #[serde(default)]
    pub source_pools: Vec<String>,
    #[serde(default)]
    pub third_place: bool,
}

/// A seed as written in JSON: `"Owls"`, `{"pool": "pa", "rank": 1}` or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedConfig {
    Team(String),
    FromPool { pool: String, rank: u32 },
    Open,
}

impl From<&SeedConfig> for Seed {
    fn from(config: &SeedConfig) -> Self {
        match config {
            SeedConfig::Team(name) => Seed::Team { name: name.clone() },
            SeedConfig::FromPool { pool, rank } => {
                Seed::FromPool { pool_id: pool.clone(), rank: *rank, team: None }
            }
            SeedConfig::Open => Seed::Open,
        }
    }
}

impl BracketConfig {
    pub fn seeds(&self) -> EngineResult<Vec<Seed>> {
        if self.seeds.len() > self.size as usize {
            return Err(EngineError::InvalidConfiguration(format!(
                "bracket {} lists {} seeds for {} positions",
                self.id,
                self.seeds.len(),
                self.size
            )));
        }
        let mut seeds: Vec<Seed> = self.seeds.iter().map(Seed::from).collect();
        seeds.resize(self.size as usize, Seed::Open);
        Ok(seeds)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub divisions: usize,
    pub pools: usize,
    pub brackets: usize,
    pub games: usize,
}

// ---------------------------------------------------------------------------
// Configurator
// ---------------------------------------------------------------------------

pub struct Configurator<S: Store> {
    store: Arc<S>,
}

struct PlannedPool {
    pool: Pool,
    games: Vec<GameSkeleton>,
}

struct PlannedBracket {
    bracket: Bracket,
    games: Vec<GameSkeleton>,
}

fn check_unique<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> EngineResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(EngineError::InvalidConfiguration(format!("{kind} id is empty")));
        }
        if !seen.insert(id) {
            return Err(EngineError::InvalidConfiguration(format!("duplicate {kind} id {id}")));
        }
    }
    Ok(())
}

fn plan_pool(tournament_id: &str, division_id: &str, config: &PoolConfig) -> EngineResult<PlannedPool> {
    let games = generate_pool_games(&config.id, &config.teams)?;
    if config.advancement_count == Some(0) {
        return Err(EngineError::InvalidConfiguration(format!(
            "pool {} advances no teams",
            config.id
        )));
    }
    Ok(PlannedPool {
        pool: Pool {
            id: config.id.clone(),
            tournament_id: tournament_id.to_owned(),
            division_id: division_id.to_owned(),
            name: config.name.clone(),
            teams: config.teams.clone(),
            advancement_count: config.advancement_count,
        },
        games,
    })
}

fn plan_bracket(
    tournament_id: &str,
    division_id: &str,
    config: &BracketConfig,
) -> EngineResult<PlannedBracket> {
    validate_bracket_size(config.size)?;
    let seeds = config.seeds()?;
    let manual: Vec<&str> = seeds.iter().filter(|s| s.is_manual()).filter_map(Seed::team_name).collect();
    let mut seen = HashSet::new();
    if let Some(dupe) = manual.iter().find(|t| !seen.insert(**t)) {
        return Err(EngineError::InvalidConfiguration(format!(
            "{dupe} is seeded twice in bracket {}",
            config.id
        )));
    }
    let games = generate_bracket_games(&config.id, config.size, &seeds, config.third_place)?;
    Ok(PlannedBracket {
        bracket: Bracket {
            id: config.id.clone(),
            tournament_id: tournament_id.to_owned(),
            division_id: division_id.to_owned(),
            name: config.name.clone(),
            size: config.size,
            seeding_source: config.seeding_source,
            seeds,
            source_pools: config.source_pools.clone(),
            third_place: config.third_place,
        },
        games,
    })
}

impl<S: Store> Configurator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Validate the whole tournament, then write it.
    pub async fn apply(&self, config: &TournamentConfig) -> EngineResult<ApplyReport> {
        check_unique("division", config.divisions.iter().map(|d| d.id.as_str()))?;
        let divisions = config.divisions.iter();
        check_unique("pool", divisions.clone().flat_map(|d| d.pools.iter().map(|p| p.id.as_str())))?;
        check_unique(
            "bracket",
            divisions.flat_map(|d| d.brackets.iter().map(|b| b.id.as_str())),
        )?;

        let mut planned = Vec::with_capacity(config.divisions.len());
        for division in &config.divisions {
            let pools = division
                .pools
                .iter()
                .map(|p| plan_pool(&config.id, &division.id, p))
                .collect::<EngineResult<Vec<_>>>()?;
            let pool_ids: HashSet<&str> = division.pools.iter().map(|p| p.id.as_str()).collect();
            let brackets = division
                .brackets
                .iter()
                .map(|b| plan_bracket(&config.id, &division.id, b))
                .collect::<EngineResult<Vec<_>>>()?;
            for planned_bracket in &brackets {
                let bracket = &planned_bracket.bracket;
                let referenced = bracket.seeds.iter().filter_map(|s| match s {
                    Seed::FromPool { pool_id, .. } => Some(pool_id),
                    _ => None,
                });
                if let Some(unknown) = bracket
                    .source_pools
                    .iter()
                    .chain(referenced)
                    .find(|id| !pool_ids.contains(id.as_str()))
                {
                    return Err(EngineError::InvalidConfiguration(format!(
                        "bracket {} draws from unknown pool {unknown}",
                        bracket.id
                    )));
                }
            }
            planned.push((division, pools, brackets));
        }

        let mut report = ApplyReport::default();
        for (division, pools, brackets) in planned {
            self.store
                .put_division(Division {
                    id: division.id.clone(),
                    tournament_id: config.id.clone(),
                    name: division.name.clone(),
                    format: division.format,
                })
                .await?;
            report.divisions += 1;
            for PlannedPool { pool, games } in pools {
                report.games += self.write_games(&config.id, &division.id, games).await?;
                self.store.put_pool(pool).await?;
                report.pools += 1;
            }
            for PlannedBracket { bracket, games } in brackets {
                report.games += self.write_games(&config.id, &division.id, games).await?;
                self.store.put_bracket(bracket).await?;
                report.brackets += 1;
            }
        }
        log::info!(
            "configured {}: {} divisions, {} pools, {} brackets, {} games",
            config.id,
            report.divisions,
            report.pools,
            report.brackets,
            report.games
        );
        Ok(report)
    }

    async fn write_games(
        &self,
        tournament_id: &str,
        division_id: &str,
        games: Vec<GameSkeleton>,
    ) -> EngineResult<usize> {
        let count = games.len();
        for skeleton in games {
            self.store.put_game(skeleton.into_game(tournament_id, division_id)).await?;
        }
        Ok(count)
    }

    pub async fn create_pool(
        &self,
        tournament_id: &str,
        division_id: &str,
        config: &PoolConfig,
    ) -> EngineResult<usize> {
        if self.store.pool(&config.id).await?.is_some() {
            return Err(EngineError::InvalidConfiguration(format!(
                "pool {} already exists",
                config.id
            )));
        }
        let PlannedPool { pool, games } = plan_pool(tournament_id, division_id, config)?;
        let count = self.write_games(tournament_id, division_id, games).await?;
        self.store.put_pool(pool).await?;
        Ok(count)
    }

    /// Replace a pool's team list and regenerate its round robin.
    pub async fn update_pool_teams(&self, pool_id: &str, teams: Vec<String>) -> EngineResult<usize> {
        let mut pool = self
            .store
            .pool(pool_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("pool {pool_id}")))?;
        validate_pool_teams(&teams)?;
        let games = generate_pool_games(pool_id, &teams)?;

        let old = self.store.query_games(GameQuery::Pool(pool_id.to_owned())).await?;
        if let Some(started) = old.iter().find(|g| g.status != GameStatus::Scheduled) {
            log::warn!("regenerating {pool_id} discards {} which is {}", started.id, started.status.label());
        }
        let doomed: HashSet<&str> = old.iter().map(|g| g.id.as_str()).collect();
        for game in &old {
            for mut feeder in self.store.query_games(GameQuery::FeedsInto(game.id.clone())).await? {
                if doomed.contains(feeder.id.as_str()) {
                    continue;
                }
                log::warn!("dropping edge from {} into regenerated {}", feeder.id, game.id);
                feeder.advances.retain(|a| a.to != game.id);
                self.store.put_game(feeder).await?;
            }
        }
        for game in &old {
            self.store.delete_game(&game.id).await?;
        }
        let count = self.write_games(&pool.tournament_id, &pool.division_id, games).await?;
        pool.teams = teams;
        log::info!("pool {pool_id} now has {} teams and {count} games", pool.teams.len());
        self.store.put_pool(pool).await?;
        Ok(count)
    }

    pub async fn create_bracket(
        &self,
        tournament_id: &str,
        division_id: &str,
        config: &BracketConfig,
    ) -> EngineResult<usize> {
        if self.store.bracket(&config.id).await?.is_some() {
            return Err(EngineError::InvalidConfiguration(format!(
                "bracket {} already exists",
                config.id
            )));
        }
        let PlannedBracket { bracket, games } = plan_bracket(tournament_id, division_id, config)?;
        let count = self.write_games(tournament_id, division_id, games).await?;
        self.store.put_bracket(bracket).await?;
        Ok(count)
    }

    /// Set seed `seed_number` (1-based) and patch its Round 1 game.
    pub async fn set_seed(&self, bracket_id: &str, seed_number: u32, seed: Seed) -> EngineResult<()> {
        let mut bracket = self
            .store
            .bracket(bracket_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("bracket {bracket_id}")))?;
        if seed_number == 0 || seed_number > bracket.size {
            return Err(EngineError::InvalidConfiguration(format!(
                "bracket {bracket_id} has seeds 1-{}, got {seed_number}",
                bracket.size
            )));
        }
        if let Seed::FromPool { pool_id, rank, .. } = &seed {
            let pools = self.store.pools_in_division(&bracket.division_id).await?;
            if !pools.iter().any(|p| p.id == *pool_id) {
                return Err(EngineError::InvalidConfiguration(format!(
                    "bracket {bracket_id} draws from unknown pool {pool_id}"
                )));
            }
            if *rank == 0 {
                return Err(EngineError::InvalidConfiguration("pool ranks start at 1".into()));
            }
        }
        if let Some(name) = seed.team_name()
            && let Some(taken) = bracket
                .seeds
                .iter()
                .enumerate()
                .find(|(i, s)| *i as u32 + 1 != seed_number && s.team_name() == Some(name))
        {
            return Err(EngineError::InvalidConfiguration(format!(
                "{name} is already seed {} of {bracket_id}",
                taken.0 + 1
            )));
        }

        let position = first_round_pairs(bracket.size)
            .iter()
            .position(|&(top, bottom)| top == seed_number || bottom == seed_number);
        bracket.seeds[seed_number as usize - 1] = seed;
        let slot = seed_slot(&bracket.seeds, seed_number);

        let games = self.store.query_games(GameQuery::Bracket(bracket_id.to_owned())).await?;
        let opener = games.into_iter().find(|g| {
            g.bracket.as_ref().is_some_and(|b| {
                b.round_number == 1
                    && b.round != BracketRound::ThirdPlace
                    && Some(b.position as usize) == position
            })
        });
        if let Some(mut game) = opener {
            if game.status != GameStatus::Scheduled {
                return Err(EngineError::InvalidConfiguration(format!(
                    "{} is already {}",
                    game.id,
                    game.status.label()
                )));
            }
            let top = first_round_pairs(bracket.size)
                .get(position.unwrap_or_default())
                .map(|&(top, _)| top);
            if top == Some(seed_number) {
                game.slot_a = slot;
            } else {
                game.slot_b = slot;
            }
            self.store.put_game(game).await?;
        }
        self.store.put_bracket(bracket).await
    }

    // -----------------------------------------------------------------------
    // Advancement edits
    // -----------------------------------------------------------------------

    /// The advancement graph around `from` and `targets`: those games plus
    /// every game upstream of them, whatever division it belongs to.
    async fn graph_around(&self, from: &Game, targets: &[&str]) -> EngineResult<AdvancementGraph> {
        let mut games = vec![from.clone()];
        let mut seen: HashSet<String> = HashSet::from([from.id.clone()]);
        for id in targets {
            if seen.insert(id.to_string()) {
                games.push(require_game(self.store.as_ref(), id).await?);
            }
        }

        let mut queue: VecDeque<String> = seen.iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            for feeder in self.store.query_games(GameQuery::FeedsInto(id)).await? {
                if seen.insert(feeder.id.clone()) {
                    queue.push_back(feeder.id.clone());
                    games.push(feeder);
                }
            }
        }
        Ok(AdvancementGraph::from_games(&games))
    }

    /// Send the `outcome` team of `from` into `to`. Returns whether anything changed.
    pub async fn link_games(&self, from: &str, outcome: Outcome, to: &str) -> EngineResult<bool> {
        let mut game = require_game(self.store.as_ref(), from).await?;
        let mut graph = self.graph_around(&game, &[to]).await?;
        if !graph.link(from, to, outcome)? {
            return Ok(false);
        }
        game.advances = graph.advances_of(from);
        log::info!("{} of {from} now advances to {to}", outcome.label());
        self.store.put_game(game).await?;
        Ok(true)
    }

    pub async fn unlink_games(&self, from: &str, to: &str) -> EngineResult<usize> {
        let mut game = require_game(self.store.as_ref(), from).await?;
        let before = game.advances.len();
        game.advances.retain(|a| a.to != to);
        let removed = before - game.advances.len();
        if removed > 0 {
            self.store.put_game(game).await?;
        }
        Ok(removed)
    }

    /// Replace every outgoing edge of `from`. All-or-nothing.
    pub async fn set_advancement(&self, from: &str, advances: &[Advance]) -> EngineResult<()> {
        let mut game = require_game(self.store.as_ref(), from).await?;
        let targets: Vec<&str> = advances.iter().map(|a| a.to.as_str()).collect();
        let mut graph = self.graph_around(&game, &targets).await?;
        graph.replace_advances(from, advances)?;
        game.advances = graph.advances_of(from);
        self.store.put_game(game).await
    }

    // -----------------------------------------------------------------------
    // Scorekeeping
    // -----------------------------------------------------------------------

    /// Move a game to `status`, optionally recording scores on the way.
    pub async fn update_game(
        &self,
        game_id: &str,
        status: GameStatus,
        scores: Option<(u32, u32)>,
    ) -> EngineResult<Game> {
        let mut game = require_game(self.store.as_ref(), game_id).await?;
        if !game.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                game_id: game_id.to_owned(),
                from: game.status,
                to: status,
            });
        }
        if status == GameStatus::Completed && (game.team_a().is_none() || game.team_b().is_none()) {
            return Err(EngineError::NoValidWinner { game_id: game_id.to_owned() });
        }
        if let Some((a, b)) = scores {
            game.score_a = a;
            game.score_b = b;
        }
        if status == GameStatus::InProgress && game.start_time.is_none() {
            game.start_time = Some(Utc::now());
        }
        game.status = status;
        self.store.put_game(game.clone()).await?;
        Ok(game)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::Slot;

    const SAMPLE: &str = r#"{
        "id": "spring",
        "name": "Spring Classic",
        "divisions": [{
            "id": "u12",
            "name": "U12",
            "pools": [
                { "id": "pa", "name": "Pool A", "teams": ["Owls", "Hawks", "Crows", "Doves"], "advancement_count": 2 },
                { "id": "pb", "name": "Pool B", "teams": ["Bears", "Wolves", "Foxes"] }
            ],
            "brackets": [{
                "id": "gold",
                "name": "Gold",
                "size": 4,
                "seeding_source": "mixed",
                "seeds": ["Hosts", { "pool": "pa", "rank": 1 }, null],
                "source_pools": ["pa", "pb"],
                "third_place": true
            }]
        }]
    }"#;

    fn configurator() -> (Configurator<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Configurator::new(Arc::clone(&store)), store)
    }

    #[test]
    fn seeds_parse_from_json_shapes() {
        let config = TournamentConfig::from_json(SAMPLE).unwrap();
        let bracket = &config.divisions[0].brackets[0];
        assert_eq!(
            bracket.seeds().unwrap(),
            vec![
                Seed::Team { name: "Hosts".into() },
                Seed::FromPool { pool_id: "pa".into(), rank: 1, team: None },
                Seed::Open,
                Seed::Open,
            ]
        );
        assert_eq!(config.divisions[0].format, DivisionFormat::PoolsToBracket);
    }

    #[tokio::test]
    async fn apply_writes_pools_brackets_and_games() {
        let (configurator, store) = configurator();
        let config = TournamentConfig::from_json(SAMPLE).unwrap();
        let report = configurator.apply(&config).await.unwrap();
        // 6 + 3 pool games, 3 bracket games plus the 3rd place game.
        assert_eq!(report, ApplyReport { divisions: 1, pools: 2, brackets: 1, games: 13 });

        let opener = store.game("gold-g1").await.unwrap().unwrap();
        assert_eq!(opener.slot_a, Slot::team("Hosts"));
        assert_eq!(opener.slot_b, Slot::pending("Seed 4"));
        assert!(store.division("u12").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalid_config_writes_nothing() {
        let (configurator, store) = configurator();
        let mut config = TournamentConfig::from_json(SAMPLE).unwrap();
        config.divisions[0].brackets[0].size = 6;
        assert!(matches!(
            configurator.apply(&config).await,
            Err(EngineError::InvalidConfiguration(_))
        ));

        config.divisions[0].brackets[0].size = 4;
        config.divisions[0].pools[1].teams.push("Bears".into());
        assert!(configurator.apply(&config).await.is_err());
        assert!(store.snapshot().await.games.is_empty());
        assert!(store.snapshot().await.pools.is_empty());
    }

    #[tokio::test]
    async fn unknown_source_pool_is_rejected() {
        let (configurator, _) = configurator();
        let mut config = TournamentConfig::from_json(SAMPLE).unwrap();
        config.divisions[0].brackets[0].source_pools.push("pz".into());
        assert!(matches!(
            configurator.apply(&config).await,
            Err(EngineError::InvalidConfiguration(msg)) if msg.contains("pz")
        ));
    }

    #[tokio::test]
    async fn editing_teams_regenerates_the_round_robin() {
        let (configurator, store) = configurator();
        configurator.apply(&TournamentConfig::from_json(SAMPLE).unwrap()).await.unwrap();
        let teams: Vec<String> = ["Bears", "Wolves"].iter().map(|t| t.to_string()).collect();
        assert_eq!(configurator.update_pool_teams("pb", teams).await.unwrap(), 1);

        let games = store.query_games(GameQuery::Pool("pb".into())).await.unwrap();
        assert_eq!(games.len(), 1);
        assert!(games[0].involves("Bears") && games[0].involves("Wolves"));
        assert_eq!(store.pool("pb").await.unwrap().unwrap().teams.len(), 2);
    }

    #[tokio::test]
    async fn set_seed_patches_the_opening_game() {
        let (configurator, store) = configurator();
        configurator.apply(&TournamentConfig::from_json(SAMPLE).unwrap()).await.unwrap();
        configurator
            .set_seed("gold", 4, Seed::Team { name: "Guests".into() })
            .await
            .unwrap();
        let opener = store.game("gold-g1").await.unwrap().unwrap();
        assert_eq!(opener.slot_b, Slot::team("Guests"));

        let dupe = configurator.set_seed("gold", 3, Seed::Team { name: "Guests".into() }).await;
        assert!(matches!(dupe, Err(EngineError::InvalidConfiguration(_))));
        assert!(configurator.set_seed("gold", 9, Seed::Open).await.is_err());
    }

    #[tokio::test]
    async fn pool_seeds_must_name_a_pool_of_the_division() {
        let (configurator, store) = configurator();
        configurator.apply(&TournamentConfig::from_json(SAMPLE).unwrap()).await.unwrap();
        let before = store.bracket("gold").await.unwrap().unwrap();

        let unknown = Seed::FromPool { pool_id: "pz".into(), rank: 1, team: None };
        let err = configurator.set_seed("gold", 3, unknown).await;
        assert!(matches!(err, Err(EngineError::InvalidConfiguration(msg)) if msg.contains("pz")));
        let rank_zero = Seed::FromPool { pool_id: "pb".into(), rank: 0, team: None };
        assert!(configurator.set_seed("gold", 3, rank_zero).await.is_err());
        assert_eq!(store.bracket("gold").await.unwrap().unwrap(), before);

        let second_of_b = Seed::FromPool { pool_id: "pb".into(), rank: 2, team: None };
        configurator.set_seed("gold", 3, second_of_b.clone()).await.unwrap();
        assert_eq!(store.bracket("gold").await.unwrap().unwrap().seeds[2], second_of_b);
    }

    #[tokio::test]
    async fn regenerating_a_pool_drops_edges_into_its_old_games() {
        let (configurator, store) = configurator();
        configurator.apply(&TournamentConfig::from_json(SAMPLE).unwrap()).await.unwrap();
        configurator.link_games("pb-g1", Outcome::Loser, "pa-g1").await.unwrap();

        let teams: Vec<String> = ["Owls", "Hawks"].iter().map(|t| t.to_string()).collect();
        configurator.update_pool_teams("pa", teams).await.unwrap();

        assert!(store.game("pb-g1").await.unwrap().unwrap().advances.is_empty());
        let feeders = store.query_games(GameQuery::FeedsInto("pa-g1".into())).await.unwrap();
        assert!(feeders.is_empty());
    }

    #[tokio::test]
    async fn third_feed_is_rejected_without_touching_slots() {
        let (configurator, store) = configurator();
        configurator.apply(&TournamentConfig::from_json(SAMPLE).unwrap()).await.unwrap();
        let final_before = store.game("gold-g3").await.unwrap().unwrap();

        let err = configurator.link_games("pa-g1", Outcome::Winner, "gold-g3").await;
        assert_eq!(err, Err(EngineError::CapacityExceeded { target: "gold-g3".into() }));
        assert_eq!(store.game("gold-g3").await.unwrap().unwrap(), final_before);
        assert!(store.game("pa-g1").await.unwrap().unwrap().advances.is_empty());
    }

    #[tokio::test]
    async fn links_that_loop_back_are_rejected() {
        let (configurator, _) = configurator();
        configurator.apply(&TournamentConfig::from_json(SAMPLE).unwrap()).await.unwrap();
        let err = configurator.link_games("gold-g3", Outcome::Loser, "gold-g1").await;
        assert!(matches!(err, Err(EngineError::CycleDetected { .. })));
    }

    #[tokio::test]
    async fn link_and_unlink_persist_edges() {
        let (configurator, store) = configurator();
        configurator.apply(&TournamentConfig::from_json(SAMPLE).unwrap()).await.unwrap();
        assert!(configurator.link_games("pa-g1", Outcome::Loser, "pb-g1").await.unwrap());
        assert!(!configurator.link_games("pa-g1", Outcome::Loser, "pb-g1").await.unwrap());
        let game = store.game("pa-g1").await.unwrap().unwrap();
        assert_eq!(game.advances, vec![Advance::loser("pb-g1")]);

        assert_eq!(configurator.unlink_games("pa-g1", "pb-g1").await.unwrap(), 1);
        assert!(store.game("pa-g1").await.unwrap().unwrap().advances.is_empty());
    }

    #[tokio::test]
    async fn set_advancement_is_all_or_nothing() {
        let (configurator, store) = configurator();
        configurator.apply(&TournamentConfig::from_json(SAMPLE).unwrap()).await.unwrap();
        let err = configurator
            .set_advancement("pa-g1", &[Advance::winner("pb-g1"), Advance::loser("gold-g3")])
            .await;
        assert!(matches!(err, Err(EngineError::CapacityExceeded { .. })));
        assert!(store.game("pa-g1").await.unwrap().unwrap().advances.is_empty());

        configurator.set_advancement("pa-g1", &[Advance::winner("pb-g1")]).await.unwrap();
        assert_eq!(
            store.game("pa-g1").await.unwrap().unwrap().advances,
            vec![Advance::winner("pb-g1")]
        );
    }

    #[tokio::test]
    async fn status_edits_follow_the_lifecycle() {
        let (configurator, _) = configurator();
        configurator.apply(&TournamentConfig::from_json(SAMPLE).unwrap()).await.unwrap();
        configurator.update_game("pa-g1", GameStatus::Completed, Some((3, 1))).await.unwrap();
        let err = configurator.update_game("pa-g1", GameStatus::InProgress, None).await;
        assert!(matches!(err, Err(EngineError::InvalidTransition { .. })));

        let live = configurator.update_game("pa-g2", GameStatus::InProgress, None).await.unwrap();
        assert!(live.start_time.is_some());

        let pending = configurator.update_game("gold-g3", GameStatus::Completed, Some((1, 0))).await;
        assert!(matches!(pending, Err(EngineError::NoValidWinner { .. })));
    }
}
