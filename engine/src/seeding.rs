//! Pool-completion detection and automatic bracket seeding from pool results.

use crate::schedule::{first_round_pairs, seed_slot};
use crate::standings::{compute_standings, top_teams};
use crate::store::{GameQuery, Store};
use crate::{Bracket, BracketRound, EngineResult, GameId, GameStatus, Pool, Seed, Standing};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// True when the division has pool games and none of them is still open.
pub async fn check_pools_complete<S: Store>(store: &S, division_id: &str) -> EngineResult<bool> {
    let pools = store.pools_in_division(division_id).await?;
    if pools.is_empty() {
        log::debug!("division {division_id} has no pools");
        return Ok(false);
    }

    let mut total = 0;
    for pool in &pools {
        let games = store.query_games(GameQuery::Pool(pool.id.clone())).await?;
        if let Some(open) = games.iter().find(|g| g.status.is_open()) {
            log::debug!("pool {} not complete, {} is {}", pool.id, open.id, open.status.label());
            return Ok(false);
        }
        total += games.len();
    }
    Ok(total > 0)
}

pub async fn pool_standings<S: Store>(store: &S, pool: &Pool) -> EngineResult<Vec<Standing>> {
    let games = store.query_games(GameQuery::Pool(pool.id.clone())).await?;
    Ok(compute_standings(&games, &pool.teams))
}

/// Hash of everything seeding reads from a division's pools. Equal digests
/// mean a second seeding run would resolve the same seeds.
pub async fn pool_results_digest<S: Store>(store: &S, division_id: &str) -> EngineResult<u64> {
    let mut pools = store.pools_in_division(division_id).await?;
    pools.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hasher = DefaultHasher::new();
    for pool in &pools {
        pool.id.hash(&mut hasher);
        pool.teams.hash(&mut hasher);
        pool.advancement_count.hash(&mut hasher);
        let mut games = store.query_games(GameQuery::Pool(pool.id.clone())).await?;
        games.sort_by(|a, b| a.id.cmp(&b.id));
        for game in &games {
            game.id.hash(&mut hasher);
            game.status.hash(&mut hasher);
            (game.score_a, game.score_b).hash(&mut hasher);
            (game.team_a(), game.team_b()).hash(&mut hasher);
        }
    }
    Ok(hasher.finish())
}

// ---------------------------------------------------------------------------
// Seed resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSeeds {
    pub seeds: Vec<Seed>,
    /// 1-based seed numbers still without a team.
    pub unfilled: Vec<u32>,
    /// Qualifiers that did not fit into any open seed.
    pub unused: Vec<String>,
}

/// Resolve a bracket's seeds against pool qualifiers.
///
/// `qualifiers` maps pool id to that pool's qualifying teams in rank order.
/// Manual seeds are kept as they are. `FromPool` seeds take the team at their
/// rank. `Open` seeds are filled in seed order from `sources`, every pool's
/// first place before any second place, skipping teams already seeded.
pub fn resolve_seeds(
    seeds: &[Seed],
    sources: &[String],
    qualifiers: &HashMap<String, Vec<String>>,
) -> ResolvedSeeds {
    let mut used: HashSet<String> = seeds
        .iter()
        .filter(|s| s.is_manual())
        .filter_map(|s| s.team_name().map(str::to_owned))
        .collect();

    let mut resolved: Vec<Seed> = seeds
        .iter()
        .map(|seed| match seed {
            Seed::FromPool { pool_id, rank, .. } => {
                let team = qualifiers
                    .get(pool_id)
                    .and_then(|ranked| ranked.get((*rank as usize).saturating_sub(1)))
                    .filter(|_| *rank > 0)
                    .cloned();
                match &team {
                    Some(t) if !used.insert(t.clone()) => {
                        log::warn!("{t} (#{rank} in {pool_id}) is already seeded elsewhere");
                    }
                    None => log::warn!("no qualifier #{rank} in pool {pool_id}"),
                    _ => {}
                }
                Seed::FromPool { pool_id: pool_id.clone(), rank: *rank, team }
            }
            other => other.clone(),
        })
        .collect();

    let deepest = sources
        .iter()
        .filter_map(|id| qualifiers.get(id))
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    let mut queue = Vec::new();
    for rank in 0..deepest {
        for pool_id in sources {
            if let Some(team) = qualifiers.get(pool_id).and_then(|ranked| ranked.get(rank))
                && !used.contains(team)
            {
                queue.push((pool_id.clone(), rank as u32 + 1, team.clone()));
            }
        }
    }

    let mut queue = queue.into_iter();
    let mut unfilled = Vec::new();
    for (i, seed) in resolved.iter_mut().enumerate() {
        if *seed != Seed::Open {
            if seed.team_name().is_none() {
                unfilled.push(i as u32 + 1);
            }
            continue;
        }
        match queue.next() {
            Some((pool_id, rank, team)) => {
                *seed = Seed::FromPool { pool_id, rank, team: Some(team) };
            }
            None => unfilled.push(i as u32 + 1),
        }
    }

    ResolvedSeeds {
        seeds: resolved,
        unfilled,
        unused: queue.map(|(_, _, team)| team).collect(),
    }
}

// ---------------------------------------------------------------------------
// Auto-seeding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BracketSeeding {
    pub bracket_id: String,
    /// Seed numbers whose team changed in this run.
    pub resolved: Vec<(u32, String)>,
    pub patched_games: Vec<GameId>,
    /// Round 1 games left alone because they were already under way.
    pub skipped_games: Vec<GameId>,
    pub unfilled: Vec<u32>,
    pub unused: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedingReport {
    pub division_id: String,
    pub brackets: Vec<BracketSeeding>,
}

impl SeedingReport {
    pub fn is_empty(&self) -> bool {
        self.brackets.is_empty()
    }

    pub fn seeds_resolved(&self) -> usize {
        self.brackets.iter().map(|b| b.resolved.len()).sum()
    }

    pub fn games_patched(&self) -> usize {
        self.brackets.iter().map(|b| b.patched_games.len()).sum()
    }
}

/// Seed every pool-fed bracket of the division from final pool standings and
/// patch the Round 1 games that reference the seeds. Safe to re-run.
pub async fn auto_seed_brackets<S: Store>(
    store: &S,
    division_id: &str,
) -> EngineResult<SeedingReport> {
    let mut report = SeedingReport { division_id: division_id.to_owned(), brackets: Vec::new() };
    let brackets = store.brackets_in_division(division_id).await?;
    if brackets.is_empty() {
        log::info!("division {division_id} has no brackets to seed");
        return Ok(report);
    }

    let division_pools: Vec<String> = store
        .pools_in_division(division_id)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    let mut qualifiers: HashMap<String, Vec<String>> = HashMap::new();

    for bracket in brackets {
        if !bracket.seeding_source.uses_pools() {
            log::debug!("bracket {} is seeded manually", bracket.id);
            continue;
        }
        let sources = if bracket.source_pools.is_empty() {
            division_pools.clone()
        } else {
            bracket.source_pools.clone()
        };
        let referenced = bracket.seeds.iter().filter_map(|s| match s {
            Seed::FromPool { pool_id, .. } => Some(pool_id),
            _ => None,
        });
        let needed: Vec<String> = sources.iter().chain(referenced).cloned().collect();
        for pool_id in needed {
            if qualifiers.contains_key(&pool_id) {
                continue;
            }
            let Some(pool) = store.pool(&pool_id).await? else {
                log::warn!("bracket {} draws from unknown pool {pool_id}", bracket.id);
                continue;
            };
            let standings = pool_standings(store, &pool).await?;
            qualifiers.insert(pool_id, top_teams(&standings, pool.qualifier_count()));
        }

        report.brackets.push(seed_bracket(store, bracket, &sources, &qualifiers).await?);
    }

    log::info!(
        "division {division_id}: resolved {} seeds, patched {} games",
        report.seeds_resolved(),
        report.games_patched()
    );
    Ok(report)
}

async fn seed_bracket<S: Store>(
    store: &S,
    mut bracket: Bracket,
    sources: &[String],
    qualifiers: &HashMap<String, Vec<String>>,
) -> EngineResult<BracketSeeding> {
    let resolution = resolve_seeds(&bracket.seeds, sources, qualifiers);
    let mut seeding = BracketSeeding {
        bracket_id: bracket.id.clone(),
        unfilled: resolution.unfilled,
        unused: resolution.unused,
        ..Default::default()
    };
    if !seeding.unfilled.is_empty() {
        log::warn!("bracket {} has open seeds {:?}", bracket.id, seeding.unfilled);
    }
    if !seeding.unused.is_empty() {
        log::warn!("bracket {} has no room for {:?}", bracket.id, seeding.unused);
    }

    for (i, (old, new)) in bracket.seeds.iter().zip(&resolution.seeds).enumerate() {
        if let Some(team) = new.team_name()
            && old.team_name() != Some(team)
        {
            seeding.resolved.push((i as u32 + 1, team.to_owned()));
        }
    }

    let games = store.query_games(GameQuery::Bracket(bracket.id.clone())).await?;
    let pairs = first_round_pairs(bracket.size);
    for mut game in games {
        let Some((round_number, round, position)) =
            game.bracket.as_ref().map(|b| (b.round_number, b.round, b.position))
        else {
            continue;
        };
        if round_number != 1 || round == BracketRound::ThirdPlace {
            continue;
        }
        let Some(&(top, bottom)) = pairs.get(position as usize) else {
            continue;
        };
        let slot_a = seed_slot(&resolution.seeds, top);
        let slot_b = seed_slot(&resolution.seeds, bottom);
        if game.slot_a == slot_a && game.slot_b == slot_b {
            continue;
        }
        if game.status != GameStatus::Scheduled {
            log::warn!("not reseeding {}, it is {}", game.id, game.status.label());
            seeding.skipped_games.push(game.id);
            continue;
        }
        game.slot_a = slot_a;
        game.slot_b = slot_b;
        seeding.patched_games.push(game.id.clone());
        store.put_game(game).await?;
    }

    if bracket.seeds != resolution.seeds {
        bracket.seeds = resolution.seeds;
        store.put_bracket(bracket).await?;
    }
    Ok(seeding)
}
