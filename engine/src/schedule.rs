//! Graph Builder: the static shape of a pool's round robin and a bracket's
//! single-elimination tree.

use crate::{
    Advance, BracketPlacement, BracketRound, EngineError, EngineResult, Game, GameId, GameStatus,
    Outcome, PoolPlacement, Seed, Slot,
};
use std::collections::HashSet;

pub const MIN_POOL_TEAMS: usize = 2;
pub const MAX_POOL_TEAMS: usize = 16;
pub const BRACKET_SIZES: [u32; 4] = [4, 8, 16, 32];

/// A game as produced by the builder, before it is bound to a tournament/division.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSkeleton {
    pub id: GameId,
    pub slot_a: Slot,
    pub slot_b: Slot,
    pub bracket: Option<BracketPlacement>,
    pub pool: Option<PoolPlacement>,
    pub advances: Vec<Advance>,
}

impl GameSkeleton {
    pub fn into_game(self, tournament_id: &str, division_id: &str) -> Game {
        Game {
            id: self.id,
            tournament_id: tournament_id.to_owned(),
            division_id: division_id.to_owned(),
            slot_a: self.slot_a,
            slot_b: self.slot_b,
            score_a: 0,
            score_b: 0,
            status: GameStatus::Scheduled,
            start_time: None,
            bracket: self.bracket,
            pool: self.pool,
            advances: self.advances,
        }
    }
}

pub fn pool_game_id(pool_id: &str, game_number: u32) -> GameId {
    format!("{pool_id}-g{game_number}")
}

pub fn bracket_game_id(bracket_id: &str, game_number: u32) -> GameId {
    format!("{bracket_id}-g{game_number}")
}

// ---------------------------------------------------------------------------
// Pools
// ---------------------------------------------------------------------------

pub fn validate_pool_teams(teams: &[String]) -> EngineResult<()> {
    if teams.len() < MIN_POOL_TEAMS || teams.len() > MAX_POOL_TEAMS {
        return Err(EngineError::InvalidConfiguration(format!(
            "a pool needs {MIN_POOL_TEAMS}-{MAX_POOL_TEAMS} teams, got {}",
            teams.len()
        )));
    }
    let mut seen = HashSet::new();
    for team in teams {
        if team.trim().is_empty() {
            return Err(EngineError::InvalidConfiguration("team names cannot be blank".into()));
        }
        if !seen.insert(team.as_str()) {
            return Err(EngineError::InvalidConfiguration(format!(
                "team {team} is listed twice"
            )));
        }
    }
    Ok(())
}

/// Full round robin: one game per unordered pair, numbered from 1.
///
/// Games are laid out round by round with the circle method, so a team does
/// not appear twice before everyone has played once in that round. The team
/// listed first in the pool always takes slot A.
pub fn generate_pool_games(pool_id: &str, teams: &[String]) -> EngineResult<Vec<GameSkeleton>> {
    validate_pool_teams(teams)?;

    let mut ring: Vec<Option<usize>> = (0..teams.len()).map(Some).collect();
    if ring.len() % 2 == 1 {
        ring.push(None); // bye
    }
    let n = ring.len();

    let mut games = Vec::with_capacity(teams.len() * (teams.len() - 1) / 2);
    for _ in 0..n - 1 {
        for i in 0..n / 2 {
            let (Some(x), Some(y)) = (ring[i], ring[n - 1 - i]) else {
                continue;
            };
            let (a, b) = if x < y { (x, y) } else { (y, x) };
            let game_number = games.len() as u32 + 1;
            games.push(GameSkeleton {
                id: pool_game_id(pool_id, game_number),
                slot_a: Slot::team(teams[a].clone()),
                slot_b: Slot::team(teams[b].clone()),
                bracket: None,
                pool: Some(PoolPlacement { pool_id: pool_id.to_owned(), game_number }),
                advances: Vec::new(),
            });
        }
        // Keep the first entry fixed and rotate the rest one step.
        let last = ring.remove(n - 1);
        ring.insert(1, last);
    }
    Ok(games)
}

// ---------------------------------------------------------------------------
// Brackets
// ---------------------------------------------------------------------------

pub fn validate_bracket_size(size: u32) -> EngineResult<()> {
    if BRACKET_SIZES.contains(&size) {
        Ok(())
    } else {
        Err(EngineError::InvalidConfiguration(format!(
            "bracket size must be one of {BRACKET_SIZES:?}, got {size}"
        )))
    }
}

pub fn round_count(size: u32) -> u32 {
    size.trailing_zeros()
}

/// Seed numbers in standard bracket order, e.g. size 8 -> 1 8 4 5 2 7 3 6.
/// Consecutive pairs are the Round 1 matchups; top seeds meet as late as possible.
pub fn seed_order(size: u32) -> Vec<u32> {
    let mut order = vec![1];
    let mut width = 1;
    while width < size {
        width *= 2;
        order = order.iter().flat_map(|&s| [s, width + 1 - s]).collect();
    }
    order
}

/// Round 1 seed pairs by position.
pub fn first_round_pairs(size: u32) -> Vec<(u32, u32)> {
    seed_order(size).chunks_exact(2).map(|c| (c[0], c[1])).collect()
}

/// Slot for seed number `seed` (1-based) given the bracket's seed list.
pub fn seed_slot(seeds: &[Seed], seed: u32) -> Slot {
    seeds
        .get(seed as usize - 1)
        .and_then(|s| s.team_name())
        .map(Slot::team)
        .unwrap_or_else(|| Slot::pending(format!("Seed {seed}")))
}

/// Single-elimination tree of `size - 1` games (plus an optional 3rd place game).
pub fn generate_bracket_games(
    bracket_id: &str,
    size: u32,
    seeds: &[Seed],
    third_place: bool,
) -> EngineResult<Vec<GameSkeleton>> {
    validate_bracket_size(size)?;
    if seeds.len() != size as usize {
        return Err(EngineError::InvalidConfiguration(format!(
            "bracket of size {size} needs {size} seed slots, got {}",
            seeds.len()
        )));
    }

    let total_rounds = round_count(size);
    let mut games: Vec<GameSkeleton> = Vec::with_capacity(size as usize);
    let placement = |round_index: u32, position: u32, game_number: u32| BracketPlacement {
        bracket_id: bracket_id.to_owned(),
        round: BracketRound::for_index(round_index, total_rounds),
        round_number: round_index as u8 + 1,
        position,
        game_number,
    };

    let mut previous: Vec<usize> = Vec::new();
    for (position, (top, bottom)) in first_round_pairs(size).into_iter().enumerate() {
        let game_number = games.len() as u32 + 1;
        games.push(GameSkeleton {
            id: bracket_game_id(bracket_id, game_number),
            slot_a: seed_slot(seeds, top),
            slot_b: seed_slot(seeds, bottom),
            bracket: Some(placement(0, position as u32, game_number)),
            pool: None,
            advances: Vec::new(),
        });
        previous.push(games.len() - 1);
    }

    let mut semifinals: Vec<usize> = Vec::new();
    for round_index in 1..total_rounds {
        if round_index == total_rounds - 1 {
            semifinals = previous.clone();
        }
        let mut current = Vec::with_capacity(previous.len() / 2);
        for (position, feeders) in previous.chunks_exact(2).enumerate() {
            let game_number = games.len() as u32 + 1;
            let id = bracket_game_id(bracket_id, game_number);
            let label = |idx: usize| Outcome::Winner.placeholder(feeder_number(&games[idx]));
            let slot_a = Slot::pending(label(feeders[0]));
            let slot_b = Slot::pending(label(feeders[1]));
            for &feeder in feeders {
                games[feeder].advances.push(Advance::winner(id.clone()));
            }
            games.push(GameSkeleton {
                id,
                slot_a,
                slot_b,
                bracket: Some(placement(round_index, position as u32, game_number)),
                pool: None,
                advances: Vec::new(),
            });
            current.push(games.len() - 1);
        }
        previous = current;
    }

    if third_place && semifinals.len() == 2 {
        let game_number = games.len() as u32 + 1;
        let id = bracket_game_id(bracket_id, game_number);
        let slot_a = Slot::pending(Outcome::Loser.placeholder(feeder_number(&games[semifinals[0]])));
        let slot_b = Slot::pending(Outcome::Loser.placeholder(feeder_number(&games[semifinals[1]])));
        for &semi in &semifinals {
            games[semi].advances.push(Advance::loser(id.clone()));
        }
        games.push(GameSkeleton {
            id,
            slot_a,
            slot_b,
            bracket: Some(BracketPlacement {
                bracket_id: bracket_id.to_owned(),
                round: BracketRound::ThirdPlace,
                round_number: total_rounds as u8,
                position: 0,
                game_number,
            }),
            pool: None,
            advances: Vec::new(),
        });
    }

    Ok(games)
}

fn feeder_number(game: &GameSkeleton) -> u32 {
    game.bracket.as_ref().map(|b| b.game_number).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AdvancementGraph;
    use std::collections::HashSet;

    fn team_names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Team {}", (b'A' + i as u8) as char)).collect()
    }

    #[test]
    fn pool_games_cover_every_pair_once() {
        for n in MIN_POOL_TEAMS..=MAX_POOL_TEAMS {
            let teams = team_names(n);
            let games = generate_pool_games("pool", &teams).unwrap();
            assert_eq!(games.len(), n * (n - 1) / 2, "wrong game count for {n} teams");

            let mut pairs = HashSet::new();
            for g in &games {
                let a = g.slot_a.team_name().unwrap().to_owned();
                let b = g.slot_b.team_name().unwrap().to_owned();
                assert_ne!(a, b);
                let key = if a < b { (a, b) } else { (b, a) };
                assert!(pairs.insert(key), "pair repeated for {n} teams");
            }
        }
    }

    #[test]
    fn pool_games_are_numbered_sequentially() {
        let games = generate_pool_games("pa", &team_names(4)).unwrap();
        let numbers: Vec<u32> = games.iter().map(|g| g.pool.as_ref().unwrap().game_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(games[0].id, "pa-g1");
    }

    #[test]
    fn pool_rounds_do_not_double_book_teams() {
        let games = generate_pool_games("pa", &team_names(4)).unwrap();
        for round in games.chunks(2) {
            let mut seen = HashSet::new();
            for g in round {
                assert!(seen.insert(g.slot_a.team_name().unwrap()));
                assert!(seen.insert(g.slot_b.team_name().unwrap()));
            }
        }
    }

    #[test]
    fn pool_rejects_bad_team_lists() {
        assert!(matches!(
            generate_pool_games("p", &team_names(1)),
            Err(EngineError::InvalidConfiguration(_))
        ));
        assert!(generate_pool_games("p", &team_names(17)).is_err());
        let dupes = vec!["A".to_string(), "B".into(), "A".into()];
        assert!(generate_pool_games("p", &dupes).is_err());
    }

    #[test]
    fn seed_order_is_standard() {
        assert_eq!(seed_order(4), vec![1, 4, 2, 3]);
        assert_eq!(seed_order(8), vec![1, 8, 4, 5, 2, 7, 3, 6]);
        for (a, b) in first_round_pairs(16) {
            assert_eq!(a + b, 17);
        }
    }

    #[test]
    fn bracket_shape_for_every_size() {
        for size in BRACKET_SIZES {
            let seeds = vec![Seed::Open; size as usize];
            let games = generate_bracket_games("b", size, &seeds, false).unwrap();
            assert_eq!(games.len() as u32, size - 1);

            let rounds: HashSet<u8> =
                games.iter().map(|g| g.bracket.as_ref().unwrap().round_number).collect();
            assert_eq!(rounds.len() as u32, round_count(size));

            let graph = AdvancementGraph::from_skeletons(&games);
            for g in &games {
                let round_number = g.bracket.as_ref().unwrap().round_number;
                let deps = graph.depends_on(&g.id);
                if round_number == 1 {
                    assert!(deps.is_empty());
                } else {
                    assert_eq!(deps.len(), 2, "game {} in size {size}", g.id);
                }
            }
        }
    }

    #[test]
    fn bracket_round_one_uses_seeds_and_placeholders() {
        let seeds = vec![
            Seed::Team { name: "Alpha".into() },
            Seed::Open,
            Seed::Open,
            Seed::Team { name: "Delta".into() },
        ];
        let games = generate_bracket_games("b", 4, &seeds, false).unwrap();
        assert_eq!(games[0].slot_a, Slot::team("Alpha"));
        assert_eq!(games[0].slot_b, Slot::team("Delta"));
        assert_eq!(games[1].slot_a, Slot::pending("Seed 2"));
        assert_eq!(games[1].slot_b, Slot::pending("Seed 3"));
        assert_eq!(games[2].slot_a, Slot::pending("Winner of Game 1"));
        assert_eq!(games[2].slot_b, Slot::pending("Winner of Game 2"));
        assert_eq!(games[0].advances, vec![Advance::winner("b-g3")]);
        assert_eq!(games[2].bracket.as_ref().unwrap().round, BracketRound::Finals);
    }

    #[test]
    fn third_place_game_takes_both_semifinal_losers() {
        let seeds = vec![Seed::Open; 8];
        let games = generate_bracket_games("b", 8, &seeds, true).unwrap();
        assert_eq!(games.len(), 8);
        let third = games.last().unwrap();
        assert_eq!(third.bracket.as_ref().unwrap().round, BracketRound::ThirdPlace);
        assert_eq!(third.slot_a, Slot::pending("Loser of Game 5"));
        assert_eq!(third.slot_b, Slot::pending("Loser of Game 6"));
        assert!(games[4].advances.contains(&Advance::loser(third.id.clone())));
        assert!(games[5].advances.contains(&Advance::loser(third.id.clone())));
    }

    #[test]
    fn bracket_rejects_bad_sizes() {
        for size in [0, 2, 6, 12, 64] {
            let seeds = vec![Seed::Open; size as usize];
            assert!(matches!(
                generate_bracket_games("b", size, &seeds, false),
                Err(EngineError::InvalidConfiguration(_))
            ));
        }
        assert!(generate_bracket_games("b", 8, &vec![Seed::Open; 4], false).is_err());
    }
}
