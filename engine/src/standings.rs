//! Standings: ranked win/loss/point tables derived from completed games.

use crate::{Game, GameStatus, Standing};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Ranked standings for `teams` from the completed games in `games`.
///
/// Only completed games with both teams resolved are counted; games involving
/// a team outside `teams` are ignored. An empty `teams` list means "every team
/// seen in the games", in first-seen order.
///
/// Order: wins desc, point differential desc, points for desc, name asc. The
/// sort is stable, so records identical in all four keep their input order.
/// Ranks are 1-based and never shared.
pub fn compute_standings(games: &[Game], teams: &[String]) -> Vec<Standing> {
    let roster: Vec<String> = if teams.is_empty() {
        teams_in_order(games)
    } else {
        teams.to_vec()
    };

    let mut table: Vec<Standing> = roster
        .iter()
        .map(|team| Standing { team: team.clone(), ..Default::default() })
        .collect();
    let position: HashMap<&str, usize> =
        roster.iter().enumerate().map(|(i, t)| (t.as_str(), i)).collect();

    for game in games.iter().filter(|g| g.status == GameStatus::Completed) {
        let (Some(a), Some(b)) = (game.team_a(), game.team_b()) else {
            continue;
        };
        let (Some(&ia), Some(&ib)) = (position.get(a), position.get(b)) else {
            continue;
        };
        record(&mut table[ia], game.score_a, game.score_b);
        record(&mut table[ib], game.score_b, game.score_a);
    }

    table.sort_by(compare);
    for (i, standing) in table.iter_mut().enumerate() {
        standing.rank = i as u32 + 1;
    }
    table
}

/// Whole-division table over every team that appears in `games`.
pub fn division_standings(games: &[Game]) -> Vec<Standing> {
    compute_standings(games, &[])
}

/// The top `count` teams by rank.
pub fn top_teams(standings: &[Standing], count: usize) -> Vec<String> {
    standings.iter().take(count).map(|s| s.team.clone()).collect()
}

fn record(standing: &mut Standing, scored: u32, allowed: u32) {
    standing.games_played += 1;
    standing.points_for += scored;
    standing.points_against += allowed;
    standing.point_differential += i64::from(scored) - i64::from(allowed);
    match scored.cmp(&allowed) {
        Ordering::Greater => standing.wins += 1,
        Ordering::Less => standing.losses += 1,
        Ordering::Equal => standing.ties += 1,
    }
}

fn compare(a: &Standing, b: &Standing) -> Ordering {
    b.wins
        .cmp(&a.wins)
        .then_with(|| b.point_differential.cmp(&a.point_differential))
        .then_with(|| b.points_for.cmp(&a.points_for))
        .then_with(|| a.team.cmp(&b.team))
}

fn teams_in_order(games: &[Game]) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    for game in games {
        for team in [game.team_a(), game.team_b()].into_iter().flatten() {
            if !seen.iter().any(|t| t == team) {
                seen.push(team.to_owned());
            }
        }
    }
    seen
}
