use bracket_engine::orchestrator::{EngineEvent, OrchestratorStats};
use bracket_engine::{Game, GameStatus, Standing};
use chrono::Local;
use std::fmt::Write;

fn status_cell(game: &Game) -> String {
    match game.status {
        GameStatus::Scheduled => "-".to_string(),
        GameStatus::Cancelled => "cancelled".to_string(),
        GameStatus::InProgress => format!("{}-{} live", game.score_a, game.score_b),
        GameStatus::Completed => format!("{}-{} final", game.score_a, game.score_b),
    }
}

fn where_cell(game: &Game) -> String {
    if let Some(b) = &game.bracket {
        format!("{} {}", b.bracket_id, b.round.label())
    } else if let Some(p) = &game.pool {
        p.pool_id.clone()
    } else {
        String::new()
    }
}

pub fn games_table(games: &[Game]) -> String {
    if games.is_empty() {
        return "no games".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:<12} {:<20} {:<22} {:<22} {:<12} {}", "GAME", "WHERE", "A", "B", "SCORE", "START");
    for game in games {
        let start = game
            .start_time
            .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{:<12} {:<20} {:<22} {:<22} {:<12} {}",
            game.id,
            where_cell(game),
            game.slot_a.display(),
            game.slot_b.display(),
            status_cell(game),
            start
        );
    }
    out.trim_end().to_string()
}

pub fn standings_table(title: &str, standings: &[Standing]) -> String {
    let mut out = format!("{title}\n");
    let _ = writeln!(out, "{:>3}  {:<22} {:>3} {:>3} {:>3} {:>5} {:>5} {:>6}", "#", "TEAM", "W", "L", "T", "PF", "PA", "DIFF");
    for s in standings {
        let _ = writeln!(
            out,
            "{:>3}  {:<22} {:>3} {:>3} {:>3} {:>5} {:>5} {:>+6}",
            s.rank, s.team, s.wins, s.losses, s.ties, s.points_for, s.points_against, s.point_differential
        );
    }
    out.trim_end().to_string()
}

pub fn event_line(event: &EngineEvent) -> String {
    match event {
        EngineEvent::Advanced(result) => {
            let placed: Vec<String> = result
                .placements
                .iter()
                .map(|p| match &p.result {
                    Ok(_) => format!("{} -> {}", p.team, p.target),
                    Err(e) => format!("{} -> {} failed: {e}", p.team, p.target),
                })
                .collect();
            if placed.is_empty() {
                format!("{}: {} wins", result.game_id, result.winner)
            } else {
                format!("{}: {}", result.game_id, placed.join(", "))
            }
        }
        EngineEvent::AdvanceFailed { game_id, error } => format!("{game_id}: {error}"),
        EngineEvent::PoolsComplete { division_id } => format!("all pools of {division_id} are final"),
        EngineEvent::Seeded(report) => {
            let mut line = format!("seeded {}:", report.division_id);
            for bracket in &report.brackets {
                let seeds: Vec<String> =
                    bracket.resolved.iter().map(|(n, team)| format!("#{n} {team}")).collect();
                let _ = write!(line, " {} [{}]", bracket.bracket_id, seeds.join(", "));
                if !bracket.unfilled.is_empty() {
                    let _ = write!(line, " open {:?}", bracket.unfilled);
                }
            }
            line
        }
    }
}

pub fn stats_line(stats: &OrchestratorStats) -> String {
    format!(
        "advanced {}  failed {}  duplicates skipped {}  pool checks {}  seeding runs {}",
        stats.advanced, stats.failed, stats.skipped_duplicates, stats.pool_checks, stats.seeding_runs
    )
}
