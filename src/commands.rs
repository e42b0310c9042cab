use crate::state::messages::DeskCommand;
use bracket_engine::Outcome;

pub const HELP: &str = "Commands:
  games [pool|bracket|division]     list games
  start <game>                      mark a game in progress
  score <game> <a> <b>              record a live score (corrects a final)
  final <game> <a> <b>              record the final score
  cancel <game>                     cancel a game
  standings <pool|division>         ranked table
  link <from> winner|loser <to>     add an advancement edge
  unlink <from> <to>                remove advancement edges
  seed <bracket> <n> <team|->       set or clear seed n
  teams <pool> <team,team,...>      replace a pool's teams
  snapshot                          write the store to JSON
  stats                             engine counters
  help | quit";

fn id(raw: &str) -> String {
    raw.to_string()
}

fn score(raw: &str) -> Result<u32, String> {
    raw.parse().map_err(|_| format!("'{raw}' is not a score"))
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<DeskCommand>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let words: Vec<&str> = line.split_whitespace().collect();

    let command = match words.as_slice() {
        ["games"] => DeskCommand::Games { scope: None },
        ["games", scope] => DeskCommand::Games { scope: Some(id(scope)) },
        ["start", game] => DeskCommand::Start { game: id(game) },
        ["score", game, a, b] => {
            DeskCommand::Score { game: id(game), score_a: score(a)?, score_b: score(b)? }
        }
        ["final", game, a, b] => {
            DeskCommand::Final { game: id(game), score_a: score(a)?, score_b: score(b)? }
        }
        ["cancel", game] => DeskCommand::Cancel { game: id(game) },
        ["standings", scope] => DeskCommand::Standings { scope: id(scope) },
        ["link", from, outcome, to] => {
            let outcome = match outcome.to_ascii_lowercase().as_str() {
                "winner" | "w" => Outcome::Winner,
                "loser" | "l" => Outcome::Loser,
                other => return Err(format!("expected winner or loser, got '{other}'")),
            };
            DeskCommand::Link { from: id(from), outcome, to: id(to) }
        }
        ["unlink", from, to] => DeskCommand::Unlink { from: id(from), to: id(to) },
        ["seed", bracket, position, team @ ..] if !team.is_empty() => {
            let position = position
                .parse()
                .map_err(|_| format!("'{position}' is not a seed number"))?;
            let team = team.join(" ");
            let team = (team != "-").then_some(team);
            DeskCommand::Seed { bracket: id(bracket), position, team }
        }
        ["teams", pool, ..] => {
            let rest = line
                .strip_prefix("teams")
                .map(str::trim_start)
                .and_then(|rest| rest.strip_prefix(*pool))
                .unwrap_or_default();
            let teams: Vec<String> = rest
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            DeskCommand::Teams { pool: id(pool), teams }
        }
        ["snapshot"] => DeskCommand::Snapshot,
        ["stats"] => DeskCommand::Stats,
        ["help"] | ["?"] => DeskCommand::Help,
        ["quit"] | ["exit"] | ["q"] => DeskCommand::Quit,
        [verb, ..] => return Err(format!("unknown or malformed command '{verb}', try help")),
        [] => return Ok(None),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_parse() {
        assert_eq!(
            parse_command("final pa-g3 21 17"),
            Ok(Some(DeskCommand::Final { game: "pa-g3".into(), score_a: 21, score_b: 17 }))
        );
        assert!(parse_command("score pa-g3 21 lots").is_err());
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(parse_command("# warmups"), Ok(None));
    }

    #[test]
    fn link_takes_an_outcome() {
        assert_eq!(
            parse_command("link gold-g1 loser cons-g1"),
            Ok(Some(DeskCommand::Link {
                from: "gold-g1".into(),
                outcome: Outcome::Loser,
                to: "cons-g1".into()
            }))
        );
        assert!(parse_command("link gold-g1 sideways cons-g1").is_err());
    }

    #[test]
    fn seed_names_may_have_spaces_and_dash_clears() {
        assert_eq!(
            parse_command("seed gold 3 River City"),
            Ok(Some(DeskCommand::Seed { bracket: "gold".into(), position: 3, team: Some("River City".into()) }))
        );
        assert_eq!(
            parse_command("seed gold 3 -"),
            Ok(Some(DeskCommand::Seed { bracket: "gold".into(), position: 3, team: None }))
        );
    }

    #[test]
    fn team_lists_split_on_commas() {
        assert_eq!(
            parse_command("teams pa Owls, Red Hawks ,Crows"),
            Ok(Some(DeskCommand::Teams {
                pool: "pa".into(),
                teams: vec!["Owls".into(), "Red Hawks".into(), "Crows".into()]
            }))
        );
    }

    #[test]
    fn unknown_verbs_are_rejected() {
        assert!(parse_command("dance").is_err());
        assert!(parse_command("start").is_err());
    }
}
