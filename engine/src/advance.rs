//! Advancement resolver: writes a completed game's winner and loser into the
//! downstream games its edges point at.

use crate::store::{Store, require_game};
use crate::{Advance, EngineError, EngineResult, Game, GameId, GameStatus, Outcome, Slot, SlotSide};
use serde::{Deserialize, Serialize};

/// What to do when a feed already wrote a different team into its slot,
/// which happens when an operator corrects the score of a processed game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvancePolicy {
    #[default]
    Reject,
    Overwrite,
}

impl AdvancePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Some(AdvancePolicy::Reject),
            "overwrite" => Some(AdvancePolicy::Overwrite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotWrite {
    /// A pending slot now holds the team.
    Filled(SlotSide),
    /// The slot already held this team from this feed.
    Unchanged(SlotSide),
    /// A corrected result replaced `previous`.
    Overwritten { side: SlotSide, previous: String },
}

impl SlotWrite {
    pub fn side(&self) -> SlotSide {
        match self {
            SlotWrite::Filled(side) | SlotWrite::Unchanged(side) => *side,
            SlotWrite::Overwritten { side, .. } => *side,
        }
    }

    pub fn changed(&self) -> bool {
        !matches!(self, SlotWrite::Unchanged(_))
    }
}

/// Result of writing one team into one target game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub target: GameId,
    pub outcome: Outcome,
    pub team: String,
    pub result: EngineResult<SlotWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvancementResult {
    pub game_id: GameId,
    pub winner: String,
    pub loser: String,
    pub placements: Vec<Placement>,
}

impl AdvancementResult {
    pub fn failures(&self) -> impl Iterator<Item = &Placement> {
        self.placements.iter().filter(|p| p.result.is_err())
    }

    /// Every target was written or already held the right team.
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn has_retryable_failure(&self) -> bool {
        self.placements
            .iter()
            .any(|p| p.result.as_ref().is_err_and(EngineError::is_retryable))
    }

    pub fn changed(&self) -> usize {
        self.placements
            .iter()
            .filter(|p| p.result.as_ref().is_ok_and(SlotWrite::changed))
            .count()
    }
}

/// Propagate a completed game's outcome along every outgoing edge.
///
/// Fails as a whole only when the game has no valid winner. Each target is
/// handled independently: one full or missing target does not stop the others.
pub async fn advance_outcome<S: Store>(
    store: &S,
    game: &Game,
    policy: AdvancePolicy,
) -> EngineResult<AdvancementResult> {
    let (winner, loser) = game
        .outcome()
        .ok_or_else(|| EngineError::NoValidWinner { game_id: game.id.clone() })?;

    let mut placements = Vec::with_capacity(game.advances.len());
    for advance in &game.advances {
        let team = match advance.outcome {
            Outcome::Winner => winner,
            Outcome::Loser => loser,
        };
        let result = place(store, game, advance, team, policy).await;
        match &result {
            Ok(SlotWrite::Unchanged(_)) => {
                log::debug!("{} already holds {team} from {}", advance.to, game.id);
            }
            Ok(write) => log::info!(
                "{} of {} -> {} slot {} ({team})",
                advance.outcome.label(),
                game.id,
                advance.to,
                write.side().label()
            ),
            Err(e) => log::warn!("advancing {team} from {} into {}: {e}", game.id, advance.to),
        }
        placements.push(Placement {
            target: advance.to.clone(),
            outcome: advance.outcome,
            team: team.to_owned(),
            result,
        });
    }

    Ok(AdvancementResult {
        game_id: game.id.clone(),
        winner: winner.to_owned(),
        loser: loser.to_owned(),
        placements,
    })
}

async fn place<S: Store>(
    store: &S,
    source: &Game,
    advance: &Advance,
    team: &str,
    policy: AdvancePolicy,
) -> EngineResult<SlotWrite> {
    // Read right before writing so we see the freshest target.
    let mut target = require_game(store, &advance.to).await?;
    let write = choose_slot(&target, source, advance.outcome, team, policy)?;
    if !write.changed() {
        return Ok(write);
    }
    if let SlotWrite::Overwritten { previous, .. } = &write
        && target.status != GameStatus::Scheduled
    {
        log::warn!(
            "replacing {previous} with {team} in {} which is already {}",
            target.id,
            target.status.label()
        );
    }

    let side = write.side();
    *target.slot_mut(side) = Slot::Advanced {
        team: team.to_owned(),
        from: source.id.clone(),
        outcome: advance.outcome,
    };
    store.put_game(target).await?;

    // Last write wins; a concurrent writer may already have replaced us.
    let stored = require_game(store, &advance.to).await?;
    let slot = stored.slot(side);
    if slot.team_name() != Some(team) || slot.provenance() != Some((source.id.as_str(), advance.outcome)) {
        log::warn!(
            "{} slot {} now holds '{}' instead of {team} from {}",
            advance.to,
            side.label(),
            slot.display(),
            source.id
        );
    }
    Ok(write)
}

/// Pick the slot of `target` that the `outcome` team of `source` belongs in.
///
/// Preference: the slot this feed already wrote, a slot already holding the
/// team, the pending slot labelled for this feed, then the first pending slot.
pub fn choose_slot(
    target: &Game,
    source: &Game,
    outcome: Outcome,
    team: &str,
    policy: AdvancePolicy,
) -> EngineResult<SlotWrite> {
    const SIDES: [SlotSide; 2] = [SlotSide::A, SlotSide::B];

    for side in SIDES {
        let slot = target.slot(side);
        if slot.provenance() != Some((source.id.as_str(), outcome)) {
            continue;
        }
        let previous = slot.display();
        if previous == team {
            return Ok(SlotWrite::Unchanged(side));
        }
        return match policy {
            AdvancePolicy::Reject => Err(EngineError::ConflictingAdvancement {
                target: target.id.clone(),
                previous: previous.to_owned(),
                incoming: team.to_owned(),
            }),
            AdvancePolicy::Overwrite => {
                Ok(SlotWrite::Overwritten { side, previous: previous.to_owned() })
            }
        };
    }

    if let Some(side) = SIDES.into_iter().find(|&s| target.slot(s).team_name() == Some(team)) {
        return Ok(SlotWrite::Unchanged(side));
    }

    if let Some(number) = source.display_number() {
        let label = outcome.placeholder(number);
        let labelled = SIDES
            .into_iter()
            .find(|&s| matches!(target.slot(s), Slot::Pending { label: l } if *l == label));
        if let Some(side) = labelled {
            return Ok(SlotWrite::Filled(side));
        }
    }

    SIDES
        .into_iter()
        .find(|&s| target.slot(s).is_pending())
        .map(SlotWrite::Filled)
        .ok_or_else(|| EngineError::TargetGameFull { target: target.id.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::{BracketPlacement, BracketRound};

    fn game(id: &str, number: u32, a: Slot, b: Slot) -> Game {
        Game {
            id: id.into(),
            tournament_id: "t".into(),
            division_id: "d".into(),
            slot_a: a,
            slot_b: b,
            score_a: 0,
            score_b: 0,
            status: GameStatus::Scheduled,
            start_time: None,
            bracket: Some(BracketPlacement {
                bracket_id: "b".into(),
                round: BracketRound::Round(1),
                round_number: 1,
                position: number - 1,
                game_number: number,
            }),
            pool: None,
            advances: vec![],
        }
    }

    fn finish(mut game: Game, score_a: u32, score_b: u32) -> Game {
        game.score_a = score_a;
        game.score_b = score_b;
        game.status = GameStatus::Completed;
        game
    }

    async fn seeded() -> (MemoryStore, Game) {
        let store = MemoryStore::new();
        let mut g1 = game("g1", 1, Slot::team("A"), Slot::team("B"));
        g1.advances = vec![Advance::winner("g5"), Advance::loser("c1")];
        let g5 = game("g5", 5, Slot::pending("Winner of Game 2"), Slot::pending("Winner of Game 1"));
        let c1 = game("c1", 6, Slot::pending("Loser of Game 1"), Slot::pending("Loser of Game 2"));
        for g in [g1.clone(), g5, c1] {
            store.put_game(g).await.unwrap();
        }
        (store, finish(g1, 50, 40))
    }

    #[tokio::test]
    async fn winner_and_loser_land_in_labelled_slots() {
        let (store, g1) = seeded().await;
        let result = advance_outcome(&store, &g1, AdvancePolicy::Reject).await.unwrap();
        assert!(result.is_complete());
        assert_eq!(result.winner, "A");
        assert_eq!(result.changed(), 2);

        let g5 = store.game("g5").await.unwrap().unwrap();
        assert_eq!(g5.team_b(), Some("A"));
        assert_eq!(g5.slot_b.provenance(), Some(("g1", Outcome::Winner)));
        assert!(g5.slot_a.is_pending());
        let c1 = store.game("c1").await.unwrap().unwrap();
        assert_eq!(c1.team_a(), Some("B"));
    }

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let (store, g1) = seeded().await;
        advance_outcome(&store, &g1, AdvancePolicy::Reject).await.unwrap();
        let before = store.snapshot().await;
        let again = advance_outcome(&store, &g1, AdvancePolicy::Reject).await.unwrap();
        assert_eq!(again.changed(), 0);
        assert!(again.is_complete());
        assert_eq!(store.snapshot().await.games, before.games);
    }

    #[tokio::test]
    async fn corrected_score_conflicts_unless_overwriting() {
        let (store, g1) = seeded().await;
        advance_outcome(&store, &g1, AdvancePolicy::Reject).await.unwrap();

        let corrected = finish(g1, 40, 50);
        let rejected = advance_outcome(&store, &corrected, AdvancePolicy::Reject).await.unwrap();
        assert!(matches!(
            rejected.placements[0].result,
            Err(EngineError::ConflictingAdvancement { .. })
        ));
        assert_eq!(store.game("g5").await.unwrap().unwrap().team_b(), Some("A"));

        let overwritten = advance_outcome(&store, &corrected, AdvancePolicy::Overwrite).await.unwrap();
        assert_eq!(
            overwritten.placements[0].result,
            Ok(SlotWrite::Overwritten { side: SlotSide::B, previous: "A".into() })
        );
        assert_eq!(store.game("g5").await.unwrap().unwrap().team_b(), Some("B"));
        assert_eq!(store.game("c1").await.unwrap().unwrap().team_a(), Some("A"));
    }

    #[tokio::test]
    async fn full_target_fails_alone() {
        let (store, mut g1) = seeded().await;
        store
            .put_game(game("full", 7, Slot::team("X"), Slot::team("Y")))
            .await
            .unwrap();
        g1.advances.insert(0, Advance::winner("full"));

        let result = advance_outcome(&store, &g1, AdvancePolicy::Reject).await.unwrap();
        assert_eq!(
            result.placements[0].result,
            Err(EngineError::TargetGameFull { target: "full".into() })
        );
        assert!(result.placements[1].result.is_ok());
        assert!(result.placements[2].result.is_ok());
        assert!(!result.is_complete());
        assert!(!result.has_retryable_failure());
    }

    #[tokio::test]
    async fn store_failure_is_retryable() {
        let (store, g1) = seeded().await;
        store.fail_next(1);
        let result = advance_outcome(&store, &g1, AdvancePolicy::Reject).await.unwrap();
        assert!(result.has_retryable_failure());
        assert!(result.placements[1].result.is_ok());

        let retried = advance_outcome(&store, &g1, AdvancePolicy::Reject).await.unwrap();
        assert!(retried.is_complete());
    }

    #[tokio::test]
    async fn tied_game_has_no_winner() {
        let (store, g1) = seeded().await;
        let tied = finish(g1, 30, 30);
        assert_eq!(
            advance_outcome(&store, &tied, AdvancePolicy::Reject).await,
            Err(EngineError::NoValidWinner { game_id: "g1".into() })
        );
    }

    #[test]
    fn unlabelled_target_takes_first_pending_slot() {
        let source = finish(game("g1", 1, Slot::team("A"), Slot::team("B")), 2, 1);
        let target = game("x", 9, Slot::team("Z"), Slot::pending("TBD"));
        assert_eq!(
            choose_slot(&target, &source, Outcome::Winner, "A", AdvancePolicy::Reject),
            Ok(SlotWrite::Filled(SlotSide::B))
        );
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!(AdvancePolicy::parse("Overwrite"), Some(AdvancePolicy::Overwrite));
        assert_eq!(AdvancePolicy::parse("nope"), None);
    }
}
