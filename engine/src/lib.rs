pub mod advance;
pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod ledger;
pub mod orchestrator;
pub mod schedule;
pub mod seeding;
pub mod standings;
pub mod store;

pub use error::{EngineError, EngineResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type GameId = String;

// ---------------------------------------------------------------------------
// Domain types: the records kept in the document store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl GameStatus {
    pub fn label(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::InProgress => "in_progress",
            GameStatus::Completed => "completed",
            GameStatus::Cancelled => "cancelled",
        }
    }

    /// Still waiting to be played out (counts against pool completion).
    pub fn is_open(&self) -> bool {
        matches!(self, GameStatus::Scheduled | GameStatus::InProgress)
    }

    /// Allowed status edits. Completed -> Completed is a score correction;
    /// cancelled is terminal.
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        use GameStatus::*;
        matches!(
            (self, next),
            (Scheduled, Scheduled)
                | (Scheduled, InProgress)
                | (Scheduled, Completed)
                | (Scheduled, Cancelled)
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
                | (Completed, Completed)
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(GameStatus::Scheduled),
            "in_progress" | "live" => Some(GameStatus::InProgress),
            "completed" | "final" => Some(GameStatus::Completed),
            "cancelled" => Some(GameStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Winner,
    Loser,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Winner => "Winner",
            Outcome::Loser => "Loser",
        }
    }

    /// Placeholder text for a slot awaiting this outcome, e.g. "Winner of Game 3".
    pub fn placeholder(&self, game_number: u32) -> String {
        format!("{} of Game {game_number}", self.label())
    }
}

/// One team slot of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Slot {
    /// A literal team: round-robin participant, manual seed or resolved pool seed.
    Team { name: String },
    /// Unresolved, e.g. "Winner of Game 3" or "Seed 4".
    Pending { label: String },
    /// Written by advancement; keeps the feed it came from.
    Advanced {
        team: String,
        from: GameId,
        outcome: Outcome,
    },
}

impl Slot {
    pub fn team(name: impl Into<String>) -> Self {
        Slot::Team { name: name.into() }
    }

    pub fn pending(label: impl Into<String>) -> Self {
        Slot::Pending { label: label.into() }
    }

    pub fn team_name(&self) -> Option<&str> {
        match self {
            Slot::Team { name } => Some(name),
            Slot::Advanced { team, .. } => Some(team),
            Slot::Pending { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending { .. })
    }

    /// The feed that filled this slot, if it was filled by advancement.
    pub fn provenance(&self) -> Option<(&str, Outcome)> {
        match self {
            Slot::Advanced { from, outcome, .. } => Some((from, *outcome)),
            _ => None,
        }
    }

    pub fn display(&self) -> &str {
        match self {
            Slot::Team { name } => name,
            Slot::Advanced { team, .. } => team,
            Slot::Pending { label } => label,
        }
    }
}

impl Default for Slot {
    fn default() -> Self {
        Slot::pending("TBD")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotSide {
    A,
    B,
}

impl SlotSide {
    pub fn label(&self) -> &'static str {
        match self {
            SlotSide::A => "A",
            SlotSide::B => "B",
        }
    }
}

/// Outgoing advancement edge: this game's winner or loser goes into `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Advance {
    pub to: GameId,
    pub outcome: Outcome,
}

impl Advance {
    pub fn winner(to: impl Into<GameId>) -> Self {
        Self { to: to.into(), outcome: Outcome::Winner }
    }

    pub fn loser(to: impl Into<GameId>) -> Self {
        Self { to: to.into(), outcome: Outcome::Loser }
    }
}

/// Named bracket rounds. Ordered from earliest to latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BracketRound {
    Round(u8),
    Quarterfinals,
    Semifinals,
    Finals,
    ThirdPlace,
}

impl BracketRound {
    /// Name for the round at 0-based `index` out of `total` rounds.
    pub fn for_index(index: u32, total: u32) -> Self {
        match total.saturating_sub(index) {
            1 => BracketRound::Finals,
            2 => BracketRound::Semifinals,
            3 => BracketRound::Quarterfinals,
            _ => BracketRound::Round(index as u8 + 1),
        }
    }

    pub fn label(&self) -> String {
        match self {
            BracketRound::Round(n) => format!("Round {n}"),
            BracketRound::Quarterfinals => "Quarterfinals".into(),
            BracketRound::Semifinals => "Semifinals".into(),
            BracketRound::Finals => "Finals".into(),
            BracketRound::ThirdPlace => "3rd Place".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketPlacement {
    pub bracket_id: String,
    pub round: BracketRound,
    /// 1-based round number; the 3rd place game shares the final round's number.
    pub round_number: u8,
    /// Index within the round.
    pub position: u32,
    /// Bracket-local game number used in "Winner of Game N" labels.
    pub game_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPlacement {
    pub pool_id: String,
    pub game_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub tournament_id: String,
    pub division_id: String,
    pub slot_a: Slot,
    pub slot_b: Slot,
    #[serde(default)]
    pub score_a: u32,
    #[serde(default)]
    pub score_b: u32,
    #[serde(default)]
    pub status: GameStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub bracket: Option<BracketPlacement>,
    pub pool: Option<PoolPlacement>,
    #[serde(default)]
    pub advances: Vec<Advance>,
}

impl Game {
    pub fn bracket_id(&self) -> Option<&str> {
        self.bracket.as_ref().map(|b| b.bracket_id.as_str())
    }

    pub fn pool_id(&self) -> Option<&str> {
        self.pool.as_ref().map(|p| p.pool_id.as_str())
    }

    pub fn team_a(&self) -> Option<&str> {
        self.slot_a.team_name()
    }

    pub fn team_b(&self) -> Option<&str> {
        self.slot_b.team_name()
    }

    pub fn slot(&self, side: SlotSide) -> &Slot {
        match side {
            SlotSide::A => &self.slot_a,
            SlotSide::B => &self.slot_b,
        }
    }

    pub fn slot_mut(&mut self, side: SlotSide) -> &mut Slot {
        match side {
            SlotSide::A => &mut self.slot_a,
            SlotSide::B => &mut self.slot_b,
        }
    }

    /// (winner, loser) of a completed, decided game with both teams known.
    pub fn outcome(&self) -> Option<(&str, &str)> {
        if self.status != GameStatus::Completed || self.score_a == self.score_b {
            return None;
        }
        let a = self.team_a()?;
        let b = self.team_b()?;
        if self.score_a > self.score_b { Some((a, b)) } else { Some((b, a)) }
    }

    pub fn team_for(&self, outcome: Outcome) -> Option<&str> {
        self.outcome().map(|(winner, loser)| match outcome {
            Outcome::Winner => winner,
            Outcome::Loser => loser,
        })
    }

    /// Score pair used to tell a score correction from a redundant notification.
    pub fn fingerprint(&self) -> (u32, u32) {
        (self.score_a, self.score_b)
    }

    /// Number shown in placeholders that reference this game.
    pub fn display_number(&self) -> Option<u32> {
        self.bracket
            .as_ref()
            .map(|b| b.game_number)
            .or_else(|| self.pool.as_ref().map(|p| p.game_number))
    }

    pub fn involves(&self, team: &str) -> bool {
        self.team_a() == Some(team) || self.team_b() == Some(team)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub tournament_id: String,
    pub division_id: String,
    pub name: String,
    pub teams: Vec<String>,
    /// How many top-ranked teams feed brackets; None means all of them.
    pub advancement_count: Option<u32>,
}

impl Pool {
    pub fn qualifier_count(&self) -> usize {
        self.advancement_count
            .map(|n| n as usize)
            .unwrap_or(self.teams.len())
            .min(self.teams.len())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedingSource {
    #[default]
    Manual,
    Pools,
    Mixed,
}

impl SeedingSource {
    pub fn uses_pools(&self) -> bool {
        matches!(self, SeedingSource::Pools | SeedingSource::Mixed)
    }
}

/// One seed position of a bracket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Seed {
    /// Manually assigned; never overwritten by auto-seeding.
    Team { name: String },
    /// The team finishing `rank` in `pool_id`, filled in once the pool is final.
    FromPool {
        pool_id: String,
        rank: u32,
        #[serde(default)]
        team: Option<String>,
    },
    #[default]
    Open,
}

impl Seed {
    pub fn team_name(&self) -> Option<&str> {
        match self {
            Seed::Team { name } => Some(name),
            Seed::FromPool { team, .. } => team.as_deref(),
            Seed::Open => None,
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Seed::Team { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub id: String,
    pub tournament_id: String,
    pub division_id: String,
    pub name: String,
    pub size: u32,
    #[serde(default)]
    pub seeding_source: SeedingSource,
    pub seeds: Vec<Seed>,
    /// Pools whose qualifiers fill `Seed::Open` positions, in priority order.
    #[serde(default)]
    pub source_pools: Vec<String>,
    #[serde(default)]
    pub third_place: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisionFormat {
    PoolsOnly,
    BracketOnly,
    #[default]
    PoolsToBracket,
}

impl DivisionFormat {
    pub fn seeds_from_pools(&self) -> bool {
        matches!(self, DivisionFormat::PoolsToBracket)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Division {
    pub id: String,
    pub tournament_id: String,
    pub name: String,
    #[serde(default)]
    pub format: DivisionFormat,
}

/// Ranked record of one team. Derived from completed games, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub team: String,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub points_for: u32,
    pub points_against: u32,
    pub point_differential: i64,
    pub games_played: u32,
    pub rank: u32,
}
