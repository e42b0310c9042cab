use bracket_engine::Outcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeskCommand {
    /// All games, or the games of one pool, bracket or division.
    Games { scope: Option<String> },
    Start { game: String },
    /// Live score; on a completed game this is a correction.
    Score { game: String, score_a: u32, score_b: u32 },
    Final { game: String, score_a: u32, score_b: u32 },
    Cancel { game: String },
    Standings { scope: String },
    Link { from: String, outcome: Outcome, to: String },
    Unlink { from: String, to: String },
    /// `team` of None clears the seed.
    Seed { bracket: String, position: u32, team: Option<String> },
    Teams { pool: String, teams: Vec<String> },
    Snapshot,
    Stats,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Command(DeskCommand),
    Rejected { line: String, reason: String },
    Closed,
}
