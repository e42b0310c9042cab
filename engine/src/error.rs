use crate::GameStatus;
use std::fmt;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Bad pool/bracket shape. Rejected before anything is written.
    InvalidConfiguration(String),
    /// Completed game is tied, unscored or has an unresolved slot.
    NoValidWinner { game_id: String },
    /// Both slots of the target already hold teams from other feeds.
    TargetGameFull { target: String },
    /// Destination already has two distinct upstream feeds.
    CapacityExceeded { target: String },
    CycleDetected { from: String, to: String },
    ConflictingAdvancement {
        target: String,
        previous: String,
        incoming: String,
    },
    StoreUnavailable(String),
    NotFound(String),
    InvalidTransition {
        game_id: String,
        from: GameStatus,
        to: GameStatus,
    },
}

impl EngineError {
    /// Transient collaborator failures worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StoreUnavailable(_))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {msg}"),
            EngineError::NoValidWinner { game_id } => {
                write!(f, "Game {game_id} has no valid winner")
            }
            EngineError::TargetGameFull { target } => {
                write!(f, "Game {target} has no open team slot")
            }
            EngineError::CapacityExceeded { target } => {
                write!(f, "Game {target} already has two upstream feeds")
            }
            EngineError::CycleDetected { from, to } => {
                write!(f, "Advancing {from} into {to} would create a cycle")
            }
            EngineError::ConflictingAdvancement { target, previous, incoming } => write!(
                f,
                "Game {target} already holds {previous} from this feed, refusing to write {incoming}"
            ),
            EngineError::StoreUnavailable(msg) => write!(f, "Store unavailable: {msg}"),
            EngineError::NotFound(msg) => write!(f, "Not found: {msg}"),
            EngineError::InvalidTransition { game_id, from, to } => write!(
                f,
                "Game {game_id} cannot move from {} to {}",
                from.label(),
                to.label()
            ),
        }
    }
}

impl std::error::Error for EngineError {}
