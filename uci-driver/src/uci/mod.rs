pub mod moves;
pub mod parser;

use std::time::Duration;

pub use moves::{is_move_token, MoveToken};
pub use parser::{
    is_number_token, parse_info_line, CurrLine, InfoField, InfoKey, InfoLine, InfoValue, Score,
    ScoreBound,
};

#[derive(Debug, thiserror::Error)]
pub enum UciError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine executable not found")]
    EngineNotFound,
    #[error("Engine has no stdin")]
    NoStdin,
    #[error("Engine has no stdout")]
    NoStdout,
    #[error("Malformed line at token {position}: expected {expected}, got {found:?} in '{line}'")]
    MalformedLine {
        line: String,
        position: usize,
        expected: String,
        found: Option<String>,
    },
    #[error("Unknown field '{token}' at token {position} in '{line}'")]
    UnknownField {
        line: String,
        position: usize,
        token: String,
    },
    #[error("Invalid move: {0}")]
    InvalidMove(String),
    #[error("Evaluation not found in: {0}")]
    EvaluationNotFound(String),
    #[error("Position description incomplete, missing: {}", .missing.join(", "))]
    IncompleteDescribe { missing: Vec<&'static str> },
    #[error("Legal move lists differ in length: {san} SAN vs {lan} UCI")]
    MismatchedMoveLists { san: usize, lan: usize },
    #[error("No best move in: {0}")]
    NoBestMove(String),
    #[error("Line received with no command waiting: {0}")]
    OrphanLine(String),
    #[error("Command '{command}' timed out after {after:?}")]
    Timeout { command: String, after: Duration },
    #[error("Engine session closed")]
    SessionClosed,
}
