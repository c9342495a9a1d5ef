//! Drive a UCI chess engine process from async Rust.
//!
//! Requests are turned into [`Command`]s and queued by a session actor that
//! sends one reply-expecting command at a time and routes every line the
//! engine prints to the command currently waiting for it. The
//! [`EngineHandle`] facade returns a future per request.

pub mod command;
pub mod config;
pub mod process;
pub mod session;
pub mod uci;

pub use command::{
    Command, ConsumeResult, DescribeResult, EngineIdentity, LegalMove, SearchDuration,
    SearchReport,
};
pub use config::EngineConfig;
pub use process::{EngineEnd, EngineIo};
pub use session::{CommandQueue, EngineHandle, Outbox};
pub use uci::{parse_info_line, InfoKey, InfoLine, InfoValue, MoveToken, Score, UciError};

use serde::Serialize;

/// Engine analysis information
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub score: Option<Score>,
    pub pv: Vec<MoveToken>, // Principal variation
    pub multipv: Option<u32>,
    pub currmove: Option<MoveToken>,
    pub hashfull: Option<u32>,
    pub nps: Option<u64>,
    pub string: Option<String>,
}

impl EngineInfo {
    /// Fold one parsed `info` line into this summary.
    pub fn update(&mut self, line: &InfoLine) {
        for field in line {
            match (field.key, &field.value) {
                (InfoKey::Depth, InfoValue::Number(n)) => self.depth = Some(*n as u32),
                (InfoKey::SelDepth, InfoValue::Number(n)) => self.seldepth = Some(*n as u32),
                (InfoKey::Time, InfoValue::Number(n)) => self.time_ms = Some(*n as u64),
                (InfoKey::Nodes, InfoValue::Number(n)) => self.nodes = Some(*n as u64),
                (InfoKey::MultiPv, InfoValue::Number(n)) => self.multipv = Some(*n as u32),
                (InfoKey::HashFull, InfoValue::Number(n)) => self.hashfull = Some(*n as u32),
                (InfoKey::Nps, InfoValue::Number(n)) => self.nps = Some(*n as u64),
                (InfoKey::Score, InfoValue::Score(score)) => self.score = Some(*score),
                (InfoKey::Pv, InfoValue::Moves(moves)) => self.pv = moves.clone(),
                (InfoKey::CurrMove, InfoValue::Move(mv)) => self.currmove = Some(mv.clone()),
                (InfoKey::String, InfoValue::Text(text)) => self.string = Some(text.clone()),
                _ => {}
            }
        }
    }
}

impl From<&InfoLine> for EngineInfo {
    fn from(line: &InfoLine) -> Self {
        let mut info = EngineInfo::default();
        info.update(line);
        info
    }
}
