//! Units of work for the session queue.
//!
//! A [`Command`] pairs the text sent to the engine with the rule for
//! recognising, from the lines that follow, when the engine is done with it.
//! Commands that produce a value resolve a oneshot channel exactly once, from
//! inside [`Command::consume`] (or [`Command::fail`] when the session gives up
//! on them).

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::uci::{is_number_token, parse_info_line, InfoLine, MoveToken, UciError};
use crate::EngineInfo;

pub type Reply<T> = oneshot::Sender<Result<T, UciError>>;

/// Outcome of feeding one line to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeResult {
    Continue,
    Done,
}

/// How long a `go` search should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDuration {
    /// Search until `stop`.
    Infinite,
    /// Fixed depth in plies.
    Depth(u32),
    /// Fixed wall-clock budget in milliseconds.
    MoveTime(u64),
}

impl SearchDuration {
    pub fn infinite() -> Self {
        SearchDuration::Infinite
    }

    pub fn depth(plies: u32) -> Self {
        SearchDuration::Depth(plies)
    }

    pub fn for_time(milliseconds: u64) -> Self {
        SearchDuration::MoveTime(milliseconds)
    }
}

impl SearchDuration {
    /// How long to wait for `bestmove`, given the session's default timeout.
    ///
    /// A timed search gets its own budget on top of the default. An infinite
    /// search only ends on `stop`, so it has no deadline.
    pub fn deadline(&self, default: Option<Duration>) -> Option<Duration> {
        match self {
            SearchDuration::Infinite => None,
            SearchDuration::Depth(_) => default,
            SearchDuration::MoveTime(ms) => default.map(|grace| Duration::from_millis(*ms) + grace),
        }
    }
}

impl fmt::Display for SearchDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchDuration::Infinite => f.write_str("infinite"),
            SearchDuration::Depth(plies) => write!(f, "depth {}", plies),
            SearchDuration::MoveTime(ms) => write!(f, "movetime {}", ms),
        }
    }
}

/// Name and author reported by the engine during the `uci` handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineIdentity {
    pub name: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegalMove {
    pub lan: MoveToken,
    pub san: String,
}

/// The engine's description of its current position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescribeResult {
    /// Legal moves, SAN and UCI spellings paired by position.
    pub moves: Vec<LegalMove>,
    pub fen: String,
    pub checkers: Vec<String>,
    pub key: String,
}

/// Everything a search produced before `bestmove`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub best_move: MoveToken,
    pub ponder: Option<MoveToken>,
    pub info: Vec<InfoLine>,
}

impl SearchReport {
    /// Typed summary of all `info` lines, later values winning.
    pub fn summary(&self) -> EngineInfo {
        let mut summary = EngineInfo::default();
        for line in &self.info {
            summary.update(line);
        }
        summary
    }
}

pub struct HandshakeCommand {
    identity: EngineIdentity,
    reply: Option<Reply<EngineIdentity>>,
}

pub struct ReadyCommand {
    reply: Option<Reply<()>>,
}

#[derive(Default)]
pub struct DescribeCommand {
    san: Option<Vec<String>>,
    lan: Option<Vec<String>>,
    fen: Option<String>,
    key: Option<String>,
    checkers: Option<Vec<String>>,
    reply: Option<Reply<DescribeResult>>,
}

pub struct EvalCommand {
    reply: Option<Reply<f64>>,
}

pub struct AnalyzeCommand {
    message: String,
    duration: SearchDuration,
    reply: Option<Reply<MoveToken>>,
}

pub struct SearchCommand {
    message: String,
    duration: SearchDuration,
    info: Vec<InfoLine>,
    error: Option<UciError>,
    reply: Option<Reply<SearchReport>>,
}

/// One request to the engine, queued by the session.
pub enum Command {
    /// Seeds the queue. Sends nothing and completes at once.
    Init,
    Handshake(HandshakeCommand),
    Ready(ReadyCommand),
    Describe(DescribeCommand),
    StaticEval(EvalCommand),
    /// `go`, resolving only the best move.
    Analyze(AnalyzeCommand),
    /// `go`, keeping every `info` line.
    Search(SearchCommand),
    SetPosition(String),
    SetOption(String),
}

impl Command {
    pub fn handshake() -> (Self, oneshot::Receiver<Result<EngineIdentity, UciError>>) {
        let (tx, rx) = oneshot::channel();
        let cmd = Command::Handshake(HandshakeCommand {
            identity: EngineIdentity::default(),
            reply: Some(tx),
        });
        (cmd, rx)
    }

    pub fn ready() -> (Self, oneshot::Receiver<Result<(), UciError>>) {
        let (tx, rx) = oneshot::channel();
        (Command::Ready(ReadyCommand { reply: Some(tx) }), rx)
    }

    /// A readiness probe nobody awaits, used to flush the handshake.
    pub fn ready_barrier() -> Self {
        Command::Ready(ReadyCommand { reply: None })
    }

    pub fn describe() -> (Self, oneshot::Receiver<Result<DescribeResult, UciError>>) {
        let (tx, rx) = oneshot::channel();
        let cmd = Command::Describe(DescribeCommand {
            reply: Some(tx),
            ..Default::default()
        });
        (cmd, rx)
    }

    pub fn static_eval() -> (Self, oneshot::Receiver<Result<f64, UciError>>) {
        let (tx, rx) = oneshot::channel();
        (Command::StaticEval(EvalCommand { reply: Some(tx) }), rx)
    }

    pub fn analyze(
        duration: SearchDuration,
    ) -> (Self, oneshot::Receiver<Result<MoveToken, UciError>>) {
        let (tx, rx) = oneshot::channel();
        let cmd = Command::Analyze(AnalyzeCommand {
            message: format!("go {}", duration),
            duration,
            reply: Some(tx),
        });
        (cmd, rx)
    }

    pub fn search(
        duration: SearchDuration,
    ) -> (Self, oneshot::Receiver<Result<SearchReport, UciError>>) {
        let (tx, rx) = oneshot::channel();
        let cmd = Command::Search(SearchCommand {
            message: format!("go {}", duration),
            duration,
            info: Vec::new(),
            error: None,
            reply: Some(tx),
        });
        (cmd, rx)
    }

    pub fn set_position(fen: &str, moves: &[MoveToken]) -> Self {
        let mut message = format!("position fen {}", fen);
        if !moves.is_empty() {
            message.push_str(" moves");
            for mv in moves {
                message.push(' ');
                message.push_str(mv.as_str());
            }
        }
        Command::SetPosition(message)
    }

    pub fn set_option(name: &str, value: Option<&str>) -> Self {
        let message = match value {
            Some(value) => format!("setoption name {} value {}", name, value),
            None => format!("setoption name {}", name),
        };
        Command::SetOption(message)
    }

    /// Text to send to the engine, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Command::Init => None,
            Command::Handshake(_) => Some("uci"),
            Command::Ready(_) => Some("isready"),
            Command::Describe(_) => Some("d"),
            Command::StaticEval(_) => Some("eval"),
            Command::Analyze(cmd) => Some(cmd.message.as_str()),
            Command::Search(cmd) => Some(cmd.message.as_str()),
            Command::SetPosition(message) | Command::SetOption(message) => Some(message.as_str()),
        }
    }

    /// Whether the queue must wait for this command to finish before sending
    /// the next one.
    pub fn expects_reply(&self) -> bool {
        !matches!(
            self,
            Command::Init | Command::SetPosition(_) | Command::SetOption(_)
        )
    }

    pub fn label(&self) -> &str {
        self.message().unwrap_or("<init>")
    }

    /// Duration of the `go` this command sends, if it is a search.
    pub fn search_duration(&self) -> Option<SearchDuration> {
        match self {
            Command::Analyze(cmd) => Some(cmd.duration),
            Command::Search(cmd) => Some(cmd.duration),
            _ => None,
        }
    }

    /// How long the session waits for this command once it has been sent.
    pub fn timeout(&self, default: Option<Duration>) -> Option<Duration> {
        match self.search_duration() {
            Some(duration) => duration.deadline(default),
            None => default,
        }
    }

    /// Feed one engine line to this command.
    pub fn consume(&mut self, line: &str) -> ConsumeResult {
        match self {
            Command::Init | Command::SetPosition(_) | Command::SetOption(_) => ConsumeResult::Done,
            Command::Handshake(cmd) => cmd.consume(line),
            Command::Ready(cmd) => {
                if !line.contains("readyok") {
                    return ConsumeResult::Continue;
                }
                resolve(&mut cmd.reply, Ok(()));
                ConsumeResult::Done
            }
            Command::Describe(cmd) => cmd.consume(line),
            Command::StaticEval(cmd) => cmd.consume(line),
            Command::Analyze(cmd) => cmd.consume(line),
            Command::Search(cmd) => cmd.consume(line),
        }
    }

    /// Complete the command with an error without waiting for the engine.
    pub fn fail(&mut self, err: UciError) {
        match self {
            Command::Init | Command::SetPosition(_) | Command::SetOption(_) => {}
            Command::Handshake(cmd) => resolve(&mut cmd.reply, Err(err)),
            Command::Ready(cmd) => resolve(&mut cmd.reply, Err(err)),
            Command::Describe(cmd) => resolve(&mut cmd.reply, Err(err)),
            Command::StaticEval(cmd) => resolve(&mut cmd.reply, Err(err)),
            Command::Analyze(cmd) => resolve(&mut cmd.reply, Err(err)),
            Command::Search(cmd) => resolve(&mut cmd.reply, Err(err)),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Command").field(&self.label()).finish()
    }
}

fn resolve<T>(reply: &mut Option<Reply<T>>, result: Result<T, UciError>) {
    if let Some(tx) = reply.take() {
        // The caller may have stopped waiting.
        let _ = tx.send(result);
    }
}

/// Text following `marker` in `line`, trimmed.
fn after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker)
        .map(|idx| line[idx + marker.len()..].trim())
}

fn words(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

/// Best and ponder moves from a `bestmove <move> [ponder <move>]` line.
/// `None` when the line is not a `bestmove` line at all.
fn best_move(line: &str) -> Option<(Option<MoveToken>, Option<MoveToken>)> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("bestmove") {
        return None;
    }
    let best = tokens.next().and_then(|t| t.parse::<MoveToken>().ok());
    let ponder = match (tokens.next(), tokens.next()) {
        (Some("ponder"), Some(mv)) => mv.parse::<MoveToken>().ok(),
        _ => None,
    };
    Some((best, ponder))
}

impl HandshakeCommand {
    fn consume(&mut self, line: &str) -> ConsumeResult {
        if let Some(name) = line.strip_prefix("id name ") {
            self.identity.name = Some(name.trim().to_string());
        } else if let Some(author) = line.strip_prefix("id author ") {
            self.identity.author = Some(author.trim().to_string());
        }

        if !line.contains("uciok") {
            return ConsumeResult::Continue;
        }
        tracing::debug!("Received uciok from {:?}", self.identity.name);
        resolve(&mut self.reply, Ok(std::mem::take(&mut self.identity)));
        ConsumeResult::Done
    }
}

impl DescribeCommand {
    fn consume(&mut self, line: &str) -> ConsumeResult {
        if let Some(rest) = after(line, "Legal uci moves:") {
            self.lan = Some(words(rest));
            let result = self.build();
            resolve(&mut self.reply, result);
            return ConsumeResult::Done;
        }

        if let Some(rest) = after(line, "Legal moves:") {
            self.san = Some(words(rest));
        } else if let Some(rest) = after(line, "Fen:") {
            self.fen = Some(rest.to_string());
        } else if let Some(rest) = after(line, "Key:") {
            self.key = Some(rest.to_string());
        } else if let Some(rest) = after(line, "Checkers:") {
            self.checkers = Some(words(rest));
        }
        ConsumeResult::Continue
    }

    fn build(&mut self) -> Result<DescribeResult, UciError> {
        let missing: Vec<&'static str> = [
            ("legal moves", self.san.is_none()),
            ("legal uci moves", self.lan.is_none()),
            ("fen", self.fen.is_none()),
            ("key", self.key.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        let (Some(san), Some(lan), Some(fen), Some(key)) = (
            self.san.take(),
            self.lan.take(),
            self.fen.take(),
            self.key.take(),
        ) else {
            return Err(UciError::IncompleteDescribe { missing });
        };

        if san.len() != lan.len() {
            return Err(UciError::MismatchedMoveLists {
                san: san.len(),
                lan: lan.len(),
            });
        }

        let moves = lan
            .iter()
            .zip(san)
            .map(|(lan, san)| -> Result<LegalMove, UciError> {
                Ok(LegalMove {
                    lan: lan.parse()?,
                    san,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DescribeResult {
            moves,
            fen,
            checkers: self.checkers.take().unwrap_or_default(),
            key,
        })
    }
}

impl EvalCommand {
    fn consume(&mut self, line: &str) -> ConsumeResult {
        let Some(rest) = after(line, "Total Evaluation:") else {
            return ConsumeResult::Continue;
        };

        let value = rest
            .split_whitespace()
            .next()
            .map(|token| token.strip_prefix('+').unwrap_or(token))
            .filter(|token| is_number_token(token))
            .and_then(|token| token.parse::<f64>().ok());

        let result = value.ok_or_else(|| UciError::EvaluationNotFound(line.to_string()));
        resolve(&mut self.reply, result);
        ConsumeResult::Done
    }
}

impl AnalyzeCommand {
    fn consume(&mut self, line: &str) -> ConsumeResult {
        let Some((best, _)) = best_move(line) else {
            return ConsumeResult::Continue;
        };
        let result = best.ok_or_else(|| UciError::NoBestMove(line.to_string()));
        resolve(&mut self.reply, result);
        ConsumeResult::Done
    }
}

impl SearchCommand {
    fn consume(&mut self, line: &str) -> ConsumeResult {
        if line.split_whitespace().next() == Some("info") {
            match parse_info_line(line) {
                Ok(info) => self.info.push(info),
                Err(e) => {
                    tracing::warn!("Unparsable info line during search: {}", e);
                    // Keep waiting for bestmove so the queue stays aligned.
                    self.error.get_or_insert(e);
                }
            }
            return ConsumeResult::Continue;
        }

        let Some((best, ponder)) = best_move(line) else {
            return ConsumeResult::Continue;
        };
        let result = match (self.error.take(), best) {
            (Some(e), _) => Err(e),
            (None, None) => Err(UciError::NoBestMove(line.to_string())),
            (None, Some(best_move)) => Ok(SearchReport {
                best_move,
                ponder,
                info: std::mem::take(&mut self.info),
            }),
        };
        resolve(&mut self.reply, result);
        ConsumeResult::Done
    }
}
