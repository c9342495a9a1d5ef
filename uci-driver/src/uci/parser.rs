use serde::Serialize;

use super::moves::{is_move_token, MoveToken};
use super::UciError;

/// Keyword tagging one field of an `info` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoKey {
    Depth,
    SelDepth,
    Time,
    Nodes,
    Pv,
    MultiPv,
    Score,
    CurrMove,
    CurrMoveNumber,
    HashFull,
    Nps,
    TbHits,
    SbHits,
    CpuLoad,
    String,
    Refutation,
    CurrLine,
}

impl InfoKey {
    /// Keyword as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            InfoKey::Depth => "depth",
            InfoKey::SelDepth => "seldepth",
            InfoKey::Time => "time",
            InfoKey::Nodes => "nodes",
            InfoKey::Pv => "pv",
            InfoKey::MultiPv => "multipv",
            InfoKey::Score => "score",
            InfoKey::CurrMove => "currmove",
            InfoKey::CurrMoveNumber => "currmovenumber",
            InfoKey::HashFull => "hashfull",
            InfoKey::Nps => "nps",
            InfoKey::TbHits => "tbhits",
            InfoKey::SbHits => "sbhits",
            InfoKey::CpuLoad => "cpuload",
            InfoKey::String => "string",
            InfoKey::Refutation => "refutation",
            InfoKey::CurrLine => "currline",
        }
    }
}

/// Bound qualifier on a centipawn score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBound {
    LowerBound,
    UpperBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Score {
    Centipawns {
        #[serde(rename = "cp")]
        value: f64,
        #[serde(rename = "precision", skip_serializing_if = "Option::is_none")]
        bound: Option<ScoreBound>,
    },
    /// Mate in N moves, negative when the side to move is being mated.
    Mate {
        #[serde(rename = "mate")]
        moves: f64,
    },
}

/// Value of a `currline` field: the searching CPU and its current line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrLine {
    pub cpunr: f64,
    pub moves: Vec<MoveToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InfoValue {
    Number(f64),
    Text(String),
    Move(MoveToken),
    Moves(Vec<MoveToken>),
    Score(Score),
    CurrLine(CurrLine),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoField {
    pub key: InfoKey,
    pub value: InfoValue,
}

/// A parsed `info` line. Fields keep the order the engine sent them in, and
/// a key may repeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct InfoLine {
    fields: Vec<InfoField>,
}

impl InfoLine {
    pub fn fields(&self) -> &[InfoField] {
        &self.fields
    }

    /// First value recorded for `key`.
    pub fn get(&self, key: InfoKey) -> Option<&InfoValue> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> IntoIterator for &'a InfoLine {
    type Item = &'a InfoField;
    type IntoIter = std::slice::Iter<'a, InfoField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

type Rule = fn(&mut InfoParser<'_>) -> Result<InfoValue, UciError>;

const RULES: &[(InfoKey, Rule)] = &[
    (InfoKey::Depth, parse_scalar),
    (InfoKey::SelDepth, parse_scalar),
    (InfoKey::Time, parse_scalar),
    (InfoKey::Nodes, parse_scalar),
    (InfoKey::Pv, parse_move_list),
    (InfoKey::MultiPv, parse_scalar),
    (InfoKey::Score, parse_score),
    (InfoKey::CurrMove, parse_single_move),
    (InfoKey::CurrMoveNumber, parse_scalar),
    (InfoKey::HashFull, parse_scalar),
    (InfoKey::Nps, parse_scalar),
    (InfoKey::TbHits, parse_scalar),
    (InfoKey::SbHits, parse_scalar),
    (InfoKey::CpuLoad, parse_scalar),
    (InfoKey::String, parse_free_text),
    (InfoKey::Refutation, parse_move_list),
    (InfoKey::CurrLine, parse_currline),
];

/// Parse an `info ...` status line into its ordered fields.
pub fn parse_info_line(line: &str) -> Result<InfoLine, UciError> {
    let mut parser = InfoParser::new(line);
    parser.expect("info")?;

    let mut fields = Vec::new();
    while let Some(token) = parser.peek() {
        let (key, rule) = RULES
            .iter()
            .find(|(key, _)| key.as_str() == token)
            .copied()
            .ok_or_else(|| UciError::UnknownField {
                line: line.to_string(),
                position: parser.pos,
                token: token.to_string(),
            })?;
        parser.advance();
        let value = rule(&mut parser)?;
        fields.push(InfoField { key, value });
    }

    Ok(InfoLine { fields })
}

/// Check whether a token is numeric: optional `-`, digits, optional fraction.
pub fn is_number_token(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let (int, frac) = match digits.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (digits, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());

    all_digits(int) && frac.is_none_or(all_digits)
}

/// Token cursor with one token of lookahead. Never backtracks.
struct InfoParser<'a> {
    line: &'a str,
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> InfoParser<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            line,
            tokens: line.split_whitespace().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn expect(&mut self, token: &str) -> Result<(), UciError> {
        match self.peek() {
            Some(next) if next == token => {
                self.advance();
                Ok(())
            }
            found => Err(self.malformed(&format!("'{token}'"), found)),
        }
    }

    fn number(&mut self) -> Result<f64, UciError> {
        match self.peek() {
            Some(next) if is_number_token(next) => {
                let value = next
                    .parse()
                    .map_err(|_| self.malformed("number", Some(next)))?;
                self.advance();
                Ok(value)
            }
            found => Err(self.malformed("number", found)),
        }
    }

    fn move_list(&mut self) -> Vec<MoveToken> {
        let mut moves = Vec::new();
        while let Some(next) = self.peek().filter(|t| is_move_token(t)) {
            moves.push(MoveToken(next.to_string()));
            self.advance();
        }
        moves
    }

    fn malformed(&self, expected: &str, found: Option<&str>) -> UciError {
        UciError::MalformedLine {
            line: self.line.to_string(),
            position: self.pos,
            expected: expected.to_string(),
            found: found.map(str::to_string),
        }
    }
}

fn parse_scalar(p: &mut InfoParser<'_>) -> Result<InfoValue, UciError> {
    p.number().map(InfoValue::Number)
}

fn parse_move_list(p: &mut InfoParser<'_>) -> Result<InfoValue, UciError> {
    Ok(InfoValue::Moves(p.move_list()))
}

fn parse_single_move(p: &mut InfoParser<'_>) -> Result<InfoValue, UciError> {
    match p.peek() {
        Some(next) if is_move_token(next) => {
            p.advance();
            Ok(InfoValue::Move(MoveToken(next.to_string())))
        }
        found => Err(p.malformed("move", found)),
    }
}

fn parse_score(p: &mut InfoParser<'_>) -> Result<InfoValue, UciError> {
    let score = match p.peek() {
        Some("cp") => {
            p.advance();
            let value = p.number()?;
            let bound = match p.peek() {
                Some("lowerbound") => Some(ScoreBound::LowerBound),
                Some("upperbound") => Some(ScoreBound::UpperBound),
                _ => None,
            };
            if bound.is_some() {
                p.advance();
            }
            Score::Centipawns { value, bound }
        }
        Some("mate") => {
            p.advance();
            Score::Mate { moves: p.number()? }
        }
        found => return Err(p.malformed("one of [cp, mate]", found)),
    };
    Ok(InfoValue::Score(score))
}

fn parse_currline(p: &mut InfoParser<'_>) -> Result<InfoValue, UciError> {
    let cpunr = match p.peek() {
        Some(next) if is_number_token(next) => p.number()?,
        _ => 0.0,
    };
    let moves = p.move_list();
    Ok(InfoValue::CurrLine(CurrLine { cpunr, moves }))
}

/// Free text runs to the end of the line.
fn parse_free_text(p: &mut InfoParser<'_>) -> Result<InfoValue, UciError> {
    let rest = p.tokens[p.pos..].join(" ");
    p.pos = p.tokens.len();
    Ok(InfoValue::Text(rest.trim().to_string()))
}
