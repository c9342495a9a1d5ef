use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::UciError;

/// A move in coordinate notation (`e2e4`, `e7e8q`).
///
/// The token is validated for shape only. Legality is the engine's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MoveToken(pub(super) String);

impl MoveToken {
    /// Parse a move token, rejecting anything that is not
    /// `<file><digit><file><digit>[b|r|q|n]`.
    pub fn parse(s: &str) -> Result<Self, UciError> {
        if is_move_token(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(UciError::InvalidMove(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MoveToken {
    type Err = UciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MoveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MoveToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for MoveToken {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Check whether a token has the shape of a coordinate move.
pub fn is_move_token(s: &str) -> bool {
    let b = s.as_bytes();
    let square = |file: u8, rank: u8| (b'a'..=b'h').contains(&file) && rank.is_ascii_digit();

    match b.len() {
        4 => square(b[0], b[1]) && square(b[2], b[3]),
        5 => square(b[0], b[1]) && square(b[2], b[3]) && matches!(b[4], b'b' | b'r' | b'q' | b'n'),
        _ => false,
    }
}
