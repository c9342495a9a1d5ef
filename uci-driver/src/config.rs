//! Configuration for an engine session.
//!
//! Every value has a compile-time default; the engine path and the
//! per-command timeout can be overridden through environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::uci::UciError;

/// Environment variable naming the engine executable.
pub const ENGINE_PATH_ENV: &str = "UCI_DRIVER_ENGINE_PATH";

/// Environment variable overriding the per-command timeout, in milliseconds.
/// `0` disables the timeout.
pub const COMMAND_TIMEOUT_ENV: &str = "UCI_DRIVER_COMMAND_TIMEOUT_MS";

const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

const COMMON_ENGINE_PATHS: &[&str] = &[
    "/usr/local/bin/stockfish",
    "/usr/bin/stockfish",
    "/opt/homebrew/bin/stockfish",
    "/usr/games/stockfish",
];

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine executable. Resolved from the environment when unset.
    pub path: Option<PathBuf>,
    /// Name used in log spans.
    pub label: Option<String>,
    /// How long a command may wait for the engine before it fails.
    pub command_timeout: Option<Duration>,
    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
    pub skill_level: Option<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: None,
            label: None,
            command_timeout: get_command_timeout(),
            threads: None,
            hash_mb: None,
            skill_level: None,
        }
    }
}

impl EngineConfig {
    pub fn resolve_path(&self) -> Result<PathBuf, UciError> {
        self.path
            .clone()
            .or_else(get_engine_path)
            .ok_or(UciError::EngineNotFound)
    }

    /// `setoption` pairs to send after the handshake, clamped to the ranges
    /// Stockfish accepts.
    pub fn options(&self) -> Vec<(&'static str, String)> {
        let mut options = Vec::new();
        if let Some(threads) = self.threads {
            options.push(("Threads", threads.clamp(1, 16).to_string()));
        }
        if let Some(hash_mb) = self.hash_mb {
            options.push(("Hash", hash_mb.clamp(1, 2048).to_string()));
        }
        if let Some(level) = self.skill_level {
            options.push(("Skill Level", level.min(20).to_string()));
        }
        options
    }
}

/// Get the engine executable.
///
/// Priority:
/// 1. `UCI_DRIVER_ENGINE_PATH` env variable if set
/// 2. common Stockfish install locations
/// 3. `stockfish` on `PATH`
pub fn get_engine_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(ENGINE_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    COMMON_ENGINE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
        .or_else(|| find_on_path("stockfish"))
}

/// Get the per-command timeout.
///
/// Priority:
/// 1. `UCI_DRIVER_COMMAND_TIMEOUT_MS` env variable if set (falls back to the
///    default if the value cannot be parsed as a `u64`)
/// 2. 30 seconds
pub fn get_command_timeout() -> Option<Duration> {
    parse_timeout_ms(std::env::var(COMMAND_TIMEOUT_ENV).ok().as_deref())
}

fn parse_timeout_ms(value: Option<&str>) -> Option<Duration> {
    let ms = value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS);
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
