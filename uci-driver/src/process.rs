use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::uci::UciError;

const LINE_BUFFER: usize = 256;

/// The session's side of an engine channel: commands go out on `outbound`,
/// output lines arrive on `inbound`, one per line, in order.
pub struct EngineIo {
    pub(crate) outbound: mpsc::UnboundedSender<String>,
    pub(crate) inbound: mpsc::Receiver<String>,
    pub(crate) child: Option<Child>,
}

/// The engine's side of an in-memory channel built by [`EngineIo::pair`].
pub struct EngineEnd {
    pub commands: mpsc::UnboundedReceiver<String>,
    pub lines: mpsc::Sender<String>,
}

impl EngineIo {
    /// In-memory channel for engines that live in the host process.
    pub fn pair() -> (Self, EngineEnd) {
        let (outbound, commands) = mpsc::unbounded_channel();
        let (lines, inbound) = mpsc::channel(LINE_BUFFER);
        let io = Self {
            outbound,
            inbound,
            child: None,
        };
        (io, EngineEnd { commands, lines })
    }

    /// Spawn the engine executable with piped stdio.
    #[tracing::instrument(level = "info", skip(config))]
    pub fn spawn(config: &EngineConfig) -> Result<Self, UciError> {
        let path = config.resolve_path()?;
        tracing::info!("Spawning engine at {:?}", path);

        let mut child = tokio::process::Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!("Failed to spawn engine: {}", e);
                UciError::Io(e)
            })?;

        let mut stdin = child.stdin.take().ok_or(UciError::NoStdin)?;
        let stdout = child.stdout.take().ok_or(UciError::NoStdout)?;

        let (outbound, mut commands) = mpsc::unbounded_channel::<String>();
        let (lines, inbound) = mpsc::channel::<String>(LINE_BUFFER);

        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::warn!("Engine stdout EOF - engine closed");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim_end();
                        if lines.send(trimmed.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading from engine stdout: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Output reader task exiting");
        });

        tokio::spawn(async move {
            while let Some(cmd) = commands.recv().await {
                tracing::trace!("UCI >> {}", cmd);
                let write = async {
                    stdin.write_all(cmd.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                };
                if let Err(e) = write.await {
                    tracing::error!("Failed to write to engine stdin: {}", e);
                    break;
                }
            }
            tracing::debug!("Stdin writer task exiting");
        });

        Ok(Self {
            outbound,
            inbound,
            child: Some(child),
        })
    }
}
