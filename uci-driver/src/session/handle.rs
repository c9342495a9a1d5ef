use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::actor::{run_session_actor, SessionActor, SessionRequest};
use super::queue::CommandQueue;
use crate::command::{Command, DescribeResult, EngineIdentity, SearchDuration, SearchReport};
use crate::config::EngineConfig;
use crate::process::EngineIo;
use crate::uci::{MoveToken, UciError};

/// Cheap, cloneable handle to an engine session.
///
/// Every request is queued at call time; the returned future only waits for
/// the engine's answer. Requests are answered in the order they were made.
#[derive(Clone)]
pub struct EngineHandle {
    requests: mpsc::UnboundedSender<SessionRequest>,
    identity: Arc<EngineIdentity>,
}

impl EngineHandle {
    /// Spawn the configured engine executable and complete the handshake.
    #[tracing::instrument(level = "info", skip(config), fields(label = ?config.label))]
    pub async fn spawn(config: EngineConfig) -> Result<Self, UciError> {
        let io = EngineIo::spawn(&config)?;
        Self::start(io, &config).await
    }

    /// Start a session over an existing channel and wait for `uciok`.
    ///
    /// The queue is seeded with the handshake, any configured options and a
    /// readiness barrier, so requests made on the returned handle run after
    /// all of them.
    pub async fn start(io: EngineIo, config: &EngineConfig) -> Result<Self, UciError> {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let EngineIo {
            outbound,
            inbound,
            child,
        } = io;

        let actor = SessionActor {
            queue: CommandQueue::new(),
            outbound,
            inbound,
            requests: requests_rx,
            command_timeout: config.command_timeout,
            child,
        };
        let label = config.label.clone().unwrap_or_else(|| "engine".to_string());
        tokio::spawn(run_session_actor(actor, label));

        let send = |cmd| {
            requests
                .send(SessionRequest::Enqueue(cmd))
                .map_err(|_| UciError::SessionClosed)
        };

        let (handshake, identity_rx) = Command::handshake();
        send(Command::Init)?;
        send(handshake)?;
        for (name, value) in config.options() {
            tracing::info!("Setting {} to {}", name, value);
            send(Command::set_option(name, Some(&value)))?;
        }
        send(Command::ready_barrier())?;

        let identity = identity_rx.await.map_err(|_| UciError::SessionClosed)??;
        tracing::info!(
            "Engine ready: {} by {}",
            identity.name.as_deref().unwrap_or("unknown"),
            identity.author.as_deref().unwrap_or("unknown")
        );

        Ok(Self {
            requests,
            identity: Arc::new(identity),
        })
    }

    /// Name and author the engine reported during the handshake.
    pub fn identity(&self) -> &EngineIdentity {
        &self.identity
    }

    /// Resolves once the engine has answered `isready`.
    pub fn ready(&self) -> impl Future<Output = Result<(), UciError>> + Send + 'static {
        let (cmd, rx) = Command::ready();
        self.request(cmd, rx)
    }

    pub fn describe(
        &self,
    ) -> impl Future<Output = Result<DescribeResult, UciError>> + Send + 'static {
        let (cmd, rx) = Command::describe();
        self.request(cmd, rx)
    }

    /// Static evaluation of the current position, in pawns from white's view.
    pub fn evaluate_static(
        &self,
    ) -> impl Future<Output = Result<f64, UciError>> + Send + 'static {
        let (cmd, rx) = Command::static_eval();
        self.request(cmd, rx)
    }

    /// Set the engine's position. The engine sends no reply.
    pub fn set_position(&self, fen: &str) -> Result<(), UciError> {
        self.enqueue(Command::set_position(fen, &[]))
    }

    pub fn set_position_with_moves(
        &self,
        fen: &str,
        moves: &[MoveToken],
    ) -> Result<(), UciError> {
        self.enqueue(Command::set_position(fen, moves))
    }

    pub fn set_option(&self, name: &str, value: Option<&str>) -> Result<(), UciError> {
        self.enqueue(Command::set_option(name, value))
    }

    /// Search the current position and resolve the best move. `info` lines
    /// are not inspected.
    pub fn analyze(
        &self,
        duration: SearchDuration,
    ) -> impl Future<Output = Result<MoveToken, UciError>> + Send + 'static {
        let (cmd, rx) = Command::analyze(duration);
        self.request(cmd, rx)
    }

    /// Search the current position, keeping every `info` line and the ponder
    /// move. Fails if any `info` line cannot be parsed.
    pub fn search(
        &self,
        duration: SearchDuration,
    ) -> impl Future<Output = Result<SearchReport, UciError>> + Send + 'static {
        let (cmd, rx) = Command::search(duration);
        self.request(cmd, rx)
    }

    /// End the oldest pending search. A search still waiting in the queue is
    /// stopped as soon as its `go` has been sent.
    pub fn stop(&self) -> Result<(), UciError> {
        self.requests
            .send(SessionRequest::Stop)
            .map_err(|_| UciError::SessionClosed)
    }

    /// Send `quit`, fail everything still queued and wait for the session to end.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(SessionRequest::Shutdown { reply: tx }).is_ok() {
            let _ = rx.await;
        }
    }

    fn enqueue(&self, cmd: Command) -> Result<(), UciError> {
        self.requests
            .send(SessionRequest::Enqueue(cmd))
            .map_err(|_| UciError::SessionClosed)
    }

    fn request<T: Send + 'static>(
        &self,
        cmd: Command,
        rx: oneshot::Receiver<Result<T, UciError>>,
    ) -> impl Future<Output = Result<T, UciError>> + Send + 'static {
        let queued = self.enqueue(cmd);
        async move {
            queued?;
            rx.await.map_err(|_| UciError::SessionClosed)?
        }
    }
}
