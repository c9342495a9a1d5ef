use std::time::Duration;

use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::Instrument;

use super::queue::{CommandQueue, Outbox};
use crate::command::Command;
use crate::uci::UciError;

/// How long an expired search gets to answer `stop` before it is dropped.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Requests sent to the session actor.
pub(crate) enum SessionRequest {
    Enqueue(Command),
    /// End the oldest queued or running search.
    Stop,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Expiry of the in-flight command.
#[derive(Clone, Copy)]
struct Deadline {
    id: u64,
    at: Instant,
    after: Duration,
    /// The search already timed out and was sent `stop`.
    stopping: bool,
}

pub(crate) struct SessionActor {
    pub queue: CommandQueue,
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::Receiver<String>,
    pub requests: mpsc::UnboundedReceiver<SessionRequest>,
    pub command_timeout: Option<Duration>,
    pub child: Option<Child>,
}

/// Run the session actor until shutdown or until the engine's output ends.
/// The actor is the only writer of the queue.
pub(crate) async fn run_session_actor(actor: SessionActor, label: String) {
    run_session_actor_inner(actor)
        .instrument(tracing::info_span!("engine", label = %label))
        .await;
}

async fn run_session_actor_inner(actor: SessionActor) {
    let SessionActor {
        mut queue,
        mut outbound,
        mut inbound,
        mut requests,
        command_timeout,
        child,
    } = actor;

    tracing::info!("Engine session started");

    let mut deadline: Option<Deadline> = None;
    let mut shutdown_reply = None;

    loop {
        deadline = match (queue.in_flight_id(), queue.in_flight()) {
            (Some(id), Some(cmd)) => match deadline {
                Some(tracked) if tracked.id == id => Some(tracked),
                _ => cmd.timeout(command_timeout).map(|after| Deadline {
                    id,
                    at: Instant::now() + after,
                    after,
                    stopping: false,
                }),
            },
            _ => None,
        };
        let expiry = async move {
            match deadline {
                Some(Deadline { at, .. }) => time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            request = requests.recv() => {
                match request {
                    Some(SessionRequest::Enqueue(cmd)) => queue.enqueue(cmd, &mut outbound),
                    Some(SessionRequest::Stop) => {
                        if !queue.stop(&mut outbound) {
                            tracing::debug!("Ignoring stop, no search queued");
                        }
                    }
                    Some(SessionRequest::Shutdown { reply }) => {
                        tracing::info!("Engine session shutting down");
                        shutdown_reply = Some(reply);
                        break;
                    }
                    None => {
                        tracing::info!("All engine handles dropped");
                        break;
                    }
                }
            }

            line = inbound.recv() => {
                match line {
                    Some(line) => {
                        tracing::trace!("UCI << {}", line);
                        if let Err(e) = queue.on_line(&line, &mut outbound) {
                            tracing::warn!("{}", e);
                        }
                    }
                    None => {
                        tracing::warn!(
                            "Engine output closed with {} command(s) pending",
                            queue.len()
                        );
                        break;
                    }
                }
            }

            _ = expiry => {
                let Some(expired) = deadline.as_mut() else {
                    continue;
                };
                let Some(cmd) = queue.in_flight() else {
                    continue;
                };
                let is_search = cmd.search_duration().is_some();
                let err = UciError::Timeout {
                    command: cmd.label().to_string(),
                    after: expired.after,
                };

                if is_search && !expired.stopping {
                    // The engine still owes a bestmove; collect it before moving on.
                    queue.fail_in_flight(err);
                    outbound.post("stop");
                    expired.stopping = true;
                    expired.at = Instant::now() + STOP_GRACE;
                } else {
                    queue.expire(err, &mut outbound);
                }
            }
        }
    }

    drop(requests);
    queue.close();
    outbound.post("quit");
    drop(outbound);

    if let Some(mut child) = child {
        let _ = time::timeout(Duration::from_secs(1), child.wait()).await;
        let _ = child.kill().await;
    }

    if let Some(reply) = shutdown_reply {
        let _ = reply.send(());
    }
    tracing::info!("Engine session exited");
}
