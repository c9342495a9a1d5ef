use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::command::{Command, ConsumeResult};
use crate::uci::UciError;

/// Outbound half of the process channel. Sends are fire-and-forget.
pub trait Outbox {
    fn post(&mut self, message: &str);
}

impl Outbox for mpsc::UnboundedSender<String> {
    fn post(&mut self, message: &str) {
        if self.send(message.to_string()).is_err() {
            tracing::warn!("Engine input closed, dropping '{}'", message);
        }
    }
}

struct Entry {
    id: u64,
    cmd: Command,
    /// Follow the `go` with `stop` as soon as it is sent.
    stop_on_send: bool,
}

impl Entry {
    fn new(id: u64, cmd: Command) -> Self {
        Self {
            id,
            cmd,
            stop_on_send: false,
        }
    }
}

/// FIFO of commands for one engine.
///
/// While the queue is non-empty its head has been sent and is waiting for the
/// engine; everything behind it is unsent. Commands that expect no reply never
/// stay in the queue.
#[derive(Default)]
pub struct CommandQueue {
    pending: VecDeque<Entry>,
    next_id: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Sequence number of the command currently awaiting the engine.
    pub fn in_flight_id(&self) -> Option<u64> {
        self.pending.front().map(|entry| entry.id)
    }

    pub fn in_flight(&self) -> Option<&Command> {
        self.pending.front().map(|entry| &entry.cmd)
    }

    pub fn enqueue(&mut self, cmd: Command, out: &mut impl Outbox) {
        let id = self.next_id;
        self.next_id += 1;

        if !self.pending.is_empty() {
            tracing::debug!("Queueing '{}' behind {} command(s)", cmd.label(), self.len());
            self.pending.push_back(Entry::new(id, cmd));
            return;
        }

        let entry = Entry::new(id, cmd);
        send(&entry, out);
        if entry.cmd.expects_reply() {
            self.pending.push_back(entry);
        } else {
            self.advance(out);
        }
    }

    /// Route one engine line to the in-flight command.
    ///
    /// Returns [`UciError::OrphanLine`] when nothing is waiting; the queue is
    /// left untouched in that case.
    pub fn on_line(&mut self, line: &str, out: &mut impl Outbox) -> Result<(), UciError> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let Some(head) = self.pending.front_mut() else {
            return Err(UciError::OrphanLine(line.to_string()));
        };

        if head.cmd.consume(line) == ConsumeResult::Done {
            if let Some(done) = self.pending.pop_front() {
                tracing::debug!("Command '{}' finished", done.cmd.label());
            }
            self.advance(out);
        }
        Ok(())
    }

    /// Give up on the in-flight command and move on to the next one.
    pub fn expire(&mut self, err: UciError, out: &mut impl Outbox) {
        if let Some(mut head) = self.pending.pop_front() {
            tracing::warn!("Abandoning '{}': {}", head.cmd.label(), err);
            head.cmd.fail(err);
            self.advance(out);
        }
    }

    /// Resolve the in-flight command with `err` but keep it at the head, so it
    /// goes on swallowing the engine's lines until it sees its own end marker.
    pub fn fail_in_flight(&mut self, err: UciError) {
        if let Some(head) = self.pending.front_mut() {
            tracing::warn!("Giving up on '{}': {}", head.cmd.label(), err);
            head.cmd.fail(err);
        }
    }

    /// End the oldest search: at once if it is in flight, otherwise right
    /// after its `go` goes out. Returns `false` when no search is queued.
    pub fn stop(&mut self, out: &mut impl Outbox) -> bool {
        let Some(idx) = self
            .pending
            .iter()
            .position(|entry| entry.cmd.search_duration().is_some())
        else {
            return false;
        };

        if idx == 0 {
            tracing::debug!("Stopping '{}'", self.pending[0].cmd.label());
            out.post("stop");
        } else {
            tracing::debug!("'{}' will be stopped once sent", self.pending[idx].cmd.label());
            self.pending[idx].stop_on_send = true;
        }
        true
    }

    /// Fail every queued command. Nothing further is sent.
    pub fn close(&mut self) {
        for mut entry in self.pending.drain(..) {
            entry.cmd.fail(UciError::SessionClosed);
        }
    }

    fn advance(&mut self, out: &mut impl Outbox) {
        while let Some(head) = self.pending.front() {
            send(head, out);
            if head.cmd.expects_reply() {
                return;
            }
            self.pending.pop_front();
        }
    }
}

fn send(entry: &Entry, out: &mut impl Outbox) {
    if let Some(message) = entry.cmd.message() {
        tracing::debug!("Sending '{}'", message);
        out.post(message);
    }
    if entry.stop_on_send {
        out.post("stop");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SearchDuration;

    impl Outbox for Vec<String> {
        fn post(&mut self, message: &str) {
            self.push(message.to_string());
        }
    }

    #[test]
    fn test_first_command_is_sent_immediately() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (cmd, _rx) = Command::ready();
        queue.enqueue(cmd, &mut out);
        assert_eq!(out, vec!["isready"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.in_flight().and_then(Command::message), Some("isready"));
    }

    #[test]
    fn test_one_reply_expecting_command_in_flight() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (ready, mut ready_rx) = Command::ready();
        let (eval, mut eval_rx) = Command::static_eval();
        let (search, mut search_rx) = Command::search(SearchDuration::depth(1));
        queue.enqueue(ready, &mut out);
        queue.enqueue(eval, &mut out);
        queue.enqueue(search, &mut out);
        assert_eq!(out, vec!["isready"]);

        queue.on_line("readyok", &mut out).unwrap();
        assert!(ready_rx.try_recv().unwrap().is_ok());
        assert_eq!(out, vec!["isready", "eval"]);

        queue.on_line("Total Evaluation: 0.26 (white side)", &mut out).unwrap();
        assert_eq!(eval_rx.try_recv().unwrap().unwrap(), 0.26);
        assert_eq!(out, vec!["isready", "eval", "go depth 1"]);

        queue.on_line("bestmove e7e5 ponder a2a3", &mut out).unwrap();
        assert_eq!(search_rx.try_recv().unwrap().unwrap().best_move, "e7e5");
        assert!(queue.is_empty());
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_reply_less_commands_drain_together() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (ready, _ready_rx) = Command::ready();
        queue.enqueue(ready, &mut out);
        queue.enqueue(Command::set_position("fen1", &[]), &mut out);
        queue.enqueue(Command::set_option("Hash", Some("32")), &mut out);
        queue.enqueue(Command::set_position("fen2", &[]), &mut out);
        let (describe, _describe_rx) = Command::describe();
        queue.enqueue(describe, &mut out);
        assert_eq!(out, vec!["isready"]);

        queue.on_line("readyok", &mut out).unwrap();
        assert_eq!(
            out,
            vec![
                "isready",
                "position fen fen1",
                "setoption name Hash value 32",
                "position fen fen2",
                "d"
            ]
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_reply_less_commands_on_empty_queue() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        queue.enqueue(Command::Init, &mut out);
        queue.enqueue(Command::set_position("fen1", &[]), &mut out);
        queue.enqueue(Command::set_position("fen2", &[]), &mut out);
        assert_eq!(out, vec!["position fen fen1", "position fen fen2"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_seeded_startup_sequence() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (handshake, mut identity_rx) = Command::handshake();
        queue.enqueue(Command::Init, &mut out);
        queue.enqueue(handshake, &mut out);
        queue.enqueue(Command::ready_barrier(), &mut out);
        let (ready, mut ready_rx) = Command::ready();
        queue.enqueue(ready, &mut out);
        assert_eq!(out, vec!["uci"]);

        for line in [
            "Stockfish 16 by the Stockfish developers",
            "id name Stockfish 16",
            "uciok",
        ] {
            queue.on_line(line, &mut out).unwrap();
        }
        assert!(identity_rx.try_recv().unwrap().is_ok());
        assert_eq!(out, vec!["uci", "isready"]);

        queue.on_line("readyok", &mut out).unwrap();
        assert_eq!(out, vec!["uci", "isready", "isready"]);
        assert!(ready_rx.try_recv().is_err());
        queue.on_line("readyok", &mut out).unwrap();
        assert!(ready_rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_empty_line_is_ignored() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (eval, mut eval_rx) = Command::static_eval();
        queue.enqueue(eval, &mut out);
        let id = queue.in_flight_id();

        queue.on_line("", &mut out).unwrap();
        queue.on_line("   ", &mut out).unwrap();
        assert_eq!(queue.in_flight_id(), id);
        assert_eq!(queue.len(), 1);
        assert_eq!(out, vec!["eval"]);
        assert!(eval_rx.try_recv().is_err());

        // empty lines with nothing queued are not orphans either
        let mut empty = CommandQueue::new();
        assert!(empty.on_line("", &mut out).is_ok());
    }

    #[test]
    fn test_orphan_line() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let err = queue.on_line("info string NNUE loaded", &mut out).unwrap_err();
        assert!(matches!(err, UciError::OrphanLine(ref line) if line == "info string NNUE loaded"));
        assert!(queue.is_empty());
        assert!(out.is_empty());

        // the queue still works afterwards
        let (ready, mut ready_rx) = Command::ready();
        queue.enqueue(ready, &mut out);
        queue.on_line("readyok", &mut out).unwrap();
        assert!(ready_rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_failed_command_does_not_block_queue() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (eval, mut eval_rx) = Command::static_eval();
        let (ready, mut ready_rx) = Command::ready();
        queue.enqueue(eval, &mut out);
        queue.enqueue(ready, &mut out);

        queue.on_line("Total Evaluation: none", &mut out).unwrap();
        assert!(matches!(
            eval_rx.try_recv().unwrap(),
            Err(UciError::EvaluationNotFound(_))
        ));
        assert_eq!(out, vec!["eval", "isready"]);
        queue.on_line("readyok", &mut out).unwrap();
        assert!(ready_rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_expire_advances() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (search, mut search_rx) = Command::search(SearchDuration::infinite());
        let (ready, _ready_rx) = Command::ready();
        queue.enqueue(search, &mut out);
        queue.enqueue(ready, &mut out);
        let first = queue.in_flight_id();

        queue.expire(UciError::SessionClosed, &mut out);
        assert!(matches!(
            search_rx.try_recv().unwrap(),
            Err(UciError::SessionClosed)
        ));
        assert_ne!(queue.in_flight_id(), first);
        assert_eq!(out, vec!["go infinite", "isready"]);
    }

    #[test]
    fn test_stop_in_flight_search() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (search, mut search_rx) = Command::search(SearchDuration::infinite());
        queue.enqueue(search, &mut out);

        assert!(queue.stop(&mut out));
        assert_eq!(out, vec!["go infinite", "stop"]);
        queue.on_line("bestmove e2e4", &mut out).unwrap();
        assert_eq!(search_rx.try_recv().unwrap().unwrap().best_move, "e2e4");
    }

    #[test]
    fn test_stop_queued_search_is_sent_with_go() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (ready, _ready_rx) = Command::ready();
        let (analyze, mut analyze_rx) = Command::analyze(SearchDuration::infinite());
        queue.enqueue(ready, &mut out);
        queue.enqueue(analyze, &mut out);

        assert!(queue.stop(&mut out));
        assert_eq!(out, vec!["isready"]);

        queue.on_line("readyok", &mut out).unwrap();
        assert_eq!(out, vec!["isready", "go infinite", "stop"]);
        queue.on_line("bestmove d2d4", &mut out).unwrap();
        assert_eq!(analyze_rx.try_recv().unwrap().unwrap(), "d2d4");
    }

    #[test]
    fn test_stop_without_search() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (ready, _ready_rx) = Command::ready();
        queue.enqueue(ready, &mut out);
        assert!(!queue.stop(&mut out));
        assert_eq!(out, vec!["isready"]);
    }

    #[test]
    fn test_failed_search_drains_until_bestmove() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (search, mut search_rx) = Command::search(SearchDuration::for_time(100));
        let (ready, mut ready_rx) = Command::ready();
        queue.enqueue(search, &mut out);
        queue.enqueue(ready, &mut out);

        queue.fail_in_flight(UciError::SessionClosed);
        assert!(matches!(search_rx.try_recv().unwrap(), Err(UciError::SessionClosed)));
        assert_eq!(queue.len(), 2);

        // the late search output is still attributed to the search
        queue.on_line("info depth 9 pv e2e4", &mut out).unwrap();
        queue.on_line("bestmove e2e4", &mut out).unwrap();
        assert_eq!(out, vec!["go movetime 100", "isready"]);
        assert!(ready_rx.try_recv().is_err());
        queue.on_line("readyok", &mut out).unwrap();
        assert!(ready_rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_close_fails_everything() {
        let mut queue = CommandQueue::new();
        let mut out = Vec::new();
        let (describe, mut describe_rx) = Command::describe();
        let (ready, mut ready_rx) = Command::ready();
        queue.enqueue(describe, &mut out);
        queue.enqueue(ready, &mut out);
        queue.close();
        assert!(queue.is_empty());
        assert!(matches!(describe_rx.try_recv().unwrap(), Err(UciError::SessionClosed)));
        assert!(matches!(ready_rx.try_recv().unwrap(), Err(UciError::SessionClosed)));
        assert_eq!(out, vec!["d"]);
    }
}
