//! Command queue
//!
//! Strict FIFO of commands written to the REPL. Only the head receives stream
//! data. Each stdout chunk is appended to the head's buffer and the head's
//! classifier runs over the whole accumulated buffer, so prompts split across
//! reads are still found. When the head finishes, everything after its prompt
//! is handed to the next command, which is classified again right away because
//! a single read can carry several prompts.
//!
//! Stderr settles the head's reply as rejected, but the command stays at the
//! head until its own prompt arrives. Popping it early would let that prompt
//! finish the next command.
//!
//! The queue is a plain state machine; [`crate::ReplSession`] owns it behind a
//! mutex and feeds it from the stream readers.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::grammar::{self, PromptBoundary};
use crate::types::{Capture, SessionMode};
use crate::{ReplError, Result};

/// Decides whether an accumulated stdout buffer finishes a command.
pub type StdoutClassifier = fn(&str) -> Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pending,
    Resolve(PromptBoundary),
    /// A prompt arrived, but not the one the command needs.
    Reject {
        boundary: PromptBoundary,
        expected: SessionMode,
    },
}

/// Any prompt finishes the command.
pub fn default_classifier(buffer: &str) -> Verdict {
    match grammar::find_prompt(buffer) {
        Some(boundary) => Verdict::Resolve(boundary),
        None => Verdict::Pending,
    }
}

/// Only the debug prompt counts as success; the shell prompt means nothing was paused.
pub fn debug_only_classifier(buffer: &str) -> Verdict {
    match grammar::find_prompt(buffer) {
        Some(boundary) if boundary.mode == SessionMode::Debug => Verdict::Resolve(boundary),
        Some(boundary) => Verdict::Reject {
            boundary,
            expected: SessionMode::Debug,
        },
        None => Verdict::Pending,
    }
}

pub(crate) type Reply = oneshot::Sender<Result<Capture>>;

struct PendingCommand {
    id: u64,
    text: String,
    classifier: StdoutClassifier,
    stdout: String,
    stderr: String,
    /// Taken once the outcome is decided.
    reply: Option<Reply>,
}

pub struct CommandQueue {
    pending: VecDeque<PendingCommand>,
    last_line: String,
    next_id: u64,
    closed: bool,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            last_line: String::new(),
            next_id: 0,
            closed: false,
        }
    }

    /// Appends a command at the tail. Fails once the REPL has exited.
    pub fn push(
        &mut self,
        text: &str,
        classifier: StdoutClassifier,
    ) -> Result<(u64, oneshot::Receiver<Result<Capture>>)> {
        if self.closed {
            return Err(ReplError::Terminated);
        }

        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.push_back(PendingCommand {
            id,
            text: text.to_string(),
            classifier,
            stdout: String::new(),
            stderr: String::new(),
            reply: Some(tx),
        });

        Ok((id, rx))
    }

    /// Drops a command that never reached the REPL. Only the tail can be in that state.
    pub fn remove(&mut self, id: u64) -> bool {
        if self.pending.back().map(|c| c.id) == Some(id) {
            self.pending.pop_back();
            true
        } else {
            false
        }
    }

    pub fn on_stdout(&mut self, chunk: &str) {
        self.last_line = grammar::last_line(chunk).to_string();

        let Some(head) = self.pending.front_mut() else {
            tracing::warn!("Unattributable REPL stdout with no pending command: {:?}", chunk);
            return;
        };
        head.stdout.push_str(chunk);

        self.settle_ready();
    }

    pub fn on_stderr(&mut self, chunk: &str) {
        self.last_line = grammar::last_line(chunk).to_string();

        let Some(head) = self.pending.front_mut() else {
            tracing::warn!("Unattributable REPL stderr with no pending command: {:?}", chunk);
            return;
        };
        head.stderr.push_str(chunk);

        if let Some(reply) = head.reply.take() {
            tracing::debug!(id = head.id, command = %head.text, "Command rejected by stderr");
            let _ = reply.send(Err(ReplError::rejected(&head.text, head.stderr.clone())));
        }
    }

    /// Fails every queued command with [`ReplError::Terminated`] and refuses new ones.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        let mut failed = 0;
        for mut command in self.pending.drain(..) {
            if let Some(reply) = command.reply.take() {
                let _ = reply.send(Err(ReplError::Terminated));
                failed += 1;
            }
        }
        failed
    }

    /// Last line of the most recent chunk, or of the residual left when the queue drained.
    pub fn last_line(&self) -> &str {
        &self.last_line
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn settle_ready(&mut self) {
        loop {
            let Some(head) = self.pending.front() else {
                return;
            };

            // A command already rejected through stderr only waits for its prompt.
            let verdict = if head.reply.is_some() {
                (head.classifier)(&head.stdout)
            } else {
                default_classifier(&head.stdout)
            };
            let boundary = match verdict {
                Verdict::Pending => return,
                Verdict::Resolve(boundary) | Verdict::Reject { boundary, .. } => boundary,
            };

            let Some(mut head) = self.pending.pop_front() else {
                return;
            };
            let residual = head.stdout.split_off(boundary.end);

            if let Some(reply) = head.reply.take() {
                let outcome = match verdict {
                    Verdict::Reject { expected, .. } => Err(ReplError::WrongMode {
                        command: head.text.clone(),
                        expected,
                        found: boundary.mode,
                    }),
                    _ => Ok(Capture {
                        command: head.text.clone(),
                        output: head.stdout[..boundary.start].to_string(),
                        raw: head.stdout,
                        mode: boundary.mode,
                    }),
                };
                tracing::debug!(
                    id = head.id,
                    command = %head.text,
                    mode = %boundary.mode,
                    ok = outcome.is_ok(),
                    "Command settled"
                );
                if reply.send(outcome).is_err() {
                    tracing::debug!(id = head.id, "Caller stopped waiting for command");
                }
            } else {
                tracing::debug!(id = head.id, command = %head.text, "Rejected command reached its prompt");
            }

            match self.pending.front_mut() {
                Some(next) => {
                    next.stdout.insert_str(0, &residual);
                }
                None => {
                    if !residual.is_empty() {
                        tracing::warn!("Unattributable REPL output after last prompt: {:?}", residual);
                        self.last_line = grammar::last_line(&residual).to_string();
                    }
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Rx = oneshot::Receiver<Result<Capture>>;

    fn push(queue: &mut CommandQueue, text: &str) -> Rx {
        queue.push(text, default_classifier).expect("queue open").1
    }

    fn settled(rx: &mut Rx) -> Option<Result<Capture>> {
        rx.try_recv().ok()
    }

    fn output(rx: &mut Rx) -> String {
        settled(rx)
            .expect("command should be settled")
            .expect("command should succeed")
            .output
    }

    #[test]
    fn resolution_waits_for_split_prompt() {
        let mut queue = CommandQueue::new();
        let mut rx = push(&mut queue, "disp('partial-prompt')");

        queue.on_stdout("partial-pr");
        assert!(settled(&mut rx).is_none());
        assert_eq!(queue.len(), 1);

        queue.on_stdout("ompt>> ");
        assert_eq!(output(&mut rx), "partial-prompt");
        assert!(queue.is_empty());
    }

    #[test]
    fn settlement_order_is_independent_of_chunking() {
        let stream = "\nans =\n\n     1\n\n>> \nans =\n\n     2\n\nK>> \nans =\n\n     3\n\nK>> >> ";
        let expected = [
            ("\nans =\n\n     1\n\n", SessionMode::Shell),
            ("\nans =\n\n     2\n\n", SessionMode::Debug),
            ("\nans =\n\n     3\n\n", SessionMode::Debug),
            ("", SessionMode::Shell),
        ];

        for chunk_size in 1..=9 {
            let mut queue = CommandQueue::new();
            let mut receivers: Vec<Rx> = (0..expected.len())
                .map(|i| push(&mut queue, &format!("cmd{i}")))
                .collect();

            let bytes = stream.as_bytes();
            for piece in bytes.chunks(chunk_size) {
                queue.on_stdout(std::str::from_utf8(piece).expect("ascii stream"));
            }

            for (rx, (text, mode)) in receivers.iter_mut().zip(expected) {
                let capture = settled(rx)
                    .expect("settled")
                    .expect("success");
                assert_eq!(capture.output, text, "chunk size {chunk_size}");
                assert_eq!(capture.mode, mode, "chunk size {chunk_size}");
            }
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn residual_text_is_forwarded_to_next_command() {
        let mut queue = CommandQueue::new();
        let mut first = push(&mut queue, "a");
        let mut second = push(&mut queue, "b");

        queue.on_stdout("A-output\n>> B-");
        assert_eq!(output(&mut first), "A-output\n");
        assert!(settled(&mut second).is_none());

        queue.on_stdout("output\n>> ");
        assert_eq!(output(&mut second), "B-output\n");
    }

    #[test]
    fn prompt_token_in_output_does_not_finish_the_command() {
        let mut queue = CommandQueue::new();
        let mut first = push(&mut queue, "disp('a >> b')");
        let mut second = push(&mut queue, "x");

        queue.on_stdout("a >> b\n>> ");
        assert_eq!(output(&mut first), "a >> b\n");
        assert!(settled(&mut second).is_none());

        queue.on_stdout("x = 5\n>> ");
        assert_eq!(output(&mut second), "x = 5\n");
        assert!(queue.is_empty());
    }

    #[test]
    fn one_chunk_can_settle_several_commands() {
        let mut queue = CommandQueue::new();
        let mut first = push(&mut queue, "a");
        let mut second = push(&mut queue, "b");
        let mut third = push(&mut queue, "c");

        queue.on_stdout(">> one\n>> two\nK>> ");
        assert_eq!(output(&mut first), "");
        assert_eq!(output(&mut second), "one\n");
        let capture = settled(&mut third).expect("settled").expect("success");
        assert_eq!(capture.output, "two\n");
        assert_eq!(capture.raw, "two\nK>> ");
        assert_eq!(capture.mode, SessionMode::Debug);
    }

    #[test]
    fn stderr_rejects_but_keeps_command_until_its_prompt() {
        let mut queue = CommandQueue::new();
        let mut bad = push(&mut queue, "bad");
        let mut good = push(&mut queue, "x");

        queue.on_stderr("Undefined function 'bad'.\n");
        match settled(&mut bad) {
            Some(Err(ReplError::Rejected { command, stderr })) => {
                assert_eq!(command, "bad");
                assert_eq!(stderr, "Undefined function 'bad'.\n");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(queue.len(), 2);

        // The failed command's own prompt must not finish the next command.
        queue.on_stdout(">> ");
        assert!(settled(&mut good).is_none());
        assert_eq!(queue.len(), 1);

        queue.on_stdout("x = 5\n>> ");
        assert_eq!(output(&mut good), "x = 5\n");
    }

    #[test]
    fn debug_only_classifier_rejects_shell_prompt() {
        let mut queue = CommandQueue::new();
        let (_, mut rx) = queue
            .push("dbstack('-completenames')", debug_only_classifier)
            .expect("queue open");

        queue.on_stdout(">> ");
        match settled(&mut rx) {
            Some(Err(ReplError::WrongMode {
                expected, found, ..
            })) => {
                assert_eq!(expected, SessionMode::Debug);
                assert_eq!(found, SessionMode::Shell);
            }
            other => panic!("expected wrong mode, got {other:?}"),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn debug_only_classifier_resolves_on_debug_prompt() {
        let mut queue = CommandQueue::new();
        let (_, mut rx) = queue
            .push("dbstack('-completenames')", debug_only_classifier)
            .expect("queue open");

        queue.on_stdout("In /a/b.m (line 3)\nK>> ");
        assert_eq!(output(&mut rx), "In /a/b.m (line 3)\n");
    }

    #[test]
    fn unsolicited_output_is_discarded_without_corrupting_the_queue() {
        let mut queue = CommandQueue::new();
        queue.on_stdout("Warning: something happened\n>> ");
        queue.on_stderr("stray error\n");
        assert_eq!(queue.last_line(), "");
        assert!(queue.is_empty());

        let mut rx = push(&mut queue, "y");
        queue.on_stdout("y = 2\n>> ");
        assert_eq!(output(&mut rx), "y = 2\n");
    }

    #[test]
    fn residual_after_last_command_becomes_last_line() {
        let mut queue = CommandQueue::new();
        let mut rx = push(&mut queue, "a");
        queue.on_stdout("done\n>> trailing\nK>");
        assert_eq!(output(&mut rx), "done\n");
        assert_eq!(queue.last_line(), "K>");
    }

    #[test]
    fn close_fails_pending_and_refuses_new_commands() {
        let mut queue = CommandQueue::new();
        let mut first = push(&mut queue, "a");
        let mut second = push(&mut queue, "b");

        assert_eq!(queue.close(), 2);
        assert!(matches!(settled(&mut first), Some(Err(ReplError::Terminated))));
        assert!(matches!(settled(&mut second), Some(Err(ReplError::Terminated))));
        assert!(matches!(
            queue.push("c", default_classifier),
            Err(ReplError::Terminated)
        ));
    }

    #[test]
    fn remove_only_drops_the_tail() {
        let mut queue = CommandQueue::new();
        let (first, _rx1) = queue.push("a", default_classifier).expect("open");
        let (second, _rx2) = queue.push("b", default_classifier).expect("open");

        assert!(!queue.remove(first));
        assert!(queue.remove(second));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn dropped_receiver_does_not_stall_the_queue() {
        let mut queue = CommandQueue::new();
        drop(push(&mut queue, "a"));
        let mut rx = push(&mut queue, "b");

        queue.on_stdout(">> b\n>> ");
        assert_eq!(output(&mut rx), "b\n");
    }
}
