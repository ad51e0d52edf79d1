//! Session events
//!
//! Out-of-band notifications for whoever drives the session (step finished,
//! execution stopped, stderr output, REPL exited). Emission never blocks: events
//! are queued on a broadcast channel and listeners pick them up on their own
//! schedule, after the operation that caused them has already returned.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// The REPL is single-threaded; every stop reports this thread.
pub const THREAD_ID: u64 = 1;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Entry,
    Breakpoint,
    Step,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCategory {
    Console,
    Important,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StepCompleted,
    Stopped {
        reason: StopReason,
        thread_id: u64,
    },
    Output {
        category: OutputCategory,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        line: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        column: Option<u32>,
    },
    Terminated {
        exit_code: Option<i32>,
    },
}

impl SessionEvent {
    pub fn stopped(reason: StopReason) -> Self {
        Self::Stopped {
            reason,
            thread_id: THREAD_ID,
        }
    }

    pub fn output(category: OutputCategory, text: impl Into<String>) -> Self {
        Self::Output {
            category,
            text: text.into(),
            source_path: None,
            line: None,
            column: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Number of listeners that will see the event. Zero is not an error.
    pub fn emit(&self, event: SessionEvent) -> usize {
        tracing::debug!(?event, "Emitting session event");
        self.tx.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listeners_receive_events_in_emission_order() {
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();

        assert_eq!(emitter.emit(SessionEvent::StepCompleted), 1);
        emitter.emit(SessionEvent::stopped(StopReason::Breakpoint));

        assert_eq!(rx.recv().await.unwrap(), SessionEvent::StepCompleted);
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::Stopped {
                reason: StopReason::Breakpoint,
                thread_id: THREAD_ID,
            }
        );
    }

    #[test]
    fn emit_without_listeners_is_harmless() {
        let emitter = EventEmitter::new();
        assert_eq!(emitter.emit(SessionEvent::Terminated { exit_code: Some(0) }), 0);
    }

    #[test]
    fn events_serialize_with_tag() {
        let value = serde_json::to_value(SessionEvent::output(OutputCategory::Stderr, "oops\n"))
            .expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"event": "output", "category": "stderr", "text": "oops\n"})
        );

        let value = serde_json::to_value(SessionEvent::stopped(StopReason::Entry)).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"event": "stopped", "reason": "entry", "thread_id": 1})
        );
    }
}
