use std::process::Stdio;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdin, Command},
    sync::{broadcast, oneshot, Mutex},
    task::JoinHandle,
    time::timeout,
};

use crate::events::{EventEmitter, OutputCategory, SessionEvent};
use crate::queue::{default_classifier, CommandQueue, StdoutClassifier};
use crate::types::Capture;
use crate::{ReplConfig, ReplError, Result};

const READ_BUFFER_SIZE: usize = 4096;
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipe {
    Stdout,
    Stderr,
}

/// A command that has been written to the REPL and is waiting for its prompt.
#[derive(Debug)]
pub struct PendingReply {
    command: String,
    rx: oneshot::Receiver<Result<Capture>>,
}

impl PendingReply {
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Waits until the queue settles this command. There is no timeout here.
    pub async fn wait(self) -> Result<Capture> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(ReplError::Terminated),
        }
    }
}

enum Readiness {
    Waiting(PendingReply),
    Settled(bool),
}

/// One running REPL process and the queue of commands written to it.
///
/// All writes to the REPL's stdin go through [`ReplSession::enqueue`]. Clones
/// share the same process; it is killed once the last clone is dropped.
#[derive(Clone)]
pub struct ReplSession {
    writer: Arc<Mutex<ChildStdin>>,
    queue: Arc<Mutex<CommandQueue>>,
    events: EventEmitter,
    readiness: Arc<Mutex<Readiness>>,
    breakpoint_id: Arc<AtomicU64>,
    terminated: Arc<AtomicBool>,
    kill_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    pid: Option<u32>,
}

impl ReplSession {
    /// Starts the REPL described by `config`.
    pub async fn spawn(config: &ReplConfig) -> Result<Self> {
        let mut command = Command::new(&config.executable);
        command.args(config.launch_args());
        Self::spawn_command(command).await
    }

    /// Starts an arbitrary REPL-like program. Its stdio is replaced with pipes.
    pub async fn spawn_command(mut command: Command) -> Result<Self> {
        let program = command.as_std().get_program().to_string_lossy().to_string();

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| ReplError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(ReplError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(ReplError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ReplError::MissingPipe("stderr"))?;
        let pid = child.id();

        tracing::info!(program = %program, pid = ?pid, "Spawned REPL process");

        let mut queue = CommandQueue::new();
        // The banner prompt settles the readiness probe; nothing is written for it.
        let (_, ready_rx) = queue.push("", default_classifier)?;
        let queue = Arc::new(Mutex::new(queue));

        let events = EventEmitter::new();
        let terminated = Arc::new(AtomicBool::new(false));

        let stdout_task = tokio::spawn(pump_stream(
            stdout,
            Pipe::Stdout,
            queue.clone(),
            events.clone(),
        ));
        let stderr_task = tokio::spawn(pump_stream(
            stderr,
            Pipe::Stderr,
            queue.clone(),
            events.clone(),
        ));

        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(watch_exit(
            child,
            kill_rx,
            [stdout_task, stderr_task],
            queue.clone(),
            events.clone(),
            terminated.clone(),
        ));

        Ok(Self {
            writer: Arc::new(Mutex::new(stdin)),
            queue,
            events,
            readiness: Arc::new(Mutex::new(Readiness::Waiting(PendingReply {
                command: String::new(),
                rx: ready_rx,
            }))),
            breakpoint_id: Arc::new(AtomicU64::new(0)),
            terminated,
            kill_tx: Arc::new(Mutex::new(Some(kill_tx))),
            pid,
        })
    }

    /// Appends `command` to the queue and writes it to the REPL right away.
    ///
    /// The returned reply settles when the classifier finds the command's
    /// prompt, or as rejected as soon as anything arrives on stderr.
    pub async fn enqueue(
        &self,
        command: &str,
        classifier: StdoutClassifier,
    ) -> Result<PendingReply> {
        // Holding the writer across push and write keeps queue order equal to write order.
        let mut writer = self.writer.lock().await;
        let (id, rx) = self.queue.lock().await.push(command, classifier)?;

        tracing::debug!(id, command, "Writing command to REPL");

        let line = format!("{command}\n");
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            self.queue.lock().await.remove(id);
            return Err(e.into());
        }

        Ok(PendingReply {
            command: command.to_string(),
            rx,
        })
    }

    /// [`enqueue`](Self::enqueue) and wait for the outcome.
    pub async fn execute(&self, command: &str, classifier: StdoutClassifier) -> Result<Capture> {
        self.enqueue(command, classifier).await?.wait().await
    }

    /// Resolves once the REPL printed its first prompt. `false` if it wrote to
    /// stderr before that.
    ///
    /// Cancelling the call leaves the probe in place for the next caller.
    pub async fn ready(&self) -> Result<bool> {
        let mut readiness = self.readiness.lock().await;
        let outcome = match &mut *readiness {
            Readiness::Settled(ready) => return Ok(*ready),
            Readiness::Waiting(pending) => match (&mut pending.rx).await {
                Ok(result) => result,
                Err(_) => Err(ReplError::Terminated),
            },
        };

        // The receiver is spent; it must not be polled again.
        let ready = crate::decode::succeeded(outcome);
        *readiness = Readiness::Settled(matches!(ready, Ok(true)));
        ready
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Next client-side breakpoint id; never reused within a session.
    pub fn next_breakpoint_id(&self) -> u64 {
        self.breakpoint_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Last line seen on either stream. Diagnostic only; probe the mode before
    /// deciding anything on it.
    pub async fn last_observed_line(&self) -> String {
        self.queue.lock().await.last_line().to_string()
    }

    pub async fn pending_commands(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Kills the REPL. Pending commands fail with [`ReplError::Terminated`]
    /// once the exit is observed.
    pub async fn terminate(&self) {
        if let Some(kill_tx) = self.kill_tx.lock().await.take() {
            tracing::info!(pid = ?self.pid, "Terminating REPL process");
            let _ = kill_tx.send(());
        }
    }
}

async fn pump_stream<R>(
    mut reader: R,
    pipe: Pipe,
    queue: Arc<Mutex<CommandQueue>>,
    events: EventEmitter,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0_u8; READ_BUFFER_SIZE];
    let mut carry = Vec::new();

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(?pipe, "Failed reading REPL stream: {}", e);
                break;
            }
        };

        let chunk = decode_utf8_chunk(&mut carry, &buf[..n]);
        if chunk.is_empty() {
            continue;
        }
        deliver(pipe, &chunk, &queue, &events).await;
    }

    if !carry.is_empty() {
        let chunk = String::from_utf8_lossy(&carry).into_owned();
        deliver(pipe, &chunk, &queue, &events).await;
    }

    tracing::debug!(?pipe, "REPL stream closed");
}

async fn deliver(pipe: Pipe, chunk: &str, queue: &Mutex<CommandQueue>, events: &EventEmitter) {
    {
        let mut queue = queue.lock().await;
        match pipe {
            Pipe::Stdout => queue.on_stdout(chunk),
            Pipe::Stderr => queue.on_stderr(chunk),
        }
    }
    if pipe == Pipe::Stderr {
        events.emit(SessionEvent::output(OutputCategory::Stderr, chunk));
    }
}

/// Decodes `bytes` after whatever was left over from the previous read,
/// holding back an incomplete UTF-8 sequence at the end. Invalid bytes become
/// U+FFFD one sequence at a time.
fn decode_utf8_chunk(carry: &mut Vec<u8>, bytes: &[u8]) -> String {
    carry.extend_from_slice(bytes);

    let mut text = String::with_capacity(carry.len());
    let mut start = 0;
    while start < carry.len() {
        match std::str::from_utf8(&carry[start..]) {
            Ok(valid) => {
                text.push_str(valid);
                start = carry.len();
            }
            Err(e) => {
                let valid_end = start + e.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&carry[start..valid_end]));
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        start = valid_end + len;
                    }
                    None => {
                        start = valid_end;
                        break;
                    }
                }
            }
        }
    }

    carry.drain(..start);
    text
}

async fn watch_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    readers: [JoinHandle<()>; 2],
    queue: Arc<Mutex<CommandQueue>>,
    events: EventEmitter,
    terminated: Arc<AtomicBool>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::warn!("Failed to kill REPL process: {}", e);
            }
            child.wait().await
        }
    };

    // Let the readers hand over whatever the REPL printed before exiting.
    for reader in readers {
        if timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
            tracing::warn!("REPL stream still open after exit; abandoning reader");
        }
    }

    let exit_code = match &status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!("Failed waiting for REPL process: {}", e);
            None
        }
    };

    let failed = queue.lock().await.close();
    terminated.store(true, Ordering::SeqCst);
    tracing::info!(exit_code = ?exit_code, failed_commands = failed, "REPL process exited");

    events.emit(SessionEvent::Terminated { exit_code });
}
