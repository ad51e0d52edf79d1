use crate::decode::succeeded;
use crate::events::{SessionEvent, StopReason};
use crate::ops::setup;
use crate::queue::default_classifier;
use crate::types::SessionMode;
use crate::{ReplError, ReplSession, Result};

/// Steps one line. Emits [`SessionEvent::StepCompleted`] when the REPL accepts it.
pub async fn step(session: &ReplSession) -> Result<bool> {
    let stepped = succeeded(session.execute("dbstep", default_classifier).await)?;
    if stepped {
        session.events().emit(SessionEvent::StepCompleted);
    }
    Ok(stepped)
}

/// `dbcont` when paused, otherwise `run("<program>")`.
///
/// `mode` must come from a probe issued just before; it is never inferred here.
pub fn run_or_continue_command(mode: SessionMode, program: Option<&str>) -> Result<String> {
    match (mode, program) {
        (SessionMode::Debug, _) => Ok("dbcont".to_string()),
        (SessionMode::Shell, Some(program)) => Ok(format!("run(\"{program}\")")),
        (SessionMode::Shell, None) => Err(ReplError::NothingToRun),
    }
}

/// Runs or continues the program. Emits a breakpoint stop when execution
/// comes back on the debug prompt.
pub async fn run_or_continue(
    session: &ReplSession,
    mode: SessionMode,
    program: Option<&str>,
) -> Result<bool> {
    let command = run_or_continue_command(mode, program)?;
    match session.execute(&command, default_classifier).await {
        Ok(capture) => {
            if capture.mode.is_paused() {
                session
                    .events()
                    .emit(SessionEvent::stopped(StopReason::Breakpoint));
            }
            Ok(true)
        }
        Err(e) if e.is_rejection() => {
            tracing::debug!("{} rejected: {}", command, e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Brings a fresh session up and starts `program`.
///
/// Returns the mode the REPL is in once `run` comes back: debug when it
/// stopped on entry or at a breakpoint, shell when the program ran to the end.
pub async fn launch(session: &ReplSession, program: &str, stop_on_entry: bool) -> Result<SessionMode> {
    if !setup::wait_ready(session).await? {
        tracing::warn!("REPL wrote to stderr before its first prompt");
    }
    if !setup::inhibit_gui(session).await? {
        tracing::warn!("Could not inhibit editor pop-ups at breakpoints");
    }

    if stop_on_entry {
        let (changed, entry) = setup::prepare_debug_mode(session, program).await?;
        if !changed || !entry {
            tracing::warn!(changed, entry, program, "Preparing debug mode partially failed");
        }
    } else {
        let (dir, _) = setup::split_program_path(program);
        if !setup::cd(session, &dir).await? {
            tracing::warn!(dir = %dir, "Could not change into program directory");
        }
    }

    let command = run_or_continue_command(SessionMode::Shell, Some(program))?;
    let capture = session.execute(&command, default_classifier).await?;

    tracing::info!(program, mode = %capture.mode, "Program launched");

    if capture.mode.is_paused() {
        let reason = if stop_on_entry {
            StopReason::Entry
        } else {
            StopReason::Breakpoint
        };
        session.events().emit(SessionEvent::stopped(reason));
    }
    Ok(capture.mode)
}
