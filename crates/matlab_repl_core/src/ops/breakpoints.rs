use crate::decode::{self, succeeded};
use crate::queue::default_classifier;
use crate::types::{Breakpoint, BreakpointStatus};
use crate::{ReplSession, Result};

/// Sets one breakpoint. The id is taken before the command is written, so a
/// rejected breakpoint still consumes one.
pub async fn set_breakpoint(session: &ReplSession, source_path: &str, line: u32) -> Result<Breakpoint> {
    let id = session.next_breakpoint_id();
    let command = dbstop_command(source_path, line);
    let verified = succeeded(session.execute(&command, default_classifier).await)?;

    if !verified {
        tracing::warn!(id, source_path, line, "REPL rejected breakpoint");
    }

    Ok(Breakpoint {
        id,
        source_path: source_path.to_string(),
        line,
        verified,
    })
}

/// Replaces every breakpoint in `source_path` with `lines`.
///
/// All commands are pipelined; results come back in `lines` order.
pub async fn set_breakpoints(
    session: &ReplSession,
    source_path: &str,
    lines: &[u32],
) -> Result<Vec<Breakpoint>> {
    let clear = session
        .enqueue(&dbclear_command(Some(source_path)), default_classifier)
        .await?;

    let mut pending = Vec::with_capacity(lines.len());
    for &line in lines {
        let id = session.next_breakpoint_id();
        let reply = session
            .enqueue(&dbstop_command(source_path, line), default_classifier)
            .await?;
        pending.push((id, line, reply));
    }

    if !succeeded(clear.wait().await)? {
        tracing::debug!(source_path, "Clearing breakpoints before replacing them was rejected");
    }

    let mut breakpoints = Vec::with_capacity(pending.len());
    for (id, line, reply) in pending {
        breakpoints.push(Breakpoint {
            id,
            source_path: source_path.to_string(),
            line,
            verified: succeeded(reply.wait().await)?,
        });
    }
    Ok(breakpoints)
}

/// `None` clears every breakpoint in the session.
pub async fn clear_breakpoints(session: &ReplSession, source_path: Option<&str>) -> Result<bool> {
    succeeded(
        session
            .execute(&dbclear_command(source_path), default_classifier)
            .await,
    )
}

/// What the REPL itself reports for `source_path`. A rejected query reads as
/// no breakpoints.
pub async fn breakpoint_status(session: &ReplSession, source_path: &str) -> Result<Vec<BreakpointStatus>> {
    match session
        .execute(&format!("dbstatus {source_path}"), default_classifier)
        .await
    {
        Ok(capture) => Ok(decode::breakpoint_status(&capture.output)),
        Err(e) if e.is_rejection() => {
            tracing::debug!("dbstatus rejected: {}", e);
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

fn dbstop_command(source_path: &str, line: u32) -> String {
    format!("dbstop in {source_path} at {line}")
}

fn dbclear_command(source_path: Option<&str>) -> String {
    match source_path {
        Some(path) => format!("dbclear in {path}"),
        None => "dbclear all".to_string(),
    }
}
