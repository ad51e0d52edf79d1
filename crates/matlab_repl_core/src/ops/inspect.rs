use crate::decode;
use crate::queue::{debug_only_classifier, default_classifier};
use crate::types::{EvaluateResult, SessionMode, StackFrame};
use crate::{ReplSession, Result};

/// Runs `expression` verbatim and returns what the REPL printed for it.
///
/// The expression must be a single line; embedded newlines are written as-is
/// and would be read as separate commands.
pub async fn evaluate(session: &ReplSession, expression: &str) -> Result<EvaluateResult> {
    let capture = session.execute(expression, default_classifier).await?;
    Ok(EvaluateResult::new(decode::evaluated_text(&capture.raw)))
}

/// Call stack, innermost frame first. Fails with
/// [`ReplError::WrongMode`](crate::ReplError::WrongMode) when nothing is paused.
pub async fn stack_trace(session: &ReplSession) -> Result<Vec<StackFrame>> {
    let capture = session
        .execute("dbstack('-completenames')", debug_only_classifier)
        .await?;
    Ok(decode::stack_frames(&capture.output))
}

/// Sends an empty line and reports which prompt comes back.
pub async fn probe_mode(session: &ReplSession) -> Result<SessionMode> {
    let capture = session.execute("", default_classifier).await?;
    Ok(capture.mode)
}

pub async fn is_paused(session: &ReplSession) -> Result<bool> {
    let capture = session.execute("", default_classifier).await?;
    Ok(decode::paused(&capture))
}
