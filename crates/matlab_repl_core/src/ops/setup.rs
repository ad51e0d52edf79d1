use std::path::Path;

use crate::decode::succeeded;
use crate::queue::default_classifier;
use crate::{ReplSession, Result};

/// Keeps the desktop editor from opening files whenever execution pauses.
pub const INHIBIT_GUI_COMMAND: &str =
    "s = settings; s.matlab.editor.OpenFileAtBreakpoint.TemporaryValue = 0; clear s";

/// Resolves with the startup readiness probe. `false` if the REPL complained
/// on stderr before its first prompt.
pub async fn wait_ready(session: &ReplSession) -> Result<bool> {
    session.ready().await
}

pub async fn inhibit_gui(session: &ReplSession) -> Result<bool> {
    succeeded(session.execute(INHIBIT_GUI_COMMAND, default_classifier).await)
}

pub async fn cd(session: &ReplSession, dir: &str) -> Result<bool> {
    succeeded(session.execute(&format!("cd {dir}"), default_classifier).await)
}

/// Changes into the program's directory and sets an entry breakpoint on it.
///
/// Both commands are written before either is awaited. Returns
/// `(changed_directory, entry_breakpoint_set)`.
pub async fn prepare_debug_mode(session: &ReplSession, source_path: &str) -> Result<(bool, bool)> {
    let (dir, basename) = split_program_path(source_path);

    let cd_reply = session.enqueue(&format!("cd {dir}"), default_classifier).await?;
    let entry_reply = session
        .enqueue(&format!("dbstop in {basename} at 0"), default_classifier)
        .await?;

    let changed = succeeded(cd_reply.wait().await)?;
    let entry = succeeded(entry_reply.wait().await)?;
    Ok((changed, entry))
}

/// Directory to `cd` into and the file name to refer to once there.
pub(crate) fn split_program_path(source_path: &str) -> (String, String) {
    let path = Path::new(source_path);
    let dir = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string());
    let basename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| source_path.to_string());
    (dir, basename)
}
