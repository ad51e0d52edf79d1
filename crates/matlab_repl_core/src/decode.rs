//! Response decoders
//!
//! Pure functions from captured REPL text to typed results. None of them fail on
//! malformed content: no match is an empty result, ambiguity falls back to the
//! raw text.

use crate::grammar::{
    self, BREAKPOINT_STATUS_PATTERN, COLUMNS_HEADER_PATTERN, STACK_FRAME_PATTERN,
};
use crate::types::{BreakpointStatus, Capture, ColumnBlock, StackFrame};
use crate::Result;

/// Default decoder: the command reached a prompt before anything showed up on
/// stderr. Rejections become `false`; transport failures still propagate.
pub fn succeeded(result: Result<Capture>) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.is_rejection() => {
            tracing::debug!("Command rejected: {}", e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Mode-probe decoder.
pub fn paused(capture: &Capture) -> bool {
    capture.mode.is_paused()
}

/// Frames in the order the REPL printed them, innermost first.
pub fn stack_frames(text: &str) -> Vec<StackFrame> {
    STACK_FRAME_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let source_path = caps.get(1)?.as_str().trim().to_string();
            let line = caps.get(3)?.as_str().parse::<u32>().ok()?;
            let local_function = caps.get(2).map(|m| m.as_str().to_string());
            Some(StackFrame {
                source_path,
                line,
                local_function,
            })
        })
        .collect()
}

/// Evaluate decoder: the text before the prompt.
///
/// A buffer with more than one prompt is ambiguous and is returned untouched.
/// [`crate::ops::inspect::evaluate`] passes a single command's capture, which
/// ends at its one prompt, so that fallback only applies to buffers handed in
/// directly, e.g. a transcript spanning several commands.
pub fn evaluated_text(raw: &str) -> String {
    let mut boundaries = grammar::prompt_boundaries(raw);
    let Some(first) = boundaries.next() else {
        return raw.to_string();
    };
    if boundaries.next().is_some() {
        tracing::warn!(
            "Evaluate output contains more than one prompt, returning raw buffer: {:?}",
            raw
        );
        return raw.to_string();
    }
    raw[..first.start].to_string()
}

/// Slices of a wide array printed as `Columns m through n` blocks.
pub fn array_columns(text: &str) -> Vec<ColumnBlock> {
    let headers: Vec<_> = COLUMNS_HEADER_PATTERN.captures_iter(text).collect();
    let mut blocks = Vec::with_capacity(headers.len());

    for (index, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(first), Some(last)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let (Ok(first), Ok(last)) = (
            first.as_str().parse::<usize>(),
            last.as_str().parse::<usize>(),
        ) else {
            continue;
        };

        let body_end = headers
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        let body = &text[whole.end()..body_end];

        let values = body
            .lines()
            .skip_while(|line| line.trim().is_empty())
            .take_while(|line| !line.trim().is_empty())
            .flat_map(str::split_whitespace)
            .map(str::to_string)
            .collect();

        blocks.push(ColumnBlock {
            first,
            last,
            values,
        });
    }

    blocks
}

/// `Breakpoint for <script> is on line <n>[,<m>...]` lines, as printed by `dbstatus`.
pub fn breakpoint_status(text: &str) -> Vec<BreakpointStatus> {
    BREAKPOINT_STATUS_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let script = caps.get(1)?.as_str().to_string();
            let lines = caps
                .get(2)?
                .as_str()
                .split(',')
                .filter_map(|n| n.trim().parse::<u32>().ok())
                .collect();
            Some(BreakpointStatus { script, lines })
        })
        .collect()
}
