//! Prompt grammar
//!
//! The REPL has no framing of its own. The only reliable signal that a command
//! has finished is the prompt it prints before reading the next line:
//!
//! ```text
//! >>      shell prompt, nothing is paused
//! K>>     debug prompt, execution is stopped (breakpoint, step, entry)
//! ```
//!
//! A prompt only counts where a line starts: at the start of the buffer or right
//! after a newline. Output such as `a >> b` is not a prompt. The one exception
//! is a prompt that ends the buffer, which covers output printed without a
//! trailing newline (`partial-prompt>> `). The leftmost such prompt is the
//! boundary. The debug prompt contains the shell prompt, so at the same offset
//! the debug prompt wins; the `K` always arrives before the `>> ` that
//! completes it.
//!
//! The remaining patterns extract content the REPL frames itself (call-stack
//! lines, column-grouped arrays, breakpoint status) and are only used by the
//! decoders.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::SessionMode;

pub const SHELL_PROMPT: &str = ">> ";
pub const DEBUG_PROMPT: &str = "K>> ";

static PROMPT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(K>> )|(>> )").unwrap());

/// `In <path>[><localFunc>] (line <n>)`, one per frame of `dbstack('-completenames')`.
pub(crate) static STACK_FRAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"In ([^\n>]+?)(?:>([^\n]+?))? \(line (\d+)\)").unwrap()
});

/// Header the REPL prints before each slice of a wide array.
pub(crate) static COLUMNS_HEADER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Columns (\d+) (?:through|and) (\d+)").unwrap());

pub(crate) static BREAKPOINT_STATUS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Breakpoint for ([a-zA-Z0-9._-]+) is on line ([\d,]+)").unwrap()
});

/// Where a prompt was found in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBoundary {
    pub mode: SessionMode,
    /// Byte offset of the first prompt character.
    pub start: usize,
    /// Byte offset just past the prompt. Everything from here on belongs to
    /// whatever the REPL does next.
    pub end: usize,
}

/// Leftmost prompt in `buffer`, if any.
pub fn find_prompt(buffer: &str) -> Option<PromptBoundary> {
    prompt_boundaries(buffer).next()
}

/// Every prompt in `buffer`, left to right.
pub(crate) fn prompt_boundaries(buffer: &str) -> impl Iterator<Item = PromptBoundary> + '_ {
    PROMPT_PATTERN.captures_iter(buffer).filter_map(move |caps| {
        let (m, mode) = match (caps.get(1), caps.get(2)) {
            (Some(m), _) => (m, SessionMode::Debug),
            (None, Some(m)) => (m, SessionMode::Shell),
            (None, None) => return None,
        };
        let at_line_start = m.start() == 0 || buffer[..m.start()].ends_with('\n');
        let at_buffer_end = m.end() == buffer.len();
        (at_line_start || at_buffer_end).then_some(PromptBoundary {
            mode,
            start: m.start(),
            end: m.end(),
        })
    })
}

/// The REPL is waiting for input, in either mode.
pub fn ready_for_input(buffer: &str) -> bool {
    find_prompt(buffer).is_some()
}

pub fn ready_for_input_debug_mode(buffer: &str) -> bool {
    matches!(find_prompt(buffer), Some(b) if b.mode == SessionMode::Debug)
}

pub fn ready_for_input_shell_mode(buffer: &str) -> bool {
    matches!(find_prompt(buffer), Some(b) if b.mode == SessionMode::Shell)
}

/// Last line of a chunk, i.e. the text after its final newline.
pub fn last_line(chunk: &str) -> &str {
    chunk.rsplit('\n').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_prompt_is_recognized() {
        let boundary = find_prompt("ans =\n\n     3\n\n>> ").expect("prompt");
        assert_eq!(boundary.mode, SessionMode::Shell);
        assert_eq!(boundary.end, "ans =\n\n     3\n\n>> ".len());
    }

    #[test]
    fn debug_prompt_wins_over_embedded_shell_prompt() {
        let buffer = "Breakpoint for script is on line 5\nK>> ";
        let boundary = find_prompt(buffer).expect("prompt");
        assert_eq!(boundary.mode, SessionMode::Debug);
        assert_eq!(&buffer[boundary.start..boundary.end], DEBUG_PROMPT);
        assert!(ready_for_input_debug_mode(buffer));
        assert!(!ready_for_input_shell_mode(buffer));
    }

    #[test]
    fn leftmost_prompt_is_the_boundary() {
        let buffer = "first\n>> second\nK>> ";
        let boundary = find_prompt(buffer).expect("prompt");
        assert_eq!(boundary.mode, SessionMode::Shell);
        assert_eq!(&buffer[boundary.end..], "second\nK>> ");
    }

    #[test]
    fn prompt_token_inside_a_line_is_not_a_prompt() {
        assert!(!ready_for_input("a >> b\n"));
        assert!(!ready_for_input("x = 1 K>> y\n"));

        let buffer = "a >> b\n>> ";
        let boundary = find_prompt(buffer).expect("prompt");
        assert_eq!(boundary.start, "a >> b\n".len());
        assert_eq!(prompt_boundaries(buffer).count(), 1);
    }

    #[test]
    fn prompt_at_buffer_end_counts_without_newline() {
        let boundary = find_prompt("value 3>> ").expect("prompt");
        assert_eq!(boundary.mode, SessionMode::Shell);
        assert_eq!(boundary.start, "value 3".len());
    }

    #[test]
    fn incomplete_prompt_is_not_ready() {
        assert!(!ready_for_input("partial-pr"));
        assert!(!ready_for_input("value\nK>"));
        assert!(!ready_for_input("value\n>>"));
        assert!(ready_for_input("partial-prompt>> "));
    }

    #[test]
    fn last_line_returns_text_after_final_newline() {
        assert_eq!(last_line("a\nb\nK>> "), "K>> ");
        assert_eq!(last_line("no newline"), "no newline");
        assert_eq!(last_line("trailing\n"), "");
    }
}
