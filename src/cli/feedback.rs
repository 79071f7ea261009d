//! Terminal `UserFeedback`: prompts on stderr for a substitute path when a
//! split container part cannot be found (§6.1).
//!
//! Grounded on the teacher's `wait_enter` (`cli/help.rs`): a blocking
//! stdin/stderr prompt, read one line at a time rather than one character.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::collab::UserFeedback;

/// Prompts an operator for a replacement path on the controlling terminal.
/// An empty line (or EOF) declines the substitute.
pub struct TerminalFeedback;

impl UserFeedback for TerminalFeedback {
    fn ask_missing_part(&mut self, path: &Path, index: u32) -> Option<PathBuf> {
        eprint!(
            "part {index} ({}) not found; enter a substitute path, or press enter to abort: ",
            path.display()
        );
        let _ = io::stderr().flush();

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).unwrap_or(0) == 0 {
            return None;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }
}
