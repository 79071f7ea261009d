//! Terminal `ProgressSink`: prints a periodic one-line update and reports
//! fatal errors to stderr (§6.1).
//!
//! Grounded on the teacher's `DISPLAYLEVEL`-gated progress printing
//! (`cli/constants.rs`'s `displaylevel!` macro): conditional, rate-limited
//! stderr output rather than a log line per byte. This crate passes
//! configuration by value rather than through the teacher's global
//! `DISPLAY_LEVEL` atomic, so verbosity here is a plain field.

use std::io::{self, Write};

use crate::collab::ProgressSink;

/// Prints `bytes_processed / total_bytes` as a percentage each time it's
/// invoked, overwriting the previous line with a carriage return.
pub struct PrintProgressSink {
    total_bytes: u64,
    quiet: bool,
    last_pct: u8,
}

impl PrintProgressSink {
    pub fn new(total_bytes: u64, quiet: bool) -> Self {
        PrintProgressSink {
            total_bytes,
            quiet,
            last_pct: u8::MAX,
        }
    }
}

impl ProgressSink for PrintProgressSink {
    fn on_bytes_processed(&mut self, bytes: u64) {
        if self.quiet {
            return;
        }
        let pct = if self.total_bytes == 0 {
            100
        } else {
            ((bytes.min(self.total_bytes) * 100) / self.total_bytes) as u8
        };
        if pct == self.last_pct {
            return;
        }
        self.last_pct = pct;
        eprint!("\r{pct:3}% ({bytes} / {} bytes)", self.total_bytes);
        let _ = io::stderr().flush();
    }

    fn on_error(&mut self, kind: &'static str, message: &str) {
        eprintln!("\nerror [{kind}]: {message}");
    }
}

impl Drop for PrintProgressSink {
    fn drop(&mut self) {
        if !self.quiet {
            eprintln!();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_clamped_to_100() {
        let mut sink = PrintProgressSink::new(100, true);
        sink.on_bytes_processed(250);
        assert_eq!(sink.last_pct, 100);
    }

    #[test]
    fn zero_total_reports_full() {
        let mut sink = PrintProgressSink::new(0, true);
        sink.on_bytes_processed(0);
        assert_eq!(sink.last_pct, 100);
    }
}
