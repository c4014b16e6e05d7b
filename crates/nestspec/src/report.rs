//! Run results and the console report.
//!
//! The report itself is plain indented text; color is only added by
//! [`TestResult::print`] when writing to a terminal:
//!
//! ```text
//! Ledger
//!   ✓ sums rows (0ms)
//!   with refunds
//!     ✗ nets out (1ms)
//!       Expected 3 to equal 4.
//! ```

use std::fmt;
use std::time::Duration;

use crate::scope::{FAIL, PASS, SKIP};

/// Snapshot of a finished run, returned by [`Tester::finish`](crate::Tester::finish).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    /// Already-indented report lines.
    pub output: Vec<String>,
    pub elapsed: Duration,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.failure_count == 0
    }

    /// Process exit status for a wrapper binary.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    /// One-line `N passed, M failed` summary.
    pub fn summary(&self) -> String {
        summary_parts(self, |_, s| s.to_string()).join(", ")
    }

    /// Write the report and a PASS/FAIL summary to stdout.
    pub fn print(&self) {
        let color = use_color();
        for line in &self.output {
            println!("{}", paint_line(line, color));
        }

        let elapsed = format!("{:.3}s", self.elapsed.as_secs_f64());
        let parts = summary_parts(self, |code, s| paint(code, s, color));
        println!();
        if self.passed() {
            println!("{}", paint(GREEN, "PASS", color));
        } else {
            println!("{}", paint(RED, "FAIL", color));
        }
        println!("{} ({})", parts.join(", "), paint(DIM, &elapsed, color));
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.output.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            f.write_str(line)?;
        }
        Ok(())
    }
}

fn summary_parts(result: &TestResult, style: impl Fn(&str, &str) -> String) -> Vec<String> {
    let parts: Vec<String> = [
        (result.success_count > 0).then(|| style(GREEN, &format!("{} passed", result.success_count))),
        (result.failure_count > 0).then(|| style(RED, &format!("{} failed", result.failure_count))),
        (result.skipped_count > 0).then(|| style(YELLOW, &format!("{} skipped", result.skipped_count))),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        vec![style(DIM, "no units")]
    } else {
        parts
    }
}

// ============================================================================
// ANSI color helpers
// ============================================================================

const GREEN: &str = "32";
const RED: &str = "31";
const YELLOW: &str = "33";
const DIM: &str = "2";

fn use_color() -> bool {
    // Respect NO_COLOR env var (https://no-color.org/)
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}

fn paint(code: &str, s: &str, color: bool) -> String {
    if color {
        format!("\x1b[{code}m{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

/// Color a marker line by its leading glyph; other lines pass through.
fn paint_line(line: &str, color: bool) -> String {
    if !color {
        return line.to_string();
    }
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let code = if body.starts_with(PASS) {
        GREEN
    } else if body.starts_with(FAIL) {
        RED
    } else if body.starts_with(SKIP) && body.ends_with("(skipped)") {
        YELLOW
    } else {
        return line.to_string();
    };
    format!("{indent}{}", paint(code, body, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(success: usize, failure: usize, skipped: usize) -> TestResult {
        TestResult {
            success_count: success,
            failure_count: failure,
            skipped_count: skipped,
            output: vec!["".into(), "group".into(), "  ✗ a (0ms)".into()],
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_exit_code_follows_failures() {
        assert_eq!(result(3, 0, 0).exit_code(), 0);
        assert_eq!(result(3, 1, 0).exit_code(), 1);
    }

    #[test]
    fn test_summary() {
        assert_eq!(result(2, 1, 4).summary(), "2 passed, 1 failed, 4 skipped");
        assert_eq!(result(0, 0, 0).summary(), "no units");
    }

    #[test]
    fn test_display_joins_lines() {
        assert_eq!(result(0, 1, 0).to_string(), "\ngroup\n  ✗ a (0ms)");
    }

    #[test]
    fn test_paint_line_keeps_indent_outside_color() {
        assert_eq!(
            paint_line("  ✓ ok (0ms)", true),
            "  \x1b[32m✓ ok (0ms)\x1b[0m"
        );
        assert_eq!(paint_line("  - a list item", true), "  - a list item");
        assert_eq!(paint_line("  ✓ ok (0ms)", false), "  ✓ ok (0ms)");
    }
}
