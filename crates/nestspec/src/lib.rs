//! # nestspec — a nested-scope test engine with spies and expectations
//!
//! Declare groups with `describe`, units with `it`, lifecycle hooks with
//! `before_all`/`before_each`/`after_each`/`after_all`, replace injected methods
//! with reversible spies, and assert with fluent expectations. Everything runs
//! immediately, in declaration order, against an explicit [`Tester`].
//!
//! ## Quick example
//!
//! ```rust,no_run
//! fn main() {
//!     nestspec::run(|t| {
//!         t.describe("Calculator", |t| {
//!             t.it("adds two numbers", |t| {
//!                 t.expect(2 + 3).to_equal(5)?;
//!                 Ok(())
//!             })?;
//!
//!             t.context("with negative numbers", |t| {
//!                 t.it("handles negatives", |t| {
//!                     t.expect(-1 + 1).to_be(0)?;
//!                     Ok(())
//!                 })
//!             })
//!         })
//!     });
//! }
//! ```
//!
//! ## Failure kinds
//!
//! Unit bodies return `anyhow::Result<()>`. An `Err` (typically an
//! [`AssertionFailure`] lifted with `?`) or a panic fails that unit only; the
//! run continues. Declaration calls return `Result<_, UsageError>`; a
//! [`UsageError`] means the suite itself is malformed and is never absorbed
//! into the pass/fail counts.
//!
//! ## Features
//!
//! - `macros` (default) — the [`spec!`] DSL.

mod config;
mod error;
mod expect;
mod report;
mod scope;
mod spy;
mod tester;

pub use config::RunConfig;
pub use error::{AssertionFailure, UsageError};
pub use expect::{CallPattern, Expectation, Identical, SpyMatcher, SpyTarget};
pub use report::TestResult;
pub use spy::{Method, MethodTable, Spy, SpyStrategy};
pub use tester::Tester;

/// Unit bodies return [`anyhow::Result`]; re-exported for the [`spec!`] expansion.
pub use anyhow;

#[cfg(feature = "macros")]
pub use nestspec_macros::spec;

use tracing_subscriber::filter::EnvFilter;

/// A drop guard that runs cleanup code even if the guarded code panics.
pub struct Guard<F: FnOnce()> {
    f: Option<F>,
}

impl<F: FnOnce()> Guard<F> {
    pub fn new(f: F) -> Self {
        Guard { f: Some(f) }
    }
}

impl<F: FnOnce()> Drop for Guard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

/// Run a suite and exit the process with its status.
///
/// This is the entry point for test targets with `harness = false`. Logging
/// goes through `tracing`; set `NESTSPEC_LOG` (e.g. `nestspec=debug`) to see
/// scope and spy events. Exits with 1 if any unit failed, 2 on a usage error.
///
/// ```rust,no_run
/// fn main() {
///     nestspec::run(|t| {
///         t.describe("Calculator", |t| {
///             t.it("adds", |t| { t.expect(2 + 3).to_equal(5)?; Ok(()) })
///         })
///     });
/// }
/// ```
pub fn run(body: impl FnOnce(&Tester<'_>) -> Result<(), UsageError>) {
    init_logging();

    let (result, outcome) = drive(Tester::new(RunConfig::from_args()), body);
    result.print();
    if let Err(error) = outcome {
        eprintln!("nestspec: {error}");
        std::process::exit(2);
    }
    if !result.passed() {
        std::process::exit(result.exit_code());
    }
}

/// Run `body` and close the root scope, even when `body` hit a usage error.
fn drive<'a>(
    tester: Tester<'a>,
    body: impl FnOnce(&Tester<'a>) -> Result<(), UsageError>,
) -> (TestResult, Result<(), UsageError>) {
    let outcome = body(&tester);
    if let Err(error) = &outcome {
        tracing::error!(target: "nestspec::scope", %error, "suite stopped by a usage error");
    }
    (tester.finish(), outcome)
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("NESTSPEC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // A host binary may already have installed a subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_drive_finishes_the_root_after_a_usage_error() {
        let closed = std::cell::Cell::new(false);
        let method: Method<(), u8> = Method::new("value", |()| 1);
        let tester = Tester::default();

        let (result, outcome) = drive(tester, |t| {
            t.after_all(|_| closed.set(true))?;
            t.spy_on(&method)?.and().return_value(0);
            t.it("passes", |_| Ok(()))?;
            t.it("outer", |t| {
                let _ = t.it("inner", |_| Ok(()));
                Ok(())
            })
        });

        assert!(matches!(outcome, Err(UsageError::NestedUnit { .. })));
        assert_eq!(result.success_count, 1);
        assert!(closed.get());
        assert!(!method.is_spy());
        assert_eq!(method.call(()), 1);
    }

    #[test]
    fn test_guard_runs_on_success() {
        use std::sync::atomic::{AtomicBool, Ordering};
        static RAN: AtomicBool = AtomicBool::new(false);

        {
            let _g = Guard::new(|| RAN.store(true, Ordering::SeqCst));
        }
        assert!(RAN.load(Ordering::SeqCst));
    }

    #[test]
    fn test_guard_runs_on_panic() {
        use std::sync::atomic::{AtomicBool, Ordering};
        static RAN: AtomicBool = AtomicBool::new(false);

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _g = Guard::new(|| RAN.store(true, Ordering::SeqCst));
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(RAN.load(Ordering::SeqCst));
    }
}
