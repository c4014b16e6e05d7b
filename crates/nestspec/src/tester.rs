//! The execution engine: nested scopes, lifecycle hooks and unit isolation.
//!
//! Declarations run immediately and in the order written. `describe` pushes a
//! [`DescriptionContext`] for the duration of its body; `it` runs the unit on
//! the spot between the `before_each`/`after_each` hooks of every open scope.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::config::RunConfig;
use crate::error::{AssertionFailure, UsageError};
use crate::expect::{Expectation, SpyMatcher};
use crate::report::TestResult;
use crate::scope::{DescriptionContext, Hook, FAIL, PASS};
use crate::spy::{Method, MethodTable, Spy};
use crate::Guard;

/// Orchestrates one test run.
///
/// The `'a` lifetime bounds what registered hooks may borrow.
///
/// # Example
/// ```rust
/// use std::cell::RefCell;
/// use nestspec::Tester;
///
/// let log = RefCell::new(Vec::new());
/// let tester = Tester::default();
///
/// tester.describe("group", |t| {
///     t.before_each(|_| log.borrow_mut().push("b"))?;
///     t.it("a", |_| { log.borrow_mut().push("a"); Ok(()) })?;
///     t.it("c", |_| { log.borrow_mut().push("c"); Ok(()) })
/// }).unwrap();
///
/// let result = tester.finish();
/// assert_eq!(*log.borrow(), ["b", "a", "b", "c"]);
/// assert_eq!((result.success_count, result.failure_count), (2, 0));
/// ```
pub struct Tester<'a> {
    config: RunConfig,
    started: Instant,
    state: RefCell<RunState<'a>>,
}

struct RunState<'a> {
    /// Root first, current scope last.
    stack: Vec<DescriptionContext<'a>>,
    running_unit: Option<String>,
    running_hook: Option<HookRun>,
    /// First usage error raised while a unit body or hook was running.
    violation: Option<UsageError>,
}

/// The hook currently executing and the level of the scope that registered it.
#[derive(Debug, Clone, Copy)]
struct HookRun {
    kind: &'static str,
    level: usize,
}

impl<'a> RunState<'a> {
    fn current(&mut self) -> &mut DescriptionContext<'a> {
        self.stack
            .last_mut()
            .expect("nestspec: the root scope is never popped")
    }
}

impl Default for Tester<'_> {
    fn default() -> Self {
        Tester::new(RunConfig::default())
    }
}

impl<'a> Tester<'a> {
    pub fn new(config: RunConfig) -> Self {
        Tester {
            config,
            started: Instant::now(),
            state: RefCell::new(RunState {
                stack: vec![DescriptionContext::root()],
                running_unit: None,
                running_hook: None,
                violation: None,
            }),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    // ---- Describe ------------------------------------------------------------

    /// Open a nested scope and run `body` in it.
    ///
    /// On return the scope's pending `before_all`s fire (so they run even for
    /// an empty group), then its `after_all`s, then its spies are reset
    /// last-installed first. Counts fold into the parent; the group's lines are
    /// kept only when verbose or when something in it failed.
    ///
    /// If `body` returns an error or panics, the scope is abandoned (spies
    /// reset, no `after_all`) and the error or panic propagates. A usage error
    /// raised by one of the hooks fired here is returned once the scope closed.
    pub fn describe(
        &self,
        description: &str,
        body: impl FnOnce(&Self) -> Result<(), UsageError>,
    ) -> Result<(), UsageError> {
        self.ensure_declaring("describe")?;
        self.fire_before_alls();
        self.take_violation()?;
        self.open_scope(description);

        self.guarded(|| body(self)).map_err(|error| {
            self.abandon_scope();
            error
        })?;

        self.guarded(|| {
            self.fire_before_alls();
            self.run_after_alls();
        });
        self.close_scope();
        self.take_violation()
    }

    /// Record the whole group as skipped without running `body`.
    pub fn xdescribe(
        &self,
        description: &str,
        _body: impl FnOnce(&Self) -> Result<(), UsageError>,
    ) -> Result<(), UsageError> {
        self.ensure_declaring("xdescribe")?;
        trace!(target: "nestspec::scope", description, "group skipped");
        self.state.borrow_mut().current().record_skip(description);
        Ok(())
    }

    pub fn context(
        &self,
        description: &str,
        body: impl FnOnce(&Self) -> Result<(), UsageError>,
    ) -> Result<(), UsageError> {
        self.describe(description, body)
    }

    pub fn xcontext(
        &self,
        description: &str,
        body: impl FnOnce(&Self) -> Result<(), UsageError>,
    ) -> Result<(), UsageError> {
        self.xdescribe(description, body)
    }

    // ---- Hooks ---------------------------------------------------------------
    //
    // Hooks receive the tester, so they can install spies and build
    // expectations. Spies installed from a hook belong to the scope that
    // registered the hook. Declaring groups, units or further hooks from a
    // hook is a usage error.

    /// Runs once, lazily, before the first unit or nested group of this scope.
    pub fn before_all(&self, hook: impl FnOnce(&Tester<'a>) + 'a) -> Result<(), UsageError> {
        self.ensure_declaring("before_all")?;
        self.state.borrow_mut().current().add_before_all(Box::new(hook));
        Ok(())
    }

    /// Runs before every unit in this scope and all nested scopes.
    pub fn before_each(&self, hook: impl FnMut(&Tester<'a>) + 'a) -> Result<(), UsageError> {
        self.ensure_declaring("before_each")?;
        self.state
            .borrow_mut()
            .current()
            .before_eaches
            .push(Rc::new(RefCell::new(hook)));
        Ok(())
    }

    /// Runs after every unit in this scope and all nested scopes, pass or fail.
    pub fn after_each(&self, hook: impl FnMut(&Tester<'a>) + 'a) -> Result<(), UsageError> {
        self.ensure_declaring("after_each")?;
        self.state
            .borrow_mut()
            .current()
            .after_eaches
            .push(Rc::new(RefCell::new(hook)));
        Ok(())
    }

    /// Runs once when this scope closes.
    pub fn after_all(&self, hook: impl FnOnce(&Tester<'a>) + 'a) -> Result<(), UsageError> {
        self.ensure_declaring("after_all")?;
        self.state.borrow_mut().current().add_after_all(Box::new(hook));
        Ok(())
    }

    // ---- Units ---------------------------------------------------------------

    /// Run one unit now.
    ///
    /// Order: pending `before_all`s, every `before_each` root to leaf, the body,
    /// every `after_each` root to leaf, then the call history of every spy on
    /// the stack is cleared. An `Err` or a panic from the body marks the unit
    /// failed and is never propagated.
    ///
    /// Returns `Err` only for usage errors: declaring a unit inside a running
    /// unit or hook, or any usage error raised while this unit's hooks or body
    /// ran (even if swallowed). Such a unit counts as neither passed nor failed.
    pub fn it(
        &self,
        name: &str,
        body: impl FnOnce(&Self) -> anyhow::Result<()>,
    ) -> Result<(), UsageError> {
        self.ensure_not_in_unit("it", name)?;

        let path = self.unit_path(name);
        if !self.config.selects(&path) {
            trace!(target: "nestspec::unit", unit = %path, "filtered out");
            self.state.borrow_mut().current().skipped_count += 1;
            return Ok(());
        }

        self.fire_before_alls();
        self.run_before_eaches();

        let started = Instant::now();
        let outcome = {
            self.state.borrow_mut().running_unit = Some(name.to_string());
            let _unit = Guard::new(|| self.state.borrow_mut().running_unit = None);
            catch_unwind(AssertUnwindSafe(|| body(self)))
        };
        let elapsed = started.elapsed();

        self.run_after_eaches();
        self.clear_spy_calls();
        self.take_violation()?;

        let diagnostic = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(diagnose_error(&error)),
            Err(payload) => Some(diagnose_panic(payload.as_ref())),
        };
        self.record_unit(&path, name, elapsed, diagnostic);
        Ok(())
    }

    /// Record a skipped marker without running `body`, hooks, or spies.
    pub fn xit(
        &self,
        name: &str,
        _body: impl FnOnce(&Self) -> anyhow::Result<()>,
    ) -> Result<(), UsageError> {
        self.ensure_not_in_unit("xit", name)?;
        trace!(target: "nestspec::unit", unit = name, "unit skipped");
        self.state.borrow_mut().current().record_skip(name);
        Ok(())
    }

    pub fn specify(
        &self,
        name: &str,
        body: impl FnOnce(&Self) -> anyhow::Result<()>,
    ) -> Result<(), UsageError> {
        self.it(name, body)
    }

    pub fn xspecify(
        &self,
        name: &str,
        body: impl FnOnce(&Self) -> anyhow::Result<()>,
    ) -> Result<(), UsageError> {
        self.xit(name, body)
    }

    // ---- Assertions and spies ------------------------------------------------

    pub fn expect<T>(&self, actual: T) -> Expectation<T> {
        Expectation::new(actual)
    }

    /// A predicate usable in place of a literal in
    /// [`to_have_been_called_with`](Expectation::to_have_been_called_with).
    pub fn matcher<T: ?Sized>(&self, predicate: impl Fn(&T) -> bool + 'static) -> SpyMatcher<T> {
        SpyMatcher::new(predicate)
    }

    /// Install a spy on `method`, owned by the current scope (or, from a hook,
    /// by the scope that registered the hook).
    ///
    /// The spy's call history is cleared after every unit and the original is
    /// restored when the owning scope closes. Spying an already-spied method
    /// returns the existing spy; when that spy belongs to an outer scope, its
    /// current behavior is put back as this scope closes.
    pub fn spy_on<A, R>(&self, method: &Method<A, R>) -> Result<Spy<A, R>, UsageError>
    where
        A: Clone + 'static,
        R: 'static,
    {
        self.ensure_outside_unit("spy_on")?;
        let mut state = self.state.borrow_mut();
        let level = state
            .running_hook
            .map_or(state.stack.len() - 1, |hook| hook.level);

        if let Some(existing) = method.spy() {
            let key = existing.key();
            let owner = state.stack.iter().rposition(|scope| scope.tracks_spy(key));
            if owner.map_or(true, |owner| owner < level) {
                debug!(target: "nestspec::spy", method = method.name(), level, "re-spied in nested scope, checkpointing");
                state.stack[level].add_spy(Rc::new(existing.checkpoint()));
            } else {
                debug!(target: "nestspec::spy", method = method.name(), "already spied, reusing");
            }
            return Ok(existing);
        }

        let spy = Spy::install(method);
        state.stack[level].add_spy(Rc::new(spy.clone()));
        Ok(spy)
    }

    /// [`spy_on`](Self::spy_on) by name, looked up through [`MethodTable`].
    ///
    /// Fails with [`UsageError::NotCallable`] if `object` has no method called
    /// `name` with signature `Method<A, R>`.
    pub fn spy_on_named<A, R>(
        &self,
        object: &(impl MethodTable + ?Sized),
        name: &str,
    ) -> Result<Spy<A, R>, UsageError>
    where
        A: Clone + 'static,
        R: 'static,
    {
        self.ensure_outside_unit("spy_on")?;
        let method = object
            .method(name)
            .and_then(|m| m.downcast_ref::<Method<A, R>>())
            .ok_or_else(|| UsageError::NotCallable {
                method: name.to_string(),
            })?;
        self.spy_on(method)
    }

    // ---- Finish --------------------------------------------------------------

    /// Close the root scope and snapshot the run.
    pub fn finish(self) -> TestResult {
        self.fire_before_alls();
        self.run_after_alls();

        let mut root = self
            .state
            .into_inner()
            .stack
            .pop()
            .expect("nestspec: the root scope is never popped");
        root.reset_spies();

        let result = TestResult {
            success_count: root.success_count,
            failure_count: root.failure_count,
            skipped_count: root.skipped_count,
            output: root.output,
            elapsed: self.started.elapsed(),
        };
        info!(
            target: "nestspec::scope",
            passed = result.success_count,
            failed = result.failure_count,
            skipped = result.skipped_count,
            "run finished"
        );
        result
    }

    // ---- Internals -----------------------------------------------------------

    /// Declarations are legal only while neither a unit nor a hook runs.
    fn ensure_declaring(&self, operation: &'static str) -> Result<(), UsageError> {
        self.ensure_outside_unit(operation)?;
        self.ensure_outside_hook(operation)
    }

    /// Spies may be installed from hooks, but not from unit bodies.
    fn ensure_outside_unit(&self, operation: &'static str) -> Result<(), UsageError> {
        let unit = self.state.borrow().running_unit.clone();
        match unit {
            None => Ok(()),
            Some(unit) => Err(self.violation(UsageError::InsideUnit { operation, unit })),
        }
    }

    fn ensure_outside_hook(&self, operation: &'static str) -> Result<(), UsageError> {
        let hook = self.state.borrow().running_hook;
        match hook {
            None => Ok(()),
            Some(hook) => Err(self.violation(UsageError::InsideHook {
                operation,
                hook: hook.kind,
            })),
        }
    }

    fn ensure_not_in_unit(&self, operation: &'static str, name: &str) -> Result<(), UsageError> {
        let outer = self.state.borrow().running_unit.clone();
        if let Some(outer) = outer {
            return Err(self.violation(UsageError::NestedUnit {
                outer,
                inner: name.to_string(),
            }));
        }
        self.ensure_outside_hook(operation)
    }

    fn violation(&self, error: UsageError) -> UsageError {
        warn!(target: "nestspec::unit", %error, "usage error inside a running unit or hook");
        let mut state = self.state.borrow_mut();
        if state.violation.is_none() {
            state.violation = Some(error.clone());
        }
        error
    }

    fn take_violation(&self) -> Result<(), UsageError> {
        match self.state.borrow_mut().violation.take() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }

    fn unit_path(&self, name: &str) -> String {
        let state = self.state.borrow();
        state
            .stack
            .iter()
            .skip(1)
            .map(|scope| scope.description.as_str())
            .chain(std::iter::once(name))
            .collect::<Vec<_>>()
            .join(" > ")
    }

    fn open_scope(&self, description: &str) {
        let mut state = self.state.borrow_mut();
        let depth = state.stack.len();
        debug!(target: "nestspec::scope", description, depth, "entering scope");
        state
            .stack
            .push(DescriptionContext::new(description.to_string(), depth));
    }

    fn close_scope(&self) {
        let mut state = self.state.borrow_mut();
        let mut scope = state
            .stack
            .pop()
            .expect("nestspec: close_scope without open_scope");
        scope.reset_spies();
        debug!(
            target: "nestspec::scope",
            description = %scope.description,
            passed = scope.success_count,
            failed = scope.failure_count,
            "leaving scope"
        );
        state.current().fold(scope, self.config.verbose);
    }

    /// Drop the current scope after its body failed, restoring its spies.
    fn abandon_scope(&self) {
        let mut state = self.state.borrow_mut();
        if state.stack.len() > 1 {
            if let Some(mut scope) = state.stack.pop() {
                scope.reset_spies();
                warn!(target: "nestspec::scope", description = %scope.description, "scope abandoned");
            }
        }
    }

    /// Run `f`; on panic abandon the current scope and keep unwinding.
    fn guarded<T>(&self, f: impl FnOnce() -> T) -> T {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => value,
            Err(panic) => {
                self.abandon_scope();
                resume_unwind(panic)
            }
        }
    }

    /// Fire every scope's pending `before_all`s, root to leaf.
    ///
    /// Hooks are drained as they fire, so each runs exactly once; one registered
    /// after its scope already started fires before the next unit.
    fn fire_before_alls(&self) {
        let depth = self.state.borrow().stack.len();
        for level in 0..depth {
            let hooks = self.state.borrow_mut().stack[level].take_before_alls();
            if !hooks.is_empty() {
                trace!(target: "nestspec::scope", level, count = hooks.len(), "before_all");
            }
            for hook in hooks {
                self.in_hook("before_all", level, || hook(self));
            }
        }
    }

    fn run_after_alls(&self) {
        let (level, hooks) = {
            let mut state = self.state.borrow_mut();
            (state.stack.len() - 1, state.current().take_after_alls())
        };
        for hook in hooks {
            self.in_hook("after_all", level, || hook(self));
        }
    }

    fn run_before_eaches(&self) {
        let hooks = self.each_hooks(|scope| &scope.before_eaches);
        for (level, hook) in hooks {
            self.in_hook("before_each", level, || (&mut *hook.borrow_mut())(self));
        }
    }

    // Root to leaf, same direction as before_each.
    fn run_after_eaches(&self) {
        let hooks = self.each_hooks(|scope| &scope.after_eaches);
        for (level, hook) in hooks {
            self.in_hook("after_each", level, || (&mut *hook.borrow_mut())(self));
        }
    }

    /// Snapshot per-unit hooks root to leaf, tagged with their scope level.
    fn each_hooks(
        &self,
        select: impl for<'s> Fn(&'s DescriptionContext<'a>) -> &'s Vec<Hook<'a>>,
    ) -> Vec<(usize, Hook<'a>)> {
        let state = self.state.borrow();
        let mut hooks = Vec::new();
        for (level, scope) in state.stack.iter().enumerate() {
            for hook in select(scope) {
                hooks.push((level, Rc::clone(hook)));
            }
        }
        hooks
    }

    fn in_hook<T>(&self, kind: &'static str, level: usize, f: impl FnOnce() -> T) -> T {
        let previous = self
            .state
            .borrow_mut()
            .running_hook
            .replace(HookRun { kind, level });
        let _restore = Guard::new(move || self.state.borrow_mut().running_hook = previous);
        f()
    }

    fn clear_spy_calls(&self) {
        let state = self.state.borrow();
        for scope in &state.stack {
            scope.clear_spy_calls();
        }
    }

    fn record_unit(&self, path: &str, name: &str, elapsed: Duration, diagnostic: Option<String>) {
        let ms = elapsed.as_millis() as u64;
        let verbose = self.config.verbose;
        let mut state = self.state.borrow_mut();
        let scope = state.current();

        match diagnostic {
            None => {
                scope.success_count += 1;
                if verbose {
                    scope.record(&format!("{PASS} {name} ({ms}ms)"));
                }
                debug!(target: "nestspec::unit", unit = %path, elapsed_ms = ms, "passed");
            }
            Some(text) => {
                scope.failure_count += 1;
                scope.record(&format!("{FAIL} {name} ({ms}ms)"));
                scope.record_diagnostic(&text);
                info!(target: "nestspec::unit", unit = %path, elapsed_ms = ms, "failed");
            }
        }
    }
}

/// Bare assertion failures print their message; anything else gets the full
/// `anyhow` rendering (context chain, and a backtrace when one was captured).
fn diagnose_error(error: &anyhow::Error) -> String {
    match error.downcast_ref::<AssertionFailure>() {
        Some(failure) if error.chain().count() == 1 => failure.message().to_string(),
        _ => format!("{error:?}"),
    }
}

fn diagnose_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else if let Some(failure) = payload.downcast_ref::<AssertionFailure>() {
        failure.message().to_string()
    } else {
        "panicked with a non-string payload".to_string()
    }
}
