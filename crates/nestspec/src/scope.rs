//! One level of `describe` nesting: hooks, counters, output, and spies.

use std::cell::RefCell;
use std::rc::Rc;

use crate::spy::SpyControl;
use crate::tester::Tester;

/// Indentation added per `describe` depth.
pub(crate) const INDENT: &str = "  ";

pub(crate) const PASS: &str = "✓";
pub(crate) const FAIL: &str = "✗";
pub(crate) const SKIP: &str = "-";

/// Shared so the tester can call a hook without holding its state borrowed.
pub(crate) type Hook<'a> = Rc<RefCell<dyn FnMut(&Tester<'a>) + 'a>>;
pub(crate) type OnceHook<'a> = Box<dyn FnOnce(&Tester<'a>) + 'a>;

pub(crate) struct DescriptionContext<'a> {
    pub(crate) description: String,
    depth: usize,
    /// Drained when fired; nothing pending means the scope's setup has run.
    before_alls: Vec<OnceHook<'a>>,
    pub(crate) before_eaches: Vec<Hook<'a>>,
    pub(crate) after_eaches: Vec<Hook<'a>>,
    after_alls: Vec<OnceHook<'a>>,
    pub(crate) success_count: usize,
    pub(crate) failure_count: usize,
    pub(crate) skipped_count: usize,
    pub(crate) output: Vec<String>,
    spies: Vec<Rc<dyn SpyControl + 'a>>,
}

impl<'a> DescriptionContext<'a> {
    pub(crate) fn root() -> Self {
        Self::new(String::new(), 0)
    }

    pub(crate) fn new(description: String, depth: usize) -> Self {
        DescriptionContext {
            description,
            depth,
            before_alls: Vec::new(),
            before_eaches: Vec::new(),
            after_eaches: Vec::new(),
            after_alls: Vec::new(),
            success_count: 0,
            failure_count: 0,
            skipped_count: 0,
            output: Vec::new(),
            spies: Vec::new(),
        }
    }

    pub(crate) fn add_before_all(&mut self, hook: OnceHook<'a>) {
        self.before_alls.push(hook);
    }

    pub(crate) fn add_after_all(&mut self, hook: OnceHook<'a>) {
        self.after_alls.push(hook);
    }

    pub(crate) fn add_spy(&mut self, spy: Rc<dyn SpyControl + 'a>) {
        self.spies.push(spy);
    }

    pub(crate) fn take_before_alls(&mut self) -> Vec<OnceHook<'a>> {
        std::mem::take(&mut self.before_alls)
    }

    pub(crate) fn take_after_alls(&mut self) -> Vec<OnceHook<'a>> {
        std::mem::take(&mut self.after_alls)
    }

    /// Whether this scope installed or checkpointed the spy with `key`.
    pub(crate) fn tracks_spy(&self, key: *const ()) -> bool {
        self.spies.iter().any(|spy| spy.key() == key)
    }

    pub(crate) fn clear_spy_calls(&self) {
        for spy in &self.spies {
            spy.clear_calls();
        }
    }

    /// Reset and detach every spy, last-installed first.
    pub(crate) fn reset_spies(&mut self) {
        while let Some(spy) = self.spies.pop() {
            tracing::trace!(target: "nestspec::scope", method = spy.method_name(), "resetting spy");
            spy.reset();
        }
    }

    fn indent(&self) -> String {
        INDENT.repeat(self.depth)
    }

    /// Append a line at this scope's indentation.
    pub(crate) fn record(&mut self, line: &str) {
        let line = format!("{}{line}", self.indent());
        self.output.push(line);
    }

    /// Append a multi-line diagnostic, one indentation step deeper.
    pub(crate) fn record_diagnostic(&mut self, text: &str) {
        let indent = format!("{}{INDENT}", self.indent());
        self.output
            .extend(text.lines().map(|line| format!("{indent}{line}")));
    }

    pub(crate) fn record_skip(&mut self, name: &str) {
        self.skipped_count += 1;
        self.record(&format!("{SKIP} {name} (skipped)"));
    }

    /// Fold a finished child scope into this one.
    ///
    /// Counts always propagate; the child's lines only when `verbose` or the
    /// child saw a failure.
    pub(crate) fn fold(&mut self, child: DescriptionContext<'a>, verbose: bool) {
        self.success_count += child.success_count;
        self.failure_count += child.failure_count;
        self.skipped_count += child.skipped_count;

        if verbose || child.failure_count > 0 {
            self.output.push(String::new());
            self.record(&child.description);
            self.output.extend(child.output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_indents_by_depth() {
        let mut scope = DescriptionContext::new("inner".into(), 2);
        scope.record("✓ works (0ms)");
        scope.record_diagnostic("line one\nline two");

        assert_eq!(
            scope.output,
            vec!["    ✓ works (0ms)", "      line one", "      line two"]
        );
    }

    #[test]
    fn test_fold_suppresses_quiet_passing_child() {
        let mut parent = DescriptionContext::root();
        let mut child = DescriptionContext::new("group".into(), 1);
        child.success_count = 2;
        child.record("✓ a (0ms)");

        parent.fold(child, false);
        assert_eq!(parent.success_count, 2);
        assert!(parent.output.is_empty());
    }

    #[test]
    fn test_fold_keeps_failing_child_output() {
        let mut parent = DescriptionContext::root();
        let mut child = DescriptionContext::new("group".into(), 1);
        child.failure_count = 1;
        child.record("✗ a (0ms)");

        parent.fold(child, false);
        assert_eq!(parent.failure_count, 1);
        assert_eq!(parent.output, vec!["", "group", "  ✗ a (0ms)"]);
    }

    #[test]
    fn test_fold_drops_quiet_child_with_only_skips() {
        let mut parent = DescriptionContext::root();
        let mut child = DescriptionContext::new("group".into(), 1);
        child.record_skip("later");

        parent.fold(child, false);
        assert_eq!(parent.skipped_count, 1);
        assert!(parent.output.is_empty());
    }

    #[test]
    fn test_fold_keeps_skips_when_verbose() {
        let mut parent = DescriptionContext::root();
        let mut child = DescriptionContext::new("group".into(), 1);
        child.record_skip("later");

        parent.fold(child, true);
        assert_eq!(parent.output, vec!["", "group", "  - later (skipped)"]);
    }

    struct Recorder<'l> {
        name: &'static str,
        log: &'l std::cell::RefCell<Vec<String>>,
    }

    impl SpyControl for Recorder<'_> {
        fn method_name(&self) -> &str {
            self.name
        }

        fn key(&self) -> *const () {
            self.name.as_ptr().cast()
        }

        fn reset(&self) {
            self.log.borrow_mut().push(format!("reset {}", self.name));
        }

        fn clear_calls(&self) {
            self.log.borrow_mut().push(format!("clear {}", self.name));
        }
    }

    #[test]
    fn test_spies_reset_last_installed_first() {
        let log = std::cell::RefCell::new(Vec::new());
        let mut scope = DescriptionContext::new("group".into(), 1);
        scope.add_spy(Rc::new(Recorder { name: "a", log: &log }));
        scope.add_spy(Rc::new(Recorder { name: "b", log: &log }));

        scope.clear_spy_calls();
        scope.reset_spies();
        scope.reset_spies();

        assert_eq!(*log.borrow(), ["clear a", "clear b", "reset b", "reset a"]);
    }

    #[test]
    fn test_before_alls_drain_once() {
        let mut scope = DescriptionContext::root();
        scope.add_before_all(Box::new(|_: &Tester<'_>| {}));
        assert_eq!(scope.take_before_alls().len(), 1);
        assert!(scope.take_before_alls().is_empty());
    }
}
