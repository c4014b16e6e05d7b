//! Spies — reversible interception of injected methods.
//!
//! Code under test holds [`Method`] handles instead of calling concrete
//! functions directly. A [`Spy`] installs itself into a handle, records every
//! call routed through it, optionally overrides the behavior, and restores the
//! original callable on [`Spy::reset`]. Clones of a `Method` share one slot, so
//! every clone observes the installation.
//!
//! ```rust
//! use nestspec::{Method, Tester};
//!
//! struct Ledger {
//!     total: Method<(i32, i32), i32>,
//! }
//!
//! let ledger = Ledger { total: Method::new("total", |(a, b)| a + b) };
//! let tester = Tester::default();
//!
//! tester.describe("ledger", |t| {
//!     t.spy_on(&ledger.total)?.and().return_value(42);
//!     t.it("uses the fixed value", |t| {
//!         t.expect(ledger.total.call((1, 2))).to_equal(42)?;
//!         t.expect(&ledger.total).to_have_been_called_with((1, 2))?;
//!         Ok(())
//!     })
//! }).unwrap();
//!
//! assert_eq!(ledger.total.call((1, 2)), 3);
//! assert_eq!(tester.finish().success_count, 1);
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::error::AssertionFailure;

type Callable<A, R> = Rc<dyn Fn(A) -> R>;

// ============================================================================
// Method: the injectable, replaceable callable
// ============================================================================

struct Slot<A, R> {
    name: String,
    current: RefCell<Callable<A, R>>,
    spy: RefCell<Option<Spy<A, R>>>,
}

/// A named, replaceable callable taking its arguments as one tuple `A`.
pub struct Method<A, R> {
    slot: Rc<Slot<A, R>>,
}

impl<A: 'static, R: 'static> Method<A, R> {
    pub fn new(name: impl Into<String>, f: impl Fn(A) -> R + 'static) -> Self {
        Method {
            slot: Rc::new(Slot {
                name: name.into(),
                current: RefCell::new(Rc::new(f)),
                spy: RefCell::new(None),
            }),
        }
    }

    /// Invoke whatever is currently installed in the slot.
    pub fn call(&self, args: A) -> R {
        let f = Rc::clone(&*self.slot.current.borrow());
        f(args)
    }

    pub fn name(&self) -> &str {
        &self.slot.name
    }

    pub fn is_spy(&self) -> bool {
        self.slot.spy.borrow().is_some()
    }

    /// The spy currently installed on this method, if any.
    pub fn spy(&self) -> Option<Spy<A, R>> {
        self.slot.spy.borrow().clone()
    }

    /// Like [`spy`](Self::spy), but a plain method is an assertion failure.
    pub fn assert_spy(&self) -> Result<Spy<A, R>, AssertionFailure> {
        self.spy().ok_or_else(|| {
            AssertionFailure::new(format!(
                "Expected a spy, but got method `{}`.",
                self.name()
            ))
        })
    }

    /// Whether both handles refer to the same slot.
    pub fn same_method(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<A, R> Clone for Method<A, R> {
    fn clone(&self) -> Self {
        Method {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<A, R> fmt::Debug for Method<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.slot.name)
            .field("spied", &self.slot.spy.borrow().is_some())
            .finish()
    }
}

/// Name-based method lookup, for spying by `(object, "method")`.
///
/// Implementors return their `Method` fields as `&dyn Any`; the tester
/// downcasts to the requested signature.
///
/// ```rust
/// use std::any::Any;
/// use nestspec::{Method, MethodTable};
///
/// struct Mailer {
///     send: Method<(String,), bool>,
/// }
///
/// impl MethodTable for Mailer {
///     fn method(&self, name: &str) -> Option<&dyn Any> {
///         match name {
///             "send" => Some(&self.send),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait MethodTable {
    fn method(&self, name: &str) -> Option<&dyn Any>;
}

// ============================================================================
// Spy
// ============================================================================

enum Strategy<A, R> {
    CallThrough,
    CallFake(Callable<A, R>),
    ReturnValue(Rc<dyn Fn() -> R>),
}

impl<A, R> Clone for Strategy<A, R> {
    fn clone(&self) -> Self {
        match self {
            Strategy::CallThrough => Strategy::CallThrough,
            Strategy::CallFake(f) => Strategy::CallFake(Rc::clone(f)),
            Strategy::ReturnValue(v) => Strategy::ReturnValue(Rc::clone(v)),
        }
    }
}

struct SpyState<A, R> {
    name: String,
    target: Weak<Slot<A, R>>,
    original: Callable<A, R>,
    strategy: RefCell<Strategy<A, R>>,
    calls: RefCell<Vec<A>>,
    installed: Cell<bool>,
}

impl<A: Clone, R> SpyState<A, R> {
    fn invoke(&self, args: A) -> R {
        let strategy = self.strategy.borrow().clone();
        let result = match strategy {
            Strategy::CallThrough => (self.original)(args.clone()),
            Strategy::CallFake(fake) => fake(args.clone()),
            Strategy::ReturnValue(value) => value(),
        };
        self.calls.borrow_mut().push(args);
        result
    }
}

/// An installed interception wrapper around one [`Method`].
///
/// Cloning a `Spy` yields another handle to the same installation.
pub struct Spy<A, R> {
    state: Rc<SpyState<A, R>>,
}

impl<A: Clone + 'static, R: 'static> Spy<A, R> {
    /// Replace the method's callable with a recording wrapper.
    pub(crate) fn install(method: &Method<A, R>) -> Self {
        let slot = &method.slot;
        let original = Rc::clone(&*slot.current.borrow());
        let spy = Spy {
            state: Rc::new(SpyState {
                name: slot.name.clone(),
                target: Rc::downgrade(slot),
                original,
                strategy: RefCell::new(Strategy::CallThrough),
                calls: RefCell::new(Vec::new()),
                installed: Cell::new(true),
            }),
        };

        let state = Rc::clone(&spy.state);
        *slot.current.borrow_mut() = Rc::new(move |args: A| state.invoke(args));
        *slot.spy.borrow_mut() = Some(spy.clone());

        debug!(target: "nestspec::spy", method = %slot.name, "spy installed");
        spy
    }

    /// Behavior overrides, in the `spy.and().return_value(..)` style.
    pub fn and(&self) -> SpyStrategy<'_, A, R> {
        SpyStrategy { spy: self }
    }

    /// Restore the original callable and detach. Idempotent.
    pub fn reset(&self) {
        if !self.state.installed.replace(false) {
            return;
        }
        if let Some(slot) = self.state.target.upgrade() {
            *slot.current.borrow_mut() = Rc::clone(&self.state.original);
            slot.spy.borrow_mut().take();
        }
        debug!(target: "nestspec::spy", method = %self.state.name, "spy reset");
    }

    /// Forget recorded calls but stay installed.
    pub fn clear_calls(&self) {
        self.state.calls.borrow_mut().clear();
    }

    /// Snapshot the current behavior so it can be put back later.
    pub(crate) fn checkpoint(&self) -> SpyCheckpoint<A, R> {
        SpyCheckpoint {
            spy: self.clone(),
            strategy: self.state.strategy.borrow().clone(),
        }
    }
}

impl<A, R> Spy<A, R> {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn is_installed(&self) -> bool {
        self.state.installed.get()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.borrow().len()
    }

    pub fn calls(&self) -> Vec<A>
    where
        A: Clone,
    {
        self.state.calls.borrow().clone()
    }

    pub fn most_recent_call(&self) -> Option<A>
    where
        A: Clone,
    {
        self.state.calls.borrow().last().cloned()
    }

    /// Borrow the recorded argument tuples without cloning them.
    pub fn with_calls<T>(&self, f: impl FnOnce(&[A]) -> T) -> T {
        f(&self.state.calls.borrow())
    }

    /// Whether both handles refer to the same installation.
    pub fn same_spy(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn key(&self) -> *const () {
        Rc::as_ptr(&self.state).cast()
    }
}

impl<A, R> Clone for Spy<A, R> {
    fn clone(&self) -> Self {
        Spy {
            state: Rc::clone(&self.state),
        }
    }
}

impl<A, R> fmt::Debug for Spy<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spy")
            .field("name", &self.state.name)
            .field("calls", &self.state.calls.borrow().len())
            .field("installed", &self.state.installed.get())
            .finish()
    }
}

/// Setter for a spy's behavior, returned by [`Spy::and`].
pub struct SpyStrategy<'s, A, R> {
    spy: &'s Spy<A, R>,
}

impl<'s, A: 'static, R: 'static> SpyStrategy<'s, A, R> {
    /// Invoke the original method (the default).
    pub fn call_through(self) -> &'s Spy<A, R> {
        *self.spy.state.strategy.borrow_mut() = Strategy::CallThrough;
        self.spy
    }

    /// Invoke `fake` instead of the original.
    pub fn call_fake(self, fake: impl Fn(A) -> R + 'static) -> &'s Spy<A, R> {
        *self.spy.state.strategy.borrow_mut() = Strategy::CallFake(Rc::new(fake));
        self.spy
    }

    /// Return `value` without invoking the original.
    pub fn return_value(self, value: R) -> &'s Spy<A, R>
    where
        R: Clone,
    {
        *self.spy.state.strategy.borrow_mut() =
            Strategy::ReturnValue(Rc::new(move || value.clone()));
        self.spy
    }
}

// ============================================================================
// Type-erased control, for per-scope registries
// ============================================================================

pub(crate) trait SpyControl {
    fn method_name(&self) -> &str;
    /// Identifies the installation; checkpoints share their spy's key.
    fn key(&self) -> *const ();
    fn reset(&self);
    fn clear_calls(&self);
}

impl<A: Clone + 'static, R: 'static> SpyControl for Spy<A, R> {
    fn method_name(&self) -> &str {
        self.name()
    }

    fn key(&self) -> *const () {
        Spy::key(self)
    }

    fn reset(&self) {
        Spy::reset(self);
    }

    fn clear_calls(&self) {
        Spy::clear_calls(self);
    }
}

/// A spy's behavior as it was when a nested scope re-spied the method.
///
/// Resetting it puts that behavior back without detaching the spy, which
/// stays owned by the scope that installed it.
pub(crate) struct SpyCheckpoint<A, R> {
    spy: Spy<A, R>,
    strategy: Strategy<A, R>,
}

impl<A: Clone + 'static, R: 'static> SpyControl for SpyCheckpoint<A, R> {
    fn method_name(&self) -> &str {
        self.spy.name()
    }

    fn key(&self) -> *const () {
        self.spy.key()
    }

    fn reset(&self) {
        if !self.spy.is_installed() {
            return;
        }
        *self.spy.state.strategy.borrow_mut() = self.strategy.clone();
        debug!(target: "nestspec::spy", method = %self.spy.name(), "spy behavior restored");
    }

    // History belongs to the spy itself.
    fn clear_calls(&self) {}
}
