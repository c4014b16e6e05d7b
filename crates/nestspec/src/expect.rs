//! Fluent, single-use assertions over one actual value.
//!
//! Every matcher consumes the [`Expectation`] and returns
//! `Result<(), AssertionFailure>`, so unit bodies chain them with `?`.
//! [`Expectation::not`] negates whichever matcher follows.

use std::fmt::{self, Debug};
use std::rc::Rc;
use std::sync::Arc;

use difference::{Changeset, Difference};

use crate::error::AssertionFailure;
use crate::spy::{Method, Spy};

/// The fluent assertion object returned by [`Tester::expect`](crate::Tester::expect).
#[must_use = "an expectation does nothing until a matcher is called"]
pub struct Expectation<T> {
    actual: T,
    negated: bool,
}

impl<T> Expectation<T> {
    pub fn new(actual: T) -> Self {
        Expectation {
            actual,
            negated: false,
        }
    }

    /// Negate the outcome of the next matcher.
    #[allow(clippy::should_implement_trait)]
    pub fn not(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    fn verdict(
        &self,
        held: bool,
        message: impl FnOnce(&str) -> String,
    ) -> Result<(), AssertionFailure> {
        if held != self.negated {
            return Ok(());
        }
        let not = if self.negated { " not" } else { "" };
        Err(AssertionFailure::new(message(not)))
    }
}

// ============================================================================
// Value matchers
// ============================================================================

impl<T: Debug> Expectation<T> {
    /// Deep structural equality, as derived by `PartialEq`.
    ///
    /// On mismatch the message carries a line diff of the pretty-printed values.
    pub fn to_equal<E: Debug>(self, expected: E) -> Result<(), AssertionFailure>
    where
        T: PartialEq<E>,
    {
        let held = self.actual == expected;
        self.verdict(held, |not| {
            let mut message = format!(
                "Expected {:?}{not} to equal {:?}.",
                self.actual, expected
            );
            if !held {
                let diff = pretty_diff(&expected, &self.actual);
                if !diff.is_empty() {
                    message.push('\n');
                    message.push_str(&diff);
                }
            }
            message
        })
    }

    /// Identity for shared handles, value equality for primitives.
    pub fn to_be<E: Debug>(self, expected: E) -> Result<(), AssertionFailure>
    where
        T: Identical<E>,
    {
        let held = self.actual.is_identical(&expected);
        self.verdict(held, |not| {
            format!("Expected {:?}{not} to be {:?}.", self.actual, expected)
        })
    }
}

/// Line diff of the `{:#?}` renderings, `-` expected / `+` actual.
///
/// Empty when both values print on a single line.
fn pretty_diff(expected: &dyn Debug, actual: &dyn Debug) -> String {
    let expected = format!("{expected:#?}");
    let actual = format!("{actual:#?}");
    if !expected.contains('\n') && !actual.contains('\n') {
        return String::new();
    }

    let changeset = Changeset::new(&expected, &actual, "\n");
    let mut lines = Vec::new();
    for diff in &changeset.diffs {
        let (marker, chunk) = match diff {
            Difference::Same(x) => (' ', x),
            Difference::Rem(x) => ('-', x),
            Difference::Add(x) => ('+', x),
        };
        for line in chunk.lines() {
            lines.push(format!("{marker} {line}"));
        }
    }
    lines.join("\n")
}

// ============================================================================
// Identity
// ============================================================================

/// The relation checked by [`Expectation::to_be`].
///
/// Scalars and strings compare by value (floats by bit pattern, so `NaN` is
/// identical to itself and `0.0` is not identical to `-0.0`). Shared handles
/// compare by allocation.
pub trait Identical<Rhs = Self> {
    fn is_identical(&self, other: &Rhs) -> bool;
}

macro_rules! identical_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identical for $ty {
                fn is_identical(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

identical_by_value!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, String,
);

impl<'a, 'b> Identical<&'b str> for &'a str {
    fn is_identical(&self, other: &&'b str) -> bool {
        *self == *other
    }
}

impl Identical<&str> for String {
    fn is_identical(&self, other: &&str) -> bool {
        self == other
    }
}

macro_rules! identical_by_bits {
    ($($ty:ty),*) => {
        $(
            impl Identical for $ty {
                fn is_identical(&self, other: &Self) -> bool {
                    (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
                }
            }
        )*
    };
}

identical_by_bits!(f32, f64);

impl<T: ?Sized> Identical for Rc<T> {
    fn is_identical(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Identical for Arc<T> {
    fn is_identical(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<A: 'static, R: 'static> Identical for Method<A, R> {
    fn is_identical(&self, other: &Self) -> bool {
        self.same_method(other)
    }
}

impl<'a, 'b, A: 'static, R: 'static> Identical<&'b Method<A, R>> for &'a Method<A, R> {
    fn is_identical(&self, other: &&'b Method<A, R>) -> bool {
        self.same_method(other)
    }
}

impl<A, R> Identical for Spy<A, R> {
    fn is_identical(&self, other: &Self) -> bool {
        self.same_spy(other)
    }
}

// ============================================================================
// SpyMatcher and call patterns
// ============================================================================

/// A predicate standing in for a literal argument in
/// [`to_have_been_called_with`](Expectation::to_have_been_called_with).
///
/// Implements `PartialEq<T>` by applying the predicate, so it slots into a call
/// pattern tuple next to literal values.
pub struct SpyMatcher<T: ?Sized> {
    predicate: Rc<dyn Fn(&T) -> bool>,
    label: String,
}

impl<T: ?Sized> SpyMatcher<T> {
    pub fn new(predicate: impl Fn(&T) -> bool + 'static) -> Self {
        SpyMatcher {
            predicate: Rc::new(predicate),
            label: "matcher".to_string(),
        }
    }

    /// Name the matcher in failure messages.
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn matches(&self, actual: &T) -> bool {
        (self.predicate)(actual)
    }
}

impl<T: ?Sized> Clone for SpyMatcher<T> {
    fn clone(&self) -> Self {
        SpyMatcher {
            predicate: Rc::clone(&self.predicate),
            label: self.label.clone(),
        }
    }
}

impl<T: ?Sized> PartialEq<T> for SpyMatcher<T> {
    fn eq(&self, other: &T) -> bool {
        self.matches(other)
    }
}

impl<T: ?Sized> Debug for SpyMatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.label)
    }
}

/// An expected argument tuple, compared element-wise against a recorded call.
///
/// Implemented for tuples (arity 0 to 6) whose elements are `PartialEq` with
/// the recorded argument types; [`SpyMatcher`] elements apply their predicate.
pub trait CallPattern<A>: Debug {
    fn matches_call(&self, args: &A) -> bool;
}

impl CallPattern<()> for () {
    fn matches_call(&self, _args: &()) -> bool {
        true
    }
}

macro_rules! tuple_call_pattern {
    ($(($($P:ident $A:ident $idx:tt),+)),+ $(,)?) => {
        $(
            impl<$($A, $P: PartialEq<$A> + Debug),+> CallPattern<($($A,)+)> for ($($P,)+) {
                fn matches_call(&self, args: &($($A,)+)) -> bool {
                    $(self.$idx == args.$idx)&&+
                }
            }
        )+
    };
}

tuple_call_pattern!(
    (P0 A0 0),
    (P0 A0 0, P1 A1 1),
    (P0 A0 0, P1 A1 1, P2 A2 2),
    (P0 A0 0, P1 A1 1, P2 A2 2, P3 A3 3),
    (P0 A0 0, P1 A1 1, P2 A2 2, P3 A3 3, P4 A4 4),
    (P0 A0 0, P1 A1 1, P2 A2 2, P3 A3 3, P4 A4 4, P5 A5 5),
);

// ============================================================================
// Spy matchers
// ============================================================================

/// Anything a call-tracking matcher can be pointed at.
///
/// A raw [`Method`] only qualifies while a spy is installed on it; otherwise
/// the matcher fails with "Expected a spy".
pub trait SpyTarget {
    type Args;
    type Output;

    fn resolve_spy(&self) -> Result<Spy<Self::Args, Self::Output>, AssertionFailure>;
}

impl<A: 'static, R: 'static> SpyTarget for Spy<A, R> {
    type Args = A;
    type Output = R;

    fn resolve_spy(&self) -> Result<Spy<A, R>, AssertionFailure> {
        Ok(self.clone())
    }
}

impl<A: 'static, R: 'static> SpyTarget for Method<A, R> {
    type Args = A;
    type Output = R;

    fn resolve_spy(&self) -> Result<Spy<A, R>, AssertionFailure> {
        self.assert_spy()
    }
}

impl<S: SpyTarget + ?Sized> SpyTarget for &S {
    type Args = S::Args;
    type Output = S::Output;

    fn resolve_spy(&self) -> Result<Spy<S::Args, S::Output>, AssertionFailure> {
        (**self).resolve_spy()
    }
}

impl<S> Expectation<S>
where
    S: SpyTarget,
    S::Args: Debug,
{
    /// At least one call was recorded.
    pub fn to_have_been_called(self) -> Result<(), AssertionFailure> {
        let spy = self.actual.resolve_spy()?;
        let count = spy.call_count();
        self.verdict(count > 0, |not| {
            format!(
                "Expected spy `{}`{not} to have been called, but it was called {}.",
                spy.name(),
                times(count)
            )
        })
    }

    pub fn to_have_been_called_times(self, expected: usize) -> Result<(), AssertionFailure> {
        let spy = self.actual.resolve_spy()?;
        let count = spy.call_count();
        self.verdict(count == expected, |not| {
            format!(
                "Expected spy `{}`{not} to have been called {}, but it was called {}.",
                spy.name(),
                times(expected),
                times(count)
            )
        })
    }

    /// Some recorded call matches `pattern` element-wise.
    pub fn to_have_been_called_with<P>(self, pattern: P) -> Result<(), AssertionFailure>
    where
        P: CallPattern<S::Args>,
    {
        let spy = self.actual.resolve_spy()?;
        let (held, recorded) = spy.with_calls(|calls| {
            let held = calls.iter().any(|call| pattern.matches_call(call));
            let recorded: Vec<String> = calls.iter().map(|call| format!("{call:?}")).collect();
            (held, recorded)
        });
        self.verdict(held, |not| {
            let actual = if recorded.is_empty() {
                "it was never called".to_string()
            } else {
                format!("actual calls were {}", recorded.join(", "))
            };
            format!(
                "Expected spy `{}`{not} to have been called with {:?}, but {actual}.",
                spy.name(),
                pattern
            )
        })
    }
}

fn times(n: usize) -> String {
    match n {
        1 => "once".to_string(),
        n => format!("{n} times"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Sheet {
        name: String,
        rows: Vec<(u32, f64)>,
    }

    fn sheet() -> Sheet {
        Sheet {
            name: "balance".into(),
            rows: vec![(1, 10.5), (2, -3.0)],
        }
    }

    #[test]
    fn test_to_equal_structural() {
        assert!(Expectation::new(sheet()).to_equal(sheet()).is_ok());
        assert!(Expectation::new(String::from("a")).to_equal("a").is_ok());
        assert!(Expectation::new(vec![1, 2]).not().to_equal(vec![1, 3]).is_ok());
    }

    #[test]
    fn test_to_equal_failure_carries_diff() {
        let mut other = sheet();
        other.rows[1].1 = 4.0;

        let err = Expectation::new(other).to_equal(sheet()).unwrap_err();
        let message = err.message();
        assert!(message.starts_with("Expected Sheet"));
        assert!(message.contains("- "));
        assert!(message.contains("-3.0"));
        assert!(message.contains("+ "));
        assert!(message.contains("4.0"));
    }

    #[test]
    fn test_negated_failure_message() {
        let err = Expectation::new(3).not().to_equal(3).unwrap_err();
        assert_eq!(err.message(), "Expected 3 not to equal 3.");
    }

    #[test]
    fn test_to_be_identity_and_primitives() {
        let shared = Rc::new(sheet());
        let copy = Rc::new(sheet());

        assert!(Expectation::new(Rc::clone(&shared)).to_be(Rc::clone(&shared)).is_ok());
        assert!(Expectation::new(Rc::clone(&shared)).to_be(copy).is_err());
        assert!(Expectation::new(7u8).to_be(7u8).is_ok());
        assert!(Expectation::new("x").to_be("x").is_ok());
        assert!(Expectation::new(f64::NAN).to_be(f64::NAN).is_ok());
        assert!(Expectation::new(0.0f64).to_be(-0.0f64).is_err());
    }

    #[test]
    fn test_matchers_on_plain_method_require_a_spy() {
        let m: Method<(i32,), i32> = Method::new("double", |(x,)| x * 2);
        let err = Expectation::new(&m).to_have_been_called_times(0).unwrap_err();
        assert_eq!(err.message(), "Expected a spy, but got method `double`.");
    }

    #[test]
    fn test_called_times_and_with() {
        let m: Method<(i32, String), ()> = Method::new("log", |_| ());
        let spy = Spy::install(&m);
        m.call((1, "one".to_string()));
        m.call((2, "two".to_string()));

        assert!(Expectation::new(&spy).to_have_been_called().is_ok());
        assert!(Expectation::new(&spy).to_have_been_called_times(2).is_ok());
        assert!(Expectation::new(&m).to_have_been_called_with((2, "two")).is_ok());
        assert!(Expectation::new(&m).not().to_have_been_called_with((3, "two")).is_ok());

        let err = Expectation::new(&spy).to_have_been_called_times(1).unwrap_err();
        assert_eq!(
            err.message(),
            "Expected spy `log` to have been called once, but it was called 2 times."
        );
    }

    #[test]
    fn test_called_with_matcher_argument() {
        let m: Method<(i32, String), ()> = Method::new("log", |_| ());
        let spy = Spy::install(&m);
        m.call((5, "hello world".to_string()));

        let starts_with_hello =
            SpyMatcher::new(|s: &String| s.starts_with("hello")).labeled("starts with hello");
        assert!(Expectation::new(&spy)
            .to_have_been_called_with((5, starts_with_hello.clone()))
            .is_ok());

        let err = Expectation::new(&spy)
            .to_have_been_called_with((6, starts_with_hello))
            .unwrap_err();
        assert_eq!(
            err.message(),
            "Expected spy `log` to have been called with (6, <starts with hello>), \
             but actual calls were (5, \"hello world\")."
        );
    }

    #[test]
    fn test_called_with_on_uncalled_spy() {
        let m: Method<(), u8> = Method::new("tick", |()| 0);
        let spy = Spy::install(&m);
        let err = Expectation::new(&spy).to_have_been_called_with(()).unwrap_err();
        assert!(err.message().ends_with("but it was never called."));
    }
}
