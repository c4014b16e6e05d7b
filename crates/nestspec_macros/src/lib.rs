//! Proc macros for the `nestspec` test engine.

mod codegen;
mod dsl;

/// Drive a `nestspec::Tester` with a block-structured DSL.
///
/// Expands to an expression of type `Result<(), nestspec::UsageError>`. The
/// identifier before `=>` names the tester and is rebound inside every group
/// and unit, so bodies can call `t.expect(..)` directly.
///
/// # Example
///
/// ```text
/// let tester = nestspec::Tester::default();
/// nestspec::spec!(t =>
///     describe "Calculator" {
///         before_each { COUNTER.fetch_add(1, Ordering::SeqCst); }
///
///         it "adds two numbers" {
///             t.expect(2 + 3).to_equal(5)?;
///         }
///
///         context "with a spy" {
///             declare { t.spy_on(&calc.add)?.and().return_value(0); }
///
///             it "uses the fake" {
///                 t.expect(calc.add.call((2, 3))).to_equal(0)?;
///             }
///         }
///
///         xit "not yet" { unimplemented!() }
///     }
/// )
/// .unwrap();
/// ```
///
/// # Supported DSL keywords
///
/// ## Groups
/// - `describe "name" { ... }` / `context "name" { ... }`
/// - `xdescribe` / `xcontext` — recorded as skipped, never run
///
/// ## Units
/// - `it "name" { ... }` / `specify "name" { ... }` — the body may use `?`;
///   `Ok(())` is appended
/// - `xit` / `xspecify` — recorded as skipped, never run
///
/// ## Lifecycle hooks
/// - `before_all { ... }` — once, before the group's first unit or nested group
/// - `before_each { ... }` — before every unit in this group and nested groups
/// - `after_each { ... }` — after every unit, pass or fail
/// - `after_all { ... }` — once, when the group closes
///
/// Hook bodies see the tester under the same name and evaluate to `()`, so
/// they can install spies (`if let Ok(spy) = t.spy_on(..)`) but not use `?`.
///
/// ## Declarations
/// - `declare { ... }` — statements run while the group is being declared,
///   e.g. installing spies with `t.spy_on(..)?`
///
/// # Execution order
///
/// ```text
/// before_all (once per group) -> before_each (outer to inner) -> body
///     -> after_each (outer to inner) -> after_all (once per group)
/// ```
#[proc_macro]
pub fn spec(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let spec = syn::parse_macro_input!(input as dsl::Spec);
    codegen::generate(spec).into()
}
