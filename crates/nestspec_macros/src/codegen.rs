//! Turns the DSL AST into calls on a `nestspec::Tester`.

use proc_macro2::{Ident, TokenStream};
use quote::quote;

use crate::dsl::*;

/// The whole invocation becomes one `Result<(), nestspec::UsageError>` expression.
pub fn generate(spec: Spec) -> TokenStream {
    let items = generate_items(&spec.tester, &spec.items);
    quote! {
        (|| -> ::core::result::Result<(), ::nestspec::UsageError> {
            #items
            ::core::result::Result::Ok(())
        })()
    }
}

fn generate_items(t: &Ident, items: &[DslItem]) -> TokenStream {
    let stmts = items.iter().map(|item| generate_item(t, item));
    quote! { #(#stmts)* }
}

fn generate_item(t: &Ident, item: &DslItem) -> TokenStream {
    match item {
        DslItem::Describe(block) => generate_describe(t, block),
        DslItem::It(block) => generate_it(t, block),
        DslItem::BeforeAll(hook) => generate_hook(t, "before_all", hook),
        DslItem::BeforeEach(hook) => generate_hook(t, "before_each", hook),
        DslItem::AfterEach(hook) => generate_hook(t, "after_each", hook),
        DslItem::AfterAll(hook) => generate_hook(t, "after_all", hook),
        DslItem::Declare(HookBlock { body }) => quote! {
            #body
        },
    }
}

fn generate_describe(t: &Ident, block: &DescribeBlock) -> TokenStream {
    let name = &block.name;
    let method = if block.skipped {
        quote! { xdescribe }
    } else {
        quote! { describe }
    };
    let items = generate_items(t, &block.items);

    quote! {
        #t.#method(#name, |#t| -> ::core::result::Result<(), ::nestspec::UsageError> {
            #items
            ::core::result::Result::Ok(())
        })?;
    }
}

fn generate_it(t: &Ident, block: &ItBlock) -> TokenStream {
    let name = &block.name;
    let body = &block.body;
    let method = if block.skipped {
        quote! { xit }
    } else {
        quote! { it }
    };

    // The body may diverge (panic, early return), which would make the
    // trailing Ok unreachable.
    quote! {
        #[allow(unreachable_code)]
        #t.#method(#name, |#t| -> ::nestspec::anyhow::Result<()> {
            #body;
            ::core::result::Result::Ok(())
        })?;
    }
}

fn generate_hook(t: &Ident, register: &str, hook: &HookBlock) -> TokenStream {
    let register = Ident::new(register, proc_macro2::Span::call_site());
    let body = &hook.body;
    quote! {
        #t.#register(|#t| { #body })?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Expansion with whitespace stripped, so assertions don't depend on token spacing.
    fn expand(src: &str) -> String {
        let spec: Spec = syn::parse_str(src).unwrap();
        generate(spec).to_string().replace(' ', "")
    }

    #[test]
    fn test_it_rebinds_tester_and_appends_ok() {
        let out = expand(r#"t => it "works" { check()?; }"#);
        assert!(out.contains(r#"t.it("works",|t|->::nestspec::anyhow::Result<()>"#));
        assert!(out.contains("check()?;;::core::result::Result::Ok(())"));
    }

    #[test]
    fn test_skipped_blocks_use_x_methods() {
        let out = expand(r#"t => xdescribe "later" { xit "one" {} }"#);
        assert!(out.contains(r#"t.xdescribe("later",|t|"#));
        assert!(out.contains(r#"t.xit("one",|t|"#));
    }

    #[test]
    fn test_hooks_register_closures() {
        let out = expand(r#"t => before_each { tick(); } after_all { done(); }"#);
        assert!(out.contains("t.before_each(|t|{tick();})?;"));
        assert!(out.contains("t.after_all(|t|{done();})?;"));
    }

    #[test]
    fn test_declare_is_inlined() {
        let out = expand(r#"t => describe "g" { declare { t.spy_on(&m)?; } }"#);
        assert!(out.contains("t.spy_on(&m)?;"));
    }
}
