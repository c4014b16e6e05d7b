//! DSL AST types and `syn::parse::Parse` implementations.

use proc_macro2::TokenStream;
use syn::parse::{Parse, ParseStream};
use syn::{braced, Ident, LitStr, Result, Token};

// ============================================================================
// AST types
// ============================================================================

/// `tester => items...`. The tester binding is rebound in every nested closure.
#[derive(Debug)]
pub struct Spec {
    pub tester: Ident,
    pub items: Vec<DslItem>,
}

/// A single DSL node.
#[derive(Debug)]
pub enum DslItem {
    Describe(DescribeBlock),
    It(ItBlock),
    BeforeAll(HookBlock),
    BeforeEach(HookBlock),
    AfterEach(HookBlock),
    AfterAll(HookBlock),
    Declare(HookBlock),
}

/// `describe "name" { ... }` / `context "name" { ... }`, or skipped with an `x` prefix.
#[derive(Debug)]
pub struct DescribeBlock {
    pub name: LitStr,
    pub skipped: bool,
    pub items: Vec<DslItem>,
}

/// `it "name" { ... }` / `specify "name" { ... }`, or skipped with an `x` prefix.
#[derive(Debug)]
pub struct ItBlock {
    pub name: LitStr,
    pub skipped: bool,
    pub body: TokenStream,
}

/// A hook or `declare` block: `keyword { ... }`.
#[derive(Debug)]
pub struct HookBlock {
    pub body: TokenStream,
}

// ============================================================================
// Parsing
// ============================================================================

impl Parse for Spec {
    fn parse(input: ParseStream) -> Result<Self> {
        let tester: Ident = input.parse()?;
        input.parse::<Token![=>]>()?;
        let items = parse_items(input)?;
        Ok(Spec { tester, items })
    }
}

/// Parse a sequence of DSL items until the stream is exhausted.
fn parse_items(input: ParseStream) -> Result<Vec<DslItem>> {
    let mut items = Vec::new();
    while !input.is_empty() {
        items.push(input.parse::<DslItem>()?);
    }
    Ok(items)
}

impl Parse for DslItem {
    fn parse(input: ParseStream) -> Result<Self> {
        let ident: Ident = input.parse()?;
        let name = ident.to_string();

        match name.as_str() {
            "describe" | "context" => Ok(DslItem::Describe(parse_describe_block(input, false)?)),
            "xdescribe" | "xcontext" => Ok(DslItem::Describe(parse_describe_block(input, true)?)),

            "it" | "specify" => Ok(DslItem::It(parse_it_block(input, false)?)),
            "xit" | "xspecify" => Ok(DslItem::It(parse_it_block(input, true)?)),

            "before_all" => Ok(DslItem::BeforeAll(parse_hook_block(input)?)),
            "before_each" => Ok(DslItem::BeforeEach(parse_hook_block(input)?)),
            "after_each" => Ok(DslItem::AfterEach(parse_hook_block(input)?)),
            "after_all" => Ok(DslItem::AfterAll(parse_hook_block(input)?)),
            "declare" => Ok(DslItem::Declare(parse_hook_block(input)?)),

            _ => Err(syn::Error::new(
                ident.span(),
                format!(
                    "unknown DSL keyword `{name}`. Expected one of: \
                     describe, context, it, specify, before_all, before_each, \
                     after_each, after_all, declare \
                     (with optional x prefix on groups and units to skip them)"
                ),
            )),
        }
    }
}

// ============================================================================
// Block parsers
// ============================================================================

/// Parse: `"name" { items... }`
fn parse_describe_block(input: ParseStream, skipped: bool) -> Result<DescribeBlock> {
    let name: LitStr = input.parse()?;
    let content;
    braced!(content in input);
    let items = parse_items(&content)?;
    Ok(DescribeBlock {
        name,
        skipped,
        items,
    })
}

/// Parse: `"name" { body }`
fn parse_it_block(input: ParseStream, skipped: bool) -> Result<ItBlock> {
    let name: LitStr = input.parse()?;
    let content;
    braced!(content in input);
    let body: TokenStream = content.parse()?;
    Ok(ItBlock {
        name,
        skipped,
        body,
    })
}

/// Parse: `{ body }`
fn parse_hook_block(input: ParseStream) -> Result<HookBlock> {
    let content;
    braced!(content in input);
    let body: TokenStream = content.parse()?;
    Ok(HookBlock { body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_nested_items() {
        let spec: Spec = syn::parse_str(
            r#"t => describe "outer" {
                before_each { setup(); }
                it "works" { check()?; }
                xcontext "later" { it "skipped" {} }
            }"#,
        )
        .unwrap();

        assert_eq!(spec.tester, "t");
        let DslItem::Describe(outer) = &spec.items[0] else {
            panic!("expected describe");
        };
        assert_eq!(outer.name.value(), "outer");
        assert_eq!(outer.items.len(), 3);
        assert!(matches!(&outer.items[2], DslItem::Describe(d) if d.skipped));
    }

    #[test]
    fn test_rejects_unknown_keyword() {
        let err = syn::parse_str::<Spec>(r#"t => fit "focused" {}"#).unwrap_err();
        assert!(err.to_string().contains("unknown DSL keyword `fit`"));
    }
}
