//! Message derive macro implementation.
//!
//! # Type-level attributes `#[message(...)]`
//!
//! | Key | Example | Description |
//! |-----|---------|-------------|
//! | `name` | `"billing.invoice"` | Message name (default: the type identifier) |
//! | `kinds` | `kinds("NonFree", "Billing")` | Hierarchy tags |
//! | `requires` | `requires("billing")` | Required application features |
//!
//! The attribute may be repeated; lists are concatenated and the last `name`
//! wins.

use proc_macro2::TokenStream;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::punctuated::Punctuated;
use syn::{Attribute, Data, DeriveInput, LitStr, Token, spanned::Spanned};

// ============================================================================
// Attribute structures
// ============================================================================

#[derive(Default)]
struct MessageAttrs {
    name: Option<String>,
    kinds: Vec<String>,
    requires: Vec<String>,
}

// ============================================================================
// Entry point
// ============================================================================

pub fn derive_message(input: &DeriveInput) -> syn::Result<TokenStream> {
    if let Data::Union(_) = &input.data {
        return Err(syn::Error::new(
            input.span(),
            "Message cannot be derived for unions",
        ));
    }

    let attrs = parse_attrs(&input.attrs)?;
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let name = attrs.name.unwrap_or_else(|| ident.to_string());
    let kinds = &attrs.kinds;
    let requires = &attrs.requires;

    Ok(quote! {
        impl #impl_generics ::courier_core::Message for #ident #ty_generics #where_clause {
            fn message_name(&self) -> &'static str {
                #name
            }

            fn kinds(&self) -> &'static [&'static str] {
                &[#(#kinds),*]
            }

            fn required_features(&self) -> &'static [&'static str] {
                &[#(#requires),*]
            }
        }
    })
}

// ============================================================================
// Attribute parsing
// ============================================================================

fn parse_attrs(attrs: &[Attribute]) -> syn::Result<MessageAttrs> {
    let mut out = MessageAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("message") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                out.name = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("kinds") {
                out.kinds.extend(parse_str_list(&meta)?);
            } else if meta.path.is_ident("requires") {
                out.requires.extend(parse_str_list(&meta)?);
            } else {
                return Err(meta.error("expected `name`, `kinds(...)` or `requires(...)`"));
            }
            Ok(())
        })?;
    }

    Ok(out)
}

/// Parses `key("a", "b", ...)`.
fn parse_str_list(meta: &ParseNestedMeta<'_>) -> syn::Result<Vec<String>> {
    let content;
    syn::parenthesized!(content in meta.input);
    let list = Punctuated::<LitStr, Token![,]>::parse_terminated(&content)?;
    let values: Vec<String> = list.iter().map(LitStr::value).collect();

    if let Some(empty) = list.iter().find(|lit| lit.value().is_empty()) {
        return Err(syn::Error::new(empty.span(), "empty strings are not allowed"));
    }

    Ok(values)
}
