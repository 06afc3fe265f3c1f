//! Procedural macros for the docmap project.
//!
//! - `#[derive(Bean)]` maps a struct with named fields onto a property set. Field
//!   attributes: `#[bean(path = "...")]` names the document field, `#[bean(id)]` marks the
//!   identifier, `#[bean(temporal = "date")]` truncates date-times to the day and
//!   `#[bean(ignore)]` leaves a field out (it is rebuilt with `Default`). A derived bean
//!   can itself be a field of another bean, stored as an embedded document.
//! - `#[derive(BeanEnum)]` maps a fieldless enum onto an enumeration property type.

#[allow(unused_extern_crates)]
extern crate self as docmap_macros;

mod derive_bean;
mod derive_enum;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

#[proc_macro_derive(Bean, attributes(bean))]
pub fn derive_bean(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    derive_bean::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[proc_macro_derive(BeanEnum)]
pub fn derive_bean_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    derive_enum::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
