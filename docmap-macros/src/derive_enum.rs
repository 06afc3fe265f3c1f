use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, LitStr, Result, spanned::Spanned};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let Data::Enum(data) = &input.data else {
        return Err(Error::new(input.span(), "BeanEnum can only be derived for enums"));
    };
    if data.variants.is_empty() {
        return Err(Error::new(input.span(), "BeanEnum requires at least one variant"));
    }
    if let Some(variant) = data.variants.iter().find(|v| !matches!(v.fields, Fields::Unit)) {
        return Err(Error::new_spanned(variant, "BeanEnum variants cannot carry fields"));
    }

    let ident = &input.ident;
    let name = LitStr::new(&ident.to_string(), ident.span());
    let variants: Vec<_> = data.variants.iter().map(|variant| &variant.ident).collect();
    let constants: Vec<_> = variants
        .iter()
        .map(|variant| LitStr::new(&variant.to_string(), variant.span()))
        .collect();

    Ok(quote! {
        impl ::docmap::bean::BeanValue for #ident {
            fn property_type() -> ::docmap::value::PropertyType {
                ::docmap::value::PropertyType::Enum(::docmap::value::EnumType::new(#name, [#(#constants),*]))
            }

            fn to_value(
                &self,
            ) -> ::docmap::error::DatastoreResult<::std::option::Option<::docmap::value::Value>> {
                let constant = match self {
                    #( #ident::#variants => #constants, )*
                };
                ::std::result::Result::Ok(::std::option::Option::Some(
                    ::docmap::value::Value::Enum(::std::string::ToString::to_string(constant)),
                ))
            }

            fn from_value(
                value: ::std::option::Option<&::docmap::value::Value>,
            ) -> ::docmap::error::DatastoreResult<Self> {
                if let ::std::option::Option::Some(::docmap::value::Value::Enum(constant)) = value {
                    match constant.as_str() {
                        #( #constants => return ::std::result::Result::Ok(#ident::#variants), )*
                        _ => {}
                    }
                }

                ::std::result::Result::Err(::docmap::bean::mismatch::<Self>(value))
            }
        }
    })
}
