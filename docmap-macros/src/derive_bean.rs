use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, Ident, LitStr, Result, Type, spanned::Spanned};

struct BeanField {
    ident: Ident,
    ty: Type,
    path: String,
    id: bool,
    temporal: Option<Ident>,
    ignore: bool,
}

impl BeanField {
    fn parse(field: &syn::Field) -> Result<Self> {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| Error::new_spanned(field, "expected a named field"))?;

        let mut bean_field = BeanField {
            path: ident.to_string(),
            ident,
            ty: field.ty.clone(),
            id: false,
            temporal: None,
            ignore: false,
        };

        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("bean")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("path") {
                    let path: LitStr = meta.value()?.parse()?;
                    if path.value().is_empty() {
                        return Err(meta.error("path must not be empty"));
                    }
                    bean_field.path = path.value();
                } else if meta.path.is_ident("id") {
                    bean_field.id = true;
                } else if meta.path.is_ident("ignore") {
                    bean_field.ignore = true;
                } else if meta.path.is_ident("temporal") {
                    let temporal: LitStr = meta.value()?.parse()?;
                    let variant = match temporal.value().as_str() {
                        "date" => "Date",
                        "date_time" => "DateTime",
                        _ => return Err(meta.error("temporal must be \"date\" or \"date_time\"")),
                    };
                    bean_field.temporal = Some(Ident::new(variant, temporal.span()));
                } else {
                    return Err(meta.error("unsupported bean attribute"));
                }

                Ok(())
            })?;
        }

        if bean_field.ignore && (bean_field.id || bean_field.temporal.is_some()) {
            return Err(Error::new_spanned(field, "an ignored field takes no other bean attribute"));
        }

        Ok(bean_field)
    }
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(&input.generics, "beans cannot be generic"));
    }

    let Data::Struct(data) = &input.data else {
        return Err(Error::new(input.span(), "Bean can only be derived for structs"));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(Error::new_spanned(&data.fields, "Bean requires named fields"));
    };

    let fields = named
        .named
        .iter()
        .map(BeanField::parse)
        .collect::<Result<Vec<_>>>()?;
    let (mapped, ignored): (Vec<_>, Vec<_>) = fields.iter().partition(|field| !field.ignore);

    let ident = &input.ident;
    let paths: Vec<_> = mapped.iter().map(|field| LitStr::new(&field.path, field.ident.span())).collect();
    let idents: Vec<_> = mapped.iter().map(|field| &field.ident).collect();
    let ignored: Vec<_> = ignored.iter().map(|field| &field.ident).collect();

    let properties = mapped.iter().zip(&paths).map(|(field, path)| {
        let ty = &field.ty;
        let identifier = field.id.then(|| quote! { .identifier() });
        let temporal = field
            .temporal
            .as_ref()
            .map(|variant| quote! { .temporal(::docmap::value::TemporalType::#variant) });

        quote! {
            ::docmap::property::Property::named(
                #path,
                <#ty as ::docmap::bean::BeanValue>::property_type(),
            ) #identifier #temporal
        }
    });

    Ok(quote! {
        impl ::docmap::bean::Bean for #ident {
            fn property_set() -> ::docmap::property::PropertySet {
                static PROPERTY_SET: ::std::sync::OnceLock<::docmap::property::PropertySet> =
                    ::std::sync::OnceLock::new();

                PROPERTY_SET
                    .get_or_init(|| ::docmap::property::PropertySet::new([#(#properties),*]))
                    .clone()
            }

            fn to_property_box(
                &self,
            ) -> ::docmap::error::DatastoreResult<::docmap::property::PropertyBox> {
                let mut builder = ::docmap::property::PropertyBox::builder(
                    <Self as ::docmap::bean::Bean>::property_set(),
                );
                #(
                    if let ::std::option::Option::Some(value) =
                        ::docmap::bean::BeanValue::to_value(&self.#idents)?
                    {
                        builder = builder.set(#paths, value);
                    }
                )*
                builder.build()
            }

            fn from_property_box(
                value: &::docmap::property::PropertyBox,
            ) -> ::docmap::error::DatastoreResult<Self> {
                ::std::result::Result::Ok(#ident {
                    #( #idents: ::docmap::bean::read_field(value, #paths)?, )*
                    #( #ignored: ::std::default::Default::default(), )*
                })
            }
        }

        impl ::docmap::bean::BeanValue for #ident {
            fn property_type() -> ::docmap::value::PropertyType {
                ::docmap::value::PropertyType::Embedded(<Self as ::docmap::bean::Bean>::property_set())
            }

            fn to_value(
                &self,
            ) -> ::docmap::error::DatastoreResult<::std::option::Option<::docmap::value::Value>> {
                ::docmap::bean::Bean::to_property_box(self)
                    .map(|value| ::std::option::Option::Some(::docmap::value::Value::PropertyBox(value)))
            }

            fn from_value(
                value: ::std::option::Option<&::docmap::value::Value>,
            ) -> ::docmap::error::DatastoreResult<Self> {
                match value {
                    ::std::option::Option::Some(::docmap::value::Value::PropertyBox(value)) => {
                        <Self as ::docmap::bean::Bean>::from_property_box(value)
                    }
                    other => ::std::result::Result::Err(::docmap::bean::mismatch::<Self>(other)),
                }
            }
        }
    })
}
