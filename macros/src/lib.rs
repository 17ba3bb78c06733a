extern crate proc_macro;
mod field_parser;
mod macro_utils;
mod object;

use proc_macro::TokenStream;
use proc_macro_error::proc_macro_error;
use quote::quote;
use syn::parse::Parse;
use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::{parse_macro_input, parse_quote, Data, DeriveInput, Fields, ItemStruct, Path};

/// Marks a struct as a persistable object type. Optional classifier:
/// `#[object(embedded)]` for types owned by a parent object,
/// `#[object(asymmetric)]` for add-only types that cannot be queried.
#[proc_macro_attribute]
#[proc_macro_error]
pub fn object(attr: TokenStream, item: TokenStream) -> TokenStream {
    let attr_args = parse_macro_input!(attr as KindAttr);
    let mut input = parse_macro_input!(item as ItemStruct);
    let struct_ident = &input.ident.clone();

    let derives: Punctuated<Path, Comma> =
        syn::parse_quote![Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object];
    macro_utils::merge_struct_derives(&mut input, derives);
    if let Some(kind) = attr_args.kind {
        let marker: syn::Attribute = match kind.as_str() {
            "embedded" => parse_quote! { #[object_kind(embedded)] },
            "asymmetric" => parse_quote! { #[object_kind(asymmetric)] },
            other => {
                return syn::Error::new(
                    proc_macro2::Span::call_site(),
                    format!("Unknown object classifier `{}`; expected `embedded` or `asymmetric`", other),
                )
                .to_compile_error()
                .into()
            }
        };
        input.attrs.push(marker);
    }

    let stream = quote! {
        #input
    };
    macro_utils::submit_struct_to_stream(stream, "object", struct_ident, "_attr.rs")
}

struct KindAttr {
    kind: Option<String>,
}

impl Parse for KindAttr {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        if input.is_empty() {
            Ok(KindAttr { kind: None })
        } else {
            let ident: syn::Ident = input.parse()?;
            Ok(KindAttr { kind: Some(ident.to_string()) })
        }
    }
}

/// Derives the schema descriptor, the `Object` impl, the managed sibling
/// struct and the process-wide schema registration for a plain struct.
#[proc_macro_derive(Object, attributes(pk, object_kind))]
#[proc_macro_error]
pub fn derive_object(input: TokenStream) -> TokenStream {
    let item_struct = parse_macro_input!(input as ItemStruct);
    let struct_ident = item_struct.ident.clone();
    let macros = match object::ObjectMacros::new(&item_struct) {
        Ok(macros) => macros,
        Err(e) => return e.to_compile_error().into(),
    };
    let stream = macros.expand();
    macro_utils::submit_struct_to_stream(stream, "object", &struct_ident, "_derive.rs")
}

/// Implements `PropertyValue` for a fieldless `Copy` enum through its `i64`
/// discriminant, making it usable as a stored scalar.
#[proc_macro_derive(EnumValue)]
#[proc_macro_error]
pub fn derive_enum_value(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    let enum_ident = &ast.ident;

    let variants = match &ast.data {
        Data::Enum(data) => &data.variants,
        _ => {
            return syn::Error::new_spanned(&ast.ident, "`#[derive(EnumValue)]` only supports enums")
                .to_compile_error()
                .into()
        }
    };
    for variant in variants {
        if !matches!(variant.fields, Fields::Unit) {
            return syn::Error::new_spanned(&variant.ident, "`#[derive(EnumValue)]` only supports fieldless variants")
                .to_compile_error()
                .into();
        }
    }

    let variant_idents: Vec<&syn::Ident> = variants.iter().map(|v| &v.ident).collect();
    let stream = quote! {
        impl PropertyValue for #enum_ident {
            const KIND: PropertyKind = PropertyKind::Int;

            fn to_value(&self) -> Value {
                Value::Int(*self as i64)
            }

            fn from_value(value: Value) -> Result<Self, DbError> {
                match value {
                    #(Value::Int(discriminant) if discriminant == #enum_ident::#variant_idents as i64 => {
                        Ok(#enum_ident::#variant_idents)
                    })*
                    other => Err(DbError::SchemaMismatch(
                        format!("no {} variant for {:?}", stringify!(#enum_ident), other),
                    )),
                }
            }
        }
    };
    macro_utils::submit_struct_to_stream(stream, "enum_value", enum_ident, "_derive.rs")
}
