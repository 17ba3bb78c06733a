use crate::field_parser::{self, FieldDefs};
use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote};
use syn::ItemStruct;

mod lifecycle;
mod managed;
mod schema;

/// All generated pieces for one `#[derive(Object)]` struct: the schema
/// statics, the `Object` impl, the managed sibling struct with its lifecycle
/// surface, and the inventory registration.
pub struct ObjectMacros {
    pub struct_ident: Ident,
    pub schema_statics: TokenStream,
    pub object_impl: TokenStream,
    pub managed_struct: TokenStream,
    pub managed_impls: TokenStream,
    pub registration: TokenStream,
}

impl ObjectMacros {
    pub fn new(item: &ItemStruct) -> Result<ObjectMacros, syn::Error> {
        let struct_ident = item.ident.clone();
        let managed_ident = format_ident!("{}Managed", struct_ident);
        let vis = item.vis.clone();
        let kind = object_kind(item);

        let named = field_parser::get_named_fields(item)?;
        let defs: FieldDefs = field_parser::get_field_defs(&named)?;

        let schema_statics = schema::schema_statics(&struct_ident, &kind, &defs);
        let insert_fn = schema::insert_fn(&defs);
        let (managed_struct, bind_fn, capture_fn) = managed::managed_parts(&vis, &struct_ident, &managed_ident, &defs);
        let managed_impls = lifecycle::managed_impls(&struct_ident, &managed_ident, &defs);

        let schema_ident = schema::schema_ident(&struct_ident);

        let object_impl = quote! {
            impl Object for #struct_ident {
                const KIND: ObjectKind = #kind;
                type Managed = #managed_ident;

                fn schema() -> &'static ObjectSchema {
                    &#schema_ident
                }

                #insert_fn
                #bind_fn
                #capture_fn
            }
        };

        let registration = quote! {
            inventory::submit! {
                SchemaInfo { schema: <#struct_ident as Object>::schema }
            }
        };

        Ok(ObjectMacros {
            struct_ident,
            schema_statics,
            object_impl,
            managed_struct,
            managed_impls,
            registration,
        })
    }

    pub fn expand(&self) -> TokenStream {
        let ObjectMacros { schema_statics, object_impl, managed_struct, managed_impls, registration, .. } = self;
        quote! {
            #schema_statics
            #object_impl
            #managed_struct
            #managed_impls
            #registration
        }
    }
}

/// The table classifier, read from the marker the `#[object]` attribute left
/// behind. Plain `#[derive(Object)]` declares a top-level type.
fn object_kind(item: &ItemStruct) -> TokenStream {
    for attr in &item.attrs {
        if attr.path().is_ident("object_kind") {
            let mut kind = quote! { ObjectKind::TopLevel };
            let _ = attr.parse_nested_meta(|nested| {
                if nested.path.is_ident("embedded") {
                    kind = quote! { ObjectKind::Embedded };
                } else if nested.path.is_ident("asymmetric") {
                    kind = quote! { ObjectKind::Asymmetric };
                }
                Ok(())
            });
            return kind;
        }
    }
    quote! { ObjectKind::TopLevel }
}
