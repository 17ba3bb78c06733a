use crate::field_parser::{FieldDefs, FieldKind};
use proc_macro2::{Ident, TokenStream};
use quote::quote;
use syn::Visibility;

/// The managed sibling struct plus the two `Object` constructors that
/// populate it: `bind` for a persisted row, `prepare_for_query` for the
/// capture proxy. Column keys are resolved here once, from field ordinals.
pub fn managed_parts(
    vis: &Visibility,
    struct_ident: &Ident,
    managed_ident: &Ident,
    defs: &FieldDefs,
) -> (TokenStream, TokenStream, TokenStream) {
    let field_decls = defs.fields.iter().map(|def| {
        let name = &def.name;
        let tpe = &def.tpe;
        match &def.kind {
            FieldKind::Pk => quote! { pub #name: PersistedKey<#tpe> },
            FieldKind::Scalar => quote! { pub #name: Persisted<#tpe> },
            FieldKind::Link { target } => quote! { pub #name: PersistedLink<#target> },
            FieldKind::List { elem } => quote! { pub #name: PersistedList<#elem> },
            FieldKind::ObjectList { target } => quote! { pub #name: PersistedObjectList<#target> },
            FieldKind::Set { elem } => quote! { pub #name: PersistedSet<#elem> },
            FieldKind::Map { elem } => quote! { pub #name: PersistedMap<#elem> },
        }
    });

    let doc = format!("Managed counterpart of [`{}`]: accessors read and write the store directly.", struct_ident);
    let managed_struct = quote! {
        #[doc = #doc]
        #[derive(Clone, Debug)]
        #vis struct #managed_ident {
            #(#field_decls,)*
            object: Option<Obj>,
        }
    };

    let bind_inits = defs.fields.iter().enumerate().map(|(ordinal, def)| {
        let name = &def.name;
        let ordinal = ordinal as u16;
        let col = quote! { ColKey::from_ordinal(#ordinal) };
        match &def.kind {
            FieldKind::Pk => quote! { #name: PersistedKey::bound(obj.clone(), #col) },
            FieldKind::Scalar => quote! { #name: Persisted::Managed { obj: obj.clone(), col: #col } },
            FieldKind::Link { .. } => quote! { #name: PersistedLink::Managed { obj: obj.clone(), col: #col } },
            FieldKind::List { .. } => quote! { #name: PersistedList::Managed { obj: obj.clone(), col: #col } },
            FieldKind::ObjectList { .. } => {
                quote! { #name: PersistedObjectList::Managed { obj: obj.clone(), col: #col } }
            }
            FieldKind::Set { .. } => quote! { #name: PersistedSet::Managed { obj: obj.clone(), col: #col } },
            FieldKind::Map { .. } => quote! { #name: PersistedMap::Managed { obj: obj.clone(), col: #col } },
        }
    });

    let bind_fn = quote! {
        fn bind(obj: Obj) -> #managed_ident {
            #managed_ident {
                #(#bind_inits,)*
                object: Some(obj),
            }
        }
    };

    let capture_inits = defs.fields.iter().enumerate().map(|(ordinal, def)| {
        let name = &def.name;
        let ordinal = ordinal as u16;
        let col = quote! { ColKey::from_ordinal(#ordinal) };
        match &def.kind {
            FieldKind::Pk => quote! { #name: PersistedKey::capture(#col) },
            FieldKind::Scalar => quote! { #name: Persisted::capture(#col) },
            FieldKind::Link { .. } => quote! { #name: PersistedLink::capture(#col) },
            FieldKind::List { .. } => quote! { #name: PersistedList::capture(#col) },
            FieldKind::ObjectList { .. } => quote! { #name: PersistedObjectList::capture(#col) },
            FieldKind::Set { .. } => quote! { #name: PersistedSet::capture(#col) },
            FieldKind::Map { .. } => quote! { #name: PersistedMap::capture(#col) },
        }
    });

    let capture_fn = quote! {
        fn prepare_for_query() -> #managed_ident {
            #managed_ident {
                #(#capture_inits,)*
                object: None,
            }
        }
    };

    (managed_struct, bind_fn, capture_fn)
}
