use crate::field_parser::{FieldDefs, FieldKind};
use proc_macro2::{Ident, TokenStream};
use quote::quote;

/// Lifecycle surface of the managed wrapper: detach, freeze/thaw, validity,
/// observation, identity equality and the JSON `Display`.
pub fn managed_impls(struct_ident: &Ident, managed_ident: &Ident, defs: &FieldDefs) -> TokenStream {
    let detach_inits = defs.fields.iter().map(|def| {
        let name = &def.name;
        match &def.kind {
            FieldKind::Pk | FieldKind::Scalar => quote! { #name: self.#name.get()? },
            FieldKind::Link { .. } => quote! {
                #name: match self.#name.get()? {
                    Some(child) => Some(child.detach()?),
                    None => None,
                }
            },
            FieldKind::List { .. } | FieldKind::Set { .. } | FieldKind::Map { .. } => {
                quote! { #name: self.#name.detach()? }
            }
            FieldKind::ObjectList { .. } => quote! {
                #name: {
                    let mut children = Vec::new();
                    for child in self.#name.iter()? {
                        children.push(child.detach()?);
                    }
                    children
                }
            },
        }
    });

    quote! {
        impl #managed_ident {
            fn handle(&self) -> Result<&Obj, DbError> {
                self.object.as_ref().ok_or(DbError::QueryMisuse("Cannot use a `where` proxy as a managed object"))
            }

            /// Reads every property back into a plain, unmanaged value.
            pub fn detach(&self) -> Result<#struct_ident, DbError> {
                Ok(#struct_ident {
                    #(#detach_inits,)*
                })
            }

            /// This object pinned to an immutable snapshot of its session.
            pub fn freeze(&self) -> Result<#managed_ident, DbError> {
                Ok(<#struct_ident as Object>::bind(self.handle()?.freeze_handle()?))
            }

            /// Back to the live session; the row must still exist.
            pub fn thaw(&self) -> Result<#managed_ident, DbError> {
                Ok(<#struct_ident as Object>::bind(self.handle()?.thaw_handle()?))
            }

            pub fn is_invalidated(&self) -> bool {
                self.object.as_ref().map(|obj| !obj.is_valid()).unwrap_or(true)
            }

            pub fn is_frozen(&self) -> bool {
                self.object.as_ref().map(|obj| obj.realm().is_frozen()).unwrap_or(false)
            }

            pub fn get_realm(&self) -> Result<Realm, DbError> {
                Ok(self.handle()?.realm().clone())
            }

            /// Subscribes to named property changes and deletion of this
            /// object, delivered after each committed write.
            pub fn observe(&self, cb: impl FnMut(ObjectChange) + Send + 'static) -> Result<NotificationToken, DbError> {
                self.handle()?.observe(cb)
            }
        }

        impl ManagedObject for #managed_ident {
            type Plain = #struct_ident;

            fn object_handle(&self) -> Option<&Obj> {
                self.object.as_ref()
            }
        }

        impl PartialEq for #managed_ident {
            fn eq(&self, other: &Self) -> bool {
                managed_objects_equal(self.object.as_ref(), other.object.as_ref())
            }
        }

        impl std::fmt::Display for #managed_ident {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.object.as_ref().map(|obj| obj.to_json()) {
                    Some(Ok(json)) => write!(f, "{}", json),
                    Some(Err(_)) => write!(f, "<invalidated {}>", stringify!(#struct_ident)),
                    None => write!(f, "<{} query proxy>", stringify!(#struct_ident)),
                }
            }
        }
    }
}
