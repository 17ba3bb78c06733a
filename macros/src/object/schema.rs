use crate::field_parser::{FieldDefs, FieldKind};
use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote};

pub fn properties_ident(struct_ident: &Ident) -> Ident {
    format_ident!("{}_PROPERTIES", struct_ident.to_string().to_uppercase())
}

pub fn schema_ident(struct_ident: &Ident) -> Ident {
    format_ident!("{}_SCHEMA", struct_ident.to_string().to_uppercase())
}

/// The `static` property table and schema descriptor. Scalar kinds and
/// nullability come off the `PropertyValue` impl of the declared type, so the
/// descriptor stays in lockstep with the accessors.
pub fn schema_statics(struct_ident: &Ident, kind: &TokenStream, defs: &FieldDefs) -> TokenStream {
    let properties_ident = properties_ident(struct_ident);
    let schema_ident = schema_ident(struct_ident);
    let count = defs.fields.len();

    let properties = defs.fields.iter().map(|def| {
        let name = &def.name;
        let tpe = &def.tpe;
        match &def.kind {
            FieldKind::Pk => quote! {
                Property {
                    name: stringify!(#name),
                    kind: <#tpe as PropertyValue>::KIND,
                    nullable: false,
                    primary_key: true,
                }
            },
            FieldKind::Scalar => quote! {
                Property {
                    name: stringify!(#name),
                    kind: <#tpe as PropertyValue>::KIND,
                    nullable: <#tpe as PropertyValue>::NULLABLE,
                    primary_key: false,
                }
            },
            FieldKind::Link { target } => quote! {
                Property {
                    name: stringify!(#name),
                    kind: PropertyKind::Object { target: stringify!(#target) },
                    nullable: true,
                    primary_key: false,
                }
            },
            FieldKind::List { elem } => quote! {
                Property {
                    name: stringify!(#name),
                    kind: PropertyKind::List(&<#elem as PropertyValue>::KIND),
                    nullable: false,
                    primary_key: false,
                }
            },
            FieldKind::ObjectList { target } => quote! {
                Property {
                    name: stringify!(#name),
                    kind: PropertyKind::List(&PropertyKind::Object { target: stringify!(#target) }),
                    nullable: false,
                    primary_key: false,
                }
            },
            FieldKind::Set { elem } => quote! {
                Property {
                    name: stringify!(#name),
                    kind: PropertyKind::Set(&<#elem as PropertyValue>::KIND),
                    nullable: false,
                    primary_key: false,
                }
            },
            FieldKind::Map { elem } => quote! {
                Property {
                    name: stringify!(#name),
                    kind: PropertyKind::Dictionary(&<#elem as PropertyValue>::KIND),
                    nullable: false,
                    primary_key: false,
                }
            },
        }
    });

    quote! {
        static #properties_ident: [Property; #count] = [
            #(#properties),*
        ];
        static #schema_ident: ObjectSchema = ObjectSchema {
            name: stringify!(#struct_ident),
            kind: #kind,
            properties: &#properties_ident,
        };
    }
}

/// `Object::insert`: persists the object graph bottom-up, children first, and
/// writes the row in declaration order.
pub fn insert_fn(defs: &FieldDefs) -> TokenStream {
    let count = defs.fields.len();
    let statements = defs.fields.iter().map(|def| {
        let name = &def.name;
        match &def.kind {
            FieldKind::Pk | FieldKind::Scalar => quote! {
                row.push(self.#name.to_value());
            },
            FieldKind::Link { .. } => quote! {
                row.push(match self.#name {
                    Some(child) => {
                        let child_obj = child.insert(realm)?;
                        Value::Link { table: child_obj.get_table().name.to_string(), key: child_obj.get_key() }
                    }
                    None => Value::Null,
                });
            },
            FieldKind::List { .. } => quote! {
                row.push(Value::List(self.#name.iter().map(|item| item.to_value()).collect()));
            },
            FieldKind::ObjectList { .. } => quote! {
                row.push(Value::List({
                    let mut links = Vec::new();
                    for child in self.#name {
                        let child_obj = child.insert(realm)?;
                        links.push(Value::Link { table: child_obj.get_table().name.to_string(), key: child_obj.get_key() });
                    }
                    links
                }));
            },
            FieldKind::Set { .. } => quote! {
                row.push(Value::Set({
                    let mut items: Vec<Value> = self.#name.iter().map(|item| item.to_value()).collect();
                    items.sort_by(|a, b| a.compare(b).unwrap_or(std::cmp::Ordering::Equal));
                    items
                }));
            },
            FieldKind::Map { .. } => quote! {
                row.push(Value::Dictionary(self.#name.into_iter().map(|(key, item)| (key, item.to_value())).collect()));
            },
        }
    });

    quote! {
        fn insert(self, realm: &Realm) -> Result<Obj, DbError> {
            let mut row: Row = Vec::with_capacity(#count);
            #(#statements)*
            realm.create_row(Self::schema(), row)
        }
    }
}
