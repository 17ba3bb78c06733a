use proc_macro2::Ident;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::token::Comma;
use syn::{Fields, GenericArgument, ItemStruct, PathArguments, Type};

/// How a declared field maps onto a stored property. Unknown type names are
/// taken as user types: bare for enum values, `Option<T>` for links,
/// `Vec<T>` for object lists.
#[derive(Clone)]
pub enum FieldKind {
    Pk,
    Scalar,
    Link { target: Ident },
    List { elem: Type },
    ObjectList { target: Ident },
    Set { elem: Type },
    Map { elem: Type },
}

#[derive(Clone)]
pub struct FieldDef {
    pub name: Ident,
    pub tpe: Type,
    pub kind: FieldKind,
}

pub struct FieldDefs {
    pub fields: Vec<FieldDef>,
}

const SCALAR_IDENTS: &[&str] =
    &["i64", "bool", "f64", "String", "Datetime", "Uuid", "ObjectId", "Decimal128"];

const PK_IDENTS: &[&str] = &["i64", "String", "Uuid", "ObjectId"];

pub fn get_named_fields(ast: &ItemStruct) -> Result<Punctuated<syn::Field, Comma>, syn::Error> {
    match &ast.fields {
        Fields::Named(named) => Ok(named.named.clone()),
        _ => Err(syn::Error::new(ast.span(), "`#[derive(Object)]` only supports structs with named fields.")),
    }
}

fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    match ty {
        Type::Path(tp) => tp.path.segments.last(),
        _ => None,
    }
}

fn type_ident(ty: &Type) -> Option<String> {
    last_segment(ty).filter(|seg| seg.arguments.is_empty()).map(|seg| seg.ident.to_string())
}

fn generic_args(ty: &Type) -> Vec<&Type> {
    match last_segment(ty) {
        Some(seg) => match &seg.arguments {
            PathArguments::AngleBracketed(args) => args
                .args
                .iter()
                .filter_map(|arg| match arg {
                    GenericArgument::Type(inner) => Some(inner),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        },
        None => Vec::new(),
    }
}

fn is_scalar(ty: &Type) -> bool {
    if let Some(ident) = type_ident(ty) {
        return SCALAR_IDENTS.contains(&ident.as_str());
    }
    // Vec<u8> is the binary scalar.
    is_vec_u8(ty)
}

fn is_vec_u8(ty: &Type) -> bool {
    last_segment(ty).is_some_and(|seg| seg.ident == "Vec")
        && generic_args(ty).first().and_then(|inner| type_ident(inner)).as_deref() == Some("u8")
}

fn bare_ident(ty: &Type) -> Result<Ident, syn::Error> {
    match last_segment(ty) {
        Some(seg) if seg.arguments.is_empty() => Ok(seg.ident.clone()),
        _ => Err(syn::Error::new(ty.span(), "Expected a plain type name")),
    }
}

fn parse_object_field(field: &syn::Field) -> Result<FieldDef, syn::Error> {
    let name = match &field.ident {
        Some(name) => name.clone(),
        None => return Err(syn::Error::new(field.span(), "Unnamed fields not supported")),
    };
    let tpe = field.ty.clone();

    if field.attrs.iter().any(|attr| attr.path().is_ident("pk")) {
        let valid = type_ident(&tpe).map(|ident| PK_IDENTS.contains(&ident.as_str())).unwrap_or(false);
        if !valid {
            return Err(syn::Error::new(
                field.ty.span(),
                "`#[pk]` supports i64, String, Uuid or ObjectId",
            ));
        }
        return Ok(FieldDef { name, tpe, kind: FieldKind::Pk });
    }

    let seg = match last_segment(&tpe) {
        Some(seg) => seg,
        None => return Err(syn::Error::new(field.ty.span(), "Unsupported field type")),
    };

    let kind = match seg.ident.to_string().as_str() {
        "Option" => {
            let inner = generic_args(&tpe)
                .first()
                .copied()
                .ok_or_else(|| syn::Error::new(field.ty.span(), "`Option` needs a type argument"))?
                .clone();
            if is_scalar(&inner) {
                FieldKind::Scalar
            } else {
                FieldKind::Link { target: bare_ident(&inner)? }
            }
        }
        "Vec" if !is_vec_u8(&tpe) => {
            let inner = generic_args(&tpe)
                .first()
                .copied()
                .ok_or_else(|| syn::Error::new(field.ty.span(), "`Vec` needs a type argument"))?
                .clone();
            if is_scalar(&inner) {
                FieldKind::List { elem: inner }
            } else {
                FieldKind::ObjectList { target: bare_ident(&inner)? }
            }
        }
        "BTreeSet" => {
            let inner = generic_args(&tpe)
                .first()
                .copied()
                .ok_or_else(|| syn::Error::new(field.ty.span(), "`BTreeSet` needs a type argument"))?
                .clone();
            if !is_scalar(&inner) {
                return Err(syn::Error::new(field.ty.span(), "Set elements must be scalar values"));
            }
            FieldKind::Set { elem: inner }
        }
        "BTreeMap" => {
            let args = generic_args(&tpe);
            let key_is_string =
                args.first().and_then(|k| type_ident(k)).as_deref() == Some("String");
            if !key_is_string {
                return Err(syn::Error::new(field.ty.span(), "Dictionary keys must be `String`"));
            }
            let inner = args
                .get(1)
                .copied()
                .ok_or_else(|| syn::Error::new(field.ty.span(), "`BTreeMap` needs a value type"))?
                .clone();
            if !is_scalar(&inner) {
                return Err(syn::Error::new(field.ty.span(), "Dictionary values must be scalar values"));
            }
            FieldKind::Map { elem: inner }
        }
        "HashSet" | "HashMap" => {
            return Err(syn::Error::new(
                field.ty.span(),
                "Use `BTreeSet`/`BTreeMap`; detached collections come back in element/key order",
            ));
        }
        _ => FieldKind::Scalar,
    };

    Ok(FieldDef { name, tpe, kind })
}

pub fn get_field_defs(fields: &Punctuated<syn::Field, Comma>) -> Result<FieldDefs, syn::Error> {
    let mut defs: Vec<FieldDef> = Vec::new();
    let mut pk_found = false;

    for field in fields.iter() {
        let def = parse_object_field(field)?;
        if matches!(def.kind, FieldKind::Pk) {
            if pk_found {
                return Err(syn::Error::new(def.name.span(), "Multiple `#[pk]` fields found; only one is allowed"));
            }
            pk_found = true;
        }
        defs.push(def);
    }

    Ok(FieldDefs { fields: defs })
}
