use proc_macro::TokenStream;
use proc_macro2::Ident;
use quote::quote;
use std::env;
use std::path::PathBuf;
use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::{Attribute, ItemStruct, Path};

fn derive_paths(attr: &Attribute) -> syn::Result<Vec<Path>> {
    let mut paths = Vec::new();
    attr.parse_nested_meta(|meta| match meta.path.get_ident() {
        Some(ident) => {
            paths.push(Path::from(ident.clone()));
            Ok(())
        }
        None => Err(meta.error("Expected identifier in derive")),
    })?;
    Ok(paths)
}

/// Folds any `#[derive(..)]` attributes the user wrote together with
/// `extra_derives` into a single deduplicated derive attribute.
pub fn merge_struct_derives(input: &mut ItemStruct, extra_derives: Punctuated<Path, Comma>) {
    let mut merged: Vec<Path> = extra_derives.into_iter().collect();
    input.attrs.retain(|attr| {
        if !attr.path().is_ident("derive") {
            return true;
        }
        match derive_paths(attr) {
            Ok(paths) => {
                merged.extend(paths);
                false
            }
            Err(e) => {
                eprintln!("Error parsing derive attribute: {}", e);
                true
            }
        }
    });

    merged.sort_by_key(|path| quote!(#path).to_string());
    merged.dedup_by_key(|path| quote!(#path).to_string());

    input.attrs.push(syn::parse_quote! {
        #[derive(#(#merged),*)]
    });
}

fn dump_dir(dir_name: &str) -> Option<PathBuf> {
    let dir = env::current_dir().ok()?.join("target").join("macros").join(dir_name);
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Pretty-prints the expansion under `target/macros/` for inspection, then
/// hands the stream back to the compiler.
pub fn submit_struct_to_stream(stream: proc_macro2::TokenStream, dir: &str, struct_ident: &Ident, suffix: &str) -> TokenStream {
    let rendered = match syn::parse2::<syn::File>(stream.clone()) {
        Ok(ast) => prettyplease::unparse(&ast),
        Err(_) => stream.to_string(),
    };

    #[cfg(not(test))]
    if let Some(dir) = dump_dir(dir) {
        let path = dir.join(format!("{}{}", struct_ident, suffix));
        if let Err(e) = std::fs::write(&path, rendered.as_bytes()) {
            eprintln!("Failed to write to {:?}: {}", path, e);
        }
    }
    #[cfg(test)]
    let _ = (dir, struct_ident, suffix, rendered);

    stream.into()
}
