//! Derive macros for wiring a datastore context.
//!
//! - `#[derive(Context)]` marks a struct as an injection root: every field
//!   not tagged `#[context(skip)]` becomes extractable through `FromRef`.
//! - `#[derive(FromContext)]` builds a component from a root by resolving
//!   each of its fields through `FromRef`.
//!
//! Generated code refers to `crate::FromRef`, so the trait must be reachable
//! at the root of the consuming crate.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Field, Fields, Type};

/// Derives `FromRef<Self>` for the type of every non-skipped field.
///
/// ```ignore
/// #[derive(Context, Clone)]
/// pub struct DatastoreContext {
///     pub dialect: Arc<dyn GridDialect>,
///     pub error_handler: Arc<dyn ErrorHandler>,
///     #[context(skip)]
///     pub label: String,
/// }
/// ```
#[proc_macro_derive(Context, attributes(context))]
pub fn derive_context(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_context(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derives `FromRef<Root>` for a component whose fields all resolve from `Root`.
///
/// The root defaults to `Context`; override it with
/// `#[from_context(Context = "DatastoreContext")]`.
#[proc_macro_derive(FromContext, attributes(from_context))]
pub fn derive_from_context(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_from_context(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_context(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let root = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut impls = Vec::new();
    for field in named_fields(input, "Context")? {
        if is_skipped(&field.attrs)? {
            continue;
        }
        let ident = field_ident(field)?;
        let ty = &field.ty;
        impls.push(quote! {
            impl #impl_generics crate::FromRef<#root #ty_generics> for #ty #where_clause {
                fn from_ref(root: &#root #ty_generics) -> Self {
                    ::core::clone::Clone::clone(&root.#ident)
                }
            }
        });
    }

    Ok(quote! { #(#impls)* })
}

fn expand_from_context(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let root = root_type(&input.attrs)?;

    let inits = named_fields(input, "FromContext")?
        .iter()
        .map(|field| {
            let ident = field_ident(field)?;
            let ty = &field.ty;
            Ok(quote! { #ident: <#ty as crate::FromRef<#root>>::from_ref(root) })
        })
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics crate::FromRef<#root> for #name #ty_generics #where_clause {
            fn from_ref(root: &#root) -> Self {
                Self { #(#inits),* }
            }
        }
    })
}

fn named_fields<'a>(
    input: &'a DeriveInput,
    derive: &str,
) -> syn::Result<&'a Punctuated<Field, Comma>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(&fields.named),
            _ => Err(syn::Error::new_spanned(
                input,
                format!("{derive} requires a struct with named fields"),
            )),
        },
        _ => Err(syn::Error::new_spanned(
            input,
            format!("{derive} can only be derived for structs"),
        )),
    }
}

fn field_ident(field: &Field) -> syn::Result<&syn::Ident> {
    field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))
}

fn is_skipped(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut skip = false;
    for attr in attrs.iter().filter(|a| a.path().is_ident("context")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = true;
                Ok(())
            } else {
                Err(meta.error("unsupported context attribute, expected `skip`"))
            }
        })?;
    }
    Ok(skip)
}

fn root_type(attrs: &[Attribute]) -> syn::Result<TokenStream2> {
    let mut root: Option<Type> = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("from_context")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("Context") {
                let value: syn::LitStr = meta.value()?.parse()?;
                root = Some(value.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported from_context attribute, expected `Context`"))
            }
        })?;
    }

    Ok(match root {
        Some(ty) => quote! { #ty },
        None => quote! { Context },
    })
}
