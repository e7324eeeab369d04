//! # Ferrule Macros
//!
//! `#[derive(Record)]` builds the static field-to-column map of a record
//! type: table name, identity columns, mapped columns and the typed
//! read/write accessors used by `ferrule_core::ActiveRecord`.
//!
//! ```ignore
//! #[derive(Debug, Default, Record)]
//! #[record(table = "customers")]
//! struct Customer {
//!     full_name: String,
//!     age: i64,
//!     tags: Vec<String>,
//!     #[record(skip)]
//!     greeting: String,
//!     state: RecordState,
//! }
//! ```
//!
//! Type options (`#[record(...)]` on the struct):
//!
//! - `table = "name"` (required)
//! - `key(col = "integer", other = "string")` identity columns; defaults to
//!   a store-assigned integer `id`
//! - `auto_increment = "col"` / `no_auto_increment`
//! - `custom_hooks` to write `impl Lifecycle` by hand
//!
//! Field options: `skip`, `state`, `column = "name"`. A field whose type is
//! `RecordState` is picked up as the state field without annotation.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::spanned::Spanned;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Ident, LitStr, Type};

/// Derive `ferrule_core::Record` (and an empty `Lifecycle` unless
/// `custom_hooks` is given)
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_record(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct RecordOptions {
    table: Option<String>,
    key: Option<Vec<(String, KeyKind)>>,
    auto_increment: Option<String>,
    no_auto_increment: bool,
    custom_hooks: bool,
}

#[derive(Clone, Copy)]
enum KeyKind {
    Integer,
    String,
}

#[derive(Default)]
struct FieldOptions {
    skip: bool,
    state: bool,
    column: Option<String>,
}

fn expand_record(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let options = parse_record_options(&input.attrs)?;
    let table = options.table.clone().ok_or_else(|| {
        syn::Error::new(name.span(), "missing #[record(table = \"...\")]")
    })?;

    let Data::Struct(data) = input.data else {
        return Err(syn::Error::new(
            name.span(),
            "Record can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = data.fields else {
        return Err(syn::Error::new(name.span(), "Record requires named fields"));
    };

    let mut state_field: Option<Ident> = None;
    let mut mapped: Vec<(Ident, String)> = Vec::new();

    for field in fields.named {
        let span = field.span();
        let ident = field
            .ident
            .ok_or_else(|| syn::Error::new(span, "Record requires named fields"))?;
        let field_options = parse_field_options(&field.attrs)?;

        if field_options.state || is_record_state(&field.ty) {
            if state_field.is_some() {
                return Err(syn::Error::new(span, "duplicate RecordState field"));
            }
            state_field = Some(ident);
            continue;
        }
        if field_options.skip {
            continue;
        }

        let column = field_options
            .column
            .unwrap_or_else(|| ident.to_string());
        if mapped.iter().any(|(_, c)| *c == column) {
            return Err(syn::Error::new(span, format!("column `{column}` mapped twice")));
        }
        mapped.push((ident, column));
    }

    let state_field = state_field.ok_or_else(|| {
        syn::Error::new(
            name.span(),
            "Record requires a `RecordState` field (or #[record(state)])",
        )
    })?;

    let columns = mapped.iter().map(|(_, c)| c);
    let read_arms = mapped.iter().map(|(ident, column)| {
        quote! {
            #column => ::ferrule_core::ColumnValue::to_db(&self.#ident).map(::core::option::Option::Some),
        }
    });
    let write_arms = mapped.iter().map(|(ident, column)| {
        quote! {
            #column => self.#ident = ::ferrule_core::ColumnValue::from_db(column, value)?,
        }
    });

    let key_fn = options.key.as_ref().map(|key| {
        let entries = key.iter().map(|(column, kind)| {
            let kind = match kind {
                KeyKind::Integer => quote!(::ferrule_core::KeyType::Integer),
                KeyKind::String => quote!(::ferrule_core::KeyType::String),
            };
            quote!((#column, #kind))
        });
        quote! {
            fn primary_key_columns() -> &'static [(&'static str, ::ferrule_core::KeyType)] {
                &[#(#entries),*]
            }
        }
    });

    let auto_increment_fn = auto_increment_tokens(&options);

    let lifecycle = if options.custom_hooks {
        quote!()
    } else {
        quote!(impl ::ferrule_core::Lifecycle for #name {})
    };

    Ok(quote! {
        impl ::ferrule_core::Record for #name {
            fn table_name() -> &'static str {
                #table
            }

            #key_fn
            #auto_increment_fn

            fn columns() -> &'static [&'static str] {
                &[#(#columns),*]
            }

            fn read_column(
                &self,
                column: &str,
            ) -> ::ferrule_core::Result<::core::option::Option<::ferrule_core::DbValue>> {
                match column {
                    #(#read_arms)*
                    _ => ::core::result::Result::Ok(::core::option::Option::None),
                }
            }

            #[allow(unused_variables)]
            fn write_column(
                &mut self,
                column: &str,
                value: ::ferrule_core::DbValue,
            ) -> ::ferrule_core::Result<()> {
                match column {
                    #(#write_arms)*
                    _ => {}
                }
                ::core::result::Result::Ok(())
            }

            fn state(&self) -> &::ferrule_core::RecordState {
                &self.#state_field
            }

            fn state_mut(&mut self) -> &mut ::ferrule_core::RecordState {
                &mut self.#state_field
            }
        }

        #lifecycle
    })
}

fn auto_increment_tokens(options: &RecordOptions) -> TokenStream2 {
    if options.no_auto_increment {
        return quote! {
            fn auto_increment() -> ::core::option::Option<&'static str> {
                ::core::option::Option::None
            }
        };
    }
    match (&options.auto_increment, &options.key) {
        (Some(column), _) => quote! {
            fn auto_increment() -> ::core::option::Option<&'static str> {
                ::core::option::Option::Some(#column)
            }
        },
        // an explicit key is natural unless stated otherwise
        (None, Some(_)) => quote! {
            fn auto_increment() -> ::core::option::Option<&'static str> {
                ::core::option::Option::None
            }
        },
        (None, None) => quote!(),
    }
}

fn is_record_state(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "RecordState"),
        _ => false,
    }
}

fn parse_record_options(attrs: &[syn::Attribute]) -> syn::Result<RecordOptions> {
    let mut options = RecordOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let lit: LitStr = meta.value()?.parse()?;
                options.table = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("key") {
                let mut key = Vec::new();
                meta.parse_nested_meta(|inner| {
                    let column = inner
                        .path
                        .get_ident()
                        .map(ToString::to_string)
                        .ok_or_else(|| inner.error("expected a column name"))?;
                    let lit: LitStr = inner.value()?.parse()?;
                    let kind = match lit.value().as_str() {
                        "integer" | "int" => KeyKind::Integer,
                        "string" => KeyKind::String,
                        other => {
                            return Err(syn::Error::new(
                                lit.span(),
                                format!("unknown key type `{other}`, expected \"integer\" or \"string\""),
                            ))
                        }
                    };
                    key.push((column, kind));
                    Ok(())
                })?;
                if key.is_empty() {
                    return Err(meta.error("key(...) needs at least one column"));
                }
                options.key = Some(key);
                return Ok(());
            }

            if meta.path.is_ident("auto_increment") {
                let lit: LitStr = meta.value()?.parse()?;
                options.auto_increment = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("no_auto_increment") {
                options.no_auto_increment = true;
                return Ok(());
            }

            if meta.path.is_ident("custom_hooks") {
                options.custom_hooks = true;
                return Ok(());
            }

            Err(meta.error(
                "unsupported #[record(...)] option; supported: table, key(...), auto_increment, no_auto_increment, custom_hooks",
            ))
        })?;
    }

    if options.no_auto_increment && options.auto_increment.is_some() {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "auto_increment and no_auto_increment are mutually exclusive",
        ));
    }

    Ok(options)
}

fn parse_field_options(attrs: &[syn::Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                options.skip = true;
                return Ok(());
            }

            if meta.path.is_ident("state") {
                options.state = true;
                return Ok(());
            }

            if meta.path.is_ident("column") {
                let lit: LitStr = meta.value()?.parse()?;
                options.column = Some(lit.value());
                return Ok(());
            }

            Err(meta.error("unsupported field option; supported: skip, state, column = \"...\""))
        })?;

        if options.skip && options.column.is_some() {
            return Err(syn::Error::new(
                attr.span(),
                "#[record(skip)] cannot define a column name",
            ));
        }
    }

    Ok(options)
}
