//! Derive support for `mcp_session::ToolArgumentsDescriptor`.
//!
//! `#[derive(ToolArguments)]` turns a struct with named fields into a JSON
//! object schema that a session advertises as a tool's `inputSchema`.
//! Field behaviour is tuned with `#[tool_arg(...)]`:
//!
//! * `desc = "..."` adds a `description`
//! * `rename = "..."` changes the property name (keep it in sync with serde)
//! * `skip` leaves the field out of the schema
//! * `required = true|false` overrides the `Option<T>` based default
//! * `one_of = ["a", "b"]` restricts a string property to fixed values

extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{
    bracketed, parse_macro_input, Data, DeriveInput, Field, Fields, GenericArgument, Ident,
    LitBool, LitStr, Meta, PathArguments, Result as SynResult, Token, Type,
};

#[derive(Default, Debug)]
struct FieldOptions {
    desc: Option<String>,
    rename: Option<String>,
    skip: bool,
    required: Option<bool>,
    one_of: Option<Vec<String>>,
}

impl FieldOptions {
    fn merge(&mut self, other: FieldOptions) {
        if other.desc.is_some() {
            self.desc = other.desc;
        }
        if other.rename.is_some() {
            self.rename = other.rename;
        }
        if other.required.is_some() {
            self.required = other.required;
        }
        if other.one_of.is_some() {
            self.one_of = other.one_of;
        }
        self.skip |= other.skip;
    }
}

impl Parse for FieldOptions {
    fn parse(input: ParseStream) -> SynResult<Self> {
        let mut options = FieldOptions::default();
        while !input.is_empty() {
            let key: Ident = input.call(Ident::parse_any)?;
            match key.to_string().as_str() {
                "desc" => {
                    input.parse::<Token![=]>()?;
                    options.desc = Some(input.parse::<LitStr>()?.value());
                }
                "rename" => {
                    input.parse::<Token![=]>()?;
                    options.rename = Some(input.parse::<LitStr>()?.value());
                }
                "skip" => {
                    options.skip = if input.peek(Token![=]) {
                        input.parse::<Token![=]>()?;
                        input.parse::<LitBool>()?.value
                    } else {
                        true
                    };
                }
                "required" => {
                    input.parse::<Token![=]>()?;
                    options.required = Some(input.parse::<LitBool>()?.value);
                }
                "one_of" => {
                    input.parse::<Token![=]>()?;
                    let content;
                    bracketed!(content in input);
                    let values: Punctuated<LitStr, Token![,]> =
                        content.parse_terminated(|p| p.parse::<LitStr>(), Token![,])?;
                    options.one_of = Some(values.iter().map(LitStr::value).collect());
                }
                other => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("unknown tool_arg key `{}`", other),
                    ));
                }
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(options)
    }
}

fn field_options(field: &Field) -> SynResult<FieldOptions> {
    let mut options = FieldOptions::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("tool_arg")) {
        match &attr.meta {
            Meta::List(list) => options.merge(list.parse_args::<FieldOptions>()?),
            _ => {
                return Err(syn::Error::new_spanned(
                    attr.meta.to_token_stream(),
                    "expected #[tool_arg(key = value, ...)]",
                ))
            }
        }
    }
    Ok(options)
}

/// Returns the `T` of a single-segment `Wrapper<T>` path when the wrapper matches.
fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    if type_path.qself.is_some() {
        return None;
    }
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    }
}

/// Path of the `serde_json` re-export that generated code goes through.
fn serde_json_path() -> TokenStream2 {
    quote! { ::mcp_session::__private::serde_json }
}

fn schema_for(ty: &Type, owner: &Ident) -> TokenStream2 {
    let serde_json = serde_json_path();
    if let Some(inner) = generic_inner(ty, "Option") {
        return schema_for(inner, owner);
    }
    if let Some(inner) = generic_inner(ty, "Vec") {
        let items = schema_for(inner, owner);
        return quote! { #serde_json::json!({ "type": "array", "items": #items }) };
    }
    if generic_inner(ty, "HashMap").is_some() || generic_inner(ty, "BTreeMap").is_some() {
        return quote! { #serde_json::json!({ "type": "object" }) };
    }

    let Type::Path(type_path) = ty else {
        let message = format!(
            "unsupported field type for ToolArguments: {}",
            ty.to_token_stream()
        );
        return quote! { compile_error!(#message) };
    };
    let Some(last) = type_path.path.segments.last() else {
        return quote! { compile_error!("empty type path") };
    };

    match last.ident.to_string().as_str() {
        "String" | "str" | "char" => quote! { #serde_json::json!({ "type": "string" }) },
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128"
        | "usize" => quote! { #serde_json::json!({ "type": "integer" }) },
        "f32" | "f64" => quote! { #serde_json::json!({ "type": "number" }) },
        "bool" => quote! { #serde_json::json!({ "type": "boolean" }) },
        "Value" => quote! { #serde_json::json!({}) },
        _ if last.ident == *owner => {
            let message = format!("recursive ToolArguments type `{}` is not supported", owner);
            quote! { compile_error!(#message) }
        }
        _ => {
            let path = &type_path.path;
            quote! { <#path as ::mcp_session::ToolArgumentsDescriptor>::input_schema() }
        }
    }
}

#[proc_macro_derive(ToolArguments, attributes(tool_arg))]
pub fn tool_arguments_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let serde_json = serde_json_path();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return quote! {
                    compile_error!("ToolArguments needs a struct with named fields");
                }
                .into()
            }
        },
        _ => {
            return quote! { compile_error!("ToolArguments can only be derived for structs"); }
                .into()
        }
    };

    let mut inserts = Vec::new();
    let mut required = Vec::new();
    let mut errors = TokenStream2::new();

    for field in fields {
        let options = match field_options(field) {
            Ok(options) => options,
            Err(err) => {
                errors.extend(err.to_compile_error());
                continue;
            }
        };
        if options.skip {
            continue;
        }
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let property = options
            .rename
            .clone()
            .unwrap_or_else(|| ident.unraw().to_string());

        let base = schema_for(&field.ty, name);
        let describe = options.desc.as_ref().map(|desc| {
            quote! { obj.insert("description".to_string(), #serde_json::json!(#desc)); }
        });
        let restrict = options.one_of.as_ref().map(|values| {
            quote! {
                obj.insert("enum".to_string(), #serde_json::json!([#(#values),*]));
            }
        });
        let adjust = if describe.is_some() || restrict.is_some() {
            quote! {
                if let Some(obj) = property.as_object_mut() {
                    #describe
                    #restrict
                }
            }
        } else {
            TokenStream2::new()
        };
        inserts.push(quote! {
            #[allow(unused_mut)]
            let mut property = #base;
            #adjust
            properties.insert(#property.to_string(), property);
        });

        let is_optional = generic_inner(&field.ty, "Option").is_some();
        if options.required.unwrap_or(!is_optional) {
            required.push(property);
        }
    }

    if !errors.is_empty() {
        return errors.into();
    }

    let build = quote! {
        let mut properties = #serde_json::Map::new();
        #({ #inserts })*
        let mut schema = #serde_json::Map::new();
        schema.insert("type".to_string(), #serde_json::json!("object"));
        schema.insert(
            "properties".to_string(),
            #serde_json::Value::Object(properties),
        );
        let required: &[&str] = &[#(#required),*];
        if !required.is_empty() {
            schema.insert("required".to_string(), #serde_json::json!(required));
        }
        #serde_json::Value::Object(schema)
    };

    // A static inside a generic impl cannot name the impl's parameters, so
    // only non-generic structs get a cached schema.
    let body = if input.generics.params.is_empty() {
        quote! {
            static SCHEMA: ::mcp_session::__private::Lazy<#serde_json::Value> =
                ::mcp_session::__private::Lazy::new(|| { #build });
            SCHEMA.clone()
        }
    } else {
        build
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let expanded = quote! {
        impl #impl_generics ::mcp_session::ToolArgumentsDescriptor
            for #name #ty_generics #where_clause
        {
            fn input_schema() -> #serde_json::Value {
                #body
            }
        }
    };

    expanded.into()
}
