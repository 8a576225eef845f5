//! Proc macros for Infinovel's generator payloads.
//!
//! Provides `#[derive(Schema)]` to generate a JSON schema from a struct
//! definition, so the shape the model is asked to produce and the shape we
//! deserialize are defined in exactly one place.
//!
//! # Example
//!
//! ```ignore
//! /// Write the next chapter of the story
//! #[derive(Schema, Deserialize)]
//! #[schema(name = "write_chapter")]
//! #[serde(rename_all = "camelCase")]
//! struct ChapterDraft {
//!     /// Chapter title
//!     title: String,
//!     /// Seconds the reader has to decide
//!     #[schema(minimum = 0)]
//!     time_limit: Option<u32>,
//!     /// Outgoing choices
//!     choices: Vec<ChoiceDraft>,
//! }
//! ```
//!
//! Nested struct types delegate to their own `json_schema()`, so every struct
//! reachable from a schema must derive `Schema` as well. Structs carrying a
//! `#[schema(name = "...")]` attribute additionally get `as_tool()`, which
//! wraps the schema as a `claude::Tool`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::{parse_macro_input, DeriveInput, Field, Lit, LitInt, LitStr, Meta, Token, Type};

/// Derive macro for generating JSON schema accessors.
///
/// # Attributes
///
/// - `#[schema(name = "...")]` on the struct - schema/tool name (defaults to snake_case
///   struct name); also enables `as_tool()`
/// - `#[schema(optional)]` on fields - mark the field as not required
/// - `#[schema(rename = "...")]` on fields - override the property name
/// - `#[schema(minimum = N)]` on fields - numeric lower bound
///
/// `#[serde(rename_all = "camelCase")]`, `#[serde(rename = "...")]`,
/// `#[serde(default)]` and `#[serde(skip)]` are honored so the schema matches
/// what serde will actually accept.
#[proc_macro_derive(Schema, attributes(schema))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_schema(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

#[derive(Default)]
struct ContainerOptions {
    name: Option<String>,
    camel_case: bool,
}

#[derive(Default)]
struct FieldOptions {
    rename: Option<String>,
    optional: bool,
    skip: bool,
    minimum: Option<i64>,
}

fn expand_schema(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let container = container_options(&input)?;

    let schema_name = container
        .name
        .clone()
        .unwrap_or_else(|| to_snake_case(&struct_name.to_string()));
    let description = get_doc_comment(&input.attrs);

    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Schema derive only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Schema derive only supports structs",
            ))
        }
    };

    let mut property_tokens = Vec::new();
    let mut required_fields = Vec::new();

    for field in fields {
        let options = field_options(field)?;
        if options.skip {
            continue;
        }

        let property_name = property_name(field, &options, &container)?;
        let field_desc = get_doc_comment(&field.attrs);
        let field_type = &field.ty;
        let type_schema = type_to_schema(field_type);

        let desc_token = if field_desc.is_empty() {
            quote! {}
        } else {
            quote! { property["description"] = ::serde_json::json!(#field_desc); }
        };

        let minimum_token = match options.minimum {
            Some(min) => quote! { property["minimum"] = ::serde_json::json!(#min); },
            None => quote! {},
        };

        property_tokens.push(quote! {
            {
                let mut property = #type_schema;
                #desc_token
                #minimum_token
                properties.insert(#property_name.to_string(), property);
            }
        });

        if !options.optional && !is_option_type(field_type) {
            required_fields.push(property_name);
        }
    }

    let tool_tokens = if container.name.is_some() {
        quote! {
            /// Wrap this schema as a tool definition for the Claude API.
            pub fn as_tool() -> ::claude::Tool {
                ::claude::Tool {
                    name: Self::schema_name().to_string(),
                    description: Self::schema_description().to_string(),
                    input_schema: Self::json_schema(),
                }
            }
        }
    } else {
        quote! {}
    };

    Ok(quote! {
        impl #struct_name {
            /// Name of this schema.
            pub fn schema_name() -> &'static str {
                #schema_name
            }

            /// Description taken from the type's doc comment.
            pub fn schema_description() -> &'static str {
                #description
            }

            /// JSON schema describing this type's serialized form.
            pub fn json_schema() -> ::serde_json::Value {
                let mut properties = ::serde_json::Map::new();
                #(#property_tokens)*

                let required: Vec<&str> = vec![#(#required_fields),*];

                ::serde_json::json!({
                    "type": "object",
                    "properties": properties,
                    "required": required
                })
            }

            #tool_tokens
        }
    })
}

fn container_options(input: &DeriveInput) -> syn::Result<ContainerOptions> {
    let mut options = ContainerOptions::default();

    for attr in &input.attrs {
        if attr.path().is_ident("schema") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let value: LitStr = meta.value()?.parse()?;
                    options.name = Some(value.value());
                    Ok(())
                } else {
                    Err(meta.error("unsupported schema attribute"))
                }
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename_all") {
                    let value: LitStr = meta.value()?.parse()?;
                    match value.value().as_str() {
                        "camelCase" => options.camel_case = true,
                        "snake_case" => options.camel_case = false,
                        other => {
                            return Err(syn::Error::new_spanned(
                                &value,
                                format!("Schema derive does not support rename_all = \"{other}\""),
                            ))
                        }
                    }
                    Ok(())
                } else {
                    skip_meta_value(&meta)
                }
            })?;
        }
    }

    Ok(options)
}

fn field_options(field: &Field) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();

    for attr in &field.attrs {
        if attr.path().is_ident("schema") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let value: LitStr = meta.value()?.parse()?;
                    options.rename = Some(value.value());
                    Ok(())
                } else if meta.path.is_ident("optional") {
                    options.optional = true;
                    Ok(())
                } else if meta.path.is_ident("minimum") {
                    let value: LitInt = meta.value()?.parse()?;
                    options.minimum = Some(value.base10_parse()?);
                    Ok(())
                } else {
                    Err(meta.error("unsupported schema attribute"))
                }
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    // schema(rename) wins over serde(rename)
                    if meta.input.peek(Token![=]) {
                        let value: LitStr = meta.value()?.parse()?;
                        if options.rename.is_none() {
                            options.rename = Some(value.value());
                        }
                        Ok(())
                    } else {
                        skip_meta_value(&meta)
                    }
                } else if meta.path.is_ident("default") {
                    options.optional = true;
                    skip_meta_value(&meta)
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                    options.skip = true;
                    Ok(())
                } else {
                    skip_meta_value(&meta)
                }
            })?;
        }
    }

    Ok(options)
}

/// Consume the value of a nested meta item we don't interpret.
fn skip_meta_value(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        content.parse::<TokenStream2>()?;
    }
    Ok(())
}

fn property_name(
    field: &Field,
    options: &FieldOptions,
    container: &ContainerOptions,
) -> syn::Result<String> {
    if let Some(rename) = &options.rename {
        return Ok(rename.clone());
    }

    let ident = field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
    let name = ident.to_string();
    let name = name.strip_prefix("r#").unwrap_or(&name).to_string();

    Ok(if container.camel_case {
        to_camel_case(&name)
    } else {
        name
    })
}

fn get_doc_comment(attrs: &[syn::Attribute]) -> String {
    let mut docs = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(nv) = &attr.meta {
                if let syn::Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(s) = &expr_lit.lit {
                        docs.push(s.value().trim().to_string());
                    }
                }
            }
        }
    }
    docs.join(" ")
}

fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}

/// Generic type arguments of the last path segment (`Vec<T>` → `[T]`).
fn type_arguments(segment: &syn::PathSegment) -> Vec<&Type> {
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => args
            .args
            .iter()
            .filter_map(|arg| match arg {
                syn::GenericArgument::Type(ty) => Some(ty),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn type_to_schema(ty: &Type) -> TokenStream2 {
    let Type::Path(type_path) = ty else {
        return quote! { ::serde_json::json!({}) };
    };
    let Some(segment) = type_path.path.segments.last() else {
        return quote! { ::serde_json::json!({}) };
    };

    let args = type_arguments(segment);
    match segment.ident.to_string().as_str() {
        "String" | "str" => quote! { ::serde_json::json!({"type": "string"}) },
        "i8" | "i16" | "i32" | "i64" | "isize" => {
            quote! { ::serde_json::json!({"type": "integer"}) }
        }
        "u8" | "u16" | "u32" | "u64" | "usize" => {
            quote! { ::serde_json::json!({"type": "integer", "minimum": 0}) }
        }
        "f32" | "f64" => quote! { ::serde_json::json!({"type": "number"}) },
        "bool" => quote! { ::serde_json::json!({"type": "boolean"}) },
        "Option" | "Box" => match args.first() {
            Some(inner) => type_to_schema(inner),
            None => quote! { ::serde_json::json!({}) },
        },
        "Vec" => match args.first() {
            Some(inner) => {
                let inner_schema = type_to_schema(inner);
                quote! {
                    ::serde_json::json!({
                        "type": "array",
                        "items": #inner_schema
                    })
                }
            }
            None => quote! { ::serde_json::json!({"type": "array"}) },
        },
        "HashMap" | "BTreeMap" => match args.get(1) {
            Some(value) => {
                let value_schema = type_to_schema(value);
                quote! {
                    ::serde_json::json!({
                        "type": "object",
                        "additionalProperties": #value_schema
                    })
                }
            }
            None => quote! { ::serde_json::json!({"type": "object"}) },
        },
        "Value" => quote! { ::serde_json::json!({}) },
        // Any other named type is expected to derive Schema itself
        _ => quote! { <#ty>::json_schema() },
    }
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

fn to_camel_case(s: &str) -> String {
    let mut result = String::new();
    let mut upper_next = false;
    for c in s.chars() {
        if c == '_' {
            upper_next = !result.is_empty();
        } else if upper_next {
            result.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            result.push(c);
        }
    }
    result
}
