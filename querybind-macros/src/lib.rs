//! Procedural macros for querybind
//!
//! This crate provides the registration derives for the `querybind` crate:
//!
//! - `#[derive(Properties)]` - By-name property get/set
//! - `#[derive(Entity)]` - Table metadata and protected fields
//! - `#[derive(QueryDto)]` - Field descriptors, binding rules and the field accessor table

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Expr, ExprLit, Field, Fields, Ident, Lit, LitStr, Path, Type,
    parse_macro_input, spanned::Spanned,
};

/// Generate `querybind::meta::Properties` for a struct with named fields.
///
/// # Usage
///
/// ```ignore
/// #[derive(Properties, Default)]
/// struct Employee {
///     id: i64,
///     dept_id: Option<i64>,
///     dept_name: Option<String>,
///     #[property(skip)]
///     cache: Vec<u8>,
/// }
/// ```
///
/// Every field type must implement `ToValue` and `FromValue` unless skipped.
#[proc_macro_derive(Properties, attributes(property))]
pub fn derive_properties(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_properties(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Generate `querybind::meta::Entity` for a persistent struct.
///
/// # Usage
///
/// ```ignore
/// #[derive(Entity)]
/// #[entity(table = "sys_user")]
/// struct User {
///     id: i64,
///     #[entity(column = "user_name")]
///     name: String,
///     #[entity(protect)]
///     phone: String,
/// }
/// ```
///
/// The table and column names default to `querybind::naming::to_column_name`
/// of the struct and field names.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_entity(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Generate `querybind::meta::QueryDto` for a transfer object.
///
/// # Usage
///
/// ```ignore
/// #[derive(QueryDto, Default)]
/// #[query(entity = User)]
/// struct UserQuery {
///     #[bind_query(comparison = Contains)]
///     name: Option<String>,
///
///     // Two rules on one field are ORed
///     #[bind_query(comparison = StartsWith, field = "phone")]
///     #[bind_query(comparison = EndsWith, field = "phone")]
///     phone_part: Option<String>,
///
///     #[bind_query(entity = Dept, field = "name", condition = "this.dept_id=id")]
///     dept_name: Option<String>,
///
///     #[query(logic_delete = 1)]
///     deleted: i32,
///
///     #[query(skip)]
///     scratch: Vec<u8>,
/// }
/// ```
///
/// Struct attributes: `entity = Path` or `table = "..."`.
/// Field attributes: `skip`, `not_persistent`, `column = "..."`, `date`,
/// `logic_delete [= literal]`, `getter = "method"`.
/// `bind_query` keys: `comparison`, `strategy`, `entity`, `field`,
/// `condition`, `alias`, `ignore`.
#[proc_macro_derive(QueryDto, attributes(query, bind_query))]
pub fn derive_query_dto(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_query_dto(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// ============================================================================
// Shared helpers
// ============================================================================

fn named_fields(input: &DeriveInput) -> syn::Result<Vec<&Field>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => Ok(named.named.iter().collect()),
            _ => Err(syn::Error::new_spanned(
                &input.ident,
                "expected a struct with named fields",
            )),
        },
        _ => Err(syn::Error::new_spanned(&input.ident, "expected a struct")),
    }
}

fn field_name(field: &Field) -> syn::Result<(Ident, String)> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new(field.span(), "expected a named field"))?;
    let name = ident.to_string().trim_start_matches("r#").to_string();
    Ok((ident, name))
}

/// Accepts an identifier, a path (last segment) or a string literal.
fn symbol(expr: &Expr) -> syn::Result<String> {
    match expr {
        Expr::Path(p) => p
            .path
            .segments
            .last()
            .map(|s| s.ident.to_string())
            .ok_or_else(|| syn::Error::new_spanned(expr, "expected an identifier")),
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Ok(s.value()),
        _ => Err(syn::Error::new_spanned(
            expr,
            "expected an identifier or string",
        )),
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn comparison_variant(expr: &Expr) -> syn::Result<Ident> {
    let name = match normalize(&symbol(expr)?).as_str() {
        "EQ" => "Eq",
        "NOTEQ" | "NE" => "NotEq",
        "IN" => "In",
        "NOTIN" => "NotIn",
        "CONTAINS" => "Contains",
        "LIKE" => "Like",
        "STARTSWITH" => "StartsWith",
        "ENDSWITH" => "EndsWith",
        "GT" => "Gt",
        "GE" => "Ge",
        "LT" => "Lt",
        "LE" => "Le",
        "BETWEEN" => "Between",
        "BETWEENBEGIN" => "BetweenBegin",
        "BETWEENEND" => "BetweenEnd",
        _ => return Err(syn::Error::new_spanned(expr, "unknown comparison")),
    };
    Ok(Ident::new(name, expr.span()))
}

fn strategy_variant(expr: &Expr) -> syn::Result<Ident> {
    let name = match normalize(&symbol(expr)?).as_str() {
        "IGNOREEMPTY" => "IgnoreEmpty",
        "INCLUDEEMPTY" => "IncludeEmpty",
        "INCLUDENULL" => "IncludeNull",
        _ => return Err(syn::Error::new_spanned(expr, "unknown strategy")),
    };
    Ok(Ident::new(name, expr.span()))
}

/// Date-like types, looked up through `Option<T>`.
fn is_date_type(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    let Some(last) = path.path.segments.last() else {
        return false;
    };
    if last.ident == "Option" {
        if let syn::PathArguments::AngleBracketed(args) = &last.arguments {
            if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                return is_date_type(inner);
            }
        }
        return false;
    }
    matches!(
        last.ident.to_string().as_str(),
        "NaiveDate"
            | "NaiveDateTime"
            | "DateTime"
            | "Date"
            | "PrimitiveDateTime"
            | "OffsetDateTime"
            | "SystemTime"
    )
}

// ============================================================================
// Properties
// ============================================================================

fn expand_properties(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let type_name = ident.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut idents = Vec::new();
    let mut names = Vec::new();
    for field in named_fields(input)? {
        let mut skip = false;
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("property")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error("unknown property attribute"))
                }
            })?;
        }
        if skip {
            continue;
        }
        let (field_ident, name) = field_name(field)?;
        idents.push(field_ident);
        names.push(name);
    }

    Ok(quote! {
        impl #impl_generics ::querybind::meta::Properties for #ident #ty_generics #where_clause {
            fn get_property(
                &self,
                name: &str,
            ) -> ::core::result::Result<::querybind::value::Value, ::querybind::meta::PropertyError> {
                match name {
                    #(
                        #names => ::core::result::Result::Ok(
                            ::querybind::value::ToValue::to_value(&self.#idents)
                        ),
                    )*
                    _ => ::core::result::Result::Err(
                        ::querybind::meta::PropertyError::unknown(#type_name, name)
                    ),
                }
            }

            fn set_property(
                &mut self,
                name: &str,
                value: ::querybind::value::Value,
            ) -> ::core::result::Result<(), ::querybind::meta::PropertyError> {
                match name {
                    #(
                        #names => {
                            self.#idents = ::querybind::value::FromValue::from_value(value)
                                .map_err(|e| ::querybind::meta::PropertyError::conversion(name, e))?;
                            ::core::result::Result::Ok(())
                        }
                    )*
                    _ => ::core::result::Result::Err(
                        ::querybind::meta::PropertyError::unknown(#type_name, name)
                    ),
                }
            }

            fn property_names() -> &'static [&'static str] {
                &[#(#names),*]
            }
        }
    })
}

// ============================================================================
// Entity
// ============================================================================

fn expand_entity(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut entity_name = ident.to_string();
    let struct_name = ident.to_string();
    let mut table = quote! { ::querybind::naming::to_column_name(#struct_name) };
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let lit: LitStr = meta.value()?.parse()?;
                table = quote! { #lit };
            } else if meta.path.is_ident("name") {
                entity_name = meta.value()?.parse::<LitStr>()?.value();
            } else {
                return Err(meta.error("unknown entity attribute"));
            }
            Ok(())
        })?;
    }

    let mut columns = Vec::new();
    let mut protected = Vec::new();
    for field in named_fields(input)? {
        let (_, name) = field_name(field)?;
        let mut column = quote! { ::querybind::naming::to_column_name(#name) };
        let mut skip = false;
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("entity")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("column") {
                    let lit: LitStr = meta.value()?.parse()?;
                    column = quote! { #lit };
                } else if meta.path.is_ident("protect") {
                    protected.push(name.clone());
                } else if meta.path.is_ident("skip") {
                    skip = true;
                } else {
                    return Err(meta.error("unknown entity field attribute"));
                }
                Ok(())
            })?;
        }
        if !skip {
            columns.push(quote! { .column(#name, #column) });
        }
    }

    Ok(quote! {
        impl #impl_generics ::querybind::meta::Entity for #ident #ty_generics #where_clause {
            fn entity_info() -> ::querybind::meta::EntityInfo {
                ::querybind::meta::EntityInfo::new(#entity_name, #table)
                    #(#columns)*
                    #(.protect(#protected))*
            }
        }
    })
}

// ============================================================================
// QueryDto
// ============================================================================

struct DtoField {
    ident: Ident,
    name: String,
    descriptor: TokenStream2,
    transient: bool,
    getter: Option<Ident>,
}

fn parse_bind_query(attr: &syn::Attribute) -> syn::Result<TokenStream2> {
    let mut calls = Vec::new();
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("comparison") {
            let variant = comparison_variant(&meta.value()?.parse::<Expr>()?)?;
            calls.push(quote! { .comparison(::querybind::meta::Comparison::#variant) });
        } else if meta.path.is_ident("strategy") {
            let variant = strategy_variant(&meta.value()?.parse::<Expr>()?)?;
            calls.push(quote! { .strategy(::querybind::meta::Strategy::#variant) });
        } else if meta.path.is_ident("entity") {
            let path: Path = meta.value()?.parse()?;
            calls.push(quote! {
                .entity(<#path as ::querybind::meta::Entity>::entity_info())
            });
        } else if meta.path.is_ident("field") {
            let lit: LitStr = meta.value()?.parse()?;
            calls.push(quote! { .field(#lit) });
        } else if meta.path.is_ident("condition") {
            let lit: LitStr = meta.value()?.parse()?;
            calls.push(quote! { .condition(#lit) });
        } else if meta.path.is_ident("alias") {
            let lit: LitStr = meta.value()?.parse()?;
            calls.push(quote! { .alias(#lit) });
        } else if meta.path.is_ident("ignore") {
            let ignore = if meta.input.peek(syn::Token![=]) {
                meta.value()?.parse::<syn::LitBool>()?.value
            } else {
                true
            };
            calls.push(quote! { .ignore(#ignore) });
        } else {
            return Err(meta.error("unknown bind_query attribute"));
        }
        Ok(())
    })?;

    Ok(quote! { ::querybind::meta::BindSpec::new() #(#calls)* })
}

fn parse_dto_field(field: &Field) -> syn::Result<DtoField> {
    let (ident, name) = field_name(field)?;
    let mut calls = Vec::new();
    let mut transient = false;
    let mut getter = None;
    let mut date = is_date_type(&field.ty);

    for attr in &field.attrs {
        if attr.path().is_ident("query") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    transient = true;
                    calls.push(quote! { .transient(true) });
                } else if meta.path.is_ident("not_persistent") {
                    calls.push(quote! { .persistent(false) });
                } else if meta.path.is_ident("column") {
                    let lit: LitStr = meta.value()?.parse()?;
                    calls.push(quote! { .column(#lit) });
                } else if meta.path.is_ident("date") {
                    date = true;
                } else if meta.path.is_ident("logic_delete") {
                    let sentinel = if meta.input.peek(syn::Token![=]) {
                        let lit: Lit = meta.value()?.parse()?;
                        quote! { #lit }
                    } else {
                        quote! { false }
                    };
                    calls.push(quote! { .logic_delete(#sentinel) });
                } else if meta.path.is_ident("getter") {
                    let lit: LitStr = meta.value()?.parse()?;
                    getter = Some(Ident::new(&lit.value(), lit.span()));
                    calls.push(quote! { .getter(#lit) });
                } else {
                    return Err(meta.error("unknown query field attribute"));
                }
                Ok(())
            })?;
        } else if attr.path().is_ident("bind_query") {
            let spec = parse_bind_query(attr)?;
            calls.push(quote! { .bind(#spec) });
        }
    }

    if date {
        calls.push(quote! { .kind(::querybind::meta::FieldKind::Date) });
    }

    let descriptor = quote! {
        ::querybind::meta::FieldDescriptor::new(#name) #(#calls)*
    };

    Ok(DtoField {
        ident,
        name,
        descriptor,
        transient,
        getter,
    })
}

fn expand_query_dto(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let type_name = ident.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut dto_calls = Vec::new();
    let mut has_source = false;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("query")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("entity") {
                let path: Path = meta.value()?.parse()?;
                dto_calls.push(quote! {
                    .entity(<#path as ::querybind::meta::Entity>::entity_info())
                });
                has_source = true;
            } else if meta.path.is_ident("table") {
                let lit: LitStr = meta.value()?.parse()?;
                dto_calls.push(quote! { .table(#lit) });
                has_source = true;
            } else {
                return Err(meta.error("unknown query attribute"));
            }
            Ok(())
        })?;
    }
    if !has_source {
        return Err(syn::Error::new_spanned(
            ident,
            "QueryDto needs #[query(entity = Type)] or #[query(table = \"...\")]",
        ));
    }

    let fields = named_fields(input)?
        .into_iter()
        .map(parse_dto_field)
        .collect::<syn::Result<Vec<_>>>()?;

    let descriptors = fields.iter().map(|f| &f.descriptor);
    let arms = fields.iter().filter(|f| !f.transient).map(|f| {
        let name = &f.name;
        let field_ident = &f.ident;
        match &f.getter {
            Some(getter) => quote! {
                #name => {
                    let value = ::querybind::value::ToValue::to_value(&self.#field_ident);
                    if value.is_empty() {
                        ::querybind::value::ToValue::to_value(&self.#getter())
                    } else {
                        value
                    }
                }
            },
            None => quote! {
                #name => ::querybind::value::ToValue::to_value(&self.#field_ident),
            },
        }
    });

    Ok(quote! {
        impl #impl_generics ::querybind::meta::QueryDto for #ident #ty_generics #where_clause {
            fn describe() -> ::querybind::meta::DtoDescriptor {
                ::querybind::meta::DtoDescriptor::new(#type_name)
                    #(#dto_calls)*
                    #(.field(#descriptors))*
            }

            fn read_field(
                &self,
                name: &str,
            ) -> ::core::result::Result<::querybind::value::Value, ::querybind::meta::PropertyError> {
                ::core::result::Result::Ok(match name {
                    #(#arms)*
                    _ => {
                        return ::core::result::Result::Err(
                            ::querybind::meta::PropertyError::unknown(#type_name, name)
                        );
                    }
                })
            }
        }
    })
}
