// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `#[derive(GraphType)]`: map plain Rust types onto the graphpack value
//! model.
//!
//! Supported shapes are named-field structs and fieldless enums. Field
//! types: the fixed-width primitives, `String`, `Vec<u8>` (bytes),
//! `Vec<prim>` (uniform arrays), `Vec<String>`, `Vec<T>` and `T`/`Box<T>`/
//! `Option<T>`/`Option<Box<T>>` where `T` derives `GraphType`. Everything
//! else is a compile error pointing at the offending field.
//!
//! The derive emits the type's registration (transitive over referenced
//! types) and the conversions to and from [`Value`]. Shared references and
//! cycles are out of scope here: a `Box`-built Rust tree cannot hold them,
//! so graphs that need them use the dynamic API directly.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Data, DataEnum, DataStruct, DeriveInput, Expr, ExprLit, Fields,
    GenericArgument, Ident, Lit, PathArguments, Type,
};

#[proc_macro_derive(GraphType)]
pub fn derive_graph_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "GraphType cannot be derived for generic types",
        ));
    }
    match &input.data {
        Data::Struct(data) => expand_struct(input, data),
        Data::Enum(data) => expand_enum(input, data),
        Data::Union(_) => Err(syn::Error::new_spanned(
            &input.ident,
            "GraphType cannot be derived for unions",
        )),
    }
}

/// Fixed-width primitive recognized in field positions. `kind` names both
/// the `PrimKind` and the `Prim` variant, which agree by construction.
struct PrimTy {
    kind: &'static str,
    name: &'static str,
}

fn prim_of(ident: &Ident) -> Option<PrimTy> {
    let (kind, name) = match ident.to_string().as_str() {
        "bool" => ("Bool", "bool"),
        "i8" => ("I8", "i8"),
        "u8" => ("U8", "u8"),
        "i16" => ("I16", "i16"),
        "u16" => ("U16", "u16"),
        "i32" => ("I32", "i32"),
        "u32" => ("U32", "u32"),
        "i64" => ("I64", "i64"),
        "u64" => ("U64", "u64"),
        "f32" => ("F32", "f32"),
        "f64" => ("F64", "f64"),
        "char" => ("Char", "char"),
        _ => return None,
    };
    Some(PrimTy { kind, name })
}

enum FieldModel {
    Prim(PrimTy),
    Str,
    Bytes,
    Array(PrimTy),
    ListStr,
    ListNested(Type),
    OptionalStr,
    OptionalNested { ty: Type, boxed: bool },
    Nested { ty: Type, boxed: bool },
}

fn single_generic_arg(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else { return None };
    let segment = path.path.segments.last()?;
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}

fn last_ident(ty: &Type) -> Option<&Ident> {
    match ty {
        Type::Path(path) if path.qself.is_none() => path.path.segments.last().map(|s| &s.ident),
        _ => None,
    }
}

fn classify(ty: &Type) -> syn::Result<FieldModel> {
    let unsupported = || syn::Error::new_spanned(ty, "field type is not supported by GraphType");
    let ident = last_ident(ty).ok_or_else(unsupported)?;

    if let Some(prim) = prim_of(ident) {
        return Ok(FieldModel::Prim(prim));
    }
    match ident.to_string().as_str() {
        "String" => Ok(FieldModel::Str),
        "Vec" => {
            let inner = single_generic_arg(ty).ok_or_else(unsupported)?;
            let inner_ident = last_ident(inner).ok_or_else(unsupported)?;
            if inner_ident == "u8" {
                return Ok(FieldModel::Bytes);
            }
            if let Some(prim) = prim_of(inner_ident) {
                if prim.kind == "Char" {
                    return Err(unsupported());
                }
                return Ok(FieldModel::Array(prim));
            }
            if inner_ident == "String" {
                return Ok(FieldModel::ListStr);
            }
            if inner_ident == "Vec" || inner_ident == "Option" || inner_ident == "Box" {
                return Err(unsupported());
            }
            Ok(FieldModel::ListNested(inner.clone()))
        }
        "Option" => {
            let inner = single_generic_arg(ty).ok_or_else(unsupported)?;
            let inner_ident = last_ident(inner).ok_or_else(unsupported)?;
            if prim_of(inner_ident).is_some() {
                return Err(syn::Error::new_spanned(
                    ty,
                    "nullable primitives are not supported; use a sentinel or a nested type",
                ));
            }
            if inner_ident == "String" {
                return Ok(FieldModel::OptionalStr);
            }
            if inner_ident == "Box" {
                let boxed = single_generic_arg(inner).ok_or_else(unsupported)?;
                return Ok(FieldModel::OptionalNested {
                    ty: boxed.clone(),
                    boxed: true,
                });
            }
            Ok(FieldModel::OptionalNested {
                ty: inner.clone(),
                boxed: false,
            })
        }
        "Box" => {
            let inner = single_generic_arg(ty).ok_or_else(unsupported)?;
            Ok(FieldModel::Nested {
                ty: inner.clone(),
                boxed: true,
            })
        }
        _ => Ok(FieldModel::Nested {
            ty: ty.clone(),
            boxed: false,
        }),
    }
}

impl FieldModel {
    fn kind_expr(&self) -> TokenStream2 {
        match self {
            FieldModel::Prim(p) => {
                let kind = Ident::new(p.kind, proc_macro2::Span::call_site());
                quote!(::graphpack::Kind::Prim(::graphpack::PrimKind::#kind))
            }
            FieldModel::Str | FieldModel::OptionalStr => quote!(::graphpack::Kind::Str),
            FieldModel::Bytes => quote!(::graphpack::Kind::Bytes),
            FieldModel::Array(p) => {
                let kind = Ident::new(p.kind, proc_macro2::Span::call_site());
                quote!(::graphpack::Kind::Array(::graphpack::PrimKind::#kind))
            }
            FieldModel::ListStr | FieldModel::ListNested(_) => quote!(::graphpack::Kind::List),
            FieldModel::OptionalNested { ty, .. } | FieldModel::Nested { ty, .. } => {
                quote!(<#ty as ::graphpack::GraphType>::kind())
            }
        }
    }

    fn dependency(&self) -> Option<&Type> {
        match self {
            FieldModel::ListNested(ty)
            | FieldModel::OptionalNested { ty, .. }
            | FieldModel::Nested { ty, .. } => Some(ty),
            _ => None,
        }
    }

    fn to_expr(&self, name: &Ident) -> TokenStream2 {
        match self {
            FieldModel::Prim(p) => {
                let variant = Ident::new(p.kind, proc_macro2::Span::call_site());
                quote!(::graphpack::Value::Prim(::graphpack::Prim::#variant(self.#name)))
            }
            FieldModel::Str => quote!(::graphpack::Value::str(&self.#name)),
            FieldModel::Bytes => quote!(::graphpack::Value::bytes(self.#name.clone())),
            FieldModel::Array(_) => {
                quote!(::graphpack::Value::array(::graphpack::PrimArray::from(self.#name.clone())))
            }
            FieldModel::ListStr => quote! {
                ::graphpack::Value::list(
                    self.#name.iter().map(|s| ::graphpack::Value::str(s)).collect(),
                )
            },
            FieldModel::ListNested(_) => quote! {
                ::graphpack::Value::list(
                    self.#name
                        .iter()
                        .map(|item| ::graphpack::GraphType::to_value(item, registry))
                        .collect::<::graphpack::Result<::std::vec::Vec<_>>>()?,
                )
            },
            FieldModel::OptionalStr => quote! {
                match &self.#name {
                    ::std::option::Option::Some(s) => ::graphpack::Value::str(s),
                    ::std::option::Option::None => ::graphpack::Value::Null,
                }
            },
            FieldModel::OptionalNested { boxed, .. } => {
                let inner = if *boxed {
                    quote!(&**inner)
                } else {
                    quote!(inner)
                };
                quote! {
                    match &self.#name {
                        ::std::option::Option::Some(inner) => {
                            ::graphpack::GraphType::to_value(#inner, registry)?
                        }
                        ::std::option::Option::None => ::graphpack::Value::Null,
                    }
                }
            }
            FieldModel::Nested { boxed, .. } => {
                if *boxed {
                    quote!(::graphpack::GraphType::to_value(&*self.#name, registry)?)
                } else {
                    quote!(::graphpack::GraphType::to_value(&self.#name, registry)?)
                }
            }
        }
    }

    /// Expression converting a local `field: Value` into the field type.
    fn from_expr(&self) -> TokenStream2 {
        match self {
            FieldModel::Prim(p) => {
                let variant = Ident::new(p.kind, proc_macro2::Span::call_site());
                let expected = p.name;
                quote! {
                    match field {
                        ::graphpack::Value::Prim(::graphpack::Prim::#variant(x)) => x,
                        ::graphpack::Value::Null => ::std::default::Default::default(),
                        other => {
                            return ::std::result::Result::Err(::graphpack::Error::KindMismatch {
                                expected: #expected,
                                found: other.kind_name(),
                            })
                        }
                    }
                }
            }
            FieldModel::Str => quote! {
                match field {
                    ::graphpack::Value::Str(s) => s.to_string(),
                    ::graphpack::Value::Null => ::std::string::String::new(),
                    other => {
                        return ::std::result::Result::Err(::graphpack::Error::KindMismatch {
                            expected: "str",
                            found: other.kind_name(),
                        })
                    }
                }
            },
            FieldModel::Bytes => quote! {
                match field {
                    ::graphpack::Value::Bytes(b) => b.borrow().clone(),
                    ::graphpack::Value::Null => ::std::vec::Vec::new(),
                    other => {
                        return ::std::result::Result::Err(::graphpack::Error::KindMismatch {
                            expected: "bytes",
                            found: other.kind_name(),
                        })
                    }
                }
            },
            FieldModel::Array(p) => {
                let variant = Ident::new(p.kind, proc_macro2::Span::call_site());
                let expected = p.name;
                quote! {
                    match field {
                        ::graphpack::Value::Array(a) => a
                            .borrow()
                            .items()
                            .iter()
                            .map(|p| match p {
                                ::graphpack::Prim::#variant(x) => ::std::result::Result::Ok(*x),
                                other => {
                                    ::std::result::Result::Err(::graphpack::Error::KindMismatch {
                                        expected: #expected,
                                        found: other.kind().name(),
                                    })
                                }
                            })
                            .collect::<::graphpack::Result<::std::vec::Vec<_>>>()?,
                        ::graphpack::Value::Null => ::std::vec::Vec::new(),
                        other => {
                            return ::std::result::Result::Err(::graphpack::Error::KindMismatch {
                                expected: "array",
                                found: other.kind_name(),
                            })
                        }
                    }
                }
            }
            FieldModel::ListStr => quote! {
                match field {
                    ::graphpack::Value::List(l) => {
                        let items = l.borrow().clone();
                        items
                            .iter()
                            .map(|v| match v {
                                ::graphpack::Value::Str(s) => {
                                    ::std::result::Result::Ok(s.to_string())
                                }
                                other => {
                                    ::std::result::Result::Err(::graphpack::Error::KindMismatch {
                                        expected: "str",
                                        found: other.kind_name(),
                                    })
                                }
                            })
                            .collect::<::graphpack::Result<::std::vec::Vec<_>>>()?
                    }
                    ::graphpack::Value::Null => ::std::vec::Vec::new(),
                    other => {
                        return ::std::result::Result::Err(::graphpack::Error::KindMismatch {
                            expected: "list",
                            found: other.kind_name(),
                        })
                    }
                }
            },
            FieldModel::ListNested(ty) => quote! {
                match field {
                    ::graphpack::Value::List(l) => {
                        let items = l.borrow().clone();
                        items
                            .iter()
                            .map(|v| <#ty as ::graphpack::GraphType>::from_value(v, registry))
                            .collect::<::graphpack::Result<::std::vec::Vec<_>>>()?
                    }
                    ::graphpack::Value::Null => ::std::vec::Vec::new(),
                    other => {
                        return ::std::result::Result::Err(::graphpack::Error::KindMismatch {
                            expected: "list",
                            found: other.kind_name(),
                        })
                    }
                }
            },
            FieldModel::OptionalStr => quote! {
                match field {
                    ::graphpack::Value::Null => ::std::option::Option::None,
                    ::graphpack::Value::Str(s) => ::std::option::Option::Some(s.to_string()),
                    other => {
                        return ::std::result::Result::Err(::graphpack::Error::KindMismatch {
                            expected: "str",
                            found: other.kind_name(),
                        })
                    }
                }
            },
            FieldModel::OptionalNested { ty, boxed } => {
                let wrap = if *boxed {
                    quote!(::std::boxed::Box::new(inner))
                } else {
                    quote!(inner)
                };
                quote! {
                    match field {
                        ::graphpack::Value::Null => ::std::option::Option::None,
                        other => {
                            let inner = <#ty as ::graphpack::GraphType>::from_value(&other, registry)?;
                            ::std::option::Option::Some(#wrap)
                        }
                    }
                }
            }
            // Null is delegated: enums fall back to their zero tag, structs
            // reject it from their own from_value.
            FieldModel::Nested { ty, boxed } => {
                let wrap = if *boxed {
                    quote!(::std::boxed::Box::new(inner))
                } else {
                    quote!(inner)
                };
                quote! {
                    {
                        let inner = <#ty as ::graphpack::GraphType>::from_value(&field, registry)?;
                        #wrap
                    }
                }
            }
        }
    }
}

fn expand_struct(input: &DeriveInput, data: &DataStruct) -> syn::Result<TokenStream2> {
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "GraphType requires named fields",
        ));
    };

    let ident = &input.ident;
    let type_name = ident.to_string();
    let mut field_names = Vec::new();
    let mut field_strs = Vec::new();
    let mut models = Vec::new();
    for field in &fields.named {
        let name = field.ident.clone().expect("named field");
        field_strs.push(name.to_string());
        field_names.push(name);
        models.push(classify(&field.ty)?);
    }

    let kind_exprs: Vec<_> = models.iter().map(|m| m.kind_expr()).collect();
    let to_exprs: Vec<_> = models
        .iter()
        .zip(&field_names)
        .map(|(m, name)| m.to_expr(name))
        .collect();
    let from_exprs: Vec<_> = models.iter().map(|m| m.from_expr()).collect();
    let deps: Vec<_> = models.iter().filter_map(|m| m.dependency()).collect();

    Ok(quote! {
        #[automatically_derived]
        impl ::graphpack::GraphType for #ident {
            const TYPE_NAME: &'static str = #type_name;

            fn kind() -> ::graphpack::Kind {
                ::graphpack::Kind::Ref(Self::TYPE_NAME.to_string())
            }

            fn register(builder: &mut ::graphpack::TypeRegistryBuilder) {
                if builder.contains(Self::TYPE_NAME) {
                    return;
                }
                builder.object(
                    ::graphpack::TypeDef::new(Self::TYPE_NAME)
                        #( .field(#field_strs, #kind_exprs) )*
                );
                #( <#deps as ::graphpack::GraphType>::register(builder); )*
            }

            fn to_value(
                &self,
                registry: &::graphpack::TypeRegistry,
            ) -> ::graphpack::Result<::graphpack::Value> {
                let object = registry.new_object(Self::TYPE_NAME)?;
                #( object.set(#field_strs, #to_exprs)?; )*
                ::std::result::Result::Ok(::graphpack::Value::Object(object))
            }

            fn from_value(
                value: &::graphpack::Value,
                registry: &::graphpack::TypeRegistry,
            ) -> ::graphpack::Result<Self> {
                let _ = registry;
                let object = value
                    .as_object()
                    .ok_or(::graphpack::Error::KindMismatch {
                        expected: "object",
                        found: value.kind_name(),
                    })?;
                ::std::result::Result::Ok(Self {
                    #( #field_names: {
                        let field = object.get(#field_strs)?;
                        #from_exprs
                    }, )*
                })
            }
        }
    })
}

fn expand_enum(input: &DeriveInput, data: &DataEnum) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let type_name = ident.to_string();

    let mut names = Vec::new();
    let mut idents = Vec::new();
    let mut tags = Vec::new();
    let mut next_tag: i32 = 0;
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "GraphType enums must be fieldless",
            ));
        }
        if let Some((_, expr)) = &variant.discriminant {
            next_tag = discriminant_value(expr)?;
        }
        names.push(variant.ident.to_string());
        idents.push(variant.ident.clone());
        tags.push(next_tag);
        next_tag += 1;
    }

    Ok(quote! {
        #[automatically_derived]
        impl ::graphpack::GraphType for #ident {
            const TYPE_NAME: &'static str = #type_name;

            fn kind() -> ::graphpack::Kind {
                ::graphpack::Kind::Enum(Self::TYPE_NAME.to_string())
            }

            fn register(builder: &mut ::graphpack::TypeRegistryBuilder) {
                if builder.contains(Self::TYPE_NAME) {
                    return;
                }
                builder.enumeration(
                    ::graphpack::EnumDef::new(Self::TYPE_NAME)
                        #( .variant(#names, #tags) )*
                );
            }

            fn to_value(
                &self,
                _registry: &::graphpack::TypeRegistry,
            ) -> ::graphpack::Result<::graphpack::Value> {
                let tag = match self {
                    #( Self::#idents => #tags, )*
                };
                ::std::result::Result::Ok(::graphpack::Value::EnumVal(::graphpack::EnumVal {
                    type_name: ::std::rc::Rc::from(Self::TYPE_NAME),
                    tag,
                }))
            }

            fn from_value(
                value: &::graphpack::Value,
                _registry: &::graphpack::TypeRegistry,
            ) -> ::graphpack::Result<Self> {
                // Enum slots are not nullable: null reads as tag zero.
                let tag = match value {
                    ::graphpack::Value::Null => 0,
                    ::graphpack::Value::EnumVal(e) => e.tag,
                    other => {
                        return ::std::result::Result::Err(::graphpack::Error::KindMismatch {
                            expected: "enum",
                            found: other.kind_name(),
                        })
                    }
                };
                match tag {
                    #( #tags => ::std::result::Result::Ok(Self::#idents), )*
                    other => ::std::result::Result::Err(::graphpack::Error::UnknownEnumTag {
                        type_name: Self::TYPE_NAME.to_string(),
                        tag: other,
                    }),
                }
            }
        }
    })
}

fn discriminant_value(expr: &Expr) -> syn::Result<i32> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(lit), ..
        }) => lit.base10_parse(),
        _ => Err(syn::Error::new_spanned(
            expr,
            "enum discriminants must be integer literals",
        )),
    }
}
