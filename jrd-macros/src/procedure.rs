//! `#[procedure]` implementation
//!
//! Expansion of
//!
//! ```ignore
//! #[procedure]
//! async fn echo(#[default("World")] name: &str, times: Option<u32>) -> Result<String> { .. }
//! ```
//!
//! is, roughly:
//!
//! ```ignore
//! fn echo() -> ::jrd_server::Result<::jrd_server::Procedure> {
//!     async fn __procedure(name: &str, times: Option<u32>) -> Result<String> { .. }
//!
//!     let signature = ::jrd_server::Signature::builder()
//!         .param_with_default("name", ParamType::String, json!("World"))
//!         .optional("times", ParamType::Integer)
//!         .build()?;
//!     let handler = ::jrd_server::from_fn(|args| async move {
//!         let name: String = args.get("name")?;
//!         let times: Option<u32> = args.get("times")?;
//!         let value = __procedure(&name, times).await.map_err(Into::into)?;
//!         ::jrd_server::Reply::json(&value)
//!     });
//!     Ok(::jrd_server::Procedure::new(signature, handler))
//! }
//! ```

use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{
    Attribute, Error, Expr, FnArg, GenericArgument, ItemFn, Pat, PathArguments, PathSegment,
    ReturnType, Type,
};

pub fn expand(attr: TokenStream, mut item: ItemFn) -> syn::Result<TokenStream> {
    if !attr.is_empty() {
        return Err(Error::new_spanned(attr, "#[procedure] takes no arguments"));
    }
    if item.sig.asyncness.is_none() {
        return Err(Error::new_spanned(
            item.sig.fn_token,
            "#[procedure] requires an async fn",
        ));
    }
    if !item.sig.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &item.sig.generics,
            "#[procedure] functions cannot be generic",
        ));
    }

    let mut params = Vec::new();
    for input in item.sig.inputs.iter_mut() {
        match input {
            FnArg::Receiver(receiver) => {
                return Err(Error::new_spanned(
                    receiver,
                    "#[procedure] cannot be used on methods taking self",
                ))
            }
            FnArg::Typed(typed) => {
                let param = Param::parse(&typed.attrs, &typed.pat, &typed.ty)?;
                typed
                    .attrs
                    .retain(|a| !a.path().is_ident("default") && !a.path().is_ident("variadic"));
                params.push(param);
            }
        }
    }

    if let Some(pos) = params.iter().position(|p| p.variadic) {
        if pos + 1 != params.len() {
            return Err(Error::new(
                params[pos].span,
                "#[variadic] must be the last parameter",
            ));
        }
    }

    let vis = &item.vis;
    let name = &item.sig.ident;
    let attrs = &item.attrs;

    let inner_name = format_ident!("__procedure");
    let mut inner_sig = item.sig.clone();
    inner_sig.ident = inner_name.clone();
    let block = &item.block;

    let builder_steps = params.iter().map(Param::builder_step);
    let extractions = params.iter().map(Param::extraction);
    let call_args = params.iter().map(Param::call_arg);
    let finish = reply_conversion(&item.sig.output);
    let args_ident = if params.is_empty() {
        format_ident!("_args")
    } else {
        format_ident!("args")
    };

    Ok(quote! {
        #(#attrs)*
        #vis fn #name() -> ::jrd_server::Result<::jrd_server::Procedure> {
            #inner_sig #block

            let signature = ::jrd_server::Signature::builder()
                #(#builder_steps)*
                .build()?;

            let handler = ::jrd_server::from_fn(|#args_ident: ::jrd_server::BoundArgs| async move {
                #(#extractions)*
                let result = #inner_name(#(#call_args),*).await;
                #finish
            });

            ::std::result::Result::Ok(::jrd_server::Procedure::new(signature, handler))
        }
    })
}

struct Param {
    name: String,
    local: syn::Ident,
    /// Type the bound value is deserialized into
    owned: TokenStream,
    /// Whether the function takes a reference to `owned`
    by_ref: bool,
    kind: ParamKind,
    variadic: bool,
    span: Span,
}

enum ParamKind {
    Required(TokenStream),
    Defaulted(TokenStream, Expr),
    Optional(TokenStream),
    Variadic(TokenStream),
}

impl Param {
    fn parse(attrs: &[Attribute], pat: &Pat, ty: &Type) -> syn::Result<Self> {
        let ident = match pat {
            Pat::Ident(pat) => pat.ident.clone(),
            other => {
                return Err(Error::new_spanned(
                    other,
                    "#[procedure] parameters must be plain identifiers",
                ))
            }
        };
        let name = ident.unraw().to_string();
        let local = format_ident!("__arg_{}", name);

        let mut default = None;
        let mut variadic = false;
        for attr in attrs {
            if attr.path().is_ident("default") {
                default = Some(attr.parse_args::<Expr>()?);
            } else if attr.path().is_ident("variadic") {
                variadic = true;
            }
        }

        let (owned, by_ref) = owned_type(ty);

        let kind = if variadic {
            if default.is_some() {
                return Err(Error::new_spanned(
                    ty,
                    "a #[variadic] parameter cannot have a default",
                ));
            }
            let element = vec_element(ty).ok_or_else(|| {
                Error::new_spanned(ty, "a #[variadic] parameter must be a Vec<T>")
            })?;
            ParamKind::Variadic(param_type(element))
        } else {
            match (option_inner(ty), default) {
                (Some(inner), None) => ParamKind::Optional(param_type(inner)),
                (Some(inner), Some(expr)) => {
                    let inner = param_type(inner);
                    ParamKind::Defaulted(quote!(::jrd_server::ParamType::optional(#inner)), expr)
                }
                (None, Some(expr)) => ParamKind::Defaulted(param_type(ty), expr),
                (None, None) => ParamKind::Required(param_type(ty)),
            }
        };

        Ok(Self {
            name,
            local,
            owned,
            by_ref,
            kind,
            variadic,
            span: ident.span(),
        })
    }

    fn builder_step(&self) -> TokenStream {
        let name = &self.name;
        match &self.kind {
            ParamKind::Required(ty) => quote!(.param(#name, #ty)),
            ParamKind::Defaulted(ty, expr) => {
                quote!(.param_with_default(#name, #ty, ::jrd_server::serde_json::json!(#expr)))
            }
            ParamKind::Optional(ty) => quote!(.optional(#name, #ty)),
            ParamKind::Variadic(ty) => quote!(.variadic(#name, #ty)),
        }
    }

    fn extraction(&self) -> TokenStream {
        let Self {
            name, local, owned, ..
        } = self;
        quote!(let #local: #owned = args.get(#name)?;)
    }

    fn call_arg(&self) -> TokenStream {
        let local = &self.local;
        if self.by_ref {
            quote!(&#local)
        } else {
            quote!(#local)
        }
    }
}

/// How the procedure's return value becomes a `Reply`
fn reply_conversion(output: &ReturnType) -> TokenStream {
    let ty = match output {
        ReturnType::Default => return quote!(::jrd_server::Reply::json(&result)),
        ReturnType::Type(_, ty) => ty.as_ref(),
    };

    match last_segment(ty) {
        Some(seg) if seg.ident == "Result" => {
            let is_reply = first_generic(seg)
                .and_then(last_segment)
                .map_or(false, |s| s.ident == "Reply");
            if is_reply {
                quote!(result.map_err(::std::convert::Into::<::jrd_server::Error>::into))
            } else {
                quote! {
                    let value = result.map_err(::std::convert::Into::<::jrd_server::Error>::into)?;
                    ::jrd_server::Reply::json(&value)
                }
            }
        }
        Some(seg) if seg.ident == "Reply" => quote!(::std::result::Result::Ok(result)),
        _ => quote!(::jrd_server::Reply::json(&result)),
    }
}

/// Map a Rust type onto the `ParamType` checked at bind time
fn param_type(ty: &Type) -> TokenStream {
    let variant = match ty {
        Type::Reference(r) => return param_type(&r.elem),
        Type::Paren(p) => return param_type(&p.elem),
        Type::Group(g) => return param_type(&g.elem),
        Type::Array(_) | Type::Slice(_) => quote!(Array),
        Type::Tuple(t) if t.elems.is_empty() => quote!(Null),
        Type::Tuple(_) => quote!(Array),
        Type::Path(_) => match last_segment(ty) {
            Some(seg) => {
                if seg.ident == "Option" {
                    if let Some(inner) = first_generic(seg) {
                        let inner = param_type(inner);
                        return quote!(::jrd_server::ParamType::optional(#inner));
                    }
                }
                match seg.ident.to_string().as_str() {
                    "String" | "str" | "char" => quote!(String),
                    "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32"
                    | "u64" | "u128" | "usize" => quote!(Integer),
                    "f32" | "f64" => quote!(Number),
                    "bool" => quote!(Boolean),
                    "Vec" | "VecDeque" | "HashSet" | "BTreeSet" => quote!(Array),
                    "HashMap" | "BTreeMap" | "Map" => quote!(Object),
                    _ => quote!(Any),
                }
            }
            None => quote!(Any),
        },
        _ => quote!(Any),
    };
    quote!(::jrd_server::ParamType::#variant)
}

/// Type to deserialize into, and whether the function borrows it
fn owned_type(ty: &Type) -> (TokenStream, bool) {
    match ty {
        Type::Reference(r) => match r.elem.as_ref() {
            Type::Path(p) if p.path.is_ident("str") => (quote!(::std::string::String), true),
            Type::Slice(s) => {
                let elem = &s.elem;
                (quote!(::std::vec::Vec<#elem>), true)
            }
            elem => (quote!(#elem), true),
        },
        _ => (quote!(#ty), false),
    }
}

fn last_segment(ty: &Type) -> Option<&PathSegment> {
    match ty {
        Type::Path(p) if p.qself.is_none() => p.path.segments.last(),
        _ => None,
    }
}

fn first_generic(seg: &PathSegment) -> Option<&Type> {
    match &seg.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(ty) => Some(ty),
            _ => None,
        }),
        _ => None,
    }
}

fn option_inner(ty: &Type) -> Option<&Type> {
    last_segment(ty)
        .filter(|seg| seg.ident == "Option")
        .and_then(first_generic)
}

fn vec_element(ty: &Type) -> Option<&Type> {
    last_segment(ty)
        .filter(|seg| seg.ident == "Vec")
        .and_then(first_generic)
}
