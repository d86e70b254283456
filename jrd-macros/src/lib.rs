//! Procedural macros for the jrd JSON-RPC dispatcher
//!
//! # `#[procedure]`
//!
//! Turns an `async fn` into a factory returning a registrable
//! `jrd_server::Procedure`. The signature descriptor is derived from the
//! function's parameters at compile time, so the binder knows names,
//! order, defaults and types without any runtime reflection.
//!
//! ```ignore
//! use jrd::{procedure, MethodOptions, Result};
//!
//! #[procedure]
//! async fn echo(#[default("")] name: &str) -> Result<String> {
//!     Ok(format!("Hello {}", name))
//! }
//!
//! let server = jrd::JrdServer::builder()
//!     .method("App.echo", echo()?, MethodOptions::default());
//! ```
//!
//! ## Parameters
//!
//! | Rust type                          | checked as  |
//! |------------------------------------|-------------|
//! | `String`, `&str`, `char`           | string      |
//! | integer types                      | integer     |
//! | `f32`, `f64`                       | number      |
//! | `bool`                             | boolean     |
//! | `Vec<T>`, sets, arrays, tuples     | array       |
//! | `HashMap`, `BTreeMap`, `Map`       | object      |
//! | `Option<T>`                        | `T` or null, defaults to null |
//! | `serde_json::Value`, anything else | any         |
//!
//! - `#[default(expr)]` gives a parameter a default; `expr` goes through
//!   `serde_json::json!`.
//! - `#[variadic]` on a trailing `Vec<T>` collects surplus positional values.
//! - References (`&str`, `&[T]`, `&T`) are deserialized into an owned value
//!   and lent to the function.
//!
//! ## Return values
//!
//! - `Result<Reply, E>` is passed through, so the procedure controls status
//!   and headers.
//! - `Result<T, E>` with `T: Serialize` becomes a `200` reply.
//! - Any other `T: Serialize` (including `()`) is wrapped the same way.
//!
//! `E` must convert into `jrd_server::Error`.

mod procedure;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemFn};

/// Derive a `Procedure` factory from an async function
///
/// The generated function has the original name and visibility, takes no
/// arguments and returns `jrd_server::Result<jrd_server::Procedure>`. It
/// fails only if the derived signature is malformed.
///
/// # Examples
///
/// ```ignore
/// #[procedure]
/// async fn sum(first: f64, #[variadic] rest: Vec<f64>) -> Result<f64> {
///     Ok(first + rest.iter().sum::<f64>())
/// }
///
/// #[procedure]
/// async fn create(name: String) -> Result<Reply> {
///     Ok(Reply::new(name.into()).with_status(201))
/// }
/// ```
///
/// # Limitations
///
/// - Only `async fn` without generics
/// - Parameters must be plain identifiers
/// - Cannot use `self`
#[proc_macro_attribute]
pub fn procedure(attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = parse_macro_input!(item as ItemFn);
    procedure::expand(attr.into(), item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
