//! Procedure signature descriptors
//!
//! Rust has no runtime introspection of closures, so a procedure's formal
//! parameters are described once, at registration time, by a [`Signature`]:
//! the ordered parameter names, which of them carry defaults, an optional
//! trailing variadic slot and a [`ParamType`] tag per parameter. The
//! `#[procedure]` macro derives the same descriptor from an `async fn`.
//!
//! `SignatureBuilder::build` is the inspector: it rejects descriptors that
//! would make binding ambiguous.
//!
//! # Examples
//!
//! ```rust
//! use jrd_server::{ParamType, Signature};
//! use serde_json::json;
//!
//! let signature = Signature::builder()
//!     .param("string", ParamType::String)
//!     .param("omg", ParamType::Object)
//!     .param_with_default("yeswai", ParamType::String, json!("Default"))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(signature.param_order(), vec!["string", "omg", "yeswai"]);
//! assert_eq!(signature.required_count(), 2);
//! ```

use jrd_core::{Error, Result};
use serde_json::{json, Map, Value};
use std::fmt;

/// Declared type of a parameter, used for optional strict validation
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    /// Anything, including `null`
    Any,
    /// Only `null`
    Null,
    /// A JSON string
    String,
    /// A JSON number without fractional part
    Integer,
    /// Any JSON number
    Number,
    /// `true` or `false`
    Boolean,
    /// A JSON array
    Array,
    /// A JSON object
    Object,
    /// The inner type or `null`
    Optional(Box<ParamType>),
    /// Any of the listed types
    Union(Vec<ParamType>),
}

impl ParamType {
    /// Shorthand for `ParamType::Optional(Box::new(inner))`
    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }

    /// Shorthand for a union of types
    pub fn union(types: impl IntoIterator<Item = ParamType>) -> Self {
        ParamType::Union(types.into_iter().collect())
    }

    /// Check whether a value conforms to this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::Any => true,
            ParamType::Null => value.is_null(),
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Optional(inner) => value.is_null() || inner.accepts(value),
            ParamType::Union(types) => types.iter().any(|t| t.accepts(value)),
        }
    }

    /// Human-readable description, e.g. `"integer | number"`
    pub fn describe(&self) -> String {
        match self {
            ParamType::Any => "any".to_string(),
            ParamType::Null => "null".to_string(),
            ParamType::String => "string".to_string(),
            ParamType::Integer => "integer".to_string(),
            ParamType::Number => "number".to_string(),
            ParamType::Boolean => "boolean".to_string(),
            ParamType::Array => "array".to_string(),
            ParamType::Object => "object".to_string(),
            ParamType::Optional(inner) => format!("{} | null", inner.describe()),
            ParamType::Union(types) => types
                .iter()
                .map(ParamType::describe)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// How a parameter is satisfied when the caller omits it
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// Must be supplied
    Required,
    /// Falls back to this value
    Defaulted(Value),
    /// Trailing catch-all; collects surplus positional values into an array
    Variadic,
}

/// One formal parameter of a procedure
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    name: String,
    ty: ParamType,
    kind: ParamKind,
}

impl ParamSpec {
    /// Parameter name as used for named binding
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type; for a variadic slot, the type of each element
    pub fn ty(&self) -> &ParamType {
        &self.ty
    }

    /// How the parameter is satisfied
    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    /// Default value, if any
    pub fn default(&self) -> Option<&Value> {
        match &self.kind {
            ParamKind::Defaulted(value) => Some(value),
            _ => None,
        }
    }

    /// True when the caller must supply this parameter
    pub fn is_required(&self) -> bool {
        matches!(self.kind, ParamKind::Required)
    }

    /// True for the trailing variadic slot
    pub fn is_variadic(&self) -> bool {
        matches!(self.kind, ParamKind::Variadic)
    }
}

/// Immutable description of a procedure's formal parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    params: Vec<ParamSpec>,
}

impl Signature {
    /// Start describing a signature
    pub fn builder() -> SignatureBuilder {
        SignatureBuilder::default()
    }

    /// Signature of a procedure without parameters
    pub fn empty() -> Self {
        Self::default()
    }

    /// All parameters in declaration order
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Ordered parameter names (`paramOrder`)
    pub fn param_order(&self) -> Vec<&str> {
        self.params.iter().map(ParamSpec::name).collect()
    }

    /// Parameter-name → default-value mapping (`defaults`)
    pub fn defaults(&self) -> Map<String, Value> {
        self.params
            .iter()
            .filter_map(|p| p.default().map(|d| (p.name.clone(), d.clone())))
            .collect()
    }

    /// Declared arity, counting the variadic slot once
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Number of parameters that must be supplied
    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| p.is_required()).count()
    }

    /// Parameters that bind one positional value each (everything but the variadic slot)
    pub fn fixed_params(&self) -> &[ParamSpec] {
        match self.params.last() {
            Some(last) if last.is_variadic() => &self.params[..self.params.len() - 1],
            _ => &self.params,
        }
    }

    /// The trailing variadic slot, if declared
    pub fn variadic(&self) -> Option<&ParamSpec> {
        self.params.last().filter(|p| p.is_variadic())
    }

    /// Look a parameter up by name
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// JSON description used for method introspection
    pub fn describe(&self) -> Value {
        Value::Array(
            self.params
                .iter()
                .map(|p| {
                    let mut entry = json!({
                        "name": p.name,
                        "type": p.ty.describe(),
                        "required": p.is_required(),
                    });
                    if let Some(default) = p.default() {
                        entry["default"] = default.clone();
                    }
                    if p.is_variadic() {
                        entry["variadic"] = Value::Bool(true);
                    }
                    entry
                })
                .collect(),
        )
    }
}

/// Builder for [`Signature`]
#[derive(Debug, Default)]
pub struct SignatureBuilder {
    params: Vec<ParamSpec>,
}

impl SignatureBuilder {
    /// Add a required parameter
    pub fn param(self, name: impl Into<String>, ty: ParamType) -> Self {
        self.push(name, ty, ParamKind::Required)
    }

    /// Add a parameter with a default value
    pub fn param_with_default(self, name: impl Into<String>, ty: ParamType, default: Value) -> Self {
        self.push(name, ty, ParamKind::Defaulted(default))
    }

    /// Add a nullable parameter defaulting to `null`
    pub fn optional(self, name: impl Into<String>, ty: ParamType) -> Self {
        let ty = match ty {
            ParamType::Optional(_) | ParamType::Any | ParamType::Null => ty,
            other => ParamType::optional(other),
        };
        self.push(name, ty, ParamKind::Defaulted(Value::Null))
    }

    /// Add the trailing variadic slot; `element` is the type of each collected value
    pub fn variadic(self, name: impl Into<String>, element: ParamType) -> Self {
        self.push(name, element, ParamKind::Variadic)
    }

    fn push(mut self, name: impl Into<String>, ty: ParamType, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            ty,
            kind,
        });
        self
    }

    /// Validate and freeze the descriptor
    ///
    /// # Errors
    ///
    /// Returns `Error::Signature` when:
    /// - a parameter name is empty or declared twice
    /// - a required parameter follows a defaulted one
    /// - the variadic slot is not the last parameter
    pub fn build(self) -> Result<Signature> {
        let mut seen_default: Option<&str> = None;

        for (index, param) in self.params.iter().enumerate() {
            if param.name.is_empty() {
                return Err(Error::Signature(format!(
                    "parameter #{} has an empty name",
                    index
                )));
            }
            if self.params[..index].iter().any(|p| p.name == param.name) {
                return Err(Error::Signature(format!(
                    "parameter '{}' is declared more than once",
                    param.name
                )));
            }
            match &param.kind {
                ParamKind::Required => {
                    if let Some(defaulted) = seen_default {
                        return Err(Error::Signature(format!(
                            "required parameter '{}' follows defaulted parameter '{}'",
                            param.name, defaulted
                        )));
                    }
                }
                ParamKind::Defaulted(_) => seen_default = Some(param.name.as_str()),
                ParamKind::Variadic => {
                    if index + 1 != self.params.len() {
                        return Err(Error::Signature(format!(
                            "variadic parameter '{}' must be the last parameter",
                            param.name
                        )));
                    }
                }
            }
        }

        Ok(Signature {
            params: self.params,
        })
    }
}
