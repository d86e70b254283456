//! Parameter binding
//!
//! Maps the wire [`Params`] of a request onto a procedure's [`Signature`],
//! producing [`BoundArgs`]: one value per declared parameter, in declaration
//! order, with defaults filled in.
//!
//! # Rules
//!
//! - **Absent**: treated as an empty positional list
//! - **Positional**: the i-th value binds the i-th parameter; surplus values
//!   go to the variadic slot, or are rejected when there is none
//! - **Named**: keys bind parameters by name; unknown keys are rejected
//! - Missing parameters take their default, otherwise binding fails listing
//!   every missing name
//!
//! When strict validation is on, every value the caller supplied is checked
//! against its declared [`ParamType`](crate::ParamType). Defaults are never
//! checked, so `Option`-style parameters may default to `null`.

use crate::signature::{ParamSpec, Signature};
use jrd_core::{value_type_name, Error, Params, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Arguments bound to a procedure's declared parameters
///
/// The variadic slot, when declared, is bound to a JSON array.
///
/// # Examples
///
/// ```rust
/// use jrd_server::{bind, ParamType, Signature};
/// use jrd_core::Params;
/// use serde_json::json;
///
/// let signature = Signature::builder()
///     .param("a", ParamType::Integer)
///     .param_with_default("b", ParamType::Integer, json!(10))
///     .build()
///     .unwrap();
///
/// let args = bind(&signature, Params::Positional(vec![json!(1)]), true).unwrap();
/// assert_eq!(args.get::<i64>("a").unwrap(), 1);
/// assert_eq!(args.get::<i64>("b").unwrap(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundArgs {
    values: Vec<(String, Value)>,
}

impl BoundArgs {
    /// Deserialize the argument bound to `name`
    ///
    /// # Errors
    ///
    /// `Error::InvalidParams` when no such parameter was bound or when the
    /// value does not deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .value(name)
            .ok_or_else(|| Error::InvalidParams(format!("no parameter named '{}'", name)))?;
        serde_json::from_value(value.clone())
            .map_err(|e| Error::InvalidParams(format!("parameter '{}': {}", name, e)))
    }

    /// Like [`get`](Self::get), but `None` when the value is `null`
    pub fn get_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.value(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get(name).map(Some),
        }
    }

    /// Raw value bound to `name`
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Iterate over `(name, value)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of bound parameters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for procedures without parameters
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in declaration order
    pub fn into_values(self) -> Vec<Value> {
        self.values.into_iter().map(|(_, v)| v).collect()
    }

    /// Arguments as a name → value object
    pub fn to_named(&self) -> Map<String, Value> {
        self.values.iter().cloned().collect()
    }
}

/// Bind wire params onto a signature
///
/// With `validate` off, type checks are skipped but the shape rules (arity,
/// unknown names, missing parameters) still apply.
///
/// # Errors
///
/// - `Error::InvalidParams` for too many positional values, unknown names,
///   missing required parameters or a non-array variadic value
/// - `Error::ParamType` for a type mismatch under strict validation
pub fn bind(signature: &Signature, params: Params, validate: bool) -> Result<BoundArgs> {
    let values = match params {
        Params::Absent => bind_positional(signature, Vec::new(), validate)?,
        Params::Positional(items) => bind_positional(signature, items, validate)?,
        Params::Named(map) => bind_named(signature, map, validate)?,
    };
    Ok(BoundArgs { values })
}

fn bind_positional(
    signature: &Signature,
    items: Vec<Value>,
    validate: bool,
) -> Result<Vec<(String, Value)>> {
    let fixed = signature.fixed_params();
    let variadic = signature.variadic();

    if variadic.is_none() && items.len() > fixed.len() {
        return Err(Error::InvalidParams(format!(
            "expected at most {} positional params, got {}",
            fixed.len(),
            items.len()
        )));
    }

    let mut supplied = items.into_iter();
    let mut values = Vec::with_capacity(signature.arity());
    let mut missing = Vec::new();

    for spec in fixed {
        match supplied.next() {
            Some(value) => {
                if validate {
                    check_type(spec, spec.name(), &value)?;
                }
                values.push((spec.name().to_string(), value));
            }
            None => match spec.default() {
                Some(default) => values.push((spec.name().to_string(), default.clone())),
                None => missing.push(spec.name()),
            },
        }
    }

    if !missing.is_empty() {
        return Err(missing_error(&missing));
    }

    if let Some(spec) = variadic {
        let rest: Vec<Value> = supplied.collect();
        if validate {
            check_elements(spec, &rest)?;
        }
        values.push((spec.name().to_string(), Value::Array(rest)));
    }

    Ok(values)
}

fn bind_named(
    signature: &Signature,
    mut map: Map<String, Value>,
    validate: bool,
) -> Result<Vec<(String, Value)>> {
    let mut unknown: Vec<&str> = map
        .keys()
        .filter(|key| signature.get(key).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(Error::InvalidParams(format!(
            "unexpected parameter(s): {}",
            unknown.join(", ")
        )));
    }

    let mut values = Vec::with_capacity(signature.arity());
    let mut missing = Vec::new();

    for spec in signature.params() {
        let name = spec.name();

        if spec.is_variadic() {
            let rest = match map.remove(name) {
                None => Vec::new(),
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(Error::InvalidParams(format!(
                        "parameter '{}' collects extra values and must be an array, got {}",
                        name,
                        value_type_name(&other)
                    )))
                }
            };
            if validate {
                check_elements(spec, &rest)?;
            }
            values.push((name.to_string(), Value::Array(rest)));
            continue;
        }

        match map.remove(name) {
            Some(value) => {
                if validate {
                    check_type(spec, name, &value)?;
                }
                values.push((name.to_string(), value));
            }
            None => match spec.default() {
                Some(default) => values.push((name.to_string(), default.clone())),
                None => missing.push(name),
            },
        }
    }

    if !missing.is_empty() {
        return Err(missing_error(&missing));
    }

    Ok(values)
}

fn check_type(spec: &ParamSpec, label: &str, value: &Value) -> Result<()> {
    if spec.ty().accepts(value) {
        Ok(())
    } else {
        Err(Error::ParamType {
            param: label.to_string(),
            expected: spec.ty().describe(),
            actual: value_type_name(value).to_string(),
        })
    }
}

fn check_elements(spec: &ParamSpec, items: &[Value]) -> Result<()> {
    for (index, item) in items.iter().enumerate() {
        check_type(spec, &format!("{}[{}]", spec.name(), index), item)?;
    }
    Ok(())
}

fn missing_error(missing: &[&str]) -> Error {
    Error::InvalidParams(format!(
        "missing required parameter(s): {}",
        missing.join(", ")
    ))
}
