//! Authentication hook
//!
//! Methods registered with an auth policy get an [`AuthHook`] composed in
//! front of their parameter binding. The hook pulls credentials off the raw
//! wire params, asks the application's [`AuthCheck`] whether they are
//! valid, and hands the remaining params to the binder. Procedures never
//! see the credentials.
//!
//! The extraction policy is pluggable through [`AuthBackend`]; the default
//! [`CredentialAuthBackend`] accepts:
//!
//! - positional: `[username, password, ...rest]`, binder receives `rest`
//! - named: `{"username": .., "password": .., ...rest}`, binder receives `rest`
//!
//! # Examples
//!
//! ```rust
//! use jrd_server::{AuthHook, CredentialAuthBackend};
//! use jrd_core::Params;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hook = AuthHook::new(
//!     Arc::new(CredentialAuthBackend),
//!     Arc::new(|user: &str, pass: &str| user == "username" && pass == "secret"),
//! );
//!
//! let params = Params::Positional(vec![json!("username"), json!("secret"), json!("World")]);
//! let rest = hook.apply(params).await.unwrap();
//! assert_eq!(rest, Params::Positional(vec![json!("World")]));
//! # }
//! ```

use async_trait::async_trait;
use jrd_core::{value_type_name, Error, Params, Result};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

const CREDENTIALS_REQUIRED: &str =
    "Authenticated methods require at least [username, password] or {username, password} arguments";

/// Decides whether a username/password pair is valid
///
/// Implemented for any `Fn(&str, &str) -> bool`, so a plain closure works.
/// Implement it directly when the check needs to await, e.g. a database
/// lookup.
#[async_trait]
pub trait AuthCheck: Send + Sync {
    /// Return true to let the call through
    async fn check(&self, username: &str, password: &str) -> bool;
}

#[async_trait]
impl<F> AuthCheck for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    async fn check(&self, username: &str, password: &str) -> bool {
        self(username, password)
    }
}

/// Strategy that authenticates a call from its raw wire params
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Authenticate and return the params left for the procedure
    ///
    /// # Errors
    ///
    /// `Error::InvalidParams` for a malformed credential shape and
    /// `Error::InvalidCredentials` when `check` rejects the caller.
    async fn authenticate(&self, params: Params, check: &dyn AuthCheck) -> Result<Params>;
}

/// Credentials taken from the front of the params
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Caller's username
    pub username: String,
    /// Caller's password
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    /// Split credentials off the params
    ///
    /// # Errors
    ///
    /// `Error::InvalidParams` when fewer than two positional values are
    /// present, when a named call lacks either key, or when either value is
    /// not a string.
    pub fn extract(params: Params) -> Result<(Credentials, Params)> {
        match params {
            Params::Positional(mut items) if items.len() >= 2 => {
                let rest = items.split_off(2);
                let password = items.pop().unwrap_or(Value::Null);
                let username = items.pop().unwrap_or(Value::Null);
                let credentials = Self::from_values(username, password)?;
                Ok((credentials, Params::Positional(rest)))
            }
            Params::Named(mut map) if map.contains_key("username") && map.contains_key("password") => {
                let username = map.remove("username").unwrap_or(Value::Null);
                let password = map.remove("password").unwrap_or(Value::Null);
                let credentials = Self::from_values(username, password)?;
                Ok((credentials, Params::Named(map)))
            }
            _ => Err(Error::InvalidParams(CREDENTIALS_REQUIRED.to_string())),
        }
    }

    fn from_values(username: Value, password: Value) -> Result<Self> {
        match (username, password) {
            (Value::String(username), Value::String(password)) => Ok(Self { username, password }),
            (username, password) => Err(Error::InvalidParams(format!(
                "username and password must be strings, got {} and {}",
                value_type_name(&username),
                value_type_name(&password)
            ))),
        }
    }
}

/// Default credential policy: username and password at the front of the params
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialAuthBackend;

#[async_trait]
impl AuthBackend for CredentialAuthBackend {
    async fn authenticate(&self, params: Params, check: &dyn AuthCheck) -> Result<Params> {
        let (credentials, rest) = Credentials::extract(params)?;

        if check.check(&credentials.username, &credentials.password).await {
            tracing::debug!(username = %credentials.username, "Caller authenticated");
            Ok(rest)
        } else {
            tracing::warn!(username = %credentials.username, "Authentication rejected");
            Err(Error::InvalidCredentials)
        }
    }
}

/// The auth step composed in front of one method's binding
#[derive(Clone)]
pub struct AuthHook {
    backend: Arc<dyn AuthBackend>,
    check: Arc<dyn AuthCheck>,
}

impl AuthHook {
    /// Compose a backend with the check it should consult
    pub fn new(backend: Arc<dyn AuthBackend>, check: Arc<dyn AuthCheck>) -> Self {
        Self { backend, check }
    }

    /// Authenticate the call and return the params left for the binder
    pub async fn apply(&self, params: Params) -> Result<Params> {
        self.backend.authenticate(params, self.check.as_ref()).await
    }
}

impl fmt::Debug for AuthHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHook").finish_non_exhaustive()
    }
}
