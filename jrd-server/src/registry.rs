//! Method registry
//!
//! Maps public method names (`"App.echo"`) to [`RegisteredMethod`] records.
//! The registry is filled once at startup and only read afterwards; clones
//! share the same `Arc`'d table, so handing it to the dispatcher costs
//! nothing and needs no locking.
//!
//! Registration composes the per-method [`AuthHook`] from the method's
//! [`AuthPolicy`], so a misconfigured policy fails at startup rather than
//! on the first call.
//!
//! # Examples
//!
//! ```rust
//! use jrd_server::{from_typed_fn, MethodOptions, MethodRegistry, ParamType, Procedure, Signature};
//! use serde_json::json;
//!
//! let echo = Procedure::new(
//!     Signature::builder()
//!         .param_with_default("name", ParamType::String, json!(""))
//!         .build()
//!         .unwrap(),
//!     from_typed_fn(|args| async move {
//!         let name: String = args.get("name")?;
//!         Ok(format!("Hello {}", name))
//!     }),
//! );
//!
//! let mut registry = MethodRegistry::new();
//! registry.register("App.echo", echo, MethodOptions::default()).unwrap();
//!
//! assert!(registry.contains("App.echo"));
//! assert_eq!(registry.methods(), vec!["App.echo".to_string()]);
//! ```

use crate::auth::{AuthBackend, AuthCheck, AuthHook, CredentialAuthBackend};
use crate::handler::Procedure;
use crate::signature::Signature;
use jrd_core::{Error, Result};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which authentication check, if any, guards a method
#[derive(Clone, Default)]
pub enum AuthPolicy {
    /// No authentication
    #[default]
    None,
    /// Use the registry's default check
    RegistryDefault,
    /// Use this check
    Check(Arc<dyn AuthCheck>),
}

impl fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthPolicy::None => f.write_str("None"),
            AuthPolicy::RegistryDefault => f.write_str("RegistryDefault"),
            AuthPolicy::Check(_) => f.write_str("Check(..)"),
        }
    }
}

/// Per-method registration options
#[derive(Debug, Clone)]
pub struct MethodOptions {
    /// Authentication policy
    pub auth: AuthPolicy,
    /// Whether the method may be called as a notification
    pub notification: bool,
    /// Whether supplied params are type-checked against the signature
    pub validate: bool,
}

impl Default for MethodOptions {
    fn default() -> Self {
        Self {
            auth: AuthPolicy::None,
            notification: true,
            validate: true,
        }
    }
}

impl MethodOptions {
    /// Default options: no auth, notifications allowed, strict validation
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard the method with a specific check
    pub fn authenticated(mut self, check: impl AuthCheck + 'static) -> Self {
        self.auth = AuthPolicy::Check(Arc::new(check));
        self
    }

    /// Guard the method with the registry's default check
    pub fn requires_auth(mut self) -> Self {
        self.auth = AuthPolicy::RegistryDefault;
        self
    }

    /// Allow or forbid notification-style calls
    pub fn notification(mut self, allowed: bool) -> Self {
        self.notification = allowed;
        self
    }

    /// Enable or disable strict type validation
    pub fn validate(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }
}

/// An immutable registry entry
pub struct RegisteredMethod {
    name: String,
    procedure: Procedure,
    auth: Option<AuthHook>,
    notification: bool,
    validate: bool,
}

impl RegisteredMethod {
    /// Public method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registered procedure
    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    /// The procedure's signature
    pub fn signature(&self) -> &Signature {
        self.procedure.signature()
    }

    /// Ordered parameter names
    pub fn param_order(&self) -> Vec<&str> {
        self.signature().param_order()
    }

    /// Parameter defaults
    pub fn defaults(&self) -> Map<String, Value> {
        self.signature().defaults()
    }

    /// The composed auth step, for authenticated methods
    pub fn auth_hook(&self) -> Option<&AuthHook> {
        self.auth.as_ref()
    }

    /// True when calls must carry credentials
    pub fn requires_auth(&self) -> bool {
        self.auth.is_some()
    }

    /// True when the method may be called as a notification
    pub fn notification(&self) -> bool {
        self.notification
    }

    /// True when supplied params are type-checked
    pub fn validate(&self) -> bool {
        self.validate
    }

    /// JSON description for introspection
    pub fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "params": self.signature().describe(),
            "requires_auth": self.requires_auth(),
            "notification": self.notification,
            "validate": self.validate,
        })
    }
}

impl fmt::Debug for RegisteredMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredMethod")
            .field("name", &self.name)
            .field("signature", self.signature())
            .field("requires_auth", &self.requires_auth())
            .field("notification", &self.notification)
            .field("validate", &self.validate)
            .finish()
    }
}

/// Name → method table shared by the dispatcher
#[derive(Clone)]
pub struct MethodRegistry {
    methods: Arc<HashMap<String, Arc<RegisteredMethod>>>,
    auth_check: Option<Arc<dyn AuthCheck>>,
    auth_backend: Arc<dyn AuthBackend>,
}

impl MethodRegistry {
    /// Create an empty registry using [`CredentialAuthBackend`]
    pub fn new() -> Self {
        Self {
            methods: Arc::new(HashMap::new()),
            auth_check: None,
            auth_backend: Arc::new(CredentialAuthBackend),
        }
    }

    /// Set the default check used by methods registered with `requires_auth()`
    pub fn with_auth_check(mut self, check: impl AuthCheck + 'static) -> Self {
        self.auth_check = Some(Arc::new(check));
        self
    }

    /// Replace the credential extraction policy
    pub fn with_auth_backend(mut self, backend: impl AuthBackend + 'static) -> Self {
        self.auth_backend = Arc::new(backend);
        self
    }

    /// True when a default auth check is configured
    pub fn has_auth_check(&self) -> bool {
        self.auth_check.is_some()
    }

    /// Register a procedure under a public name
    ///
    /// # Errors
    ///
    /// - `Error::DuplicateMethod` if the name is taken
    /// - `Error::Configuration` for an empty name, or for `requires_auth()`
    ///   without a default auth check
    pub fn register(
        &mut self,
        name: impl Into<String>,
        procedure: Procedure,
        options: MethodOptions,
    ) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Configuration(
                "method name must not be empty".to_string(),
            ));
        }
        if self.methods.contains_key(&name) {
            return Err(Error::DuplicateMethod(name));
        }

        let auth = match options.auth {
            AuthPolicy::None => None,
            AuthPolicy::Check(check) => Some(AuthHook::new(Arc::clone(&self.auth_backend), check)),
            AuthPolicy::RegistryDefault => {
                let check = self.auth_check.clone().ok_or_else(|| {
                    Error::Configuration(format!(
                        "method '{}' requires authentication but no auth check is configured",
                        name
                    ))
                })?;
                Some(AuthHook::new(Arc::clone(&self.auth_backend), check))
            }
        };

        let method = RegisteredMethod {
            name: name.clone(),
            procedure,
            auth,
            notification: options.notification,
            validate: options.validate,
        };

        tracing::debug!(
            method = %name,
            params = ?method.param_order(),
            requires_auth = method.requires_auth(),
            notification = method.notification,
            validate = method.validate,
            "Registered method"
        );

        Arc::make_mut(&mut self.methods).insert(name, Arc::new(method));
        Ok(())
    }

    /// Find a method by name
    ///
    /// # Errors
    ///
    /// `Error::MethodNotFound` if nothing is registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<Arc<RegisteredMethod>> {
        self.get(name)
            .ok_or_else(|| Error::MethodNotFound(name.to_string()))
    }

    /// Find a method by name, if registered
    pub fn get(&self, name: &str) -> Option<Arc<RegisteredMethod>> {
        self.methods.get(name).cloned()
    }

    /// Check if a method is registered
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// All registered method names, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    /// JSON description of one method
    pub fn describe(&self, name: &str) -> Option<Value> {
        self.methods.get(name).map(|m| m.describe())
    }

    /// Number of registered methods
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.methods())
            .field("has_auth_check", &self.has_auth_check())
            .finish()
    }
}
