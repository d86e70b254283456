//! Authenticated methods with a custom auth backend
//!
//! `App.index` and `App.echo` accept credentials the default way, as the
//! first two positional params or as `username`/`password`:
//!
//! ```text
//! curl -s -X POST http://127.0.0.1:5001/api \
//!   -d '{"jsonrpc":"2.0","method":"App.echo","params":["username","secret","World"],"id":1}'
//! ```
//!
//! `Admin.stats` lives on a second endpoint whose registry uses
//! [`ApiKeyBackend`]: a single `api_key` of the form `user:password`.

use async_trait::async_trait;
use jrd::{procedure, Error, JrdServer, MethodOptions, Params, Result};
use jrd_server::{http, AuthBackend, AuthCheck, MethodRegistry, ServerBuilder};
use serde_json::{json, Value};
use std::sync::Arc;

#[procedure]
async fn index() -> &'static str {
    "Welcome to JSON-RPC"
}

#[procedure]
async fn echo(#[default("")] name: &str) -> Result<String> {
    Ok(format!("Hello {}", name))
}

#[procedure]
async fn stats() -> Value {
    json!({"uptime": "forever"})
}

fn check_auth(username: &str, password: &str) -> bool {
    username == "username" && password == "secret"
}

/// Reads credentials from one `user:password` string
struct ApiKeyBackend;

#[async_trait]
impl AuthBackend for ApiKeyBackend {
    async fn authenticate(&self, params: Params, check: &dyn AuthCheck) -> Result<Params> {
        let (key, rest) = match params {
            Params::Positional(mut items) if !items.is_empty() => {
                let key = items.remove(0);
                (key, Params::Positional(items))
            }
            Params::Named(mut map) => match map.remove("api_key") {
                Some(key) => (key, Params::Named(map)),
                None => return Err(Error::InvalidParams("missing api_key".into())),
            },
            _ => return Err(Error::InvalidParams("missing api_key".into())),
        };

        let key = key
            .as_str()
            .ok_or_else(|| Error::InvalidParams("api_key must be a string".into()))?;
        let (user, password) = key
            .split_once(':')
            .ok_or_else(|| Error::InvalidParams("api_key must look like user:password".into()))?;

        if check.check(user, password).await {
            Ok(rest)
        } else {
            tracing::warn!(user, "Rejected api key");
            Err(Error::InvalidCredentials)
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let server = JrdServer::builder()
        .bind_str("127.0.0.1:5001")?
        .method("App.index", index()?, MethodOptions::new().authenticated(check_auth))
        .method("App.echo", echo()?, MethodOptions::new().authenticated(check_auth))
        .build()
        .await?;

    let mut admin = MethodRegistry::new()
        .with_auth_backend(ApiKeyBackend)
        .with_auth_check(check_auth);
    admin.register("Admin.stats", stats()?, MethodOptions::new().requires_auth())?;
    let admin = ServerBuilder::new().registry(admin).build_dispatcher()?;

    println!("Credentials endpoint: {}", server.url());
    println!("Api key endpoint:     http://127.0.0.1:5002/admin");

    let admin_routes = http::routes(Arc::new(admin), "/admin");
    tokio::select! {
        _ = server.run() => {}
        _ = warp::serve(admin_routes).run(([127, 0, 0, 1], 5002)) => {}
        _ = tokio::signal::ctrl_c() => println!("\nShutting down"),
    }

    Ok(())
}
