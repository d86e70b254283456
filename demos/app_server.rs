//! Test application server
//!
//! Serves the methods the end-to-end scenarios exercise:
//!
//! ```text
//! curl -s -X POST http://127.0.0.1:5000/api \
//!   -d '{"jsonrpc":"2.0","method":"App.echo","params":["World"],"id":1}'
//! ```

use jrd::{procedure, Error, JrdServer, MethodOptions, Reply, Result};
use jrd_server::{
    from_fn, from_typed_fn, MetricsMiddleware, ParamType, Procedure, Signature, TracingMiddleware,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[procedure]
async fn greeting(#[default("JSON-RPC")] name: &str) -> Result<String> {
    Ok(format!("Hello {}", name))
}

#[procedure]
async fn echo(string: String, #[default(null)] _some: Value) -> Result<String> {
    Ok(string)
}

#[procedure]
async fn notify(_string: Option<String>) {}

#[procedure]
async fn not_allow_notify(_string: Option<String>) -> &'static str {
    "Not allow notify"
}

#[procedure]
async fn fails(n: i64) -> Result<i64> {
    if n % 2 == 0 {
        Ok(n)
    } else {
        Err(Error::application("number is odd"))
    }
}

#[procedure]
async fn strange_echo(
    string: String,
    omg: HashMap<String, Value>,
    wtf: Vec<String>,
    nowai: i64,
    #[default("Default")] yeswai: String,
) -> Vec<Value> {
    vec![json!(string), json!(omg), json!(wtf), json!(nowai), json!(yeswai)]
}

#[procedure]
async fn return_status_code_and_headers(s: &str) -> Result<Reply> {
    Ok(Reply::new(format!("Status Code and Headers {}", s).into())
        .with_status(400)
        .with_header("X-JSONRPC", "1"))
}

/// Counter shared by the `App.*` methods
#[derive(Default)]
struct App {
    calls: AtomicU64,
}

impl App {
    fn index(app: &Arc<Self>) -> Result<Procedure> {
        let app = Arc::clone(app);
        Ok(Procedure::new(
            Signature::builder()
                .param_with_default("name", ParamType::String, json!("JSON-RPC"))
                .build()?,
            from_typed_fn(move |args| {
                let app = Arc::clone(&app);
                async move {
                    let calls = app.calls.fetch_add(1, Ordering::Relaxed) + 1;
                    let name: String = args.get("name")?;
                    Ok(json!({"message": format!("Hello {}", name), "calls": calls}))
                }
            }),
        ))
    }

    fn sum(&self) -> Result<Procedure> {
        let number = ParamType::union([ParamType::Integer, ParamType::Number]);
        Ok(Procedure::new(
            Signature::builder()
                .param("a", number.clone())
                .param("b", number)
                .build()?,
            from_fn(|args| async move {
                let a: f64 = args.get("a")?;
                let b: f64 = args.get("b")?;
                Ok(Reply::new(json!(a + b)))
            }),
        ))
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jrd_server=debug".into()),
        )
        .init();

    let app = Arc::new(App::default());
    let metrics = Arc::new(MetricsMiddleware::new());

    let server = JrdServer::builder()
        .bind_str("127.0.0.1:5000")?
        .path("/api")
        .use_middleware(Arc::new(TracingMiddleware::new()))
        .use_middleware(metrics.clone())
        .with_metrics()
        .service_name("app-server")
        .method("jsonrpc.greeting", greeting()?, MethodOptions::default())
        .method("jsonrpc.echo", echo()?, MethodOptions::default())
        .method("jsonrpc.notify", notify()?, MethodOptions::default())
        .method(
            "jsonrpc.not_allow_notify",
            not_allow_notify()?,
            MethodOptions::new().notification(false),
        )
        .method("jsonrpc.fails", fails()?, MethodOptions::default())
        .method("jsonrpc.strangeEcho", strange_echo()?, MethodOptions::default())
        .method(
            "jsonrpc.returnStatusCodeAndHeaders",
            return_status_code_and_headers()?,
            MethodOptions::default(),
        )
        .method(
            "jsonrpc.not_validate",
            echo()?,
            MethodOptions::new().validate(false),
        )
        .method("App.echo", greeting()?, MethodOptions::default())
        .method("App.index", App::index(&app)?, MethodOptions::default())
        .method("jsonrpc.sum", app.sum()?, MethodOptions::default())
        .build()
        .await?;

    println!("Serving JSON-RPC on {}", server.url());
    for name in server.dispatcher().registry().methods() {
        println!("  - {}", name);
    }
    println!("\nPress Ctrl+C to stop");

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down after {} calls", metrics.request_count());
        }
    }

    Ok(())
}
