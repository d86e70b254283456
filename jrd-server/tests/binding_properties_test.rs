//! Binding properties checked through the dispatcher

use jrd_core::{Id, JsonRpcRequest};
use jrd_server::{
    from_typed_fn, Dispatcher, Error, MethodOptions, MethodRegistry, ParamType, Procedure,
    Signature, Stage,
};
use serde_json::{json, Value};

/// `f(a, b, c = 3, d = 4)` returning its bound arguments as an array
fn four_params() -> Procedure {
    Procedure::new(
        Signature::builder()
            .param("a", ParamType::Integer)
            .param("b", ParamType::Integer)
            .param_with_default("c", ParamType::Integer, json!(3))
            .param_with_default("d", ParamType::Integer, json!(4))
            .build()
            .unwrap(),
        from_typed_fn(|args| async move { Ok(Value::Array(args.into_values())) }),
    )
}

fn dispatcher() -> Dispatcher {
    let mut registry = MethodRegistry::new();
    registry
        .register("f", four_params(), MethodOptions::default())
        .unwrap();
    registry
        .register(
            "sum",
            Procedure::new(
                Signature::builder()
                    .param("first", ParamType::Number)
                    .variadic("rest", ParamType::Number)
                    .build()
                    .unwrap(),
                from_typed_fn(|args| async move {
                    let first: f64 = args.get("first")?;
                    let rest: Vec<f64> = args.get("rest")?;
                    Ok(first + rest.iter().sum::<f64>())
                }),
            ),
            MethodOptions::default(),
        )
        .unwrap();
    Dispatcher::new(registry)
}

async fn call(dispatcher: &Dispatcher, method: &str, params: Value, id: i64) -> jrd_server::Dispatched {
    dispatcher
        .dispatch(JsonRpcRequest::new(method, Some(params), Id::from(id)))
        .await
}

fn result(dispatched: jrd_server::Dispatched) -> Value {
    match dispatched.outcome {
        jrd_server::DispatchOutcome::Success(reply) => reply.value,
        jrd_server::DispatchOutcome::Failure { error, stage } => {
            panic!("expected success, got {} at {}", error, stage)
        }
    }
}

#[tokio::test]
async fn test_arity_window() {
    let dispatcher = dispatcher();

    for n in 0..2 {
        let params = Value::Array((1..=n).map(Value::from).collect());
        let dispatched = call(&dispatcher, "f", params, n).await;
        let error = dispatched.error().cloned();
        assert!(matches!(error, Some(Error::InvalidParams(_))), "n = {}", n);
        assert!(matches!(
            dispatched.outcome,
            jrd_server::DispatchOutcome::Failure { stage: Stage::Bind, .. }
        ));
    }

    for n in 2..=4 {
        let params = Value::Array((1..=n).map(Value::from).collect());
        let dispatched = call(&dispatcher, "f", params, n).await;
        assert!(dispatched.is_success(), "n = {}", n);
    }

    let dispatched = call(&dispatcher, "f", json!([1, 2, 3, 4, 5]), 5).await;
    assert!(matches!(dispatched.error(), Some(Error::InvalidParams(_))));
}

#[tokio::test]
async fn test_named_and_positional_bind_identically() {
    let dispatcher = dispatcher();

    let positional = result(call(&dispatcher, "f", json!([10, 20, 30]), 1).await);
    let named = result(call(&dispatcher, "f", json!({"b": 20, "c": 30, "a": 10}), 2).await);

    assert_eq!(positional, json!([10, 20, 30, 4]));
    assert_eq!(positional, named);
}

#[tokio::test]
async fn test_id_is_echoed_on_every_path() {
    let dispatcher = dispatcher();

    for (method, params) in [
        ("f", json!([1, 2])),
        ("f", json!([1])),
        ("f", json!({"a": 1, "b": 2, "zzz": 0})),
        ("missing", json!([])),
        ("f", json!(["one", 2])),
    ] {
        let dispatched = call(&dispatcher, method, params, 42).await;
        assert_eq!(dispatched.id, Some(Id::from(42i64)));
        assert!(!dispatched.notification);
    }
}

#[tokio::test]
async fn test_type_mismatch_names_parameter() {
    let dispatcher = dispatcher();
    let dispatched = call(&dispatcher, "f", json!(["one", 2]), 1).await;

    match dispatched.error() {
        Some(Error::ParamType { param, .. }) => assert_eq!(param, "a"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_variadic_collects_surplus() {
    let dispatcher = dispatcher();

    assert_eq!(result(call(&dispatcher, "sum", json!([1, 2, 3.5]), 1).await), json!(6.5));
    assert_eq!(result(call(&dispatcher, "sum", json!([1]), 2).await), json!(1.0));
    assert_eq!(
        result(call(&dispatcher, "sum", json!({"first": 1, "rest": [2]}), 3).await),
        json!(3.0)
    );

    let dispatched = call(&dispatcher, "sum", json!([1, "x"]), 4).await;
    match dispatched.error() {
        Some(Error::ParamType { param, .. }) => assert_eq!(param, "rest[0]"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_scalar_params_are_invalid_request() {
    let dispatcher = dispatcher();
    let dispatched = call(&dispatcher, "f", json!(5), 1).await;
    assert!(matches!(dispatched.error(), Some(Error::InvalidRequest(_))));
}
