use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use uuid::Uuid;

use layerstack::{
    ArgDescriptor, BindingStatus, BoundArgs, EngineConfig, JsonModelAdapter, LayerContext,
    LayerDefinition, LayerImpl, LayerRegistry, LayerResult, LayerStackError,
    ModelAdapter, ModelFreeLayer, ModelLayer, RunState, Stack, StackCodec, StackRunner,
    ValidationErrorKind, ValueParser,
};

struct Announce;

#[async_trait]
impl ModelFreeLayer for Announce {
    async fn apply(&self, ctx: &LayerContext, _args: &BoundArgs) -> LayerResult<bool> {
        ctx.info("starting");
        Ok(true)
    }
}

#[derive(Default)]
struct Calls {
    double: AtomicUsize,
    require_even: AtomicUsize,
    check: AtomicUsize,
}

impl Calls {
    fn applies(&self) -> usize {
        self.double.load(Ordering::SeqCst) + self.require_even.load(Ordering::SeqCst)
    }
}

/// Accepts `{"value": <number>}` models, optionally only even ones.
struct ValueAdapter {
    calls: Arc<Calls>,
    even_only: bool,
}

#[async_trait]
impl ModelAdapter<Value> for ValueAdapter {
    fn check_model_type(&self, model: &Value) -> bool {
        self.calls.check.fetch_add(1, Ordering::SeqCst);
        match model.get("value") {
            Some(value) if self.even_only => value.as_i64().map_or(false, |v| v % 2 == 0),
            Some(value) => value.is_number(),
            None => false,
        }
    }

    async fn load_model(&self, path: &std::path::Path) -> LayerResult<Value> {
        JsonModelAdapter::new().load_model(path).await
    }

    async fn save_model(&self, model: &Value, path: &std::path::Path) -> LayerResult<()> {
        JsonModelAdapter::new().save_model(model, path).await
    }
}

struct Double {
    calls: Arc<Calls>,
}

#[async_trait]
impl ModelLayer<Value> for Double {
    fn adapter(&self) -> Arc<dyn ModelAdapter<Value>> {
        Arc::new(ValueAdapter {
            calls: self.calls.clone(),
            even_only: false,
        })
    }

    async fn apply(&self, ctx: &LayerContext, model: &mut Value, args: &BoundArgs) -> LayerResult<()> {
        self.calls.double.fetch_add(1, Ordering::SeqCst);
        let multiplier: f64 = args.get_as("multiplier")?;
        let value = model["value"].as_f64().unwrap_or_default() * multiplier;
        ctx.info(format!("value is now {}", value));
        model["value"] = json!(value as i64);
        Ok(())
    }
}

/// The evenness rule lives in the adapter's type check.
struct RequireEven {
    calls: Arc<Calls>,
}

#[async_trait]
impl ModelLayer<Value> for RequireEven {
    fn adapter(&self) -> Arc<dyn ModelAdapter<Value>> {
        Arc::new(ValueAdapter {
            calls: self.calls.clone(),
            even_only: true,
        })
    }

    async fn apply(&self, ctx: &LayerContext, model: &mut Value, _args: &BoundArgs) -> LayerResult<()> {
        self.calls.require_even.fetch_add(1, Ordering::SeqCst);
        ctx.info(format!("{} is even", model["value"]));
        Ok(())
    }
}

struct Fixture {
    registry: Arc<LayerRegistry<Value>>,
    a: Arc<LayerDefinition>,
    b: Arc<LayerDefinition>,
    c: Arc<LayerDefinition>,
    calls: Arc<Calls>,
}

fn fixture() -> Fixture {
    let calls = Arc::new(Calls::default());
    let a = LayerDefinition::builder("Announce", Uuid::new_v4(), "0.1.0")
        .build()
        .unwrap();
    let b = LayerDefinition::builder("Double Value", Uuid::new_v4(), "0.1.0")
        .model_layer()
        .kwarg(ArgDescriptor::keyword("multiplier", json!(2)).parser(ValueParser::Float))
        .build()
        .unwrap();
    let c = LayerDefinition::builder("Require Even", Uuid::new_v4(), "0.1.0")
        .model_layer()
        .build()
        .unwrap();
    let registry = LayerRegistry::builder()
        .layer(a.clone(), LayerImpl::model_free(Announce))
        .layer(b.clone(), LayerImpl::model(Double { calls: calls.clone() }))
        .layer(c.clone(), LayerImpl::model(RequireEven { calls: calls.clone() }))
        .build()
        .unwrap();
    Fixture {
        registry: Arc::new(registry),
        a: a.into_shared(),
        b: b.into_shared(),
        c: c.into_shared(),
        calls,
    }
}

fn abc_stack(fx: &Fixture) -> Stack {
    let mut stack = Stack::new("Even Doubling");
    stack.push(fx.a.clone());
    stack.push(fx.b.clone());
    stack.push(fx.c.clone());
    stack
}

#[tokio::test]
async fn test_announce_double_require_even() {
    let fx = fixture();
    let dir = tempfile::tempdir().unwrap();
    let report = StackRunner::builder(abc_stack(&fx), fx.registry.clone())
        .model(json!({"value": 5}))
        .run_dir(dir.path())
        .run()
        .await
        .unwrap();

    assert_eq!(report.model, Some(json!({"value": 10})));
    assert_eq!(report.record.state, RunState::Succeeded);
    let statuses: Vec<_> = report.record.outcomes.iter().map(|o| o.status.clone()).collect();
    assert_eq!(statuses, vec![BindingStatus::Succeeded; 3]);
    let log = &report.record.outcomes[1].log;
    assert!(log.iter().all(|line| line.logger == "Even Doubling::Double Value"));
    assert!(log.iter().any(|line| line.message == "value is now 10"));
}

#[tokio::test]
async fn test_odd_value_fails_at_require_even() {
    let fx = fixture();
    let dir = tempfile::tempdir().unwrap();
    let mut stack = abc_stack(&fx);
    stack.set_argument(1, "multiplier", json!(3)).unwrap();

    let failure = StackRunner::builder(stack, fx.registry.clone())
        .model(json!({"value": 5}))
        .run_dir(dir.path())
        .run()
        .await
        .unwrap_err();
    assert_eq!(failure.index, Some(2));
    assert_eq!(failure.record.state, RunState::Failed { index: 2 });
    assert!(matches!(
        failure.error,
        LayerStackError::ModelType { index: 2, .. }
    ));
    assert_eq!(fx.calls.double.load(Ordering::SeqCst), 1);
    assert_eq!(fx.calls.require_even.load(Ordering::SeqCst), 0);
    // The partially evolved model comes back with the failure.
    assert_eq!(failure.model, Some(json!({"value": 15})));
}

#[test]
fn test_bad_multiplier_reports_one_validation_error() {
    let fx = fixture();
    let mut stack = abc_stack(&fx);
    stack.set_argument(1, "multiplier", json!("x")).unwrap();
    let errors = stack.validate();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].binding, Some(1));
    assert_eq!(errors[0].layer.as_deref(), Some("Double Value"));
    assert_eq!(errors[0].argument, "multiplier");
    assert!(matches!(errors[0].kind, ValidationErrorKind::Unparseable { .. }));
}

#[tokio::test]
async fn test_bad_multiplier_stops_the_run_before_double_applies() {
    let fx = fixture();
    let dir = tempfile::tempdir().unwrap();
    let mut stack = abc_stack(&fx);
    stack.set_argument(1, "multiplier", json!("x")).unwrap();

    let failure = StackRunner::builder(stack, fx.registry.clone())
        .model(json!({"value": 5}))
        .run_dir(dir.path())
        .run()
        .await
        .unwrap_err();
    assert_eq!(failure.index, Some(1));
    assert_eq!(failure.record.state, RunState::Failed { index: 1 });
    match &failure.error {
        LayerStackError::Validation(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].argument, "multiplier");
        }
        other => panic!("expected a validation failure, got {other}"),
    }
    assert_eq!(fx.calls.double.load(Ordering::SeqCst), 0);
    assert_eq!(fx.calls.check.load(Ordering::SeqCst), 0);
    assert_eq!(failure.model, Some(json!({"value": 5})));
}

#[tokio::test]
async fn test_disabled_bindings_never_touch_the_model() {
    let fx = fixture();
    let dir = tempfile::tempdir().unwrap();
    let mut stack = abc_stack(&fx);
    stack.disable(1).unwrap();
    stack.disable(2).unwrap();

    let report = StackRunner::builder(stack, fx.registry.clone())
        .model(json!({"value": 5}))
        .run_dir(dir.path())
        .run()
        .await
        .unwrap();
    assert_eq!(report.model, Some(json!({"value": 5})));
    assert_eq!(fx.calls.applies(), 0);
    assert_eq!(fx.calls.check.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_uuid_is_unresolved() {
    let fx = fixture();
    let stray = LayerDefinition::builder("Stray", Uuid::new_v4(), "0.1.0")
        .build()
        .unwrap()
        .into_shared();
    let mut stack = abc_stack(&fx);
    stack.push(stray.clone());

    let codec = StackCodec::default();
    let document = codec.serialize(&stack);
    match codec.deserialize(document, fx.registry.as_ref()) {
        Err(LayerStackError::UnresolvedLayer { uuid, name, .. }) => {
            assert_eq!(uuid, stray.uuid());
            assert_eq!(name, "Stray");
        }
        other => panic!("expected an unresolved layer, got {:?}", other.map(|l| l.warnings)),
    }

    // The engine reports the same error at the binding that needs it.
    let dir = tempfile::tempdir().unwrap();
    let failure = StackRunner::builder(stack, fx.registry.clone())
        .model(json!({"value": 5}))
        .run_dir(dir.path())
        .config(EngineConfig {
            archive: false,
            ..EngineConfig::default()
        })
        .run()
        .await
        .unwrap_err();
    assert_eq!(failure.index, Some(3));
    assert!(matches!(failure.error, LayerStackError::UnresolvedLayer { .. }));
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let fx = fixture();
    let mut models = Vec::new();
    for _ in 0..2 {
        let dir = tempfile::tempdir().unwrap();
        let report = StackRunner::builder(abc_stack(&fx), fx.registry.clone())
            .model(json!({"value": 7, "name": "feeder"}))
            .run_dir(dir.path())
            .run()
            .await
            .unwrap();
        models.push(report.model);
    }
    assert_eq!(models[0], models[1]);
}
