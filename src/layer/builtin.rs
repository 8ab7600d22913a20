//! Built-in layers over JSON models (`serde_json::Value` stored as
//! `model.json`), used by the command-line tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use super::definition::LayerDefinition;
use super::executor::{LayerContext, LayerImpl, ModelFreeLayer, ModelLayer};
use super::model::{JsonModelAdapter, ModelAdapter};
use super::registry::LayerRegistryBuilder;
use crate::args::{ArgDescriptor, BoundArgs, ValueParser};
use crate::error::{LayerError, LayerResult, StackResult};

pub const LOG_MESSAGE: &str = "log-message";
pub const JSON_SET: &str = "json-set";
pub const JSON_SCALE: &str = "json-scale";

pub const LOG_MESSAGE_UUID: Uuid = Uuid::from_u128(0x6c0f_4a51_2d8e_4b7a_9e3c_5f10_2b7d_e001);
pub const JSON_SET_UUID: Uuid = Uuid::from_u128(0x6c0f_4a51_2d8e_4b7a_9e3c_5f10_2b7d_e002);
pub const JSON_SCALE_UUID: Uuid = Uuid::from_u128(0x6c0f_4a51_2d8e_4b7a_9e3c_5f10_2b7d_e003);

/// Logs a message at the requested level. Reports failure when `fail` is set.
pub struct LogMessageLayer;

#[async_trait]
impl ModelFreeLayer for LogMessageLayer {
    async fn apply(&self, ctx: &LayerContext, args: &BoundArgs) -> LayerResult<bool> {
        let message: String = args.get_as("message")?;
        let level: String = args.get_as("level")?;
        match level.as_str() {
            "debug" => ctx.debug(message),
            "warning" => ctx.warn(message),
            "error" => ctx.error(message),
            _ => ctx.info(message),
        }
        let fail: bool = args.get_as("fail")?;
        Ok(!fail)
    }
}

/// Sets the field addressed by a JSON pointer, creating parent objects.
pub struct JsonSetLayer {
    adapter: Arc<JsonModelAdapter>,
}

impl JsonSetLayer {
    pub fn new(adapter: JsonModelAdapter) -> Self {
        Self {
            adapter: Arc::new(adapter),
        }
    }
}

impl Default for JsonSetLayer {
    fn default() -> Self {
        Self::new(JsonModelAdapter::new())
    }
}

#[async_trait]
impl ModelLayer<Value> for JsonSetLayer {
    fn adapter(&self) -> Arc<dyn ModelAdapter<Value>> {
        self.adapter.clone()
    }

    async fn apply(&self, ctx: &LayerContext, model: &mut Value, args: &BoundArgs) -> LayerResult<()> {
        let pointer: String = args.get_as("pointer")?;
        let value = args.get("value").cloned().unwrap_or(Value::Null);
        ctx.debug(format!("Setting {} to {}", pointer, value));
        set_pointer(model, &pointer, value)
    }
}

/// Multiplies the numeric field addressed by a JSON pointer.
pub struct JsonScaleLayer {
    adapter: Arc<JsonModelAdapter>,
}

impl JsonScaleLayer {
    pub fn new(adapter: JsonModelAdapter) -> Self {
        Self {
            adapter: Arc::new(adapter),
        }
    }
}

impl Default for JsonScaleLayer {
    fn default() -> Self {
        Self::new(JsonModelAdapter::new())
    }
}

#[async_trait]
impl ModelLayer<Value> for JsonScaleLayer {
    fn adapter(&self) -> Arc<dyn ModelAdapter<Value>> {
        self.adapter.clone()
    }

    async fn apply(&self, ctx: &LayerContext, model: &mut Value, args: &BoundArgs) -> LayerResult<()> {
        let pointer: String = args.get_as("pointer")?;
        let multiplier: f64 = args.get_as("multiplier")?;
        let field = model
            .pointer_mut(&pointer)
            .ok_or_else(|| LayerError::ExecutionError(format!("no field at '{}'", pointer)))?;
        let scaled = scale_number(field, multiplier)?;
        ctx.info(format!("{} {} -> {}", pointer, field, scaled));
        *field = scaled;
        Ok(())
    }
}

/// Integers stay integers when the product is integral.
fn scale_number(value: &Value, multiplier: f64) -> LayerResult<Value> {
    let current = value
        .as_f64()
        .ok_or_else(|| LayerError::TypeError(format!("{} is not a number", value)))?;
    let product = current * multiplier;
    if value.is_i64() && product.fract() == 0.0 && product.abs() < i64::MAX as f64 {
        return Ok(json!(product as i64));
    }
    serde_json::Number::from_f64(product)
        .map(Value::Number)
        .ok_or_else(|| LayerError::ExecutionError(format!("{} is not a finite number", product)))
}

fn set_pointer(model: &mut Value, pointer: &str, value: Value) -> LayerResult<()> {
    if pointer.is_empty() {
        *model = value;
        return Ok(());
    }
    let tokens = pointer.strip_prefix('/').ok_or_else(|| {
        LayerError::ArgumentError(format!("'{}' is not a JSON pointer", pointer))
    })?;
    let tokens: Vec<String> = tokens
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect();
    let (last, parents) = tokens
        .split_last()
        .ok_or_else(|| LayerError::ArgumentError("empty JSON pointer".into()))?;

    let mut current = model;
    for token in parents {
        if current.is_null() {
            *current = Value::Object(Default::default());
        }
        current = match current {
            Value::Object(map) => map
                .entry(token.clone())
                .or_insert_with(|| Value::Object(Default::default())),
            Value::Array(items) => {
                let index = array_index(token, items.len())?;
                &mut items[index]
            }
            other => {
                return Err(LayerError::TypeError(format!(
                    "cannot descend into {} at '{}'",
                    other, token
                )))
            }
        };
    }
    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        Value::Array(items) if last == "-" => items.push(value),
        Value::Array(items) => {
            let index = array_index(last, items.len())?;
            items[index] = value;
        }
        other => {
            return Err(LayerError::TypeError(format!(
                "cannot set '{}' on {}",
                last, other
            )))
        }
    }
    Ok(())
}

fn array_index(token: &str, len: usize) -> LayerResult<usize> {
    match token.parse::<usize>() {
        Ok(i) if i < len => Ok(i),
        _ => Err(LayerError::ArgumentError(format!(
            "'{}' is not an index into an array of length {}",
            token, len
        ))),
    }
}

pub fn log_message_definition() -> StackResult<LayerDefinition> {
    LayerDefinition::builder("Log Message", LOG_MESSAGE_UUID, "0.1.0")
        .description("Write a message to the stack log")
        .arg(ArgDescriptor::positional("message").parser(ValueParser::String))
        .kwarg(
            ArgDescriptor::keyword("level", json!("info"))
                .parser(ValueParser::String)
                .choices(["debug", "info", "warning", "error"]),
        )
        .kwarg(ArgDescriptor::keyword("fail", json!(false)).parser(ValueParser::Boolean))
        .build()
}

pub fn json_set_definition() -> StackResult<LayerDefinition> {
    LayerDefinition::builder("Set JSON Field", JSON_SET_UUID, "0.1.0")
        .model_layer()
        .arg(
            ArgDescriptor::positional("pointer")
                .parser(ValueParser::String)
                .description("JSON pointer of the field, e.g. /loads/scale"),
        )
        .arg(ArgDescriptor::positional("value").parser(ValueParser::Json))
        .build()
}

pub fn json_scale_definition() -> StackResult<LayerDefinition> {
    LayerDefinition::builder("Scale JSON Field", JSON_SCALE_UUID, "0.1.0")
        .model_layer()
        .arg(ArgDescriptor::positional("pointer").parser(ValueParser::String))
        .kwarg(ArgDescriptor::keyword("multiplier", json!(2.0)).parser(ValueParser::Float))
        .build()
}

/// Make the built-in implementations available to library declarations.
pub fn register_implementations(builder: LayerRegistryBuilder<Value>) -> LayerRegistryBuilder<Value> {
    builder
        .implementation(LOG_MESSAGE, LayerImpl::model_free(LogMessageLayer))
        .implementation(JSON_SET, LayerImpl::model(JsonSetLayer::default()))
        .implementation(JSON_SCALE, LayerImpl::model(JsonScaleLayer::default()))
}

/// Register the built-in implementations and their stock definitions.
pub fn register_layers(builder: LayerRegistryBuilder<Value>) -> StackResult<LayerRegistryBuilder<Value>> {
    Ok(register_implementations(builder)
        .layer(log_message_definition()?, LayerImpl::model_free(LogMessageLayer))
        .layer(json_set_definition()?, LayerImpl::model(JsonSetLayer::default()))
        .layer(json_scale_definition()?, LayerImpl::model(JsonScaleLayer::default())))
}
