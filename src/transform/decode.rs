//! Payload decoders
//!
//! The input never assumes an encoding: raw item bytes go through a
//! [`Decoder`] chosen by the `codec` setting, which yields a field map or a
//! `Decode` error. Decode errors are never fatal to the fetch loop.

use crate::errors::InputError;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Decoded event fields.
pub type FieldMap = Map<String, Value>;

pub trait Decoder: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<FieldMap, InputError>;
}

/// JSON objects only; arrays, scalars and invalid JSON are decode errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, raw: &[u8]) -> Result<FieldMap, InputError> {
        match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(other) => Err(InputError::Decode(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(InputError::Decode(e.to_string())),
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Puts the payload, read as lossy UTF-8, under `message`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainDecoder;

impl Decoder for PlainDecoder {
    fn decode(&self, raw: &[u8]) -> Result<FieldMap, InputError> {
        let mut fields = FieldMap::new();
        fields.insert(
            "message".to_string(),
            Value::String(String::from_utf8_lossy(raw).into_owned()),
        );
        Ok(fields)
    }
}

pub fn codec_from_name(name: &str) -> Result<Arc<dyn Decoder>, InputError> {
    match name.to_ascii_lowercase().as_str() {
        "json" => Ok(Arc::new(JsonDecoder)),
        "plain" => Ok(Arc::new(PlainDecoder)),
        other => Err(InputError::Config(format!("unknown codec {other:?}"))),
    }
}
