//! Cadence source text, typed arguments and result values.
//!
//! Arguments travel to the access node as JSON-Cadence (`{"type": .., "value": ..}`) and
//! script results come back in the same encoding. Results are translated into plain JSON so
//! callers can read them directly or deserialize them into their own types.

use crate::error::{ClientError, Result};
use crate::types::Address;
use serde_json::{Map, Value, json};

/// A value with its remote Cadence type.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Bool(bool),
    String(String),
    Address(Address),
    UInt8(u8),
    UInt32(u32),
    UInt64(u64),
    Int(i128),
    /// Fixed-point decimal, kept as text to avoid float rounding
    UFix64(String),
    Optional(Option<Box<Argument>>),
    Array(Vec<Argument>),
    Dictionary(Vec<(Argument, Argument)>),
}

impl Argument {
    pub fn type_name(&self) -> &'static str {
        match self {
            Argument::Bool(_) => "Bool",
            Argument::String(_) => "String",
            Argument::Address(_) => "Address",
            Argument::UInt8(_) => "UInt8",
            Argument::UInt32(_) => "UInt32",
            Argument::UInt64(_) => "UInt64",
            Argument::Int(_) => "Int",
            Argument::UFix64(_) => "UFix64",
            Argument::Optional(_) => "Optional",
            Argument::Array(_) => "Array",
            Argument::Dictionary(_) => "Dictionary",
        }
    }

    /// JSON-Cadence encoding. Integers and fixed-point numbers are encoded as strings.
    pub fn to_json(&self) -> Value {
        let value = match self {
            Argument::Bool(b) => json!(b),
            Argument::String(s) => json!(s),
            Argument::Address(a) => json!(a.to_string()),
            Argument::UInt8(n) => json!(n.to_string()),
            Argument::UInt32(n) => json!(n.to_string()),
            Argument::UInt64(n) => json!(n.to_string()),
            Argument::Int(n) => json!(n.to_string()),
            Argument::UFix64(s) => json!(s),
            Argument::Optional(inner) => inner.as_ref().map_or(Value::Null, |a| a.to_json()),
            Argument::Array(items) => Value::Array(items.iter().map(Argument::to_json).collect()),
            Argument::Dictionary(entries) => Value::Array(
                entries
                    .iter()
                    .map(|(k, v)| json!({ "key": k.to_json(), "value": v.to_json() }))
                    .collect(),
            ),
        };
        json!({ "type": self.type_name(), "value": value })
    }
}

/// Typed constructors handed to argument builder closures.
///
/// ```ignore
/// Script::new(READ_PROFILE).args(|t| vec![t.address(user)])
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgBuilder;

impl ArgBuilder {
    pub fn bool(&self, value: bool) -> Argument {
        Argument::Bool(value)
    }

    pub fn string(&self, value: impl Into<String>) -> Argument {
        Argument::String(value.into())
    }

    pub fn address(&self, value: Address) -> Argument {
        Argument::Address(value)
    }

    pub fn uint8(&self, value: u8) -> Argument {
        Argument::UInt8(value)
    }

    pub fn uint32(&self, value: u32) -> Argument {
        Argument::UInt32(value)
    }

    pub fn uint64(&self, value: u64) -> Argument {
        Argument::UInt64(value)
    }

    pub fn int(&self, value: i128) -> Argument {
        Argument::Int(value)
    }

    /// Fixed-point amount. A missing fractional part is added (`"10"` becomes `"10.0"`).
    pub fn ufix64(&self, value: impl Into<String>) -> Argument {
        let mut value = value.into();
        if !value.contains('.') {
            value.push_str(".0");
        }
        Argument::UFix64(value)
    }

    pub fn optional(&self, value: Option<Argument>) -> Argument {
        Argument::Optional(value.map(Box::new))
    }

    pub fn array(&self, values: Vec<Argument>) -> Argument {
        Argument::Array(values)
    }

    pub fn dictionary(&self, entries: Vec<(Argument, Argument)>) -> Argument {
        Argument::Dictionary(entries)
    }
}

/// A read-only script with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub cadence: String,
    pub arguments: Vec<Argument>,
}

impl Script {
    pub fn new(cadence: impl Into<String>) -> Self {
        Self {
            cadence: cadence.into(),
            arguments: Vec::new(),
        }
    }

    /// Build the argument list from local values.
    pub fn args<F>(mut self, build: F) -> Self
    where
        F: FnOnce(ArgBuilder) -> Vec<Argument>,
    {
        self.arguments = build(ArgBuilder);
        self
    }
}

/// Translate a JSON-Cadence value into plain JSON.
///
/// `Optional(nil)` and `Void` become `null`; composites become objects of their fields;
/// numbers wider than 32 bits and fixed-point values stay strings.
pub fn decode(value: &Value) -> Result<Value> {
    let obj = value
        .as_object()
        .ok_or_else(|| ClientError::Decode(format!("expected a JSON-Cadence object, got {value}")))?;
    let ty = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Decode("JSON-Cadence value without `type`".to_string()))?;
    let inner = obj.get("value").unwrap_or(&Value::Null);

    let decoded = match ty {
        "Void" => Value::Null,
        "Optional" => {
            if inner.is_null() {
                Value::Null
            } else {
                decode(inner)?
            }
        }
        "Bool" => inner.clone(),
        "String" | "Character" | "Address" | "Capability" => inner.clone(),
        "Int8" | "Int16" | "Int32" | "UInt8" | "UInt16" | "UInt32" | "Word8" | "Word16"
        | "Word32" => {
            let text = expect_str(inner, ty)?;
            let n: i64 = text
                .parse()
                .map_err(|e| ClientError::Decode(format!("{ty} `{text}`: {e}")))?;
            Value::from(n)
        }
        "Int" | "Int64" | "Int128" | "Int256" | "UInt" | "UInt64" | "UInt128" | "UInt256"
        | "Word64" | "Fix64" | "UFix64" => Value::String(expect_str(inner, ty)?.to_string()),
        "Array" => Value::Array(
            expect_array(inner, ty)?
                .iter()
                .map(decode)
                .collect::<Result<Vec<_>>>()?,
        ),
        "Dictionary" => {
            let mut map = Map::new();
            for entry in expect_array(inner, ty)? {
                let key = decode(entry.get("key").unwrap_or(&Value::Null))?;
                let val = decode(entry.get("value").unwrap_or(&Value::Null))?;
                let key = match key {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, val);
            }
            Value::Object(map)
        }
        "Struct" | "Resource" | "Event" | "Contract" | "Enum" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_array)
                .ok_or_else(|| ClientError::Decode(format!("{ty} without `fields`")))?;
            let mut map = Map::new();
            for field in fields {
                let name = field
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ClientError::Decode(format!("{ty} field without `name`")))?;
                map.insert(name.to_string(), decode(field.get("value").unwrap_or(&Value::Null))?);
            }
            Value::Object(map)
        }
        "Path" => inner.clone(),
        "Type" => inner
            .get("staticType")
            .map(|t| t.get("typeID").cloned().unwrap_or_else(|| t.clone()))
            .unwrap_or(Value::Null),
        other => {
            return Err(ClientError::Decode(format!("unsupported JSON-Cadence type `{other}`")));
        }
    };
    Ok(decoded)
}

fn expect_str<'a>(value: &'a Value, ty: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| ClientError::Decode(format!("{ty} value must be a string, got {value}")))
}

fn expect_array<'a>(value: &'a Value, ty: &str) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| ClientError::Decode(format!("{ty} value must be an array, got {value}")))
}
