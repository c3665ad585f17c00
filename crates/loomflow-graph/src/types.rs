//! Core enumerations for ports, nodes, and values
//!
//! Port values are carried as `serde_json::Value`; [`ValueType`] is the
//! closed set of declared port types a value is validated against.

use serde::{Deserialize, Serialize};

/// The declared type of a data port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Accepts any value
    Any,
    /// Integer
    Int,
    /// Floating point (integers are accepted)
    Float,
    /// Text string
    String,
    /// Boolean
    Bool,
    /// JSON object with string keys
    Dict,
    /// JSON array
    Array,
    /// Opaque object (anything non-null)
    Object,
    /// Array of numbers
    Vector,
    /// Array of number arrays
    Matrix,
    /// Hex string or RGB component array
    Color,
    /// Base64 string or byte array
    Binary,
}

impl ValueType {
    /// Check a value against this declared type.
    ///
    /// `Null` is accepted by every type: an unset port is legal.
    pub fn validates(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;

        if matches!(self, ValueType::Any) || value.is_null() {
            return true;
        }

        match self {
            ValueType::Any => true,
            ValueType::Int => value.is_i64() || value.is_u64(),
            // Ints pass as floats
            ValueType::Float => value.is_number(),
            ValueType::String => value.is_string(),
            ValueType::Bool => value.is_boolean(),
            ValueType::Dict => value.is_object(),
            ValueType::Array => value.is_array(),
            ValueType::Object => true,
            ValueType::Vector => match value {
                Value::Array(items) => items.iter().all(|v| v.is_number()),
                _ => false,
            },
            ValueType::Matrix => match value {
                Value::Array(rows) => rows.iter().all(|r| r.is_array()),
                _ => false,
            },
            ValueType::Color => value.is_string() || value.is_array(),
            ValueType::Binary => match value {
                Value::String(_) => true,
                Value::Array(items) => items.iter().all(|v| v.is_u64()),
                _ => false,
            },
        }
    }

    /// Default value a port of this type starts with.
    pub fn default_value(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            ValueType::Int => json!(0),
            ValueType::Float => json!(0.0),
            ValueType::String => json!(""),
            ValueType::Bool => json!(false),
            ValueType::Array => json!([]),
            ValueType::Dict => json!({}),
            _ => serde_json::Value::Null,
        }
    }

    /// Infer a declared type from a literal value (used by node options).
    pub fn infer(value: &serde_json::Value) -> ValueType {
        use serde_json::Value;
        match value {
            Value::Null => ValueType::Any,
            Value::Bool(_) => ValueType::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => ValueType::Int,
            Value::Number(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Dict,
        }
    }
}

/// Direction of a port relative to its owning node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
    /// Tunnel port on a network node: an input seen from outside, a source
    /// seen from inside (and vice versa for outputs).
    InputOutput,
}

/// Whether a port carries data values or control activations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortFunction {
    Data,
    Control,
}

/// Kind of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A computing node
    Function,
    /// A container exposing tunnel ports
    Network,
}

/// Class tag of an edge, derived from its source port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeClass {
    Data,
    Control,
}
