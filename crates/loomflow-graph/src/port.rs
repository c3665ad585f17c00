//! Typed port endpoints
//!
//! A port is a named, typed endpoint on a node. Data ports carry values of
//! their declared [`ValueType`]; control ports carry boolean activations.
//! Direction is fixed at creation.

use crate::error::{GraphError, Result};
use crate::types::{PortDirection, PortFunction, ValueType};

/// A typed endpoint on a node
#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    direction: PortDirection,
    pub function: PortFunction,
    pub value_type: ValueType,
    value: serde_json::Value,
    dirty: bool,
}

impl Port {
    fn new(
        name: impl Into<String>,
        direction: PortDirection,
        function: PortFunction,
        value_type: ValueType,
    ) -> Self {
        let value_type = match function {
            PortFunction::Control => ValueType::Bool,
            PortFunction::Data => value_type,
        };
        Self {
            name: name.into(),
            direction,
            function,
            value_type,
            value: value_type.default_value(),
            dirty: true,
        }
    }

    /// Data input port
    pub fn input_data(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, PortDirection::Input, PortFunction::Data, value_type)
    }

    /// Data output port
    pub fn output_data(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, PortDirection::Output, PortFunction::Data, value_type)
    }

    /// Control input port
    pub fn input_control(name: impl Into<String>) -> Self {
        Self::new(
            name,
            PortDirection::Input,
            PortFunction::Control,
            ValueType::Bool,
        )
    }

    /// Control output port
    pub fn output_control(name: impl Into<String>) -> Self {
        Self::new(
            name,
            PortDirection::Output,
            PortFunction::Control,
            ValueType::Bool,
        )
    }

    /// Tunnel data port for a network node
    pub fn tunnel_data(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(
            name,
            PortDirection::InputOutput,
            PortFunction::Data,
            value_type,
        )
    }

    /// Tunnel control port for a network node
    pub fn tunnel_control(name: impl Into<String>) -> Self {
        Self::new(
            name,
            PortDirection::InputOutput,
            PortFunction::Control,
            ValueType::Bool,
        )
    }

    /// Seed an initial value at construction time (builder style).
    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = value;
        self.dirty = false;
        self
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Type-checked store. Rejects values that do not match the declared
    /// type and clears the dirty flag on success.
    pub fn set_value(&mut self, value: serde_json::Value) -> Result<()> {
        if !self.value_type.validates(&value) {
            return Err(GraphError::TypeMismatch {
                port: self.name.clone(),
                expected: self.value_type,
                got: json_kind(&value).to_string(),
            });
        }
        self.value = value;
        self.dirty = false;
        Ok(())
    }

    /// Runtime propagation store. Edge type compatibility is deliberately
    /// unchecked, so a mismatch here only warns and stores anyway.
    pub fn write(&mut self, value: serde_json::Value) {
        if !self.value_type.validates(&value) {
            log::warn!(
                "port '{}' expects {:?}, got {} - storing anyway",
                self.name,
                self.value_type,
                json_kind(&value)
            );
        }
        self.value = value;
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_data(&self) -> bool {
        self.function == PortFunction::Data
    }

    pub fn is_control(&self) -> bool {
        self.function == PortFunction::Control
    }

    pub fn is_tunnel(&self) -> bool {
        self.direction == PortDirection::InputOutput
    }

    /// Control helpers

    pub fn activate(&mut self) {
        self.write(serde_json::Value::Bool(true));
    }

    pub fn deactivate(&mut self) {
        self.write(serde_json::Value::Bool(false));
    }

    pub fn is_active(&self) -> bool {
        self.value.as_bool().unwrap_or(false)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_by_type() {
        let p = Port::input_data("a", ValueType::Int);
        assert_eq!(*p.value(), json!(0));
        assert!(p.is_dirty());

        let p = Port::input_data("s", ValueType::String);
        assert_eq!(*p.value(), json!(""));
    }

    #[test]
    fn test_control_ports_are_bool() {
        let mut p = Port::output_control("next");
        assert_eq!(p.value_type, ValueType::Bool);
        assert!(!p.is_active());
        p.activate();
        assert!(p.is_active());
        p.deactivate();
        assert!(!p.is_active());
    }

    #[test]
    fn test_set_value_clears_dirty() {
        let mut p = Port::input_data("a", ValueType::Int);
        assert!(p.is_dirty());
        p.set_value(json!(5)).unwrap();
        assert!(!p.is_dirty());
        assert_eq!(*p.value(), json!(5));
    }

    #[test]
    fn test_set_value_rejects_mismatch() {
        let mut p = Port::input_data("a", ValueType::Int);
        let err = p.set_value(json!("five")).unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
        // value unchanged
        assert_eq!(*p.value(), json!(0));
    }

    #[test]
    fn test_int_accepted_into_float_port() {
        let mut p = Port::input_data("x", ValueType::Float);
        p.set_value(json!(2)).unwrap();
        assert_eq!(*p.value(), json!(2));
    }

    #[test]
    fn test_write_stores_despite_mismatch() {
        let mut p = Port::input_data("a", ValueType::Int);
        p.write(json!("oops"));
        assert_eq!(*p.value(), json!("oops"));
        assert!(!p.is_dirty());
    }

    #[test]
    fn test_tunnel_direction() {
        let p = Port::tunnel_data("value_in", ValueType::Any);
        assert!(p.is_tunnel());
        assert_eq!(p.direction(), PortDirection::InputOutput);
    }
}
