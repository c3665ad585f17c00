//! Arithmetic data nodes

use async_trait::async_trait;
use serde_json::json;

use loomflow_graph::{
    ComputeError, ExecCommand, ExecutionContext, ExecutionResult, NodeBehavior, NodeRegistry,
    NodeSpec, Port, Result, ValueType,
};

/// `add` - integer addition: a + b -> sum.
struct Add;

#[async_trait]
impl NodeBehavior for Add {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        let sum = ctx.int_input("a", 0) + ctx.int_input("b", 0);
        Ok(ExecutionResult::new(ExecCommand::Continue).with_data("sum", json!(sum)))
    }
}

/// `multiply` - integer multiplication: a * b -> product.
struct Multiply;

#[async_trait]
impl NodeBehavior for Multiply {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        let product = ctx.int_input("a", 0) * ctx.int_input("b", 1);
        Ok(ExecutionResult::new(ExecCommand::Continue).with_data("product", json!(product)))
    }
}

/// `vector` - packs x/y/z floats into a vector.
struct VectorPack;

#[async_trait]
impl NodeBehavior for VectorPack {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        let vec = json!([
            ctx.float_input("x", 0.0),
            ctx.float_input("y", 0.0),
            ctx.float_input("z", 0.0),
        ]);
        Ok(ExecutionResult::new(ExecCommand::Continue).with_data("vec", vec))
    }
}

/// `dot-product` - dot product of two number vectors.
struct DotProduct;

#[async_trait]
impl NodeBehavior for DotProduct {
    async fn compute(
        &mut self,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ExecutionResult, ComputeError> {
        let a = ctx.data_input("vec_a");
        let b = ctx.data_input("vec_b");
        let dot = match (a.as_array(), b.as_array()) {
            (Some(a), Some(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.as_f64().unwrap_or(0.0) * y.as_f64().unwrap_or(0.0))
                .sum(),
            _ => 0.0,
        };
        Ok(ExecutionResult::new(ExecCommand::Continue).with_data("result", json!(dot)))
    }
}

pub fn register(registry: &mut NodeRegistry) -> Result<()> {
    registry.register("add", |_options| {
        Ok(NodeSpec::data(Box::new(Add))
            .with_input(Port::input_data("a", ValueType::Int))
            .with_input(Port::input_data("b", ValueType::Int))
            .with_output(Port::output_data("sum", ValueType::Int)))
    })?;

    registry.register("multiply", |_options| {
        Ok(NodeSpec::data(Box::new(Multiply))
            .with_input(Port::input_data("a", ValueType::Int))
            .with_input(Port::input_data("b", ValueType::Int))
            .with_output(Port::output_data("product", ValueType::Int)))
    })?;

    registry.register("vector", |_options| {
        Ok(NodeSpec::data(Box::new(VectorPack))
            .with_input(Port::input_data("x", ValueType::Float))
            .with_input(Port::input_data("y", ValueType::Float))
            .with_input(Port::input_data("z", ValueType::Float))
            .with_output(Port::output_data("vec", ValueType::Vector)))
    })?;

    registry.register("dot-product", |_options| {
        Ok(NodeSpec::data(Box::new(DotProduct))
            .with_input(Port::input_data("vec_a", ValueType::Vector))
            .with_input(Port::input_data("vec_b", ValueType::Vector))
            .with_output(Port::output_data("result", ValueType::Float)))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(data: &[(&str, serde_json::Value)]) -> ExecutionContext {
        let mut ctx = ExecutionContext::default();
        for (k, v) in data {
            ctx.data_inputs.insert(k.to_string(), v.clone());
        }
        ctx
    }

    #[tokio::test]
    async fn test_add() {
        let mut add = Add;
        let result = add
            .compute(&ctx_with(&[("a", json!(8)), ("b", json!(4))]))
            .await
            .unwrap();
        assert_eq!(result.data_outputs["sum"], json!(12));
    }

    #[tokio::test]
    async fn test_add_defaults_missing_to_zero() {
        let mut add = Add;
        let result = add.compute(&ctx_with(&[("a", json!(5))])).await.unwrap();
        assert_eq!(result.data_outputs["sum"], json!(5));
    }

    #[tokio::test]
    async fn test_multiply_defaults_b_to_one() {
        let mut mul = Multiply;
        let result = mul.compute(&ctx_with(&[("a", json!(6))])).await.unwrap();
        assert_eq!(result.data_outputs["product"], json!(6));
    }

    #[tokio::test]
    async fn test_vector_pack() {
        let mut vec = VectorPack;
        let result = vec
            .compute(&ctx_with(&[("x", json!(1.0)), ("y", json!(2.0)), ("z", json!(3.0))]))
            .await
            .unwrap();
        assert_eq!(result.data_outputs["vec"], json!([1.0, 2.0, 3.0]));
    }

    #[tokio::test]
    async fn test_dot_product() {
        let mut dot = DotProduct;
        let result = dot
            .compute(&ctx_with(&[
                ("vec_a", json!([1.0, 2.0, 3.0])),
                ("vec_b", json!([4.0, 5.0, 6.0])),
            ]))
            .await
            .unwrap();
        assert_eq!(result.data_outputs["result"], json!(32.0));
    }

    #[tokio::test]
    async fn test_dot_product_missing_inputs() {
        let mut dot = DotProduct;
        let result = dot.compute(&ExecutionContext::default()).await.unwrap();
        assert_eq!(result.data_outputs["result"], json!(0.0));
    }
}
