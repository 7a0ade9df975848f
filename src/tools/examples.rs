//! A concrete tool used only as an integration-test fixture for the [`Tool`]
//! trait (spec §1 explicitly keeps concrete tool implementations out of
//! scope; this one exists purely to exercise [`super::dispatch`] end to end).
//!
//! Adapted from the teacher's `tools::calculator::Calculator`, trimmed to
//! arithmetic-and-named-constant evaluation via `evalexpr` — the
//! statistical-function pre-parsing the teacher layers on top
//! (`mean(...)`, `median(...)`, etc.) isn't needed to exercise dispatch and
//! is left behind.

use async_trait::async_trait;
use evalexpr::ContextWithMutableVariables;

use super::{Tool, ToolContext, ToolMetadata, ToolParameter, ToolParameterType};
use crate::error::{AgentError, Result};

/// A stateless arithmetic evaluator, grounded on the teacher's
/// `Calculator::evaluate`.
#[derive(Clone, Default)]
pub struct Calculator;

impl Calculator {
    pub fn new() -> Self {
        Self
    }

    fn evaluate(&self, expression: &str) -> Result<f64> {
        let mut context = evalexpr::HashMapContext::new();
        let _ = context.set_value("pi".to_string(), evalexpr::Value::Float(std::f64::consts::PI));
        let _ = context.set_value("e".to_string(), evalexpr::Value::Float(std::f64::consts::E));

        let value = evalexpr::eval_with_context(expression, &context)
            .map_err(|e| AgentError::invalid_argument(format!("evaluation error: {e}")))?;
        value
            .as_number()
            .map_err(|_| AgentError::invalid_argument("result is not a number"))
    }
}

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluates an arithmetic expression and returns the numeric result."
    }

    fn declaration(&self) -> ToolMetadata {
        ToolMetadata::new(self.name(), self.description()).with_parameter(
            ToolParameter::new("expression", ToolParameterType::String)
                .with_description("an arithmetic expression, e.g. '2 + 2 * 3'")
                .required(),
        )
    }

    async fn run(&self, _ctx: &mut ToolContext<'_>, args: serde_json::Value) -> Result<serde_json::Value> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::invalid_argument("missing 'expression' string argument"))?;
        let value = self.evaluate(expression)?;
        Ok(serde_json::json!({ "value": value }))
    }
}
