use crate::{FunctionTool, Schema};
use aui_core::{Error, ExecutionContext, Result};
use serde_json::{Value, json};

/// Creates a calculator tool that evaluates mathematical expressions
pub fn create_calculator_tool() -> Result<FunctionTool> {
    let schema = Schema::object().field(
        "expression",
        Schema::string()
            .min_length(1)
            .describe("Mathematical expression to evaluate (e.g., '2 + 2', '10 * 5')"),
    );

    FunctionTool::builder("calculator")
        .description(
            "Evaluates mathematical expressions. Supports +, -, *, /, parentheses, and numbers.",
        )
        .tags(["math", "utility"])
        .input::<Value>(schema)
        .execute(|params: Value, ctx: ExecutionContext| async move {
            let expression = params["expression"].as_str().unwrap_or_default();

            tracing::debug!(
                invocation_id = %ctx.invocation_id(),
                expression = %expression,
                "Calculating expression"
            );

            let result = evaluate_expression(expression)?;

            tracing::debug!(
                invocation_id = %ctx.invocation_id(),
                result = %result,
                "Calculation completed"
            );

            Ok(json!({
                "result": result,
                "expression": expression
            }))
        })
        .render(|props| {
            if props.loading {
                return "Calculating...".to_string();
            }
            if let Some(error) = props.error {
                return format!("Error: {}", error);
            }
            match props.data {
                Some(data) => format!(
                    "{} = {}",
                    data["expression"].as_str().unwrap_or_default(),
                    data["result"]
                ),
                None => String::new(),
            }
        })
        .build()
}

fn evaluate_expression(expr: &str) -> Result<f64> {
    let expr = expr.trim().replace(' ', "");

    let result = meval::eval_str(&expr)
        .map_err(|e| Error::handler("calculator", anyhow::anyhow!("Failed to evaluate expression: {}", e)))?;

    if !result.is_finite() {
        return Err(Error::handler(
            "calculator",
            anyhow::anyhow!("Expression '{}' does not evaluate to a finite number", expr),
        ));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aui_core::{RenderProps, Tool};

    #[tokio::test]
    async fn test_calculator_tool() {
        let tool = create_calculator_tool().unwrap();

        assert_eq!(tool.name(), "calculator");
        assert!(tool.description().contains("mathematical"));

        let result = tool
            .run(json!({"expression": "2 + 2"}), None)
            .await
            .unwrap();
        assert_eq!(result["result"], 4.0);
        assert_eq!(result["expression"], "2 + 2");
    }

    #[tokio::test]
    async fn test_calculator_complex_expression() {
        let tool = create_calculator_tool().unwrap();
        let result = tool
            .run(json!({"expression": "(10 + 5) * 2 - 8 / 4"}), None)
            .await
            .unwrap();
        assert_eq!(result["result"], 28.0);
    }

    #[tokio::test]
    async fn test_calculator_errors() {
        let tool = create_calculator_tool().unwrap();

        let err = tool.run(json!({"expression": ""}), None).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = tool
            .run(json!({"expression": "2 +"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolFailed { .. }));

        let err = tool
            .run(json!({"expression": "1 / 0"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolFailed { .. }));
    }

    #[test]
    fn test_calculator_render() {
        let tool = create_calculator_tool().unwrap();
        let data = json!({"result": 4.0, "expression": "2 + 2"});

        assert_eq!(tool.render(RenderProps::data(&data)).unwrap(), "2 + 2 = 4.0");
        assert_eq!(tool.render(RenderProps::loading()).unwrap(), "Calculating...");
    }
}
