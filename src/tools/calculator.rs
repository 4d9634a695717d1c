//! Basic arithmetic for the model. Arguments arrive as decimal strings.

use serde_json::{Value, json};

use super::{FunctionSpec, ToolError, required_number};

pub struct CalculatorPlugin;

fn number_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": { "type": "string", "description": "First operand as a decimal number" },
            "b": { "type": "string", "description": "Second operand as a decimal number" }
        },
        "required": ["a", "b"]
    })
}

/// Render without a trailing `.0` so whole results read naturally.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl CalculatorPlugin {
    pub fn functions(&self) -> Vec<FunctionSpec> {
        vec![
            FunctionSpec {
                name: "Add",
                description: "Add two numbers",
                parameters: number_params(),
            },
            FunctionSpec {
                name: "Subtract",
                description: "Subtract the second number from the first",
                parameters: number_params(),
            },
            FunctionSpec {
                name: "Multiply",
                description: "Multiply two numbers",
                parameters: number_params(),
            },
            FunctionSpec {
                name: "Divide",
                description: "Divide the first number by the second",
                parameters: number_params(),
            },
        ]
    }

    pub async fn invoke(&self, function: &str, args: &Value) -> Result<Value, ToolError> {
        let a = required_number(args, "a")?;
        let b = required_number(args, "b")?;
        let result = match function {
            "Add" => a + b,
            "Subtract" => a - b,
            "Multiply" => a * b,
            "Divide" => {
                if b == 0.0 {
                    return Err(ToolError::Failed("division by zero".into()));
                }
                a / b
            }
            other => return Err(ToolError::UnknownFunction(other.to_string())),
        };
        Ok(json!(format_number(result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_arithmetic() {
        let calc = CalculatorPlugin;
        let args = json!({"a": "2", "b": "3"});
        assert_eq!(calc.invoke("Add", &args).await.unwrap(), json!("5"));
        assert_eq!(calc.invoke("Subtract", &args).await.unwrap(), json!("-1"));
        assert_eq!(calc.invoke("Multiply", &args).await.unwrap(), json!("6"));

        let args = json!({"a": "7", "b": "2"});
        assert_eq!(calc.invoke("Divide", &args).await.unwrap(), json!("3.5"));
    }

    #[tokio::test]
    async fn test_divide_by_zero_fails() {
        let calc = CalculatorPlugin;
        let err = calc
            .invoke("Divide", &json!({"a": "1", "b": "0"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }

    #[tokio::test]
    async fn test_non_numeric_argument_rejected() {
        let calc = CalculatorPlugin;
        let err = calc
            .invoke("Add", &json!({"a": "two", "b": "3"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn test_format_number_trims_whole_values() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-2.0), "-2");
    }
}
