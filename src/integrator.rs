//! Result integration
//!
//! Pure formatting of an execution-result sequence into one reply
//! string. Successes and failures are partitioned preserving order,
//! rendered through per-tool templates, and joined deterministically.
//! No side effects; the audit logging around it lives in the agent.

use serde_json::Value;

use crate::executor::{ExecutionResult, Outcome};
use crate::tools::ToolParams;

/// Build the reply string for an execution-result sequence
pub fn integrate(results: &[ExecutionResult]) -> String {
    if results.is_empty() {
        return "실행할 수 있는 툴이 없습니다.".to_string();
    }

    let successes: Vec<&ExecutionResult> = results.iter().filter(|r| r.is_success()).collect();
    let failures: Vec<&ExecutionResult> = results.iter().filter(|r| !r.is_success()).collect();

    let mut parts: Vec<String> = Vec::new();

    match successes.as_slice() {
        [] => {}
        [single] => parts.push(render_single(single)),
        many => {
            parts.push("요청하신 작업들의 결과입니다:".to_string());
            for (i, result) in many.iter().enumerate() {
                parts.push(render_listed(i + 1, result));
            }
        }
    }

    if !failures.is_empty() {
        if successes.is_empty() {
            parts.push("요청 처리 중 오류가 발생했습니다:".to_string());
        } else {
            parts.push("\n다음 작업에서 오류가 발생했습니다:".to_string());
        }
        for failure in &failures {
            if let Outcome::Failure { message, .. } = &failure.outcome {
                parts.push(format!("- {}: {}", failure.tool_name, message));
            }
        }
    }

    parts.join("\n")
}

fn render_single(result: &ExecutionResult) -> String {
    let value = success_value(result);
    match result.tool_name.as_str() {
        "current_date" => format!("오늘 날짜는 {}입니다.", format_value(value)),
        name => match operation_symbol(name) {
            Some(symbol) => render_operation(&result.parameters, symbol, value),
            None => format!("{} 결과: {}", name, format_value(value)),
        },
    }
}

fn render_listed(index: usize, result: &ExecutionResult) -> String {
    let value = success_value(result);
    match result.tool_name.as_str() {
        "current_date" => format!("{}. 현재 날짜: {}", index, format_value(value)),
        name => match operation_symbol(name) {
            Some(symbol) => format!(
                "{}. {}",
                index,
                render_operation(&result.parameters, symbol, value)
            ),
            None => format!("{}. {}: {}", index, name, format_value(value)),
        },
    }
}

fn render_operation(parameters: &ToolParams, symbol: &str, value: &Value) -> String {
    let operand = |key: &str| {
        parameters
            .get(key)
            .map(format_value)
            .unwrap_or_else(|| "?".to_string())
    };
    format!(
        "{} {} {} = {}",
        operand("a"),
        symbol,
        operand("b"),
        format_value(value)
    )
}

fn success_value(result: &ExecutionResult) -> &Value {
    static NULL: Value = Value::Null;
    match &result.outcome {
        Outcome::Success(value) => value,
        // Only successes reach the render helpers.
        Outcome::Failure { .. } => &NULL,
    }
}

/// Mathematical symbol for an arithmetic tool name
fn operation_symbol(name: &str) -> Option<&'static str> {
    match name {
        "add" => Some("+"),
        "subtract" => Some("-"),
        "multiply" => Some("×"),
        "divide" => Some("÷"),
        _ => None,
    }
}

/// Render a tool value for display: bare strings without quotes,
/// integral numbers without a decimal point, everything else as JSON
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && n.as_i64().is_none() && f.abs() <= i64::MAX as f64 {
                    return (f as i64).to_string();
                }
            }
            n.to_string()
        }
        other => other.to_string(),
    }
}
