//! Message-to-tool selection
//!
//! Pure lexical matching: no I/O, no state, total over all inputs.
//! Rules run independently in a fixed order (date, add, subtract,
//! multiply, divide, remote) and each contributes its own candidates, so
//! one message can produce several. Overlapping numeric substrings are
//! intentionally NOT de-duplicated: a substring matched by two operator
//! patterns yields two candidates.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::tools::{ToolKind, ToolParams};

/// A proposed tool call derived from message text, not yet executed
#[derive(Debug, Clone)]
pub struct Candidate {
    pub tool_name: String,
    pub kind: ToolKind,
    pub parameters: ToolParams,
    pub rationale: String,
}

const DATE_KEYWORDS: &[&str] = &["날짜", "오늘", "현재", "date", "today"];
const REMOTE_KEYWORDS: &[&str] = &["notion", "노션", "메모", "문서", "페이지", "노트"];

/// Remote tool invoked for document/note-taking vocabulary
pub const REMOTE_SEARCH_TOOL: &str = "search";

const NUM: &str = r"(\d+(?:\.\d+)?)";

struct OperationRule {
    tool_name: &'static str,
    symbol: &'static str,
    label: &'static str,
    patterns: Vec<Regex>,
}

fn rule(tool_name: &'static str, symbol: &'static str, label: &'static str, op: &str, word: &str) -> OperationRule {
    OperationRule {
        tool_name,
        symbol,
        label,
        patterns: vec![
            Regex::new(&format!(r"{NUM}\s*{op}\s*{NUM}")).expect("operator pattern"),
            Regex::new(&format!(r"{NUM}\s*{word}\s*{NUM}")).expect("word pattern"),
        ],
    }
}

static OPERATION_RULES: Lazy<Vec<OperationRule>> = Lazy::new(|| {
    vec![
        rule("add", "+", "덧셈", r"\+", "더하기"),
        rule("subtract", "-", "뺄셈", r"-", "빼기"),
        rule("multiply", "×", "곱셈", r"[*×]", "곱하기"),
        rule("divide", "÷", "나눗셈", r"[/÷]", "나누기"),
    ]
});

/// Select candidate tool invocations for one inbound message.
///
/// `remote_available` gates the remote rule only; everything else is a
/// function of the text alone.
pub fn select(message: &str, remote_available: bool) -> Vec<Candidate> {
    if message.trim().is_empty() {
        return Vec::new();
    }

    let lower = message.to_lowercase();
    let mut candidates = Vec::new();

    if DATE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        candidates.push(Candidate {
            tool_name: "current_date".to_string(),
            kind: ToolKind::Local,
            parameters: ToolParams::new(),
            rationale: "날짜 관련 키워드 감지".to_string(),
        });
    }

    for rule in OPERATION_RULES.iter() {
        for pattern in &rule.patterns {
            for caps in pattern.captures_iter(&lower) {
                let (Some(a), Some(b)) = (parse_number(&caps[1]), parse_number(&caps[2])) else {
                    continue;
                };

                let mut parameters = ToolParams::new();
                parameters.insert("a".to_string(), a.clone());
                parameters.insert("b".to_string(), b.clone());

                candidates.push(Candidate {
                    tool_name: rule.tool_name.to_string(),
                    kind: ToolKind::Local,
                    rationale: format!(
                        "{} 패턴 감지: {} {} {}",
                        rule.label,
                        render(&a),
                        rule.symbol,
                        render(&b)
                    ),
                    parameters,
                });
            }
        }
    }

    if remote_available && REMOTE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        let mut parameters = ToolParams::new();
        parameters.insert("query".to_string(), Value::String(message.to_string()));
        candidates.push(Candidate {
            tool_name: REMOTE_SEARCH_TOOL.to_string(),
            kind: ToolKind::Remote,
            parameters,
            rationale: "Notion 관련 키워드 감지".to_string(),
        });
    }

    candidates
}

/// Parse a matched numeric literal, preferring integers when the value
/// has no fractional part
fn parse_number(raw: &str) -> Option<Value> {
    let n: f64 = raw.parse().ok()?;
    if n.fract() == 0.0 && n.abs() <= i64::MAX as f64 {
        Some(Value::from(n as i64))
    } else {
        Some(Value::from(n))
    }
}

fn render(v: &Value) -> String {
    v.to_string()
}
