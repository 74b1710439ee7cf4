//! Assertion evaluation against an execution result.
//!
//! Paths use dot and bracket syntax (`lead.emails[0]`, `items.0.id`,
//! `$node["Set Lead"].score`). The empty path is the whole output and a
//! leading `$node` segment addresses one node's output.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::scenario::{AssertionType, TestAssertion};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    #[serde(rename = "type")]
    pub assertion_type: AssertionType,
    pub path: String,
    pub expected: Value,
    /// `None` when the path does not resolve
    pub actual: Option<Value>,
    pub passed: bool,
    pub message: String,
}

/// What assertions read: the final output plus each node's output by name
pub struct ResultView<'a> {
    pub output: &'a Value,
    pub nodes: &'a Map<String, Value>,
}

impl<'a> ResultView<'a> {
    pub fn resolve(&self, path: &str) -> Option<&'a Value> {
        let segments = parse_path(path);
        let mut iter = segments.iter();
        let mut current: &'a Value = match segments.first().map(String::as_str) {
            Some("$node") => {
                iter.next();
                let name = iter.next()?;
                self.nodes.get(name.as_str())?
            }
            _ => self.output,
        };
        for segment in iter {
            current = match current {
                Value::Object(map) => map.get(segment.as_str())?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn parse_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.trim().chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    inner.push(c);
                }
                let inner = inner.trim();
                let unquoted = inner
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
                    .unwrap_or(inner);
                segments.push(unquoted.to_string());
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Evaluate every assertion. Inputs are only read; results own copies.
pub fn validate_assertions(assertions: &[TestAssertion], view: &ResultView<'_>) -> Vec<AssertionResult> {
    assertions.iter().map(|a| evaluate(a, view)).collect()
}

pub fn evaluate(assertion: &TestAssertion, view: &ResultView<'_>) -> AssertionResult {
    let actual = view.resolve(&assertion.path).cloned();
    let expected = &assertion.expected;
    let path = if assertion.path.is_empty() {
        "output"
    } else {
        assertion.path.as_str()
    };
    let shown_actual = actual
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "undefined".to_string());

    let (passed, message) = match assertion.assertion_type {
        AssertionType::Equals => {
            let passed = actual.as_ref().map(serialize) == Some(serialize(expected));
            (
                passed,
                format!("Expected {} to equal {}, got {}", path, expected, shown_actual),
            )
        }
        AssertionType::Contains => {
            let passed = actual
                .as_ref()
                .map(|a| stringify(a).contains(&stringify(expected)))
                .unwrap_or(false);
            (
                passed,
                format!("Expected {} to contain {}, got {}", path, expected, shown_actual),
            )
        }
        AssertionType::Matches => match Regex::new(&stringify(expected)) {
            Ok(re) => {
                let passed = actual.as_ref().map(|a| re.is_match(&stringify(a))).unwrap_or(false);
                (
                    passed,
                    format!("Expected {} to match {}, got {}", path, expected, shown_actual),
                )
            }
            Err(e) => (false, format!("Invalid pattern {}: {}", expected, e)),
        },
        AssertionType::Exists => {
            let passed = matches!(actual, Some(ref v) if !v.is_null());
            (
                passed,
                format!("Expected {} to exist, got {}", path, shown_actual),
            )
        }
        AssertionType::NotExists => {
            let passed = !matches!(actual, Some(ref v) if !v.is_null());
            (
                passed,
                format!("Expected {} not to exist, got {}", path, shown_actual),
            )
        }
        AssertionType::GreaterThan | AssertionType::LessThan => {
            let greater = assertion.assertion_type == AssertionType::GreaterThan;
            let passed = match (actual.as_ref().and_then(to_number), to_number(expected)) {
                (Some(a), Some(e)) if greater => a > e,
                (Some(a), Some(e)) => a < e,
                _ => false,
            };
            let relation = if greater { "greater than" } else { "less than" };
            (
                passed,
                format!("Expected {} to be {} {}, got {}", path, relation, expected, shown_actual),
            )
        }
    };

    AssertionResult {
        assertion_type: assertion.assertion_type,
        path: assertion.path.clone(),
        expected: expected.clone(),
        actual,
        passed,
        message,
    }
}

fn serialize(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Strings as-is, everything else as JSON
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serialize(other),
    }
}

fn to_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null => 0.0,
        _ => return None,
    };
    (!n.is_nan()).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assertion(t: AssertionType, path: &str, expected: Value) -> TestAssertion {
        TestAssertion {
            assertion_type: t,
            path: path.to_string(),
            expected,
            description: None,
        }
    }

    fn output() -> Value {
        json!({
            "lead": {"email": "ada@example.com", "score": 81, "tags": ["vip", "new"]},
            "items": [{"id": 7}],
            "note": null
        })
    }

    #[test]
    fn test_path_resolution() {
        let out = output();
        let mut nodes = Map::new();
        nodes.insert("Set Lead".into(), json!({"ok": true}));
        let view = ResultView { output: &out, nodes: &nodes };

        assert_eq!(view.resolve("lead.email"), Some(&json!("ada@example.com")));
        assert_eq!(view.resolve("lead.tags[1]"), Some(&json!("new")));
        assert_eq!(view.resolve("items.0.id"), Some(&json!(7)));
        assert_eq!(view.resolve(""), Some(&out));
        assert_eq!(view.resolve("$node[\"Set Lead\"].ok"), Some(&json!(true)));
        assert_eq!(view.resolve("lead.missing"), None);
        assert_eq!(view.resolve("items[3]"), None);
    }

    #[test]
    fn test_each_assertion_type() {
        let out = output();
        let nodes = Map::new();
        let view = ResultView { output: &out, nodes: &nodes };
        let cases = vec![
            (assertion(AssertionType::Equals, "lead.score", json!(81)), true),
            (assertion(AssertionType::Equals, "lead.score", json!("81")), false),
            (assertion(AssertionType::Equals, "items", json!([{"id": 7}])), true),
            (assertion(AssertionType::Contains, "lead.email", json!("@example")), true),
            (assertion(AssertionType::Contains, "lead.tags", json!("vip")), true),
            (assertion(AssertionType::Matches, "lead.email", json!("^ada@")), true),
            (assertion(AssertionType::Matches, "lead.email", json!("^bob@")), false),
            (assertion(AssertionType::Exists, "lead.email", Value::Null), true),
            (assertion(AssertionType::Exists, "note", Value::Null), false),
            (assertion(AssertionType::NotExists, "missing", Value::Null), true),
            (assertion(AssertionType::NotExists, "lead", Value::Null), false),
            (assertion(AssertionType::GreaterThan, "lead.score", json!("80")), true),
            (assertion(AssertionType::LessThan, "lead.score", json!(50)), false),
            (assertion(AssertionType::GreaterThan, "lead.email", json!(1)), false),
        ];

        for (a, expected) in cases {
            let result = evaluate(&a, &view);
            assert_eq!(result.passed, expected, "{}", result.message);
        }
    }

    #[test]
    fn test_invalid_regex_is_a_failure_not_a_panic() {
        let out = output();
        let nodes = Map::new();
        let view = ResultView { output: &out, nodes: &nodes };
        let result = evaluate(&assertion(AssertionType::Matches, "lead.email", json!("(")), &view);
        assert!(!result.passed);
        assert!(result.message.starts_with("Invalid pattern"));
    }

    #[test]
    fn test_results_are_detached_from_inputs() {
        let mut out = output();
        let nodes = Map::new();
        let a = assertion(AssertionType::Equals, "lead.score", json!(81));
        let results = {
            let view = ResultView { output: &out, nodes: &nodes };
            validate_assertions(std::slice::from_ref(&a), &view)
        };
        out["lead"]["score"] = json!(0);
        assert!(results[0].passed);
        assert_eq!(results[0].actual, Some(json!(81)));
        assert!(results[0].message.contains("81"));
    }
}
