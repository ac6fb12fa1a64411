//! 从 Planner LLM 输出中解析计划
//!
//! 支持 ```json 代码块或裸 JSON；顶层可以是步骤数组，也可以是 `{"steps": [...]}`。
//! 任何不符合的输出都视为规划失败（不会触发重规划）。

use serde_json::Value;

use crate::core::AgentError;
use crate::plan::{Plan, Step};

/// 提取 JSON 片段：优先 ```json 块，其次任意 ``` 块，最后取首个 [ 或 { 到最后一个 ] 或 }
fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }
    let start = trimmed.find(['[', '{'])?;
    let end = trimmed.rfind([']', '}'])?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

/// 解析 Planner 文本输出为 Plan（未规范化）
pub fn parse_plan_text(text: &str) -> Result<Plan, AgentError> {
    let json = extract_json(text)
        .ok_or_else(|| AgentError::InvalidPlan("no JSON found in planner output".to_string()))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| AgentError::InvalidPlan(format!("{}: {}", e, json)))?;

    let steps_value = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("steps").or_else(|| map.remove("plan")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AgentError::InvalidPlan(
                    "expected a \"steps\" array".to_string(),
                ))
            }
        },
        other => {
            return Err(AgentError::InvalidPlan(format!(
                "expected an array of steps, got {}",
                other
            )))
        }
    };

    let steps = steps_value
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            serde_json::from_value::<Step>(v)
                .map_err(|e| AgentError::InvalidPlan(format!("step {}: {}", i, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Plan::from_steps(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::AgentRole;

    #[test]
    fn test_parse_fenced_array() {
        let text = r#"Here is the plan:
```json
[
  {"agent_name": "coder", "instruction": "write main.py"},
  {"agent_name": "code-reviewer", "instruction": "review it"},
  {"agent_name": "persona", "instruction": "wrap up", "is_final": true}
]
```"#;
        let plan = parse_plan_text(text).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps()[1].agent(), AgentRole::CodeReviewer);
        assert!(plan.steps()[2].is_final());
    }

    #[test]
    fn test_parse_steps_object() {
        let text = r#"{"steps": [{"agent_name": "coder", "instruction": "x"}]}"#;
        let plan = parse_plan_text(text).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(!plan.steps()[0].is_final());
    }

    #[test]
    fn test_parse_rejects_unknown_role() {
        let text = r#"[{"agent_name": "janitor", "instruction": "x"}]"#;
        assert!(matches!(parse_plan_text(text), Err(AgentError::InvalidPlan(_))));
    }

    #[test]
    fn test_parse_rejects_prose_and_empty() {
        assert!(parse_plan_text("I could not come up with a plan.").is_err());
        assert!(parse_plan_text("[]").is_err());
    }
}
