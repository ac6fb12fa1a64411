//! 回复文本边界解码
//!
//! Agent 可在回复最后一行写 `REQUEST_REPLAN: <reason>` 请求重规划。
//! 该约定只在这里解码一次；编排器内部只处理 `AgentText`，不再接触原始哨兵行。

/// 重规划哨兵前缀
pub const REPLAN_SENTINEL: &str = "REQUEST_REPLAN:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentText {
    Text(String),
    /// (去掉哨兵行后的文本, 原因)
    TextWithReplan(String, String),
}

impl AgentText {
    /// 只识别最后一个非空行上的哨兵
    pub fn decode(raw: &str) -> Self {
        let trimmed = raw.trim_end();
        let (body, last) = match trimmed.rfind('\n') {
            Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
            None => ("", trimmed),
        };
        match last.trim().strip_prefix(REPLAN_SENTINEL) {
            Some(reason) => {
                let reason = reason.trim();
                let reason = if reason.is_empty() {
                    "agent requested a replan".to_string()
                } else {
                    reason.to_string()
                };
                AgentText::TextWithReplan(body.trim_end().to_string(), reason)
            }
            None => AgentText::Text(raw.to_string()),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            AgentText::Text(t) | AgentText::TextWithReplan(t, _) => t,
        }
    }

    pub fn replan_reason(&self) -> Option<&str> {
        match self {
            AgentText::Text(_) => None,
            AgentText::TextWithReplan(_, r) => Some(r),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            AgentText::Text(t) | AgentText::TextWithReplan(t, _) => t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_untouched() {
        let t = AgentText::decode("hello\nworld\n");
        assert_eq!(t, AgentText::Text("hello\nworld\n".into()));
        assert!(t.replan_reason().is_none());
    }

    #[test]
    fn test_trailing_sentinel_stripped() {
        let t = AgentText::decode("tried it\nREQUEST_REPLAN: missing dependency\n\n");
        assert_eq!(t.text(), "tried it");
        assert_eq!(t.replan_reason(), Some("missing dependency"));
    }

    #[test]
    fn test_sentinel_only_recognised_on_last_line() {
        let t = AgentText::decode("REQUEST_REPLAN: early\nbut then continued");
        assert!(t.replan_reason().is_none());
        let bare = AgentText::decode("REQUEST_REPLAN:");
        assert_eq!(bare.replan_reason(), Some("agent requested a replan"));
        assert_eq!(bare.text(), "");
    }
}
