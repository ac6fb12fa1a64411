//! 指令注册表
//!
//! 所有指令实现 DirectiveHandler trait（name / description / execute），由 DirectiveRegistry 按名注册与查找。
//! 名字以下划线形式存储，查找时把 `-` 规范为 `_`，因此 `list-directory` 与 `list_directory` 等价。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::DirectiveError;
use crate::directives::{DirectiveEvent, Literal};
use crate::workspace::{Workspace, WorkspaceState};

/// 指令执行时可访问的工作区与缓存
pub struct DirectiveContext<'a> {
    pub workspace: &'a Workspace,
    pub state: &'a mut WorkspaceState,
    /// generate_image 产出的文件在此累积
    pub artifacts: &'a mut Vec<String>,
}

/// 参数访问器：按位置取值并做类型校验
pub struct Args<'a> {
    directive: &'a str,
    values: &'a [Literal],
}

impl<'a> Args<'a> {
    pub fn new(directive: &'a str, values: &'a [Literal]) -> Self {
        Self { directive, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 参数个数须在 [min, max] 内
    pub fn expect_count(&self, min: usize, max: usize) -> Result<(), DirectiveError> {
        let got = self.values.len();
        if got < min || got > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{}-{}", min, max)
            };
            return Err(DirectiveError::ArgumentCount {
                directive: self.directive.to_string(),
                expected,
                got,
            });
        }
        Ok(())
    }

    fn type_error(&self, index: usize, expected: &'static str) -> DirectiveError {
        DirectiveError::ArgumentType {
            directive: self.directive.to_string(),
            index,
            expected,
        }
    }

    pub fn text(&self, index: usize) -> Result<&'a str, DirectiveError> {
        match self.values.get(index) {
            Some(Literal::Text(s)) => Ok(s.as_str()),
            _ => Err(self.type_error(index, "text")),
        }
    }

    pub fn text_or(&self, index: usize, default: &'a str) -> Result<&'a str, DirectiveError> {
        if index >= self.values.len() {
            return Ok(default);
        }
        self.text(index)
    }

    /// 非负整数（行号等）
    pub fn index(&self, index: usize) -> Result<usize, DirectiveError> {
        match self.values.get(index) {
            Some(Literal::Int(n)) if *n >= 0 => Ok(*n as usize),
            _ => Err(self.type_error(index, "a non-negative integer")),
        }
    }

    pub fn flag_or(&self, index: usize, default: bool) -> Result<bool, DirectiveError> {
        match self.values.get(index) {
            None => Ok(default),
            Some(Literal::Bool(b)) => Ok(*b),
            Some(_) => Err(self.type_error(index, "a boolean")),
        }
    }
}

/// 指令处理器 trait
#[async_trait]
pub trait DirectiveHandler: Send + Sync {
    /// 指令名（下划线形式）
    fn name(&self) -> &str;

    /// 指令签名与说明（供提示词列出可用指令）
    fn description(&self) -> &str;

    async fn execute(
        &self,
        args: &Args<'_>,
        ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError>;
}

/// 规范化指令名：`-` → `_`
pub fn canonical_name(name: &str) -> String {
    name.trim().replace('-', "_")
}

#[derive(Default, Clone)]
pub struct DirectiveRegistry {
    handlers: HashMap<String, Arc<dyn DirectiveHandler>>,
}

impl DirectiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: impl DirectiveHandler + 'static) {
        let name = canonical_name(handler.name());
        self.handlers.insert(name, Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DirectiveHandler>> {
        self.handlers.get(&canonical_name(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&canonical_name(name))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// (name, description) 列表，按名排序
    pub fn descriptions(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .handlers
            .iter()
            .map(|(name, h)| (name.clone(), h.description().to_string()))
            .collect();
        out.sort();
        out
    }
}
