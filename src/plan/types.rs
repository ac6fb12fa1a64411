//! 计划模型：AgentRole / Step / Plan / ReplanRequest
//!
//! Step 构造后不可变；重规划时整体替换 Plan，从不原地修改。
//! 执行前必须经过 `Plan::normalized`：恰好一个 is_final 步骤，位于末尾，且目标为 persona。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 逻辑智能体角色（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    #[serde(alias = "code")]
    Coder,
    #[serde(alias = "code_reviewer", alias = "critic")]
    CodeReviewer,
    #[serde(alias = "art_reviewer")]
    ArtReviewer,
    #[serde(alias = "prompt_refiner", alias = "enhancer")]
    PromptRefiner,
    #[serde(alias = "planner_self", alias = "planner")]
    PlannerSelf,
    Persona,
    #[serde(alias = "proactive_art_advisor")]
    ProactiveArtAdvisor,
}

impl AgentRole {
    pub const ALL: [AgentRole; 7] = [
        AgentRole::Coder,
        AgentRole::CodeReviewer,
        AgentRole::ArtReviewer,
        AgentRole::PromptRefiner,
        AgentRole::PlannerSelf,
        AgentRole::Persona,
        AgentRole::ProactiveArtAdvisor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Coder => "coder",
            AgentRole::CodeReviewer => "code-reviewer",
            AgentRole::ArtReviewer => "art-reviewer",
            AgentRole::PromptRefiner => "prompt-refiner",
            AgentRole::PlannerSelf => "planner-self",
            AgentRole::Persona => "persona",
            AgentRole::ProactiveArtAdvisor => "proactive-art-advisor",
        }
    }

    /// 评审类角色：其输出视为 critique，可注入下一步的反馈占位符，并参与评分
    pub fn is_reviewer(&self) -> bool {
        matches!(self, AgentRole::CodeReviewer | AgentRole::ArtReviewer)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        AgentRole::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| AgentError::InvalidPlan(format!("unknown agent role '{}'", s)))
    }
}

/// 计划中的一步：目标角色、指令、是否为最终步骤
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    agent_name: AgentRole,
    instruction: String,
    #[serde(default)]
    is_final: bool,
}

/// 规划器未给出合法最终步骤时追加的 persona 复核指令
const FINAL_REVIEW_INSTRUCTION: &str =
    "Review everything produced for this request and present the final result to the user.";

impl Step {
    pub fn new(agent_name: AgentRole, instruction: impl Into<String>, is_final: bool) -> Self {
        Self {
            agent_name,
            instruction: instruction.into(),
            is_final,
        }
    }

    pub fn agent(&self) -> AgentRole {
        self.agent_name
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// 返回去掉 final 标记的新步骤（原步骤不变）
    fn demoted(self) -> Self {
        Self {
            is_final: false,
            ..self
        }
    }

    fn final_review() -> Self {
        Self::new(AgentRole::Persona, FINAL_REVIEW_INSTRUCTION, true)
    }
}

/// 有序、非空的步骤序列
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// 仅校验非空；最终步骤约束由 `normalized` 负责
    pub fn from_steps(steps: Vec<Step>) -> Result<Self, AgentError> {
        if steps.is_empty() {
            return Err(AgentError::InvalidPlan("plan has no steps".to_string()));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// 重写计划使其满足最终步骤约束：
    /// 末尾步骤已是 final 且为 persona 时保留，其余 final 标记全部降级；
    /// 否则全部降级并追加一个合成的 persona 复核步骤。
    pub fn normalized(self) -> Plan {
        let keep_last = self
            .steps
            .last()
            .map(|s| s.is_final && s.agent_name == AgentRole::Persona)
            .unwrap_or(false);
        let n = self.steps.len();
        let mut demoted = 0usize;
        let mut steps: Vec<Step> = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                if keep_last && i + 1 == n {
                    s
                } else {
                    if s.is_final {
                        demoted += 1;
                    }
                    s.demoted()
                }
            })
            .collect();
        if !keep_last {
            steps.push(Step::final_review());
        }
        if demoted > 0 || !keep_last {
            tracing::debug!(demoted, appended = !keep_last, "plan normalized");
        }
        Plan { steps }
    }

    /// 是否满足最终步骤约束
    pub fn is_normalized(&self) -> bool {
        let finals = self.steps.iter().filter(|s| s.is_final).count();
        finals == 1
            && self
                .steps
                .last()
                .map(|s| s.is_final && s.agent_name == AgentRole::Persona)
                .unwrap_or(false)
    }
}

/// 重规划请求：原因与触发角色
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplanRequest {
    pub reason: String,
    pub triggering_agent: AgentRole,
}

impl ReplanRequest {
    pub fn new(reason: impl Into<String>, triggering_agent: AgentRole) -> Self {
        Self {
            reason: reason.into(),
            triggering_agent,
        }
    }
}

/// 交给 Planner 的重规划上下文：原因、触发角色、近期工作区动作摘要
#[derive(Debug, Clone)]
pub struct ReplanContext {
    pub request: ReplanRequest,
    pub recent_actions: Vec<String>,
}

impl ReplanContext {
    /// 拼成 prompt 片段
    pub fn digest(&self) -> String {
        let mut s = format!(
            "## Replan requested by {}\n{}\n",
            self.request.triggering_agent, self.request.reason
        );
        if !self.recent_actions.is_empty() {
            s.push_str("\n## Recent workspace actions\n");
            for a in &self.recent_actions {
                s.push_str(&format!("- {}\n", a));
            }
        }
        s
    }
}
