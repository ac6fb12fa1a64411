//! 以 LlmClient 为后端的 Planner / Agent 适配器
//!
//! 提示词只描述协议（计划 JSON 格式、指令语法、评分格式、重规划哨兵），具体措辞由外层可覆盖。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::reply::REPLAN_SENTINEL;
use crate::agents::{Agent, AgentContext, AgentReply, Planner};
use crate::core::AgentError;
use crate::llm::{LlmClient, Message};
use crate::plan::{parse_plan_text, AgentRole, Plan, ReplanContext};

const PLANNER_PROMPT: &str = "You are the planner of a team of software agents. \
Break the user's request into steps. Reply with a JSON array only, each element \
{\"agent_name\": <role>, \"instruction\": <text>, \"is_final\": <bool>}. \
Available roles: coder, code-reviewer, art-reviewer, prompt-refiner, planner-self, persona, proactive-art-advisor. \
A reviewer step may reference the previous reviewer's feedback with the placeholder {critique}. \
The last step must be a persona step with is_final true.";

/// 角色的默认系统提示词
pub fn default_role_prompt(role: AgentRole) -> String {
    match role {
        AgentRole::Coder => format!(
            "You are the coder. Act on the workspace by writing directives wrapped in single backticks, \
             e.g. `write(\"src/main.py\", \"print(1)\")`. Arguments must be literals. \
             Available: create, write, delete, rename, run, generate_image, set_preference, \
             get_preference, list_directory, replace_snippet, edit_lines. \
             If the plan cannot work, end your reply with a line `{} <reason>`.",
            REPLAN_SENTINEL
        ),
        AgentRole::CodeReviewer => "You are the code reviewer. Critique the latest changes and end with \
             a line `GRADE: <0-100>/100`."
            .to_string(),
        AgentRole::ArtReviewer => "You are the art reviewer. Critique the given image and end with \
             a line `GRADE: <0-100>/100`."
            .to_string(),
        AgentRole::PromptRefiner => "Rewrite the user's request into a clearer, more specific request. \
             Reply with the rewritten request only."
            .to_string(),
        AgentRole::PlannerSelf => "You reflect on the current plan and report problems.".to_string(),
        AgentRole::Persona => "You are the friendly assistant persona. Summarize what the team did \
             for the user."
            .to_string(),
        AgentRole::ProactiveArtAdvisor => "Suggest visual assets that would improve the project."
            .to_string(),
    }
}

/// 把 AgentContext 渲染成提示文本
pub fn render_context(instruction: &str, ctx: &AgentContext) -> String {
    let mut out = format!(
        "User request: {}\nStep {}/{}\nInstruction: {}\n",
        ctx.request,
        ctx.step_index + 1,
        ctx.plan_len,
        instruction
    );
    if let Some(prev) = &ctx.previous_output {
        out.push_str("\nPrevious step output:\n");
        out.push_str(prev);
        out.push('\n');
    }
    if let Some(artifact) = &ctx.artifact {
        out.push_str(&format!("\nArtifact under review: {}\n", artifact));
    }
    if !ctx.recent_changes.is_empty() {
        out.push_str("\nRecent changes:\n");
        for c in &ctx.recent_changes {
            out.push_str("- ");
            out.push_str(c);
            out.push('\n');
        }
    }
    if !ctx.project_files.is_empty() {
        out.push_str("\nProject files:\n");
        out.push_str(&ctx.project_files.join("\n"));
        out.push('\n');
    }
    for snap in &ctx.changed_files {
        out.push_str(&format!("\n--- {} ---\n{}\n", snap.path, snap.content));
    }
    out
}

pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: PLANNER_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn get_plan(&self, request: &str, replan: Option<&ReplanContext>) -> Result<Plan, AgentError> {
        let mut user = format!("Request: {}", request);
        if let Some(ctx) = replan {
            user.push_str("\n\nThe previous plan must be replaced.\n");
            user.push_str(&ctx.digest());
        }
        let messages = [Message::system(&self.system_prompt), Message::user(user)];
        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::PlannerFailed)?;
        parse_plan_text(&raw)
    }
}

pub struct LlmAgent {
    llm: Arc<dyn LlmClient>,
    role: AgentRole,
    system_prompt: String,
    streaming: bool,
}

impl LlmAgent {
    pub fn new(llm: Arc<dyn LlmClient>, role: AgentRole) -> Self {
        Self {
            llm,
            role,
            system_prompt: default_role_prompt(role),
            streaming: false,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// 以流式方式返回回复
    pub fn streaming(mut self, on: bool) -> Self {
        self.streaming = on;
        self
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }
}

#[async_trait]
impl Agent for LlmAgent {
    async fn invoke(&self, instruction: &str, context: &AgentContext) -> Result<AgentReply, AgentError> {
        let messages = [
            Message::system(&self.system_prompt),
            Message::user(render_context(instruction, context)),
        ];
        let fail = |reason: String| AgentError::AgentFailed {
            role: self.role,
            reason,
        };
        if self.streaming {
            let stream = self.llm.complete_stream(&messages).await.map_err(fail)?;
            Ok(AgentReply::Stream(stream))
        } else {
            let text = self.llm.complete(&messages).await.map_err(fail)?;
            Ok(AgentReply::Text(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::plan::ReplanRequest;

    #[tokio::test]
    async fn test_planner_parses_llm_json() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"Here you go: [{"agent_name": "coder", "instruction": "build it"}]"#,
        ]));
        let planner = LlmPlanner::new(llm.clone());
        let plan = planner.get_plan("make a game", None).await.unwrap();
        assert_eq!(plan.steps()[0].agent(), AgentRole::Coder);

        let ctx = ReplanContext {
            request: ReplanRequest::new("tests failed", AgentRole::Coder),
            recent_actions: vec!["wrote main.py".into()],
        };
        llm.push_response("not json at all");
        assert!(planner.get_plan("make a game", Some(&ctx)).await.is_err());
        let last_call = llm.calls().pop().unwrap();
        assert!(last_call[1].content.contains("tests failed"));
    }

    #[tokio::test]
    async fn test_agent_text_and_failure() {
        let llm = Arc::new(MockLlmClient::scripted(["done"]));
        llm.push_failure("rate limited");
        let agent = LlmAgent::new(llm.clone(), AgentRole::Coder);
        let ctx = AgentContext {
            request: "r".into(),
            plan_len: 2,
            previous_output: Some("critique here".into()),
            ..Default::default()
        };
        match agent.invoke("do it", &ctx).await.unwrap() {
            AgentReply::Text(t) => assert_eq!(t, "done"),
            other => panic!("unexpected reply {:?}", other),
        }
        let err = agent.invoke("do it", &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::AgentFailed { role: AgentRole::Coder, .. }));
        assert!(llm.calls()[0][1].content.contains("critique here"));
    }
}
