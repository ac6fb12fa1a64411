//! 计划执行器：主控循环
//!
//! 负责：（可选）改写请求 → 取计划并规范化 → 逐步派发给对应角色 → 解释回复中的指令 →
//! 检测重规划（指令信号优先，其次是回复末尾的哨兵行）→ 评审结束后决定重做还是接受。
//! 所有进度通过 EventSink 送出；`spawn` 在独立线程上运行，调用方只需轮询 RunHandle。

use std::sync::Arc;
use std::thread::JoinHandle;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::agents::{AgentContext, AgentReply, AgentRoster, AgentText, Planner};
use crate::config::OrchestratorSection;
use crate::core::events::{EventKind, EventSink, OrchestratorEvent, RunOutcome};
use crate::core::{AgentError, OrchestratorError, RecoveryAction, RecoveryEngine, RunState, StepError};
use crate::directives::{DirectiveEvent, DirectiveInterpreter};
use crate::grading::{extract_grade, trash_artifacts, AttemptGrades, GradingPolicy, RetryDecision, VariantGrade};
use crate::memory::MemoryJournal;
use crate::plan::{AgentRole, Plan, ReplanContext, ReplanRequest, Step};
use crate::workspace::{Workspace, WorkspaceState};

/// 指令中的评审反馈占位符
pub const CRITIQUE_PLACEHOLDER: &str = "{critique}";

const ENHANCE_INSTRUCTION: &str =
    "Rewrite the user's request so it is specific and actionable. Reply with the rewritten request only.";

/// 记忆日志优先级
const PRIORITY_REPLAN: u8 = 1;
const PRIORITY_ERROR: u8 = 2;
const PRIORITY_STEP: u8 = 3;

/// 日志中单步输出的预览长度（字符）
const JOURNAL_PREVIEW_CHARS: usize = 300;

/// 若上一步是评审，用其输出替换指令中的占位符
pub fn inject_feedback(instruction: &str, previous_role: Option<AgentRole>, previous: Option<&str>) -> String {
    match (previous_role, previous) {
        (Some(role), Some(critique)) if role.is_reviewer() && instruction.contains(CRITIQUE_PLACEHOLDER) => {
            instruction.replace(CRITIQUE_PLACEHOLDER, critique)
        }
        _ => instruction.to_string(),
    }
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 单步执行的汇总结果
#[derive(Debug, Default)]
struct StepOutcome {
    /// 去掉哨兵行后的文本
    text: String,
    /// 重规划原因；第一条决定本次重规划，其余一并上报
    replans: Vec<String>,
    changed: Vec<String>,
    artifacts: Vec<String>,
    variant_grades: Vec<VariantGrade>,
}

impl StepOutcome {
    fn absorb(&mut self, other: StepOutcome) {
        if !self.text.is_empty() && !other.text.is_empty() {
            self.text.push_str("\n\n");
        }
        self.text.push_str(&other.text);
        self.replans.extend(other.replans);
        self.changed.extend(other.changed);
        self.artifacts.extend(other.artifacts);
        self.variant_grades.extend(other.variant_grades);
    }
}

/// 一次「coder → 评审」循环的累积状态
#[derive(Debug, Default)]
struct ReviewCycle {
    coder_index: Option<usize>,
    attempt: u32,
    artifacts: Vec<String>,
    grades: AttemptGrades,
    critiques: Vec<String>,
}

impl ReviewCycle {
    fn begin_attempt(&mut self, coder_index: usize, artifacts: Vec<String>) {
        if self.coder_index != Some(coder_index) {
            self.attempt = 0;
        }
        self.coder_index = Some(coder_index);
        self.attempt += 1;
        self.artifacts = artifacts;
        self.grades = AttemptGrades::default();
        self.critiques.clear();
    }

    fn is_active(&self) -> bool {
        self.coder_index.is_some()
    }

    fn critique(&self) -> String {
        self.critiques.join("\n\n")
    }
}

pub struct Orchestrator {
    workspace: Workspace,
    state: WorkspaceState,
    planner: Arc<dyn Planner>,
    agents: AgentRoster,
    interpreter: DirectiveInterpreter,
    journal: MemoryJournal,
    recovery: RecoveryEngine,
    grading: GradingPolicy,
    settings: OrchestratorSection,
    run_state: RunState,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        workspace: Workspace,
        state: WorkspaceState,
        planner: Arc<dyn Planner>,
        agents: AgentRoster,
        interpreter: DirectiveInterpreter,
        journal: MemoryJournal,
        grading: GradingPolicy,
        settings: OrchestratorSection,
    ) -> Self {
        Self {
            workspace,
            state,
            planner,
            agents,
            interpreter,
            journal,
            recovery: RecoveryEngine::new(),
            grading,
            settings,
            run_state: RunState::Idle,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_state(&self) -> &WorkspaceState {
        &self.state
    }

    pub fn journal(&self) -> &MemoryJournal {
        &self.journal
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    /// 在独立工作线程上运行一次请求
    pub fn spawn(self, request: impl Into<String>) -> Result<RunHandle, OrchestratorError> {
        let request = request.into();
        let (sink, events) = EventSink::channel();
        let run_id = sink.run_id();
        let worker = std::thread::Builder::new()
            .name("maestro-orchestrator".to_string())
            .spawn(move || {
                let mut orchestrator = self;
                match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => {
                        // 结果已经以 Done 事件的形式送出
                        let _ = rt.block_on(orchestrator.run(&request, &sink));
                    }
                    Err(e) => {
                        let reason = format!("failed to start runtime: {}", e);
                        sink.error(reason.clone());
                        sink.emit(EventKind::Done {
                            outcome: RunOutcome::Failed { reason: reason.clone() },
                        });
                        orchestrator.run_state = RunState::Failed { reason };
                    }
                }
                orchestrator
            })
            .map_err(|e| OrchestratorError::WorkerSpawn(e.to_string()))?;
        Ok(RunHandle {
            run_id,
            events,
            worker: Some(worker),
        })
    }

    /// 执行一次请求；无论成败都以一条 Done 事件结尾
    pub async fn run(&mut self, request: &str, sink: &EventSink) -> Result<(), OrchestratorError> {
        let span = tracing::info_span!("run", run_id = %sink.run_id());
        let result = self.run_inner(request, sink).instrument(span).await;
        match &result {
            Ok(()) => {
                self.run_state = RunState::Completed;
                tracing::info!(run_id = %sink.run_id(), "run completed");
                sink.emit(EventKind::Done {
                    outcome: RunOutcome::Completed,
                });
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(run_id = %sink.run_id(), error = %reason, "run failed");
                self.remember("error", &reason, PRIORITY_ERROR);
                self.run_state = RunState::Failed {
                    reason: reason.clone(),
                };
                sink.error(reason.clone());
                sink.emit(EventKind::Done {
                    outcome: RunOutcome::Failed { reason },
                });
            }
        }
        result
    }

    async fn run_inner(&mut self, request: &str, sink: &EventSink) -> Result<(), OrchestratorError> {
        sink.status(format!("Received request: {}", preview(request, 200)));
        let request = self.enhance(request, sink).await;
        let mut plan = self.request_plan(&request, None, sink).await?;

        let mut replans = 0usize;
        let mut index = 0usize;
        let mut previous: Option<String> = None;
        let mut previous_role: Option<AgentRole> = None;
        let mut changed: Vec<String> = Vec::new();
        let mut cycle = ReviewCycle::default();

        while let Some(step) = plan.get(index).cloned() {
            let role = step.agent();
            self.run_state = RunState::Running {
                step_index: index,
                plan_len: plan.len(),
            };
            sink.status(format!("Step {}/{}: {}", index + 1, plan.len(), role));
            tracing::info!(step = index, role = %role, "dispatching step");

            let instruction = inject_feedback(step.instruction(), previous_role, previous.as_deref());
            let outcome = match self
                .execute_step(&request, &plan, index, &step, &instruction, previous.clone(), &changed, &cycle, sink)
                .await
            {
                Ok(o) => o,
                Err(err) => match self.recovery.handle(&err) {
                    RecoveryAction::Replan(reason) => {
                        sink.error(err.to_string());
                        self.remember("error", &err.to_string(), PRIORITY_ERROR);
                        StepOutcome {
                            replans: vec![reason],
                            ..Default::default()
                        }
                    }
                    RecoveryAction::Abort => {
                        return Err(OrchestratorError::StepAborted {
                            index,
                            role,
                            source: err,
                        })
                    }
                },
            };

            if let Some(reason) = outcome.replans.first().cloned() {
                replans += 1;
                let replan = ReplanRequest::new(reason, role);
                for reason in &outcome.replans {
                    sink.emit(EventKind::ReplanRequested {
                        reason: reason.clone(),
                        triggering_agent: role,
                    });
                    self.remember("replan", &format!("{} requested a replan: {}", role, reason), PRIORITY_REPLAN);
                }
                if replans > self.settings.max_replans {
                    return Err(OrchestratorError::ReplanLimit(self.settings.max_replans));
                }
                self.run_state = RunState::AwaitingReplan {
                    request: replan.clone(),
                };
                let ctx = ReplanContext {
                    request: replan,
                    recent_actions: self.state.digest(self.settings.recent_actions_in_digest),
                };
                plan = self.request_plan(&request, Some(&ctx), sink).await?;
                index = 0;
                previous = None;
                previous_role = None;
                changed.clear();
                cycle = ReviewCycle::default();
                continue;
            }

            self.remember(
                "step",
                &format!(
                    "{} finished step {}/{}: {}",
                    role,
                    index + 1,
                    plan.len(),
                    preview(&outcome.text, JOURNAL_PREVIEW_CHARS)
                ),
                PRIORITY_STEP,
            );

            match role {
                AgentRole::Coder => cycle.begin_attempt(index, outcome.artifacts.clone()),
                AgentRole::CodeReviewer if cycle.is_active() => {
                    cycle.grades.code = extract_grade(&outcome.text);
                    cycle.critiques.push(outcome.text.clone());
                }
                AgentRole::ArtReviewer if cycle.is_active() => {
                    cycle.grades.variants.extend(outcome.variant_grades.iter().cloned());
                    cycle.critiques.push(outcome.text.clone());
                }
                _ => {}
            }

            let next_is_reviewer = plan
                .get(index + 1)
                .map(|s| s.agent().is_reviewer())
                .unwrap_or(false);
            if role.is_reviewer() && !next_is_reviewer && cycle.is_active() {
                if let Some(coder_index) = self.conclude_review(&mut cycle, sink) {
                    previous = Some(cycle.critique());
                    previous_role = Some(role);
                    changed = outcome.changed;
                    index = coder_index;
                    continue;
                }
            }

            previous = Some(outcome.text);
            previous_role = Some(role);
            changed = outcome.changed;
            index += 1;
        }
        Ok(())
    }

    /// 让 prompt-refiner 改写请求；未启用、未注册或失败时返回原请求
    async fn enhance(&mut self, request: &str, sink: &EventSink) -> String {
        if !self.settings.enhance_requests {
            return request.to_string();
        }
        let Some(agent) = self.agents.get(AgentRole::PromptRefiner) else {
            return request.to_string();
        };
        let ctx = AgentContext {
            request: request.to_string(),
            ..Default::default()
        };
        let reply = match agent.invoke(ENHANCE_INSTRUCTION, &ctx).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "request enhancement failed");
                sink.status("Request enhancement failed; using the original request");
                return request.to_string();
            }
        };
        match self.collect_text(AgentRole::PromptRefiner, reply, sink).await {
            Ok((raw, _)) => {
                let enhanced = AgentText::decode(&raw).into_text();
                if enhanced.trim().is_empty() {
                    request.to_string()
                } else {
                    sink.status("Request enhanced");
                    enhanced.trim().to_string()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "request enhancement stream failed");
                sink.status("Request enhancement failed; using the original request");
                request.to_string()
            }
        }
    }

    async fn request_plan(
        &mut self,
        request: &str,
        replan: Option<&ReplanContext>,
        sink: &EventSink,
    ) -> Result<Plan, OrchestratorError> {
        sink.status(if replan.is_some() { "Replanning" } else { "Planning" });
        let plan = self
            .planner
            .get_plan(request, replan)
            .await
            .map_err(OrchestratorError::Planning)?
            .normalized();
        let summary: Vec<String> = plan
            .steps()
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}: {}", i + 1, s.agent(), preview(s.instruction(), 80)))
            .collect();
        sink.status(format!("Plan with {} steps:\n{}", plan.len(), summary.join("\n")));
        self.remember("plan", &summary.join("; "), PRIORITY_STEP);
        self.run_state = RunState::Running {
            step_index: 0,
            plan_len: plan.len(),
        };
        Ok(plan)
    }

    fn build_context(
        &mut self,
        request: &str,
        index: usize,
        plan_len: usize,
        previous: Option<String>,
        changed: &[String],
    ) -> AgentContext {
        let project_files = match self.state.project_listing(&self.workspace) {
            Ok(listing) => listing.to_vec(),
            Err(e) => {
                tracing::warn!(error = %e, "project listing failed");
                Vec::new()
            }
        };
        let mut seen = std::collections::HashSet::new();
        let changed_files = changed
            .iter()
            .filter(|p| seen.insert(p.as_str()))
            .filter_map(|p| self.state.snapshot(&self.workspace, p).ok())
            .collect();
        AgentContext {
            request: request.to_string(),
            step_index: index,
            plan_len,
            previous_output: previous,
            recent_changes: self.state.digest(self.settings.recent_actions_in_digest),
            project_files,
            changed_files,
            artifact: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_step(
        &mut self,
        request: &str,
        plan: &Plan,
        index: usize,
        step: &Step,
        instruction: &str,
        previous: Option<String>,
        changed: &[String],
        cycle: &ReviewCycle,
        sink: &EventSink,
    ) -> Result<StepOutcome, StepError> {
        let role = step.agent();
        let agent = self.agents.get(role).ok_or(StepError::AgentUnavailable(role))?;
        let context = self.build_context(request, index, plan.len(), previous, changed);

        // 图片评审：对本轮每个变体各调用一次
        if role == AgentRole::ArtReviewer && cycle.is_active() && !cycle.artifacts.is_empty() {
            let mut combined = StepOutcome::default();
            for artifact in &cycle.artifacts {
                let ctx = AgentContext {
                    artifact: Some(artifact.clone()),
                    ..context.clone()
                };
                let reply = agent.invoke(instruction, &ctx).await?;
                let mut single = self.handle_reply(role, reply, sink).await?;
                let grade = extract_grade(&single.text);
                single.text = format!("[{}]\n{}", artifact, single.text);
                single.variant_grades.push(VariantGrade::new(artifact.clone(), grade));
                combined.absorb(single);
                if !combined.replans.is_empty() {
                    break;
                }
            }
            return Ok(combined);
        }

        let reply = agent.invoke(instruction, &context).await?;
        self.handle_reply(role, reply, sink).await
    }

    /// 汇总回复文本；流式回复的每个分片立即转发
    async fn collect_text(
        &self,
        role: AgentRole,
        reply: AgentReply,
        sink: &EventSink,
    ) -> Result<(String, Option<crate::agents::CoderReply>), StepError> {
        match reply {
            AgentReply::Text(text) => {
                sink.emit(EventKind::TextChunk {
                    role,
                    text: text.clone(),
                });
                Ok((text, None))
            }
            AgentReply::Stream(mut stream) => {
                let mut full = String::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|reason| AgentError::StreamBroken { role, reason })?;
                    sink.emit(EventKind::TextChunk {
                        role,
                        text: chunk.clone(),
                    });
                    full.push_str(&chunk);
                }
                Ok((full, None))
            }
            AgentReply::Structured(reply) => {
                sink.emit(EventKind::TextChunk {
                    role,
                    text: reply.text.clone(),
                });
                Ok((reply.text.clone(), Some(reply)))
            }
        }
    }

    async fn handle_reply(
        &mut self,
        role: AgentRole,
        reply: AgentReply,
        sink: &EventSink,
    ) -> Result<StepOutcome, StepError> {
        let (raw, structured) = self.collect_text(role, reply, sink).await?;
        let decoded = AgentText::decode(&raw);

        let (events, artifacts) = match structured {
            // 已自行执行过指令，只转发结果
            Some(reply) => {
                for event in &reply.events {
                    if let DirectiveEvent::FileChanged { .. } = event {
                        self.state.mark_listing_stale();
                    }
                }
                (reply.events, reply.artifacts)
            }
            None => {
                let report = self
                    .interpreter
                    .interpret(decoded.text(), &self.workspace, &mut self.state)
                    .await;
                (report.events, report.artifacts)
            }
        };

        let mut outcome = StepOutcome {
            artifacts,
            ..Default::default()
        };
        for event in &events {
            sink.forward(event);
            match event {
                DirectiveEvent::FileChanged { path } => outcome.changed.push(path.clone()),
                DirectiveEvent::Replan { reason } => outcome.replans.push(reason.clone()),
                _ => {}
            }
        }
        if outcome.replans.is_empty() {
            outcome.replans.extend(decoded.replan_reason().map(str::to_string));
        }
        outcome.text = decoded.into_text();
        Ok(outcome)
    }

    /// 评审结束：按策略决定重做或接受，并整理图片变体。返回需要跳回的 coder 步骤下标
    fn conclude_review(&mut self, cycle: &mut ReviewCycle, sink: &EventSink) -> Option<usize> {
        let coder_index = cycle.coder_index?;
        let decision = self.grading.decide(cycle.attempt, &cycle.grades, &cycle.artifacts);
        let curated = trash_artifacts(&self.workspace, &mut self.state, decision.trash());
        for path in &curated.trashed {
            sink.emit(EventKind::FileChanged { path: path.clone() });
        }
        let score = cycle
            .grades
            .aggregate()
            .map(|g| g.to_string())
            .unwrap_or_else(|| "ungraded".to_string());
        self.remember(
            "grading",
            &format!("attempt {} scored {}: {:?}", cycle.attempt, score, decision),
            PRIORITY_STEP,
        );

        match decision {
            RetryDecision::Retry { .. } => {
                sink.status(format!(
                    "Attempt {} scored {} (threshold {}); retrying ({}/{})",
                    cycle.attempt,
                    score,
                    self.grading.threshold,
                    cycle.attempt + 1,
                    self.grading.max_attempts
                ));
                Some(coder_index)
            }
            RetryDecision::Accept { keep, .. } => {
                sink.status(match keep {
                    Some(path) => format!("Accepted with score {}; keeping {}", score, path),
                    None => format!("Accepted with score {}", score),
                });
                *cycle = ReviewCycle::default();
                None
            }
            RetryDecision::Exhausted { keep, .. } => {
                tracing::warn!(attempts = cycle.attempt, score = %score, "grading retries exhausted");
                sink.status(format!(
                    "Warning: score {} still below {} after {} attempts; accepting as-is{}",
                    score,
                    self.grading.threshold,
                    cycle.attempt,
                    keep.map(|p| format!(", keeping {}", p)).unwrap_or_default()
                ));
                *cycle = ReviewCycle::default();
                None
            }
        }
    }

    /// 写入记忆日志；失败只记日志，不影响运行
    fn remember(&self, category: &str, content: &str, priority: u8) {
        match self.journal.append(category, content, priority) {
            Ok(Some(pruned)) => tracing::debug!(removed = pruned.removed, "journal pruned"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "journal append failed"),
        }
    }
}

/// 后台运行的句柄：轮询事件、等待结束
pub struct RunHandle {
    run_id: Uuid,
    events: mpsc::UnboundedReceiver<OrchestratorEvent>,
    worker: Option<JoinHandle<Orchestrator>>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// 取出目前已到达的全部事件（可能为空），不阻塞
    pub fn poll(&mut self) -> Vec<OrchestratorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map(|w| w.is_finished()).unwrap_or(true)
    }

    /// 等待工作线程结束，返回编排器（可复用于下一次请求）与剩余事件
    pub fn join(mut self) -> Result<(Orchestrator, Vec<OrchestratorEvent>), OrchestratorError> {
        let worker = self.worker.take().ok_or(OrchestratorError::WorkerPanicked)?;
        let orchestrator = worker.join().map_err(|_| OrchestratorError::WorkerPanicked)?;
        let rest = self.poll();
        Ok((orchestrator, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_feedback_only_after_reviewer() {
        let ins = "Fix the issues: {critique}";
        assert_eq!(
            inject_feedback(ins, Some(AgentRole::CodeReviewer), Some("missing tests")),
            "Fix the issues: missing tests"
        );
        assert_eq!(inject_feedback(ins, Some(AgentRole::Coder), Some("text")), ins);
        assert_eq!(inject_feedback(ins, None, None), ins);
        assert_eq!(
            inject_feedback("no placeholder", Some(AgentRole::ArtReviewer), Some("x")),
            "no placeholder"
        );
    }

    #[test]
    fn test_review_cycle_attempts() {
        let mut cycle = ReviewCycle::default();
        cycle.begin_attempt(0, vec!["a.png".into()]);
        assert_eq!(cycle.attempt, 1);
        cycle.grades.code = Some(10);
        cycle.begin_attempt(0, vec![]);
        assert_eq!(cycle.attempt, 2);
        assert!(cycle.grades.is_empty());
        cycle.begin_attempt(3, vec![]);
        assert_eq!(cycle.attempt, 1);
    }
}
