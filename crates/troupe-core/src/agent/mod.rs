//! Agent core: owns the message history, step counter and runtime state,
//! and drives the model↔tool loop.
//!
//! # Step loop
//!
//! ```text
//! flush queue (atomic append + persist)
//!       │
//!       ▼
//! pre-model hooks → model.complete() → post-model hooks
//!       │
//!       ▼ append assistant message
//! for each tool call:
//!   resolve tool        → missing: synthesized error message
//!   permission engine   → deny/ask: synthesized error message
//!   pre-tool hooks      → Deny / Skip(mock) / RequireApproval short-circuits
//!   execute (timed)     → errors captured as is_error outcomes
//!   post-tool hooks     → transform outcome
//!       │
//!       ▼ append outcomes, bump step, notify scheduler, messages-changed
//! no tool calls → turn complete; step ≥ max_iterations → MAX_ITERATIONS
//! ```
//!
//! At most one loop runs per agent: concurrent `run` callers queue behind
//! an internal mutex. A paused agent keeps accepting sends but does not
//! advance until resumed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};

use crate::cancel::CancelToken;
use crate::checkpoint::{Checkpoint, Checkpointer};
use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::hooks::{HookDecision, HookOrigin, HookPipeline, Hooks};
use crate::model::{ModelProvider, ModelRequest};
use crate::permissions::{PermissionDecision, PermissionEngine};
use crate::queue::{FlushSink, MessageQueue, SendOptions};
use crate::scheduler::StepScheduler;
use crate::skills::SkillsManager;
use crate::store::StateStore;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{AgentRuntimeState, AgentStatus, Message, ToolCall, ToolOutcome};

// ─── Builder ───────────────────────────────────────────────────────────────

/// Assembles an [`Agent`] from its collaborators. Only the model provider
/// is mandatory; everything else has a working default.
pub struct AgentBuilder {
    config: AgentConfig,
    model: Option<Arc<dyn ModelProvider>>,
    registry: Arc<ToolRegistry>,
    permissions: Arc<PermissionEngine>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    store: Option<Arc<dyn StateStore>>,
    skills: Option<Arc<SkillsManager>>,
    hooks: Vec<(HookOrigin, Arc<dyn Hooks>)>,
    restore: Option<Checkpoint>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
            model: None,
            registry: Arc::new(ToolRegistry::new()),
            permissions: Arc::new(PermissionEngine::new()),
            checkpointer: None,
            store: None,
            skills: None,
            hooks: Vec::new(),
            restore: None,
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_model(mut self, model: Arc<dyn ModelProvider>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<PermissionEngine>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_skills(mut self, skills: Arc<SkillsManager>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn with_hooks(mut self, origin: HookOrigin, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks.push((origin, hooks));
        self
    }

    /// Seed history, step counter and skills state from a checkpoint.
    pub fn restore_from(mut self, checkpoint: Checkpoint) -> Self {
        self.restore = Some(checkpoint);
        self
    }

    pub fn build(self) -> AgentResult<Agent> {
        let model = self
            .model
            .ok_or_else(|| AgentError::invalid_state("agent requires a model provider"))?;

        let (agent_id, session_id, history, step_count) = match &self.restore {
            Some(cp) => (
                cp.agent_id.clone(),
                cp.session_id.clone(),
                cp.messages.clone(),
                cp.step_count,
            ),
            None => (
                self.config
                    .agent_id
                    .clone()
                    .unwrap_or_else(|| format!("agent-{}", uuid::Uuid::new_v4().simple())),
                self.config
                    .session_id
                    .clone()
                    .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4().simple())),
                Vec::new(),
                0,
            ),
        };

        if let (Some(cp), Some(skills)) = (&self.restore, &self.skills)
            && let Some(state) = &cp.skills_state
        {
            skills.restore_state(state.clone());
        }

        let hook_pipeline = HookPipeline::new();
        for (origin, hooks) in self.hooks {
            hook_pipeline.register(origin, hooks);
        }

        Ok(Agent {
            agent_id,
            session_id,
            queue: MessageQueue::new(self.config.max_pending),
            config: self.config,
            model,
            registry: self.registry,
            permissions: self.permissions,
            hooks: hook_pipeline,
            scheduler: StepScheduler::new(),
            checkpointer: self.checkpointer,
            store: self.store,
            skills: self.skills,
            history: tokio::sync::Mutex::new(history),
            step_count: AtomicU64::new(step_count),
            state: RwLock::new(AgentRuntimeState::Ready),
            run_lock: tokio::sync::Mutex::new(()),
            disposed: AtomicBool::new(false),
        })
    }
}

// ─── Agent ─────────────────────────────────────────────────────────────────

/// A stateful conversational actor.
pub struct Agent {
    agent_id: String,
    session_id: String,
    config: AgentConfig,
    model: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    permissions: Arc<PermissionEngine>,
    hooks: HookPipeline,
    queue: MessageQueue,
    scheduler: StepScheduler,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    store: Option<Arc<dyn StateStore>>,
    skills: Option<Arc<SkillsManager>>,
    history: tokio::sync::Mutex<Vec<Message>>,
    step_count: AtomicU64,
    state: RwLock<AgentRuntimeState>,
    run_lock: tokio::sync::Mutex<()>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("agent_id", &self.agent_id)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

struct HistorySink<'a> {
    agent: &'a Agent,
}

#[async_trait]
impl FlushSink for HistorySink<'_> {
    async fn add_message(&self, message: Message) -> AgentResult<()> {
        self.agent.history.lock().await.push(message);
        Ok(())
    }

    async fn persist(&self) -> AgentResult<()> {
        self.agent.persist_conversation().await
    }
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Hook registration point for callers.
    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }

    /// The agent's step-relative scheduler.
    pub fn scheduler(&self) -> &StepScheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Snapshot of the conversation history.
    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }

    // ── Public operations ─────────────────────────────────────────────────

    /// Buffer a message for the next flush. Accepted while paused.
    pub fn send(&self, text: &str, opts: SendOptions) -> AgentResult<String> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(AgentError::invalid_state("agent is disposed"));
        }
        self.queue.send(text, opts)
    }

    /// Once the returned `Arc` is installed, every user-kind send kicks off
    /// a step loop in the background if none is running.
    pub fn enable_auto_processing(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.queue.set_processing_hook(Arc::new(move || {
            if let Some(agent) = weak.upgrade() {
                tokio::spawn(async move {
                    if let Err(e) = agent.run(None, &CancelToken::new()).await {
                        tracing::warn!(agent_id = %agent.agent_id, error = %e, "auto run failed");
                    }
                });
            }
        }));
    }

    /// Optionally send `text`, then drive the step loop until the turn
    /// quiesces. At most one loop per agent; concurrent callers queue here.
    #[tracing::instrument(
        name = "agent.run",
        skip_all,
        fields(agent_id = %self.agent_id, inline_send = text.is_some()),
    )]
    pub async fn run(&self, text: Option<&str>, cancel: &CancelToken) -> AgentResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(AgentError::invalid_state("agent is disposed"));
        }
        if let Some(text) = text {
            self.send(text, SendOptions::default())?;
        }

        let _running = self.run_lock.lock().await;
        if *self.state.read() == AgentRuntimeState::Paused {
            return Ok(());
        }
        *self.state.write() = AgentRuntimeState::Working;
        let outcome = self.step_loop(cancel).await;
        {
            let mut state = self.state.write();
            if *state == AgentRuntimeState::Working {
                *state = AgentRuntimeState::Ready;
            }
        }
        outcome
    }

    /// Stop advancing the loop after the current iteration. Sends are
    /// still accepted.
    pub fn pause(&self) {
        *self.state.write() = AgentRuntimeState::Paused;
    }

    pub fn resume(&self) {
        let mut state = self.state.write();
        if *state == AgentRuntimeState::Paused {
            *state = AgentRuntimeState::Ready;
        }
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            agent_id: self.agent_id.clone(),
            session_id: self.session_id.clone(),
            state: *self.state.read(),
            step_count: self.step_count.load(Ordering::SeqCst),
            pending_messages: self.queue.pending_count(),
        }
    }

    /// Snapshot the whole agent. The save completes before the id is
    /// returned.
    pub async fn checkpoint(&self) -> AgentResult<String> {
        let checkpointer = self.require_checkpointer()?;
        let messages = self.history.lock().await.clone();
        let mut cp = Checkpoint::new(
            &self.agent_id,
            &self.session_id,
            messages,
            self.step_count.load(Ordering::SeqCst),
        );
        if let Some(skills) = &self.skills {
            cp.skills_state = Some(skills.state());
        }
        checkpointer.save(&cp).await
    }

    /// Checkpoint, fork the checkpoint, and construct the branched agent.
    /// This agent is untouched.
    pub async fn fork(&self, new_agent_id: &str) -> AgentResult<Agent> {
        let checkpointer = self.require_checkpointer()?;
        let source_id = self.checkpoint().await?;
        let forked_id = checkpointer.fork(&source_id, new_agent_id).await?;
        let forked = checkpointer
            .load(&forked_id)
            .await?
            .ok_or_else(|| AgentError::Checkpoint {
                id: Some(forked_id),
                reason: "forked checkpoint vanished before load".into(),
            })?;

        let mut builder = AgentBuilder::new()
            .with_config(AgentConfig {
                agent_id: Some(forked.agent_id.clone()),
                session_id: Some(forked.session_id.clone()),
                ..self.config.clone()
            })
            .with_model(self.model.clone())
            .with_registry(self.registry.clone())
            .with_permissions(self.permissions.clone())
            .with_checkpointer(checkpointer.clone())
            .restore_from(forked);
        if let Some(store) = &self.store {
            builder = builder.with_store(store.clone());
        }
        if let Some(skills) = &self.skills {
            builder = builder.with_skills(skills.clone());
        }
        builder.build()
    }

    /// Complete the queue and stop accepting work. Conversation state is
    /// persisted best-effort.
    pub async fn dispose(&self) -> AgentResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.queue.complete();
        if let Err(e) = self.persist_conversation().await {
            tracing::warn!(agent_id = %self.agent_id, error = %e, "final persist failed");
        }
        Ok(())
    }

    // ── Step loop ─────────────────────────────────────────────────────────

    async fn step_loop(&self, cancel: &CancelToken) -> AgentResult<()> {
        loop {
            if *self.state.read() == AgentRuntimeState::Paused {
                return Ok(());
            }
            cancel.check()?;

            self.flush_queue(cancel).await?;

            let request = self.build_request().await;
            self.hooks.pre_model(&request, cancel).await?;
            let response = self.model.complete(request, cancel).await?;
            self.hooks.post_model(&response, cancel).await?;

            let assistant = response.message;
            let calls: Vec<ToolCall> = assistant.calls().to_vec();
            self.history.lock().await.push(assistant);

            if !calls.is_empty() {
                let outcomes = self.execute_calls(&calls, cancel).await?;
                let mut history = self.history.lock().await;
                for outcome in outcomes {
                    history.push(outcome.into_message());
                }
            }

            let step = self.step_count.fetch_add(1, Ordering::SeqCst) + 1;
            self.scheduler.notify_step(step);
            let snapshot = self.history.lock().await.clone();
            self.hooks.messages_changed(&snapshot, cancel).await?;
            self.persist_conversation().await?;

            if calls.is_empty() {
                return Ok(());
            }
            if step >= self.config.max_iterations {
                return Err(AgentError::MaxIterations {
                    limit: self.config.max_iterations,
                });
            }
        }
    }

    /// Atomic flush: on append/persist failure the history is rolled back
    /// and the queue keeps every entry; on cancellation already-appended
    /// messages stay and the queue drops exactly those.
    async fn flush_queue(&self, cancel: &CancelToken) -> AgentResult<usize> {
        let baseline = self.history.lock().await.len();
        let sink = HistorySink { agent: self };
        match self.queue.flush(&sink, cancel).await {
            Ok(flushed) => Ok(flushed),
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                self.history.lock().await.truncate(baseline);
                Err(e)
            }
        }
    }

    async fn build_request(&self) -> ModelRequest {
        let mut system = self.config.system_prompt.clone();
        if let Some(skills) = &self.skills
            && let Some(fragment) = skills.available_skills_prompt()
        {
            system = Some(match system {
                Some(prompt) => format!("{prompt}\n\n{fragment}"),
                None => fragment,
            });
        }
        ModelRequest {
            system,
            messages: self.history.lock().await.clone(),
            tools: self.registry.specs(),
            metadata: Value::Null,
        }
    }

    async fn execute_calls(
        &self,
        calls: &[ToolCall],
        cancel: &CancelToken,
    ) -> AgentResult<Vec<ToolOutcome>> {
        // Concurrent execution only when every call in the batch opts in;
        // mixed batches run sequentially in call order.
        let all_parallel = calls.len() > 1
            && calls.iter().all(|call| {
                self.registry
                    .get(&call.name)
                    .map(|tool| tool.attributes().allow_parallel)
                    .unwrap_or(false)
            });

        if all_parallel {
            let futures = calls.iter().map(|call| self.execute_one(call, cancel));
            futures::future::join_all(futures).await.into_iter().collect()
        } else {
            let mut outcomes = Vec::with_capacity(calls.len());
            for call in calls {
                cancel.check()?;
                outcomes.push(self.execute_one(call, cancel).await?);
            }
            Ok(outcomes)
        }
    }

    #[tracing::instrument(
        name = "agent.tool",
        skip_all,
        fields(tool = %call.name, call_id = %call.id),
    )]
    async fn execute_one(&self, call: &ToolCall, cancel: &CancelToken) -> AgentResult<ToolOutcome> {
        let ctx = ToolContext {
            agent_id: self.agent_id.clone(),
            call_id: call.id.clone(),
            metadata: Value::Null,
        };

        let Some(tool) = self.registry.get(&call.name) else {
            let outcome = error_outcome(
                call,
                AgentError::ToolNotFound {
                    tool: call.name.clone(),
                }
                .to_string(),
            );
            return self.hooks.post_tool_use(outcome, &ctx, cancel).await;
        };

        let descriptor = tool.descriptor();
        let decision = self.permissions.evaluate(
            &self.config.permission_mode,
            &call.name,
            Some(&descriptor),
            &Value::Null,
        );
        match decision {
            PermissionDecision::Allow => {}
            PermissionDecision::Deny => {
                let outcome = self.denied_outcome(
                    call,
                    format!("denied by mode '{}'", self.config.permission_mode),
                );
                return self.hooks.post_tool_use(outcome, &ctx, cancel).await;
            }
            PermissionDecision::Ask => {
                // No approval collaborator is wired into the core; deny
                // conservatively rather than block the loop.
                let outcome = self.denied_outcome(
                    call,
                    "approval required but no approval collaborator is configured".to_string(),
                );
                return self.hooks.post_tool_use(outcome, &ctx, cancel).await;
            }
        }

        match self.hooks.pre_tool_use(call, &ctx, cancel).await? {
            None | Some(HookDecision::Allow) => {}
            Some(HookDecision::Deny { reason }) => {
                let outcome = self.denied_outcome(call, format!("denied by hook: {reason}"));
                return self.hooks.post_tool_use(outcome, &ctx, cancel).await;
            }
            Some(HookDecision::Skip { mock }) => {
                let outcome = ToolOutcome {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                    result: mock,
                    is_error: false,
                    duration_ms: 0,
                };
                return self.hooks.post_tool_use(outcome, &ctx, cancel).await;
            }
            Some(HookDecision::RequireApproval { reason }) => {
                let outcome = self.denied_outcome(
                    call,
                    reason.unwrap_or_else(|| {
                        "approval required but no approval collaborator is configured".into()
                    }),
                );
                return self.hooks.post_tool_use(outcome, &ctx, cancel).await;
            }
        }

        let started = Instant::now();
        let outcome = match tool.execute(call.input.clone(), &ctx, cancel).await {
            Ok(result) => ToolOutcome {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
                is_error: !result.success,
                result: result.render(),
                duration_ms: duration_ms(started),
            },
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool execution failed");
                ToolOutcome {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                    result: AgentError::ToolExecution {
                        tool: call.name.clone(),
                        call_id: call.id.clone(),
                        reason: e.to_string(),
                    }
                    .to_string(),
                    is_error: true,
                    duration_ms: duration_ms(started),
                }
            }
        };

        self.hooks.post_tool_use(outcome, &ctx, cancel).await
    }

    fn denied_outcome(&self, call: &ToolCall, reason: String) -> ToolOutcome {
        let message = AgentError::PermissionDenied {
            tool: call.name.clone(),
            call_id: call.id.clone(),
            reason,
        }
        .to_string();
        error_outcome(call, message)
    }

    async fn persist_conversation(&self) -> AgentResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let messages = self.history.lock().await.clone();
        let document = json!({
            "agentId": self.agent_id,
            "sessionId": self.session_id,
            "state": *self.state.read(),
            "stepCount": self.step_count.load(Ordering::SeqCst),
            "messages": messages,
        });
        store.save(&format!("agent:{}", self.agent_id), document).await
    }

    fn require_checkpointer(&self) -> AgentResult<&Arc<dyn Checkpointer>> {
        self.checkpointer
            .as_ref()
            .ok_or_else(|| AgentError::checkpoint("no checkpointer configured"))
    }
}

fn error_outcome(call: &ToolCall, message: String) -> ToolOutcome {
    ToolOutcome {
        id: call.id.clone(),
        name: call.name.clone(),
        input: call.input.clone(),
        result: message,
        is_error: true,
        duration_ms: 0,
    }
}

fn duration_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
