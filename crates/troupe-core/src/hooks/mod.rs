//! Hook pipeline: ordered pre/post interceptors for tools, model
//! round-trips and history changes.
//!
//! Registrations are mutated under a lock but iterated over a snapshot, so
//! a hook that registers another hook does not affect the turn already in
//! flight. Every fan-out checks the cancel token before invoking the next
//! interceptor.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::cancel::CancelToken;
use crate::error::AgentResult;
use crate::model::{ModelRequest, ModelResponse};
use crate::tools::ToolContext;
use crate::types::{Message, ToolCall, ToolOutcome};

// ─── Decisions ─────────────────────────────────────────────────────────────

/// What a `pre_tool_use` interceptor decided about a tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum HookDecision {
    /// Let the call proceed.
    Allow,
    /// Block the call; a tool-role error message is synthesized.
    Deny { reason: String },
    /// Do not execute the tool; append `mock` as its (non-error) result.
    Skip { mock: String },
    /// Hand control to the permission engine with a forced `ask`.
    RequireApproval { reason: Option<String> },
}

/// How a `post_tool_use` interceptor transforms an outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum PostHookResult {
    /// Leave the outcome as is.
    Pass,
    /// Substitute the whole outcome.
    Replace(ToolOutcome),
    /// Merge the set fields into the outcome.
    Update {
        result: Option<String>,
        is_error: Option<bool>,
    },
}

/// Who installed a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOrigin {
    Agent,
    ToolTune,
    Plugin,
}

// ─── Hooks trait ───────────────────────────────────────────────────────────

/// A set of optional interceptors. Every method defaults to a no-op so
/// implementors override only what they need.
#[async_trait]
pub trait Hooks: Send + Sync {
    /// Runs before a tool executes. The first non-`None` decision across
    /// the pipeline wins.
    async fn pre_tool_use(&self, _call: &ToolCall, _ctx: &ToolContext) -> Option<HookDecision> {
        None
    }

    /// Runs after a tool executed (or was denied/mocked). Interceptors run
    /// sequentially, each seeing the previous transformation.
    async fn post_tool_use(
        &self,
        _outcome: &ToolOutcome,
        _ctx: &ToolContext,
    ) -> Option<PostHookResult> {
        None
    }

    async fn pre_model(&self, _request: &ModelRequest) {}

    async fn post_model(&self, _response: &ModelResponse) {}

    async fn messages_changed(&self, _history: &[Message]) {}
}

/// One entry in the pipeline.
#[derive(Clone)]
pub struct HookRegistration {
    pub origin: HookOrigin,
    pub hooks: Arc<dyn Hooks>,
}

// ─── HookPipeline ──────────────────────────────────────────────────────────

/// Ordered chain of hook registrations.
#[derive(Default)]
pub struct HookPipeline {
    registrations: RwLock<Vec<HookRegistration>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, origin: HookOrigin, hooks: Arc<dyn Hooks>) {
        self.registrations
            .write()
            .push(HookRegistration { origin, hooks });
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    fn snapshot(&self) -> Vec<HookRegistration> {
        self.registrations.read().clone()
    }

    /// First non-`None` decision wins.
    pub async fn pre_tool_use(
        &self,
        call: &ToolCall,
        ctx: &ToolContext,
        cancel: &CancelToken,
    ) -> AgentResult<Option<HookDecision>> {
        for reg in self.snapshot() {
            cancel.check()?;
            if let Some(decision) = reg.hooks.pre_tool_use(call, ctx).await {
                return Ok(Some(decision));
            }
        }
        Ok(None)
    }

    /// Thread the outcome through every interceptor in order.
    pub async fn post_tool_use(
        &self,
        mut outcome: ToolOutcome,
        ctx: &ToolContext,
        cancel: &CancelToken,
    ) -> AgentResult<ToolOutcome> {
        for reg in self.snapshot() {
            cancel.check()?;
            match reg.hooks.post_tool_use(&outcome, ctx).await {
                None | Some(PostHookResult::Pass) => {}
                Some(PostHookResult::Replace(replacement)) => outcome = replacement,
                Some(PostHookResult::Update { result, is_error }) => {
                    if let Some(result) = result {
                        outcome.result = result;
                    }
                    if let Some(is_error) = is_error {
                        outcome.is_error = is_error;
                    }
                }
            }
        }
        Ok(outcome)
    }

    pub async fn pre_model(
        &self,
        request: &ModelRequest,
        cancel: &CancelToken,
    ) -> AgentResult<()> {
        for reg in self.snapshot() {
            cancel.check()?;
            reg.hooks.pre_model(request).await;
        }
        Ok(())
    }

    pub async fn post_model(
        &self,
        response: &ModelResponse,
        cancel: &CancelToken,
    ) -> AgentResult<()> {
        for reg in self.snapshot() {
            cancel.check()?;
            reg.hooks.post_model(response).await;
        }
        Ok(())
    }

    pub async fn messages_changed(
        &self,
        history: &[Message],
        cancel: &CancelToken,
    ) -> AgentResult<()> {
        for reg in self.snapshot() {
            cancel.check()?;
            reg.hooks.messages_changed(history).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn call() -> ToolCall {
        ToolCall::new("t1", "echo", json!({}))
    }

    fn outcome(result: &str) -> ToolOutcome {
        ToolOutcome {
            id: "t1".into(),
            name: "echo".into(),
            input: json!({}),
            result: result.into(),
            is_error: false,
            duration_ms: 1,
        }
    }

    struct DecideHook {
        decision: Option<HookDecision>,
        invocations: AtomicUsize,
    }

    impl DecideHook {
        fn new(decision: Option<HookDecision>) -> Arc<Self> {
            Arc::new(Self {
                decision,
                invocations: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Hooks for DecideHook {
        async fn pre_tool_use(&self, _: &ToolCall, _: &ToolContext) -> Option<HookDecision> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            self.decision.clone()
        }
    }

    struct SuffixHook(&'static str);

    #[async_trait]
    impl Hooks for SuffixHook {
        async fn post_tool_use(
            &self,
            outcome: &ToolOutcome,
            _: &ToolContext,
        ) -> Option<PostHookResult> {
            Some(PostHookResult::Update {
                result: Some(format!("{}{}", outcome.result, self.0)),
                is_error: None,
            })
        }
    }

    #[tokio::test]
    async fn first_decision_wins() {
        let pipeline = HookPipeline::new();
        let quiet = DecideHook::new(None);
        let denier = DecideHook::new(Some(HookDecision::Deny {
            reason: "no".into(),
        }));
        let shadowed = DecideHook::new(Some(HookDecision::Allow));
        pipeline.register(HookOrigin::Agent, quiet.clone());
        pipeline.register(HookOrigin::Plugin, denier.clone());
        pipeline.register(HookOrigin::Plugin, shadowed.clone());

        let decision = pipeline
            .pre_tool_use(&call(), &ToolContext::default(), &CancelToken::new())
            .await
            .expect("pipeline");
        assert_eq!(
            decision,
            Some(HookDecision::Deny {
                reason: "no".into()
            })
        );
        assert_eq!(quiet.invocations.load(Ordering::SeqCst), 1);
        assert_eq!(shadowed.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn post_hooks_chain_transformations() {
        let pipeline = HookPipeline::new();
        pipeline.register(HookOrigin::Agent, Arc::new(SuffixHook("-a")));
        pipeline.register(HookOrigin::ToolTune, Arc::new(SuffixHook("-b")));

        let transformed = pipeline
            .post_tool_use(outcome("base"), &ToolContext::default(), &CancelToken::new())
            .await
            .expect("pipeline");
        assert_eq!(transformed.result, "base-a-b");
    }

    #[tokio::test]
    async fn replace_substitutes_wholesale() {
        struct ReplaceHook;

        #[async_trait]
        impl Hooks for ReplaceHook {
            async fn post_tool_use(
                &self,
                _: &ToolOutcome,
                _: &ToolContext,
            ) -> Option<PostHookResult> {
                Some(PostHookResult::Replace(ToolOutcome {
                    id: "t1".into(),
                    name: "echo".into(),
                    input: json!({}),
                    result: "replaced".into(),
                    is_error: true,
                    duration_ms: 9,
                }))
            }
        }

        let pipeline = HookPipeline::new();
        pipeline.register(HookOrigin::Plugin, Arc::new(ReplaceHook));
        let transformed = pipeline
            .post_tool_use(outcome("base"), &ToolContext::default(), &CancelToken::new())
            .await
            .expect("pipeline");
        assert_eq!(transformed.result, "replaced");
        assert!(transformed.is_error);
    }

    #[tokio::test]
    async fn cancellation_stops_iteration() {
        let pipeline = HookPipeline::new();
        let hook = DecideHook::new(Some(HookDecision::Allow));
        pipeline.register(HookOrigin::Agent, hook.clone());

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = pipeline
            .pre_tool_use(&call(), &ToolContext::default(), &cancel)
            .await
            .expect_err("cancelled");
        assert_eq!(err.error_code(), "CANCELLED");
        assert_eq!(hook.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn registration_during_iteration_does_not_affect_current_turn() {
        struct SelfRegistering {
            pipeline: Arc<HookPipeline>,
            late: Arc<DecideHook>,
        }

        #[async_trait]
        impl Hooks for SelfRegistering {
            async fn pre_tool_use(&self, _: &ToolCall, _: &ToolContext) -> Option<HookDecision> {
                self.pipeline.register(HookOrigin::Plugin, self.late.clone());
                None
            }
        }

        let pipeline = Arc::new(HookPipeline::new());
        let late = DecideHook::new(Some(HookDecision::Allow));
        pipeline.register(
            HookOrigin::Agent,
            Arc::new(SelfRegistering {
                pipeline: pipeline.clone(),
                late: late.clone(),
            }),
        );

        let decision = pipeline
            .pre_tool_use(&call(), &ToolContext::default(), &CancelToken::new())
            .await
            .expect("pipeline");
        assert_eq!(decision, None);
        assert_eq!(late.invocations.load(Ordering::SeqCst), 0);
        // The late registration participates in the next turn.
        assert_eq!(pipeline.len(), 2);
    }
}
