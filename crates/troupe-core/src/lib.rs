//! Agent runtime core: the subsystem that turns a stream of user messages
//! into a sequence of model calls and tool executions.
//!
//! The crate is organised around five tightly coupled concerns:
//!
//! 1. A message queue + step loop that interleaves user input, reminders,
//!    model responses and tool calls atomically ([`queue`], [`agent`]).
//! 2. A hook pipeline that intercepts every tool invocation and model
//!    round-trip ([`hooks`]).
//! 3. A permission engine consulting pluggable modes against per-tool
//!    metadata ([`permissions`]).
//! 4. A checkpoint + fork subsystem that snapshots a whole agent and can
//!    resurrect or branch it ([`checkpoint`]).
//! 5. An agent pool + collaboration room that hosts many agents and routes
//!    mentioned/broadcast messages between them ([`pool`]).
//!
//! Concrete model clients, tool bodies, sandboxes and persistence backends
//! are external collaborators: the core consumes the [`model::ModelProvider`],
//! [`tools::Tool`], [`sandbox::Sandbox`], [`store::StateStore`] and
//! [`checkpoint::Checkpointer`] contracts and ships in-memory reference
//! implementations where tests need them.

pub mod agent;
pub mod cancel;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod hooks;
pub mod model;
pub mod permissions;
pub mod pool;
pub mod queue;
pub mod sandbox;
pub mod scheduler;
pub mod skills;
pub mod store;
pub mod tools;
pub mod types;

pub use agent::{Agent, AgentBuilder};
pub use cancel::CancelToken;
pub use checkpoint::{Checkpoint, CheckpointListItem, Checkpointer, ListQuery};
pub use config::{AgentConfig, PoolConfig, SkillsConfig};
pub use error::{AgentError, AgentResult};
pub use hooks::{HookDecision, HookOrigin, HookPipeline, Hooks, PostHookResult};
pub use model::{ModelProvider, ModelRequest, ModelResponse};
pub use permissions::{PermissionDecision, PermissionEngine, PermissionMode};
pub use pool::{AgentPool, Room};
pub use queue::{MessageQueue, PendingKind, SendOptions};
pub use scheduler::StepScheduler;
pub use skills::SkillsManager;
pub use tools::{Tool, ToolRegistry, ToolResult};
pub use types::{AgentRuntimeState, AgentStatus, Message, Role, ToolCall, ToolOutcome};
