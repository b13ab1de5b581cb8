//! Message queue: buffers user and reminder messages until the step loop
//! flushes them atomically into history.
//!
//! The queue never loses a send. `flush` snapshots the buffer, appends each
//! message through the injected sink, persists, and only then removes the
//! flushed ids — any failure leaves the buffer untouched so retry is safe.
//! Sends that arrive while a flush is in flight land in the next batch.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::cancel::CancelToken;
use crate::error::{AgentError, AgentResult};
use crate::types::{Message, unix_ms};

// ─── Pending entries ───────────────────────────────────────────────────────

/// What kind of entry a send produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PendingKind {
    #[default]
    User,
    Reminder,
}

/// Policy knobs for the reminder wrapper.
#[derive(Debug, Clone, Default)]
pub struct ReminderOptions {
    pub category: Option<String>,
    pub priority: Option<String>,
    pub persistent: bool,
    pub label: Option<String>,
    pub skip_standard_ending: bool,
}

/// Options accepted by `send`.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub kind: PendingKind,
    pub metadata: Value,
    pub reminder: ReminderOptions,
}

impl SendOptions {
    pub fn reminder(opts: ReminderOptions) -> Self {
        Self {
            kind: PendingKind::Reminder,
            metadata: Value::Null,
            reminder: opts,
        }
    }
}

/// One buffered entry. Lives only inside the queue until flushed.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub id: String,
    pub message: Message,
    pub kind: PendingKind,
    pub metadata: Value,
}

fn pending_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("msg-{}-{}", unix_ms(), &random[..6])
}

// ─── Collaborators ─────────────────────────────────────────────────────────

/// Where flushed messages go: the owning agent's history + persistence.
///
/// `add_message` appends to history; `persist` commits the conversation
/// state. A sink whose `persist` can fail is expected to roll back its own
/// appends, so a queue retry does not duplicate messages.
#[async_trait]
pub trait FlushSink: Send + Sync {
    async fn add_message(&self, message: Message) -> AgentResult<()>;

    async fn persist(&self) -> AgentResult<()>;
}

/// Wraps reminder text before it enters the buffer. The reminder surface
/// is policy-driven, so the formatter is injected.
pub type ReminderFormatter = Arc<dyn Fn(&str, &ReminderOptions) -> String + Send + Sync>;

/// Invoked on every user-kind send; starts the step loop if idle.
pub type ProcessingHook = Arc<dyn Fn() + Send + Sync>;

/// The stock reminder wrapper: `<system-reminder>` markup with optional
/// category/priority/label attributes.
pub fn default_reminder_formatter() -> ReminderFormatter {
    Arc::new(|text, opts| {
        let mut attrs = String::new();
        if let Some(category) = &opts.category {
            attrs.push_str(&format!(" category=\"{category}\""));
        }
        if let Some(priority) = &opts.priority {
            attrs.push_str(&format!(" priority=\"{priority}\""));
        }
        if opts.persistent {
            attrs.push_str(" persistent=\"true\"");
        }
        if let Some(label) = &opts.label {
            attrs.push_str(&format!(" label=\"{label}\""));
        }
        let ending = if opts.skip_standard_ending {
            ""
        } else {
            "\nDo not mention this reminder in your reply."
        };
        format!("<system-reminder{attrs}>\n{text}{ending}\n</system-reminder>")
    })
}

// ─── MessageQueue ──────────────────────────────────────────────────────────

#[derive(Default)]
struct QueueState {
    buffer: Vec<PendingMessage>,
    completed: bool,
}

/// Buffer of pending messages guarded by a single mutex plus a completed
/// flag. Flushes are serialised; sends stay cheap and lock-only.
pub struct MessageQueue {
    state: Mutex<QueueState>,
    flush_lock: tokio::sync::Mutex<()>,
    formatter: ReminderFormatter,
    processing_hook: RwLock<Option<ProcessingHook>>,
    max_pending: usize,
}

impl MessageQueue {
    pub fn new(max_pending: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            flush_lock: tokio::sync::Mutex::new(()),
            formatter: default_reminder_formatter(),
            processing_hook: RwLock::new(None),
            max_pending,
        }
    }

    pub fn with_reminder_formatter(mut self, formatter: ReminderFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Install the hook fired on user-kind sends.
    pub fn set_processing_hook(&self, hook: ProcessingHook) {
        *self.processing_hook.write() = Some(hook);
    }

    /// Buffer a message. Reminder kinds are wrapped through the formatter;
    /// user kinds additionally fire the processing hook.
    pub fn send(&self, text: &str, opts: SendOptions) -> AgentResult<String> {
        let message = match opts.kind {
            PendingKind::User => Message::user(text),
            PendingKind::Reminder => Message::user((self.formatter)(text, &opts.reminder)),
        };
        let pending = PendingMessage {
            id: pending_id(),
            message,
            kind: opts.kind,
            metadata: opts.metadata,
        };
        let id = pending.id.clone();

        {
            let mut state = self.state.lock();
            if state.completed {
                return Err(AgentError::invalid_state("message queue is completed"));
            }
            if state.buffer.len() >= self.max_pending {
                return Err(AgentError::invalid_state(format!(
                    "message queue is full ({} pending)",
                    self.max_pending
                )));
            }
            state.buffer.push(pending);
        }

        if opts.kind == PendingKind::User {
            let hook = self.processing_hook.read().clone();
            if let Some(hook) = hook {
                hook();
            }
        }
        Ok(id)
    }

    /// Snapshot the buffer, append every entry through `sink`, persist,
    /// then drop exactly the flushed ids. Returns the number flushed.
    ///
    /// On append/persist failure nothing is removed. On cancellation the
    /// entries already appended to history are removed and the rest stay
    /// queued.
    pub async fn flush(&self, sink: &dyn FlushSink, cancel: &CancelToken) -> AgentResult<usize> {
        let _serialised = self.flush_lock.lock().await;

        let snapshot: Vec<PendingMessage> = self.state.lock().buffer.clone();
        if snapshot.is_empty() {
            return Ok(0);
        }

        let mut appended: Vec<String> = Vec::with_capacity(snapshot.len());
        for pending in &snapshot {
            if cancel.is_cancelled() {
                self.remove_ids(&appended);
                return Err(AgentError::Cancelled);
            }
            sink.add_message(pending.message.clone()).await?;
            appended.push(pending.id.clone());
        }
        sink.persist().await?;

        self.remove_ids(&appended);
        Ok(appended.len())
    }

    fn remove_ids(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.buffer.retain(|p| !ids.contains(&p.id));
    }

    /// Observed count under lock.
    pub fn pending_count(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Mark terminal: clears the buffer; subsequent sends fail.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        state.completed = true;
        state.buffer.clear();
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }
}
