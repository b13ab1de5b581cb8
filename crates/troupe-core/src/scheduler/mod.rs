//! Step-relative scheduler.
//!
//! Three primitives: `every_steps` (cadence-gated callbacks), `on_step`
//! (fires every step), and `enqueue` (strict FIFO serial chain). The
//! scheduler never owns a wall clock — time/cron hints arrive through
//! `notify_external_trigger` from an outside scheduler.
//!
//! `notify_step` snapshots the task table and listener set under lock,
//! releases, then dispatches fire-and-forget, so callbacks can re-enter the
//! scheduler freely.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};

use crate::cancel::CancelToken;
use crate::error::{AgentError, AgentResult};

/// Async callback invoked with the current step count.
pub type StepCallback = Arc<dyn Fn(u64) -> BoxFuture<'static, ()> + Send + Sync>;

/// One-shot job for the serial chain.
pub type SerialTask = Box<dyn FnOnce() -> BoxFuture<'static, AgentResult<()>> + Send>;

/// Kind of trigger reported to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Fired by step cadence.
    Steps,
    /// Forwarded wall-clock hint.
    Time,
    /// Forwarded cron hint.
    Cron,
}

/// Describes a fired or forwarded trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerInfo {
    pub task_id: String,
    pub spec: String,
    pub kind: TriggerKind,
}

/// Observer notified for every trigger.
pub type TriggerObserver = Arc<dyn Fn(TriggerInfo) + Send + Sync>;

// ─── Internal state ────────────────────────────────────────────────────────

struct EveryTask {
    every: u64,
    last_triggered: u64,
    callback: StepCallback,
}

struct SerialJob {
    task: SerialTask,
    cancel: CancelToken,
    done: Option<oneshot::Sender<AgentResult<()>>>,
}

struct Inner {
    tasks: Mutex<HashMap<u64, EveryTask>>,
    listeners: Mutex<HashMap<u64, StepCallback>>,
    next_id: AtomicU64,
    observer: RwLock<Option<TriggerObserver>>,
    serial_tx: mpsc::UnboundedSender<SerialJob>,
    serial_rx: Mutex<Option<mpsc::UnboundedReceiver<SerialJob>>>,
    worker_started: AtomicBool,
}

// ─── Handles ───────────────────────────────────────────────────────────────

/// Cancellation handle for an `every_steps` registration.
pub struct TaskHandle {
    id: u64,
    inner: Weak<Inner>,
}

impl TaskHandle {
    /// Stable id usable to correlate `TriggerInfo.task_id`.
    pub fn id(&self) -> String {
        format!("task-{}", self.id)
    }

    pub fn cancel(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.tasks.lock().remove(&self.id);
        }
    }
}

/// Unregistration handle for an `on_step` listener.
pub struct ListenerHandle {
    id: u64,
    inner: Weak<Inner>,
}

impl ListenerHandle {
    pub fn unregister(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners.lock().remove(&self.id);
        }
    }
}

// ─── StepScheduler ─────────────────────────────────────────────────────────

/// Registers step-relative callbacks and forwards external triggers.
pub struct StepScheduler {
    inner: Arc<Inner>,
}

impl Default for StepScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl StepScheduler {
    pub fn new() -> Self {
        let (serial_tx, serial_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                observer: RwLock::new(None),
                serial_tx,
                serial_rx: Mutex::new(Some(serial_rx)),
                worker_started: AtomicBool::new(false),
            }),
        }
    }

    /// Install the trigger observer.
    pub fn set_trigger_observer(&self, observer: TriggerObserver) {
        *self.inner.observer.write() = Some(observer);
    }

    /// Invoke `callback` whenever `step_count - last_triggered >= every`.
    pub fn every_steps(&self, every: u64, callback: StepCallback) -> TaskHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.tasks.lock().insert(
            id,
            EveryTask {
                every: every.max(1),
                last_triggered: 0,
                callback,
            },
        );
        TaskHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke `callback` on every step.
    pub fn on_step(&self, callback: StepCallback) -> ListenerHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.lock().insert(id, callback);
        ListenerHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Run step listeners and eligible cadence tasks, fire-and-forget.
    pub fn notify_step(&self, step_count: u64) {
        let mut fired: Vec<(String, String, StepCallback)> = Vec::new();
        {
            let mut tasks = self.inner.tasks.lock();
            for (id, task) in tasks.iter_mut() {
                if step_count.saturating_sub(task.last_triggered) >= task.every {
                    task.last_triggered = step_count;
                    fired.push((
                        format!("task-{id}"),
                        format!("every:{}", task.every),
                        task.callback.clone(),
                    ));
                }
            }
        }
        let listeners: Vec<StepCallback> = self.inner.listeners.lock().values().cloned().collect();

        let observer = self.inner.observer.read().clone();
        for (task_id, spec, callback) in fired {
            if let Some(observer) = &observer {
                observer(TriggerInfo {
                    task_id,
                    spec,
                    kind: TriggerKind::Steps,
                });
            }
            tokio::spawn(callback(step_count));
        }
        for listener in listeners {
            tokio::spawn(listener(step_count));
        }
    }

    /// Forward a time/cron hint from an outside clock owner.
    pub fn notify_external_trigger(&self, info: TriggerInfo) {
        tracing::debug!(task_id = %info.task_id, spec = %info.spec, "external trigger");
        if let Some(observer) = self.inner.observer.read().clone() {
            observer(info);
        }
    }

    fn ensure_worker(&self) {
        if self.inner.worker_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(mut rx) = self.inner.serial_rx.lock().take() else {
            return;
        };
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let outcome = if job.cancel.is_cancelled() {
                    Err(AgentError::Cancelled)
                } else {
                    (job.task)().await
                };
                match job.done {
                    Some(done) => {
                        let _ = done.send(outcome);
                    }
                    None => {
                        if let Err(e) = outcome {
                            tracing::warn!(error = %e, "enqueued task failed");
                        }
                    }
                }
            }
        });
    }

    /// Append to the serial chain, fire-and-forget. Failures are logged and
    /// swallowed.
    pub fn enqueue(&self, task: SerialTask) {
        self.ensure_worker();
        let _ = self.inner.serial_tx.send(SerialJob {
            task,
            cancel: CancelToken::new(),
            done: None,
        });
    }

    /// Append to the serial chain and await completion. A token cancelled
    /// before the job runs completes it with `CANCELLED` without invoking
    /// the task.
    pub async fn enqueue_awaited(&self, cancel: &CancelToken, task: SerialTask) -> AgentResult<()> {
        self.ensure_worker();
        let (done_tx, done_rx) = oneshot::channel();
        self.inner
            .serial_tx
            .send(SerialJob {
                task,
                cancel: cancel.clone(),
                done: Some(done_tx),
            })
            .map_err(|_| AgentError::invalid_state("scheduler worker stopped"))?;
        done_rx
            .await
            .map_err(|_| AgentError::invalid_state("scheduler worker stopped"))?
    }
}
