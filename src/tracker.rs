//! Operation tracker
//!
//! Polls the status of one provisioning operation on a fixed cadence until
//! it becomes ready, fails, or runs out of attempts. Polls never overlap:
//! each one is scheduled only after the previous one has been applied.
//!
//! ```text
//! PENDING -> PENDING | REPORTING | READY | ERROR | TIMEOUT
//! ```
//!
//! READY, ERROR and TIMEOUT are terminal. A tracker makes at most one
//! terminal transition and posts at most one terminal notification.

use crate::config::TrackerConfig;
use crate::error::WorkflowError;
use crate::lock::LockGuard;
use crate::notify::{NotificationQueue, Severity};
use crate::status::{OperationStatus, StatusClient, StatusReport};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Run by the embedding surface once a creation has succeeded, after the
/// reload grace delay.
pub type TerminalAction = Box<dyn FnOnce() + Send + 'static>;

/// Number of polls made when a tracker finished successfully.
pub type TrackerOutcome = Result<u32, WorkflowError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Pending,
    Reporting,
    Ready,
    Error,
    Timeout,
    Cancelled,
}

impl TrackerPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TrackerPhase::Pending | TrackerPhase::Reporting)
    }
}

/// What the surface gets to see of a running tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub operation_id: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub phase: TrackerPhase,
    pub last_status: Option<String>,
}

#[derive(Debug)]
pub struct TrackerState {
    pub operation_id: String,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub active: bool,
}

pub struct OperationTracker {
    state: TrackerState,
    config: TrackerConfig,
    client: Arc<dyn StatusClient>,
    queue: NotificationQueue,
    lock: Option<LockGuard>,
    on_ready: Option<TerminalAction>,
    snapshot: watch::Sender<TrackerSnapshot>,
    cancel: CancellationToken,
    last_status: Option<String>,
}

impl OperationTracker {
    pub fn new(
        operation_id: impl Into<String>,
        client: Arc<dyn StatusClient>,
        queue: NotificationQueue,
        config: TrackerConfig,
    ) -> Self {
        let operation_id = operation_id.into();
        let (snapshot, _) = watch::channel(TrackerSnapshot {
            operation_id: operation_id.clone(),
            attempt: 0,
            max_attempts: config.max_attempts,
            phase: TrackerPhase::Pending,
            last_status: None,
        });

        Self {
            state: TrackerState {
                operation_id,
                attempt_count: 0,
                max_attempts: config.max_attempts,
                poll_interval: config.poll_interval,
                active: true,
            },
            config,
            client,
            queue,
            lock: None,
            on_ready: None,
            snapshot,
            cancel: CancellationToken::new(),
            last_status: None,
        }
    }

    /// Hands the input lock to the tracker; it is released on the terminal
    /// transition.
    pub fn with_lock(mut self, guard: LockGuard) -> Self {
        self.lock = Some(guard);
        self
    }

    pub fn on_ready(mut self, action: TerminalAction) -> Self {
        self.on_ready = Some(action);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn spawn(self) -> TrackerHandle {
        let operation_id = self.state.operation_id.clone();
        let cancel = self.cancel.clone();
        let snapshot = self.snapshot.subscribe();

        TrackerHandle {
            operation_id,
            cancel,
            snapshot,
            task: tokio::spawn(self.run()),
        }
    }

    pub async fn run(mut self) -> TrackerOutcome {
        info!(
            "Tracking {} every {}s (max {} polls)",
            self.state.operation_id,
            self.state.poll_interval.as_secs(),
            self.state.max_attempts
        );
        self.queue
            .post_for(
                format!("Tracking status of {}...", self.state.operation_id),
                Severity::Info,
                self.config.tracking_toast_ttl,
            )
            .await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.cancelled(),
                _ = sleep(self.state.poll_interval) => {}
            }

            if let Some(outcome) = self.tick().await {
                return outcome;
            }
        }
    }

    /// One poll. Returns the outcome once a terminal state is reached.
    async fn tick(&mut self) -> Option<TrackerOutcome> {
        if !self.state.active || self.cancel.is_cancelled() {
            return Some(self.cancelled());
        }

        if self.state.attempt_count >= self.state.max_attempts {
            return Some(self.time_out().await);
        }

        self.state.attempt_count += 1;
        let attempt = self.state.attempt_count;
        debug!(
            "Status check {}/{} for {}",
            attempt, self.state.max_attempts, self.state.operation_id
        );

        let result = self.client.fetch_status(&self.state.operation_id).await;

        // A cancel that landed while the request was in flight wins
        if self.cancel.is_cancelled() {
            debug!(
                "Discarding status of {} received after cancellation",
                self.state.operation_id
            );
            return Some(self.cancelled());
        }

        match result {
            Ok(report) => {
                if let Some(outcome) = self.apply(attempt, report).await {
                    return Some(outcome);
                }
            }
            Err(e) => {
                // Still counts against the budget
                warn!(
                    "Status check {} for {} failed: {}",
                    attempt, self.state.operation_id, e
                );
                self.publish(TrackerPhase::Pending);
            }
        }

        if attempt >= self.state.max_attempts {
            return Some(self.time_out().await);
        }
        None
    }

    async fn apply(&mut self, attempt: u32, report: StatusReport) -> Option<TrackerOutcome> {
        if self.config.progress_every > 0 && attempt % self.config.progress_every == 0 {
            // Progress describes the wait; a terminal answer has its own toast
            let shown = if report.status.is_ready() || report.status == OperationStatus::Error {
                self.last_status.as_deref().unwrap_or("pending").to_string()
            } else {
                report.raw.clone()
            };
            self.publish(TrackerPhase::Reporting);
            self.queue
                .post(format!("Current status: {}", shown), Severity::Info)
                .await;
        }
        self.last_status = Some(report.raw.clone());

        match report.status {
            status if status.is_ready() => Some(self.finish_ready().await),
            OperationStatus::Error => Some(self.finish_error(report.note).await),
            _ => {
                self.publish(TrackerPhase::Pending);
                None
            }
        }
    }

    /// Flips `active` off. Only the first caller gets `true`.
    fn deactivate(&mut self, phase: TrackerPhase) -> bool {
        if !self.state.active {
            return false;
        }
        self.state.active = false;
        self.publish(phase);
        true
    }

    fn release_lock(&mut self) {
        if let Some(guard) = self.lock.take() {
            guard.release();
        }
    }

    async fn finish_ready(&mut self) -> TrackerOutcome {
        let attempts = self.state.attempt_count;
        if !self.deactivate(TrackerPhase::Ready) {
            return Err(WorkflowError::Cancelled);
        }

        info!(
            "{} is ready after {} status checks",
            self.state.operation_id, attempts
        );
        self.queue
            .post_for(
                format!("VM {} is now ready!", self.state.operation_id),
                Severity::Success,
                self.config.long_toast_ttl,
            )
            .await;
        self.release_lock();

        if let Some(action) = self.on_ready.take() {
            let delay = self.config.reload_delay;
            tokio::spawn(async move {
                sleep(delay).await;
                action();
            });
        }

        Ok(attempts)
    }

    async fn finish_error(&mut self, note: Option<String>) -> TrackerOutcome {
        if !self.deactivate(TrackerPhase::Error) {
            return Err(WorkflowError::Cancelled);
        }

        let note = note.unwrap_or_else(|| "Unknown error".to_string());
        error!("Creation of {} failed: {}", self.state.operation_id, note);
        self.queue
            .post_for(
                format!("VM creation failed: {}", note),
                Severity::Error,
                self.config.long_toast_ttl,
            )
            .await;
        self.release_lock();

        Err(WorkflowError::Application(note))
    }

    async fn time_out(&mut self) -> TrackerOutcome {
        let attempts = self.state.attempt_count;
        if !self.deactivate(TrackerPhase::Timeout) {
            return Err(WorkflowError::Cancelled);
        }

        warn!(
            "Gave up on {} after {} status checks",
            self.state.operation_id, attempts
        );
        self.queue
            .post_for(
                format!(
                    "Time limit exceeded. VM {} did not become ready and may still be provisioning.",
                    self.state.operation_id
                ),
                Severity::Warning,
                self.config.long_toast_ttl,
            )
            .await;
        self.release_lock();

        Err(WorkflowError::TimeoutExceeded { attempts })
    }

    fn cancelled(&mut self) -> TrackerOutcome {
        if self.deactivate(TrackerPhase::Cancelled) {
            info!("Stopped tracking {}", self.state.operation_id);
            self.release_lock();
        }
        Err(WorkflowError::Cancelled)
    }

    fn publish(&self, phase: TrackerPhase) {
        self.snapshot.send_replace(TrackerSnapshot {
            operation_id: self.state.operation_id.clone(),
            attempt: self.state.attempt_count,
            max_attempts: self.state.max_attempts,
            phase,
            last_status: self.last_status.clone(),
        });
    }
}

/// Handle to a spawned tracker.
#[derive(Debug)]
pub struct TrackerHandle {
    operation_id: String,
    cancel: CancellationToken,
    snapshot: watch::Receiver<TrackerSnapshot>,
    task: JoinHandle<TrackerOutcome>,
}

impl TrackerHandle {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Stops the tracker. The next scheduled poll does nothing and a
    /// result still in flight is thrown away.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> TrackerOutcome {
        let operation_id = self.operation_id;
        self.task.await.unwrap_or_else(|e| {
            error!("Tracker for {} aborted: {}", operation_id, e);
            Err(WorkflowError::Cancelled)
        })
    }
}
