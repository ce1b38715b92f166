//! Creation workflow
//!
//! Submits one VM creation request and interprets the panel's immediate
//! answer. Only a reply that names the new machine starts a tracker; every
//! other outcome is reported, releases the input lock and ends here.

use crate::config::TrackerConfig;
use crate::error::WorkflowError;
use crate::lock::InputLock;
use crate::notify::{NotificationQueue, Severity};
use crate::panel_api::{CreateVmRequest, ProvisioningApi};
use crate::tracker::{OperationTracker, TerminalAction, TrackerHandle};
use log::{error, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct CreationWorkflow<A> {
    api: Arc<A>,
    queue: NotificationQueue,
    lock: InputLock,
    config: TrackerConfig,
    cancel: CancellationToken,
}

impl<A> CreationWorkflow<A>
where
    A: ProvisioningApi + 'static,
{
    pub fn new(
        api: Arc<A>,
        queue: NotificationQueue,
        lock: InputLock,
        config: TrackerConfig,
    ) -> Self {
        Self {
            api,
            queue,
            lock,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Trackers started by this workflow stop when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn lock(&self) -> &InputLock {
        &self.lock
    }

    /// Sends the creation request. On success the returned tracker owns
    /// the input lock until it reaches a terminal state.
    pub async fn submit(
        &self,
        request: &CreateVmRequest,
        on_ready: TerminalAction,
    ) -> Result<TrackerHandle, WorkflowError> {
        let Some(guard) = self.lock.engage() else {
            warn!("Creation already in progress, ignoring submit");
            return Err(WorkflowError::Busy);
        };

        info!(
            "Requesting VM for '{}' ({} MB, {} CPUs, {} MB disk)",
            request.owner_email, request.memory_mb, request.cpus, request.disk_mb
        );
        self.queue
            .post_for(
                "Creating virtual machine... This may take 5-20 minutes.",
                Severity::Warning,
                self.config.long_toast_ttl,
            )
            .await;

        let response = match self.api.create_vm(request).await {
            Ok(response) => response,
            Err(e) => {
                let err = WorkflowError::from_submit(e);
                match &err {
                    WorkflowError::Transport(_) => {
                        error!("Creation request failed: {}", err);
                        self.queue
                            .post("Failed to contact server.", Severity::Error)
                            .await;
                    }
                    _ => {
                        warn!("Creation request refused: {}", err);
                        self.queue
                            .post(
                                "Request was not accepted (check the server).",
                                Severity::Warning,
                            )
                            .await;
                    }
                }
                guard.release();
                return Err(err);
            }
        };

        let Some(name) = response.identifier() else {
            warn!("Creation reply carried no VM name: {:?}", response);
            self.queue
                .post("VM name was not provided!", Severity::Warning)
                .await;
            guard.release();
            return Err(WorkflowError::Validation(
                "reply carried no VM name".to_string(),
            ));
        };

        info!("Panel accepted creation of {}", name);
        let client = Arc::clone(&self.api);
        let tracker = OperationTracker::new(name, client, self.queue.clone(), self.config.clone())
            .with_lock(guard)
            .on_ready(on_ready)
            .with_cancellation(self.cancel.child_token());

        Ok(tracker.spawn())
    }
}
