//! Test doubles shared by the tracker, workflow and refresher tests.

use crate::notify::NotificationEvent;
use crate::panel_api::{CreateResponse, CreateVmRequest, PanelApiError, ProvisioningApi, QuickAction};
use crate::status::{ActionStatus, StatusClient, StatusReport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// Replays queued replies in order. Once the status script runs out every
/// poll answers `pending`, or fails if built with `failing()`.
#[derive(Default)]
pub struct ScriptedClient {
    statuses: Mutex<VecDeque<Result<StatusReport, PanelApiError>>>,
    action_statuses: Mutex<VecDeque<Result<ActionStatus, PanelApiError>>>,
    create_reply: Mutex<Option<Result<CreateResponse, PanelApiError>>>,
    fail_when_exhausted: bool,
    latency: Duration,
    status_calls: AtomicU32,
    action_calls: AtomicU32,
    create_calls: AtomicU32,
}

impl ScriptedClient {
    pub fn with_statuses(statuses: Vec<Result<StatusReport, PanelApiError>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_when_exhausted: true,
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_create_reply(self, reply: Result<CreateResponse, PanelApiError>) -> Self {
        *self.create_reply.lock().unwrap() = Some(reply);
        self
    }

    pub fn with_action_statuses(
        self,
        replies: Vec<Result<ActionStatus, PanelApiError>>,
    ) -> Self {
        *self.action_statuses.lock().unwrap() = replies.into();
        self
    }

    pub fn calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn action_calls(&self) -> u32 {
        self.action_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusClient for ScriptedClient {
    async fn fetch_status(&self, _operation_id: &str) -> Result<StatusReport, PanelApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(reply) => reply,
            None if self.fail_when_exhausted => Err(PanelApiError::Rejected(503)),
            None => Ok(StatusReport::new("pending", None)),
        }
    }

    async fn fetch_action_status(&self, _serial: &str) -> Result<ActionStatus, PanelApiError> {
        self.action_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.action_statuses.lock().unwrap().pop_front();
        next.unwrap_or(Err(PanelApiError::Rejected(503)))
    }
}

#[async_trait]
impl ProvisioningApi for ScriptedClient {
    async fn create_vm(&self, _request: &CreateVmRequest) -> Result<CreateResponse, PanelApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let reply = self.create_reply.lock().unwrap().take();
        reply.unwrap_or(Err(PanelApiError::Rejected(500)))
    }

    async fn submit_action(
        &self,
        _serial: &str,
        _action: QuickAction,
    ) -> Result<(), PanelApiError> {
        Ok(())
    }
}

/// Everything posted so far that the receiver has not seen yet.
pub fn drain(rx: &mut broadcast::Receiver<NotificationEvent>) -> Vec<NotificationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A genuine connection-refused error from reqwest.
pub async fn transport_error() -> PanelApiError {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = reqwest::Client::new()
        .get(format!("http://{}/", addr))
        .send()
        .await
        .unwrap_err();
    PanelApiError::HttpError(err)
}
