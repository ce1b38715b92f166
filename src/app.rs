//! Application state and business logic
//!
//! This module holds the terminal surface's state: the creation form, the
//! tracked creation, the quick-action target and the channel background
//! tasks report back through.

use crate::config::{Args, TrackerConfig};
use crate::error::WorkflowError;
use crate::lock::InputLock;
use crate::notify::{NotificationQueue, Severity};
use crate::panel_api::{CreateVmRequest, PanelApiClient, ProvisioningApi, QuickAction};
use crate::refresher::{OneShotRefresher, StatusDisplay};
use crate::tracker::{TerminalAction, TrackerHandle, TrackerSnapshot};
use crate::workflow::CreationWorkflow;
use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Names of the controls the input lock disables.
pub const FORM_CONTROLS: [&str; 5] = ["owner", "memory", "cpus", "disk", "create"];

/// Results sent back to the UI loop by background tasks
#[derive(Debug)]
pub enum AppEvent {
    Tracking(TrackerHandle),
    CreationFailed(WorkflowError),
    Reload,
    PanelChecked(bool),
    ActionFailed { serial: String, action: QuickAction, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Owner,
    Memory,
    Cpus,
    Disk,
    Serial,
}

impl FormField {
    pub const ALL: [FormField; 5] = [
        FormField::Owner,
        FormField::Memory,
        FormField::Cpus,
        FormField::Disk,
        FormField::Serial,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FormField::Owner => "Owner email",
            FormField::Memory => "Memory (MB)",
            FormField::Cpus => "CPUs",
            FormField::Disk => "Disk (MB)",
            FormField::Serial => "Serial",
        }
    }

    pub fn control(&self) -> &'static str {
        match self {
            FormField::Owner => "owner",
            FormField::Memory => "memory",
            FormField::Cpus => "cpus",
            FormField::Disk => "disk",
            FormField::Serial => "serial",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FormField::Memory | FormField::Cpus | FormField::Disk)
    }
}

#[derive(Debug, Clone)]
pub struct CreateForm {
    pub owner_email: String,
    pub memory_mb: String,
    pub cpus: String,
    pub disk_mb: String,
}

impl Default for CreateForm {
    fn default() -> Self {
        let defaults = CreateVmRequest::default();
        CreateForm {
            owner_email: String::new(),
            memory_mb: defaults.memory_mb.to_string(),
            cpus: defaults.cpus.to_string(),
            disk_mb: defaults.disk_mb.to_string(),
        }
    }
}

impl CreateForm {
    /// Unparseable numbers fall back to the panel defaults, as the panel
    /// itself does.
    pub fn to_request(&self) -> CreateVmRequest {
        let defaults = CreateVmRequest::default();
        CreateVmRequest {
            owner_email: self.owner_email.trim().to_string(),
            memory_mb: self.memory_mb.trim().parse().unwrap_or(defaults.memory_mb),
            cpus: self.cpus.trim().parse().unwrap_or(defaults.cpus),
            disk_mb: self.disk_mb.trim().parse().unwrap_or(defaults.disk_mb),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConfirmAction {
    Quick { serial: String, action: QuickAction },
}

#[derive(Debug)]
pub enum InputMode {
    Normal,
    Editing(FormField),
    Confirmation {
        message: String,
        action: ConfirmAction,
    },
    Help,
}

pub struct App {
    pub api: Arc<PanelApiClient>,
    pub queue: NotificationQueue,
    pub lock: InputLock,
    pub workflow: Arc<CreationWorkflow<PanelApiClient>>,
    pub refresher: OneShotRefresher,
    pub config: TrackerConfig,
    pub panel_url: String,
    admin_user: String,
    admin_pass: Option<String>,
    pub input_mode: InputMode,
    pub form: CreateForm,
    pub serial: String,
    pub focus: usize,
    pub display_status: StatusDisplay,
    pub tracker: Option<TrackerHandle>,
    pub message: Option<String>,
    pub should_quit: bool,
    pub panel_reachable: bool,
    pub last_panel_check: Option<Instant>,
    panel_check_pending: bool,
    pub tracking_since: Option<Instant>,
    pub cancel: CancellationToken,
    pub event_tx: mpsc::UnboundedSender<AppEvent>, // Channel to send results from background tasks
    pub event_rx: mpsc::UnboundedReceiver<AppEvent>, // Channel to receive results in main thread
}

impl App {
    pub fn new(args: &Args) -> Result<Self> {
        let config = args.tracker_config();
        let api = Arc::new(PanelApiClient::new(&args.url, args.request_timeout)?);
        let queue = NotificationQueue::new(config.toast_ttl);
        let lock = InputLock::new(FORM_CONTROLS);
        let cancel = CancellationToken::new();

        let workflow = CreationWorkflow::new(
            Arc::clone(&api),
            queue.clone(),
            lock.clone(),
            config.clone(),
        )
        .with_cancellation(cancel.child_token());
        let refresher = OneShotRefresher::new(api.clone(), queue.clone(), config.refresh_delay);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(App {
            api,
            queue,
            lock,
            workflow: Arc::new(workflow),
            refresher,
            config,
            panel_url: args.url.clone(),
            admin_user: args.admin_user.clone(),
            admin_pass: args.admin_pass.clone(),
            input_mode: InputMode::Normal,
            form: CreateForm::default(),
            serial: String::new(),
            focus: 0,
            display_status: StatusDisplay::default(),
            tracker: None,
            message: None,
            should_quit: false,
            panel_reachable: false,
            last_panel_check: None,
            panel_check_pending: false,
            tracking_since: None,
            cancel,
            event_tx,
            event_rx,
        })
    }

    /// Starts the reachability check and the admin login in the
    /// background; both report through toasts or `AppEvent`s.
    pub fn initialize(&mut self) {
        info!("Initializing application against {}", self.panel_url);
        self.check_panel();

        let Some(pass) = self.admin_pass.clone() else {
            self.message = Some("No admin password set, creation will be refused".to_string());
            return;
        };

        let api = Arc::clone(&self.api);
        let queue = self.queue.clone();
        let user = self.admin_user.clone();
        let long_ttl = self.config.long_toast_ttl;
        tokio::spawn(async move {
            match api.login(&user, &pass).await {
                Ok(()) => {
                    queue
                        .post(format!("Signed in as {}", user), Severity::Success)
                        .await;
                }
                Err(e) => {
                    error!("Admin login failed: {}", e);
                    queue
                        .post_for(format!("Admin login failed: {}", e), Severity::Error, long_ttl)
                        .await;
                }
            }
        });
    }

    /// Probes the panel in the background. At most one probe is in flight.
    pub fn check_panel(&mut self) {
        if self.panel_check_pending {
            return;
        }
        self.panel_check_pending = true;
        self.last_panel_check = Some(Instant::now());

        let api = Arc::clone(&self.api);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let reachable = api.check_panel_reachable().await;
            let _ = tx.send(AppEvent::PanelChecked(reachable));
        });
    }

    pub fn maybe_check_panel(&mut self) {
        let stale = self
            .last_panel_check
            .map_or(true, |last| last.elapsed() > Duration::from_secs(30));
        if stale && matches!(self.input_mode, InputMode::Normal) {
            self.check_panel();
        }
    }

    pub fn focused_field(&self) -> FormField {
        FormField::ALL[self.focus % FormField::ALL.len()]
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % FormField::ALL.len();
    }

    pub fn focus_previous(&mut self) {
        if self.focus > 0 {
            self.focus -= 1;
        } else {
            self.focus = FormField::ALL.len() - 1;
        }
    }

    pub fn field_value(&self, field: FormField) -> &str {
        match field {
            FormField::Owner => &self.form.owner_email,
            FormField::Memory => &self.form.memory_mb,
            FormField::Cpus => &self.form.cpus,
            FormField::Disk => &self.form.disk_mb,
            FormField::Serial => &self.serial,
        }
    }

    fn field_mut(&mut self, field: FormField) -> &mut String {
        match field {
            FormField::Owner => &mut self.form.owner_email,
            FormField::Memory => &mut self.form.memory_mb,
            FormField::Cpus => &mut self.form.cpus,
            FormField::Disk => &mut self.form.disk_mb,
            FormField::Serial => &mut self.serial,
        }
    }

    pub fn is_field_disabled(&self, field: FormField) -> bool {
        self.lock.is_disabled(field.control())
    }

    pub fn start_editing(&mut self) {
        let field = self.focused_field();
        if self.is_field_disabled(field) {
            self.message = Some(self.locked_message());
            return;
        }
        self.input_mode = InputMode::Editing(field);
    }

    pub fn input_char(&mut self, field: FormField, c: char) {
        if self.is_field_disabled(field) {
            return;
        }
        if field.is_numeric() && !c.is_ascii_digit() {
            return;
        }
        if c.is_control() {
            return;
        }
        self.field_mut(field).push(c);
    }

    pub fn input_backspace(&mut self, field: FormField) {
        if !self.is_field_disabled(field) {
            self.field_mut(field).pop();
        }
    }

    pub fn stop_editing(&mut self) {
        self.input_mode = InputMode::Normal;
    }

    fn locked_message(&self) -> String {
        match &self.tracker {
            Some(handle) => format!("Form is locked while {} is created", handle.operation_id()),
            None => "Form is locked while a creation request is in flight".to_string(),
        }
    }

    /// Sends the creation request in the background. The workflow engages
    /// the input lock itself; a second press while it is held is refused.
    pub fn submit_creation(&mut self) {
        if self.lock.is_disabled("create") {
            self.message = Some(self.locked_message());
            return;
        }

        let request = self.form.to_request();
        let workflow = Arc::clone(&self.workflow);
        let tx = self.event_tx.clone();
        let on_ready = self.reload_action();

        self.message = Some("Submitting creation request...".to_string());
        tokio::spawn(async move {
            let event = match workflow.submit(&request, on_ready).await {
                Ok(handle) => AppEvent::Tracking(handle),
                Err(e) => AppEvent::CreationFailed(e),
            };
            let _ = tx.send(event);
        });
    }

    /// Run by a tracker once its machine is ready.
    pub fn reload_action(&self) -> TerminalAction {
        let tx = self.event_tx.clone();
        Box::new(move || {
            let _ = tx.send(AppEvent::Reload);
        })
    }

    pub fn cancel_tracking(&mut self) {
        match &self.tracker {
            Some(handle) if !handle.is_finished() => {
                handle.cancel();
                self.message = Some(format!("Stopped tracking {}", handle.operation_id()));
            }
            _ => self.message = Some("Nothing is being tracked".to_string()),
        }
    }

    pub fn tracker_snapshot(&self) -> Option<TrackerSnapshot> {
        self.tracker.as_ref().map(|handle| handle.snapshot())
    }

    pub fn request_quick_action(&mut self, action: QuickAction) {
        let serial = self.serial.trim().to_string();
        if serial.is_empty() {
            self.message = Some("Enter a serial first".to_string());
            return;
        }

        match action {
            QuickAction::Stop | QuickAction::Reset => {
                self.input_mode = InputMode::Confirmation {
                    message: format!("{} machine '{}'?", capitalize(action.as_str()), serial),
                    action: ConfirmAction::Quick { serial, action },
                };
            }
            QuickAction::Start | QuickAction::Refresh => self.run_quick_action(serial, action),
        }
    }

    pub fn confirm(&mut self, action: ConfirmAction) {
        self.input_mode = InputMode::Normal;
        match action {
            ConfirmAction::Quick { serial, action } => self.run_quick_action(serial, action),
        }
    }

    pub fn cancel_dialog(&mut self) {
        self.input_mode = InputMode::Normal;
        self.message = Some("Action cancelled".to_string());
    }

    /// Submits a quick action, then refreshes the displayed status once.
    pub fn run_quick_action(&mut self, serial: String, action: QuickAction) {
        info!("Submitting {} for {}", action.as_str(), serial);
        self.message = Some(format!("Sent {} to {}", action.as_str(), serial));

        let api = Arc::clone(&self.api);
        let refresher = self.refresher.clone();
        let display = Arc::clone(&self.display_status);
        let tx = self.event_tx.clone();

        tokio::spawn(async move {
            match api.submit_action(&serial, action).await {
                Ok(()) => {
                    let _ = refresher.schedule(serial, display);
                }
                Err(e) => {
                    warn!("{} for {} failed: {}", action.as_str(), serial, e);
                    let _ = tx.send(AppEvent::ActionFailed {
                        serial,
                        action,
                        error: e.to_string(),
                    });
                }
            }
        });
    }

    pub fn show_help(&mut self) {
        self.input_mode = InputMode::Help;
    }

    pub fn close_modal(&mut self) {
        self.input_mode = InputMode::Normal;
    }

    pub fn clear_message(&mut self) {
        self.message = None;
    }

    /// Resets the surface after a successful creation.
    pub fn reload(&mut self) {
        info!("Reloading after successful creation");
        self.form = CreateForm::default();
        self.tracker = None;
        self.tracking_since = None;
        self.message = Some("Ready for the next machine".to_string());
        self.check_panel();
    }

    pub async fn poll_background_tasks(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                AppEvent::Tracking(handle) => {
                    info!("Tracking {}", handle.operation_id());
                    self.message = Some(format!("Tracking {}", handle.operation_id()));
                    self.tracker = Some(handle);
                    self.tracking_since = Some(Instant::now());
                }
                AppEvent::CreationFailed(WorkflowError::Busy) => {
                    self.message = Some(self.locked_message());
                }
                AppEvent::CreationFailed(e) => {
                    // The workflow already notified the user
                    self.message = Some(e.to_string());
                }
                AppEvent::Reload => self.reload(),
                AppEvent::PanelChecked(reachable) => {
                    debug!("Panel reachable: {}", reachable);
                    self.panel_reachable = reachable;
                    self.panel_check_pending = false;
                }
                AppEvent::ActionFailed {
                    serial,
                    action,
                    error,
                } => {
                    self.queue
                        .post(
                            format!("Could not {} {}: {}", action.as_str(), serial, error),
                            Severity::Error,
                        )
                        .await;
                }
            }
        }
    }

    pub fn quit(&mut self) {
        self.cancel.cancel();
        self.should_quit = true;
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
