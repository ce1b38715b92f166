//! Toast notification queue
//!
//! Short-lived, non-blocking messages for the user. Entries are appended and
//! never edited; each one removes itself once its time-to-live has elapsed.
//! One queue is built at startup and cloned into every component that posts.

use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

pub const DEFAULT_TTL: Duration = Duration::from_millis(2600);

const EVENT_CAPACITY: usize = 256;

/// Severity of a notification. Only changes how an entry is drawn,
/// never how long it stays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "ok",
            Severity::Warning => "warn",
            Severity::Error => "err",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub message: String,
    pub severity: Severity,
    pub ttl: Duration,
}

/// A visible queue entry.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub event: NotificationEvent,
    pub posted_at: Instant,
}

#[derive(Clone)]
pub struct NotificationQueue {
    // Never held across an await, so the render loop can always read it
    entries: Arc<Mutex<Vec<Notification>>>,
    events: broadcast::Sender<NotificationEvent>,
    default_ttl: Duration,
}

impl NotificationQueue {
    pub fn new(default_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            events,
            default_ttl,
        }
    }

    pub async fn post(&self, message: impl Into<String>, severity: Severity) {
        self.post_for(message, severity, self.default_ttl).await;
    }

    /// Appends an entry and schedules its removal after `ttl`.
    ///
    /// Identical messages are kept side by side; overlapping operations are
    /// allowed to report the same thing twice.
    pub async fn post_for(&self, message: impl Into<String>, severity: Severity, ttl: Duration) {
        let event = NotificationEvent {
            message: message.into(),
            severity,
            ttl,
        };
        debug!(
            "Notification [{}] for {}ms: {}",
            severity.label(),
            ttl.as_millis(),
            event.message
        );

        let id = Uuid::new_v4();
        lock_entries(&self.entries).push(Notification {
            id,
            event: event.clone(),
            posted_at: Instant::now(),
        });

        // Nobody listening is fine
        let _ = self.events.send(event);

        let entries = Arc::clone(&self.entries);
        tokio::spawn(async move {
            sleep(ttl).await;
            lock_entries(&entries).retain(|entry| entry.id != id);
        });
    }

    /// Receives every event posted from now on, including ones that have
    /// already expired by the time they are read.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events.subscribe()
    }

    /// Entries still within their time-to-live, oldest first.
    pub fn visible(&self) -> Vec<Notification> {
        lock_entries(&self.entries).clone()
    }
}

fn lock_entries(entries: &Mutex<Vec<Notification>>) -> MutexGuard<'_, Vec<Notification>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
