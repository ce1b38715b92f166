//! Operation status reporting
//!
//! Types returned by a status poll and the `StatusClient` seam the tracker
//! and the one-shot refresher poll through.

use crate::panel_api::PanelApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified status of a provisioning operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Running,
    Ready,
    Error,
    Unknown,
}

impl OperationStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            // The panel stores freshly submitted machines as "creating"
            "pending" | "creating" => OperationStatus::Pending,
            "running" => OperationStatus::Running,
            "ready" => OperationStatus::Ready,
            "error" => OperationStatus::Error,
            _ => OperationStatus::Unknown,
        }
    }

    /// A running machine counts as provisioned.
    pub fn is_ready(&self) -> bool {
        matches!(self, OperationStatus::Ready | OperationStatus::Running)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Running => "running",
            OperationStatus::Ready => "ready",
            OperationStatus::Error => "error",
            OperationStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Wire shape of `GET /api/vm_status?name=...`.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct StatusBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Result of one poll. Never modified once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: OperationStatus,
    /// Status text exactly as the server sent it, used for display.
    pub raw: String,
    pub note: Option<String>,
}

impl StatusReport {
    pub fn new(raw: impl Into<String>, note: Option<String>) -> Self {
        let raw = raw.into();
        Self {
            status: OperationStatus::parse(&raw),
            raw,
            note,
        }
    }
}

impl From<StatusBody> for StatusReport {
    fn from(body: StatusBody) -> Self {
        let raw = body
            .status
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let note = body.note.filter(|n| !n.trim().is_empty());
        StatusReport::new(raw, note)
    }
}

/// Reply of `GET /api/vm_status?serial=...`, used by the one-shot refresh.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ActionStatus {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_text: Option<String>,
}

impl ActionStatus {
    /// The status text to show, if the server vouched for it.
    pub fn display_text(&self) -> Option<&str> {
        if !self.ok {
            return None;
        }
        self.status_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Source of operation status.
///
/// An `Err` means no report was obtained at all (network, HTTP or parse
/// trouble). An `Ok` report whose status is `Error` is the server telling
/// us the operation failed; callers must keep the two apart.
#[async_trait]
pub trait StatusClient: Send + Sync {
    async fn fetch_status(&self, operation_id: &str) -> Result<StatusReport, PanelApiError>;

    async fn fetch_action_status(&self, serial: &str) -> Result<ActionStatus, PanelApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(OperationStatus::parse("pending"), OperationStatus::Pending);
        assert_eq!(OperationStatus::parse("creating"), OperationStatus::Pending);
        assert_eq!(OperationStatus::parse("Running"), OperationStatus::Running);
        assert_eq!(OperationStatus::parse(" ready "), OperationStatus::Ready);
        assert_eq!(OperationStatus::parse("error"), OperationStatus::Error);
        assert_eq!(OperationStatus::parse("stopped"), OperationStatus::Unknown);
        assert_eq!(OperationStatus::parse(""), OperationStatus::Unknown);

        assert!(OperationStatus::Ready.is_ready());
        assert!(OperationStatus::Running.is_ready());
        assert!(!OperationStatus::Pending.is_ready());
        assert!(!OperationStatus::Error.is_ready());
    }

    #[test]
    fn test_report_from_body() {
        let body: StatusBody =
            serde_json::from_str(r#"{"status": "error", "note": "disk allocation failed"}"#)
                .unwrap();
        let report = StatusReport::from(body);
        assert_eq!(report.status, OperationStatus::Error);
        assert_eq!(report.note.as_deref(), Some("disk allocation failed"));

        let body: StatusBody = serde_json::from_str(r#"{"ok": true}"#).unwrap();
        let report = StatusReport::from(body);
        assert_eq!(report.status, OperationStatus::Unknown);
        assert_eq!(report.raw, "unknown");
        assert_eq!(report.note, None);
    }

    #[test]
    fn test_blank_note_is_dropped() {
        let report = StatusReport::from(StatusBody {
            status: Some("error".to_string()),
            note: Some("   ".to_string()),
        });
        assert_eq!(report.note, None);
    }

    #[test]
    fn test_action_status_display_text() {
        let status: ActionStatus =
            serde_json::from_str(r#"{"ok": true, "status": "running", "status_text": " up \n"}"#)
                .unwrap();
        assert_eq!(status.display_text(), Some("up"));

        let not_found: ActionStatus =
            serde_json::from_str(r#"{"ok": false, "status": "not_found"}"#).unwrap();
        assert_eq!(not_found.display_text(), None);

        let empty = ActionStatus {
            ok: true,
            status: None,
            status_text: Some(String::new()),
        };
        assert_eq!(empty.display_text(), None);
    }
}
