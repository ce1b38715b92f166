//! Error taxonomy for creation and tracking
//!
//! Transport trouble never ends a tracker by itself; it only ends a
//! creation request that never reached the panel.

use crate::panel_api::PanelApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Could not reach the panel: {0}")]
    Transport(#[source] PanelApiError),
    #[error("Request was not accepted: {0}")]
    Rejected(#[source] PanelApiError),
    #[error("Operation failed: {0}")]
    Application(String),
    #[error("Operation did not finish after {attempts} status checks")]
    TimeoutExceeded { attempts: u32 },
    #[error("Invalid response: {0}")]
    Validation(String),
    #[error("Another creation is already in progress")]
    Busy,
    #[error("Tracking cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// Classifies a failed creation call. A reply that arrived but was not
    /// a success, or not JSON, is a rejection; anything else never reached
    /// the server.
    pub fn from_submit(err: PanelApiError) -> Self {
        match err {
            PanelApiError::Rejected(_) | PanelApiError::JsonError(_) => {
                WorkflowError::Rejected(err)
            }
            PanelApiError::HttpError(ref http) if http.is_decode() || http.is_status() => {
                WorkflowError::Rejected(err)
            }
            _ => WorkflowError::Transport(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_classification() {
        assert!(matches!(
            WorkflowError::from_submit(PanelApiError::Rejected(500)),
            WorkflowError::Rejected(_)
        ));

        let json = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        assert!(matches!(
            WorkflowError::from_submit(PanelApiError::JsonError(json)),
            WorkflowError::Rejected(_)
        ));

        assert!(matches!(
            WorkflowError::from_submit(PanelApiError::LoginFailed("x".into())),
            WorkflowError::Transport(_)
        ));
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            WorkflowError::TimeoutExceeded { attempts: 120 }.to_string(),
            "Operation did not finish after 120 status checks"
        );
        assert_eq!(
            WorkflowError::Application("disk allocation failed".into()).to_string(),
            "Operation failed: disk allocation failed"
        );
    }
}
