use std::fmt;

use crate::{error::ClientError, session::SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeCategory {
    Validation,
    Network,
    Auth,
}

/// User-facing message derived from an operation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    category: NoticeCategory,
    message: String,
}

impl Notice {
    pub fn new(category: NoticeCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn from_client_error(err: &ClientError) -> Self {
        match err {
            ClientError::Unauthorized => {
                Self::new(NoticeCategory::Auth, "Session expired. Please sign in again.")
            }
            ClientError::Api { status: 403, .. } => Self::new(
                NoticeCategory::Auth,
                "You are not allowed to perform this action.",
            ),
            ClientError::Api { status: 410, .. } => {
                Self::new(NoticeCategory::Validation, "This certificate has expired.")
            }
            ClientError::Api { message, .. } => Self::new(NoticeCategory::Network, message.clone()),
            ClientError::Http(err) if err.is_timeout() => Self::new(
                NoticeCategory::Network,
                "The server took too long to respond.",
            ),
            ClientError::Http(_) => Self::new(
                NoticeCategory::Network,
                "Unable to reach the server. Check the connection and retry.",
            ),
            ClientError::Url(err) => Self::new(
                NoticeCategory::Validation,
                format!("Invalid server address: {err}"),
            ),
        }
    }

    pub fn from_session_error(err: &SessionError) -> Self {
        match err {
            SessionError::Backend(err) => Self::from_client_error(err),
            other => Self::new(NoticeCategory::Validation, other.to_string()),
        }
    }

    pub fn category(&self) -> NoticeCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == NoticeCategory::Auth
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&ClientError> for Notice {
    fn from(value: &ClientError) -> Self {
        Self::from_client_error(value)
    }
}

impl From<&SessionError> for Notice {
    fn from(value: &SessionError) -> Self {
        Self::from_session_error(value)
    }
}

#[cfg(test)]
#[path = "tests/notice_tests.rs"]
mod tests;
