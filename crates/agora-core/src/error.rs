// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the Agora feed engine.

use thiserror::Error;

/// The error type returned by every engine operation and collaborator trait.
///
/// Errors are `Clone` so that a single in-flight operation (a page load or an
/// optimistic mutation) can hand the same failure to every joined caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgoraError {
    /// Transport unreachable or timed out. Retryable.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The remote service rejected the session token (401).
    #[error("authentication invalid: {0}")]
    AuthInvalid(String),

    /// The remote service rejected the request (4xx other than 401).
    #[error("request rejected ({status}): {message}")]
    ValidationRejected { status: u16, message: String },

    /// The remote service failed (5xx). Retryable with backoff.
    #[error("server fault ({status}): {message}")]
    ServerFault { status: u16, message: String },

    /// The push channel dropped. Drives reconnection, never shown to users.
    #[error("push channel dropped: {0}")]
    ChannelDropped(String),

    /// The intent was rejected locally before reaching the remote service.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The intent needs a signed-in session.
    #[error("sign-in required")]
    SignInRequired,

    /// Durable client storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgoraError {
    /// Returns true for failures worth retrying without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgoraError::NetworkFailure(_)
                | AgoraError::ServerFault { .. }
                | AgoraError::ChannelDropped(_)
        )
    }

    /// Returns true if the session token was rejected.
    pub fn is_auth_invalid(&self) -> bool {
        matches!(self, AgoraError::AuthInvalid(_))
    }

    /// Returns true if the remote service reports the entity as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AgoraError::ValidationRejected { status: 404, .. })
    }

    /// Short, user-facing explanation for notices.
    pub fn user_message(&self) -> String {
        match self {
            AgoraError::NetworkFailure(_) => "network unavailable, try again".to_string(),
            AgoraError::AuthInvalid(_) => "your session expired, please sign in again".to_string(),
            AgoraError::ValidationRejected { message, .. } => message.clone(),
            AgoraError::InvalidInput(message) => message.clone(),
            AgoraError::ServerFault { .. } => "the server had a problem, try again".to_string(),
            AgoraError::ChannelDropped(_) => "live updates reconnecting".to_string(),
            AgoraError::SignInRequired => "sign in to do that".to_string(),
            AgoraError::Storage(_) | AgoraError::Config(_) | AgoraError::Internal(_) => {
                "something went wrong".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        assert!(AgoraError::NetworkFailure("timeout".into()).is_retryable());
        assert!(
            AgoraError::ServerFault {
                status: 503,
                message: "busy".into()
            }
            .is_retryable()
        );
        assert!(!AgoraError::AuthInvalid("expired".into()).is_retryable());
        assert!(
            !AgoraError::ValidationRejected {
                status: 422,
                message: "title required".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn not_found_is_a_404_rejection() {
        let err = AgoraError::ValidationRejected {
            status: 404,
            message: "no such post".into(),
        };
        assert!(err.is_not_found());
        assert!(!AgoraError::Internal("x".into()).is_not_found());
    }

    #[test]
    fn validation_message_is_surfaced_verbatim() {
        let err = AgoraError::ValidationRejected {
            status: 400,
            message: "body too long".into(),
        };
        assert_eq!(err.user_message(), "body too long");
    }
}
