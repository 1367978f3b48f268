use crate::session::{SessionId, SessionStatus};
use crate::store::StoreError;

/// Errors surfaced by the interview engine to its callers.
///
/// Malformed model output never shows up here; the feedback pipeline
/// degrades to default values instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("Cannot {operation} session {session_id} while it is {status}")]
    InvalidState {
        session_id: SessionId,
        status: SessionStatus,
        operation: &'static str,
    },
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Model gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("Model gateway timed out after {0} seconds")]
    GatewayTimeout(u64),
    #[error("Rate limit exceeded for session {0}, try again shortly")]
    RateLimited(SessionId),
    #[error("Session store failure: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Whether the caller should offer a "try again".
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::GatewayUnavailable(_)
            | EngineError::GatewayTimeout(_)
            | EngineError::RateLimited(_) => true,
            EngineError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::SessionNotFound(_) | EngineError::Store(StoreError::NotFound(_))
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_retryable_classification() {
        let id = Uuid::new_v4();
        assert!(EngineError::GatewayTimeout(30).is_retryable());
        assert!(EngineError::RateLimited(id).is_retryable());
        assert!(EngineError::Store(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!EngineError::SessionNotFound(id).is_retryable());
        assert!(
            !EngineError::InvalidState {
                session_id: id,
                status: SessionStatus::Abandoned,
                operation: "generate feedback for",
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let id = Uuid::nil();
        let err = EngineError::InvalidState {
            session_id: id,
            status: SessionStatus::Completed,
            operation: "send a turn to",
        };
        assert_eq!(
            err.to_string(),
            format!("Cannot send a turn to session {id} while it is completed")
        );
    }
}
