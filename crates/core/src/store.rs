use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tokio::sync::RwLock;

use crate::session::{
    Feedback, FeedbackId, Session, SessionId, SessionStatus, Turn, Workspace,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No session with id {0}")]
    NotFound(SessionId),
    #[error("Feedback already exists for session {0}")]
    FeedbackExists(SessionId),
    #[error("Write rejected: {0}")]
    Rejected(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Durable access to sessions, transcripts and feedback, keyed by session id.
///
/// `create_feedback` must refuse a second row for the same session with
/// `StoreError::FeedbackExists`; the feedback pipeline relies on that to
/// converge concurrent triggers onto one record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<(), StoreError>;

    async fn get(&self, session_id: SessionId) -> Result<Session, StoreError>;

    async fn append_turn(&self, session_id: SessionId, turn: Turn) -> Result<(), StoreError>;

    /// Appends several turns as one mutation. The default is only as atomic
    /// as the underlying `append_turn`.
    async fn append_turns(&self, session_id: SessionId, turns: Vec<Turn>) -> Result<(), StoreError> {
        for turn in turns {
            self.append_turn(session_id, turn).await?;
        }
        Ok(())
    }

    async fn set_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
        completed_at: Option<DateTime<Utc>>,
        duration_seconds: Option<i64>,
    ) -> Result<(), StoreError>;

    async fn set_workspace(
        &self,
        session_id: SessionId,
        workspace: Workspace,
    ) -> Result<(), StoreError>;

    async fn get_feedback(&self, session_id: SessionId) -> Result<Option<Feedback>, StoreError>;

    async fn create_feedback(&self, feedback: Feedback) -> Result<FeedbackId, StoreError>;
}

/// Process-local store. Suitable for the CLI, the demo API and tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    feedback: RwLock<HashMap<SessionId, Feedback>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn feedback_count(&self) -> usize {
        self.feedback.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn insert(&self, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.entry(session.id) {
            Entry::Occupied(_) => Err(StoreError::Rejected(format!(
                "session {} already exists",
                session.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    async fn get(&self, session_id: SessionId) -> Result<Session, StoreError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(StoreError::NotFound(session_id))
    }

    async fn append_turn(&self, session_id: SessionId, turn: Turn) -> Result<(), StoreError> {
        self.append_turns(session_id, vec![turn]).await
    }

    async fn append_turns(&self, session_id: SessionId, turns: Vec<Turn>) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(StoreError::NotFound(session_id))?;
        session.transcript.extend(turns);
        Ok(())
    }

    async fn set_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
        completed_at: Option<DateTime<Utc>>,
        duration_seconds: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(StoreError::NotFound(session_id))?;
        session.status = status;
        session.completed_at = completed_at;
        session.duration_seconds = duration_seconds;
        Ok(())
    }

    async fn set_workspace(
        &self,
        session_id: SessionId,
        workspace: Workspace,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(StoreError::NotFound(session_id))?;
        session
            .set_workspace(workspace)
            .map_err(|e| StoreError::Rejected(e.to_string()))
    }

    async fn get_feedback(&self, session_id: SessionId) -> Result<Option<Feedback>, StoreError> {
        Ok(self.feedback.read().await.get(&session_id).cloned())
    }

    async fn create_feedback(&self, feedback: Feedback) -> Result<FeedbackId, StoreError> {
        let mut rows = self.feedback.write().await;
        match rows.entry(feedback.session_id) {
            Entry::Occupied(_) => Err(StoreError::FeedbackExists(feedback.session_id)),
            Entry::Vacant(slot) => {
                let id = feedback.id;
                slot.insert(feedback);
                Ok(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Difficulty, InterviewKind};
    use uuid::Uuid;

    fn feedback_for(session_id: SessionId) -> Feedback {
        Feedback {
            id: Uuid::new_v4(),
            session_id,
            overall_score: 7,
            technical_score: 7,
            communication_score: 7,
            problem_solving_score: 7,
            strengths: vec!["Clear".into()],
            improvements: vec!["Test more".into()],
            detailed_feedback: "Fine".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_feedback_refuses_duplicate() {
        let store = InMemoryStore::new();
        let session_id = Uuid::new_v4();
        let first = feedback_for(session_id);
        let first_id = store.create_feedback(first).await.unwrap();

        let err = store.create_feedback(feedback_for(session_id)).await.unwrap_err();
        assert!(matches!(err, StoreError::FeedbackExists(id) if id == session_id));

        let stored = store.get_feedback(session_id).await.unwrap().unwrap();
        assert_eq!(stored.id, first_id);
        assert_eq!(store.feedback_count().await, 1);
    }

    #[tokio::test]
    async fn test_append_turns_keeps_order() {
        let store = InMemoryStore::new();
        let session = Session::new(InterviewKind::Coding, Difficulty::Easy, "s", Utc::now());
        let id = session.id;
        store.insert(session).await.unwrap();

        let now = Utc::now();
        store
            .append_turns(
                id,
                vec![Turn::candidate("first", now), Turn::interviewer("second", now)],
            )
            .await
            .unwrap();

        let texts: Vec<String> = store
            .get(id)
            .await
            .unwrap()
            .transcript
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_set_workspace_rejects_mismatch() {
        let store = InMemoryStore::new();
        let session = Session::new(InterviewKind::Behavioral, Difficulty::Easy, "s", Utc::now());
        let id = session.id;
        store.insert(session).await.unwrap();

        let err = store
            .set_workspace(id, Workspace::empty_for(InterviewKind::Coding))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
