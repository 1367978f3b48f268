use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::EngineResult;
use crate::feedback::FeedbackPipeline;
use crate::session::{Session, SessionId, SessionStatus};
use crate::store::SessionStore;

/// Why a session is being completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionTrigger {
    Submitted,
    TimeExpired,
}

/// Result of a lifecycle request. `changed` is false when the session was
/// already terminal and the request was a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub changed: bool,
}

impl Transition {
    fn unchanged(session: &Session) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            completed_at: session.completed_at,
            duration_seconds: session.duration_seconds,
            changed: false,
        }
    }
}

/// Moment the kind's time budget runs out.
pub fn deadline(session: &Session) -> DateTime<Utc> {
    session.started_at + Duration::minutes(session.kind.duration_minutes())
}

/// Owns the in_progress -> completed | abandoned state machine and is the
/// only writer of `status`, `completed_at` and `duration_seconds`.
pub struct LifecycleManager {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    feedback: FeedbackPipeline,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        feedback: FeedbackPipeline,
    ) -> Self {
        Self {
            store,
            clock,
            feedback,
        }
    }

    /// Completes the session and schedules feedback generation.
    pub async fn complete(
        &self,
        session_id: SessionId,
        trigger: CompletionTrigger,
    ) -> EngineResult<Transition> {
        let transition = self.finish(session_id, SessionStatus::Completed).await?;
        if transition.changed {
            tracing::info!(
                "Session {} completed ({:?}) after {:?} seconds",
                session_id,
                trigger,
                transition.duration_seconds
            );
            // Idempotent on the pipeline side, so scheduling needs no guard.
            self.feedback.schedule(session_id);
        }
        Ok(transition)
    }

    /// Abandons the session. Feedback is never scheduled on this path.
    pub async fn abandon(&self, session_id: SessionId) -> EngineResult<Transition> {
        let transition = self.finish(session_id, SessionStatus::Abandoned).await?;
        if transition.changed {
            tracing::info!("Session {} abandoned", session_id);
        }
        Ok(transition)
    }

    /// Completes the session if its time budget has run out.
    pub async fn expire_if_due(&self, session_id: SessionId) -> EngineResult<Option<Transition>> {
        let session = self.store.get(session_id).await?;
        if session.status != SessionStatus::InProgress || self.clock.now() < deadline(&session) {
            return Ok(None);
        }
        self.complete(session_id, CompletionTrigger::TimeExpired)
            .await
            .map(Some)
    }

    async fn finish(&self, session_id: SessionId, to: SessionStatus) -> EngineResult<Transition> {
        let session = self.store.get(session_id).await?;
        if session.status.is_terminal() {
            tracing::debug!(
                "Ignoring {} request for session {} already {}",
                to,
                session_id,
                session.status
            );
            return Ok(Transition::unchanged(&session));
        }

        let now = self.clock.now();
        let duration_seconds = self.clock.elapsed_since(session.started_at).num_seconds();
        self.store
            .set_status(session_id, to, Some(now), Some(duration_seconds))
            .await?;

        Ok(Transition {
            session_id,
            status: to,
            completed_at: Some(now),
            duration_seconds: Some(duration_seconds),
            changed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::feedback::FeedbackStatus;
    use crate::gateway::{MockModelGateway, ScriptedGateway};
    use crate::scenario::ScenarioCatalog;
    use crate::session::{Difficulty, InterviewKind};
    use crate::store::InMemoryStore;
    use std::time::Duration as StdDuration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        manager: LifecycleManager,
        feedback: FeedbackPipeline,
    }

    fn fixture(gateway: Arc<dyn crate::gateway::ModelGateway>) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let feedback = FeedbackPipeline::new(
            gateway,
            store.clone(),
            Arc::new(ScenarioCatalog::builtin()),
            clock.clone(),
            StdDuration::from_secs(5),
        );
        let manager = LifecycleManager::new(store.clone(), clock.clone(), feedback.clone());
        Fixture {
            store,
            clock,
            manager,
            feedback,
        }
    }

    async fn start(f: &Fixture, kind: InterviewKind) -> SessionId {
        let session = Session::new(kind, Difficulty::Easy, "coding-two-sum", f.clock.now());
        let id = session.id;
        f.store.insert(session).await.unwrap();
        id
    }

    async fn wait_for_feedback(feedback: &FeedbackPipeline, id: SessionId) -> FeedbackStatus {
        for _ in 0..100 {
            if let FeedbackStatus::Ready(fb) = feedback.status(id).await.unwrap() {
                return FeedbackStatus::Ready(fb);
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        FeedbackStatus::NotReady
    }

    #[tokio::test]
    async fn test_complete_freezes_duration_and_schedules_feedback() {
        let f = fixture(Arc::new(ScriptedGateway::new()));
        let id = start(&f, InterviewKind::Coding).await;
        f.clock.advance(Duration::seconds(754));

        let t = f.manager.complete(id, CompletionTrigger::Submitted).await.unwrap();
        assert!(t.changed);
        assert_eq!(t.status, SessionStatus::Completed);
        assert_eq!(t.duration_seconds, Some(754));

        assert!(matches!(
            wait_for_feedback(&f.feedback, id).await,
            FeedbackStatus::Ready(_)
        ));
    }

    #[tokio::test]
    async fn test_terminal_retransition_is_noop() {
        let f = fixture(Arc::new(ScriptedGateway::new()));
        let id = start(&f, InterviewKind::Behavioral).await;
        f.clock.advance(Duration::seconds(60));
        let first = f.manager.complete(id, CompletionTrigger::Submitted).await.unwrap();

        f.clock.advance(Duration::seconds(60));
        let again = f.manager.complete(id, CompletionTrigger::Submitted).await.unwrap();
        assert!(!again.changed);
        assert_eq!(again.duration_seconds, first.duration_seconds);
        assert_eq!(again.completed_at, first.completed_at);

        let abandon = f.manager.abandon(id).await.unwrap();
        assert!(!abandon.changed);
        assert_eq!(abandon.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_abandon_never_generates_feedback() {
        let mut gateway = MockModelGateway::new();
        gateway.expect_generate().never();
        let f = fixture(Arc::new(gateway));
        let id = start(&f, InterviewKind::Coding).await;

        let t = f.manager.abandon(id).await.unwrap();
        assert!(t.changed);
        assert_eq!(t.status, SessionStatus::Abandoned);
        assert_eq!(t.duration_seconds, Some(0));

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(f.feedback.status(id).await.unwrap(), FeedbackStatus::NotReady);
        assert_eq!(f.store.feedback_count().await, 0);
    }

    #[tokio::test]
    async fn test_expiry_completes_at_budget() {
        let f = fixture(Arc::new(ScriptedGateway::new()));
        let id = start(&f, InterviewKind::SystemDesign).await;

        f.clock.advance(Duration::minutes(44));
        assert!(f.manager.expire_if_due(id).await.unwrap().is_none());

        f.clock.advance(Duration::minutes(1));
        let t = f.manager.expire_if_due(id).await.unwrap().unwrap();
        assert_eq!(t.status, SessionStatus::Completed);
        assert_eq!(t.duration_seconds, Some(45 * 60));

        let stored = f.store.get(id).await.unwrap();
        let completed_at = stored.completed_at.unwrap();
        assert_eq!(
            stored.duration_seconds,
            Some((completed_at - stored.started_at).num_seconds())
        );
    }
}
