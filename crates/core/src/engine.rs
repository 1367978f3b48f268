use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, EngineResult};
use crate::feedback::{FeedbackPipeline, FeedbackStatus};
use crate::gateway::ModelGateway;
use crate::hints::{self, Hint, HintContext};
use crate::interviewer::{self, Interviewer};
use crate::lifecycle::{CompletionTrigger, LifecycleManager, Transition};
use crate::rate_limit::{RateLimiter, Unlimited};
use crate::scenario::{Scenario, ScenarioCatalog, ScenarioSource};
use crate::session::{
    Difficulty, FeedbackId, InterviewKind, Session, SessionId, SessionStatus, Turn, Workspace,
};
use crate::store::SessionStore;

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Returned by [`InterviewEngine::start_session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub scenario: Scenario,
    pub greeting: String,
}

pub struct EngineBuilder {
    gateway: Arc<dyn ModelGateway>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    scenarios: Arc<dyn ScenarioSource>,
    limiter: Arc<dyn RateLimiter>,
    gateway_timeout: Duration,
}

impl EngineBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_scenarios(mut self, scenarios: Arc<dyn ScenarioSource>) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn build(self) -> InterviewEngine {
        let feedback = FeedbackPipeline::new(
            self.gateway.clone(),
            self.store.clone(),
            self.scenarios.clone(),
            self.clock.clone(),
            self.gateway_timeout,
        );
        InterviewEngine {
            interviewer: Interviewer::new(
                self.gateway,
                self.store.clone(),
                self.clock.clone(),
                self.gateway_timeout,
            ),
            lifecycle: LifecycleManager::new(
                self.store.clone(),
                self.clock.clone(),
                feedback.clone(),
            ),
            feedback,
            store: self.store,
            clock: self.clock,
            scenarios: self.scenarios,
            limiter: self.limiter,
            turn_locks: Mutex::new(HashMap::new()),
            dismissed: Mutex::new(HashMap::new()),
        }
    }
}

/// The operations exposed to runtimes (CLI, HTTP API).
///
/// Every collaborator is injected. Per-session state kept here is limited to
/// the single-flight locks and the dismissed-hint sets, both dropped when a
/// session reaches a terminal state.
pub struct InterviewEngine {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    scenarios: Arc<dyn ScenarioSource>,
    limiter: Arc<dyn RateLimiter>,
    interviewer: Interviewer,
    lifecycle: LifecycleManager,
    feedback: FeedbackPipeline,
    turn_locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
    dismissed: Mutex<HashMap<SessionId, HashSet<String>>>,
}

impl InterviewEngine {
    /// Starts a builder with the system clock, built-in scenarios and no
    /// rate limit.
    pub fn builder(gateway: Arc<dyn ModelGateway>, store: Arc<dyn SessionStore>) -> EngineBuilder {
        EngineBuilder {
            gateway,
            store,
            clock: Arc::new(SystemClock),
            scenarios: Arc::new(ScenarioCatalog::builtin()),
            limiter: Arc::new(Unlimited),
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    /// The single-flight lock for `session_id`. Only sessions seen in
    /// progress get a shared entry; unknown ids fail and terminal sessions
    /// get a private lock.
    async fn turn_lock(&self, session_id: SessionId) -> EngineResult<Arc<tokio::sync::Mutex<()>>> {
        let existing = self
            .turn_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&session_id)
            .cloned();
        if let Some(lock) = existing {
            return Ok(lock);
        }

        let session = self.load_session(session_id).await?;
        if session.status.is_terminal() {
            return Ok(Arc::default());
        }
        let mut locks = self.turn_locks.lock().unwrap_or_else(|e| e.into_inner());
        Ok(locks.entry(session_id).or_default().clone())
    }

    fn forget(&self, session_id: SessionId) {
        self.turn_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_id);
        self.dismissed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_id);
        self.limiter.release(&session_id.to_string());
    }

    // Also runs on unchanged terminal transitions, dropping any entry a
    // racing caller registered after the session ended.
    fn after_transition(&self, transition: &Transition) {
        if transition.status.is_terminal() {
            self.forget(transition.session_id);
        }
    }

    async fn load_session(&self, session_id: SessionId) -> EngineResult<Session> {
        self.store.get(session_id).await.map_err(|e| match e {
            crate::store::StoreError::NotFound(id) => EngineError::SessionNotFound(id),
            other => other.into(),
        })
    }

    async fn load_scenario(&self, session: &Session) -> EngineResult<Scenario> {
        self.scenarios
            .get(&session.scenario_id)
            .await?
            .ok_or_else(|| {
                EngineError::Validation(format!("scenario '{}' is not available", session.scenario_id))
            })
    }

    /// Creates a session and its greeting turn.
    pub async fn start_session(
        &self,
        kind: InterviewKind,
        difficulty: Difficulty,
    ) -> EngineResult<StartedSession> {
        let scenario = self.scenarios.pick(kind, difficulty).await?.ok_or_else(|| {
            EngineError::Validation(format!("no {kind} scenario available"))
        })?;

        let now = self.clock.now();
        let greeting = interviewer::greeting(kind, &scenario);
        let mut session = Session::new(kind, difficulty, scenario.id.clone(), now);
        session.transcript.push(Turn::interviewer(greeting.clone(), now));
        let session_id = session.id;
        self.store.insert(session).await?;

        tracing::info!(
            "Started {} session {} on scenario '{}'",
            kind,
            session_id,
            scenario.id
        );
        Ok(StartedSession {
            session_id,
            scenario,
            greeting,
        })
    }

    /// Sends one candidate utterance and returns the interviewer's reply.
    ///
    /// Turns for the same session are serialized: a second call waits until
    /// the first reply has been appended.
    pub async fn send_turn(&self, session_id: SessionId, candidate_text: &str) -> EngineResult<String> {
        let text = candidate_text.trim();
        if text.is_empty() {
            return Err(EngineError::Validation("candidate message is empty".to_string()));
        }

        let lock = self.turn_lock(session_id).await?;
        let _guard = lock.lock().await;

        if let Some(transition) = self.lifecycle.expire_if_due(session_id).await? {
            self.after_transition(&transition);
        }

        let session = self.load_session(session_id).await?;
        if session.status != SessionStatus::InProgress {
            self.forget(session_id);
            return Err(EngineError::InvalidState {
                session_id,
                status: session.status,
                operation: "send a turn to",
            });
        }

        if !self.limiter.try_acquire(&session_id.to_string()).await {
            return Err(EngineError::RateLimited(session_id));
        }

        let scenario = self.load_scenario(&session).await?;
        self.interviewer.respond(&session, &scenario, text).await
    }

    /// Candidate submits. Schedules feedback generation on first completion.
    pub async fn complete_session(&self, session_id: SessionId) -> EngineResult<Transition> {
        let lock = self.turn_lock(session_id).await?;
        let _guard = lock.lock().await;
        let transition = self
            .lifecycle
            .complete(session_id, CompletionTrigger::Submitted)
            .await?;
        self.after_transition(&transition);
        Ok(transition)
    }

    /// Candidate leaves without asking for an evaluation.
    pub async fn abandon_session(&self, session_id: SessionId) -> EngineResult<Transition> {
        let lock = self.turn_lock(session_id).await?;
        let _guard = lock.lock().await;
        let transition = self.lifecycle.abandon(session_id).await?;
        self.after_transition(&transition);
        Ok(transition)
    }

    /// Completes the session if its time budget is spent. Runtimes call this
    /// from their periodic tick.
    pub async fn expire_if_due(&self, session_id: SessionId) -> EngineResult<Option<Transition>> {
        let lock = self.turn_lock(session_id).await?;
        let _guard = lock.lock().await;
        let transition = self.lifecycle.expire_if_due(session_id).await?;
        if let Some(t) = &transition {
            self.after_transition(t);
        }
        Ok(transition)
    }

    /// Stores the editor's workspace payload for an in-progress session.
    pub async fn update_workspace(&self, session_id: SessionId, workspace: Workspace) -> EngineResult<()> {
        let session = self.load_session(session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::InvalidState {
                session_id,
                status: session.status,
                operation: "update the workspace of",
            });
        }
        if workspace.kind() != session.kind {
            return Err(EngineError::Validation(format!(
                "workspace payload '{}' does not match {} session",
                workspace.kind(),
                session.kind
            )));
        }
        self.store.set_workspace(session_id, workspace).await?;
        Ok(())
    }

    /// Polls for feedback. Never creates it.
    pub async fn get_feedback(&self, session_id: SessionId) -> EngineResult<FeedbackStatus> {
        self.load_session(session_id).await?;
        self.feedback.status(session_id).await
    }

    /// Runs feedback generation inline, for a manual "try again".
    pub async fn retry_feedback(&self, session_id: SessionId) -> EngineResult<FeedbackId> {
        self.load_session(session_id).await?;
        self.feedback.generate(session_id).await
    }

    /// Ranked hints for the session, with its dismissed hints removed.
    /// Terminal sessions get none.
    pub async fn get_hints(
        &self,
        session_id: SessionId,
        elapsed_minutes: f64,
        total_minutes: f64,
        workspace_excerpt: Option<&str>,
    ) -> EngineResult<Vec<Hint>> {
        // Expiry is skipped while a turn is in flight; that turn runs it.
        let lock = self.turn_lock(session_id).await?;
        if let Ok(_guard) = lock.try_lock() {
            if let Some(t) = self.lifecycle.expire_if_due(session_id).await? {
                self.after_transition(&t);
            }
        }

        let session = self.load_session(session_id).await?;
        if session.status.is_terminal() {
            self.forget(session_id);
            return Ok(Vec::new());
        }

        let dismissed = self
            .dismissed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&session_id)
            .cloned()
            .unwrap_or_default();

        Ok(hints::evaluate(&HintContext {
            kind: session.kind,
            transcript: &session.transcript,
            elapsed_minutes,
            total_minutes,
            dismissed: &dismissed,
            workspace_excerpt,
            now: self.clock.now(),
        }))
    }

    /// Hints using the engine's clock and the stored workspace.
    pub async fn current_hints(&self, session_id: SessionId) -> EngineResult<Vec<Hint>> {
        let session = self.load_session(session_id).await?;
        let elapsed = self.clock.elapsed_since(session.started_at);
        let elapsed_minutes = elapsed.num_seconds() as f64 / 60.0;
        let total_minutes = session.kind.duration_minutes() as f64;
        let excerpt = session.workspace().excerpt();
        self.get_hints(session_id, elapsed_minutes, total_minutes, Some(&excerpt))
            .await
    }

    /// Suppresses `hint_id` for the rest of the session.
    pub async fn dismiss_hint(&self, session_id: SessionId, hint_id: &str) -> EngineResult<()> {
        let session = self.load_session(session_id).await?;
        if session.status.is_terminal() {
            return Ok(());
        }
        self.dismissed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(session_id)
            .or_default()
            .insert(hint_id.to_string());
        Ok(())
    }

    pub async fn session(&self, session_id: SessionId) -> EngineResult<Session> {
        self.load_session(session_id).await
    }
}
