use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::gateway::{ChatTurn, ModelGateway};
use crate::scenario::{Scenario, ScenarioSource};
use crate::session::{
    Feedback, FeedbackId, InterviewKind, Role, Session, SessionId, SessionStatus,
};
use crate::store::{SessionStore, StoreError};

/// Score used for any numeric field the model left out.
pub const DEFAULT_SCORE: u8 = 7;
const MIN_SCORE: i64 = 1;
const MAX_SCORE: i64 = 10;

const DEFAULT_STRENGTHS: [&str; 2] = [
    "Engaged with the problem and kept the conversation going",
    "Shared their reasoning with the interviewer",
];
const DEFAULT_IMPROVEMENTS: [&str; 2] = [
    "Outline your approach explicitly before going into detail",
    "Raise trade-offs and edge cases without waiting to be asked",
];
const DEFAULT_NARRATIVE: &str = "Thanks for completing this practice interview. A detailed evaluation could not be produced for this session, so these scores are a neutral baseline. Review the transcript, note where you hesitated or skipped steps, and try another session focusing on structure, trade-offs and edge cases.";

/// Outcome of polling for feedback. `NotReady` is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedbackStatus {
    Ready(Feedback),
    NotReady,
}

/// Scores and comments decoded from one model evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub overall_score: u8,
    pub technical_score: u8,
    pub communication_score: u8,
    pub problem_solving_score: u8,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub detailed_feedback: String,
    /// True when the payload could not be decoded at all.
    pub degraded: bool,
}

impl Default for Evaluation {
    fn default() -> Self {
        Self {
            overall_score: DEFAULT_SCORE,
            technical_score: DEFAULT_SCORE,
            communication_score: DEFAULT_SCORE,
            problem_solving_score: DEFAULT_SCORE,
            strengths: DEFAULT_STRENGTHS.iter().map(|s| s.to_string()).collect(),
            improvements: DEFAULT_IMPROVEMENTS.iter().map(|s| s.to_string()).collect(),
            detailed_feedback: DEFAULT_NARRATIVE.to_string(),
            degraded: true,
        }
    }
}

/// Converts a completed session's transcript into one persisted [`Feedback`].
#[derive(Clone)]
pub struct FeedbackPipeline {
    gateway: Arc<dyn ModelGateway>,
    store: Arc<dyn SessionStore>,
    scenarios: Arc<dyn ScenarioSource>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl FeedbackPipeline {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        store: Arc<dyn SessionStore>,
        scenarios: Arc<dyn ScenarioSource>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            scenarios,
            clock,
            timeout,
        }
    }

    /// Generates feedback for `session_id`, or returns the id of the row that
    /// already exists.
    pub async fn generate(&self, session_id: SessionId) -> EngineResult<FeedbackId> {
        let session = self.store.get(session_id).await?;
        if session.status != SessionStatus::Completed {
            return Err(EngineError::InvalidState {
                session_id,
                status: session.status,
                operation: "generate feedback for",
            });
        }

        if let Some(existing) = self.store.get_feedback(session_id).await? {
            tracing::debug!("Feedback {} already exists for session {}", existing.id, session_id);
            return Ok(existing.id);
        }

        let scenario = match self.scenarios.get(&session.scenario_id).await? {
            Some(scenario) => scenario,
            None => {
                tracing::warn!(
                    "Scenario {} not found, evaluating session {} without it",
                    session.scenario_id,
                    session_id
                );
                placeholder_scenario(&session)
            }
        };

        let instruction = build_evaluation_prompt(&session, &scenario);
        let request = [ChatTurn::user(
            "Evaluate the interview above. Respond with the JSON object only.",
        )];

        let raw = match tokio::time::timeout(
            self.timeout,
            self.gateway.generate(&instruction, &request),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::error!("Feedback generation failed for session {}: {:?}", session_id, e);
                return Err(EngineError::GatewayUnavailable(e.to_string()));
            }
            Err(_) => return Err(EngineError::GatewayTimeout(self.timeout.as_secs())),
        };

        let evaluation = parse_evaluation(&raw);
        if evaluation.degraded {
            tracing::warn!(
                "Could not decode evaluation for session {}, using default feedback",
                session_id
            );
        }

        let feedback = Feedback {
            id: Uuid::new_v4(),
            session_id,
            overall_score: evaluation.overall_score,
            technical_score: evaluation.technical_score,
            communication_score: evaluation.communication_score,
            problem_solving_score: evaluation.problem_solving_score,
            strengths: evaluation.strengths,
            improvements: evaluation.improvements,
            detailed_feedback: evaluation.detailed_feedback,
            created_at: self.clock.now(),
        };

        match self.store.create_feedback(feedback).await {
            Ok(id) => {
                tracing::info!("Stored feedback {} for session {}", id, session_id);
                Ok(id)
            }
            Err(StoreError::FeedbackExists(_)) => {
                // Lost the race to a concurrent trigger; theirs is the record.
                let existing = self
                    .store
                    .get_feedback(session_id)
                    .await?
                    .ok_or(StoreError::Unavailable(format!(
                        "feedback for session {session_id} reported as existing but not readable"
                    )))?;
                Ok(existing.id)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runs [`generate`](Self::generate) in the background. Errors are logged.
    pub fn schedule(&self, session_id: SessionId) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.generate(session_id).await {
                tracing::error!("Background feedback for session {} failed: {}", session_id, e);
            }
        })
    }

    /// Polls for feedback without ever creating it.
    pub async fn status(&self, session_id: SessionId) -> EngineResult<FeedbackStatus> {
        // Surfaces NotFound for unknown sessions.
        self.store.get(session_id).await?;
        Ok(match self.store.get_feedback(session_id).await? {
            Some(feedback) => FeedbackStatus::Ready(feedback),
            None => FeedbackStatus::NotReady,
        })
    }
}

fn placeholder_scenario(session: &Session) -> Scenario {
    Scenario {
        id: session.scenario_id.clone(),
        kind: session.kind,
        difficulty: session.difficulty,
        title: session.scenario_id.clone(),
        description: String::new(),
        prompt: "(scenario text unavailable)".to_string(),
    }
}

fn rubric(kind: InterviewKind) -> &'static str {
    match kind {
        InterviewKind::Coding => {
            "- Problem understanding: clarified inputs, outputs and constraints\n\
             - Approach clarity: explained the plan before coding\n\
             - Code quality: readable, correct, idiomatic\n\
             - Edge cases: identified and handled them\n\
             - Complexity analysis: stated and justified time and space cost\n\
             - Testing discussion: proposed meaningful test cases"
        }
        InterviewKind::SystemDesign => {
            "- Requirements gathering: functional and non-functional needs, scale estimates\n\
             - High-level design: coherent components and data flow\n\
             - Component trade-offs: justified choices between alternatives\n\
             - Scalability: bottlenecks, partitioning, caching\n\
             - Failure handling: redundancy, degradation, recovery"
        }
        InterviewKind::Behavioral => {
            "- STAR adherence: clear Situation, Task, Action and Result\n\
             - Specificity: concrete details rather than generalities\n\
             - Ownership vs. team framing: clear about their personal contribution\n\
             - Quantified impact: measurable outcomes\n\
             - Reflection: lessons learned and what they would change"
        }
    }
}

fn technical_axis(kind: InterviewKind) -> &'static str {
    match kind {
        InterviewKind::Coding => "technical accuracy",
        InterviewKind::SystemDesign => "design depth",
        InterviewKind::Behavioral => "answer structure",
    }
}

pub fn render_transcript(session: &Session) -> String {
    session
        .transcript
        .iter()
        .map(|turn| match turn.role {
            Role::Candidate => format!("Candidate: {}", turn.text),
            Role::Interviewer => format!("Interviewer: {}", turn.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_duration(seconds: Option<i64>) -> String {
    match seconds {
        Some(s) => format!("{} minutes {} seconds", s / 60, s % 60),
        None => "unknown".to_string(),
    }
}

/// Builds the evaluation instruction sent to the model.
pub fn build_evaluation_prompt(session: &Session, scenario: &Scenario) -> String {
    format!(
        r#"You are a senior interviewer writing a post-interview evaluation for a {label} interview.

SCENARIO: {title}
{prompt}

DURATION: {duration} (budget {budget} minutes)

TRANSCRIPT:
{transcript}

RUBRIC:
{rubric}

Score the candidate from 1 (poor) to 10 (excellent) on each axis. The technical_score axis measures {axis}.

Respond with STRICT JSON only, in exactly this shape:
{{
  "overall_score": <integer 1-10>,
  "technical_score": <integer 1-10>,
  "communication_score": <integer 1-10>,
  "problem_solving_score": <integer 1-10>,
  "strengths": ["<specific strength>", ...],
  "improvements": ["<specific improvement>", ...],
  "detailed_feedback": "<several paragraphs of narrative feedback>"
}}"#,
        label = session.kind.label(),
        title = scenario.title,
        prompt = scenario.prompt,
        duration = format_duration(session.duration_seconds),
        budget = session.kind.duration_minutes(),
        transcript = render_transcript(session),
        rubric = rubric(session.kind),
        axis = technical_axis(session.kind),
    )
}

/// Finds the JSON object in raw model output, preferring a fenced block.
fn extract_json(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```") {
        let after_fence = &raw[start + 3..];
        // Skip an info string such as `json`.
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            let candidate = body[..end].trim();
            if candidate.starts_with('{') {
                return Some(candidate);
            }
        }
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn score(value: Option<&Value>) -> u8 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => (n.round() as i64).clamp(MIN_SCORE, MAX_SCORE) as u8,
        _ => DEFAULT_SCORE,
    }
}

fn string_list(value: Option<&Value>, defaults: &[&str]) -> Vec<String> {
    let items: Vec<String> = value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if items.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        items
    }
}

/// Decodes model output into an [`Evaluation`], substituting defaults for
/// anything missing or malformed. Never fails.
pub fn parse_evaluation(raw: &str) -> Evaluation {
    let Some(value) = extract_json(raw).and_then(|json| serde_json::from_str::<Value>(json).ok())
    else {
        return Evaluation::default();
    };
    if !value.is_object() {
        return Evaluation::default();
    }

    let narrative = value
        .get("detailed_feedback")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_NARRATIVE)
        .to_string();

    Evaluation {
        overall_score: score(value.get("overall_score")),
        technical_score: score(value.get("technical_score")),
        communication_score: score(value.get("communication_score")),
        problem_solving_score: score(value.get("problem_solving_score")),
        strengths: string_list(value.get("strengths"), &DEFAULT_STRENGTHS),
        improvements: string_list(value.get("improvements"), &DEFAULT_IMPROVEMENTS),
        detailed_feedback: narrative,
        degraded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::MockModelGateway;
    use crate::scenario::ScenarioCatalog;
    use crate::session::{Difficulty, Turn};
    use crate::store::InMemoryStore;
    use chrono::Utc;

    const GOOD: &str = r#"Here is my evaluation:
```json
{"overall_score": 8, "technical_score": 9, "communication_score": 7, "problem_solving_score": 8,
 "strengths": ["Clear plan"], "improvements": ["Test more"], "detailed_feedback": "Strong."}
```"#;

    #[test]
    fn test_parse_fenced_payload() {
        let eval = parse_evaluation(GOOD);
        assert!(!eval.degraded);
        assert_eq!(eval.overall_score, 8);
        assert_eq!(eval.technical_score, 9);
        assert_eq!(eval.strengths, vec!["Clear plan"]);
        assert_eq!(eval.detailed_feedback, "Strong.");
    }

    #[test]
    fn test_parse_bare_object_with_prose() {
        let eval = parse_evaluation(
            r#"Sure! {"overall_score": 6, "technical_score": 5, "communication_score": 6, "problem_solving_score": 4, "strengths": ["a"], "improvements": ["b"], "detailed_feedback": "ok"} Hope that helps."#,
        );
        assert_eq!(eval.overall_score, 6);
        assert_eq!(eval.problem_solving_score, 4);
    }

    #[test]
    fn test_scores_are_clamped_and_defaulted() {
        let eval = parse_evaluation(
            r#"{"overall_score": 14, "technical_score": -3, "communication_score": "9", "strengths": [], "detailed_feedback": ""}"#,
        );
        assert_eq!(eval.overall_score, 10);
        assert_eq!(eval.technical_score, 1);
        assert_eq!(eval.communication_score, 9);
        assert_eq!(eval.problem_solving_score, DEFAULT_SCORE);
        assert_eq!(eval.strengths.len(), DEFAULT_STRENGTHS.len());
        assert_eq!(eval.improvements.len(), DEFAULT_IMPROVEMENTS.len());
        assert_eq!(eval.detailed_feedback, DEFAULT_NARRATIVE);
        assert!(!eval.degraded);
    }

    #[test]
    fn test_undecodable_output_degrades_to_defaults() {
        let eval = parse_evaluation("I cannot evaluate this interview.");
        assert!(eval.degraded);
        assert_eq!(eval, Evaluation::default());

        let eval = parse_evaluation("```json\n{not json}\n```");
        assert!(eval.degraded);
    }

    #[test]
    fn test_prompt_contains_transcript_and_rubric() {
        let mut session = Session::new(InterviewKind::Behavioral, Difficulty::Easy, "b", Utc::now());
        session.transcript.push(Turn::interviewer("Tell me about a conflict.", Utc::now()));
        session.transcript.push(Turn::candidate("At Acme we disagreed on Kafka.", Utc::now()));
        session.duration_seconds = Some(125);
        let scenario = placeholder_scenario(&session);
        let prompt = build_evaluation_prompt(&session, &scenario);
        assert!(prompt.contains("Interviewer: Tell me about a conflict."));
        assert!(prompt.contains("Candidate: At Acme we disagreed on Kafka."));
        assert!(prompt.contains("2 minutes 5 seconds"));
        assert!(prompt.contains("STAR adherence"));
        assert!(prompt.contains("\"overall_score\""));
    }

    async fn completed_session(store: &InMemoryStore, status: SessionStatus) -> SessionId {
        let mut session = Session::new(
            InterviewKind::Coding,
            Difficulty::Easy,
            "coding-two-sum",
            Utc::now(),
        );
        session.status = status;
        session.duration_seconds = Some(600);
        let id = session.id;
        store.insert(session).await.unwrap();
        id
    }

    fn pipeline(gateway: MockModelGateway, store: Arc<InMemoryStore>) -> FeedbackPipeline {
        FeedbackPipeline::new(
            Arc::new(gateway),
            store,
            Arc::new(ScenarioCatalog::builtin()),
            Arc::new(ManualClock::new(Utc::now())),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_generate_twice_yields_one_record() {
        let store = Arc::new(InMemoryStore::new());
        let id = completed_session(&store, SessionStatus::Completed).await;

        let mut gateway = MockModelGateway::new();
        gateway
            .expect_generate()
            .times(1)
            .returning(|_, _| Ok(GOOD.to_string()));
        let pipeline = pipeline(gateway, store.clone());

        let first = pipeline.generate(id).await.unwrap();
        let second = pipeline.generate(id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.feedback_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_converge() {
        let store = Arc::new(InMemoryStore::new());
        let id = completed_session(&store, SessionStatus::Completed).await;

        let mut gateway = MockModelGateway::new();
        gateway.expect_generate().returning(|_, _| Ok(GOOD.to_string()));
        let pipeline = pipeline(gateway, store.clone());

        let (a, b) = tokio::join!(pipeline.generate(id), pipeline.generate(id));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(store.feedback_count().await, 1);
    }

    #[tokio::test]
    async fn test_rejects_session_not_completed() {
        let store = Arc::new(InMemoryStore::new());
        let id = completed_session(&store, SessionStatus::InProgress).await;

        let mut gateway = MockModelGateway::new();
        gateway.expect_generate().never();
        let pipeline = pipeline(gateway, store.clone());

        let err = pipeline.generate(id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
        assert_eq!(pipeline.status(id).await.unwrap(), FeedbackStatus::NotReady);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_retryable_and_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let id = completed_session(&store, SessionStatus::Completed).await;

        let mut gateway = MockModelGateway::new();
        gateway
            .expect_generate()
            .returning(|_, _| Err(anyhow::anyhow!("connection reset")));
        let pipeline = pipeline(gateway, store.clone());

        let err = pipeline.generate(id).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.feedback_count().await, 0);
    }

    #[tokio::test]
    async fn test_garbage_output_still_stores_feedback() {
        let store = Arc::new(InMemoryStore::new());
        let id = completed_session(&store, SessionStatus::Completed).await;

        let mut gateway = MockModelGateway::new();
        gateway
            .expect_generate()
            .returning(|_, _| Ok("no json here".to_string()));
        let pipeline = pipeline(gateway, store.clone());

        pipeline.generate(id).await.unwrap();
        match pipeline.status(id).await.unwrap() {
            FeedbackStatus::Ready(feedback) => {
                assert_eq!(feedback.overall_score, DEFAULT_SCORE);
                assert!(!feedback.strengths.is_empty());
            }
            FeedbackStatus::NotReady => panic!("feedback should be ready"),
        }
    }
}
