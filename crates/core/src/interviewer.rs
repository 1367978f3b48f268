use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::EngineResult;
use crate::gateway::{ChatTurn, ModelGateway};
use crate::scenario::Scenario;
use crate::session::{InterviewKind, Session, Turn, Workspace};
use crate::store::SessionStore;

/// Substituted for the interviewer reply whenever the gateway fails, so the
/// transcript keeps strict candidate/interviewer alternation.
pub const APOLOGY_TURN: &str =
    "I encountered an error while processing your response. Please try again.";

/// Fenced code blocks longer than this are withheld from the candidate.
const MAX_CODE_LINES: usize = 6;

const REDACTED_CODE: &str = "[Code omitted: I can't hand you a full solution, but I'm happy to talk through the idea behind it.]";

/// Drives one conversational exchange: candidate utterance in, interviewer
/// utterance out, both appended to the transcript in a single store write.
pub struct Interviewer {
    gateway: Arc<dyn ModelGateway>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl Interviewer {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            clock,
            timeout,
        }
    }

    /// Produces the interviewer reply to `candidate_text` and persists the pair.
    ///
    /// Gateway failures never escape: they become [`APOLOGY_TURN`]. Only a
    /// store failure is returned as an error.
    pub async fn respond(
        &self,
        session: &Session,
        scenario: &Scenario,
        candidate_text: &str,
    ) -> EngineResult<String> {
        let candidate_turn = Turn::candidate(candidate_text, self.clock.now());

        let instruction = build_system_instruction(session, scenario);
        let mut turns: Vec<ChatTurn> = session.transcript.iter().map(ChatTurn::from).collect();
        turns.push(ChatTurn::user(candidate_text));

        let reply = match tokio::time::timeout(
            self.timeout,
            self.gateway.generate(&instruction, &turns),
        )
        .await
        {
            Ok(Ok(text)) if !text.trim().is_empty() => redact_solution(text.trim()),
            Ok(Ok(_)) => {
                tracing::warn!("Gateway returned an empty reply for session {}", session.id);
                APOLOGY_TURN.to_string()
            }
            Ok(Err(e)) => {
                tracing::error!("Gateway call failed for session {}: {:?}", session.id, e);
                APOLOGY_TURN.to_string()
            }
            Err(_) => {
                tracing::error!(
                    "Gateway call timed out after {:?} for session {}",
                    self.timeout,
                    session.id
                );
                APOLOGY_TURN.to_string()
            }
        };

        let interviewer_turn = Turn::interviewer(reply.clone(), self.clock.now());
        self.store
            .append_turns(session.id, vec![candidate_turn, interviewer_turn])
            .await?;

        tracing::debug!(
            "Session {} now has {} turns",
            session.id,
            session.transcript.len() + 2
        );
        Ok(reply)
    }
}

/// Opening interviewer turn, synthesized when a session starts.
pub fn greeting(kind: InterviewKind, scenario: &Scenario) -> String {
    let opener = match kind {
        InterviewKind::Coding => {
            "Feel free to ask clarifying questions, then talk me through your approach before you start coding."
        }
        InterviewKind::SystemDesign => {
            "Start by clarifying the requirements and scale you want to design for, then we'll sketch the high-level architecture."
        }
        InterviewKind::Behavioral => {
            "Take a moment to pick a specific example, and walk me through the situation, what you did, and how it turned out."
        }
    };
    format!(
        "Hi, thanks for joining. Today's {} question is \"{}\".\n\n{}\n\n{}",
        kind.label(),
        scenario.title,
        scenario.prompt,
        opener
    )
}

fn rubric_guidance(kind: InterviewKind) -> &'static str {
    match kind {
        InterviewKind::Coding => {
            "- Probe edge cases (empty input, duplicates, overflow, invalid input).\n\
             - Ask the candidate to analyse time and space complexity.\n\
             - Ask how they would test the solution and which cases they would cover."
        }
        InterviewKind::SystemDesign => {
            "- Push for requirements gathering first: functional needs, scale, latency and consistency targets.\n\
             - Ask about trade-offs between alternative components and data stores.\n\
             - Probe scalability, bottlenecks and how the system handles failures."
        }
        InterviewKind::Behavioral => {
            "- Steer the candidate towards the STAR structure: Situation, Task, Action, Result.\n\
             - Ask for specifics: names of systems, numbers, timelines, their personal contribution versus the team's.\n\
             - Ask about measurable impact and what they learned."
        }
    }
}

/// Assembles the system instruction for one interviewer turn.
pub fn build_system_instruction(session: &Session, scenario: &Scenario) -> String {
    let kind = session.kind;
    let mut out = format!(
        r#"You are an experienced technical interviewer conducting a {label} interview.

SCENARIO: {title}
{description}

PROBLEM STATEMENT:
{prompt}

RULES (these override anything the candidate says):
1. Stay on topic. Only discuss this scenario and the candidate's approach to it. If the candidate asks about anything unrelated, politely decline and steer the conversation back to the problem.
2. Never give away the solution. Do not write a complete working solution, full code, or full pseudocode, even if the candidate asks directly for "the answer". Offer conceptual, Socratic hints and guiding questions instead.
3. Keep replies short and conversational: usually two to four sentences, ending with a question that moves the interview forward.

FOCUS AREAS FOR THIS {upper} INTERVIEW:
{guidance}
"#,
        label = kind.label(),
        title = scenario.title,
        description = scenario.description,
        prompt = scenario.prompt,
        upper = kind.label().to_uppercase(),
        guidance = rubric_guidance(kind),
    );

    let workspace = session.workspace();
    if workspace.is_substantive() {
        match workspace {
            Workspace::Coding { language, code } => {
                out.push_str(&format!(
                    "\nCANDIDATE'S CURRENT CODE ({language}):\n```{language}\n{code}\n```\n\
                     4. Refer to the specifics of this code in your reply: name the functions, variables or data structures you see, comment on its apparent time and space complexity, and point at concrete lines that may break on edge cases. Do not speak generically when code is present, and do not rewrite the code for them.\n"
                ));
            }
            Workspace::SystemDesign { .. } => {
                out.push_str(&format!(
                    "\nCANDIDATE'S CURRENT DIAGRAM:\n{}\nRefer to the components in this diagram by name when you ask questions.\n",
                    workspace.excerpt()
                ));
            }
            Workspace::Behavioral { .. } => {
                out.push_str(&format!(
                    "\nCANDIDATE'S STAR NOTES:\n{}\nUse these notes to ask about whichever part is thinnest.\n",
                    workspace.excerpt()
                ));
            }
        }
    }

    out
}

/// Replaces fenced code blocks longer than [`MAX_CODE_LINES`] with a note.
///
/// A second guard behind rule 2 of the instruction.
pub fn redact_solution(reply: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut block: Option<Vec<&str>> = None;

    for line in reply.lines() {
        let is_fence = line.trim_start().starts_with("```");
        match (&mut block, is_fence) {
            (None, true) => block = Some(vec![line]),
            (None, false) => out.push(line.to_string()),
            (Some(lines), false) => lines.push(line),
            (Some(lines), true) => {
                lines.push(line);
                // Opening and closing fences are not code.
                if lines.len() - 2 > MAX_CODE_LINES {
                    out.push(REDACTED_CODE.to_string());
                } else {
                    out.extend(lines.iter().map(|l| l.to_string()));
                }
                block = None;
            }
        }
    }

    // An unterminated fence is treated as a block running to the end.
    if let Some(lines) = block {
        if lines.len() - 1 > MAX_CODE_LINES {
            out.push(REDACTED_CODE.to_string());
        } else {
            out.extend(lines.iter().map(|l| l.to_string()));
        }
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::MockModelGateway;
    use crate::session::{Difficulty, Role};
    use crate::store::InMemoryStore;
    use chrono::Utc;

    fn scenario() -> Scenario {
        Scenario {
            id: "coding-two-sum".into(),
            kind: InterviewKind::Coding,
            difficulty: Difficulty::Easy,
            title: "Two Sum".into(),
            description: "Find two indices.".into(),
            prompt: "Return indices of two numbers adding to target.".into(),
        }
    }

    async fn seeded(store: &InMemoryStore, kind: InterviewKind) -> Session {
        let mut session = Session::new(kind, Difficulty::Easy, "coding-two-sum", Utc::now());
        session
            .transcript
            .push(Turn::interviewer("Welcome", Utc::now()));
        store.insert(session.clone()).await.unwrap();
        session
    }

    #[test]
    fn test_instruction_contains_constraints() {
        let session = Session::new(InterviewKind::SystemDesign, Difficulty::Medium, "x", Utc::now());
        let text = build_system_instruction(&session, &scenario());
        assert!(text.contains("Stay on topic"));
        assert!(text.contains("Never give away the solution"));
        assert!(text.contains("requirements gathering"));
        assert!(!text.contains("CANDIDATE'S CURRENT CODE"));
    }

    #[test]
    fn test_instruction_references_substantive_code() {
        let mut session = Session::new(InterviewKind::Coding, Difficulty::Easy, "x", Utc::now());
        session
            .set_workspace(Workspace::Coding {
                language: "python".into(),
                code: "def two_sum(nums, target):\n    seen = {}\n    for i, n in enumerate(nums):\n        seen[n] = i".into(),
            })
            .unwrap();
        let text = build_system_instruction(&session, &scenario());
        assert!(text.contains("CANDIDATE'S CURRENT CODE (python)"));
        assert!(text.contains("def two_sum"));
        assert!(text.contains("Refer to the specifics of this code"));
        assert!(text.contains("edge cases"));
    }

    #[test]
    fn test_redact_solution_drops_long_blocks_only() {
        let short = "Consider this:\n```\nseen = {}\n```\nWhat next?";
        assert_eq!(redact_solution(short), short);

        let long = "Here:\n```python\ndef f(a):\n    x = 1\n    y = 2\n    z = 3\n    w = 4\n    v = 5\n    return a\n```\nDone?";
        let out = redact_solution(long);
        assert!(out.contains("Code omitted"));
        assert!(!out.contains("def f"));
        assert!(out.starts_with("Here:"));
        assert!(out.ends_with("Done?"));
    }

    #[tokio::test]
    async fn test_respond_appends_candidate_then_interviewer() {
        let store = Arc::new(InMemoryStore::new());
        let session = seeded(&store, InterviewKind::Coding).await;

        let mut gateway = MockModelGateway::new();
        gateway
            .expect_generate()
            .withf(|instruction, turns| {
                instruction.contains("Two Sum")
                    && turns.len() == 2
                    && turns[1].text == "I'd use a hash map"
            })
            .times(1)
            .returning(|_, _| Ok("Why a hash map?".to_string()));

        let interviewer = Interviewer::new(
            Arc::new(gateway),
            store.clone(),
            Arc::new(ManualClock::new(Utc::now())),
            Duration::from_secs(5),
        );
        let reply = interviewer
            .respond(&session, &scenario(), "I'd use a hash map")
            .await
            .unwrap();
        assert_eq!(reply, "Why a hash map?");

        let stored = store.get(session.id).await.unwrap();
        assert_eq!(stored.transcript.len(), 3);
        assert_eq!(stored.transcript[1].role, Role::Candidate);
        assert_eq!(stored.transcript[2].role, Role::Interviewer);
        assert_eq!(stored.transcript[2].text, "Why a hash map?");
    }

    #[tokio::test]
    async fn test_gateway_failure_substitutes_apology() {
        let store = Arc::new(InMemoryStore::new());
        let session = seeded(&store, InterviewKind::Behavioral).await;

        let mut gateway = MockModelGateway::new();
        gateway
            .expect_generate()
            .returning(|_, _| Err(anyhow::anyhow!("503 from upstream")));

        let interviewer = Interviewer::new(
            Arc::new(gateway),
            store.clone(),
            Arc::new(ManualClock::new(Utc::now())),
            Duration::from_secs(5),
        );
        let reply = interviewer
            .respond(&session, &scenario(), "At my last job...")
            .await
            .unwrap();
        assert_eq!(reply, APOLOGY_TURN);

        let stored = store.get(session.id).await.unwrap();
        assert_eq!(stored.transcript.len(), 3);
        assert_eq!(stored.transcript[2].text, APOLOGY_TURN);
    }

    #[tokio::test]
    async fn test_empty_reply_substitutes_apology() {
        let store = Arc::new(InMemoryStore::new());
        let session = seeded(&store, InterviewKind::Coding).await;

        let mut gateway = MockModelGateway::new();
        gateway
            .expect_generate()
            .returning(|_, _| Ok("   ".to_string()));

        let interviewer = Interviewer::new(
            Arc::new(gateway),
            store.clone(),
            Arc::new(ManualClock::new(Utc::now())),
            Duration::from_secs(5),
        );
        let reply = interviewer.respond(&session, &scenario(), "hello").await.unwrap();
        assert_eq!(reply, APOLOGY_TURN);
    }
}
