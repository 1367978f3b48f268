use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::EngineError;

pub type SessionId = Uuid;
pub type FeedbackId = Uuid;

/// The three interview formats a candidate can practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewKind {
    Coding,
    SystemDesign,
    Behavioral,
}

impl InterviewKind {
    pub const ALL: [InterviewKind; 3] = [
        InterviewKind::Coding,
        InterviewKind::SystemDesign,
        InterviewKind::Behavioral,
    ];

    /// Fixed time budget for the kind, in minutes.
    pub fn duration_minutes(self) -> i64 {
        match self {
            InterviewKind::Coding => 60,
            InterviewKind::SystemDesign => 45,
            InterviewKind::Behavioral => 30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InterviewKind::Coding => "coding",
            InterviewKind::SystemDesign => "system_design",
            InterviewKind::Behavioral => "behavioral",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InterviewKind::Coding => "coding",
            InterviewKind::SystemDesign => "system design",
            InterviewKind::Behavioral => "behavioral",
        }
    }
}

impl fmt::Display for InterviewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InterviewKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "coding" => Ok(InterviewKind::Coding),
            "system_design" | "systemdesign" => Ok(InterviewKind::SystemDesign),
            "behavioral" | "behavioural" => Ok(InterviewKind::Behavioral),
            other => Err(EngineError::Validation(format!(
                "unknown interview kind '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(EngineError::Validation(format!(
                "unknown difficulty '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Candidate,
    Interviewer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn candidate(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Candidate,
            text: text.into(),
            timestamp,
        }
    }

    pub fn interviewer(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Interviewer,
            text: text.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// The kind-specific artifact the candidate edits alongside the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Workspace {
    Coding {
        language: String,
        code: String,
    },
    SystemDesign {
        nodes: Vec<DiagramNode>,
        edges: Vec<DiagramEdge>,
    },
    Behavioral {
        situation: String,
        task: String,
        action: String,
        result: String,
    },
}

/// Below this many non-whitespace characters a workspace is treated as a
/// blank template.
const SUBSTANTIVE_CHARS: usize = 40;

impl Workspace {
    pub fn empty_for(kind: InterviewKind) -> Self {
        match kind {
            InterviewKind::Coding => Workspace::Coding {
                language: "python".to_string(),
                code: String::new(),
            },
            InterviewKind::SystemDesign => Workspace::SystemDesign {
                nodes: Vec::new(),
                edges: Vec::new(),
            },
            InterviewKind::Behavioral => Workspace::Behavioral {
                situation: String::new(),
                task: String::new(),
                action: String::new(),
                result: String::new(),
            },
        }
    }

    pub fn kind(&self) -> InterviewKind {
        match self {
            Workspace::Coding { .. } => InterviewKind::Coding,
            Workspace::SystemDesign { .. } => InterviewKind::SystemDesign,
            Workspace::Behavioral { .. } => InterviewKind::Behavioral,
        }
    }

    /// Plain-text rendering used in prompts and hint evaluation.
    pub fn excerpt(&self) -> String {
        match self {
            Workspace::Coding { code, .. } => code.clone(),
            Workspace::SystemDesign { nodes, edges } => {
                let mut out = String::new();
                if !nodes.is_empty() {
                    let names: Vec<&str> = nodes.iter().map(|n| n.label.as_str()).collect();
                    out.push_str(&format!("Components: {}\n", names.join(", ")));
                }
                for edge in edges {
                    let from = label_for(nodes, &edge.from);
                    let to = label_for(nodes, &edge.to);
                    match &edge.label {
                        Some(label) => out.push_str(&format!("{from} -> {to} ({label})\n")),
                        None => out.push_str(&format!("{from} -> {to}\n")),
                    }
                }
                out
            }
            Workspace::Behavioral {
                situation,
                task,
                action,
                result,
            } => {
                let mut out = String::new();
                for (name, value) in [
                    ("Situation", situation),
                    ("Task", task),
                    ("Action", action),
                    ("Result", result),
                ] {
                    if !value.trim().is_empty() {
                        out.push_str(&format!("{name}: {}\n", value.trim()));
                    }
                }
                out
            }
        }
    }

    pub fn is_substantive(&self) -> bool {
        is_substantive_text(&self.excerpt())
    }
}

pub fn is_substantive_text(text: &str) -> bool {
    text.chars().filter(|c| !c.is_whitespace()).count() >= SUBSTANTIVE_CHARS
}

fn label_for<'a>(nodes: &'a [DiagramNode], id: &'a str) -> &'a str {
    nodes
        .iter()
        .find(|n| n.id == id)
        .map(|n| n.label.as_str())
        .unwrap_or(id)
}

/// One timed practice attempt.
///
/// `status`, `completed_at` and `duration_seconds` are written only by the
/// lifecycle manager. The workspace is private so its kind can never drift
/// from the session kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub kind: InterviewKind,
    pub difficulty: Difficulty,
    pub scenario_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    workspace: Workspace,
    pub transcript: Vec<Turn>,
}

impl Session {
    pub fn new(
        kind: InterviewKind,
        difficulty: Difficulty,
        scenario_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            difficulty,
            scenario_id: scenario_id.into(),
            status: SessionStatus::InProgress,
            started_at,
            completed_at: None,
            duration_seconds: None,
            workspace: Workspace::empty_for(kind),
            transcript: Vec::new(),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Replaces the workspace, refusing a payload of the wrong kind.
    pub fn set_workspace(&mut self, workspace: Workspace) -> Result<(), EngineError> {
        if workspace.kind() != self.kind {
            return Err(EngineError::Validation(format!(
                "workspace payload '{}' does not match {} session",
                workspace.kind(),
                self.kind
            )));
        }
        self.workspace = workspace;
        Ok(())
    }

    pub fn last_candidate_turn(&self) -> Option<&Turn> {
        self.transcript
            .iter()
            .rev()
            .find(|t| t.role == Role::Candidate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: FeedbackId,
    pub session_id: SessionId,
    pub overall_score: u8,
    pub technical_score: u8,
    pub communication_score: u8,
    pub problem_solving_score: u8,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub detailed_feedback: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_workspace_matches_kind() {
        for kind in InterviewKind::ALL {
            let session = Session::new(kind, Difficulty::Medium, "s", Utc::now());
            assert_eq!(session.workspace().kind(), kind);
            assert_eq!(session.status, SessionStatus::InProgress);
            assert!(session.duration_seconds.is_none());
        }
    }

    #[test]
    fn test_set_workspace_rejects_other_kind() {
        let mut session = Session::new(InterviewKind::Coding, Difficulty::Easy, "s", Utc::now());
        let err = session
            .set_workspace(Workspace::empty_for(InterviewKind::Behavioral))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(session.workspace().kind(), InterviewKind::Coding);
    }

    #[test]
    fn test_system_design_excerpt_uses_labels() {
        let ws = Workspace::SystemDesign {
            nodes: vec![
                DiagramNode {
                    id: "a".into(),
                    label: "Load Balancer".into(),
                },
                DiagramNode {
                    id: "b".into(),
                    label: "API Server".into(),
                },
            ],
            edges: vec![DiagramEdge {
                from: "a".into(),
                to: "b".into(),
                label: Some("HTTP".into()),
            }],
        };
        let text = ws.excerpt();
        assert!(text.contains("Components: Load Balancer, API Server"));
        assert!(text.contains("Load Balancer -> API Server (HTTP)"));
    }

    #[test]
    fn test_substantive_threshold() {
        assert!(!is_substantive_text("def f():\n    pass"));
        assert!(is_substantive_text(
            "def two_sum(nums, target):\n    seen = {}\n    for i, n in enumerate(nums):\n        pass"
        ));
    }

    #[test]
    fn test_kind_parsing_and_budgets() {
        assert_eq!("system-design".parse::<InterviewKind>().unwrap(), InterviewKind::SystemDesign);
        assert_eq!(InterviewKind::Coding.duration_minutes(), 60);
        assert_eq!(InterviewKind::SystemDesign.duration_minutes(), 45);
        assert_eq!(InterviewKind::Behavioral.duration_minutes(), 30);
        assert!("painting".parse::<InterviewKind>().is_err());
    }
}
