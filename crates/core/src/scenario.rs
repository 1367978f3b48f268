use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::session::{Difficulty, InterviewKind};
use crate::store::StoreError;

/// Static prompt data for one interview question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub kind: InterviewKind,
    pub difficulty: Difficulty,
    pub title: String,
    pub description: String,
    pub prompt: String,
}

/// Supplies scenarios to the engine. Read-only from the engine's side.
#[async_trait]
pub trait ScenarioSource: Send + Sync {
    async fn pick(
        &self,
        kind: InterviewKind,
        difficulty: Difficulty,
    ) -> Result<Option<Scenario>, StoreError>;

    async fn get(&self, scenario_id: &str) -> Result<Option<Scenario>, StoreError>;
}

/// In-memory scenario list with round-robin selection.
#[derive(Debug)]
pub struct ScenarioCatalog {
    scenarios: Vec<Scenario>,
    cursor: AtomicUsize,
}

impl ScenarioCatalog {
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self {
            scenarios,
            cursor: AtomicUsize::new(0),
        }
    }

    /// The catalog shipped with the engine, one scenario per kind and level.
    pub fn builtin() -> Self {
        Self::new(builtin_scenarios())
    }

    /// Built-ins followed by `extra`; extra entries with a built-in id replace it.
    pub fn builtin_with(extra: Vec<Scenario>) -> Self {
        let mut scenarios: Vec<Scenario> = builtin_scenarios()
            .into_iter()
            .filter(|s| !extra.iter().any(|e| e.id == s.id))
            .collect();
        scenarios.extend(extra);
        Self::new(scenarios)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    fn select(&self, kind: InterviewKind, difficulty: Difficulty) -> Option<Scenario> {
        let exact: Vec<&Scenario> = self
            .scenarios
            .iter()
            .filter(|s| s.kind == kind && s.difficulty == difficulty)
            .collect();
        let candidates = if exact.is_empty() {
            self.scenarios.iter().filter(|s| s.kind == kind).collect()
        } else {
            exact
        };
        if candidates.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[idx].clone())
    }
}

#[async_trait]
impl ScenarioSource for ScenarioCatalog {
    async fn pick(
        &self,
        kind: InterviewKind,
        difficulty: Difficulty,
    ) -> Result<Option<Scenario>, StoreError> {
        Ok(self.select(kind, difficulty))
    }

    async fn get(&self, scenario_id: &str) -> Result<Option<Scenario>, StoreError> {
        Ok(self.scenarios.iter().find(|s| s.id == scenario_id).cloned())
    }
}

fn scenario(
    id: &str,
    kind: InterviewKind,
    difficulty: Difficulty,
    title: &str,
    description: &str,
    prompt: &str,
) -> Scenario {
    Scenario {
        id: id.to_string(),
        kind,
        difficulty,
        title: title.to_string(),
        description: description.to_string(),
        prompt: prompt.to_string(),
    }
}

fn builtin_scenarios() -> Vec<Scenario> {
    use Difficulty::*;
    use InterviewKind::*;
    vec![
        scenario(
            "coding-two-sum",
            Coding,
            Easy,
            "Two Sum",
            "Find two indices whose values add up to a target.",
            "Given an array of integers nums and an integer target, return the indices of the two numbers that add up to target. Each input has exactly one solution and the same element may not be used twice.",
        ),
        scenario(
            "coding-lru-cache",
            Coding,
            Medium,
            "LRU Cache",
            "Design a fixed-capacity cache with least-recently-used eviction.",
            "Implement an LRU cache supporting get(key) and put(key, value) in O(1) average time. When the cache reaches capacity, evict the least recently used entry before inserting.",
        ),
        scenario(
            "coding-median-stream",
            Coding,
            Hard,
            "Median of a Data Stream",
            "Maintain the running median of a stream of numbers.",
            "Design a structure that supports add_num(x) and find_median() for a stream of integers, with find_median running in constant time.",
        ),
        scenario(
            "design-url-shortener",
            SystemDesign,
            Easy,
            "URL Shortener",
            "Design a service that turns long URLs into short links.",
            "Design a URL shortening service. Users submit a long URL and receive a short alias; visiting the alias redirects to the original URL. Consider read-heavy traffic and link expiry.",
        ),
        scenario(
            "design-chat",
            SystemDesign,
            Medium,
            "Group Chat Service",
            "Design a chat backend supporting direct and group messages.",
            "Design a messaging backend for one-to-one and group chat with delivery receipts and offline delivery. Expect tens of millions of daily active users.",
        ),
        scenario(
            "design-rate-limiter",
            SystemDesign,
            Hard,
            "Distributed Rate Limiter",
            "Design rate limiting shared across a fleet of API servers.",
            "Design a rate limiter that enforces per-client request quotas across hundreds of stateless API servers, with low added latency and graceful behaviour when the limiter itself fails.",
        ),
        scenario(
            "behavioral-conflict",
            Behavioral,
            Easy,
            "Disagreement with a Teammate",
            "Describe a time you disagreed with a colleague.",
            "Tell me about a time you disagreed with a teammate on a technical decision. How did you handle it and what was the outcome?",
        ),
        scenario(
            "behavioral-failure",
            Behavioral,
            Medium,
            "Learning from Failure",
            "Describe a project that did not go as planned.",
            "Tell me about a project that failed or missed its goals. What was your role, what did you do when it went wrong, and what did you change afterwards?",
        ),
        scenario(
            "behavioral-influence",
            Behavioral,
            Hard,
            "Leading Without Authority",
            "Describe driving a change you had no formal authority over.",
            "Tell me about a time you had to convince other teams to adopt a change you could not mandate. How did you build support, and how did you measure the result?",
        ),
    ]
}
