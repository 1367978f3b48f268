//! Coaching hints derived from live session state.
//!
//! [`evaluate`] is a pure function: the same context always yields the same
//! hints. Callers re-run it on a fixed cadence and whenever the transcript
//! changes; the only state that survives between runs is the dismissed-id
//! set, which the caller owns.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::session::{InterviewKind, Role, Turn, is_substantive_text};

/// Most hints returned from one evaluation.
pub const MAX_HINTS: usize = 3;

/// How often runtimes should re-evaluate hints, in seconds of session time.
pub const REFRESH_INTERVAL_SECS: u64 = 30;

/// Progress fractions that trigger a "time elapsed" hint.
const TIME_THRESHOLDS: [(f64, &str); 4] = [
    (0.25, "time-25"),
    (0.50, "time-50"),
    (0.75, "time-75"),
    (0.90, "time-90"),
];
/// Width of the progress window after each threshold during which its hint shows.
const THRESHOLD_BAND: f64 = 0.05;

const SILENCE_LIMIT_SECS: i64 = 120;

pub const KEEP_TALKING_ID: &str = "keep-talking";
pub const DISCUSS_COMPLEXITY_ID: &str = "discuss-complexity";

const COMPLEXITY_KEYWORDS: [&str; 8] = [
    "complexity",
    "big o",
    "big-o",
    "o(n",
    "o(1",
    "o(log",
    "runtime",
    "asymptotic",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintCategory {
    Tip,
    Warning,
    Suggestion,
    Reminder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub id: String,
    pub category: HintCategory,
    pub title: String,
    pub body: String,
    /// Lower is more urgent.
    pub priority: u8,
}

/// Phase of the interview approximated from the transcript length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Early,
    Middle,
    Late,
}

impl Tier {
    pub fn for_turn_count(turns: usize) -> Self {
        match turns {
            0..=2 => Tier::Early,
            3..=6 => Tier::Middle,
            _ => Tier::Late,
        }
    }

    /// Low but not lowest: ties with the tier's second entry and sorts after
    /// it, ahead of the tier's last entry.
    fn complexity_priority(self) -> u8 {
        *self.priorities().start() + 1
    }

    fn priorities(self) -> std::ops::RangeInclusive<u8> {
        match self {
            Tier::Early => 1..=3,
            Tier::Middle => 4..=6,
            Tier::Late => 7..=9,
        }
    }
}

struct CatalogEntry {
    id: &'static str,
    category: HintCategory,
    title: &'static str,
    body: &'static str,
    priority: u8,
}

impl CatalogEntry {
    fn to_hint(&self) -> Hint {
        Hint {
            id: self.id.to_string(),
            category: self.category,
            title: self.title.to_string(),
            body: self.body.to_string(),
            priority: self.priority,
        }
    }
}

const fn entry(
    id: &'static str,
    category: HintCategory,
    title: &'static str,
    body: &'static str,
    priority: u8,
) -> CatalogEntry {
    CatalogEntry {
        id,
        category,
        title,
        body,
        priority,
    }
}

use HintCategory::{Reminder, Suggestion, Tip, Warning};

static CODING_CATALOG: [CatalogEntry; 9] = [
    entry("coding-clarify", Tip, "Clarify the problem", "Restate the problem and ask about input size, value ranges and invalid input before you design anything.", 1),
    entry("coding-examples", Tip, "Work an example", "Walk through a small example by hand to confirm you understand what is expected.", 2),
    entry("coding-brute-force", Suggestion, "Start simple", "State a brute-force approach first, then look for the bottleneck you can improve.", 3),
    entry("coding-explain-plan", Suggestion, "Explain before coding", "Describe your algorithm and data structures out loud before writing code.", 4),
    entry("coding-edge-cases", Warning, "Edge cases", "Think about empty input, a single element, duplicates and very large values.", 5),
    entry("coding-think-aloud", Tip, "Think aloud", "Narrate what you are writing so the interviewer can follow your reasoning.", 6),
    entry("coding-test", Suggestion, "Test your code", "Trace your code with a normal case and an edge case before declaring it done.", 7),
    entry("coding-optimize", Suggestion, "Look for improvements", "Ask yourself whether time or memory can be reduced, and what the trade-off would be.", 8),
    entry("coding-wrap-up", Reminder, "Summarize", "Recap your approach, its complexity and any remaining limitations.", 9),
];

static SYSTEM_DESIGN_CATALOG: [CatalogEntry; 9] = [
    entry("design-requirements", Tip, "Gather requirements", "Pin down functional requirements and what is out of scope before drawing anything.", 1),
    entry("design-scale", Tip, "Estimate scale", "Estimate users, requests per second and storage so your design has numbers to target.", 2),
    entry("design-api", Suggestion, "Define the interface", "Sketch the main API calls or user flows the system must support.", 3),
    entry("design-high-level", Suggestion, "High-level design", "Lay out the main components and how data flows between them.", 4),
    entry("design-data-model", Suggestion, "Data model", "Choose a storage model and justify it against your access patterns.", 5),
    entry("design-tradeoffs", Warning, "Discuss trade-offs", "For each major choice, mention an alternative and why you did not pick it.", 6),
    entry("design-scaling", Suggestion, "Scale it out", "Identify bottlenecks and discuss caching, partitioning and replication.", 7),
    entry("design-failures", Warning, "Failure handling", "Explain what happens when a component fails and how the system recovers.", 8),
    entry("design-wrap-up", Reminder, "Summarize", "Recap the design, its key trade-offs and what you would build next.", 9),
];

static BEHAVIORAL_CATALOG: [CatalogEntry; 9] = [
    entry("behavioral-pick-example", Tip, "Pick one example", "Choose a single, specific situation rather than speaking in generalities.", 1),
    entry("behavioral-situation", Tip, "Set the scene", "Briefly describe the Situation and your Task before going into what you did.", 2),
    entry("behavioral-concise", Suggestion, "Keep context short", "Spend most of your time on your actions and results, not background.", 3),
    entry("behavioral-actions", Suggestion, "Focus on your actions", "Describe the concrete steps you took and why you chose them.", 4),
    entry("behavioral-i-not-we", Warning, "Say \"I\", not \"we\"", "Make your personal contribution clear, separate from the team's.", 5),
    entry("behavioral-specifics", Tip, "Add specifics", "Name the systems, people and timelines involved to make the story credible.", 6),
    entry("behavioral-results", Suggestion, "Quantify the result", "Share measurable outcomes such as time saved, revenue or error rates.", 7),
    entry("behavioral-reflection", Suggestion, "Reflect", "Explain what you learned and what you would do differently next time.", 8),
    entry("behavioral-wrap-up", Reminder, "Tie it back", "Connect the story to the role you are interviewing for.", 9),
];

fn catalog(kind: InterviewKind) -> &'static [CatalogEntry] {
    match kind {
        InterviewKind::Coding => &CODING_CATALOG,
        InterviewKind::SystemDesign => &SYSTEM_DESIGN_CATALOG,
        InterviewKind::Behavioral => &BEHAVIORAL_CATALOG,
    }
}

/// Everything a hint evaluation depends on.
#[derive(Debug, Clone)]
pub struct HintContext<'a> {
    pub kind: InterviewKind,
    pub transcript: &'a [Turn],
    pub elapsed_minutes: f64,
    pub total_minutes: f64,
    pub dismissed: &'a HashSet<String>,
    pub workspace_excerpt: Option<&'a str>,
    pub now: DateTime<Utc>,
}

fn time_hint(elapsed_minutes: f64, total_minutes: f64) -> Option<Hint> {
    if total_minutes <= 0.0 {
        return None;
    }
    let progress = elapsed_minutes / total_minutes;
    TIME_THRESHOLDS
        .iter()
        .find(|(threshold, _)| progress >= *threshold && progress < threshold + THRESHOLD_BAND)
        .map(|(threshold, id)| {
            let percent = (threshold * 100.0).round() as u32;
            let remaining = (total_minutes - elapsed_minutes).max(0.0).round() as u32;
            Hint {
                id: id.to_string(),
                category: if *threshold >= 0.75 { Warning } else { Reminder },
                title: format!("{percent}% of your time used"),
                body: format!(
                    "About {remaining} minutes remain. Check that you are on track to finish."
                ),
                priority: 0,
            }
        })
}

fn silence_hint(transcript: &[Turn], now: DateTime<Utc>) -> Option<Hint> {
    // Before the first candidate turn, silence is measured from the greeting.
    let last = transcript
        .iter()
        .rev()
        .find(|t| t.role == Role::Candidate)
        .or_else(|| transcript.first())?;
    if now - last.timestamp <= Duration::seconds(SILENCE_LIMIT_SECS) {
        return None;
    }
    Some(Hint {
        id: KEEP_TALKING_ID.to_string(),
        category: Tip,
        title: "Keep talking".to_string(),
        body: "Interviewers can only score what they hear. Share what you are thinking, even if you are unsure.".to_string(),
        priority: 0,
    })
}

fn mentions_complexity(transcript: &[Turn]) -> bool {
    transcript.iter().any(|turn| {
        let text = turn.text.to_lowercase();
        COMPLEXITY_KEYWORDS.iter().any(|k| text.contains(k))
    })
}

fn complexity_hint(tier: Tier) -> Hint {
    Hint {
        id: DISCUSS_COMPLEXITY_ID.to_string(),
        category: Suggestion,
        title: "Discuss complexity".to_string(),
        body: "You have code on the board but haven't talked about its time and space complexity yet.".to_string(),
        priority: tier.complexity_priority(),
    }
}

/// Returns at most [`MAX_HINTS`] hints, most urgent first.
pub fn evaluate(ctx: &HintContext<'_>) -> Vec<Hint> {
    let mut hints: Vec<Hint> = Vec::new();

    if let Some(hint) = silence_hint(ctx.transcript, ctx.now) {
        hints.push(hint);
    }
    if let Some(hint) = time_hint(ctx.elapsed_minutes, ctx.total_minutes) {
        hints.push(hint);
    }

    let tier = Tier::for_turn_count(ctx.transcript.len());
    let band = tier.priorities();
    hints.extend(
        catalog(ctx.kind)
            .iter()
            .filter(|e| band.contains(&e.priority))
            .map(CatalogEntry::to_hint),
    );

    if ctx.kind == InterviewKind::Coding
        && ctx.workspace_excerpt.is_some_and(is_substantive_text)
        && !mentions_complexity(ctx.transcript)
    {
        hints.push(complexity_hint(tier));
    }

    hints.retain(|h| !ctx.dismissed.contains(&h.id));
    // Stable: equal priorities keep insertion order.
    hints.sort_by_key(|h| h.priority);
    hints.truncate(MAX_HINTS);
    hints
}
