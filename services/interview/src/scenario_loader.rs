//! Loads extra interview scenarios from a directory of Markdown files.
//!
//! Each `.md` file holds a header of `key: value` lines, a `---` line, then
//! the scenario prompt. The file stem becomes the scenario id.
//!
//! ```text
//! kind: coding
//! difficulty: medium
//! title: Merge Intervals
//! description: Merge overlapping ranges.
//! ---
//! Given a list of intervals, merge all overlapping ones...
//! ```

use anyhow::{Context, Result};
use interview_core::{Difficulty, InterviewKind, Scenario};
use std::fs;
use std::path::Path;

pub fn load_scenarios(dir_path: &Path) -> Result<Vec<Scenario>> {
    let mut scenarios = Vec::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read scenario directory: {}", dir_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem for scenario file")?
                .to_string();

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;

            let scenario = parse_scenario(&id, &content)
                .with_context(|| format!("Invalid scenario file: {}", path.display()))?;
            scenarios.push(scenario);
        }
    }

    scenarios.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(scenarios)
}

pub fn parse_scenario(id: &str, content: &str) -> Result<Scenario> {
    let (header, body) = content
        .split_once("\n---")
        .context("Missing '---' line between header and prompt")?;

    let mut kind = None;
    let mut difficulty = None;
    let mut title = None;
    let mut description = String::new();

    for line in header.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (key, value) = line
            .split_once(':')
            .with_context(|| format!("Header line is not 'key: value': {line}"))?;
        let value = value.trim();
        match key.trim().to_lowercase().as_str() {
            "kind" => kind = Some(value.parse::<InterviewKind>()?),
            "difficulty" => difficulty = Some(value.parse::<Difficulty>()?),
            "title" => title = Some(value.to_string()),
            "description" => description = value.to_string(),
            other => tracing::warn!("Ignoring unknown scenario header '{}' in {}", other, id),
        }
    }

    // Drop the remainder of the separator line.
    let prompt = body
        .split_once('\n')
        .map(|(_, rest)| rest)
        .unwrap_or("")
        .trim()
        .to_string();
    if prompt.is_empty() {
        anyhow::bail!("Scenario prompt is empty");
    }

    Ok(Scenario {
        id: id.to_string(),
        kind: kind.context("Missing 'kind' header")?,
        difficulty: difficulty.unwrap_or(Difficulty::Medium),
        title: title.context("Missing 'title' header")?,
        description,
        prompt,
    })
}
