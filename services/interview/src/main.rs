use anyhow::{Context, Result};
use clap::Parser;
use interview_core::feedback::FeedbackStatus;
use interview_core::hints::REFRESH_INTERVAL_SECS;
use interview_core::{
    Difficulty, EngineError, Feedback, Hint, InterviewEngine, InterviewKind, SessionId, Workspace,
};
use interview_service::build_engine;
use interview_service::config::Config;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;

const FEEDBACK_POLL_INTERVAL: Duration = Duration::from_secs(2);
const FEEDBACK_POLL_ATTEMPTS: usize = 30;

#[derive(Parser)]
#[command(version, about = "Practice a mock interview in the terminal")]
struct Cli {
    /// Interview kind: coding, system_design or behavioral
    kind: InterviewKind,
    /// Scenario difficulty: easy, medium or hard
    #[arg(long, default_value = "medium")]
    difficulty: Difficulty,
    /// Use canned interviewer replies instead of a model provider
    #[arg(long)]
    offline: bool,
}

/// One line typed by the candidate.
#[derive(Debug, PartialEq)]
enum Input<'a> {
    Say(&'a str),
    Hints,
    Dismiss(&'a str),
    Code(&'a str),
    Submit,
    Quit,
    Help,
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "/hints" => Input::Hints,
        "/dismiss" => Input::Dismiss(arg.trim()),
        "/code" => Input::Code(arg.trim()),
        "/submit" => Input::Submit,
        "/quit" => Input::Quit,
        "/help" => Input::Help,
        _ => Input::Say(line),
    }
}

fn language_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("rs") => "rust",
        Some("py") => "python",
        Some("js") => "javascript",
        Some("ts") => "typescript",
        Some("go") => "go",
        Some("java") => "java",
        Some("cpp" | "cc" | "hpp") => "cpp",
        Some("c" | "h") => "c",
        _ => "text",
    }
}

fn print_help() {
    println!("Type to talk to the interviewer. Commands:");
    println!("  /hints          show coaching hints");
    println!("  /dismiss <id>   hide a hint for the rest of the session");
    println!("  /code <file>    share a file as your current code");
    println!("  /submit         finish and get feedback");
    println!("  /quit           leave without feedback");
}

fn print_hints(hints: &[Hint]) {
    if hints.is_empty() {
        println!("(no hints right now)");
    }
    for hint in hints {
        println!("  [{}] {}: {}", hint.id, hint.title, hint.body);
    }
}

fn print_feedback(feedback: &Feedback) {
    println!("\n=== Feedback ===");
    println!("Overall:         {}/10", feedback.overall_score);
    println!("Technical:       {}/10", feedback.technical_score);
    println!("Communication:   {}/10", feedback.communication_score);
    println!("Problem solving: {}/10", feedback.problem_solving_score);
    println!("\nStrengths:");
    for s in &feedback.strengths {
        println!("  + {s}");
    }
    println!("\nTo improve:");
    for s in &feedback.improvements {
        println!("  - {s}");
    }
    println!("\n{}", feedback.detailed_feedback);
}

async fn wait_for_feedback(engine: &InterviewEngine, session_id: SessionId) -> Result<()> {
    println!("Generating feedback...");
    for _ in 0..FEEDBACK_POLL_ATTEMPTS {
        if let FeedbackStatus::Ready(feedback) = engine.get_feedback(session_id).await? {
            print_feedback(&feedback);
            return Ok(());
        }
        tokio::time::sleep(FEEDBACK_POLL_INTERVAL).await;
    }

    // Background generation did not finish; try once inline.
    match engine.retry_feedback(session_id).await {
        Ok(_) => {
            if let FeedbackStatus::Ready(feedback) = engine.get_feedback(session_id).await? {
                print_feedback(&feedback);
            }
        }
        Err(e) if e.is_retryable() => {
            println!("Feedback is not available yet: {e}. Please try again later.");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Prints hints that have not been shown before.
async fn show_fresh_hints(
    engine: &InterviewEngine,
    session_id: SessionId,
    shown: &mut HashSet<String>,
) -> Result<()> {
    let fresh: Vec<Hint> = engine
        .current_hints(session_id)
        .await?
        .into_iter()
        .filter(|h| shown.insert(h.id.clone()))
        .collect();
    if !fresh.is_empty() {
        println!("Hints:");
        print_hints(&fresh);
    }
    Ok(())
}

/// Handles one line. Returns false when the session is over.
async fn handle_input(
    engine: &InterviewEngine,
    session_id: SessionId,
    input: Input<'_>,
    shown: &mut HashSet<String>,
) -> Result<bool> {
    match input {
        Input::Say("") => {}
        Input::Say(text) => match engine.send_turn(session_id, text).await {
            Ok(reply) => {
                println!("\nInterviewer: {reply}\n");
                show_fresh_hints(engine, session_id, shown).await?;
            }
            Err(EngineError::InvalidState { .. }) => {
                println!("Time is up. The interview has ended.");
                wait_for_feedback(engine, session_id).await?;
                return Ok(false);
            }
            Err(e) if e.is_retryable() => println!("{e}"),
            Err(e) => return Err(e.into()),
        },
        Input::Hints => print_hints(&engine.current_hints(session_id).await?),
        Input::Dismiss(id) => {
            engine.dismiss_hint(session_id, id).await?;
            println!("Dismissed hint '{id}'.");
        }
        Input::Code(path) => {
            let path = Path::new(path);
            let code = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let workspace = Workspace::Coding {
                language: language_for(path).to_string(),
                code,
            };
            match engine.update_workspace(session_id, workspace).await {
                Ok(()) => println!("Shared {} with the interviewer.", path.display()),
                Err(EngineError::Validation(msg)) => println!("{msg}"),
                Err(e) => return Err(e.into()),
            }
        }
        Input::Submit => {
            let transition = engine.complete_session(session_id).await?;
            if let Some(secs) = transition.duration_seconds {
                println!("Interview finished after {} min {} s.", secs / 60, secs % 60);
            }
            wait_for_feedback(engine, session_id).await?;
            return Ok(false);
        }
        Input::Quit => {
            engine.abandon_session(session_id).await?;
            println!("Interview abandoned. No feedback will be generated.");
            return Ok(false);
        }
        Input::Help => print_help(),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // --- 1. Load Configuration ---
    let config = if args.offline {
        dotenvy::dotenv().ok();
        Config::from_lookup(|key| match key {
            "LLM_PROVIDER" => Some("offline".to_string()),
            _ => std::env::var(key).ok(),
        })
    } else {
        Config::from_env()
    }
    .context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting interview service...");

    // --- 3. Start the session ---
    let engine = build_engine(&config)?;
    let started = engine.start_session(args.kind, args.difficulty).await?;
    let session_id = started.session_id;
    tracing::info!("Session id: {}", session_id);

    println!(
        "{} interview, {} minutes: {}",
        args.kind.label(),
        args.kind.duration_minutes(),
        started.scenario.title
    );
    print_help();
    println!("\nInterviewer: {}\n", started.greeting);

    // --- 4. Conversation loop ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(Duration::from_secs(REFRESH_INTERVAL_SECS));
    tick.tick().await;
    let mut shown: HashSet<String> = HashSet::new();
    show_fresh_hints(&engine, session_id, &mut shown).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    engine.abandon_session(session_id).await?;
                    break;
                };
                match handle_input(&engine, session_id, parse_input(&line), &mut shown).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => tracing::error!("Error handling input: {:?}", e),
                }
            }
            _ = tick.tick() => {
                if let Some(transition) = engine.expire_if_due(session_id).await? {
                    if transition.changed {
                        println!("\nTime is up. The interview has ended.");
                        wait_for_feedback(&engine, session_id).await?;
                        break;
                    }
                }
                show_fresh_hints(&engine, session_id, &mut shown).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down...");
                engine.abandon_session(session_id).await?;
                break;
            }
        }
    }
    tracing::info!("Shutting down...");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_commands() {
        assert_eq!(parse_input("/hints"), Input::Hints);
        assert_eq!(parse_input("/dismiss coding-clarify"), Input::Dismiss("coding-clarify"));
        assert_eq!(parse_input("  /code src/main.rs "), Input::Code("src/main.rs"));
        assert_eq!(parse_input("/submit"), Input::Submit);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("I would use a heap"), Input::Say("I would use a heap"));
    }

    #[test]
    fn test_language_for_extension() {
        assert_eq!(language_for(Path::new("a.py")), "python");
        assert_eq!(language_for(Path::new("lib.rs")), "rust");
        assert_eq!(language_for(Path::new("README")), "text");
    }
}
