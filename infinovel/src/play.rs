//! Interactive play over stdin/stdout.
//!
//! A simple line-oriented protocol:
//! - During character creation, `str +2` / `int -1` / `agi +3` then `done`
//! - An empty line reveals the choices after reading a chapter
//! - A number or choice id picks a choice
//! - Lines starting with `#` are commands (save, load, quit, ...)
//!
//! Timed chapters tick once a second while waiting for input; when time runs
//! out the default choice is taken automatically.

use crate::render;
use infinovel_core::session::{ChapterPhase, LoadMode, SaveMode, SessionTick};
use infinovel_core::stats::Stat;
use infinovel_core::{ErrorKind, GameSession, SessionError};
use std::io::{self, Write};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

const TICK: Duration = Duration::from_secs(1);

enum Flow {
    Continue,
    Quit,
}

/// Run the story until the player quits or stdin closes.
pub async fn run(mut session: GameSession) -> Result<(), SessionError> {
    println!("=== Infinovel ===");
    println!("Type #help for commands.");
    println!();

    match session.load(LoadMode::Startup).await {
        Ok(true) => println!("[LOADED] Welcome back. Resuming your story."),
        Ok(false) => {}
        Err(e) => report(e)?,
    }
    show(&session);

    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("Error reading input: {e}");
                        break;
                    }
                };
                match handle_line(&mut session, line.trim(), &mut ticker).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => report(e)?,
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = on_tick(&mut session).await {
                    report(e)?;
                    show(&session);
                }
            }
        }
        io::stdout().flush().ok();
    }

    println!("Goodbye!");
    Ok(())
}

/// Print a recoverable error; give back the ones that end the program.
fn report(error: SessionError) -> Result<(), SessionError> {
    debug!(error = %error, kind = ?error.kind(), "session error");
    println!("[ERROR] {}", error.user_message());
    match error.kind() {
        ErrorKind::Fatal => Err(error),
        _ => Ok(()),
    }
}

/// Print whatever the player should be looking at in the current phase.
fn show(session: &GameSession) {
    match session.phase() {
        ChapterPhase::CreatingCharacter => print!("{}", render::allocation(session.allocation())),
        ChapterPhase::AwaitingProceed | ChapterPhase::Stalled => {
            print!("{}", render::chapter(session.chapter()))
        }
        ChapterPhase::Presenting | ChapterPhase::Countdown(_) => print!(
            "{}",
            render::choices(&session.choices(), session.countdown_remaining())
        ),
        ChapterPhase::Resolving => println!("[WRITING] The next chapter is being written..."),
    }
}

async fn on_tick(session: &mut GameSession) -> Result<(), SessionError> {
    match session.tick().await? {
        SessionTick::Idle => {}
        SessionTick::Counting { remaining } => {
            if remaining <= 5 || remaining % 10 == 0 {
                println!("[TIMER] {remaining}s");
            }
        }
        SessionTick::AutoChosen(outcome) => {
            print!("{}", render::outcome(&outcome));
            show(session);
        }
    }
    Ok(())
}

async fn handle_line(
    session: &mut GameSession,
    line: &str,
    ticker: &mut Interval,
) -> Result<Flow, SessionError> {
    if let Some(command) = line.strip_prefix('#') {
        return handle_command(session, command).await;
    }

    match session.phase() {
        ChapterPhase::CreatingCharacter => {
            if line.eq_ignore_ascii_case("done") {
                session.confirm_allocation()?;
                print!("{}", render::stats(session.stats()));
                show(session);
            } else if let Some((stat, delta)) = parse_adjustment(line) {
                if !session.adjust_allocation(stat, delta)? {
                    println!("[ERROR] Can't move {delta:+} points into {stat}.");
                }
                show(session);
            } else if !line.is_empty() {
                println!("[ERROR] Try `str +2`, `int -1`, `agi +3` or `done`.");
            }
        }
        ChapterPhase::AwaitingProceed => {
            if session.chapter().is_ending() {
                show(session);
            } else {
                session.proceed_to_choices()?;
                ticker.reset();
                show(session);
            }
        }
        ChapterPhase::Presenting | ChapterPhase::Countdown(_) => {
            if line.is_empty() {
                show(session);
                return Ok(Flow::Continue);
            }
            let choice_id = resolve_choice(session, line);
            println!("[WRITING] The next chapter is being written...");
            io::stdout().flush().ok();

            let outcome = session.choose(&choice_id).await?;
            print!("{}", render::outcome(&outcome));
            show(session);
        }
        ChapterPhase::Stalled | ChapterPhase::Resolving => show(session),
    }

    Ok(Flow::Continue)
}

async fn handle_command(session: &mut GameSession, command: &str) -> Result<Flow, SessionError> {
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "quit" | "exit" => return Ok(Flow::Quit),
        "save" => {
            session.save(SaveMode::Manual).await?;
            match session.quota_remaining() {
                Some((saves, _)) => println!("[SAVED] Progress saved ({saves} save(s) left)."),
                None => println!("[SAVED] Progress saved."),
            }
        }
        "load" => {
            session.load(LoadMode::Manual).await?;
            println!("[LOADED] Save restored.");
            show(session);
        }
        "restart" => {
            session.restart().await?;
            println!("[RESTARTED] A new story begins.");
            show(session);
        }
        "stats" => print!("{}", render::stats(session.stats())),
        "popular" => {
            let shares = session.choice_stats().await;
            print!("{}", render::popularity(&session.choices(), &shares));
        }
        "history" => print!("{}", render::history(session.history())),
        "feedback" => {
            session.submit_feedback(rest).await?;
            println!("[THANKS] Feedback sent.");
        }
        "help" => print!("{}", render::help()),
        _ => println!("[ERROR] Unknown command. Type #help for help."),
    }
    Ok(Flow::Continue)
}

/// Parse `str +2`, `intelligence -1` and the like.
fn parse_adjustment(line: &str) -> Option<(Stat, i32)> {
    let mut parts = line.split_whitespace();
    let word = parts.next()?.to_lowercase();
    let amount: i32 = parts.next()?.trim_start_matches('+').parse().ok()?;
    if parts.next().is_some() || word.len() < 3 {
        return None;
    }
    let stat = Stat::all().into_iter().find(|s| s.key().starts_with(&word))?;
    Some((stat, amount))
}

/// A 1-based number picks by position; anything else is taken as a choice id.
fn resolve_choice(session: &GameSession, input: &str) -> String {
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| session.chapter().choices.get(index))
        .map(|choice| choice.choice_id.clone())
        .unwrap_or_else(|| input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_adjustment() {
        assert_eq!(parse_adjustment("str +2"), Some((Stat::Strength, 2)));
        assert_eq!(parse_adjustment("INT -1"), Some((Stat::Intelligence, -1)));
        assert_eq!(parse_adjustment("agility 3"), Some((Stat::Agility, 3)));
        assert_eq!(parse_adjustment("st +1"), None);
        assert_eq!(parse_adjustment("str"), None);
        assert_eq!(parse_adjustment("str lots"), None);
        assert_eq!(parse_adjustment("str 1 2"), None);
    }

    #[tokio::test]
    async fn test_resolve_choice_by_number_or_id() {
        let harness = infinovel_core::TestHarness::new().await;
        assert_eq!(resolve_choice(&harness.session, "1"), "to_clock_tower");
        assert_eq!(resolve_choice(&harness.session, "3"), "research_grayson_background");
        assert_eq!(resolve_choice(&harness.session, "9"), "9");
        assert_eq!(resolve_choice(&harness.session, "0"), "0");
        assert_eq!(resolve_choice(&harness.session, "to_clock_tower"), "to_clock_tower");
    }
}
