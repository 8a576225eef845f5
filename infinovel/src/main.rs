//! Infinovel: AI-written interactive fiction in the terminal.
//!
//! Reads configuration from the environment (or a `.env` file), then plays the
//! story over a line-oriented stdin/stdout protocol.
//!
//! # Auto Mode
//!
//! Run with `--auto N` to let the first available choice be picked for up to
//! `N` chapters and print the transcript:
//!
//! ```bash
//! cargo run -p infinovel -- --auto 5 --signed-out
//! ```

mod play;
mod render;

use infinovel_core::{
    ClaudeNarrator, Config, FileStore, GameSession, HeadlessConfig, HeadlessGame, Identity,
    Services,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command line options.
#[derive(Debug, Default)]
struct Args {
    help: bool,
    auto_steps: Option<usize>,
    signed_out: bool,
    user: Option<String>,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => parsed.help = true,
            "--signed-out" => parsed.signed_out = true,
            "--auto" => {
                let value = args.get(i + 1).ok_or("--auto needs a chapter count")?;
                let steps = value
                    .parse()
                    .map_err(|_| format!("Invalid chapter count: {value}"))?;
                parsed.auto_steps = Some(steps);
                i += 1;
            }
            "--user" => {
                let value = args.get(i + 1).ok_or("--user needs an id")?;
                parsed.user = Some(value.clone());
                i += 1;
            }
            other => return Err(format!("Unknown option: {other}")),
        }
        i += 1;
    }

    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "infinovel=info,infinovel_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let raw: Vec<String> = std::env::args().collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!("Run with --help for usage.");
            std::process::exit(2);
        }
    };

    if args.help {
        print_help();
        return Ok(());
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Please set it in .env file or with: export ANTHROPIC_API_KEY=your_key_here");
            std::process::exit(1);
        }
    };

    let client = claude::Claude::new(&config.api_key)?;
    let narrator = ClaudeNarrator::new(client, config.narrator_config());
    let store = FileStore::new(&config.data_dir);
    let services = Services::from_config(&config, Arc::new(store), Arc::new(narrator));

    let identity = if args.signed_out {
        None
    } else {
        let uid = args
            .user
            .or_else(|| config.user.clone())
            .unwrap_or_else(|| format!("guest-{}", uuid::Uuid::new_v4()));
        Some(Identity::anonymous(uid))
    };
    info!(
        app_id = %config.app_id,
        signed_in = identity.is_some(),
        data_dir = %config.data_dir.display(),
        "starting"
    );

    if let Some(steps) = args.auto_steps {
        let mut headless = HeadlessConfig::quick_start();
        if let Some(identity) = identity {
            headless = headless.with_identity(identity);
        }
        let mut game = HeadlessGame::new(headless, services).await?;
        let taken = game.auto_play(steps).await?;
        print!("{}", game.render_transcript());
        println!("[DONE] {taken} chapter(s) played");
        return Ok(());
    }

    let session = GameSession::new(services, identity).await;
    play::run(session).await?;
    Ok(())
}

fn print_help() {
    println!("Infinovel - AI-written interactive fiction");
    println!();
    println!("USAGE:");
    println!("  infinovel [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help        Show this help message");
    println!("  --auto <N>        Play up to N chapters automatically and print the transcript");
    println!("  --user <ID>       Play as this reader id (default: INFINOVEL_USER or a new guest)");
    println!("  --signed-out      Play without an identity (nothing is saved)");
    println!();
    println!("ENVIRONMENT:");
    println!("  ANTHROPIC_API_KEY       Required");
    println!("  INFINOVEL_MODEL         Model override");
    println!("  INFINOVEL_DATA_DIR      Where chapters and saves are kept");
    println!("  RUST_LOG                Log filter (logs go to stderr)");
    println!();
    println!("EXAMPLES:");
    println!("  infinovel                      # Interactive play");
    println!("  infinovel --user alice         # Resume alice's story");
    println!("  infinovel --auto 5 --signed-out");
}
