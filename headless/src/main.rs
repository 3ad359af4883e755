use std::time::Duration;

use anyhow::{ensure, Context, Result};
use cardgame_client::selection::DECK_SIZE;
use cardgame_client::ClientConfig;
use cardgame_headless::{run, Options, Strategy};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Play one battle room from the command line.
#[derive(Parser, Debug)]
#[command(name = "cardgame-headless", version)]
struct Args {
    /// Socket base of the game server
    #[arg(long, env = "BATTLE_SERVER", default_value = "ws://127.0.0.1:8000")]
    server: String,

    /// Battle room id
    #[arg(long, env = "BATTLE_ROOM")]
    room: String,

    /// Name shown in the battle log for this player
    #[arg(long, env = "BATTLE_USERNAME", default_value = "headless")]
    username: String,

    /// Card to bring; pass exactly four times
    #[arg(long = "card", required = true)]
    cards: Vec<String>,

    #[arg(long, value_enum, default_value = "highest")]
    strategy: Strategy,

    /// How long a round result stays up before asking for the next cards
    #[arg(long)]
    round_delay_ms: Option<u64>,

    /// Reconnect attempts before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    ensure!(
        args.cards.len() == DECK_SIZE,
        "expected {} --card values, got {}",
        DECK_SIZE,
        args.cards.len()
    );

    let mut config = ClientConfig::default();
    if let Some(ms) = args.round_delay_ms {
        config.round_display_delay = Duration::from_millis(ms);
    }
    if let Some(n) = args.max_attempts {
        config.reconnect.max_attempts = n;
    }

    let summary = run(Options {
        server: args.server,
        room: args.room.clone(),
        username: args.username,
        cards: args.cards,
        strategy: args.strategy,
        config,
        jitter: true,
    })
    .await
    .with_context(|| format!("battle in room {} did not finish", args.room))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} {}-{} after {} rounds ({} reconnects)",
            summary.outcome.as_deref().unwrap_or("Unfinished"),
            summary.my_score,
            summary.their_score,
            summary.rounds,
            summary.reconnects
        );
    }
    Ok(())
}
