//! Stock Market Terminal CLI
//!
//! Small front end over the backend client: resolves companies, fetches
//! series and predictions, triggers training and follows live updates.

use anyhow::{bail, Context};
use serde::Serialize;
use serde_json::json;
use terminal_backend::{BackendConfig, ChannelVariant, LiveChannel, LiveChannelConfig, MarketDataClient};
use terminal_core::Symbol;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_TIMEFRAME: &str = "1d";

const USAGE: &str = "\
Usage: terminal-cli <command>

Commands:
  live <company> [timeframe]      Price series and summary (default timeframe 1d)
  predict <company> [timeframe]   Price series with the model forecast
  train <company>                 Retrain the model for a company
  stocks                          List known stocks
  watch <symbol> [--handshake]    Print live updates until Ctrl-C";

#[derive(Debug, PartialEq)]
enum Command {
    Live { company: String, timeframe: String },
    Predict { company: String, timeframe: String },
    Train { company: String },
    Stocks,
    Watch { symbol: Symbol, variant: ChannelVariant },
}

impl Command {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut args = args.iter().map(String::as_str);
        let Some(command) = args.next() else {
            bail!("missing command\n\n{}", USAGE);
        };

        let command = match command {
            "live" | "predict" => {
                let company = args.next().context("missing <company>")?.to_string();
                let timeframe = args.next().unwrap_or(DEFAULT_TIMEFRAME).to_string();
                if command == "live" {
                    Command::Live { company, timeframe }
                } else {
                    Command::Predict { company, timeframe }
                }
            }
            "train" => Command::Train {
                company: args.next().context("missing <company>")?.to_string(),
            },
            "stocks" => Command::Stocks,
            "watch" => {
                let raw = args.next().context("missing <symbol>")?;
                let symbol = Symbol::new(raw).context("symbol must not be blank")?;
                let variant = match args.next() {
                    Some("--handshake") => ChannelVariant::Handshake,
                    Some(other) => bail!("unknown option '{}'", other),
                    None => ChannelVariant::Enveloped,
                };
                Command::Watch { symbol, variant }
            }
            other => bail!("unknown command '{}'\n\n{}", other, USAGE),
        };

        if let Some(extra) = args.next() {
            bail!("unexpected argument '{}'", extra);
        }
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,terminal_backend=debug")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = BackendConfig::from_env()?;
    info!("Using backend at {}", config.api_base_url);

    match command {
        Command::Live { company, timeframe } => {
            let client = MarketDataClient::new(config)?;
            let result = client.get_live_data(&company, &timeframe).await;
            let summary = result.summary();
            print_json(&json!({ "result": result, "summary": summary }))?;
        }
        Command::Predict { company, timeframe } => {
            let client = MarketDataClient::new(config)?;
            let result = client.get_prediction(&company, &timeframe).await;
            let summary = result.summary();
            print_json(&json!({ "result": result, "summary": summary }))?;
        }
        Command::Train { company } => {
            let client = MarketDataClient::new(config)?;
            print_json(&client.trigger_training(&company).await)?;
        }
        Command::Stocks => {
            let client = MarketDataClient::new(config)?;
            print_json(&client.get_stocks().await)?;
        }
        Command::Watch { symbol, variant } => {
            let channel = LiveChannel::new(LiveChannelConfig::new(&config, variant));
            channel
                .subscribe(symbol, |update| match serde_json::to_string(&update) {
                    Ok(line) => println!("{}", line),
                    Err(e) => eprintln!("Unprintable update: {}", e),
                })
                .await?;

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            info!("Shutting down");
            channel.unsubscribe().await;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
