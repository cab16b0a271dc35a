mod commands;
mod notify;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use raillink_gateway::app_config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "Usage: raillink-app <command>

Commands:
  search <from> <to> <date> <passengers>    Search trains for a travel date (YYYY-MM-DD)
  track <train-id | pnr>                    Follow a train's live position
  alerts                                    Show alert subscriptions and history
  subscribe <pnr> <phone | email> [kind..]  Subscribe a PNR to alerts
  unsubscribe <subscription-id>             Remove an alert subscription
";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "raillink_app=debug,raillink_flow=debug,raillink_gateway=debug,raillink_tracking=debug,raillink_core=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("search") if args.len() == 5 => {
            let date = NaiveDate::parse_from_str(&args[3], "%Y-%m-%d")
                .context("The travel date must be YYYY-MM-DD")?;
            let passengers: u32 = args[4]
                .parse()
                .context("The passenger count must be a number")?;
            commands::search(&config, &args[1], &args[2], date, passengers).await
        }
        Some("track") if args.len() == 2 => commands::track(&config, &args[1]).await,
        Some("alerts") if args.len() == 1 => commands::alerts(&config).await,
        Some("subscribe") if args.len() >= 3 => {
            commands::subscribe(&config, &args[1], &args[2], &args[3..]).await
        }
        Some("unsubscribe") if args.len() == 2 => commands::unsubscribe(&config, &args[1]).await,
        _ => {
            eprint!("{}", USAGE);
            std::process::exit(2);
        }
    }
}
