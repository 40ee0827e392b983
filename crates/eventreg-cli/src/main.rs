//! eventreg - register a team for a competition from the terminal.
//!
//! Usage:
//!
//! - `eventreg` runs the registration wizard interactively
//! - `eventreg --list` lists events and their module prices
//! - `eventreg --status <event_id> <team_name>` shows a team's payment status

mod interactive;

use std::io;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use eventreg_core::models::{open_for_registration, IdentifierKind};
use eventreg_core::{ApiClient, Config};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=eventreg_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = load_config();
    let client = ApiClient::from_config(&config)?;
    info!(base_url = %client.base_url(), "eventreg starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("--list") => list_events(&client).await,
        Some("--status") => {
            let (Some(event_id), Some(team_name)) = (args.get(1), args.get(2)) else {
                anyhow::bail!("Usage: eventreg --status <event_id> <team_name>");
            };
            show_status(&client, event_id, team_name).await
        }
        Some(other) => anyhow::bail!("Unknown argument: {}", other),
        None => interactive::run(client, &config).await,
    }
}

/// Print every event with its schedule and module prices
async fn list_events(client: &ApiClient) -> Result<()> {
    let events = client.fetch_events().await?;
    if events.is_empty() {
        println!("No events found.");
        return Ok(());
    }

    let open = open_for_registration(&events);
    for event in &events {
        let marker = if open.iter().any(|e| e.id == event.id) { "open" } else { "closed" };
        println!("{}  {} [{}]", event.id, event.title, marker);
        println!("    {} - {}", event.schedule_display(), event.location);
        for line in event.module_price_lines() {
            println!("    * {}", line);
        }
    }
    Ok(())
}

async fn show_status(client: &ApiClient, event_id: &str, team_name: &str) -> Result<()> {
    let status = client
        .fetch_payment_status(event_id, team_name, IdentifierKind::TeamName)
        .await
        .with_context(|| format!("No payment found for team '{}'", team_name))?;

    println!("Team:        {}", status.team_name.as_deref().unwrap_or(team_name));
    println!("Status:      {}", status.payment_status);
    println!("Transaction: {}", status.transaction_id.as_deref().unwrap_or("-"));
    println!("Submitted:   {}", status.submitted_display());
    if !status.modules.is_empty() {
        let modules: Vec<&str> = status.modules.iter().map(|m| m.as_str()).collect();
        println!("Modules:     {}", modules.join(", "));
    }
    if let Some(url) = status.receipt_url.as_deref() {
        println!("Receipt:     {}", url);
    }
    Ok(())
}
