use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use freightlink_core::ShipmentRecord;
use freightlink_engine::Orchestrator;
use freightlink_gateway::{GatewayConfig, HttpGateway};

#[derive(Debug, Parser)]
#[command(name = "freightlink")]
#[command(about = "One-shot batch reconciliation against the remote freight catalog")]
struct Args {
    /// JSON file containing an array of shipment records.
    #[arg(long)]
    input: PathBuf,
    /// Remote catalog GraphQL endpoint.
    #[arg(long)]
    endpoint: String,
    /// Auth profile UUID for the login exchange.
    #[arg(long)]
    auth_profile: String,
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
    /// Override the add-purchase-order action id.
    #[arg(long)]
    add_po_action: Option<String>,
    /// Override the update-purchase-order action id.
    #[arg(long)]
    update_po_action: Option<String>,
    /// Override the add-style-number action id.
    #[arg(long)]
    add_sn_action: Option<String>,
    /// Override the update-style-number action id.
    #[arg(long)]
    update_sn_action: Option<String>,
}

impl Args {
    /// Gateway configuration with any action-id overrides applied. Ids
    /// that were not overridden keep their deployment defaults.
    fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::new(
            self.endpoint.clone(),
            self.auth_profile.clone(),
            self.username.clone(),
            self.password.clone(),
        );
        if let Some(id) = self.add_po_action.clone() {
            config.actions.add_purchase_order = id;
        }
        if let Some(id) = self.update_po_action.clone() {
            config.actions.update_purchase_order = id;
        }
        if let Some(id) = self.add_sn_action.clone() {
            config.actions.add_style_number = id;
        }
        if let Some(id) = self.update_sn_action.clone() {
            config.actions.update_style_number = id;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only the JSON summary.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let records: Vec<ShipmentRecord> =
        serde_json::from_str(&raw).context("input is not a JSON array of shipment records")?;
    tracing::info!("loaded {} record(s) from {}", records.len(), args.input.display());

    let orchestrator = Orchestrator::new(HttpGateway::new(args.gateway_config())?);

    // Partial failures are part of the report; only input/flag errors are
    // fatal to the process.
    let report = orchestrator.process_batch(&records).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
