use anyhow::Result;
use clap::Args;
use keel_client::ContractClient;
use serde_json::json;

use super::ConnArgs;

pub const CONNECTED: &str = "API Connected";
pub const DISCONNECTED: &str = "API Disconnected";
const START_HINT: &str = "Start keel-server on port 3000";

#[derive(Args, Clone, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub conn: ConnArgs,
    /// Emit JSON instead of a human summary
    #[arg(long)]
    pub json: bool,
}

/// Returns whether the API answered `hello.get` with a non-empty message.
pub async fn run_status(args: &StatusArgs) -> Result<bool> {
    let link = args.conn.link()?;
    let base = link.base().to_string();
    let client = ContractClient::new(link, keel_api::contract()?);
    let api = keel_api::api()?;

    let connected = match client.call(&api.hello.get, ()).await {
        Ok(hello) => !hello.message.is_empty(),
        Err(err) => {
            tracing::debug!("connectivity check failed: {err}");
            false
        }
    };

    if args.json {
        println!("{}", json!({ "base": base, "connected": connected }));
    } else if connected {
        println!("{CONNECTED}");
    } else {
        println!("{DISCONNECTED}");
        println!("{START_HINT}");
    }
    Ok(connected)
}

pub async fn run_hello(conn: &ConnArgs) -> Result<()> {
    let client = ContractClient::new(conn.link()?, keel_api::contract()?);
    let hello = client.call(&keel_api::api()?.hello.get, ()).await?;
    println!("{}", hello.message);
    Ok(())
}
