pub mod admin;
pub mod contract;
pub mod status;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use keel_client::Link;

pub use admin::AdminCmd;
pub use contract::ContractCmd;
pub use status::StatusArgs;

#[derive(Args, Clone, Debug)]
pub struct ConnArgs {
    /// Base URL of the API; defaults to NEXT_PUBLIC_API_URL, then http://localhost:3000
    #[arg(long)]
    pub base: Option<String>,
    /// Request timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
}

impl ConnArgs {
    pub fn link(&self) -> Result<Link> {
        let link = match self.base.as_deref() {
            Some(base) => Link::new(base),
            None => Link::from_env(),
        }
        .context("resolving API base URL")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout))
            .build()
            .context("building HTTP client")?;
        Ok(link.with_http_client(http))
    }
}
