use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};

#[derive(Subcommand, Clone, Debug)]
pub enum ContractCmd {
    /// Write the API contract as OpenAPI 3.1 or as a plain operation manifest
    Export(ExportArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Openapi,
    Manifest,
}

#[derive(Args, Clone, Debug)]
pub struct ExportArgs {
    #[arg(long, value_enum, default_value_t = ExportFormat::Openapi)]
    pub format: ExportFormat,
    /// Output path; prints to stdout when omitted
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn execute(cmd: ContractCmd) -> Result<()> {
    match cmd {
        ContractCmd::Export(args) => cmd_export(&args),
    }
}

fn cmd_export(args: &ExportArgs) -> Result<()> {
    let contract = keel_api::contract()?;
    let doc = match args.format {
        ExportFormat::Openapi => serde_json::to_value(keel_contract::openapi::document(
            &contract,
            keel_api::TITLE,
            env!("CARGO_PKG_VERSION"),
        )?)?,
        ExportFormat::Manifest => contract.manifest(),
    };
    let text = serde_json::to_string_pretty(&doc)?;
    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::write(path, format!("{text}\n"))
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}
