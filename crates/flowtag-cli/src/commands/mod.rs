pub mod report;
pub mod check;
pub mod protocols;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use flowtag_core::protocol::{ProtocolRef, ReferenceLayout};

#[derive(Parser)]
#[command(
    name = "flowtag",
    about = "Tag flow log records and count port/protocol combinations",
    long_about = "flowtag - reads version 2 flow logs, tags each record by destination port\n\
                  and protocol through a lookup table, and reports counts per tag and per\n\
                  port/protocol combination.",
    version,
    propagate_version = true,
    styles = get_styles(),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tag a flow log and write the count report
    Report(report::ReportArgs),

    /// Validate the protocol reference and lookup table without a flow log
    Check(check::CheckArgs),

    /// List the protocol reference as number,name
    Protocols(protocols::ProtocolsArgs),
}

/// Where protocol numbers and names come from.
#[derive(Args)]
pub struct ReferenceArgs {
    /// Protocol reference CSV (defaults to the bundled IANA registry)
    #[arg(long)]
    pub protocols: Option<PathBuf>,

    /// The reference CSV is in IANA layout (Decimal,Keyword,...) instead of name,number
    #[arg(long, default_value_t = false)]
    pub iana_layout: bool,
}

impl ReferenceArgs {
    pub fn load(&self) -> Result<ProtocolRef> {
        match &self.protocols {
            Some(path) => {
                let layout = if self.iana_layout {
                    ReferenceLayout::Iana
                } else {
                    ReferenceLayout::NameFirst
                };
                ProtocolRef::from_path(path, layout)
                    .with_context(|| format!("failed to load protocol reference {}", path.display()))
            }
            None => ProtocolRef::iana().context("failed to load bundled protocol registry"),
        }
    }

    pub fn describe(&self) -> String {
        match &self.protocols {
            Some(path) => path.display().to_string(),
            None => "bundled IANA registry".to_string(),
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Report(args) => report::run(args),
        Commands::Check(args) => check::run(args),
        Commands::Protocols(args) => protocols::run(args),
    }
}

fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .header(
            clap::builder::styling::AnsiColor::BrightCyan
                .on_default()
                .bold(),
        )
        .usage(
            clap::builder::styling::AnsiColor::BrightCyan
                .on_default()
                .bold(),
        )
        .literal(
            clap::builder::styling::AnsiColor::BrightGreen
                .on_default()
                .bold(),
        )
        .placeholder(
            clap::builder::styling::AnsiColor::BrightWhite
                .on_default()
                .dimmed(),
        )
}
