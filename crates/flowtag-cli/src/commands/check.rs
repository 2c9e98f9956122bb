use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use flowtag_core::lookup::LookupTable;

use super::ReferenceArgs;

#[derive(Args)]
pub struct CheckArgs {
    /// Lookup table CSV (dstport,protocol,tag)
    #[arg(short, long)]
    pub lookup: PathBuf,

    #[command(flatten)]
    pub reference: ReferenceArgs,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let protocols = args.reference.load()?;
    let lookup = LookupTable::from_path(&args.lookup, &protocols)
        .with_context(|| format!("failed to load lookup table {}", args.lookup.display()))?;

    println!(
        "  {} {} ({} protocol numbers)",
        console::style("reference").green().bold(),
        args.reference.describe(),
        protocols.len(),
    );
    println!(
        "  {} {} ({} entries)",
        console::style("lookup").green().bold(),
        args.lookup.display(),
        console::style(lookup.len()).green().bold(),
    );
    if lookup.overwritten() > 0 {
        println!(
            "  {} {} rows redefined an earlier port/protocol, the last row wins",
            console::style("warning:").yellow().bold(),
            lookup.overwritten(),
        );
    }

    Ok(())
}
