use anyhow::Result;
use clap::Args;

use super::ReferenceArgs;

#[derive(Args)]
pub struct ProtocolsArgs {
    #[command(flatten)]
    pub reference: ReferenceArgs,
}

pub fn run(args: ProtocolsArgs) -> Result<()> {
    let protocols = args.reference.load()?;
    println!("Number,Protocol");
    for (number, name) in protocols.iter() {
        println!("{number},{name}");
    }
    Ok(())
}
