use anyhow::Result;
use clap::Parser as ClapParser;

use cli::command::{Cli, Commands};
use cli::decode::cmd_decode;
use cli::resample::cmd_resample;

mod cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut env_builder = env_logger::Builder::from_default_env();
    env_builder.filter_level(cli.loglevel.to_level_filter());
    env_builder.format_timestamp_secs();
    env_builder.try_init()?;

    match cli.command {
        Commands::Decode(ref args) => cmd_decode(args, &cli)?,
        Commands::Resample(ref args) => cmd_resample(args, &cli)?,
    }

    Ok(())
}
