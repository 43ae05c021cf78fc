mod bootstrap;
mod cache;
mod commands;
mod config;
mod container;
mod jira;
mod logging;
mod proxy;
mod state;

use clap::Parser;
use color_eyre::Result;

use bootstrap::BootstrapOptions;
use commands::Command;

#[derive(Parser, Debug)]
#[command(name = "trackr")]
#[command(about = "A command-line Jira client with a persistent cache")]
#[command(version)]
struct Args {
  #[command(flatten)]
  bootstrap: BootstrapOptions,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let container = bootstrap::build(&args.bootstrap)?;
  let output = args.command.run(&container).await?;
  print!("{}", output);

  Ok(())
}
