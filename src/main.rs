use clap::Parser;

use archforge::actions::run;
use archforge::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run(&cli)
}
