mod cli;
mod preview;
mod run;

use anyhow::Result;

fn main() -> Result<()> {
    let args = cli::parse();
    run::run(args)
}
