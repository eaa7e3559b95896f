mod command_line;
mod contracts;
mod deploy;
mod utils;

use std::process;

use anyhow::Result;
use clap::Parser;
use command_line::CommandLine;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cmd = match CommandLine::try_parse() {
        Ok(cmd) => cmd,
        // help and version go to stdout with status 0
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            e.print()?;
            process::exit(1);
        }
    };
    cmd.execute().await
}
