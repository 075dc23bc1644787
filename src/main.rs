use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::{error, info};

/// Convert a Q-network checkpoint into a frozen binary GraphDef.
#[derive(Parser, Debug)]
#[command(name = "ckpt2pb", version)]
struct Args {
    /// Checkpoint prefix (or directory holding a `checkpoint` file) to convert
    #[arg(long)]
    restore: PathBuf,

    /// Output .pb filename
    #[arg(long)]
    out: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("{:?}", args);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("conversion failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let report = qnet_freeze::convert(&args.restore, &args.out)?;
    let json = serde_json::to_string_pretty(&report).context("serializing conversion report")?;
    println!("{json}");
    Ok(())
}
