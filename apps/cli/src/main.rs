//! pmem-usc CLI - Command line interface for unsafe shutdown handling.
//!
//! Thin front-end over pmem-usc-core: resolves the device backing a
//! directory and reads or injects the unsafe shutdown counter on the
//! DIMMs behind it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pmem_usc_core::UnsafeShutdown;

/// pmem-usc CLI tool.
#[derive(Parser)]
#[command(name = "pmem-usc-cli")]
#[command(about = "Read or inject the unsafe shutdown count of a persistent-memory device", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the summed unsafe shutdown count of the device backing DIR.
    Read {
        /// Directory on the persistent-memory filesystem.
        dir: PathBuf,
        /// Emit the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Inject an unsafe shutdown into every DIMM backing DIR.
    ///
    /// This permanently increments the hardware's recorded counter on
    /// each module and cannot be undone.
    Inject {
        /// Directory on the persistent-memory filesystem.
        dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> pmem_usc_core::Result<()> {
    let usc = UnsafeShutdown::new()?;

    match cli.command {
        Commands::Read { dir, json } => {
            let count = usc.read(&dir)?;
            if json {
                println!("{}", serde_json::json!({ "unsafe_shutdown_count": count }));
            } else {
                println!("{}", count);
            }
        }
        Commands::Inject { dir } => usc.inject(&dir)?,
    }

    Ok(())
}
