//! # Eruo command-line entry point
//!
//! ```text
//! main()
//!   │
//!   ├─> Initialize logging (console + rotating files)
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Load the app config
//!   └─> Run the command on a Tokio runtime
//! ```
//!
//! ```bash
//! eruo inspect data.csv
//! eruo eval data.csv "Total = SUM([Sales])"
//! eruo pipeline run spec.json data.csv -o out.parquet
//! ```

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use anyhow::Result;
use clap::Parser as _;

/// # Errors
///
/// Returns error if:
/// - logging cannot be set up
/// - the Tokio runtime fails to start
/// - the command fails
fn main() -> Result<()> {
    eruo::logging::init()?;

    let cli = cli::Cli::parse();
    let mut config = eruo::config::load_app_config();

    // Database commands are async; everything else simply runs inside the runtime
    tokio::runtime::Runtime::new()?.block_on(cli::run_command(cli.command, &mut config))
}
