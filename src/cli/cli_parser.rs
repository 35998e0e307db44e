use crate::cli::{Commands, HELP_TEMPLATE};
use chainstore::DEFAULT_CACHE_CAPACITY;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
   // Obtain during build time, not runtime
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
#[command(
    after_help = HELP_TEMPLATE.replace("%BINARY_NAME%", env!("CARGO_PKG_NAME"))
)]
pub struct Cli {
    /// The collection's data file (side-car `.wal` and `.cache` files live
    /// next to it).
    #[arg(
        value_name = "storage",
        help = "Path to the collection data file. `set` and `del` create it if it does not exist."
    )]
    pub storage: PathBuf,

    /// Record cache capacity (entries held in memory to speed up searches).
    #[arg(
        long = "cache-capacity",
        value_name = "N",
        default_value_t = DEFAULT_CACHE_CAPACITY
    )]
    pub cache_capacity: usize,

    #[command(subcommand)]
    pub command: Commands,
}
