use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read the value stored for a key
    Get {
        /// The key to read
        key: String,
    },

    /// Commit a value for a key
    Set {
        /// The key to write
        key: String,

        /// The value to store (optional; reads from stdin if not provided)
        value: Option<String>,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List live key-value pairs in ascending key order
    Scan {
        /// First key to include (inclusive)
        #[arg(long)]
        from: Option<String>,

        /// First key to exclude (scan stops here)
        #[arg(long)]
        to: Option<String>,
    },

    /// Print the current version and operational counters
    Stats,

    /// Delete the collection's data file and side-car files
    Destroy,
}
