use crate::cli::{Cli, Commands};
use chainstore::{Collection, WriteBatch};
use std::io::{self, IsTerminal, Read, Write};

/// Executes commands from the CLI against a [`Collection`].
///
/// Opens the collection (creating it for `set`/`del` when the data file
/// does not exist yet), delegates the operation, and prints results to
/// stdout. Missing keys and missing files exit with status 1 after a
/// message on stderr.
pub fn execute_command(cli: &Cli) {
    match &cli.command {
        Commands::Get { key } => {
            let collection = open_existing(cli);

            match collection.get(key.as_bytes()) {
                Ok(Some(value)) => {
                    let stdout = io::stdout();
                    let mut stdout_handle = stdout.lock();
                    stdout_handle.write_all(&value).unwrap();

                    // Ensure a newline at the end if it's a terminal
                    if io::stdout().is_terminal() {
                        stdout_handle.write_all(b"\n").unwrap();
                    }
                    stdout_handle.flush().unwrap();
                }
                Ok(None) => {
                    eprintln!("Error: Key '{}' not found", key);
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Set { key, value } => {
            let collection = open_or_create(cli);

            let value = match value {
                Some(value) => value.clone().into_bytes(),
                None => {
                    if io::stdin().is_terminal() {
                        eprintln!("Error: No value provided and stdin is not piped");
                        std::process::exit(1);
                    }
                    let mut buf = Vec::new();
                    io::stdin()
                        .read_to_end(&mut buf)
                        .expect("Failed to read value from stdin");
                    buf
                }
            };

            let mut batch = WriteBatch::new();
            batch.set(key.as_bytes(), value);
            match collection.update(&batch) {
                Ok(version) => println!("Committed '{}' at version {}", key, version),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Del { key } => {
            let collection = open_or_create(cli);

            let mut batch = WriteBatch::new();
            batch.delete(key.as_bytes());
            match collection.update(&batch) {
                Ok(version) => println!("Deleted '{}' at version {}", key, version),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Scan { from, to } => {
            let collection = open_existing(cli);

            let cursor = match from {
                Some(from) => collection.cursor_from(from.as_bytes()),
                None => collection.cursor(),
            }
            .unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(1);
            });

            let stdout = io::stdout();
            let mut stdout_handle = stdout.lock();
            for rec in cursor {
                let rec = rec.unwrap_or_else(|e| {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                });
                if let Some(to) = to
                    && rec.key() >= to.as_bytes()
                {
                    break;
                }
                writeln!(
                    stdout_handle,
                    "{}\t{}",
                    String::from_utf8_lossy(rec.key()),
                    String::from_utf8_lossy(rec.value())
                )
                .unwrap();
            }
        }

        Commands::Stats => {
            let collection = open_existing(cli);

            match collection.version() {
                Ok(version) => println!("Version: {}", version),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
            println!("{:#?}", collection.stats());
        }

        Commands::Destroy => {
            let collection = open_existing(cli);

            match collection.destroy() {
                Ok(()) => println!("Destroyed '{}'", cli.storage.display()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

fn open_existing(cli: &Cli) -> Collection {
    Collection::open(&cli.storage, cli.cache_capacity).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    })
}

fn open_or_create(cli: &Cli) -> Collection {
    let result = if cli.storage.is_file() {
        Collection::open(&cli.storage, cli.cache_capacity)
    } else {
        Collection::create(&cli.storage, cli.cache_capacity)
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    })
}
