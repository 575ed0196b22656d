//! rowstore CLI
//!
//! Command-line interface for inspecting and editing a key/value table file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rowstore::io::FileAccess;
use rowstore::{
    Config, Index, Liveness, Result, RowEntry, RowSchema, SlottedFile, SlottedTable, StoreError,
};
use tracing_subscriber::{fmt, EnvFilter};

/// rowstore CLI
#[derive(Parser, Debug)]
#[command(name = "rowstore-cli")]
#[command(about = "CLI for rowstore key/value table files")]
#[command(version)]
struct Args {
    /// Table file
    #[arg(short, long, default_value = "./rowstore.tbl")]
    file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty table, replacing any existing file
    Create {
        /// Key column width in bytes
        #[arg(short, long, default_value = "16")]
        key_width: usize,

        /// Value column width in bytes
        #[arg(short, long, default_value = "64")]
        value_width: usize,

        /// Mark deleted slots in the payload instead of the overhead byte
        #[arg(long)]
        legacy: bool,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Print rows in key order
    Dump {
        /// Walk keys in descending order
        #[arg(long)]
        desc: bool,

        /// First key to print
        #[arg(long)]
        start: Option<String>,
    },

    /// Print slot and row counts
    Stats,

    /// Check the free list and the key index
    Verify,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rowstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Create {
            key_width,
            value_width,
            legacy,
        } => {
            let schema = Arc::new(RowSchema::key_value(key_width, value_width)?);
            let liveness = if legacy {
                Liveness::Legacy
            } else {
                Liveness::Tombstone
            };
            let config = Config::builder().liveness(liveness).build();
            let table = SlottedTable::create(&args.file, schema, &config)?;
            table.close()?;
            println!(
                "created {} (key {} bytes, value {} bytes)",
                args.file.display(),
                key_width,
                value_width
            );
        }

        Commands::Get { key } => {
            let table = open_table(&args.file)?;
            match table.get(key.as_bytes())? {
                Some(row) => println!("{}", row.col_string(1)),
                None => println!("(nil)"),
            }
        }

        Commands::Put { key, value } => {
            let table = open_table(&args.file)?;
            let row = RowEntry::from_columns(
                Arc::clone(table.schema()),
                &[key.as_bytes(), value.as_bytes()],
            )?;
            match table.put(row)? {
                Some(old) => println!("updated (was {})", old.col_string(1)),
                None => println!("inserted"),
            }
            table.close()?;
        }

        Commands::Del { key } => {
            let table = open_table(&args.file)?;
            match table.remove(key.as_bytes())? {
                Some(_) => println!("deleted"),
                None => println!("(nil)"),
            }
            table.close()?;
        }

        Commands::Dump { desc, start } => {
            let table = open_table(&args.file)?;
            let start = start.as_ref().map(|s| s.as_bytes());
            for row in table.rows(!desc, start)? {
                let row = row?;
                println!("{}\t{}", row.col_string(0), row.col_string(1));
            }
        }

        Commands::Stats => {
            let table = open_table(&args.file)?;
            let file = table.file();
            println!("rows:      {}", table.size());
            println!("slots:     {}", file.all_count());
            println!("used:      {}", file.size());
            println!("free:      {}", file.free());
            println!("slot size: {}", file.layout().slot_size());
            println!("liveness:  {:?}", file.liveness());
        }

        Commands::Verify => {
            let table = open_table(&args.file)?;
            table.verify()?;
            println!("ok ({} rows)", table.size());
        }
    }
    Ok(())
}

/// Open a table, taking its schema from the file header
fn open_table(path: &Path) -> Result<SlottedTable> {
    let widths = SlottedFile::<FileAccess>::column_widths(path)?;
    let [key_width, value_width] = widths[..] else {
        return Err(StoreError::SchemaMismatch(format!(
            "{} has {} columns, expected a key/value table",
            path.display(),
            widths.len()
        )));
    };
    let schema = Arc::new(RowSchema::key_value(key_width, value_width)?);
    SlottedTable::open(path, schema, &Config::default())
}
