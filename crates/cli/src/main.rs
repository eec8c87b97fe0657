use clap::{Parser, Subcommand};
use fleischchan_core::config::{staging_dir_from_env_value, storage_dir_from_env_value};
use fleischchan_core::constants::{STAGING_DIR_ENV, STORAGE_DIR_ENV};
use fleischchan_core::{ContentKey, CoreConfig, StorageScope};
use fleischchan_files::{DigestWriter, FilesService};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fleischchan")]
#[command(about = "Fleischchan content-addressed file store CLI")]
struct Cli {
    /// Storage root (defaults to FLEISCHCHAN_STORAGE_DIR, then "storage")
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the content key of a file without storing it
    Key {
        /// File to hash
        path: PathBuf,
    },
    /// Store a file and print its content key
    Store {
        /// File to store
        path: PathBuf,
        /// Storage scope
        #[arg(long, default_value = "images")]
        scope: StorageScope,
        /// Original filename to record (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Write the stored bytes of a content key to a file or stdout
    Open {
        /// Content key, e.g. SHA-256$...
        key: String,
        /// Storage scope
        #[arg(long, default_value = "images")]
        scope: StorageScope,
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List storage scopes and their directories
    Scopes,
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let storage_dir = cli
        .storage_dir
        .unwrap_or_else(|| storage_dir_from_env_value(std::env::var(STORAGE_DIR_ENV).ok()));
    let staging_dir = staging_dir_from_env_value(std::env::var(STAGING_DIR_ENV).ok());
    let cfg = CoreConfig::new(storage_dir, staging_dir)?;

    match cli.command {
        Some(Commands::Key { path }) => {
            let name = file_name_of(&path);
            let staged = DigestWriter::new(cfg.staging_dir())
                .write(name.as_deref(), File::open(&path)?)?;
            println!("{}", staged.content_key);
        }
        Some(Commands::Store { path, scope, name }) => {
            let service = FilesService::with_staging_dir(cfg.storage_dir(), cfg.staging_dir())?;
            let name = name.or_else(|| file_name_of(&path));
            let receipt = service.store(scope, name.as_deref(), File::open(&path)?)?;
            println!("Key: {}", receipt.content_key);
            println!("Size: {} bytes", receipt.size_bytes);
            println!("Path: {}", receipt.stored_file().path.display());
            if receipt.outcome.is_deduplicated() {
                println!("Content was already stored; nothing written.");
            }
        }
        Some(Commands::Open { key, scope, output }) => {
            let key = ContentKey::parse(&key)?;
            let service = FilesService::with_staging_dir(cfg.storage_dir(), cfg.staging_dir())?;
            let mut file = service.open(scope, &key)?;
            match output {
                Some(output) => {
                    let written = io::copy(&mut file, &mut File::create(&output)?)?;
                    println!("Wrote {} bytes to {}", written, output.display());
                }
                None => {
                    io::copy(&mut file, &mut io::stdout().lock())?;
                }
            }
        }
        Some(Commands::Scopes) => {
            for scope in StorageScope::ALL {
                println!("{}: {}", scope, cfg.scope_dir(scope).display());
            }
        }
        None => {
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
