use clap::{Parser, Subcommand};
use std::path::PathBuf;

use torsion_drive::config::ServerConfig;
use torsion_drive::{db, pdb_format, serve, EXPECTED_DB_VERSION};

type DynError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cut protein backbone segments and drive their torsion angles")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API over HTTP
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Check that a PDB file has the column layout the tool expects
    CheckPdb {
        /// Structure file to check
        file: PathBuf,
    },
    /// Create the database and its schema without starting the server
    InitDb {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), DynError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Command::Serve { config } => serve::serve(ServerConfig::load(&config)?),
        Command::CheckPdb { file } => check_pdb(file),
        Command::InitDb { config } => init_db(ServerConfig::load(&config)?),
    }
}

fn check_pdb(file: PathBuf) -> Result<(), DynError> {
    let text = std::fs::read_to_string(&file)
        .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;

    if !pdb_format::is_valid_structure(&text) {
        return Err(format!("{}: malformed ATOM records or no atoms", file.display()).into());
    }

    println!("{}: OK", file.display());
    if let Some(name) = pdb_format::title_name(&text) {
        println!("Title: {}", name);
    }
    Ok(())
}

fn init_db(config: ServerConfig) -> Result<(), DynError> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let pool = db::prepare_database(&config.database_path).await?;
        pool.close().await;
        println!(
            "Database ready at {} (schema version {})",
            config.database_path.display(),
            EXPECTED_DB_VERSION
        );
        Ok::<(), DynError>(())
    })
}
