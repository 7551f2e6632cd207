//! NDI document store CLI.
//!
//! Provides the `ndi` binary for inspecting and editing a session's document
//! database. The database is chosen the same way library callers choose it:
//! `DatabaseConfig::from_env()` (NDI_DB_PATH, NDI_SESSION_REF,
//! NDI_BACKEND_ORDER), with `--db`, `--backend` and `--session` taking
//! precedence, then `open_database` picks or creates a backend.
//!
//! Results are printed as JSON on stdout; diagnostics and logs go to stderr.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::{debug, Level};

use ndi_core::{CoreError, Document, DocumentId, Query};
use ndi_storage::{
    find_antecedents, find_dependents, find_missing_dependencies, open_database, BackendKind,
    Database, DatabaseConfig, StorageError,
};

/// NDI document store tools.
#[derive(Parser)]
#[command(name = "ndi", about = "NDI document store tools")]
struct Cli {
    /// Session directory holding `ndi_database/` (default: $NDI_DB_PATH or .).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Backend priority list, e.g. `sqlite,directory`.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Session reference recorded by the backend.
    #[arg(long, global = true)]
    session: Option<String>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Add a document from a JSON file.
    Add {
        /// Path to the document JSON.
        file: PathBuf,

        /// Overwrite an existing document with the same id.
        #[arg(long)]
        update: bool,
    },
    /// Print a document.
    Read { id: String },
    /// Remove documents and their ingested files.
    Rm {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// List every document id.
    Ls,
    /// Search with a JSON query, e.g. `{"field":"base.name","operation":"exact_string","param1":"x"}`.
    Search { query: String },
    /// List documents of a class, including subclasses.
    Isa { class: String },
    /// List documents that transitively depend on a document.
    Dependents { id: String },
    /// List documents a document transitively depends on.
    Antecedents { id: String },
    /// Report dependencies whose target document is not stored.
    MissingDeps {
        /// Only audit these dependency names.
        names: Vec<String>,
    },
    /// Write an ingested file to stdout.
    Cat { id: String, filename: String },
    /// Report whether an ingested file exists and where.
    Exists { id: String, filename: String },
}

/// Exit codes: 0 = success, 1 = usage error or not found, 3 = storage error.
const EXIT_USAGE: i32 = 1;
const EXIT_STORAGE: i32 = 3;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code(&e)
        }
    };
    process::exit(code);
}

fn exit_code(e: &StorageError) -> i32 {
    match e {
        StorageError::NotFound { .. } | StorageError::Conflict { .. } | StorageError::Core(_) => {
            EXIT_USAGE
        }
        _ => EXIT_STORAGE,
    }
}

/// Builds the configuration: environment first, flags on top.
fn config(cli: &Cli) -> Result<DatabaseConfig, StorageError> {
    let mut config = DatabaseConfig::from_env()?;
    if let Some(path) = &cli.db {
        config.path = path.clone();
    }
    if let Some(list) = &cli.backend {
        config.backend_order = BackendKind::parse_list(list)?;
    }
    if let Some(session) = &cli.session {
        config.session_reference = session.clone();
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<(), StorageError> {
    let config = config(&cli)?;
    let mut db = open_database(&config)?;
    debug!(backend = %db.kind(), path = %config.path.display(), "database opened");

    match cli.command {
        Commands::Add { file, update } => {
            let text = fs::read_to_string(&file).map_err(|e| StorageError::io(&file, e))?;
            let mut doc = Document::from_json(&text)?;
            db.add(&mut doc, update)?;
            print_json(&serde_json::json!({ "id": doc.id() }));
        }
        Commands::Read { id } => {
            let doc = db.read_required(&parse_id(&id)?)?;
            print_json(&doc.to_value());
        }
        Commands::Rm { ids } => {
            let ids = ids.iter().map(|s| parse_id(s)).collect::<Result<Vec<_>, _>>()?;
            db.remove_many(&ids)?;
            print_json(&serde_json::json!({ "removed": ids }));
        }
        Commands::Ls => {
            print_json(&db.all_doc_ids()?);
        }
        Commands::Search { query } => {
            let query: Query = serde_json::from_str(&query).map_err(|e| CoreError::InvalidArgument {
                reason: format!("malformed query: {}", e),
            })?;
            query.validate()?;
            print_documents(&db.search(&query)?);
        }
        Commands::Isa { class } => {
            print_documents(&db.search(&Query::isa(&class))?);
        }
        Commands::Dependents { id } => {
            print_documents(&find_dependents(&*db, &[parse_id(&id)?])?);
        }
        Commands::Antecedents { id } => {
            print_documents(&find_antecedents(&*db, &[parse_id(&id)?])?);
        }
        Commands::MissingDeps { names } => {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            print_json(&find_missing_dependencies(&*db, &names)?);
        }
        Commands::Cat { id, filename } => {
            let mut handle = db.open_binary(&parse_id(&id)?, &filename)?;
            let path = handle.path().to_path_buf();
            let mut stdout = io::stdout().lock();
            io::copy(&mut handle, &mut stdout).map_err(|e| StorageError::io(&path, e))?;
            stdout.flush().map_err(|e| StorageError::io(&path, e))?;
            db.close_binary(handle)?;
        }
        Commands::Exists { id, filename } => {
            let (exists, path) = db.exists_binary(&parse_id(&id)?, &filename)?;
            print_json(&serde_json::json!({ "exists": exists, "path": path }));
        }
    }
    Ok(())
}

fn parse_id(s: &str) -> Result<DocumentId, StorageError> {
    Ok(DocumentId::parse(s.trim())?)
}

fn print_documents(docs: &[Document]) {
    let values: Vec<serde_json::Value> = docs.iter().map(Document::to_value).collect();
    print_json(&values);
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}
