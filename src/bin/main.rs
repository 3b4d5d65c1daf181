//! Tributary CLI - serve, inspect, and fetch nested queries
//!
//! Usage:
//!   tributary serve [--config <file>] [--schema <file>] [--data <file>] [--queries <file>]
//!   tributary hash <query.json> [--schema <file>]
//!   tributary validate <query.json> [--schema <file>]
//!   tributary fetch <query.json> [--url <url>] [--last]
//!
//! Examples:
//!   tributary serve --schema schema.toml --data rental.json --port 4417
//!   tributary hash customer.json --schema schema.toml
//!   tributary fetch customer.json --last

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tributary::client::QueryClient;
use tributary::config::Settings;
use tributary::engine::MemoryEngine;
use tributary::query::{canonical_json, problems_in_tree, QueryDocument};
use tributary::registry::QueryRegistry;
use tributary::schema::Schema;
use tributary::stream::write_ndjson;
use tributary::web::{self, AppState};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "tributary")]
#[command(about = "Tributary - declarative nested queries with streamed results")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $TRIBUTARY_CONFIG, ./tributary.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve POST /query over the in-memory engine
    Serve {
        /// Schema catalog (.json or .toml)
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Table data (.json)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Query documents to register at startup (.json array)
        #[arg(long)]
        queries: Option<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the identity hash of a query document
    Hash {
        /// Path to the query document
        file: PathBuf,

        /// Schema catalog to build against
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Also print the canonical text the hash is computed over
        #[arg(long)]
        canonical: bool,
    },

    /// Check a query document without executing it
    Validate {
        /// Path to the query document
        file: PathBuf,

        /// Schema catalog to check against
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Send a query document to a server and print the frames
    Fetch {
        /// Path to the query document
        file: PathBuf,

        /// Server base URL
        #[arg(long)]
        url: Option<String>,

        /// Ask for the final frame only
        #[arg(long)]
        last: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = env_logger::Builder::from_default_env()
        .filter_module("tributary", log::LevelFilter::Info)
        .try_init();

    let cli = Cli::parse();
    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Serve {
            schema,
            data,
            queries,
            host,
            port,
        } => cmd_serve(settings, schema, data, queries, host, port).await,
        Commands::Hash {
            file,
            schema,
            canonical,
        } => cmd_hash(&settings, &file, schema, canonical),
        Commands::Validate { file, schema } => cmd_validate(&settings, &file, schema),
        Commands::Fetch { file, url, last } => cmd_fetch(&settings, &file, url, last).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_settings(path: Option<&Path>) -> CliResult<Settings> {
    Ok(match path {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    })
}

/// The schema named on the command line, else the one in the config file.
fn load_schema(settings: &Settings, flag: Option<PathBuf>) -> CliResult<Option<Arc<Schema>>> {
    let path = match flag {
        Some(path) => Some(path),
        None => settings.schema.resolved_path()?,
    };
    match path {
        Some(path) => {
            log::debug!("Loading schema from {}", path.display());
            Ok(Some(Arc::new(Schema::from_file(&path)?)))
        }
        None => Ok(None),
    }
}

fn read_document(file: &Path) -> CliResult<QueryDocument> {
    let bytes = fs::read(file)
        .map_err(|e| format!("Error reading file '{}': {}", file.display(), e))?;
    Ok(QueryDocument::from_slice(&bytes)?)
}

async fn cmd_serve(
    settings: Settings,
    schema: Option<PathBuf>,
    data: Option<PathBuf>,
    queries: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> CliResult<ExitCode> {
    let schema = load_schema(&settings, schema)?;

    let data = match data {
        Some(path) => Some(path),
        None => settings.data.resolved_path()?,
    };
    let engine = match data {
        Some(path) => MemoryEngine::from_file(&path)?,
        None => {
            log::warn!("No data file configured; every table is unknown");
            MemoryEngine::new()
        }
    };

    let queries = match queries {
        Some(path) => Some(path),
        None => settings.registry.resolved_path()?,
    };
    let registry = match queries {
        Some(path) => QueryRegistry::from_file(&path, schema.as_ref())?,
        None => QueryRegistry::new(),
    };

    let mut state = AppState::new(engine).with_registry(Arc::new(registry));
    if let Some(schema) = schema {
        state = state.with_schema(schema);
    }

    let mut server = settings.server;
    if let Some(host) = host {
        server.host = host;
    }
    if let Some(port) = port {
        server.port = port;
    }

    web::serve(state, &server.addr(), server.cors).await?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_hash(
    settings: &Settings,
    file: &Path,
    schema: Option<PathBuf>,
    canonical: bool,
) -> CliResult<ExitCode> {
    let schema = load_schema(settings, schema)?;
    let node = read_document(file)?.into_query(schema.as_ref())?;
    println!("{}", node.hash());
    if canonical {
        println!("{}", canonical_json(&node));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_validate(settings: &Settings, file: &Path, schema: Option<PathBuf>) -> CliResult<ExitCode> {
    let schema = load_schema(settings, schema)?;

    // Build structurally first so every schema problem in the tree can be listed
    let node = match read_document(file)?.into_query(None) {
        Ok(node) => node,
        Err(e) => {
            eprintln!("{}: {}", file.display(), e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let problems = problems_in_tree(&node, schema.as_deref());
    if problems.is_empty() {
        println!("{}: ok ({}, hash {})", file.display(), node.name(), node.hash());
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!("{}: {} problem(s)", file.display(), problems.len());
    for problem in &problems {
        eprintln!("  [{}] {}", problem.kind(), problem);
    }
    Ok(ExitCode::FAILURE)
}

async fn cmd_fetch(
    settings: &Settings,
    file: &Path,
    url: Option<String>,
    last: bool,
) -> CliResult<ExitCode> {
    let client = match url {
        Some(url) => QueryClient::new(&url)?,
        None => QueryClient::from_settings(&settings.client)?,
    };

    let document: serde_json::Value = serde_json::from_slice(
        &fs::read(file).map_err(|e| format!("Error reading file '{}': {}", file.display(), e))?,
    )?;

    if last {
        match client.fetch_document_last(&document).await? {
            Some(frame) => println!("{}", frame),
            None => eprintln!("(no result)"),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut fault = None;
    let frames = client.fetch_document(&document).await?.inspect(|item| {
        if let Err(e) = item {
            fault = Some(e.to_string());
        }
    });
    let written = write_ndjson(&mut tokio::io::stdout(), frames).await?;
    log::debug!("{} frame(s) received", written);

    match fault {
        Some(fault) => {
            eprintln!("Stream ended with an error: {}", fault);
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}
