//! grantkeep client management CLI
//!
//! Creates, inspects, updates and removes OAuth clients directly in the configured
//! storage backend, without going through the HTTP server.
//!
//! ```bash
//! # Register a client with a generated id and secret
//! grantkeep-clients --database-url sqlite:grantkeep.db create \
//!   --redirect-uri "https://app.example.com/callback"
//!
//! # Rotate its secret
//! grantkeep-clients update --client-id "<id>" --client-secret "<new secret>"
//!
//! # Remove it together with every token it holds
//! grantkeep-clients remove --client-id "<id>" --yes
//! ```
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error (storage connection, parsing, etc.)
//! - 2: Client management error (unknown or duplicate client, invalid input)

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use grantkeep::{
    errors::StorageError,
    oauth::{
        Client, Metadata, OAuthStorage,
        types::{generate_client_id, generate_token, is_valid_redirect_uri},
    },
    storage::{create_storage_backend, parse_storage_backend},
};
use serde::Serialize;
use serde_json::Value;
use std::{process, sync::Arc};

#[derive(Parser)]
#[command(
    name = "grantkeep-clients",
    about = "grantkeep OAuth client management",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Storage backend: memory, sqlite or postgres
    #[arg(long, env = "STORAGE_BACKEND", default_value = "sqlite")]
    storage_backend: String,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long, help = "Enable verbose output for debugging")]
    verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "json-pretty")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Json,
    JsonPretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new client
    Create(CreateArgs),
    /// Show an existing client
    Get(ClientIdArgs),
    /// Replace the secret, redirect URI or metadata of a client
    Update(UpdateArgs),
    /// Remove a client and every token issued to it
    Remove(RemoveArgs),
    /// List registered clients
    List(ListArgs),
}

#[derive(Args)]
struct CreateArgs {
    /// Client id; generated when omitted
    #[arg(long)]
    client_id: Option<String>,

    /// Client secret; generated when omitted
    #[arg(long)]
    client_secret: Option<String>,

    #[arg(long)]
    redirect_uri: String,

    /// Opaque client metadata as a JSON string
    #[arg(long)]
    metadata: Option<String>,
}

#[derive(Args)]
struct ClientIdArgs {
    #[arg(long, env = "GRANTKEEP_CLIENT_ID")]
    client_id: String,
}

#[derive(Args)]
struct UpdateArgs {
    #[arg(long, env = "GRANTKEEP_CLIENT_ID")]
    client_id: String,

    #[arg(long)]
    client_secret: Option<String>,

    #[arg(long)]
    redirect_uri: Option<String>,

    #[arg(long)]
    metadata: Option<String>,
}

#[derive(Args)]
struct RemoveArgs {
    #[arg(long, env = "GRANTKEEP_CLIENT_ID")]
    client_id: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Client management error: {0}")]
    ClientManagement(String),

    #[error("Error: {0}")]
    General(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => AppError::ClientManagement(format!("{what} not found")),
            StorageError::AlreadyExists(what) => {
                AppError::ClientManagement(format!("{what} already exists"))
            }
            err => AppError::Storage(err),
        }
    }
}

#[derive(Serialize)]
struct ClientView {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl From<&Client> for ClientView {
    fn from(client: &Client) -> Self {
        let metadata = if client.metadata.is_empty() {
            Value::Null
        } else {
            client.metadata.to_json().unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(client.metadata.as_bytes()).into_owned())
            })
        };
        Self {
            client_id: client.id.clone(),
            client_secret: client.secret.clone(),
            redirect_uri: client.redirect_uri.clone(),
            metadata,
            created_at: client.created_at,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = run(&cli).await;

    match result {
        Ok(()) => process::exit(0),
        Err(err @ AppError::ClientManagement(_)) => {
            eprintln!("{err}");
            process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<(), AppError> {
    let backend = parse_storage_backend(&cli.storage_backend, cli.database_url.as_deref())
        .map_err(|e| AppError::General(e.to_string()))?;
    if cli.verbose {
        eprintln!("Opening {:?}", backend);
    }
    let storage = create_storage_backend(backend, 1)
        .await
        .map_err(AppError::Storage)?;

    match &cli.command {
        Commands::Create(args) => create_client(cli, &storage, args).await,
        Commands::Get(args) => get_client(cli, &storage, args).await,
        Commands::Update(args) => update_client(cli, &storage, args).await,
        Commands::Remove(args) => remove_client(cli, &storage, args).await,
        Commands::List(args) => list_clients(cli, &storage, args).await,
    }
}

async fn create_client(
    cli: &Cli,
    storage: &Arc<dyn OAuthStorage>,
    args: &CreateArgs,
) -> Result<(), AppError> {
    check_redirect_uri(&args.redirect_uri)?;

    let client = Client::new(
        args.client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_client_id),
        args.client_secret
            .clone()
            .filter(|secret| !secret.is_empty())
            .unwrap_or_else(generate_token),
        args.redirect_uri.clone(),
        parse_metadata(args.metadata.as_deref())?,
    );

    storage.create_client(&client).await?;
    if cli.verbose {
        eprintln!("Created client: {}", client.id);
    }
    output(&cli.format, &ClientView::from(&client))
}

async fn get_client(
    cli: &Cli,
    storage: &Arc<dyn OAuthStorage>,
    args: &ClientIdArgs,
) -> Result<(), AppError> {
    let client = storage.get_client(&args.client_id).await?;
    output(&cli.format, &ClientView::from(&client))
}

async fn update_client(
    cli: &Cli,
    storage: &Arc<dyn OAuthStorage>,
    args: &UpdateArgs,
) -> Result<(), AppError> {
    let mut client = storage.get_client(&args.client_id).await?;

    if let Some(redirect_uri) = &args.redirect_uri {
        check_redirect_uri(redirect_uri)?;
        client.redirect_uri = redirect_uri.clone();
    }
    if let Some(secret) = args.client_secret.as_ref().filter(|secret| !secret.is_empty()) {
        client.secret = secret.clone();
    }
    if args.metadata.is_some() {
        client.metadata = parse_metadata(args.metadata.as_deref())?;
    }

    storage.update_client(&client).await?;
    if cli.verbose {
        eprintln!("Updated client: {}", client.id);
    }
    output(&cli.format, &ClientView::from(&client))
}

async fn remove_client(
    cli: &Cli,
    storage: &Arc<dyn OAuthStorage>,
    args: &RemoveArgs,
) -> Result<(), AppError> {
    // Fail on unknown ids before prompting.
    storage.get_client(&args.client_id).await?;

    if !args.yes {
        println!(
            "Remove client '{}' and all of its tokens? (y/N)",
            args.client_id
        );
        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| AppError::General(format!("Failed to read confirmation: {}", e)))?;

        let input = input.trim().to_lowercase();
        if input != "y" && input != "yes" {
            println!("Removal cancelled.");
            return Ok(());
        }
    }

    storage.remove_client(&args.client_id).await?;
    if cli.verbose {
        eprintln!("Removed client: {}", args.client_id);
    }
    println!("Client '{}' removed.", args.client_id);
    Ok(())
}

async fn list_clients(
    cli: &Cli,
    storage: &Arc<dyn OAuthStorage>,
    args: &ListArgs,
) -> Result<(), AppError> {
    let clients = storage.list_clients(args.limit).await?;
    let views: Vec<ClientView> = clients.iter().map(ClientView::from).collect();
    output(&cli.format, &views)
}

fn check_redirect_uri(redirect_uri: &str) -> Result<(), AppError> {
    if is_valid_redirect_uri(redirect_uri) {
        Ok(())
    } else {
        Err(AppError::ClientManagement(format!(
            "invalid redirect URI: {redirect_uri}"
        )))
    }
}

fn parse_metadata(metadata: Option<&str>) -> Result<Metadata, AppError> {
    match metadata {
        None => Ok(Metadata::empty()),
        Some(raw) => {
            let value: Value = serde_json::from_str(raw)
                .map_err(|e| AppError::ClientManagement(format!("Invalid metadata JSON: {e}")))?;
            Ok(Metadata::from_json(&value)?)
        }
    }
}

fn output<T: Serialize>(format: &OutputFormat, data: &T) -> Result<(), AppError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(data)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(data)?),
    }
    Ok(())
}
