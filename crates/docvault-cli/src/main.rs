//! Docvault CLI: command-line client for the Docvault ingestion API.
//!
//! Set DOCVAULT_API_URL and DOCVAULT_OWNER_ID. Uploads are resumable: running the same
//! `upload` again after an interruption sends only the chunks the server is missing.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use docvault_api_client::{
    compute_content_hash, ApiClient, TransferConfig, Uploader, DEFAULT_HASH_CHUNK_SIZE,
};
use docvault_cli::{describe_stage, init_tracing, render_files_table};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "docvault", about = "Docvault ingestion CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a document (resumes an interrupted upload of the same content)
    Upload {
        /// Path to the file to upload
        file: PathBuf,
        /// Do not print progress
        #[arg(long)]
        quiet: bool,
    },
    /// List your files, newest first
    List {
        #[arg(long, value_enum, default_value = "table")]
        format: Format,
    },
    /// Get a single file by ID
    Get {
        /// File UUID
        id: Uuid,
    },
    /// Delete a file by ID
    Delete {
        /// File UUID
        id: Uuid,
    },
    /// Print the content hash of a local file without uploading it
    Hash {
        file: PathBuf,
    },
    /// Ask the server to pick up pending files now
    Trigger,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Hashing is local; everything else talks to the server
    if let Commands::Hash { file } = &cli.command {
        let digest = compute_content_hash(file, DEFAULT_HASH_CHUNK_SIZE, |_| {}).await?;
        println!("{}  {}", digest, file.display());
        return Ok(());
    }

    let client = ApiClient::from_env().context(
        "Failed to create API client. Set DOCVAULT_OWNER_ID and DOCVAULT_API_URL",
    )?;
    tracing::debug!(api_url = %client.base_url(), "API client ready");

    match cli.command {
        Commands::Upload { file, quiet } => {
            let transfer = TransferConfig::from_env();
            tracing::debug!(
                file = %file.display(),
                concurrency = transfer.concurrency,
                max_retries = transfer.max_retries,
                "Starting upload"
            );
            let uploader = Uploader::new(Arc::new(client.clone()))
                .with_transfer_config(transfer);
            let outcome = uploader
                .upload_file(&file, |stage| {
                    if !quiet {
                        eprintln!("{}: {}", file.display(), describe_stage(&stage));
                    }
                })
                .await?;
            tracing::debug!(
                file_id = %outcome.file_id,
                duplicate = outcome.duplicate,
                chunks_sent = outcome.chunks_sent,
                "Upload finished"
            );
            print_json(&serde_json::json!({
                "file_id": outcome.file_id,
                "content_hash": outcome.content_hash,
                "duplicate": outcome.duplicate,
                "chunks_sent": outcome.chunks_sent,
                "chunks_resumed": outcome.chunks_resumed,
                "status": outcome.status,
            }))?;
        }
        Commands::List { format } => {
            let files = client.list_files().await?;
            tracing::debug!(count = files.len(), "Listed files");
            match format {
                Format::Table => print!("{}", render_files_table(&files)),
                Format::Json => print_json(&files)?,
            }
        }
        Commands::Get { id } => {
            let file = client.get_file(id).await?;
            print_json(&file)?;
        }
        Commands::Delete { id } => {
            client.delete_file(id).await?;
            tracing::debug!(file_id = %id, "File deleted");
            print_json(
                &serde_json::json!({ "success": true, "message": format!("File {} deleted", id) }),
            )?;
        }
        Commands::Trigger => {
            client.trigger_ingest().await?;
            print_json(&serde_json::json!({ "success": true }))?;
        }
        Commands::Hash { .. } => {}
    }

    Ok(())
}
