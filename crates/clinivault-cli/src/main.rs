//! clinivault: ingest, link and delete clinical attachments from the command line.
//!
//! Configuration comes from the environment (a `.env` file is read when present). Results are
//! printed to stdout as JSON; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use clinivault_core::{AttachmentConfig, StorageKey, UploadCandidate};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "clinivault", about = "Secure clinical attachment ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate, sanitize and store a file
    Ingest {
        /// Tenant UUID
        #[arg(long)]
        tenant: Uuid,
        /// Parent record UUID (visit, patient, ...)
        #[arg(long)]
        parent: Uuid,
        /// Path to the file to upload
        #[arg(long)]
        file: PathBuf,
        /// Declared filename; defaults to the file's name
        #[arg(long)]
        name: Option<String>,
        /// Declared content type
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Issue a time-limited read URL for a stored attachment
    Presign {
        /// Storage key (tenant/parent/token.ext)
        #[arg(long)]
        key: StorageKey,
        /// URL lifetime in seconds
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Delete a stored attachment
    Delete {
        /// Storage key (tenant/parent/token.ext)
        #[arg(long)]
        key: StorageKey,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AttachmentConfig::from_env().context("Failed to load configuration")?;
    clinivault_ingest::init_telemetry().map_err(|e| anyhow::anyhow!(e))?;
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        environment = %config.environment,
        backend = %config.storage.backend,
        encryption = %config.storage.encryption,
        database = config.database_url.is_some(),
        "Starting clinivault"
    );

    let services = clinivault_cli::build_services(&config).await?;

    match cli.command {
        Commands::Ingest {
            tenant,
            parent,
            file,
            name,
            content_type,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let declared_filename = name.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let candidate =
                UploadCandidate::new(data, declared_filename, content_type, tenant, parent);

            let output = clinivault_cli::ingest(&services, candidate).await?;
            print_json(&output)?;
        }
        Commands::Presign { key, ttl_secs } => {
            let url =
                clinivault_cli::presign(&services, &key, ttl_secs.map(Duration::from_secs)).await?;
            print_json(&serde_json::json!({ "storage_key": key.to_string(), "url": url }))?;
        }
        Commands::Delete { key } => {
            let output = clinivault_cli::delete(&services, &key).await?;
            print_json(&output)?;
        }
    }

    Ok(())
}
