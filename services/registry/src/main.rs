//! Command line access to a container registry, and a server for the dashboard API.
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use eyre::WrapErr as _;
use futures::TryStreamExt as _;
use registry::{RegistryClient, RegistryConfig};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Debug, Parser)]
#[command(name = "registry-dashboard", version, about)]
struct Cli {
    /// Base URL of the registry
    #[arg(long, env = "REGISTRY_URL", default_value = registry::DEFAULT_REGISTRY_URL, global = true)]
    registry_url: String,

    /// Username for Basic authentication
    #[arg(long, env = "REGISTRY_USERNAME", global = true)]
    username: Option<String>,

    /// Password for Basic authentication
    #[arg(long, env = "REGISTRY_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Per-request timeout, in seconds
    #[arg(long, env = "REGISTRY_TIMEOUT", global = true)]
    timeout: Option<u64>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    /// Human readable
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the dashboard JSON API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:3000")]
        listen: SocketAddr,
    },

    /// List repositories in the catalog
    Repos {
        /// Continuation token from a previous page
        #[arg(long)]
        last: Option<String>,

        /// Page size
        #[arg(short, long)]
        n: Option<i64>,

        /// Follow continuation tokens to the end of the catalog
        #[arg(long, conflicts_with = "last")]
        all: bool,
    },

    /// List the tags of a repository
    Tags {
        /// Repository name
        name: String,

        /// Continuation token from a previous page
        #[arg(long)]
        last: Option<String>,

        /// Page size
        #[arg(short, long)]
        n: Option<i64>,

        /// Follow continuation tokens to the last tag
        #[arg(long, conflicts_with = "last")]
        all: bool,
    },

    /// Fetch a manifest by tag or digest
    Manifest {
        /// Repository name
        name: String,
        /// Tag or digest
        reference: String,
    },

    /// Resolve tags to digests
    Digest {
        /// Repository name
        name: String,
        /// Tags or digests to resolve
        #[arg(required = true)]
        references: Vec<String>,
    },

    /// Delete the manifest a tag points to
    Delete {
        /// Repository name
        name: String,
        /// Tag to delete
        tag: String,
    },

    /// Print the registry endpoint label
    Endpoint,
}

impl Cli {
    fn config(&self) -> RegistryConfig {
        let mut config = RegistryConfig::new(&self.registry_url);
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            config = config.with_credentials(username.clone(), password.clone());
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(Duration::from_secs(timeout));
        }
        config
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => subscriber
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancel in-flight requests on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let guard = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling requests");
            guard.cancel();
        }
    });
    token
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = cli.config();

    if let Command::Endpoint = cli.command {
        return print_json(&json!({ "endpoint": config.endpoint_label() }));
    }

    let client = RegistryClient::new(config)?;

    match cli.command {
        Command::Serve { listen } => {
            let listener = tokio::net::TcpListener::bind(listen)
                .await
                .wrap_err_with(|| format!("binding {listen}"))?;
            tracing::info!(%listen, endpoint = %client.endpoint_label(), "serving dashboard API");

            axum::serve(listener, registry::api::router(client))
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        command => run(client.with_cancellation(cancel_on_interrupt()), command).await?,
    }

    Ok(())
}

async fn run(client: RegistryClient, command: Command) -> eyre::Result<()> {
    match command {
        Command::Repos { n, all: true, .. } => {
            let repositories: Vec<String> = client.repositories(n).try_collect().await?;
            print_json(&json!({ "repositories": repositories }))
        }
        Command::Repos { last, n, .. } => {
            let page = client.list_catalog_page(last.as_deref(), n).await?;
            print_json(&json!({ "repositories": page.items, "next": page.next }))
        }
        Command::Tags {
            name, n, all: true, ..
        } => {
            let tags: Vec<String> = client.tags(&name, n).try_collect().await?;
            print_json(&json!({ "name": name, "tags": tags }))
        }
        Command::Tags { name, last, n, .. } => {
            let page = client.list_tags_page(&name, last.as_deref(), n).await?;
            print_json(&json!({ "name": name, "tags": page.items, "next": page.next }))
        }
        Command::Manifest { name, reference } => {
            let manifest = client.get_manifest(&name, &reference).await?;
            tracing::info!(
                kind = ?manifest.kind(),
                media_type = manifest.media_type().unwrap_or("-"),
                size = %registry::format_bytes(manifest.total_size()),
                "fetched manifest"
            );
            print_json(&manifest)
        }
        Command::Digest { name, references } => {
            let outcomes = client.resolve_digests(&name, &references).await;
            let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();

            let results: Vec<_> = references
                .iter()
                .zip(outcomes)
                .map(|(reference, outcome)| match outcome {
                    Ok(digest) => json!({ "reference": reference, "digest": digest }),
                    Err(error) => json!({ "reference": reference, "error": error.to_string() }),
                })
                .collect();
            print_json(&results)?;

            if failed > 0 {
                eyre::bail!("{failed} of {} lookups failed", references.len());
            }
            Ok(())
        }
        Command::Delete { name, tag } => {
            let digest = client.delete_tag(&name, &tag).await?;
            print_json(&json!({ "success": true, "digest": digest }))
        }
        Command::Serve { .. } | Command::Endpoint => Ok(()),
    }
}
