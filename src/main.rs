use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docura::{
    api::{self, HttpSettings},
    config::{self, Config},
    logging,
    processing::{RagService, spawn_expiry_task},
    uploads::UploadStore,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Uploads older than this are leftovers from a previous process.
const STALE_UPLOAD_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Parser)]
#[command(name = "docura", version, about = "Chat with your PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Delete upload namespaces older than VECTOR_EXPIRATION_DAYS once and exit.
    SweepNamespaces {
        /// List the namespaces that would be deleted without deleting them.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match config::init_config() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };
    logging::init_tracing(config.environment);

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::SweepNamespaces { dry_run } => sweep_namespaces(config, dry_run).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = ?error, "Docura exited with an error");
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: &'static Config) -> Result<()> {
    let uploads = UploadStore::new(&config.upload_dir).with_context(|| {
        format!(
            "failed to prepare upload directory {}",
            config.upload_dir.display()
        )
    })?;
    uploads.sweep_stale(STALE_UPLOAD_AGE);

    let service = Arc::new(
        RagService::from_config(config)
            .await
            .context("failed to initialize the RAG service")?,
    );
    let _expiry = spawn_expiry_task(
        Arc::clone(&service),
        Duration::from_secs(config.expiry_sweep_interval_secs),
    );

    let app = api::create_router(
        service,
        Arc::new(uploads),
        &HttpSettings::from_config(config),
    );
    let (listener, port) = bind_listener(config.port)
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(environment = ?config.environment, "Listening on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated unexpectedly")?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn sweep_namespaces(config: &'static Config, dry_run: bool) -> Result<()> {
    let service = RagService::from_config(config)
        .await
        .context("failed to initialize the RAG service")?;
    let expired = service
        .expire_namespaces(dry_run)
        .await
        .context("namespace sweep failed")?;

    for namespace in &expired {
        println!("{namespace}");
    }
    tracing::info!(
        count = expired.len(),
        dry_run,
        days = config.vector_expiration_days,
        "Namespace sweep finished"
    );
    Ok(())
}

/// Bind on all interfaces; port `0` asks the OS for a free port.
async fn bind_listener(port: u16) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    let bound = listener.local_addr()?.port();
    tracing::debug!(port = bound, "Bound server port");
    Ok((listener, bound))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %error, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(error = %error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
