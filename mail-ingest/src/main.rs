use anyhow::Context;
use clap::Parser;
use mail_ingest::config::{Config, LoggingConfig, TlsMode};
use mail_ingest::converter::{Converter, ConverterLogging, MimeConverter};
use mail_ingest::dispatch::{Dispatcher, DispatcherLogging, HttpDispatcher, MemoryDispatcher};
use mail_ingest::recipient::RecipientPolicy;
use mail_ingest::smtp::{Backend, BackendLogging, GatewayBackend, SmtpServer, TlsConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mail-ingest")]
#[command(about = "Inbound SMTP gateway turning email into events", long_about = None)]
struct Cli {
    /// TOML configuration file, layered over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep events in memory instead of posting them
    #[arg(long)]
    dry_run: bool,
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("invalid logging level")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_logging(&config.logging)?;

    info!("Starting mail-ingest v{}", env!("CARGO_PKG_VERSION"));
    info!("  SMTP listening on: {}", config.smtp.listen_addr);
    info!("  Public recipients: {:?}", config.smtp.recipients.public);
    info!("  Internal recipients: {:?}", config.smtp.recipients.internal);
    if config.smtp.recipients.public.is_empty() && config.smtp.recipients.internal.is_empty() {
        warn!("No recipients configured, every message will be rejected");
    }

    let policy = Arc::new(RecipientPolicy::new(
        &config.smtp.recipients.public,
        &config.smtp.recipients.internal,
    ));

    let converter: Arc<dyn Converter> = Arc::new(ConverterLogging::new(
        MimeConverter::from_config(&config, &policy)?,
    ));

    let dispatcher: Arc<dyn Dispatcher> = if cli.dry_run {
        info!("  Dispatch: dry run, events are kept in memory");
        Arc::new(DispatcherLogging::new(MemoryDispatcher::new()))
    } else {
        info!("  Dispatch: {}", config.dispatch.uri);
        Arc::new(DispatcherLogging::new(HttpDispatcher::new(
            config.dispatch.uri.clone(),
            config.dispatch.timeout(),
        )?))
    };

    let backend: Arc<dyn Backend> = Arc::new(BackendLogging::new(GatewayBackend::from_config(
        &config,
        policy,
        converter,
        dispatcher,
    )));

    let mut server = SmtpServer::new(&config.smtp, backend);
    let tls = &config.smtp.tls;
    if tls.mode != TlsMode::None {
        let (Some(cert), Some(key)) = (&tls.cert_path, &tls.key_path) else {
            anyhow::bail!("TLS mode {:?} requires cert_path and key_path", tls.mode);
        };
        info!("  TLS: {:?}", tls.mode);
        server = server.with_tls(tls.mode, TlsConfig::from_pem_files(cert, key)?);
    }

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("SMTP server error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
