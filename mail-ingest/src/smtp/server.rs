use super::backend::Backend;
use super::connection::{Connection, ConnectionConfig, SmtpStream};
use super::tls::TlsConfig;
use crate::config::{SmtpConfig, TlsMode};
use crate::error::{GatewayError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info};

pub struct SmtpServer {
    listen_addr: String,
    config: Arc<ConnectionConfig>,
    backend: Arc<dyn Backend>,
    tls_mode: TlsMode,
    tls: Option<TlsConfig>,
}

impl SmtpServer {
    pub fn new(config: &SmtpConfig, backend: Arc<dyn Backend>) -> Self {
        Self {
            listen_addr: config.listen_addr.clone(),
            config: Arc::new(ConnectionConfig::from(config)),
            backend,
            tls_mode: TlsMode::None,
            tls: None,
        }
    }

    /// Secure connections with `tls`, either on demand or from the first byte
    pub fn with_tls(mut self, mode: TlsMode, tls: TlsConfig) -> Self {
        self.tls_mode = mode;
        self.tls = Some(tls);
        self
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!("SMTP server listening on {}", self.listen_addr);
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    debug!("New SMTP connection from {}", addr);
                    let config = self.config.clone();
                    let backend = self.backend.clone();
                    let tls_mode = self.tls_mode;
                    let tls = self.tls.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_client(socket, addr, config, backend, tls_mode, tls).await
                        {
                            error!("Session error for {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    config: Arc<ConnectionConfig>,
    backend: Arc<dyn Backend>,
    tls_mode: TlsMode,
    tls: Option<TlsConfig>,
) -> Result<()> {
    let (stream, encrypted) = match (tls_mode, &tls) {
        (TlsMode::Implicit, Some(tls)) => {
            let stream = timeout(config.read_timeout, tls.acceptor().accept(socket))
                .await
                .map_err(|_| GatewayError::Tls("TLS handshake timed out".to_string()))??;
            (SmtpStream::Tls(Box::new(stream)), true)
        }
        _ => (SmtpStream::Plain(socket), false),
    };

    let mut connection = Connection::new(config, backend.new_session(addr));
    if encrypted {
        connection = connection.encrypted();
    }
    if let (TlsMode::Starttls, Some(tls)) = (tls_mode, tls) {
        connection = connection.with_starttls(tls);
    }
    connection.handle(stream).await
}
