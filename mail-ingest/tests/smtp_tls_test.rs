//! STARTTLS and implicit TLS against a self-signed certificate

mod common;

use common::{gateway, message, spawn, test_config, TestServer};
use mail_ingest::config::{Config, TlsMode};
use mail_ingest::dispatch::MemoryDispatcher;
use mail_ingest::smtp::TlsConfig;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

struct Certificate {
    der: Vec<u8>,
    tls: TlsConfig,
}

fn certificate() -> Certificate {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_file = NamedTempFile::new().unwrap();
    let key_file = NamedTempFile::new().unwrap();
    std::fs::write(cert_file.path(), cert.serialize_pem().unwrap()).unwrap();
    std::fs::write(key_file.path(), cert.serialize_private_key_pem()).unwrap();
    let tls = TlsConfig::from_pem_files(cert_file.path(), key_file.path()).unwrap();
    Certificate {
        der: cert.serialize_der().unwrap(),
        tls,
    }
}

async fn start_tls_server(mode: TlsMode, tls: TlsConfig) -> TestServer {
    start_tls_server_with(test_config(), mode, tls).await
}

async fn start_tls_server_with(mut config: Config, mode: TlsMode, tls: TlsConfig) -> TestServer {
    config.smtp.tls.mode = mode;
    config.smtp.tls.require = true;

    let dispatcher = Arc::new(MemoryDispatcher::new());
    let addr = spawn(gateway(&config, dispatcher.clone()).with_tls(mode, tls)).await;
    TestServer { addr, dispatcher }
}

fn connector(der: &[u8]) -> TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    roots.add(&rustls::Certificate(der.to_vec())).unwrap();
    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut reply = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap() == 0 {
            return reply;
        }
        let last = line.as_bytes().get(3) != Some(&b'-');
        reply.push_str(&line);
        if last {
            return reply;
        }
    }
}

async fn cmd<S: AsyncBufRead + AsyncWrite + Unpin>(stream: &mut S, line: &str) -> String {
    stream
        .write_all(format!("{}\r\n", line).as_bytes())
        .await
        .unwrap();
    stream.flush().await.unwrap();
    reply(stream).await
}

/// Full transaction on a secured stream
async fn deliver_secured<S: AsyncBufRead + AsyncWrite + Unpin>(stream: &mut S) {
    let ehlo = cmd(stream, "EHLO client.test").await;
    assert!(ehlo.starts_with("250"), "{}", ehlo);
    assert!(!ehlo.contains("STARTTLS"));

    assert!(cmd(stream, "MAIL FROM:<john@example.com>").await.starts_with("250"));
    assert!(cmd(stream, "RCPT TO:<publish@gateway.test>").await.starts_with("250"));
    assert!(cmd(stream, "DATA").await.starts_with("354"));
    let body = message(Some("tls@example.com"), "Secure", "over tls");
    stream.write_all(body.as_bytes()).await.unwrap();
    let done = cmd(stream, ".").await;
    assert!(done.starts_with("250"), "{}", done);
}

#[tokio::test]
async fn test_starttls_upgrade() {
    let cert = certificate();
    let server = start_tls_server(TlsMode::Starttls, cert.tls.clone()).await;

    let mut plain = BufReader::new(TcpStream::connect(server.addr).await.unwrap());
    assert!(reply(&mut plain).await.starts_with("220"));

    let ehlo = cmd(&mut plain, "EHLO client.test").await;
    assert!(ehlo.contains("250-STARTTLS\r\n"), "{}", ehlo);
    assert!(cmd(&mut plain, "MAIL FROM:<a@b>").await.starts_with("530"));
    assert!(cmd(&mut plain, "STARTTLS").await.starts_with("220"));

    let domain = rustls::ServerName::try_from("localhost").unwrap();
    let tls = connector(&cert.der)
        .connect(domain, plain.into_inner())
        .await
        .unwrap();
    let mut secured = BufReader::new(tls);
    deliver_secured(&mut secured).await;

    assert_eq!(server.dispatcher.len(), 1);
    assert_eq!(
        server.dispatcher.events()[0].event.object_url(),
        Some("tls@example.com")
    );
}

#[tokio::test]
async fn test_implicit_tls() {
    let cert = certificate();
    let server = start_tls_server(TlsMode::Implicit, cert.tls.clone()).await;

    let tcp = TcpStream::connect(server.addr).await.unwrap();
    let domain = rustls::ServerName::try_from("localhost").unwrap();
    let tls = connector(&cert.der).connect(domain, tcp).await.unwrap();
    let mut secured = BufReader::new(tls);
    assert!(reply(&mut secured).await.starts_with("220 gateway.test"));

    deliver_secured(&mut secured).await;
    assert_eq!(server.dispatcher.len(), 1);
}

/// The server closes the socket once the handshake stalls past the read
/// timeout
async fn assert_closed_by_server<R: AsyncRead + Unpin>(stream: &mut R) {
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("server kept the stalled connection open");
    assert!(matches!(read, Ok(0) | Err(_)), "{:?}", read);
}

fn short_timeout_config() -> Config {
    let mut config = test_config();
    config.smtp.read_timeout_secs = 1;
    config
}

#[tokio::test]
async fn test_stalled_implicit_tls_handshake_is_dropped() {
    let cert = certificate();
    let server = start_tls_server_with(short_timeout_config(), TlsMode::Implicit, cert.tls).await;

    let mut tcp = TcpStream::connect(server.addr).await.unwrap();
    assert_closed_by_server(&mut tcp).await;
}

#[tokio::test]
async fn test_stalled_starttls_handshake_is_dropped() {
    let cert = certificate();
    let server = start_tls_server_with(short_timeout_config(), TlsMode::Starttls, cert.tls).await;

    let mut plain = BufReader::new(TcpStream::connect(server.addr).await.unwrap());
    assert!(reply(&mut plain).await.starts_with("220"));
    assert!(cmd(&mut plain, "EHLO client.test").await.starts_with("250"));
    assert!(cmd(&mut plain, "STARTTLS").await.starts_with("220"));

    assert_closed_by_server(&mut plain).await;
}
