//! Shared harness: a live gateway on an ephemeral port, dispatching into
//! memory
#![allow(dead_code)]

use mail_ingest::config::Config;
use mail_ingest::converter::MimeConverter;
use mail_ingest::dispatch::MemoryDispatcher;
use mail_ingest::recipient::RecipientPolicy;
use mail_ingest::smtp::{GatewayBackend, SmtpServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

pub struct TestServer {
    pub addr: SocketAddr,
    pub dispatcher: Arc<MemoryDispatcher>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.smtp.hostname = "gateway.test".to_string();
    config.smtp.data_limit = 1024;
    config.smtp.read_timeout_secs = 5;
    config.smtp.write_timeout_secs = 5;
    config.smtp.recipients.public = vec!["publish".to_string()];
    config.smtp.recipients.internal = vec!["ops".to_string()];
    config.smtp.recipients.limit = 3;
    config.event.internal.name = "chan".to_string();
    config.event.internal.value = 7;
    config
}

pub async fn start_server(config: Config) -> TestServer {
    start_server_with(config, MemoryDispatcher::new()).await
}

pub async fn start_server_with(config: Config, dispatcher: MemoryDispatcher) -> TestServer {
    let dispatcher = Arc::new(dispatcher);
    let addr = spawn(gateway(&config, dispatcher.clone())).await;
    TestServer { addr, dispatcher }
}

/// Server wired like the binary, minus the logging decorators
pub fn gateway(config: &Config, dispatcher: Arc<MemoryDispatcher>) -> SmtpServer {
    let policy = Arc::new(RecipientPolicy::new(
        &config.smtp.recipients.public,
        &config.smtp.recipients.internal,
    ));
    let converter = Arc::new(MimeConverter::from_config(config, &policy).unwrap());
    let backend = Arc::new(GatewayBackend::from_config(
        config, policy, converter, dispatcher,
    ));
    SmtpServer::new(&config.smtp, backend)
}

/// Serve on an ephemeral port
pub async fn spawn(server: SmtpServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

/// Line-oriented SMTP client speaking raw protocol
pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    /// Connect and consume the greeting
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
        };
        let greeting = client.reply().await;
        assert!(greeting.starts_with("220 gateway.test"), "{}", greeting);
        client
    }

    /// Connect and greet with EHLO
    pub async fn greeted(addr: SocketAddr) -> Self {
        let mut client = Self::connect(addr).await;
        let reply = client.cmd("EHLO client.test").await;
        assert!(reply.starts_with("250"), "{}", reply);
        client
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }

    pub async fn send_raw(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.unwrap();
    }

    /// Read a complete, possibly multi-line, reply. Empty on disconnect.
    pub async fn reply(&mut self) -> String {
        let mut reply = String::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await.unwrap() == 0 {
                return reply;
            }
            let last = line.as_bytes().get(3) != Some(&b'-');
            reply.push_str(&line);
            if last {
                return reply;
            }
        }
    }

    pub async fn cmd(&mut self, line: &str) -> String {
        self.send(line).await;
        self.reply().await
    }

    /// Run MAIL, RCPT for each recipient, DATA and the body; return the
    /// final reply
    pub async fn deliver(&mut self, from: &str, to: &[&str], body: &str) -> String {
        let reply = self.cmd(&format!("MAIL FROM:<{}>", from)).await;
        assert!(reply.starts_with("250"), "{}", reply);
        for rcpt in to {
            let reply = self.cmd(&format!("RCPT TO:<{}>", rcpt)).await;
            assert!(reply.starts_with("250"), "{}", reply);
        }
        let reply = self.cmd("DATA").await;
        assert!(reply.starts_with("354"), "{}", reply);
        self.send_raw(body.as_bytes()).await;
        self.send_raw(b".\r\n").await;
        self.reply().await
    }
}

pub fn message(message_id: Option<&str>, subject: &str, body: &str) -> String {
    let mut msg = String::from("From: John Doe <john@example.com>\r\n");
    msg.push_str("To: publish@gateway.test\r\n");
    msg.push_str("Date: Thu, 10 Oct 2024 12:34:56 +0000\r\n");
    if let Some(id) = message_id {
        msg.push_str(&format!("Message-ID: <{}>\r\n", id));
    }
    msg.push_str(&format!("Subject: {}\r\n", subject));
    msg.push_str("\r\n");
    msg.push_str(body);
    msg.push_str("\r\n");
    msg
}
