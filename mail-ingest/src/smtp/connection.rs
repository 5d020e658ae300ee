//! SMTP protocol loop for one connection (RFC 5321)
//!
//! Owns the command sequencing and the wire format; transaction decisions
//! are delegated to a [`Session`]. The body is collected in full before
//! [`Session::data`] is called, so a client that disconnects or stalls in
//! the middle of DATA never produces an event.

use super::commands::SmtpCommand;
use super::session::Session;
use super::tls::TlsConfig;
use crate::config::SmtpConfig;
use crate::error::{GatewayError, Result, SmtpError};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadBuf,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::server::TlsStream;
use tracing::{debug, error, info, warn};

/// Maximum command line length (RFC 5321 4.5.3.1.4)
const MAX_LINE_LENGTH: usize = 512;

/// Maximum number of errors before disconnecting
const MAX_ERRORS: usize = 10;

/// Plain or TLS transport, switchable in place by STARTTLS
pub enum SmtpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    /// Placeholder while the STARTTLS handshake owns the socket
    Upgrading,
}

fn upgrading_error() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "stream is being upgraded to TLS",
    )
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            SmtpStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
            SmtpStream::Upgrading => Poll::Ready(Err(upgrading_error())),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SmtpStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            SmtpStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
            SmtpStream::Upgrading => Poll::Ready(Err(upgrading_error())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            SmtpStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
            SmtpStream::Upgrading => Poll::Ready(Err(upgrading_error())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            SmtpStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
            SmtpStream::Upgrading => Poll::Ready(Err(upgrading_error())),
        }
    }
}

/// Protocol limits shared by all connections of a server
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub hostname: String,
    /// Advertised with SIZE and enforced on the body
    pub data_limit: usize,
    pub max_recipients: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Refuse MAIL until the transport is secured
    pub require_tls: bool,
}

impl From<&SmtpConfig> for ConnectionConfig {
    fn from(config: &SmtpConfig) -> Self {
        Self {
            hostname: config.hostname.clone(),
            data_limit: config.data_limit,
            max_recipients: config.recipients.limit,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            require_tls: config.tls.require,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SmtpState {
    Fresh,
    Greeted,
    MailFrom,
    RcptTo,
}

/// Result of processing SMTP commands
enum LoopResult {
    /// Restart on the upgraded stream
    Continue,
    Quit,
}

#[derive(Debug, PartialEq)]
enum ReadOutcome {
    Line,
    /// The line went over the cap; it was discarded up to its newline
    TooLong,
    Eof,
    Timeout,
}

pub struct Connection {
    config: Arc<ConnectionConfig>,
    session: Box<dyn Session>,
    starttls: Option<TlsConfig>,
    is_encrypted: bool,
    state: SmtpState,
    recipients: usize,
    error_count: usize,
}

impl Connection {
    pub fn new(config: Arc<ConnectionConfig>, session: Box<dyn Session>) -> Self {
        Self {
            config,
            session,
            starttls: None,
            is_encrypted: false,
            state: SmtpState::Fresh,
            recipients: 0,
            error_count: 0,
        }
    }

    /// Offer STARTTLS with this certificate
    pub fn with_starttls(mut self, tls: TlsConfig) -> Self {
        self.starttls = Some(tls);
        self
    }

    /// The transport was secured before the greeting (implicit TLS)
    pub fn encrypted(mut self) -> Self {
        self.is_encrypted = true;
        self
    }

    /// Run the protocol until QUIT, disconnect or a fatal error. The
    /// session is logged out in every case.
    pub async fn handle(mut self, mut stream: SmtpStream) -> Result<()> {
        let result = self.run(&mut stream).await;
        self.session.logout();
        result
    }

    async fn run(&mut self, stream: &mut SmtpStream) -> Result<()> {
        let greeting = format!("220 {} ESMTP Service Ready\r\n", self.config.hostname);
        self.send(stream, &greeting).await?;

        loop {
            match self.process_commands(stream).await? {
                LoopResult::Continue => continue,
                LoopResult::Quit => return Ok(()),
            }
        }
    }

    async fn process_commands(&mut self, stream: &mut SmtpStream) -> Result<LoopResult> {
        let mut reader = BufReader::new(&mut *stream);
        let mut line = Vec::new();

        loop {
            if self.error_count >= MAX_ERRORS {
                warn!("Too many errors, disconnecting");
                self.send(&mut reader, "421 4.7.0 Too many errors, closing connection\r\n")
                    .await?;
                return Ok(LoopResult::Quit);
            }

            match self.read_line(&mut reader, &mut line, MAX_LINE_LENGTH).await? {
                ReadOutcome::Line => {}
                ReadOutcome::TooLong => {
                    error!("Line too long: over {} bytes", MAX_LINE_LENGTH);
                    self.send(&mut reader, "500 5.5.2 Line too long\r\n").await?;
                    self.error_count += 1;
                    continue;
                }
                ReadOutcome::Eof => {
                    debug!("Client disconnected");
                    return Ok(LoopResult::Quit);
                }
                ReadOutcome::Timeout => {
                    warn!("Command timeout, disconnecting");
                    self.send(&mut reader, "421 4.4.2 Timeout, closing connection\r\n")
                        .await?;
                    return Ok(LoopResult::Quit);
                }
            }

            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end();
            debug!("Received: {}", text);

            let cmd = match SmtpCommand::parse(text) {
                Ok(cmd) => cmd,
                Err(e) => {
                    error!("Command parse error: {}", e);
                    self.send(&mut reader, "501 5.5.2 Syntax error in parameters\r\n")
                        .await?;
                    self.error_count += 1;
                    continue;
                }
            };

            match cmd {
                SmtpCommand::Starttls => {
                    drop(reader);
                    if self.handle_starttls(stream).await? {
                        info!("STARTTLS upgrade completed, restarting session");
                        return Ok(LoopResult::Continue);
                    }
                    reader = BufReader::new(&mut *stream);
                }
                SmtpCommand::Quit => {
                    let reply = format!("221 2.0.0 {} closing connection\r\n", self.config.hostname);
                    self.send(&mut reader, &reply).await?;
                    return Ok(LoopResult::Quit);
                }
                SmtpCommand::Data => {
                    if self.state != SmtpState::RcptTo {
                        let reply = match self.state {
                            SmtpState::MailFrom => "503 5.5.1 Need RCPT command\r\n",
                            _ => "503 5.5.1 Bad sequence of commands\r\n",
                        };
                        self.send(&mut reader, reply).await?;
                        continue;
                    }
                    self.send(&mut reader, "354 Start mail input; end with <CRLF>.<CRLF>\r\n")
                        .await?;
                    if let LoopResult::Quit = self.receive_data(&mut reader).await? {
                        return Ok(LoopResult::Quit);
                    }
                }
                cmd => {
                    let reply = self.handle_command(cmd);
                    self.send(&mut reader, &reply).await?;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: SmtpCommand) -> String {
        match (self.state, cmd) {
            (_, SmtpCommand::Helo(domain)) => {
                info!("HELO from {}", domain);
                self.reset_transaction();
                self.state = SmtpState::Greeted;
                format!("250 {} Hello {}\r\n", self.config.hostname, domain)
            }
            (_, SmtpCommand::Ehlo(domain)) => {
                info!("EHLO from {}", domain);
                self.reset_transaction();
                self.state = SmtpState::Greeted;
                self.ehlo_reply(&domain)
            }
            (SmtpState::Fresh, SmtpCommand::MailFrom(..)) => {
                "503 5.5.1 Send HELO/EHLO first\r\n".to_string()
            }
            (SmtpState::MailFrom | SmtpState::RcptTo, SmtpCommand::MailFrom(..)) => {
                "503 5.5.1 Nested MAIL command\r\n".to_string()
            }
            (SmtpState::Greeted, SmtpCommand::MailFrom(from, size)) => {
                if self.config.require_tls && !self.is_encrypted {
                    warn!("MAIL FROM rejected: TLS required");
                    return "530 5.7.0 Must issue a STARTTLS command first\r\n".to_string();
                }
                if size.is_some_and(|size| size > self.config.data_limit) {
                    warn!("MAIL FROM rejected: declared size {:?} over limit", size);
                    return SmtpError::new(
                        552,
                        (5, 3, 4),
                        "Message size exceeds fixed maximum message size",
                    )
                    .to_reply();
                }
                match self.session.mail(&from) {
                    Ok(()) => {
                        self.state = SmtpState::MailFrom;
                        self.recipients = 0;
                        "250 2.1.0 OK\r\n".to_string()
                    }
                    Err(e) => e.to_reply(),
                }
            }
            (SmtpState::MailFrom | SmtpState::RcptTo, SmtpCommand::RcptTo(to)) => {
                if self.recipients >= self.config.max_recipients {
                    warn!("Too many recipients: {}", self.recipients);
                    return SmtpError::new(452, (4, 5, 3), "Too many recipients").to_reply();
                }
                match self.session.rcpt(&to) {
                    Ok(()) => {
                        self.recipients += 1;
                        self.state = SmtpState::RcptTo;
                        "250 2.1.5 OK\r\n".to_string()
                    }
                    Err(e) => e.to_reply(),
                }
            }
            (_, SmtpCommand::Rset) => {
                self.reset_transaction();
                "250 2.0.0 OK\r\n".to_string()
            }
            (_, SmtpCommand::Noop) => "250 2.0.0 OK\r\n".to_string(),
            (_, SmtpCommand::Unknown(cmd)) => {
                error!("Unknown command: {}", cmd);
                self.error_count += 1;
                "502 5.5.2 Command not implemented\r\n".to_string()
            }
            _ => "503 5.5.1 Bad sequence of commands\r\n".to_string(),
        }
    }

    fn ehlo_reply(&self, domain: &str) -> String {
        let mut lines = vec![format!("{} Hello {}", self.config.hostname, domain)];
        if self.starttls.is_some() && !self.is_encrypted {
            lines.push("STARTTLS".to_string());
        }
        lines.push(format!("SIZE {}", self.config.data_limit));
        lines.push(format!("LIMITS RCPTMAX={}", self.config.max_recipients));
        lines.push("8BITMIME".to_string());
        lines.push("ENHANCEDSTATUSCODES".to_string());

        let last = lines.len() - 1;
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let sep = if i == last { ' ' } else { '-' };
                format!("250{}{}\r\n", sep, line)
            })
            .collect()
    }

    /// Drop the current transaction, keeping the greeting
    fn reset_transaction(&mut self) {
        self.session.reset();
        self.recipients = 0;
        if self.state != SmtpState::Fresh {
            self.state = SmtpState::Greeted;
        }
    }

    /// Collect the dot-terminated body, then hand it to the session
    async fn receive_data<S>(&mut self, reader: &mut BufReader<S>) -> Result<LoopResult>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut body = Vec::new();
        let mut line = Vec::new();
        let mut too_large = false;
        // Leading dot and CRLF on top of the body cap
        let line_limit = self.config.data_limit + 3;

        loop {
            match self.read_line(reader, &mut line, line_limit).await? {
                ReadOutcome::Line => {}
                ReadOutcome::TooLong => {
                    if !too_large {
                        warn!(
                            "Message too large: line over {} bytes, discarding the rest",
                            self.config.data_limit
                        );
                        too_large = true;
                        body.clear();
                    }
                    continue;
                }
                ReadOutcome::Eof => {
                    warn!("Connection closed during DATA, dropping message");
                    return Ok(LoopResult::Quit);
                }
                ReadOutcome::Timeout => {
                    warn!("DATA timeout, dropping message");
                    self.send(reader, "421 4.4.2 Timeout, closing connection\r\n")
                        .await?;
                    return Ok(LoopResult::Quit);
                }
            }

            if line == b".\r\n" || line == b".\n" {
                break;
            }
            if too_large {
                continue;
            }

            // Transparency: a leading dot was doubled by the client
            let content = match line.first() {
                Some(&b'.') => &line[1..],
                _ => &line[..],
            };
            if body.len() + content.len() > self.config.data_limit {
                warn!(
                    "Message too large: over {} bytes, discarding the rest",
                    self.config.data_limit
                );
                too_large = true;
                body.clear();
                continue;
            }
            body.extend_from_slice(content);
        }

        let reply = if too_large {
            SmtpError::new(552, (5, 3, 4), "Message size exceeds fixed maximum message size")
                .to_reply()
        } else {
            info!("End of DATA received, total size: {} bytes", body.len());
            match self.session.data(&mut &body[..]).await {
                Ok(()) => "250 2.0.0 OK: message accepted\r\n".to_string(),
                Err(e) => e.to_reply(),
            }
        };
        self.reset_transaction();
        self.send(reader, &reply).await?;
        Ok(LoopResult::Continue)
    }

    async fn handle_starttls(&mut self, stream: &mut SmtpStream) -> Result<bool> {
        let tls = match &self.starttls {
            Some(tls) => tls.clone(),
            None => {
                self.send(stream, "502 5.5.1 STARTTLS not available\r\n").await?;
                return Ok(false);
            }
        };
        if self.is_encrypted {
            self.send(stream, "503 5.5.1 Already using TLS\r\n").await?;
            return Ok(false);
        }
        if self.state != SmtpState::Greeted {
            self.send(stream, "503 5.5.1 Bad sequence of commands\r\n").await?;
            return Ok(false);
        }

        self.send(stream, "220 2.0.0 Ready to start TLS\r\n").await?;

        let tcp = match std::mem::replace(stream, SmtpStream::Upgrading) {
            SmtpStream::Plain(tcp) => tcp,
            other => {
                *stream = other;
                return Err(GatewayError::Tls("stream is not a plain TCP stream".to_string()));
            }
        };

        let tls_stream = timeout(self.config.read_timeout, tls.acceptor().accept(tcp))
            .await
            .map_err(|_| GatewayError::Tls("TLS handshake timed out".to_string()))?
            .map_err(|e| GatewayError::Tls(format!("TLS handshake failed: {}", e)))?;
        *stream = SmtpStream::Tls(Box::new(tls_stream));
        self.is_encrypted = true;

        // The client must greet again on the secured channel (RFC 3207)
        self.session.reset();
        self.recipients = 0;
        self.state = SmtpState::Fresh;
        Ok(true)
    }

    /// Read one line of at most `limit` bytes, newline included
    async fn read_line<R>(
        &self,
        reader: &mut R,
        line: &mut Vec<u8>,
        limit: usize,
    ) -> Result<ReadOutcome>
    where
        R: AsyncBufRead + Unpin,
    {
        match timeout(self.config.read_timeout, read_bounded_line(reader, line, limit)).await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => Ok(ReadOutcome::Timeout),
        }
    }

    async fn send<W>(&self, writer: &mut W, reply: &str) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let write = async {
            writer.write_all(reply.as_bytes()).await?;
            writer.flush().await
        };
        timeout(self.config.write_timeout, write)
            .await
            .map_err(|_| GatewayError::SmtpProtocol("write timeout".to_string()))??;
        Ok(())
    }
}

/// Never buffers more than `limit` bytes: an overlong line is consumed in
/// `limit`-sized chunks and dropped
async fn read_bounded_line<R>(
    reader: &mut R,
    line: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<ReadOutcome>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let read = (&mut *reader)
        .take(limit as u64)
        .read_until(b'\n', line)
        .await?;
    if read == 0 {
        return Ok(ReadOutcome::Eof);
    }
    // A short read without newline is the last line before EOF
    if line.last() == Some(&b'\n') || read < limit {
        return Ok(ReadOutcome::Line);
    }

    loop {
        line.clear();
        let read = (&mut *reader)
            .take(limit as u64)
            .read_until(b'\n', line)
            .await?;
        if read == 0 || line.last() == Some(&b'\n') {
            line.clear();
            return Ok(ReadOutcome::TooLong);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_line_discards_overlong_line() {
        let mut reader: &[u8] = b"AAAAAAAAAAAAAAAAAAAA\r\nNOOP\r\n";
        let mut line = Vec::new();

        let outcome = read_bounded_line(&mut reader, &mut line, 8).await.unwrap();
        assert_eq!(outcome, ReadOutcome::TooLong);
        assert!(line.is_empty());

        let outcome = read_bounded_line(&mut reader, &mut line, 8).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Line);
        assert_eq!(line, b"NOOP\r\n");

        let outcome = read_bounded_line(&mut reader, &mut line, 8).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Eof);
    }

    #[tokio::test]
    async fn test_bounded_line_at_exact_limit() {
        let mut reader: &[u8] = b"NOOP\r\nNOOPS\r\n";
        let mut line = Vec::new();
        assert_eq!(
            read_bounded_line(&mut reader, &mut line, 6).await.unwrap(),
            ReadOutcome::Line
        );
        assert_eq!(
            read_bounded_line(&mut reader, &mut line, 6).await.unwrap(),
            ReadOutcome::TooLong
        );
    }

    #[tokio::test]
    async fn test_bounded_line_without_newline_before_eof() {
        let mut reader: &[u8] = b"QUIT";
        let mut line = Vec::new();
        assert_eq!(
            read_bounded_line(&mut reader, &mut line, 8).await.unwrap(),
            ReadOutcome::Line
        );
        assert_eq!(line, b"QUIT");
    }

    #[allow(dead_code)]
    fn handle_is_send(connection: Connection, stream: SmtpStream) -> impl Send {
        connection.handle(stream)
    }
}
