//! Logging decorators for backends and sessions

use super::backend::Backend;
use super::session::{Session, SmtpResult};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::AsyncRead;
use tracing::{debug, error, info};

pub struct BackendLogging<B> {
    inner: B,
}

impl<B: Backend> BackendLogging<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

impl<B: Backend> Backend for BackendLogging<B> {
    fn new_session(&self, peer: SocketAddr) -> Box<dyn Session> {
        info!("New session for {}", peer);
        Box::new(SessionLogging::new(self.inner.new_session(peer), peer))
    }
}

/// Logs every call on the wrapped session with the peer address
pub struct SessionLogging {
    inner: Box<dyn Session>,
    peer: SocketAddr,
}

impl SessionLogging {
    pub fn new(inner: Box<dyn Session>, peer: SocketAddr) -> Self {
        Self { inner, peer }
    }
}

fn log_result(peer: SocketAddr, op: &str, arg: &str, result: &SmtpResult) {
    match result {
        Ok(()) => debug!("[{}] {} {}: ok", peer, op, arg),
        Err(e) => error!("[{}] {} {}: {}", peer, op, arg, e),
    }
}

#[async_trait]
impl Session for SessionLogging {
    fn mail(&mut self, from: &str) -> SmtpResult {
        let result = self.inner.mail(from);
        log_result(self.peer, "MAIL", from, &result);
        result
    }

    fn rcpt(&mut self, to: &str) -> SmtpResult {
        let result = self.inner.rcpt(to);
        log_result(self.peer, "RCPT", to, &result);
        result
    }

    async fn data(&mut self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> SmtpResult {
        let result = self.inner.data(reader).await;
        log_result(self.peer, "DATA", "", &result);
        result
    }

    fn reset(&mut self) {
        debug!("[{}] RSET", self.peer);
        self.inner.reset();
    }

    fn logout(&mut self) {
        info!("[{}] Session closed", self.peer);
        self.inner.logout();
    }
}
