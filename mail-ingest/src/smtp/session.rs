//! Per-connection SMTP transaction state
//!
//! A [`Session`] sees one transaction at a time: `mail`, any number of
//! `rcpt`, then `data`. `reset` returns it to idle and may be called in any
//! state.

use crate::converter::Converter;
use crate::dispatch::Dispatcher;
use crate::error::{GatewayError, SmtpError};
use crate::recipient::{local_part, Classification, RecipientPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

pub type SmtpResult<T = ()> = std::result::Result<T, SmtpError>;

#[async_trait]
pub trait Session: Send + Sync {
    fn mail(&mut self, from: &str) -> SmtpResult;

    fn rcpt(&mut self, to: &str) -> SmtpResult;

    /// Consume the message body. Only called once the full body arrived.
    async fn data(&mut self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> SmtpResult;

    fn reset(&mut self);

    fn logout(&mut self);
}

/// Collaborators shared by every session of a backend
#[derive(Clone)]
pub struct SessionContext {
    pub policy: Arc<RecipientPolicy>,
    pub converter: Arc<dyn Converter>,
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Routing group events are written under
    pub group: String,
    /// Byte cap on the body handed to the converter
    pub data_limit: usize,
}

/// Classifies recipients, converts accepted messages and dispatches the
/// resulting events
pub struct GatewaySession {
    ctx: SessionContext,
    from: String,
    classification: Classification,
}

impl GatewaySession {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            from: String::new(),
            classification: Classification::default(),
        }
    }

    pub fn sender(&self) -> &str {
        &self.from
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }
}

#[async_trait]
impl Session for GatewaySession {
    fn mail(&mut self, from: &str) -> SmtpResult {
        self.from = from.to_string();
        Ok(())
    }

    fn rcpt(&mut self, to: &str) -> SmtpResult {
        if local_part(to).is_none() {
            // Neither accepted nor rejected: it just authorizes nothing
            warn!("Ignoring malformed recipient address {:?}", to);
            return Ok(());
        }
        let classification = self.ctx.policy.classify(to);
        debug!(
            "Recipient {} classified public={} internal={}",
            to, classification.public, classification.internal
        );
        self.classification.merge(classification);
        Ok(())
    }

    async fn data(&mut self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> SmtpResult {
        if !self.classification.is_allowed() {
            return Err(SmtpError::recipient_rejected());
        }

        let mut raw = Vec::new();
        (&mut *reader)
            .take(self.ctx.data_limit as u64)
            .read_to_end(&mut raw)
            .await
            .map_err(|e| SmtpError::from(GatewayError::from(e)))?;

        let event = self
            .ctx
            .converter
            .convert(&raw, &self.from, self.classification.internal)?;

        let user_id = event.source.clone();
        self.ctx
            .dispatcher
            .write(event, &self.ctx.group, &user_id)
            .await?;
        Ok(())
    }

    fn reset(&mut self) {
        self.from.clear();
        self.classification = Classification::default();
    }

    fn logout(&mut self) {
        self.reset();
    }
}
