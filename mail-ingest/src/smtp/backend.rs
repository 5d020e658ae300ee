use super::session::{GatewaySession, Session, SessionContext};
use crate::config::Config;
use crate::converter::Converter;
use crate::dispatch::Dispatcher;
use crate::recipient::RecipientPolicy;
use std::net::SocketAddr;
use std::sync::Arc;

/// Creates one [`Session`] per accepted connection
pub trait Backend: Send + Sync {
    fn new_session(&self, peer: SocketAddr) -> Box<dyn Session>;
}

pub struct GatewayBackend {
    ctx: SessionContext,
}

impl GatewayBackend {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    pub fn from_config(
        config: &Config,
        policy: Arc<RecipientPolicy>,
        converter: Arc<dyn Converter>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self::new(SessionContext {
            policy,
            converter,
            dispatcher,
            group: config.dispatch.group.clone(),
            data_limit: config.smtp.data_limit,
        })
    }
}

impl Backend for GatewayBackend {
    fn new_session(&self, _peer: SocketAddr) -> Box<dyn Session> {
        Box::new(GatewaySession::new(self.ctx.clone()))
    }
}
