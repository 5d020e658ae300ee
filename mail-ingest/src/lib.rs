//! mail-ingest: inbound SMTP gateway publishing email as events
//!
//! Accepts mail over SMTP, decides per recipient whether a message is
//! published, routed internally or rejected, and turns accepted messages
//! into CloudEvents handed to a dispatch gateway.
//!
//! # Flow
//!
//! - [`smtp`]: the SMTP surface; each transaction is classified by its
//!   recipients' local-parts against the [`recipient`] policy
//! - [`converter`]: MIME message to canonical [`event::Event`]
//! - [`dispatch`]: hands the event to the event platform
//!
//! # Example
//!
//! ```no_run
//! use mail_ingest::config::Config;
//! use mail_ingest::converter::MimeConverter;
//! use mail_ingest::dispatch::HttpDispatcher;
//! use mail_ingest::recipient::RecipientPolicy;
//! use mail_ingest::smtp::{GatewayBackend, SmtpServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let policy = Arc::new(RecipientPolicy::new(
//!         &config.smtp.recipients.public,
//!         &config.smtp.recipients.internal,
//!     ));
//!     let converter = Arc::new(MimeConverter::from_config(&config, &policy)?);
//!     let dispatcher = Arc::new(HttpDispatcher::new(
//!         config.dispatch.uri.clone(),
//!         config.dispatch.timeout(),
//!     )?);
//!     let backend = Arc::new(GatewayBackend::from_config(&config, policy, converter, dispatcher));
//!
//!     SmtpServer::new(&config.smtp, backend).run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod converter;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod mime;
pub mod recipient;
pub mod smtp;

// Re-export commonly used types
pub use config::Config;
pub use error::{GatewayError, Result, SmtpError};
pub use event::Event;
