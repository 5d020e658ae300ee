//! SMTP surface of the gateway (RFC 5321)
//!
//! - [`server`]: TCP accept loop, one task per connection
//! - [`connection`]: command sequencing and wire replies
//! - [`session`]: per-transaction recipient classification and hand-off
//! - [`backend`]: session factory shared by all connections
//! - [`commands`]: SMTP command parsing
//! - [`tls`]: certificate loading for STARTTLS and implicit TLS

pub mod backend;
pub mod commands;
pub mod connection;
pub mod logging;
pub mod server;
pub mod session;
pub mod tls;

pub use backend::{Backend, GatewayBackend};
pub use commands::SmtpCommand;
pub use connection::{Connection, ConnectionConfig, SmtpStream};
pub use logging::{BackendLogging, SessionLogging};
pub use server::SmtpServer;
pub use session::{GatewaySession, Session, SessionContext, SmtpResult};
pub use tls::TlsConfig;
