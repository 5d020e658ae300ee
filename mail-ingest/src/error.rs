use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SMTP protocol error: {0}")]
    SmtpProtocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TLS error: {0}")]
    Tls(String),

    /// Malformed MIME or a missing mandatory field. Never retried.
    #[error("failed to parse message: {0}")]
    Parse(String),

    /// No recipient of the transaction matched the recipient policy.
    #[error("recipient rejected")]
    RecipientRejected,

    /// Opaque failure reported by the dispatch gateway.
    #[error("failed to write event: {0}")]
    Dispatch(String),
}

impl GatewayError {
    pub fn parse(detail: impl fmt::Display) -> Self {
        GatewayError::Parse(detail.to_string())
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, GatewayError::Parse(_))
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(e: config::ConfigError) -> Self {
        GatewayError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Reply surfaced to the SMTP client when a session operation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpError {
    pub code: u16,
    pub enhanced: (u8, u8, u8),
    pub message: String,
}

impl SmtpError {
    pub fn new(code: u16, enhanced: (u8, u8, u8), message: impl Into<String>) -> Self {
        Self {
            code,
            enhanced,
            message: message.into(),
        }
    }

    pub fn recipient_rejected() -> Self {
        Self::new(550, (5, 1, 1), "recipient rejected")
    }

    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::new(554, (5, 3, 0), message)
    }

    pub fn is_permanent(&self) -> bool {
        self.code >= 500
    }

    /// Render as a single CRLF-terminated reply line
    pub fn to_reply(&self) -> String {
        format!("{}\r\n", self)
    }
}

impl fmt::Display for SmtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b, c) = self.enhanced;
        // Reply text must stay on one line
        let message = self.message.replace(['\r', '\n'], " ");
        write!(f, "{} {}.{}.{} {}", self.code, a, b, c, message)
    }
}

impl std::error::Error for SmtpError {}

impl From<GatewayError> for SmtpError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::RecipientRejected => SmtpError::recipient_rejected(),
            other => SmtpError::transaction_failed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_rejected_reply() {
        let err = SmtpError::from(GatewayError::RecipientRejected);
        assert_eq!(err.code, 550);
        assert_eq!(err.enhanced, (5, 1, 1));
        assert_eq!(err.to_reply(), "550 5.1.1 recipient rejected\r\n");
    }

    #[test]
    fn test_parse_error_reply_carries_detail() {
        let err = SmtpError::from(GatewayError::parse("no text data"));
        assert_eq!(err.code, 554);
        assert_eq!(err.enhanced, (5, 3, 0));
        assert_eq!(err.message, "failed to parse message: no text data");
        assert!(err.is_permanent());
    }

    #[test]
    fn test_dispatch_error_reply() {
        let err = SmtpError::from(GatewayError::Dispatch("503 Service Unavailable".to_string()));
        assert_eq!(
            err.to_string(),
            "554 5.3.0 failed to write event: 503 Service Unavailable"
        );
    }

    #[test]
    fn test_reply_is_single_line() {
        let err = SmtpError::transaction_failed("line one\r\nline two");
        assert_eq!(err.to_reply(), "554 5.3.0 line one  line two\r\n");
    }
}
