//! Gateway configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `MAIL_INGEST__`-prefixed environment variables
//! (e.g. `MAIL_INGEST__SMTP__RECIPIENTS__PUBLIC=publish,news`).

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "MAIL_INGEST";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub smtp: SmtpConfig,
    pub dispatch: DispatchConfig,
    pub event: EventConfig,
    pub html: HtmlConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub hostname: String,
    pub listen_addr: String,
    /// Byte cap applied to every message body
    pub data_limit: usize,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub recipients: RecipientsConfig,
    pub tls: SmtpTlsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecipientsConfig {
    pub public: Vec<String>,
    pub internal: Vec<String>,
    /// Maximum RCPT commands per transaction
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    None,
    Starttls,
    Implicit,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpTlsConfig {
    pub mode: TlsMode,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    /// Refuse MAIL until the transport is secured
    pub require: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    pub uri: String,
    pub group: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventConfig {
    pub event_type: String,
    pub internal: InternalMarkerConfig,
}

/// Attribute stamped on events received through an internal recipient
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct InternalMarkerConfig {
    pub name: String,
    pub value: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HtmlConfig {
    pub allowed_tags: Vec<String>,
    pub allowed_attributes: Vec<String>,
    pub allowed_url_schemes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl SmtpConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            smtp: SmtpConfig {
                hostname: "mail.localhost".to_string(),
                listen_addr: "0.0.0.0:2525".to_string(),
                data_limit: 1024 * 1024, // 1MB
                read_timeout_secs: 60,
                write_timeout_secs: 60,
                recipients: RecipientsConfig {
                    public: Vec::new(),
                    internal: Vec::new(),
                    limit: 100,
                },
                tls: SmtpTlsConfig {
                    mode: TlsMode::None,
                    cert_path: None,
                    key_path: None,
                    require: false,
                },
            },
            dispatch: DispatchConfig {
                uri: "http://127.0.0.1:8080/v1/events".to_string(),
                group: "default".to_string(),
                timeout_secs: 30,
            },
            event: EventConfig {
                event_type: "com_mail_ingest_v1".to_string(),
                internal: InternalMarkerConfig {
                    name: "ingestinternal".to_string(),
                    value: 0,
                },
            },
            html: HtmlConfig {
                allowed_tags: [
                    "a", "b", "blockquote", "br", "code", "em", "h1", "h2", "h3", "h4", "h5",
                    "h6", "hr", "i", "img", "li", "ol", "p", "pre", "strong", "table", "tbody",
                    "td", "th", "thead", "tr", "u", "ul",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                allowed_attributes: ["alt", "href", "src", "title"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                allowed_url_schemes: ["http", "https", "mailto"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Config {
    /// Load defaults, then the optional file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(GatewayError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("smtp.recipients.public")
                .with_list_parse_key("smtp.recipients.internal")
                .with_list_parse_key("html.allowed_tags")
                .with_list_parse_key("html.allowed_attributes")
                .with_list_parse_key("html.allowed_url_schemes"),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.smtp.data_limit == 0 {
            return Err(GatewayError::Config("smtp.data_limit must be positive".to_string()));
        }
        if self.smtp.recipients.limit == 0 {
            return Err(GatewayError::Config(
                "smtp.recipients.limit must be positive".to_string(),
            ));
        }
        if self.smtp.tls.mode != TlsMode::None
            && (self.smtp.tls.cert_path.is_none() || self.smtp.tls.key_path.is_none())
        {
            return Err(GatewayError::Config(
                "smtp.tls.cert_path and smtp.tls.key_path are required when TLS is enabled"
                    .to_string(),
            ));
        }
        if self.smtp.tls.require && self.smtp.tls.mode == TlsMode::None {
            return Err(GatewayError::Config(
                "smtp.tls.require needs a TLS mode".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.group, "default");
        assert_eq!(config.smtp.recipients.limit, 100);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[smtp]
hostname = "mx.example.com"
data_limit = 2048

[smtp.recipients]
public = ["Publish", "news"]
internal = ["ops"]

[event.internal]
name = "chan"
value = 123
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.smtp.hostname, "mx.example.com");
        assert_eq!(config.smtp.data_limit, 2048);
        assert_eq!(config.smtp.recipients.public, vec!["Publish", "news"]);
        assert_eq!(config.smtp.recipients.internal, vec!["ops"]);
        assert_eq!(
            config.event.internal,
            InternalMarkerConfig {
                name: "chan".to_string(),
                value: 123
            }
        );
        // untouched sections keep their defaults
        assert_eq!(config.smtp.recipients.limit, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/mail-ingest.toml")));
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_tls_mode_requires_certificates() {
        let mut config = Config::default();
        config.smtp.tls.mode = TlsMode::Implicit;
        assert!(config.validate().is_err());

        config.smtp.tls.cert_path = Some("/etc/tls/tls.crt".to_string());
        config.smtp.tls.key_path = Some("/etc/tls/tls.key".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_data_limit_rejected() {
        let mut config = Config::default();
        config.smtp.data_limit = 0;
        assert!(config.validate().is_err());
    }
}
