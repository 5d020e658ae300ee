use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum SmtpCommand {
    Helo(String),
    Ehlo(String),
    /// Reverse path and the declared `SIZE=` parameter, if any
    MailFrom(String, Option<usize>),
    RcptTo(String),
    Data,
    Rset,
    Quit,
    Noop,
    Starttls,
    Unknown(String),
}

impl SmtpCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(GatewayError::SmtpProtocol("Empty command".to_string()));
        }

        let (command, args) = match line.split_once(' ') {
            Some((command, args)) => (command.to_uppercase(), args.trim()),
            None => (line.to_uppercase(), ""),
        };

        match command.as_str() {
            "HELO" => {
                if args.is_empty() {
                    return Err(GatewayError::SmtpProtocol("HELO requires domain".to_string()));
                }
                Ok(SmtpCommand::Helo(args.to_string()))
            }
            "EHLO" => {
                if args.is_empty() {
                    return Err(GatewayError::SmtpProtocol("EHLO requires domain".to_string()));
                }
                Ok(SmtpCommand::Ehlo(args.to_string()))
            }
            "MAIL" => {
                let (from, params) = Self::parse_path(args, "FROM:")?;
                let size = Self::parse_size(params)?;
                Ok(SmtpCommand::MailFrom(from, size))
            }
            "RCPT" => {
                let (to, _) = Self::parse_path(args, "TO:")?;
                if to.is_empty() {
                    return Err(GatewayError::SmtpProtocol("Empty forward path".to_string()));
                }
                Ok(SmtpCommand::RcptTo(to))
            }
            "DATA" => Ok(SmtpCommand::Data),
            "RSET" => Ok(SmtpCommand::Rset),
            "QUIT" => Ok(SmtpCommand::Quit),
            "NOOP" => Ok(SmtpCommand::Noop),
            "STARTTLS" => Ok(SmtpCommand::Starttls),
            _ => Ok(SmtpCommand::Unknown(command)),
        }
    }

    /// Split `FROM:<addr> PARAMS` into the address and the trailing
    /// parameters
    fn parse_path<'a>(args: &'a str, keyword: &str) -> Result<(String, &'a str)> {
        let prefix = args.get(..keyword.len()).unwrap_or("");
        if !prefix.eq_ignore_ascii_case(keyword) {
            return Err(GatewayError::SmtpProtocol(format!(
                "Invalid syntax, expected {}<address>",
                keyword
            )));
        }

        let rest = args[keyword.len()..].trim_start();
        if let Some(bracketed) = rest.strip_prefix('<') {
            let end = bracketed
                .find('>')
                .ok_or_else(|| GatewayError::SmtpProtocol("Unterminated address".to_string()))?;
            return Ok((bracketed[..end].trim().to_string(), bracketed[end + 1..].trim()));
        }

        // Some clients omit the brackets
        match rest.split_once(' ') {
            Some((addr, params)) => Ok((addr.to_string(), params.trim())),
            None => Ok((rest.to_string(), "")),
        }
    }

    fn parse_size(params: &str) -> Result<Option<usize>> {
        for param in params.split_whitespace() {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            if key.eq_ignore_ascii_case("SIZE") {
                let size = value
                    .parse::<usize>()
                    .map_err(|_| GatewayError::SmtpProtocol(format!("Invalid SIZE: {}", value)))?;
                return Ok(Some(size));
            }
        }
        Ok(None)
    }
}
