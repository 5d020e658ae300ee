use mail_parser::{Header, HeaderValue, MessageParser, MessagePart, MimeHeaders, PartType};
use std::borrow::Cow;
use tracing::debug;

use super::types::{MimePart, ParsedEmail};
use crate::error::{GatewayError, Result};

/// MIME message parser
pub struct MimeParser;

impl MimeParser {
    /// Parse a raw email message into structured parts
    ///
    /// Transfer encodings, charsets and encoded words are decoded by
    /// `mail_parser`. Damaged headers and multiparts without a boundary are
    /// tolerated; only input with no message at all is an error.
    pub fn parse(message: &[u8]) -> Result<ParsedEmail> {
        if message.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(GatewayError::parse("empty message"));
        }

        let parsed = MessageParser::default()
            .parse(message)
            .ok_or_else(|| GatewayError::parse("unreadable message"))?;

        let headers: Vec<(String, String)> = parsed
            .headers()
            .iter()
            .map(|header| {
                (
                    header.name.as_str().to_string(),
                    header_value(message, header),
                )
            })
            .collect();
        if headers.is_empty() {
            return Err(GatewayError::parse("message has no headers"));
        }

        let mut email = ParsedEmail::new();
        email.headers = headers;
        for part in &parsed.parts {
            Self::classify_part(&mut email, part);
        }
        Ok(email)
    }

    fn classify_part(email: &mut ParsedEmail, part: &MessagePart<'_>) {
        if matches!(part.body, PartType::Multipart(_)) {
            return;
        }

        let content_type = content_type(part);
        let disposition = part
            .content_disposition()
            .map(|d| d.ctype().to_ascii_lowercase());
        let is_attachment = disposition.as_deref() == Some("attachment");

        if !is_attachment {
            if let Some(text) = body_text(part, &content_type) {
                if email.text_body.is_none() {
                    email.text_body = Some(text.into_owned());
                    return;
                }
            }
            if let PartType::Html(html) = &part.body {
                if email.html_body.is_none() {
                    email.html_body = Some(html.to_string());
                    return;
                }
            }
        }

        let is_text = content_type.starts_with("text/");
        let mime_part = MimePart {
            content_type,
            content_id: part.content_id().map(|id| id.trim().to_string()),
            filename: part.attachment_name().map(str::to_string),
            body: part.contents().to_vec(),
        };

        if is_attachment {
            email.attachments.push(mime_part);
        } else if disposition.as_deref() == Some("inline")
            || (mime_part.content_id.is_some() && !is_text)
        {
            email.inlines.push(mime_part);
        } else {
            email.other_parts.push(mime_part);
        }
    }
}

/// `type/subtype` of a part, lowercase; a part without one is plain text
fn content_type(part: &MessagePart<'_>) -> String {
    match part.content_type() {
        Some(ct) => match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype).to_ascii_lowercase(),
            None => ct.ctype().to_ascii_lowercase(),
        },
        None => "text/plain".to_string(),
    }
}

/// Plain text carried by a part, if it is a plain text body candidate
///
/// A multipart without a boundary cannot be split, so its body is read as
/// a single text part.
fn body_text<'a>(part: &'a MessagePart<'_>, content_type: &str) -> Option<Cow<'a, str>> {
    let multipart = content_type.starts_with("multipart/");
    match &part.body {
        PartType::Text(text) if content_type == "text/plain" || multipart => {
            Some(Cow::Borrowed(text.as_ref()))
        }
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) if multipart => {
            debug!("Multipart body without boundary, reading it as text");
            Some(String::from_utf8_lossy(bytes))
        }
        _ => None,
    }
}

/// Header value as text
///
/// Unstructured values come decoded from the parser. Structured ones
/// (addresses, dates, content types) keep their raw form, unfolded, so
/// the converter sees what the sender wrote.
fn header_value(raw: &[u8], header: &Header<'_>) -> String {
    match &header.value {
        HeaderValue::Text(text) => text.trim().to_string(),
        HeaderValue::TextList(list) => list
            .iter()
            .map(|t| t.trim())
            .collect::<Vec<_>>()
            .join(", "),
        _ => {
            let bytes = raw
                .get(header.offset_start as usize..header.offset_end as usize)
                .unwrap_or_default();
            unfold(&String::from_utf8_lossy(bytes))
        }
    }
}

fn unfold(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
