/// A non-body MIME part (attachment, inline resource or anything else)
#[derive(Debug, Clone)]
pub struct MimePart {
    /// Content-Type header value, without parameters
    pub content_type: String,
    /// Content-ID without angle brackets
    pub content_id: Option<String>,
    /// Filename from Content-Disposition or Content-Type
    pub filename: Option<String>,
    /// Decoded body
    pub body: Vec<u8>,
}

impl Default for MimePart {
    fn default() -> Self {
        MimePart {
            content_type: "application/octet-stream".to_string(),
            content_id: None,
            filename: None,
            body: Vec::new(),
        }
    }
}

/// Parsed email with separated parts
#[derive(Debug, Clone, Default)]
pub struct ParsedEmail {
    /// Top-level headers in message order, names as written
    pub headers: Vec<(String, String)>,
    /// Plain text body (if present)
    pub text_body: Option<String>,
    /// HTML body (if present)
    pub html_body: Option<String>,
    /// Parts with `Content-Disposition: attachment`
    pub attachments: Vec<MimePart>,
    /// Inline resources (e.g. images referenced by Content-ID)
    pub inlines: Vec<MimePart>,
    /// Everything else that is neither body nor attachment
    pub other_parts: Vec<MimePart>,
}

impl ParsedEmail {
    pub fn new() -> Self {
        ParsedEmail::default()
    }

    /// Distinct header names in order of first appearance, each with its
    /// first value
    pub fn unique_headers(&self) -> Vec<(&str, &str)> {
        let mut seen: Vec<&str> = Vec::new();
        let mut out = Vec::new();
        for (k, v) in &self.headers {
            if seen.iter().any(|s| s.eq_ignore_ascii_case(k)) {
                continue;
            }
            seen.push(k);
            out.push((k.as_str(), v.as_str()));
        }
        out
    }

    /// Attachments, then inlines, then other parts
    pub fn non_body_parts(&self) -> impl Iterator<Item = &MimePart> {
        self.attachments
            .iter()
            .chain(self.inlines.iter())
            .chain(self.other_parts.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_part_default() {
        let part = MimePart::default();
        assert_eq!(part.content_type, "application/octet-stream");
        assert!(part.content_id.is_none());
        assert!(part.filename.is_none());
    }

    #[test]
    fn test_unique_headers_keep_first_value() {
        let email = ParsedEmail {
            headers: vec![
                ("Received".to_string(), "from a".to_string()),
                ("Subject".to_string(), "Hello".to_string()),
                ("received".to_string(), "from b".to_string()),
            ],
            ..Default::default()
        };
        assert_eq!(
            email.unique_headers(),
            vec![("Received", "from a"), ("Subject", "Hello")]
        );
    }

    #[test]
    fn test_non_body_parts_order() {
        let mut email = ParsedEmail::new();
        email.other_parts.push(MimePart {
            filename: Some("c".to_string()),
            ..Default::default()
        });
        email.attachments.push(MimePart {
            filename: Some("a".to_string()),
            ..Default::default()
        });
        email.inlines.push(MimePart {
            filename: Some("b".to_string()),
            ..Default::default()
        });
        let names: Vec<_> = email
            .non_body_parts()
            .map(|p| p.filename.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
