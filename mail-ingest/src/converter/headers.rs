//! Header key canonicalization and the public disclosure allow-list

/// Canonical attribute keys never exceed this many characters
pub const KEY_LEN_MAX: usize = 20;

/// Headers safe to disclose on public events, by canonical key. Anything not
/// listed is dropped unless the message is internal.
const PUBLIC_HEADERS: &[&str] = &[
    "contenttransferencod",
    "contenttype",
    "feedbackid",
    "inreplyto",
    "listhelp",
    "listhelpurl",
    "listid",
    "listowner",
    "listpost",
    "listsubscribe",
    "listunsubscribe",
    "listunsubscribepost",
    "listarchive",
    "mimeversion",
    "precedence",
    "references",
    "sender",
    "xcompanyid",
    "xemailcategory",
    "xfeedbackid",
    "xmailer",
    "xmailguntag",
    "xorganization",
    "xpriority",
    "xreportabuse",
    "xvirusscanned",
];

/// Lowercase, drop hyphens, truncate to [`KEY_LEN_MAX`] characters
pub fn canonical_key(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|&c| c != '-')
        .take(KEY_LEN_MAX)
        .collect()
}

pub fn is_public(canonical: &str) -> bool {
    PUBLIC_HEADERS.contains(&canonical)
}

/// Strip one pair of surrounding angle brackets and any `?query` suffix
pub fn clean_addr(value: &str) -> &str {
    let mut addr = value.trim();
    if let Some(stripped) = addr.strip_prefix('<') {
        addr = stripped.strip_suffix('>').unwrap_or(stripped);
    }
    match addr.find('?') {
        Some(pos) if pos > 0 => &addr[..pos],
        _ => addr,
    }
}

/// Address portion of a `From` value: `John <john@x>` yields `<john@x>`
pub fn bracketed_addr(value: &str) -> &str {
    match value.find('<') {
        Some(pos) if pos > 0 => &value[pos..],
        _ => value,
    }
}
