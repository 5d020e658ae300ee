//! Recipient classification
//!
//! A recipient authorizes processing when its local-part (everything before
//! the last `@`) matches one of the configured name sets, case-insensitively.

use std::collections::HashSet;

/// Which policy buckets the recipients of a transaction matched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub public: bool,
    pub internal: bool,
}

impl Classification {
    /// Monotonic OR: a flag once set stays set
    pub fn merge(&mut self, other: Classification) {
        self.public |= other.public;
        self.internal |= other.internal;
    }

    pub fn is_allowed(&self) -> bool {
        self.public || self.internal
    }
}

/// Immutable recipient name sets, shared read-only by every session
#[derive(Debug, Clone, Default)]
pub struct RecipientPolicy {
    public: HashSet<String>,
    internal: HashSet<String>,
}

impl RecipientPolicy {
    pub fn new<P, I>(public: P, internal: I) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            public: normalize(public),
            internal: normalize(internal),
        }
    }

    pub fn classify(&self, addr: &str) -> Classification {
        match local_part(addr) {
            Some(name) => {
                let name = name.to_lowercase();
                Classification {
                    public: self.public.contains(&name),
                    internal: self.internal.contains(&name),
                }
            }
            None => Classification::default(),
        }
    }

    /// Public names, lowercase. These are scrubbed from outgoing text.
    pub fn public_names(&self) -> impl Iterator<Item = &str> {
        self.public.iter().map(String::as_str)
    }
}

fn normalize<T, S>(names: T) -> HashSet<String>
where
    T: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| name.as_ref().trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Portion of the address before the last `@`
pub fn local_part(addr: &str) -> Option<&str> {
    match addr.rfind('@') {
        Some(pos) if pos > 0 => Some(&addr[..pos]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RecipientPolicy {
        RecipientPolicy::new(["Publish", "news"], ["ops"])
    }

    #[test]
    fn test_lists_may_differ_in_item_type() {
        let internal = vec!["OPS".to_string()];
        let p = RecipientPolicy::new(["publish"], &internal);
        assert!(p.classify("ops@gateway").internal);
        assert!(RecipientPolicy::new(["publish"], Vec::<String>::new())
            .classify("publish@gateway")
            .public);
    }

    #[test]
    fn test_local_part() {
        assert_eq!(local_part("publish@gateway"), Some("publish"));
        assert_eq!(local_part("\"odd@name\"@gateway"), Some("\"odd@name\""));
        assert_eq!(local_part("no-at-sign"), None);
        assert_eq!(local_part("@gateway"), None);
    }

    #[test]
    fn test_classify_public() {
        let c = policy().classify("publish@gateway.example.com");
        assert!(c.public);
        assert!(!c.internal);
    }

    #[test]
    fn test_classify_case_insensitive() {
        let p = policy();
        assert!(p.classify("PUBLISH@gateway").public);
        assert!(p.classify("News@gateway").public);
        assert!(p.classify("OPS@gateway").internal);
    }

    #[test]
    fn test_classify_unknown_and_malformed() {
        let p = policy();
        assert_eq!(p.classify("someone@gateway"), Classification::default());
        assert_eq!(p.classify("publish"), Classification::default());
        assert!(!p.classify("").is_allowed());
    }

    #[test]
    fn test_merge_is_monotonic() {
        let p = policy();
        let mut c = Classification::default();
        c.merge(p.classify("publish@gateway"));
        c.merge(p.classify("ops@gateway"));
        c.merge(p.classify("stranger@gateway"));
        assert!(c.public);
        assert!(c.internal);
    }

    #[test]
    fn test_public_names_are_lowercase() {
        let p = policy();
        let mut names: Vec<&str> = p.public_names().collect();
        names.sort();
        assert_eq!(names, vec!["news", "publish"]);
    }
}
