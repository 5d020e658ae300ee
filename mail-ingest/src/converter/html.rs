//! HTML handling: original-link recovery, query stripping and sanitization

use crate::config::HtmlConfig;
use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::OnceLock;

/// Where a newsletter provider puts the link to the original post
struct LinkRule {
    selector: &'static str,
    truncate_query: bool,
}

/// Checked in order; the first rule with a usable href wins
const LINK_RULES: &[LinkRule] = &[
    // substack "view original" button
    LinkRule {
        selector: "a.email-button-outline",
        truncate_query: true,
    },
    // quora answer digest
    LinkRule {
        selector: "td.answer_details a",
        truncate_query: false,
    },
];

/// Removed together with everything inside them
const DROPPED_WITH_CONTENT: &[&str] = &[
    "script", "style", "head", "title", "noscript", "template", "iframe", "object", "embed",
    "svg", "math",
];

const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "wbr"];

const URL_ATTRIBUTES: &[&str] = &["href", "src"];

static LINK_SELECTORS: OnceLock<Vec<(Selector, bool)>> = OnceLock::new();
static HREF_QUERY: OnceLock<Regex> = OnceLock::new();

fn link_selectors() -> &'static [(Selector, bool)] {
    LINK_SELECTORS.get_or_init(|| {
        LINK_RULES
            .iter()
            .filter_map(|rule| {
                Selector::parse(rule.selector)
                    .ok()
                    .map(|s| (s, rule.truncate_query))
            })
            .collect()
    })
}

fn href_query_regex() -> &'static Regex {
    HREF_QUERY.get_or_init(|| {
        Regex::new(
            r#"(?i)(\bhref\s*=\s*)(?:"([^"?]*)\?[^"]*"|'([^'?]*)\?[^']*'|([^\s"'>?]+)\?[^\s>]*)"#,
        )
        .expect("valid href pattern")
    })
}

/// Best-effort recovery of the original post URL from known newsletter
/// layouts
pub fn find_object_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for (selector, truncate_query) in link_selectors() {
        let href = document
            .select(selector)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty());
        if let Some(href) = href {
            let url = if *truncate_query {
                strip_query(href)
            } else {
                href
            };
            return Some(url.to_string());
        }
    }
    None
}

fn strip_query(url: &str) -> &str {
    match url.find('?') {
        Some(pos) if pos > 0 => &url[..pos],
        _ => url,
    }
}

/// Drop query strings from every `href`, keeping the link itself
pub fn strip_href_queries(html: &str) -> String {
    href_query_regex()
        .replace_all(html, |caps: &Captures| {
            let url = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");
            format!("{}\"{}\"", &caps[1], url)
        })
        .into_owned()
}

/// Tag/attribute allow-list sanitizer
#[derive(Debug, Clone, Default)]
pub struct HtmlPolicy {
    allowed_tags: HashSet<String>,
    allowed_attributes: HashSet<String>,
    allowed_url_schemes: HashSet<String>,
}

impl HtmlPolicy {
    pub fn new<T, A, U>(tags: T, attributes: A, url_schemes: U) -> Self
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
        U: IntoIterator,
        U::Item: AsRef<str>,
    {
        Self {
            allowed_tags: lowercase_set(tags),
            allowed_attributes: lowercase_set(attributes),
            allowed_url_schemes: lowercase_set(url_schemes),
        }
    }

    /// A policy that keeps text only
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn from_config(config: &HtmlConfig) -> Self {
        Self::new(
            &config.allowed_tags,
            &config.allowed_attributes,
            &config.allowed_url_schemes,
        )
    }

    pub fn sanitize(&self, html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let mut out = String::with_capacity(html.len());
        self.write_children(fragment.root_element(), &mut out);
        out
    }

    fn write_children(&self, element: ElementRef<'_>, out: &mut String) {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                out.push_str(&escape_text(text));
            } else if let Some(child) = ElementRef::wrap(child) {
                self.write_element(child, out);
            }
        }
    }

    fn write_element(&self, element: ElementRef<'_>, out: &mut String) {
        let name = element.value().name();
        if DROPPED_WITH_CONTENT.contains(&name) {
            return;
        }
        if !self.allowed_tags.contains(name) {
            // unwrap: keep the content, lose the tag
            self.write_children(element, out);
            return;
        }

        out.push('<');
        out.push_str(name);
        for (attr, value) in element.value().attrs() {
            let attr = attr.to_lowercase();
            if !self.allowed_attributes.contains(&attr) {
                continue;
            }
            if URL_ATTRIBUTES.contains(&attr.as_str()) && !self.is_allowed_url(value) {
                continue;
            }
            let _ = write!(out, " {}=\"{}\"", attr, escape_attr(value));
        }
        out.push('>');

        if VOID_ELEMENTS.contains(&name) {
            return;
        }
        self.write_children(element, out);
        let _ = write!(out, "</{}>", name);
    }

    fn is_allowed_url(&self, url: &str) -> bool {
        let url = url.trim();
        let scheme_end = url.find(':');
        let path_start = url.find(['/', '?', '#']);
        match (scheme_end, path_start) {
            (Some(colon), Some(path)) if path < colon => true,
            (Some(colon), _) => self
                .allowed_url_schemes
                .contains(&url[..colon].to_lowercase()),
            // relative
            (None, _) => true,
        }
    }
}

fn lowercase_set<I>(items: I) -> HashSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(input: &str) -> String {
    escape_text(input).replace('"', "&quot;")
}
