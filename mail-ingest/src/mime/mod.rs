//! MIME message parsing
//!
//! Splits a raw message into headers, text and HTML bodies, and the
//! remaining attachment, inline and other parts.

pub mod parser;
pub mod types;

pub use parser::MimeParser;
pub use types::{MimePart, ParsedEmail};
