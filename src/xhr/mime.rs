//! MIME type parsing
//!
//! Just enough of the MIME Sniffing standard's parser to pick document
//! parsers and charset parameters out of `Content-Type` values.

use std::fmt;

use crate::security::HeaderPolicy;

/// A parsed MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType {
    /// Top-level type, lower-cased
    pub top_level: String,
    /// Subtype, lower-cased
    pub subtype: String,
    /// Parameters in order; names lower-cased, values unquoted
    pub parameters: Vec<(String, String)>,
}

impl MimeType {
    /// Parse a MIME type, returning `None` for anything malformed
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let (essence, rest) = match input.find(';') {
            Some(idx) => (&input[..idx], &input[idx + 1..]),
            None => (input, ""),
        };

        let (top_level, subtype) = essence.trim().split_once('/')?;
        let top_level = top_level.trim();
        let subtype = subtype.trim();
        if !HeaderPolicy::is_valid_token(top_level) || !HeaderPolicy::is_valid_token(subtype) {
            return None;
        }

        Some(Self {
            top_level: top_level.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parameters: parse_parameters(rest),
        })
    }

    /// `type/subtype`
    pub fn essence(&self) -> String {
        format!("{}/{}", self.top_level, self.subtype)
    }

    /// Look up a parameter by case-insensitive name
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `charset` parameter; an empty value counts as absent
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// `text/xml`, `application/xml` or any `+xml` subtype
    pub fn is_xml(&self) -> bool {
        matches!(
            (self.top_level.as_str(), self.subtype.as_str()),
            ("text", "xml") | ("application", "xml")
        ) || self.subtype.ends_with("+xml")
    }

    /// `text/html`
    pub fn is_html(&self) -> bool {
        self.top_level == "text" && self.subtype == "html"
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.top_level, self.subtype)?;
        for (name, value) in &self.parameters {
            if !value.is_empty() && HeaderPolicy::is_valid_token(value) {
                write!(f, ";{}={}", name, value)?;
            } else {
                write!(f, ";{}=\"{}\"", name, value.replace('\\', "\\\\").replace('"', "\\\""))?;
            }
        }
        Ok(())
    }
}

fn parse_parameters(input: &str) -> Vec<(String, String)> {
    let mut parameters: Vec<(String, String)> = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ';') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == ';' || c == '=' {
                break;
            }
            name.push(c);
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        _ => value.push(c),
                    }
                }
                while chars.peek().is_some_and(|c| *c != ';') {
                    chars.next();
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ';' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value = value.trim().to_string();
            }
        }

        let name = name.trim().to_ascii_lowercase();
        if !HeaderPolicy::is_valid_token(&name) {
            continue;
        }
        if !parameters.iter().any(|(n, _)| *n == name) {
            parameters.push((name, value));
        }
    }

    parameters
}
