//! Request header and method policy for script-issued requests
//!
//! Pure lookup tables: scripts may not set forbidden headers or use
//! forbidden methods. Rejections are policy decisions, not errors.

/// Header names a script is never allowed to set (lower-case)
const FORBIDDEN_HEADERS: &[&str] = &[
    "accept-charset",
    "accept-encoding",
    "connection",
    "content-length",
    "cookie",
    "cookie2",
    "content-transfer-encoding",
    "date",
    "expect",
    "host",
    "keep-alive",
    "referer",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "user-agent",
    "via",
];

/// Any header starting with one of these prefixes is forbidden
const FORBIDDEN_PREFIXES: &[&str] = &["proxy-", "sec-"];

/// Methods that can never be issued from script
const FORBIDDEN_METHODS: &[&str] = &["CONNECT", "TRACE", "TRACK"];

/// Methods whose casing is normalized to upper-case
const NORMALIZED_METHODS: &[&str] = &["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT"];

/// Response headers hidden from script
const FORBIDDEN_RESPONSE_HEADERS: &[&str] = &["set-cookie", "set-cookie2"];

/// Stateless header/method policy
pub struct HeaderPolicy;

impl HeaderPolicy {
    /// Check whether a script may set the given request header
    pub fn is_authorized_header(name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        if FORBIDDEN_HEADERS.contains(&lower.as_str()) {
            return false;
        }
        !FORBIDDEN_PREFIXES
            .iter()
            .any(|prefix| lower.starts_with(prefix))
    }

    /// Check whether a method is forbidden (case-insensitive)
    pub fn is_forbidden_method(method: &str) -> bool {
        FORBIDDEN_METHODS
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Upper-case the standard verbs, leave extension methods untouched
    pub fn normalize_method(method: &str) -> String {
        NORMALIZED_METHODS
            .iter()
            .find(|m| m.eq_ignore_ascii_case(method))
            .map(|m| m.to_string())
            .unwrap_or_else(|| method.to_string())
    }

    /// Check whether a response header may be exposed to script
    pub fn is_exposed_response_header(name: &str) -> bool {
        !FORBIDDEN_RESPONSE_HEADERS
            .iter()
            .any(|h| h.eq_ignore_ascii_case(name))
    }

    /// RFC 7230 token check, used for methods and header names
    pub fn is_valid_token(value: &str) -> bool {
        !value.is_empty() && value.bytes().all(is_token_byte)
    }

    /// Header values may not contain NUL, CR or LF
    pub fn is_valid_header_value(value: &str) -> bool {
        !value.bytes().any(|b| matches!(b, b'\0' | b'\r' | b'\n'))
    }

    /// Strip leading and trailing HTTP whitespace (SP, HTAB, CR, LF)
    pub fn normalize_header_value(value: &str) -> &str {
        value.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}
