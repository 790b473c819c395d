//! Response body interpretation
//!
//! Turns the buffered body into the values script reads: decoded text,
//! a parsed document, JSON or raw bytes, depending on the effective MIME type
//! and the requested `responseType`.

use std::fmt;

use super::charset::{Charset, CharsetResolver};
use super::mime::MimeType;
use crate::renderer::{Document, DocumentParser};

/// Value of the `responseType` property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// `""`, text with an XML document when the type allows it
    #[default]
    Default,
    Text,
    Document,
    Json,
    ArrayBuffer,
    Blob,
}

impl ResponseType {
    /// Parse the script-facing string, `None` for unknown values
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "" => Some(Self::Default),
            "text" => Some(Self::Text),
            "document" => Some(Self::Document),
            "json" => Some(Self::Json),
            "arraybuffer" => Some(Self::ArrayBuffer),
            "blob" => Some(Self::Blob),
            _ => None,
        }
    }

    /// Script-facing string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "",
            Self::Text => "text",
            Self::Document => "document",
            Self::Json => "json",
            Self::ArrayBuffer => "arraybuffer",
            Self::Blob => "blob",
        }
    }

    /// Whether `responseText` may be read
    pub fn allows_text(&self) -> bool {
        matches!(self, Self::Default | Self::Text)
    }

    /// Whether `responseXML` may be read
    pub fn allows_document(&self) -> bool {
        matches!(self, Self::Default | Self::Document)
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of the `response` property
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValue {
    Text(String),
    Document(Document),
    Json(serde_json::Value),
    /// Body bytes for `arraybuffer` and `blob`
    Bytes(Vec<u8>),
}

/// Interprets one response body
#[derive(Debug, Clone)]
pub struct ResponseInterpreter {
    override_mime: Option<MimeType>,
    content_type: Option<MimeType>,
    response_type: ResponseType,
}

impl ResponseInterpreter {
    /// Create an interpreter from the override MIME type, the raw
    /// `Content-Type` header value and the requested response type
    pub fn new(
        override_mime: Option<MimeType>,
        content_type: Option<&str>,
        response_type: ResponseType,
    ) -> Self {
        Self {
            override_mime,
            content_type: content_type.and_then(MimeType::parse),
            response_type,
        }
    }

    /// Override MIME type if set, else the response `Content-Type`
    pub fn effective_mime(&self) -> Option<&MimeType> {
        self.override_mime.as_ref().or(self.content_type.as_ref())
    }

    /// Charset used for decoding
    pub fn charset(&self) -> Charset {
        CharsetResolver::resolve(self.override_mime.as_ref(), self.content_type.as_ref())
    }

    /// Decode the body; never fails
    pub fn text(&self, body: &[u8]) -> String {
        self.charset().decode(body)
    }

    /// Parse the body into a document when the MIME type and response type
    /// allow it; parse failures yield `None`
    pub fn document(&self, body: &[u8], parser: &dyn DocumentParser) -> Option<Document> {
        let mime = self.effective_mime()?;
        let encoding = self.charset().encoding;

        let parsed = if mime.is_xml() {
            parser.parse_xml(body, encoding)
        } else if mime.is_html() && self.response_type == ResponseType::Document {
            parser.parse_html(body, encoding)
        } else {
            return None;
        };

        match parsed {
            Ok(document) => Some(document),
            Err(e) => {
                log::debug!("Response for {} is not a document: {}", mime.essence(), e);
                None
            }
        }
    }

    /// Parse the body as JSON, `None` when invalid
    pub fn json(&self, body: &[u8]) -> Option<serde_json::Value> {
        let text = self.text(body);
        match serde_json::from_str(text.trim_start_matches('\u{FEFF}')) {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("Response is not valid JSON: {}", e);
                None
            }
        }
    }

    /// The `response` value for the configured response type
    pub fn value(&self, body: &[u8], parser: &dyn DocumentParser) -> Option<ResponseValue> {
        match self.response_type {
            ResponseType::Default | ResponseType::Text => Some(ResponseValue::Text(self.text(body))),
            ResponseType::Document => self.document(body, parser).map(ResponseValue::Document),
            ResponseType::Json => self.json(body).map(ResponseValue::Json),
            ResponseType::ArrayBuffer | ResponseType::Blob => {
                Some(ResponseValue::Bytes(body.to_vec()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{DefaultDocumentParser, MockDocumentParser};
    use crate::utils::ParseError;
    use encoding_rs::GBK;

    const XML: &[u8] = b"<bla someAttr='someValue'><foo><fi id='fi1'/><fi/></foo></bla>\n";

    fn interpreter(content_type: &str, response_type: ResponseType) -> ResponseInterpreter {
        ResponseInterpreter::new(None, Some(content_type), response_type)
    }

    #[test]
    fn test_document_for_xml_family() {
        let parser = DefaultDocumentParser::new();
        for ct in ["text/xml", "application/xml", "application/xhtml+xml", "image/svg+xml"] {
            let doc = interpreter(ct, ResponseType::Default).document(XML, &parser);
            assert!(doc.is_some(), "{ct}");
        }
    }

    #[test]
    fn test_html_needs_document_response_type() {
        let parser = DefaultDocumentParser::new();
        let body = b"<html><body><p>hi</p></body></html>";
        assert!(interpreter("text/html", ResponseType::Default).document(body, &parser).is_none());
        assert!(interpreter("text/html", ResponseType::Document).document(body, &parser).is_some());
    }

    #[test]
    fn test_no_document_for_other_types() {
        let parser = DefaultDocumentParser::new();
        assert!(interpreter("text/plain", ResponseType::Default).document(XML, &parser).is_none());
        let missing = ResponseInterpreter::new(None, None, ResponseType::Default);
        assert!(missing.document(XML, &parser).is_none());
    }

    #[test]
    fn test_override_mime_selects_parser() {
        let parser = DefaultDocumentParser::new();
        let interpreter = ResponseInterpreter::new(
            MimeType::parse("text/xml"),
            Some("text/plain"),
            ResponseType::Default,
        );
        assert_eq!(interpreter.effective_mime().unwrap().essence(), "text/xml");
        assert!(interpreter.document(XML, &parser).is_some());
    }

    #[test]
    fn test_parse_error_yields_none() {
        let mut parser = MockDocumentParser::new();
        parser
            .expect_parse_xml()
            .times(1)
            .returning(|_, _| Err(ParseError::Xml("not well-formed".into())));
        assert!(interpreter("text/xml", ResponseType::Default).document(b"<a>", &parser).is_none());
    }

    #[test]
    fn test_parser_receives_resolved_encoding() {
        let mut parser = MockDocumentParser::new();
        parser
            .expect_parse_xml()
            .withf(|_, encoding| *encoding == *GBK)
            .times(1)
            .returning(|_, _| Ok(Document::new(crate::renderer::DocumentKind::Xml)));
        let interpreter = interpreter("text/xml; charset=gbk", ResponseType::Default);
        assert!(interpreter.document(b"<a/>", &parser).is_some());
    }

    #[test]
    fn test_text_uses_charset() {
        let (bytes, _, _) = GBK.encode("\u{9EC4}");
        let text = interpreter("text/plain; charset=GBK", ResponseType::Default).text(&bytes);
        assert_eq!(text, "\u{9EC4}");
    }

    #[test]
    fn test_json_value() {
        let parser = DefaultDocumentParser::new();
        let interpreter = interpreter("application/json", ResponseType::Json);
        assert_eq!(
            interpreter.value(br#"{"a": [1, 2]}"#, &parser),
            Some(ResponseValue::Json(serde_json::json!({"a": [1, 2]})))
        );
        assert_eq!(interpreter.value(b"{broken", &parser), None);
    }

    #[test]
    fn test_response_type_strings() {
        for value in ["", "text", "document", "json", "arraybuffer", "blob"] {
            assert_eq!(ResponseType::parse(value).unwrap().as_str(), value);
        }
        assert_eq!(ResponseType::parse("moz-chunked-text"), None);
        assert!(ResponseType::Text.allows_text());
        assert!(!ResponseType::Json.allows_document());
    }
}
