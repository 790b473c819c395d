//! Document parsing for `responseXML`
//!
//! Response bodies are decoded with the resolved charset and handed to either
//! the XML parser (quick-xml) or the HTML parser (html5ever).

mod dom;
pub mod html;
pub mod xml;

pub use dom::{Document, DocumentKind, ElementData, Node, NodeType};
pub use html::HtmlParser;
pub use xml::XmlParser;

use encoding_rs::Encoding;

use crate::utils::ParseError;

/// Trait for document parsers
#[cfg_attr(test, mockall::automock)]
pub trait DocumentParser {
    /// Parse an XML-family body
    fn parse_xml(&self, bytes: &[u8], encoding: &'static Encoding) -> Result<Document, ParseError>;

    /// Parse a `text/html` body
    fn parse_html(&self, bytes: &[u8], encoding: &'static Encoding)
    -> Result<Document, ParseError>;
}

/// Default parser backed by quick-xml and html5ever
#[derive(Default)]
pub struct DefaultDocumentParser {
    xml_parser: XmlParser,
    html_parser: HtmlParser,
}

impl DefaultDocumentParser {
    /// Create a new document parser
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentParser for DefaultDocumentParser {
    fn parse_xml(&self, bytes: &[u8], encoding: &'static Encoding) -> Result<Document, ParseError> {
        let (text, _, _) = encoding.decode(bytes);
        self.xml_parser.parse(&text)
    }

    fn parse_html(
        &self,
        bytes: &[u8],
        encoding: &'static Encoding,
    ) -> Result<Document, ParseError> {
        let (text, _, _) = encoding.decode(bytes);
        self.html_parser.parse(&text)
    }
}
