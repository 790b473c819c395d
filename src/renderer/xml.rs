//! XML parser building a [`Document`] with quick-xml
//!
//! Well-formedness is enforced: mismatched or unclosed tags, a missing root,
//! several roots or text outside the root element are parse errors.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::dom::{Document, DocumentKind, ElementData, Node, NodeType};
use crate::utils::ParseError;

/// XML parser
#[derive(Debug, Default)]
pub struct XmlParser;

impl XmlParser {
    /// Create a new XML parser
    pub fn new() -> Self {
        Self
    }

    /// Parse an XML document
    pub fn parse(&self, content: &str) -> Result<Document, ParseError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(false);
        reader.config_mut().check_end_names = true;

        let mut document = Document::new(DocumentKind::Xml);
        // Open elements; the document root is implicit below index 0
        let mut stack: Vec<Node> = Vec::new();
        let mut seen_root = false;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| xml_error(&reader, e.to_string()))?;
            match event {
                Event::Start(e) => {
                    if stack.is_empty() && seen_root {
                        return Err(xml_error(&reader, "multiple root elements"));
                    }
                    stack.push(element_from_start(&reader, &e)?);
                }
                Event::Empty(e) => {
                    if stack.is_empty() && seen_root {
                        return Err(xml_error(&reader, "multiple root elements"));
                    }
                    let node = element_from_start(&reader, &e)?;
                    seen_root |= stack.is_empty();
                    append(&mut stack, &mut document, node);
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| xml_error(&reader, "unexpected end tag"))?;
                    seen_root |= stack.is_empty();
                    append(&mut stack, &mut document, node);
                }
                Event::Text(e) => {
                    let text = e
                        .decode()
                        .map_err(|err| xml_error(&reader, err.to_string()))?;
                    append_text(&reader, &mut stack, &text)?;
                }
                Event::CData(e) => {
                    let text = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| xml_error(&reader, err.to_string()))?;
                    append_text(&reader, &mut stack, &text)?;
                }
                Event::GeneralRef(e) => {
                    let name = e
                        .decode()
                        .map_err(|err| xml_error(&reader, err.to_string()))?;
                    let entity = format!("&{};", name);
                    let resolved = quick_xml::escape::unescape(&entity)
                        .map_err(|err| xml_error(&reader, err.to_string()))?;
                    append_text(&reader, &mut stack, &resolved)?;
                }
                Event::Comment(e) => {
                    let text = e
                        .decode()
                        .map_err(|err| xml_error(&reader, err.to_string()))?;
                    let node = Node::new(NodeType::Comment(text.into_owned()));
                    append(&mut stack, &mut document, node);
                }
                Event::PI(e) => {
                    let raw = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| xml_error(&reader, err.to_string()))?;
                    let raw: &str = &raw;
                    let (target, data) = raw.split_once(char::is_whitespace).unwrap_or((raw, ""));
                    append(
                        &mut stack,
                        &mut document,
                        Node::new(NodeType::ProcessingInstruction {
                            target: target.to_string(),
                            data: data.trim().to_string(),
                        }),
                    );
                }
                Event::Eof => break,
                // XML declaration and DOCTYPE carry nothing the tree needs
                _ => {}
            }
        }

        if let Some(open) = stack.last().and_then(|n| n.as_element()) {
            return Err(ParseError::Xml(format!("unclosed element <{}>", open.tag_name)));
        }
        if !seen_root {
            return Err(ParseError::Xml("no root element".to_string()));
        }
        Ok(document)
    }
}

fn element_from_start(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<Node, ParseError> {
    let decoder = reader.decoder();
    let tag_name = decoder
        .decode(e.name().as_ref())
        .map_err(|err| xml_error(reader, err.to_string()))?
        .into_owned();

    let mut element = ElementData::new(tag_name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| xml_error(reader, err.to_string()))?;
        let key = decoder
            .decode(attr.key.as_ref())
            .map_err(|err| xml_error(reader, err.to_string()))?;
        let raw = decoder
            .decode(&attr.value)
            .map_err(|err| xml_error(reader, err.to_string()))?;
        let value = quick_xml::escape::unescape(&raw)
            .map_err(|err| xml_error(reader, err.to_string()))?;
        element.set_attribute(key.into_owned(), value.into_owned());
    }
    Ok(Node::new(NodeType::Element(element)))
}

fn append(stack: &mut [Node], document: &mut Document, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.add_child(node),
        None => document.root.add_child(node),
    }
}

fn append_text(reader: &Reader<&[u8]>, stack: &mut [Node], text: &str) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => {
            // Entity references split text; merge adjacent runs
            if let Some(Node {
                node_type: NodeType::Text(existing),
                ..
            }) = parent.children.last_mut()
            {
                existing.push_str(text);
            } else {
                parent.add_child(Node::text(text));
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(xml_error(reader, "text outside the root element")),
    }
}

fn xml_error(reader: &Reader<&[u8]>, message: impl AsRef<str>) -> ParseError {
    ParseError::Xml(format!(
        "{} at byte {}",
        message.as_ref(),
        reader.buffer_position()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_document() {
        let doc = XmlParser::new()
            .parse("<?xml version=\"1.0\"?>\n<res><a id=\"x\">b</a><c/></res>")
            .unwrap();
        let root = doc.document_element().unwrap();
        assert_eq!(root.as_element().unwrap().tag_name, "res");
        assert_eq!(root.children.len(), 2);
        assert_eq!(doc.get_element_by_id("x").unwrap().text_content(), "b");
    }

    #[test]
    fn test_entities_are_resolved() {
        let doc = XmlParser::new()
            .parse("<a title=\"x &amp; y\">1 &lt; 2 &#65;</a>")
            .unwrap();
        let a = doc.document_element().unwrap();
        assert_eq!(a.text_content(), "1 < 2 A");
        assert_eq!(a.children.len(), 1);
        assert_eq!(
            a.as_element().unwrap().get_attribute("title").map(String::as_str),
            Some("x & y")
        );
    }

    #[test]
    fn test_cdata_and_comments() {
        let doc = XmlParser::new()
            .parse("<a><!-- note --><![CDATA[<raw>]]></a>")
            .unwrap();
        let a = doc.document_element().unwrap();
        assert!(matches!(a.children[0].node_type, NodeType::Comment(_)));
        assert_eq!(a.text_content(), "<raw>");
    }

    #[test]
    fn test_malformed_documents() {
        let parser = XmlParser::new();
        assert!(parser.parse("").is_err());
        assert!(parser.parse("just text").is_err());
        assert!(parser.parse("<a><b></a>").is_err());
        assert!(parser.parse("<a>").is_err());
        assert!(parser.parse("<a/><b/>").is_err());
        assert!(parser.parse("<html><body>unclosed<br></body></html>").is_err());
    }

    #[test]
    fn test_preserves_case() {
        let doc = XmlParser::new().parse("<Root><Item/></Root>").unwrap();
        assert_eq!(doc.get_elements_by_tag_name("Item").len(), 1);
        assert!(doc.get_elements_by_tag_name("item").is_empty());
    }
}
