//! HTML5 parser implementation using html5ever

use super::dom::{Document, DocumentKind, ElementData, Node, NodeType};
use crate::utils::ParseError;
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{ParseOpts, parse_document};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// HTML5 parser using html5ever
pub struct HtmlParser {
    opts: ParseOpts,
}

impl HtmlParser {
    /// Create a new HTML parser
    pub fn new() -> Self {
        Self {
            opts: ParseOpts {
                tree_builder: TreeBuilderOpts {
                    drop_doctype: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    /// Parse HTML content into a document
    ///
    /// html5ever recovers from malformed markup, so only I/O-level failures
    /// of the tendril sink are reported.
    pub fn parse(&self, content: &str) -> Result<Document, ParseError> {
        let dom = parse_document(RcDom::default(), self.opts.clone())
            .from_utf8()
            .read_from(&mut content.as_bytes())
            .map_err(|e| ParseError::Html(e.to_string()))?;

        let mut document = Document::new(DocumentKind::Html);
        for child in dom.document.children.borrow().iter() {
            if let Some(node) = convert_node(child) {
                document.root.add_child(node);
            }
        }
        Ok(document)
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

fn convert_node(handle: &Handle) -> Option<Node> {
    let node_type = match &handle.data {
        NodeData::Element { name, attrs, .. } => {
            let mut element = ElementData::new(name.local.to_string());
            for attr in attrs.borrow().iter() {
                element.set_attribute(attr.name.local.to_string(), attr.value.to_string());
            }
            NodeType::Element(element)
        }
        NodeData::Text { contents } => NodeType::Text(contents.borrow().to_string()),
        NodeData::Comment { contents } => NodeType::Comment(contents.to_string()),
        NodeData::ProcessingInstruction { target, contents } => NodeType::ProcessingInstruction {
            target: target.to_string(),
            data: contents.to_string(),
        },
        NodeData::Document | NodeData::Doctype { .. } => return None,
    };

    let mut node = Node::new(node_type);
    for child in handle.children.borrow().iter() {
        if let Some(converted) = convert_node(child) {
            node.add_child(converted);
        }
    }
    Some(node)
}
