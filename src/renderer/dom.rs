//! Minimal document tree handed to script as `responseXML`

use std::collections::HashMap;

/// Node types in the tree
#[derive(Debug, Clone, PartialEq)]
pub enum NodeType {
    /// Document root
    Document,
    /// Element node (e.g., <div>)
    Element(ElementData),
    /// Text or CDATA node
    Text(String),
    /// Comment node
    Comment(String),
    /// Processing instruction (`<?target data?>`)
    ProcessingInstruction { target: String, data: String },
}

/// Data for element nodes
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    /// Tag name as written for XML, lower-case for HTML
    pub tag_name: String,
    /// Element attributes
    pub attributes: HashMap<String, String>,
}

impl ElementData {
    /// Create a new element
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            attributes: HashMap::new(),
        }
    }

    /// Get an attribute value
    pub fn get_attribute(&self, name: &str) -> Option<&String> {
        self.attributes.get(name)
    }

    /// Set an attribute value
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Get the ID attribute
    pub fn id(&self) -> Option<&String> {
        self.attributes.get("id")
    }
}

/// A node in the tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node type and data
    pub node_type: NodeType,
    /// Child nodes
    pub children: Vec<Node>,
}

impl Node {
    /// Create a new node
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            children: Vec::new(),
        }
    }

    /// Create an element node
    pub fn element(tag_name: impl Into<String>) -> Self {
        Self::new(NodeType::Element(ElementData::new(tag_name)))
    }

    /// Create a text node
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(NodeType::Text(content.into()))
    }

    /// Add a child node
    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Check if this is an element node
    pub fn is_element(&self) -> bool {
        matches!(self.node_type, NodeType::Element(_))
    }

    /// Get element data if this is an element
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.node_type {
            NodeType::Element(data) => Some(data),
            _ => None,
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &self.node_type {
            NodeType::Text(text) => out.push_str(text),
            _ => {
                for child in &self.children {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Depth-first search over this node and its descendants
    pub fn find(&self, predicate: &dyn Fn(&Node) -> bool) -> Option<&Node> {
        if predicate(self) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(predicate))
    }

    fn collect<'a>(&'a self, predicate: &dyn Fn(&Node) -> bool, out: &mut Vec<&'a Node>) {
        if predicate(self) {
            out.push(self);
        }
        for child in &self.children {
            child.collect(predicate, out);
        }
    }
}

/// Which parser produced a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Xml,
    Html,
}

/// A parsed response document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Root node
    pub root: Node,
    /// XML or HTML
    pub kind: DocumentKind,
}

impl Document {
    /// Create a new empty document
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            root: Node::new(NodeType::Document),
            kind,
        }
    }

    /// The first element child of the document
    pub fn document_element(&self) -> Option<&Node> {
        self.root.children.iter().find(|n| n.is_element())
    }

    /// Find an element by its `id` attribute
    pub fn get_element_by_id(&self, id: &str) -> Option<&Node> {
        self.root
            .find(&|n| n.as_element().and_then(|e| e.id()).is_some_and(|v| v == id))
    }

    /// All elements with the given tag name, in document order
    pub fn get_elements_by_tag_name(&self, tag_name: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        let html = self.kind == DocumentKind::Html;
        self.root.collect(
            &|n| {
                n.as_element().is_some_and(|e| {
                    tag_name == "*"
                        || if html {
                            e.tag_name.eq_ignore_ascii_case(tag_name)
                        } else {
                            e.tag_name == tag_name
                        }
                })
            },
            &mut out,
        );
        out
    }
}
