//! Structured document model: ordered element trees parsed from and
//! serialized to UTF-8 XML bytes.
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

type Result<T> = std::result::Result<T, DocumentError>;

/// Errors for parsing, traversing and serializing documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("duplicate attribute '{attribute}' on node '{node}'")]
    DuplicateAttribute { node: String, attribute: String },
    #[error("document has no root node")]
    MissingRoot,
    #[error("unexpected content after the root node")]
    TrailingContent,
    #[error("signing node '{0}' not found")]
    MissingSigningNode(String),
    #[error("XML write error: {0}")]
    Serialize(String),
}

/// A named, attributed element node.
///
/// Attributes keep their original textual order so re-serialization is
/// stable; lookups are by name. Text content is not modeled: CFDI
/// documents carry all fiscal data in attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Node name as written, prefix included.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name with any namespace prefix stripped.
    pub fn local_name(&self) -> &str {
        match self.name.rsplit_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing an existing one in place so the
    /// original attribute order is preserved.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let idx = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(idx).1)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn push_child(&mut self, child: Node) {
        self.children.push(child);
    }
}

/// An ordered tree with exactly one root node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredDocument {
    root: Node,
}

impl StructuredDocument {
    /// Parses UTF-8 XML bytes. The declaration line, comments and
    /// inter-element whitespace are discarded; duplicate attributes on
    /// a node are rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut stack: Vec<Node> = Vec::new();
        let mut root: Option<Node> = None;

        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| DocumentError::Malformed(e.to_string()))?
            {
                Event::Start(start) => {
                    let node = node_from_start(&start)?;
                    stack.push(node);
                }
                Event::Empty(start) => {
                    let node = node_from_start(&start)?;
                    attach(node, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| DocumentError::Malformed("unmatched end tag".into()))?;
                    attach(node, &mut stack, &mut root)?;
                }
                Event::Eof => break,
                // CFDI carries no element text; the declaration,
                // whitespace, comments and processing instructions do
                // not contribute to the tree.
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(DocumentError::Malformed("unclosed element".into()));
        }
        match root {
            Some(root) => Ok(Self { root }),
            None => Err(DocumentError::MissingRoot),
        }
    }

    pub fn from_root(root: Node) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    /// All nodes matching a root-inclusive path of local names, in
    /// document order. `["Comprobante", "Conceptos", "Concepto"]`
    /// returns every `Concepto` under every `Conceptos`.
    pub fn find_all(&self, path: &[impl AsRef<str>]) -> Vec<&Node> {
        let mut out = Vec::new();
        if !path.is_empty() {
            collect_matches(&self.root, path, &mut out);
        }
        out
    }

    /// First node matching `path`, mutably.
    pub fn find_mut(&mut self, path: &[impl AsRef<str>]) -> Option<&mut Node> {
        if path.is_empty() {
            return None;
        }
        find_match_mut(&mut self.root, path)
    }

    /// Serializes to UTF-8 bytes with an `<?xml version="1.0"
    /// encoding="UTF-8"?>` declaration.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| DocumentError::Serialize(e.to_string()))?;
        write_node(&mut writer, &self.root)?;
        Ok(writer.into_inner())
    }
}

fn node_from_start(start: &BytesStart<'_>) -> Result<Node> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| DocumentError::Malformed(format!("non-UTF-8 element name: {e}")))?
        .to_string();
    let mut node = Node::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DocumentError::Malformed(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| DocumentError::Malformed(format!("non-UTF-8 attribute name: {e}")))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| DocumentError::Malformed(e.to_string()))?
            .into_owned();
        if node.attribute(&key).is_some() {
            return Err(DocumentError::DuplicateAttribute {
                node: node.name,
                attribute: key,
            });
        }
        node.attributes.push((key, value));
    }
    Ok(node)
}

fn attach(node: Node, stack: &mut Vec<Node>, root: &mut Option<Node>) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err(DocumentError::TrailingContent);
    }
    *root = Some(node);
    Ok(())
}

fn collect_matches<'a>(node: &'a Node, path: &[impl AsRef<str>], out: &mut Vec<&'a Node>) {
    if node.local_name() != path[0].as_ref() {
        return;
    }
    if path.len() == 1 {
        out.push(node);
        return;
    }
    for child in &node.children {
        collect_matches(child, &path[1..], out);
    }
}

fn find_match_mut<'a>(node: &'a mut Node, path: &[impl AsRef<str>]) -> Option<&'a mut Node> {
    if node.local_name() != path[0].as_ref() {
        return None;
    }
    if path.len() == 1 {
        return Some(node);
    }
    for child in &mut node.children {
        if let Some(found) = find_match_mut(child, &path[1..]) {
            return Some(found);
        }
    }
    None
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<()> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if node.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| DocumentError::Serialize(e.to_string()))?;
    } else {
        writer
            .write_event(Event::Start(start))
            .map_err(|e| DocumentError::Serialize(e.to_string()))?;
        for child in &node.children {
            write_node(writer, child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(node.name.as_str())))
            .map_err(|e| DocumentError::Serialize(e.to_string()))?;
    }
    Ok(())
}
