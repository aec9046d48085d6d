//! Owned, mutable XML element tree.
//!
//! roxmltree gives us a fast read-only parse; merging needs to splice runs,
//! drop rows and build new cells, so the parsed document is copied into this
//! tree once and serialised back when the package is saved. Prefixes and
//! namespace declarations are kept exactly as they appear in the source so
//! markup the engine does not understand survives the round trip.

/// WordprocessingML main namespace.
pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, value: Option<String> },
}

impl XmlNode {
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub prefix: Option<String>,
    pub name: String,
    pub namespace: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub prefix: Option<String>,
    pub name: String,
    pub namespace: Option<String>,
    /// Namespace declarations made on this element: (prefix, uri).
    pub declarations: Vec<(Option<String>, String)>,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(prefix: Option<&str>, name: &str, namespace: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            declarations: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create a WordprocessingML element using the prefix this element binds
    /// to the main namespace (`w` when this element lives elsewhere).
    pub fn new_w(&self, name: &str) -> Self {
        let prefix = if self.namespace.as_deref() == Some(W_NS) {
            self.prefix.as_deref()
        } else {
            Some("w")
        };
        Self::new(prefix, name, Some(W_NS))
    }

    /// Parse a complete XML document and return its root element.
    pub fn parse(xml: &str) -> Result<Self, roxmltree::Error> {
        let doc = roxmltree::Document::parse(xml)?;
        Ok(Self::from_node(doc.root_element()))
    }

    fn from_node(node: roxmltree::Node) -> Self {
        let tag = node.tag_name();
        let prefix = tag.namespace().and_then(|uri| prefix_for(&node, uri));

        let inherited: Vec<(Option<&str>, &str)> = node
            .parent_element()
            .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
            .unwrap_or_default();
        let declarations = node
            .namespaces()
            .filter(|ns| ns.name() != Some("xml"))
            .filter(|ns| !inherited.contains(&(ns.name(), ns.uri())))
            .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
            .collect();

        let attributes = node
            .attributes()
            .map(|attr| XmlAttribute {
                prefix: attr.namespace().and_then(|uri| prefix_for(&node, uri)),
                name: attr.name().to_string(),
                namespace: attr.namespace().map(str::to_string),
                value: attr.value().to_string(),
            })
            .collect();

        let mut children = Vec::new();
        for child in node.children() {
            if child.is_element() {
                children.push(XmlNode::Element(Self::from_node(child)));
            } else if child.is_text() {
                if let Some(text) = child.text() {
                    children.push(XmlNode::Text(text.to_string()));
                }
            } else if child.is_comment() {
                if let Some(text) = child.text() {
                    children.push(XmlNode::Comment(text.to_string()));
                }
            } else if let Some(pi) = child.pi() {
                children.push(XmlNode::ProcessingInstruction {
                    target: pi.target.to_string(),
                    value: pi.value.map(str::to_string),
                });
            }
        }

        Self {
            prefix,
            name: tag.name().to_string(),
            namespace: tag.namespace().map(str::to_string),
            declarations,
            attributes,
            children,
        }
    }

    /// Serialise as a standalone XML document.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(4096);
        out.push_str(XML_DECLARATION);
        self.write_into(&mut out);
        out
    }

    pub fn write_into(&self, out: &mut String) {
        let qname = self.qualified_name();
        out.push('<');
        out.push_str(&qname);
        for (prefix, uri) in &self.declarations {
            match prefix {
                Some(p) => {
                    out.push_str(" xmlns:");
                    out.push_str(p);
                }
                None => out.push_str(" xmlns"),
            }
            out.push_str("=\"");
            escape_attr(uri, out);
            out.push('"');
        }
        for attr in &self.attributes {
            out.push(' ');
            if let Some(p) = &attr.prefix {
                out.push_str(p);
                out.push(':');
            }
            out.push_str(&attr.name);
            out.push_str("=\"");
            escape_attr(&attr.value, out);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.write_into(out),
                XmlNode::Text(text) => escape_text(text, out),
                XmlNode::Comment(text) => {
                    out.push_str("<!--");
                    out.push_str(text);
                    out.push_str("-->");
                }
                XmlNode::ProcessingInstruction { target, value } => {
                    out.push_str("<?");
                    out.push_str(target);
                    if let Some(v) = value {
                        out.push(' ');
                        out.push_str(v);
                    }
                    out.push_str("?>");
                }
            }
        }
        out.push_str("</");
        out.push_str(&qname);
        out.push('>');
    }

    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.name),
            None => self.name.clone(),
        }
    }

    /// True when this is the WordprocessingML element `w:<name>`.
    pub fn is_w(&self, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(W_NS)
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(XmlNode::as_element_mut)
    }

    pub fn w_children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |el| el.is_w(name))
    }

    pub fn w_child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.is_w(name))
    }

    pub fn w_child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.is_w(name))
    }

    /// Index into `children` of every direct `w:<name>` child.
    pub fn w_child_indices(&self, name: &str) -> Vec<usize> {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, node)| node.as_element().is_some_and(|el| el.is_w(name)))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Value of the `w:<name>` attribute.
    pub fn w_attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.namespace.as_deref() == Some(W_NS))
            .map(|a| a.value.as_str())
    }

    pub fn set_w_attr(&mut self, name: &str, value: &str) {
        let prefix = if self.namespace.as_deref() == Some(W_NS) {
            self.prefix.clone()
        } else {
            Some("w".to_string())
        };
        self.set_attr(prefix, name, Some(W_NS), value);
    }

    /// Set `xml:space="preserve"`.
    pub fn preserve_space(&mut self) {
        self.set_attr(Some("xml".to_string()), "space", Some(XML_NS), "preserve");
    }

    fn set_attr(&mut self, prefix: Option<String>, name: &str, namespace: Option<&str>, value: &str) {
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.name == name && a.namespace.as_deref() == namespace)
        {
            existing.value = value.to_string();
            return;
        }
        self.attributes.push(XmlAttribute {
            prefix,
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            value: value.to_string(),
        });
    }

    pub fn push(&mut self, el: XmlElement) {
        self.children.push(XmlNode::Element(el));
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn set_text(&mut self, text: &str) {
        self.children = vec![XmlNode::Text(text.to_string())];
    }

    /// Visit every descendant-or-self `w:<name>` element in document order.
    pub fn visit<F: FnMut(&XmlElement)>(&self, name: &str, f: &mut F) {
        if self.is_w(name) {
            f(self);
        }
        for child in self.elements() {
            child.visit(name, f);
        }
    }

    /// Mutable variant of [`visit`](Self::visit). The callback runs before the
    /// element's children are walked, so children it replaces are the ones
    /// visited next.
    pub fn visit_mut<F: FnMut(&mut XmlElement)>(&mut self, name: &str, f: &mut F) {
        if self.is_w(name) {
            f(self);
        }
        for child in self.elements_mut() {
            child.visit_mut(name, f);
        }
    }
}

fn prefix_for(node: &roxmltree::Node, uri: &str) -> Option<String> {
    if uri == XML_NS {
        return Some("xml".to_string());
    }
    node.lookup_prefix(uri).map(str::to_string)
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(ch),
        }
    }
}
