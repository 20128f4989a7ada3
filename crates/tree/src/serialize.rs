//! Writes documents as XML or plain text through a quick-xml `Writer`.

use crate::document::{Document, NodeId};
use crate::error::TreeError;
use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use trellis_xpath1::{ExpandedName, NodeType, XML_NAMESPACE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMethod {
    #[default]
    Xml,
    Text,
}

/// How a result tree is written out.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub method: OutputMethod,
    pub version: String,
    pub encoding: String,
    pub standalone: Option<bool>,
    pub omit_xml_declaration: bool,
    pub indent: bool,
    pub doctype_public: Option<String>,
    pub doctype_system: Option<String>,
    /// Elements whose text children are written as CDATA sections.
    pub cdata_section_elements: Vec<ExpandedName>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            method: OutputMethod::Xml,
            version: "1.0".to_string(),
            encoding: "UTF-8".to_string(),
            standalone: None,
            omit_xml_declaration: false,
            indent: false,
            doctype_public: None,
            doctype_system: None,
            cdata_section_elements: Vec::new(),
        }
    }
}

/// Serializes the whole document.
pub fn serialize(doc: &Document, settings: &OutputSettings) -> Result<String, TreeError> {
    match settings.method {
        OutputMethod::Text => Ok(text_content(doc)),
        OutputMethod::Xml => XmlSerializer::new(doc, settings).run(),
    }
}

/// The values of all text nodes, in document order.
fn text_content(doc: &Document) -> String {
    let mut out = String::new();
    let mut stack: Vec<NodeId> = doc.children(doc.root()).iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        match doc.node_type(id) {
            NodeType::Text => out.push_str(doc.value(id)),
            NodeType::Element => stack.extend(doc.children(id).iter().rev().copied()),
            _ => {}
        }
    }
    out
}

struct XmlSerializer<'d> {
    doc: &'d Document,
    settings: &'d OutputSettings,
    writer: Writer<Vec<u8>>,
    /// In-scope prefix bindings, innermost last.
    bindings: Vec<(Option<String>, String)>,
    generated_prefixes: usize,
}

impl<'d> XmlSerializer<'d> {
    fn new(doc: &'d Document, settings: &'d OutputSettings) -> Self {
        let writer = if settings.indent {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };
        Self {
            doc,
            settings,
            writer,
            bindings: Vec::new(),
            generated_prefixes: 0,
        }
    }

    fn run(mut self) -> Result<String, TreeError> {
        let settings = self.settings;
        if !settings.omit_xml_declaration {
            let standalone = settings.standalone.map(|s| if s { "yes" } else { "no" });
            self.emit(Event::Decl(BytesDecl::new(
                settings.version.as_str(),
                Some(settings.encoding.as_str()),
                standalone,
            )))?;
            if !settings.indent {
                self.writer.get_mut().push(b'\n');
            }
        }
        if let Some(system) = &settings.doctype_system
            && let Some(element) = self.doc.document_element()
        {
            let root_name = self.doc.name(element).map(|n| n.qualified()).unwrap_or_default();
            let doctype = match &settings.doctype_public {
                Some(public) => format!("{} PUBLIC \"{}\" \"{}\"", root_name, public, system),
                None => format!("{} SYSTEM \"{}\"", root_name, system),
            };
            self.emit(Event::DocType(BytesText::from_escaped(doctype)))?;
            if !settings.indent {
                self.writer.get_mut().push(b'\n');
            }
        }
        let doc = self.doc;
        for &child in doc.children(doc.root()) {
            self.write_node(child, false)?;
        }
        String::from_utf8(self.writer.into_inner()).map_err(|e| TreeError::Write(e.to_string()))
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), TreeError> {
        self.writer
            .write_event(event)
            .map_err(|e| TreeError::Write(e.to_string()))
    }

    fn write_node(&mut self, id: NodeId, in_cdata_element: bool) -> Result<(), TreeError> {
        let doc = self.doc;
        match doc.node_type(id) {
            NodeType::Element => self.write_element(id),
            NodeType::Text => {
                let text = doc.value(id);
                if in_cdata_element {
                    self.write_cdata(text)
                } else if doc.is_raw_text(id) {
                    self.emit(Event::Text(BytesText::from_escaped(text)))
                } else {
                    self.emit(Event::Text(BytesText::from_escaped(partial_escape(text))))
                }
            }
            NodeType::Comment => self.emit(Event::Comment(BytesText::from_escaped(doc.value(id)))),
            NodeType::ProcessingInstruction => {
                let target = doc.name(id).map(|n| n.local_name.as_str()).unwrap_or_default();
                let data = doc.value(id);
                let content = if data.is_empty() {
                    target.to_string()
                } else {
                    format!("{} {}", target, data)
                };
                self.emit(Event::PI(BytesPI::new(content)))
            }
            NodeType::Root | NodeType::Attribute => Ok(()),
        }
    }

    /// Splits around `]]>` so the terminator never appears inside a section.
    fn write_cdata(&mut self, text: &str) -> Result<(), TreeError> {
        let mut rest = text;
        while let Some(index) = rest.find("]]>") {
            self.emit(Event::CData(BytesCData::new(&rest[..index + 2])))?;
            rest = &rest[index + 2..];
        }
        self.emit(Event::CData(BytesCData::new(rest)))
    }

    fn lookup(&self, prefix: Option<&str>) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Records a binding and returns the declaration attribute when it changes the scope.
    fn bind(&mut self, prefix: Option<&str>, uri: &str) -> Option<(String, String)> {
        if prefix == Some("xml") {
            return None;
        }
        let in_scope = self.lookup(prefix).unwrap_or("");
        if in_scope == uri {
            return None;
        }
        self.bindings.push((prefix.map(str::to_string), uri.to_string()));
        let attr = match prefix {
            Some(p) => format!("xmlns:{}", p),
            None => "xmlns".to_string(),
        };
        Some((attr, uri.to_string()))
    }

    fn write_element(&mut self, id: NodeId) -> Result<(), TreeError> {
        let doc = self.doc;
        let Some(name) = doc.name(id) else {
            return Ok(());
        };
        let mark = self.bindings.len();
        let mut declarations = Vec::new();

        for (prefix, uri) in doc.namespaces(id) {
            declarations.extend(self.bind(prefix.as_deref(), uri));
        }
        declarations.extend(self.bind(name.prefix.as_deref(), name.namespace_uri.as_deref().unwrap_or("")));

        let mut attributes = Vec::new();
        for &attr in doc.attributes(id) {
            let Some(attr_name) = doc.name(attr) else { continue };
            let qualified = match attr_name.namespace_uri.as_deref() {
                None => attr_name.local_name.clone(),
                Some(XML_NAMESPACE) => format!("xml:{}", attr_name.local_name),
                Some(uri) => {
                    let prefix = match &attr_name.prefix {
                        Some(prefix) if self.lookup(Some(prefix.as_str())).is_none_or(|bound| bound == uri) => prefix.clone(),
                        _ => self.prefix_for(uri),
                    };
                    declarations.extend(self.bind(Some(prefix.as_str()), uri));
                    format!("{}:{}", prefix, attr_name.local_name)
                }
            };
            attributes.push((qualified, doc.value(attr)));
        }

        let qualified = name.qualified();
        let mut start = BytesStart::new(qualified.as_str());
        for (attr, value) in &declarations {
            start.push_attribute((attr.as_str(), value.as_str()));
        }
        for (attr, value) in &attributes {
            start.push_attribute((attr.as_str(), *value));
        }

        let children = doc.children(id);
        if children.is_empty() {
            self.emit(Event::Empty(start))?;
        } else {
            let cdata = self
                .settings
                .cdata_section_elements
                .iter()
                .any(|e| name.is(e.namespace_uri.as_deref(), &e.local_name));
            self.emit(Event::Start(start))?;
            for &child in children {
                self.write_node(child, cdata)?;
            }
            self.emit(Event::End(BytesEnd::new(qualified.as_str())))?;
        }
        self.bindings.truncate(mark);
        Ok(())
    }

    /// A prefix already bound to `uri`, or a fresh generated one.
    fn prefix_for(&mut self, uri: &str) -> String {
        let existing = self
            .bindings
            .iter()
            .rev()
            .find(|(p, u)| u == uri && p.as_deref().is_some_and(|p| self.lookup(Some(p)) == Some(uri)))
            .and_then(|(p, _)| p.clone());
        if let Some(prefix) = existing {
            return prefix;
        }
        loop {
            let candidate = format!("ns{}", self.generated_prefixes);
            self.generated_prefixes += 1;
            if self.lookup(Some(&candidate)).is_none() {
                return candidate;
            }
        }
    }
}
