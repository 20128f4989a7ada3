//! The compiled form of a stylesheet: instructions, templates and top-level declarations.

use crate::avt::AttributeValueTemplate;
use crate::pattern::Pattern;
use crate::qname::Namespaces;
use std::sync::Arc;
use trellis_tree::{Location, NodeName};
use trellis_xpath1::{ExpandedName, Expression};

/// A template mode. `None` is the default mode.
pub type Mode = Option<ExpandedName>;

/// A sequence of instructions executed in order.
#[derive(Debug, Clone, Default)]
pub struct Body(pub Vec<Instruction>);

impl Body {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One compiled instruction with the static context it was declared in.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub namespaces: Arc<Namespaces>,
    pub base_uri: Option<Arc<str>>,
    pub location: Option<Location>,
}

#[derive(Debug, Clone)]
pub enum InstructionKind {
    /// Literal text, from `xsl:text` or a text node of the stylesheet.
    Text { text: String, disable_escaping: bool },
    LiteralElement {
        name: NodeName,
        /// Namespace declarations copied onto the result element.
        namespaces: Vec<(Option<String>, String)>,
        attributes: Vec<(NodeName, AttributeValueTemplate)>,
        use_attribute_sets: Vec<ExpandedName>,
        body: Body,
    },
    ApplyTemplates {
        /// `None` selects `node()`.
        select: Option<Arc<Expression>>,
        mode: Mode,
        sort: Vec<SortKey>,
        params: Vec<VariableBinding>,
    },
    CallTemplate {
        name: ExpandedName,
        params: Vec<VariableBinding>,
    },
    ApplyImports,
    ForEach {
        select: Arc<Expression>,
        sort: Vec<SortKey>,
        body: Body,
    },
    ValueOf {
        select: Arc<Expression>,
        disable_escaping: bool,
    },
    CopyOf { select: Arc<Expression> },
    Copy {
        use_attribute_sets: Vec<ExpandedName>,
        body: Body,
    },
    If { test: Arc<Expression>, body: Body },
    Choose {
        whens: Vec<(Arc<Expression>, Body)>,
        otherwise: Option<Body>,
    },
    Variable(VariableBinding),
    Param(VariableBinding),
    Element {
        name: AttributeValueTemplate,
        namespace: Option<AttributeValueTemplate>,
        use_attribute_sets: Vec<ExpandedName>,
        body: Body,
    },
    Attribute {
        name: AttributeValueTemplate,
        namespace: Option<AttributeValueTemplate>,
        body: Body,
    },
    Comment { body: Body },
    ProcessingInstruction {
        name: AttributeValueTemplate,
        body: Body,
    },
    Message { terminate: bool, body: Body },
    /// Only runs while falling back from an unsupported instruction.
    Fallback { body: Body },
    /// An instruction this processor does not know, kept in forwards-compatible mode.
    /// Running it runs the `xsl:fallback` instructions among its children, or fails when
    /// there are none.
    Unsupported { name: String, body: Body },
}

impl InstructionKind {
    /// The element name this instruction is compiled from, for diagnostics.
    pub fn element_name(&self) -> &str {
        match self {
            InstructionKind::Text { .. } => "xsl:text",
            InstructionKind::LiteralElement { .. } => "literal result element",
            InstructionKind::ApplyTemplates { .. } => "xsl:apply-templates",
            InstructionKind::CallTemplate { .. } => "xsl:call-template",
            InstructionKind::ApplyImports => "xsl:apply-imports",
            InstructionKind::ForEach { .. } => "xsl:for-each",
            InstructionKind::ValueOf { .. } => "xsl:value-of",
            InstructionKind::CopyOf { .. } => "xsl:copy-of",
            InstructionKind::Copy { .. } => "xsl:copy",
            InstructionKind::If { .. } => "xsl:if",
            InstructionKind::Choose { .. } => "xsl:choose",
            InstructionKind::Variable(_) => "xsl:variable",
            InstructionKind::Param(_) => "xsl:param",
            InstructionKind::Element { .. } => "xsl:element",
            InstructionKind::Attribute { .. } => "xsl:attribute",
            InstructionKind::Comment { .. } => "xsl:comment",
            InstructionKind::ProcessingInstruction { .. } => "xsl:processing-instruction",
            InstructionKind::Message { .. } => "xsl:message",
            InstructionKind::Fallback { .. } => "xsl:fallback",
            InstructionKind::Unsupported { name, .. } => name,
        }
    }
}

/// A `variable`, `param` or `with-param` binding.
#[derive(Debug, Clone)]
pub struct VariableBinding {
    pub name: ExpandedName,
    pub value: VariableValue,
}

#[derive(Debug, Clone)]
pub enum VariableValue {
    Select(Arc<Expression>),
    /// Content instantiated into a result tree fragment.
    Content(Body),
    /// Neither `select` nor content: the empty string.
    Empty,
}

/// An `xsl:sort` key. Everything but `select` is an attribute value template.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub select: Arc<Expression>,
    pub data_type: Option<AttributeValueTemplate>,
    pub order: Option<AttributeValueTemplate>,
    pub case_order: Option<AttributeValueTemplate>,
}

#[derive(Debug)]
pub struct Template {
    pub name: Option<ExpandedName>,
    pub patterns: Vec<Pattern>,
    pub mode: Mode,
    pub priority: Option<f64>,
    pub body: Body,
    pub namespaces: Arc<Namespaces>,
    pub location: Option<Location>,
}

impl Template {
    /// A short description for log output.
    pub fn describe(&self) -> String {
        match (&self.name, self.patterns.is_empty()) {
            (Some(name), true) => format!("template name={}", name),
            (Some(name), false) => format!("template name={} match={}", name, self.match_text()),
            (None, _) => format!("template match={}", self.match_text()),
        }
    }

    fn match_text(&self) -> String {
        itertools::join(self.patterns.iter(), " | ")
    }
}

#[derive(Debug, Clone)]
pub struct AttributeSet {
    pub name: ExpandedName,
    pub use_attribute_sets: Vec<ExpandedName>,
    /// `xsl:attribute` instructions.
    pub body: Body,
    pub namespaces: Arc<Namespaces>,
}

#[derive(Debug, Clone)]
pub struct KeyDefinition {
    pub name: ExpandedName,
    pub patterns: Vec<Pattern>,
    pub use_expr: Arc<Expression>,
    pub namespaces: Arc<Namespaces>,
}

/// A top-level `xsl:variable` or `xsl:param`. The instruction is a `Variable` or `Param`.
#[derive(Debug, Clone)]
pub struct GlobalVariable {
    pub name: ExpandedName,
    pub instruction: Instruction,
}

impl GlobalVariable {
    pub fn is_param(&self) -> bool {
        matches!(self.instruction.kind, InstructionKind::Param(_))
    }
}
