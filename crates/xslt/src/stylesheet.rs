//! Compiled stylesheet scopes: rule tables, named templates and the declarations merged
//! across the import precedence chain.

use crate::ast::{AttributeSet, GlobalVariable, KeyDefinition, Mode, Template};
use crate::error::CompileError;
use crate::pattern::Pattern;
use crate::qname::NameTest;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use trellis_tree::{OutputMethod, OutputSettings};
use trellis_xpath1::ExpandedName;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one compiled stylesheet module (a scope in the import tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        ScopeId(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One entry of a rule table: a single pattern of a template with its effective priority.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    pub pattern: Pattern,
    pub template: Arc<Template>,
    pub priority: f64,
}

/// `xsl:output` attributes as declared. Unset fields fall through to lower precedence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputDeclaration {
    pub method: Option<String>,
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub omit_xml_declaration: Option<bool>,
    pub standalone: Option<bool>,
    pub doctype_public: Option<String>,
    pub doctype_system: Option<String>,
    pub indent: Option<bool>,
    pub media_type: Option<String>,
    pub cdata_section_elements: Vec<ExpandedName>,
}

impl OutputDeclaration {
    /// Overrides the fields `other` sets and adds its CDATA elements.
    pub fn override_with(&mut self, other: &OutputDeclaration) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        take!(
            method,
            version,
            encoding,
            omit_xml_declaration,
            standalone,
            doctype_public,
            doctype_system,
            indent,
            media_type
        );
        self.add_cdata_elements(&other.cdata_section_elements);
    }

    /// Fills the fields still unset from a lower-precedence declaration.
    fn fill_from(&mut self, lower: &OutputDeclaration) {
        macro_rules! fill {
            ($($field:ident),*) => {
                $(if self.$field.is_none() {
                    self.$field = lower.$field.clone();
                })*
            };
        }
        fill!(
            method,
            version,
            encoding,
            omit_xml_declaration,
            standalone,
            doctype_public,
            doctype_system,
            indent,
            media_type
        );
        self.add_cdata_elements(&lower.cdata_section_elements);
    }

    fn add_cdata_elements(&mut self, names: &[ExpandedName]) {
        for name in names {
            if !self.cdata_section_elements.contains(name) {
                self.cdata_section_elements.push(name.clone());
            }
        }
    }

    /// Serializer settings. Methods other than `text` write XML.
    pub fn settings(&self) -> OutputSettings {
        let defaults = OutputSettings::default();
        let method = match self.method.as_deref() {
            Some("text") => OutputMethod::Text,
            Some("xml") | None => OutputMethod::Xml,
            Some(other) => {
                log::warn!("Output method '{}' is written as XML", other);
                OutputMethod::Xml
            }
        };
        OutputSettings {
            method,
            version: self.version.clone().unwrap_or(defaults.version),
            encoding: self.encoding.clone().unwrap_or(defaults.encoding),
            standalone: self.standalone,
            omit_xml_declaration: self.omit_xml_declaration.unwrap_or(defaults.omit_xml_declaration),
            indent: self.indent.unwrap_or(defaults.indent),
            doctype_public: self.doctype_public.clone(),
            doctype_system: self.doctype_system.clone(),
            cdata_section_elements: self.cdata_section_elements.clone(),
        }
    }
}

/// The target of an `xsl:namespace-alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceAlias {
    pub prefix: Option<String>,
    /// `None` for the null namespace.
    pub uri: Option<String>,
}

/// A compiled stylesheet module and, through `imports`, every module it imports.
///
/// A stylesheet holds no documents and can be shared across threads and transformations.
#[derive(Debug)]
pub struct Stylesheet {
    id: ScopeId,
    base_uri: Option<String>,
    forwards_compatible: bool,
    /// Highest precedence first, i.e. the reverse of declaration order.
    imports: Vec<Arc<Stylesheet>>,
    rules: HashMap<Mode, Vec<RuleEntry>>,
    named_templates: HashMap<ExpandedName, Arc<Template>>,
    attribute_sets: HashMap<ExpandedName, Vec<AttributeSet>>,
    variables: Vec<GlobalVariable>,
    merged_variables: Vec<GlobalVariable>,
    keys: HashMap<ExpandedName, Vec<KeyDefinition>>,
    namespace_aliases: HashMap<String, NamespaceAlias>,
    strip_space: Vec<NameTest>,
    preserve_space: Vec<NameTest>,
    output: OutputDeclaration,
}

impl Stylesheet {
    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    pub fn forwards_compatible(&self) -> bool {
        self.forwards_compatible
    }

    /// Imported modules, highest precedence first.
    pub fn imports(&self) -> &[Arc<Stylesheet>] {
        &self.imports
    }

    /// This module's rule table for `mode`, ascending by priority.
    pub fn rules(&self, mode: &Mode) -> &[RuleEntry] {
        self.rules.get(mode).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn modes(&self) -> impl Iterator<Item = &Mode> {
        self.rules.keys()
    }

    pub fn named_template(&self, name: &ExpandedName) -> Option<&Arc<Template>> {
        self.named_templates.get(name)
    }

    /// Attribute sets declared in this module under `name`, in declaration order.
    pub fn attribute_sets(&self, name: &ExpandedName) -> &[AttributeSet] {
        self.attribute_sets.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Global variables and parameters declared in this module.
    pub fn own_variables(&self) -> &[GlobalVariable] {
        &self.variables
    }

    /// The winning global declarations across the import tree, imported ones first.
    pub fn global_variables(&self) -> &[GlobalVariable] {
        &self.merged_variables
    }

    pub fn keys(&self, name: &ExpandedName) -> Option<&[KeyDefinition]> {
        self.keys.get(name).map(Vec::as_slice)
    }

    pub fn namespace_alias(&self, stylesheet_uri: &str) -> Option<&NamespaceAlias> {
        self.namespace_aliases.get(stylesheet_uri)
    }

    pub fn has_whitespace_rules(&self) -> bool {
        !self.strip_space.is_empty()
    }

    /// Whether whitespace-only text children of an element named `name` are stripped from
    /// source documents. The most specific matching test decides; ties preserve.
    pub fn strips_whitespace(&self, name: &ExpandedName) -> bool {
        let best = |tests: &[NameTest]| {
            tests
                .iter()
                .filter(|test| test.matches(name))
                .map(NameTest::priority)
                .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p))))
        };
        match (best(&self.strip_space), best(&self.preserve_space)) {
            (Some(strip), Some(preserve)) => strip > preserve,
            (Some(_), None) => true,
            _ => false,
        }
    }

    pub fn output(&self) -> &OutputDeclaration {
        &self.output
    }

    /// Number of rule entries in this module across all modes.
    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }
}

/// Accumulates the declarations of one module (and its includes) during compilation.
#[derive(Debug, Default)]
pub(crate) struct StylesheetBuilder {
    pub base_uri: Option<String>,
    pub forwards_compatible: bool,
    /// Declaration order.
    imports: Vec<Arc<Stylesheet>>,
    templates: Vec<Arc<Template>>,
    named_templates: HashMap<ExpandedName, Arc<Template>>,
    attribute_sets: HashMap<ExpandedName, Vec<AttributeSet>>,
    variables: Vec<GlobalVariable>,
    keys: HashMap<ExpandedName, Vec<KeyDefinition>>,
    namespace_aliases: HashMap<String, NamespaceAlias>,
    strip_space: Vec<NameTest>,
    preserve_space: Vec<NameTest>,
    output: OutputDeclaration,
}

impl StylesheetBuilder {
    pub fn new(base_uri: Option<String>) -> Self {
        Self {
            base_uri,
            ..Self::default()
        }
    }

    pub fn add_import(&mut self, stylesheet: Arc<Stylesheet>) {
        self.imports.push(stylesheet);
    }

    pub fn add_template(&mut self, template: Template) -> Result<(), CompileError> {
        let template = Arc::new(template);
        if let Some(name) = &template.name {
            if self.named_templates.contains_key(name) {
                return Err(CompileError::DuplicateName(name.to_string()));
            }
            self.named_templates.insert(name.clone(), Arc::clone(&template));
        }
        if !template.patterns.is_empty() {
            self.templates.push(template);
        }
        Ok(())
    }

    pub fn add_variable(&mut self, variable: GlobalVariable) -> Result<(), CompileError> {
        if self.variables.iter().any(|existing| existing.name == variable.name) {
            return Err(CompileError::VariableRedefinition(variable.name.to_string()));
        }
        self.variables.push(variable);
        Ok(())
    }

    /// Same-name sets in one module are kept together and applied in declaration order.
    pub fn add_attribute_set(&mut self, set: AttributeSet) {
        self.attribute_sets.entry(set.name.clone()).or_default().push(set);
    }

    pub fn add_key(&mut self, key: KeyDefinition) {
        self.keys.entry(key.name.clone()).or_default().push(key);
    }

    pub fn add_namespace_alias(&mut self, stylesheet_uri: String, alias: NamespaceAlias) {
        self.namespace_aliases.insert(stylesheet_uri, alias);
    }

    pub fn add_strip_space(&mut self, test: NameTest) {
        self.strip_space.push(test);
    }

    pub fn add_preserve_space(&mut self, test: NameTest) {
        self.preserve_space.push(test);
    }

    pub fn add_output(&mut self, output: &OutputDeclaration) {
        self.output.override_with(output);
    }

    pub fn finish(self) -> Stylesheet {
        let imports: Vec<Arc<Stylesheet>> = self.imports.into_iter().rev().collect();

        let mut rules: HashMap<Mode, Vec<RuleEntry>> = HashMap::new();
        for template in &self.templates {
            for pattern in &template.patterns {
                let priority = template.priority.unwrap_or_else(|| pattern.default_priority());
                rules.entry(template.mode.clone()).or_default().push(RuleEntry {
                    pattern: pattern.clone(),
                    template: Arc::clone(template),
                    priority,
                });
            }
        }
        for entries in rules.values_mut() {
            entries.sort_by(|a, b| a.priority.total_cmp(&b.priority));
        }

        let merged_variables = merge_variables(&imports, &self.variables);

        let mut keys = self.keys;
        let mut namespace_aliases = self.namespace_aliases;
        let mut strip_space = self.strip_space;
        let mut preserve_space = self.preserve_space;
        let mut output = self.output;
        for import in &imports {
            for (name, definitions) in &import.keys {
                keys.entry(name.clone()).or_insert_with(|| definitions.clone());
            }
            for (uri, alias) in &import.namespace_aliases {
                namespace_aliases.entry(uri.clone()).or_insert_with(|| alias.clone());
            }
            for test in &import.strip_space {
                if !is_covered(test, &strip_space, &preserve_space) {
                    strip_space.push(test.clone());
                }
            }
            for test in &import.preserve_space {
                if !is_covered(test, &strip_space, &preserve_space) {
                    preserve_space.push(test.clone());
                }
            }
            output.fill_from(&import.output);
        }

        Stylesheet {
            id: ScopeId::next(),
            base_uri: self.base_uri,
            forwards_compatible: self.forwards_compatible,
            imports,
            rules,
            named_templates: self.named_templates,
            attribute_sets: self.attribute_sets,
            variables: self.variables,
            merged_variables,
            keys,
            namespace_aliases,
            strip_space,
            preserve_space,
            output,
        }
    }
}

fn is_covered(test: &NameTest, strip: &[NameTest], preserve: &[NameTest]) -> bool {
    strip.iter().chain(preserve).any(|existing| existing.covers(test))
}

/// Imported globals first (lowest precedence first), then this module's own. Where names
/// collide the highest-precedence declaration wins and keeps its place.
fn merge_variables(imports_descending: &[Arc<Stylesheet>], own: &[GlobalVariable]) -> Vec<GlobalVariable> {
    let candidates: Vec<&GlobalVariable> = imports_descending
        .iter()
        .rev()
        .flat_map(|import| import.merged_variables.iter())
        .chain(own)
        .collect();
    let mut winner: HashMap<&ExpandedName, usize> = HashMap::new();
    for (index, variable) in candidates.iter().enumerate() {
        winner.insert(&variable.name, index);
    }
    candidates
        .iter()
        .enumerate()
        .filter(|(index, variable)| winner.get(&variable.name) == Some(index))
        .map(|(_, variable)| (*variable).clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Body, Instruction, InstructionKind, VariableBinding, VariableValue};
    use crate::qname::Namespaces;
    use trellis_xpath1::ExpressionCache;

    fn template(pattern: &str, priority: Option<f64>) -> Template {
        Template {
            name: None,
            patterns: crate::pattern::parse(pattern, &mut ExpressionCache::default()).unwrap(),
            mode: None,
            priority,
            body: Body::default(),
            namespaces: Arc::new(Namespaces::new()),
            location: None,
        }
    }

    fn global(name: &str, text: &str) -> GlobalVariable {
        GlobalVariable {
            name: ExpandedName::local(name),
            instruction: Instruction {
                kind: InstructionKind::Variable(VariableBinding {
                    name: ExpandedName::local(name),
                    value: VariableValue::Content(Body(vec![Instruction {
                        kind: InstructionKind::Text {
                            text: text.to_string(),
                            disable_escaping: false,
                        },
                        namespaces: Arc::new(Namespaces::new()),
                        base_uri: None,
                        location: None,
                    }])),
                }),
                namespaces: Arc::new(Namespaces::new()),
                base_uri: None,
                location: None,
            },
        }
    }

    fn text_of(variable: &GlobalVariable) -> &str {
        match &variable.instruction.kind {
            InstructionKind::Variable(VariableBinding {
                value: VariableValue::Content(Body(body)),
                ..
            }) => match &body[0].kind {
                InstructionKind::Text { text, .. } => text,
                _ => "",
            },
            _ => "",
        }
    }

    #[test]
    fn test_rule_table_is_sorted_stably_by_priority() {
        let mut builder = StylesheetBuilder::new(None);
        builder.add_template(template("a", Some(2.0))).unwrap();
        builder.add_template(template("b | *", None)).unwrap();
        builder.add_template(template("c", Some(2.0))).unwrap();
        let sheet = builder.finish();
        let order: Vec<(String, f64)> = sheet
            .rules(&None)
            .iter()
            .map(|entry| (entry.pattern.to_string(), entry.priority))
            .collect();
        assert_eq!(
            order,
            vec![
                ("child::*".to_string(), -0.5),
                ("child::b".to_string(), 0.0),
                ("child::a".to_string(), 2.0),
                ("child::c".to_string(), 2.0),
            ]
        );
    }

    #[test]
    fn test_duplicate_names_in_one_module() {
        let mut builder = StylesheetBuilder::new(None);
        let mut named = template("a", None);
        named.name = Some(ExpandedName::local("t"));
        builder.add_template(named).unwrap();
        let mut again = template("b", None);
        again.name = Some(ExpandedName::local("t"));
        assert!(matches!(builder.add_template(again), Err(CompileError::DuplicateName(_))));

        builder.add_variable(global("v", "1")).unwrap();
        assert!(matches!(
            builder.add_variable(global("v", "2")),
            Err(CompileError::VariableRedefinition(_))
        ));
    }

    #[test]
    fn test_variables_merge_with_importer_winning() {
        let mut base = StylesheetBuilder::new(None);
        base.add_variable(global("shared", "base")).unwrap();
        base.add_variable(global("only-base", "base")).unwrap();
        let base = Arc::new(base.finish());

        let mut main = StylesheetBuilder::new(None);
        main.add_import(base);
        main.add_variable(global("shared", "main")).unwrap();
        let main = main.finish();

        let merged: Vec<(&str, &str)> = main
            .global_variables()
            .iter()
            .map(|v| (v.name.local_name.as_str(), text_of(v)))
            .collect();
        assert_eq!(merged, vec![("only-base", "base"), ("shared", "main")]);
    }

    #[test]
    fn test_whitespace_lists_merge_additively() {
        let ns = Namespaces::new();
        let mut base = StylesheetBuilder::new(None);
        base.add_strip_space(NameTest::parse("*", &ns).unwrap());
        base.add_preserve_space(NameTest::parse("pre", &ns).unwrap());
        let base = Arc::new(base.finish());

        let mut main = StylesheetBuilder::new(None);
        main.add_import(base);
        main.add_preserve_space(NameTest::parse("code", &ns).unwrap());
        let main = main.finish();

        assert!(main.has_whitespace_rules());
        assert!(main.strips_whitespace(&ExpandedName::local("div")));
        assert!(!main.strips_whitespace(&ExpandedName::local("pre")));
        assert!(!main.strips_whitespace(&ExpandedName::local("code")));
    }

    #[test]
    fn test_output_declarations_merge() {
        let mut base = StylesheetBuilder::new(None);
        base.add_output(&OutputDeclaration {
            method: Some("text".into()),
            indent: Some(true),
            cdata_section_elements: vec![ExpandedName::local("a")],
            ..OutputDeclaration::default()
        });
        let base = Arc::new(base.finish());

        let mut main = StylesheetBuilder::new(None);
        main.add_import(base);
        main.add_output(&OutputDeclaration {
            method: Some("xml".into()),
            cdata_section_elements: vec![ExpandedName::local("b")],
            ..OutputDeclaration::default()
        });
        let settings = main.finish().output().settings();
        assert_eq!(settings.method, OutputMethod::Xml);
        assert!(settings.indent);
        assert_eq!(settings.cdata_section_elements.len(), 2);
    }

    #[test]
    fn test_stylesheets_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Stylesheet>();
    }
}
