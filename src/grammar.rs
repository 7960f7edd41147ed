//! Grammar-Datenstrukturen: Regeln, Productions, Deklarationen.
//!
//! A [`Grammar`] is immutable after [`GrammarBuilder::build`] and shared via
//! `Arc` between any number of coder instances. Built-in element rules that
//! learn productions are never stored here; they live per run in the
//! [`Traversal`](crate::traversal::Traversal) and are addressed through
//! [`RuleRef::Runtime`].
//!
//! # Layout
//!
//! Every grammar carries the document, fragment and ur-type rules at fixed
//! indices; schema-derived rules are appended by the builder.

use std::sync::Arc;

use crate::datatype::Datatype;
use crate::event::{Event, compare_events};
use crate::qname::QName;
use crate::string_table::XSD_NS;
use crate::{Error, FastHashMap, FastIndexMap, Result};

/// Index of an immutable rule inside its [`Grammar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(pub(crate) u32);

impl RuleId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reference to a rule: either grammar-owned or a per-run built-in rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleRef {
    /// Unveraenderliche Regel der Grammar.
    Grammar(RuleId),
    /// Lernende Regel aus dem Laufzeit-Pool.
    Runtime(u32),
}

/// Role of a rule; selects the synthesised undeclared levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Document: SD DocContent
    Document,
    /// DocContent: SE(G) / SE(*) DocEnd; DT; CM, PI
    DocContent,
    /// DocEnd: ED; CM, PI
    DocEnd,
    /// Fragment: SD FragmentContent
    Fragment,
    /// FragmentContent: SE(F) / SE(*) FragmentContent, ED; CM, PI
    FragmentContent,
    /// Built-in StartTagContent (learning).
    StartTag,
    /// Built-in ElementContent (learning).
    ElementContent,
    /// First rule of a schema-informed type.
    TypeStart,
    /// Further attribute-accepting rule of a schema-informed type.
    TypeAttributes,
    /// Content rule of a schema-informed type.
    TypeContent,
}

impl RuleKind {
    /// `true` for rules derived from a schema type (including the ur-type).
    pub fn is_schema_informed(self) -> bool {
        matches!(self, Self::TypeStart | Self::TypeAttributes | Self::TypeContent)
    }

    /// `true` for the built-in element rules that learn.
    pub fn is_built_in_element(self) -> bool {
        matches!(self, Self::StartTag | Self::ElementContent)
    }
}

/// A production `rule: event next`.
#[derive(Debug, Clone)]
pub struct Production {
    /// Matched terminal.
    pub event: Event,
    /// Follow rule; `None` for EE and ED.
    pub next: Option<RuleRef>,
}

impl Production {
    /// Creates a production.
    pub fn new(event: Event, next: Option<RuleRef>) -> Self {
        Self { event, next }
    }
}

/// A grammar rule (non-terminal) with its level-one productions.
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) kind: RuleKind,
    pub(crate) productions: Vec<Production>,
    pub(crate) content: Option<RuleRef>,
    pub(crate) type_empty: Option<RuleId>,
    pub(crate) nillable: bool,
    pub(crate) type_castable: bool,
}

impl Rule {
    /// Empty rule of `kind`.
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            productions: Vec::new(),
            content: None,
            type_empty: None,
            nillable: false,
            type_castable: false,
        }
    }

    /// Rollentyp.
    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// `true` if derived from a schema type.
    pub fn is_schema_informed(&self) -> bool {
        self.kind.is_schema_informed()
    }

    /// Level-one productions in event-code order.
    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    /// Rule entered by undeclared SE/CH matched in a start-tag rule.
    pub fn content(&self) -> Option<RuleRef> {
        self.content
    }

    /// Rule that replaces this one after `xsi:nil="true"`.
    pub fn type_empty(&self) -> Option<RuleId> {
        self.type_empty
    }

    /// `true` if xsi:nil may appear (strict mode).
    pub fn is_nillable(&self) -> bool {
        self.nillable
    }

    /// `true` if xsi:type may appear (strict mode).
    pub fn is_type_castable(&self) -> bool {
        self.type_castable
    }

    /// `true` if an EE production sits at level one.
    pub fn has_end_element(&self) -> bool {
        self.productions.iter().any(|p| matches!(p.event, Event::EndElement))
    }

    /// Prepends a learned production (it receives event code 0).
    pub(crate) fn learn(&mut self, production: Production) {
        self.productions.insert(0, production);
    }
}

/// A declared element: name and the rule its content starts in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDecl {
    /// Element name.
    pub qname: QName,
    /// First rule of the element's type.
    pub rule: RuleRef,
}

/// A declared attribute: name and value datatype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    /// Attribute name.
    pub qname: QName,
    /// Datatype of the value.
    pub datatype: Datatype,
}

const DOCUMENT: RuleId = RuleId(0);
const DOC_CONTENT: RuleId = RuleId(1);
const DOC_END: RuleId = RuleId(2);
const FRAGMENT: RuleId = RuleId(3);
const FRAGMENT_CONTENT: RuleId = RuleId(4);
const UR_TYPE_START: RuleId = RuleId(5);
const UR_TYPE_CONTENT: RuleId = RuleId(6);

/// Immutable, shareable grammar.
#[derive(Debug)]
pub struct Grammar {
    rules: Vec<Rule>,
    ur_type: Arc<ElementDecl>,
    global_elements: FastIndexMap<QName, Arc<ElementDecl>>,
    global_attributes: FastHashMap<QName, Datatype>,
    types: FastHashMap<QName, RuleId>,
    schema_informed: bool,
    name_partitions: Vec<(Arc<str>, Vec<Arc<str>>)>,
}

impl Grammar {
    /// Grammar without schema knowledge: every element uses learning
    /// built-in rules.
    pub fn schema_less() -> Arc<Self> {
        let mut builder = GrammarBuilder::new();
        builder.schema_informed = false;
        builder.finish()
    }

    /// Rule by id.
    ///
    /// # Panics
    ///
    /// If `id` was not produced by this grammar's builder.
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    /// Number of rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Entry rule of a document run.
    pub fn document_rule(&self) -> RuleId {
        DOCUMENT
    }

    /// Entry rule of a fragment run.
    pub fn fragment_rule(&self) -> RuleId {
        FRAGMENT
    }

    /// Shared ur-type declaration used for undeclared elements under the
    /// ultra-constrained profile.
    pub fn ur_type(&self) -> &Arc<ElementDecl> {
        &self.ur_type
    }

    /// Global element declaration for `qname`.
    pub fn global_element(&self, qname: &QName) -> Option<&Arc<ElementDecl>> {
        self.global_elements.get(qname)
    }

    /// Global element declarations in declaration order.
    pub fn global_elements(&self) -> impl Iterator<Item = &Arc<ElementDecl>> {
        self.global_elements.values()
    }

    /// Datatype of a global attribute.
    pub fn global_attribute(&self, qname: &QName) -> Option<&Datatype> {
        self.global_attributes.get(qname)
    }

    /// First rule of a named type (xsi:type target).
    pub fn type_rule(&self, qname: &QName) -> Option<RuleId> {
        self.types.get(qname).copied()
    }

    /// `true` if built from schema information.
    pub fn is_schema_informed(&self) -> bool {
        self.schema_informed
    }

    /// Schema-known names per URI, URIs and local names sorted; used to
    /// pre-populate the string table.
    pub fn name_partitions(&self) -> impl Iterator<Item = (&Arc<str>, &[Arc<str>])> {
        self.name_partitions.iter().map(|(uri, names)| (uri, names.as_slice()))
    }
}

/// Builds a schema-informed [`Grammar`].
///
/// Deklarierte Produktionen werden beim Bauen nicht umsortiert; der Aufrufer
/// legt die Reihenfolge fest (siehe [`compare_events`]). Nur die globalen
/// Elemente in DocContent/FragmentContent werden sortiert.
#[derive(Debug)]
pub struct GrammarBuilder {
    rules: Vec<Rule>,
    global_elements: FastIndexMap<QName, Arc<ElementDecl>>,
    global_attributes: FastHashMap<QName, Datatype>,
    types: FastHashMap<QName, RuleId>,
    schema_informed: bool,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    /// Builder with the fixed document, fragment and ur-type rules.
    pub fn new() -> Self {
        let grammar = |id: RuleId| Some(RuleRef::Grammar(id));

        let mut document = Rule::new(RuleKind::Document);
        document.productions.push(Production::new(Event::StartDocument, grammar(DOC_CONTENT)));
        let doc_content = Rule::new(RuleKind::DocContent);
        let mut doc_end = Rule::new(RuleKind::DocEnd);
        doc_end.productions.push(Production::new(Event::EndDocument, None));
        let mut fragment = Rule::new(RuleKind::Fragment);
        fragment.productions.push(Production::new(Event::StartDocument, grammar(FRAGMENT_CONTENT)));
        let fragment_content = Rule::new(RuleKind::FragmentContent);

        // anyType: AT(*) bleibt im Start, SE(*)/CH wechseln in den Inhalt
        let mut ur_start = Rule::new(RuleKind::TypeStart);
        ur_start.productions = vec![
            Production::new(Event::AttributeGeneric, grammar(UR_TYPE_START)),
            Production::new(Event::StartElementGeneric, grammar(UR_TYPE_CONTENT)),
            Production::new(Event::EndElement, None),
            Production::new(Event::CharactersGeneric, grammar(UR_TYPE_CONTENT)),
        ];
        ur_start.content = grammar(UR_TYPE_CONTENT);
        let mut ur_content = Rule::new(RuleKind::TypeContent);
        ur_content.productions = vec![
            Production::new(Event::StartElementGeneric, grammar(UR_TYPE_CONTENT)),
            Production::new(Event::EndElement, None),
            Production::new(Event::CharactersGeneric, grammar(UR_TYPE_CONTENT)),
        ];

        Self {
            rules: vec![
                document,
                doc_content,
                doc_end,
                fragment,
                fragment_content,
                ur_start,
                ur_content,
            ],
            global_elements: FastIndexMap::default(),
            global_attributes: FastHashMap::default(),
            types: FastHashMap::default(),
            schema_informed: true,
        }
    }

    /// Appends an empty rule of `kind`.
    pub fn add_rule(&mut self, kind: RuleKind) -> RuleId {
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(Rule::new(kind));
        id
    }

    /// First rule of the built-in ur-type.
    pub fn ur_type_rule(&self) -> RuleId {
        UR_TYPE_START
    }

    fn rule_mut(&mut self, id: RuleId) -> Result<&mut Rule> {
        self.rules
            .get_mut(id.index())
            .ok_or_else(|| Error::InvalidValue(format!("unknown rule {}", id.0)))
    }

    /// Appends a level-one production to `rule`.
    ///
    /// # Errors
    ///
    /// `InvalidValue` for an unknown rule id.
    pub fn push(&mut self, rule: RuleId, event: Event, next: Option<RuleId>) -> Result<&mut Self> {
        self.rule_mut(rule)?.productions.push(Production::new(event, next.map(RuleRef::Grammar)));
        Ok(self)
    }

    /// Sets the rule undeclared SE/CH continue in.
    pub fn set_content(&mut self, rule: RuleId, content: RuleId) -> Result<&mut Self> {
        self.rule_mut(rule)?.content = Some(RuleRef::Grammar(content));
        Ok(self)
    }

    /// Marks `rule` nillable with its empty-type replacement.
    pub fn set_nillable(&mut self, rule: RuleId, type_empty: RuleId) -> Result<&mut Self> {
        let r = self.rule_mut(rule)?;
        r.nillable = true;
        r.type_empty = Some(type_empty);
        Ok(self)
    }

    /// Allows xsi:type on `rule` in strict mode.
    pub fn set_type_castable(&mut self, rule: RuleId) -> Result<&mut Self> {
        self.rule_mut(rule)?.type_castable = true;
        Ok(self)
    }

    /// Element declaration whose content starts in `rule`.
    pub fn element(&self, qname: QName, rule: RuleId) -> Arc<ElementDecl> {
        Arc::new(ElementDecl { qname, rule: RuleRef::Grammar(rule) })
    }

    /// Registers a global element; it becomes a declared SE in DocContent
    /// and FragmentContent.
    pub fn global_element(&mut self, decl: Arc<ElementDecl>) -> &mut Self {
        self.global_elements.insert(decl.qname.clone(), decl);
        self
    }

    /// Registers a global attribute datatype.
    pub fn global_attribute(&mut self, qname: QName, datatype: Datatype) -> &mut Self {
        self.global_attributes.insert(qname, datatype);
        self
    }

    /// Registers a named type for xsi:type.
    pub fn named_type(&mut self, qname: QName, rule: RuleId) -> &mut Self {
        self.types.insert(qname, rule);
        self
    }

    /// Finalises the grammar.
    ///
    /// # Errors
    ///
    /// `InvalidGrammar` if a follow rule, content rule, empty-type rule,
    /// element declaration or named type points at a rule this builder did
    /// not create.
    pub fn build(self) -> Result<Arc<Grammar>> {
        self.check_references()?;
        Ok(self.finish())
    }

    fn owns(&self, target: RuleRef) -> bool {
        matches!(target, RuleRef::Grammar(id) if id.index() < self.rules.len())
    }

    // Alle Regel-Verweise muessen auf Regeln dieses Builders zeigen
    fn check_references(&self) -> Result<()> {
        let unknown = |what: String, target: RuleRef| {
            Error::InvalidGrammar(format!("{what} refers to unknown rule {target:?}"))
        };
        for (index, rule) in self.rules.iter().enumerate() {
            for production in &rule.productions {
                if let Some(next) = production.next.filter(|&next| !self.owns(next)) {
                    return Err(unknown(format!("production in rule {index}"), next));
                }
                if let Event::StartElement(decl) = &production.event
                    && !self.owns(decl.rule)
                {
                    return Err(unknown(format!("element {}", decl.qname.to_clark()), decl.rule));
                }
            }
            if let Some(content) = rule.content.filter(|&content| !self.owns(content)) {
                return Err(unknown(format!("content of rule {index}"), content));
            }
            if let Some(empty) = rule.type_empty.map(RuleRef::Grammar).filter(|&e| !self.owns(e)) {
                return Err(unknown(format!("empty type of rule {index}"), empty));
            }
        }
        if let Some(decl) = self.global_elements.values().find(|decl| !self.owns(decl.rule)) {
            return Err(unknown(format!("global element {}", decl.qname.to_clark()), decl.rule));
        }
        let dangling = self.types.iter().find(|&(_, &rule)| !self.owns(RuleRef::Grammar(rule)));
        if let Some((name, &rule)) = dangling {
            return Err(unknown(format!("type {}", name.to_clark()), RuleRef::Grammar(rule)));
        }
        Ok(())
    }

    fn finish(mut self) -> Arc<Grammar> {
        let mut globals: Vec<Event> = self
            .global_elements
            .values()
            .map(|decl| Event::StartElement(Arc::clone(decl)))
            .collect();
        globals.sort_by(compare_events);

        let doc_end = Some(RuleRef::Grammar(DOC_END));
        let doc_content = &mut self.rules[DOC_CONTENT.index()].productions;
        doc_content.extend(globals.iter().cloned().map(|e| Production::new(e, doc_end)));
        doc_content.push(Production::new(Event::StartElementGeneric, doc_end));

        let frag = Some(RuleRef::Grammar(FRAGMENT_CONTENT));
        let fragment_content = &mut self.rules[FRAGMENT_CONTENT.index()].productions;
        fragment_content.extend(globals.into_iter().map(|e| Production::new(e, frag)));
        fragment_content.push(Production::new(Event::StartElementGeneric, frag));
        fragment_content.push(Production::new(Event::EndDocument, None));

        let name_partitions = if self.schema_informed { self.collect_names() } else { Vec::new() };
        let ur_type = Arc::new(ElementDecl {
            qname: QName::new(XSD_NS, "anyType"),
            rule: RuleRef::Grammar(UR_TYPE_START),
        });
        log::debug!(
            "grammar built: {} rules, {} global elements, schema_informed={}",
            self.rules.len(),
            self.global_elements.len(),
            self.schema_informed
        );

        Arc::new(Grammar {
            rules: self.rules,
            ur_type,
            global_elements: self.global_elements,
            global_attributes: self.global_attributes,
            types: self.types,
            schema_informed: self.schema_informed,
            name_partitions,
        })
    }

    // Alle Namen aus Deklarationen und Produktionen, nach URI gruppiert
    fn collect_names(&self) -> Vec<(Arc<str>, Vec<Arc<str>>)> {
        fn add(
            by_uri: &mut FastIndexMap<Arc<str>, Vec<Arc<str>>>,
            uri: &Arc<str>,
            local: Option<&Arc<str>>,
        ) {
            let names = by_uri.entry(Arc::clone(uri)).or_default();
            if let Some(local) = local {
                names.push(Arc::clone(local));
            }
        }

        let mut by_uri = FastIndexMap::default();
        let declared = self
            .global_elements
            .keys()
            .chain(self.global_attributes.keys())
            .chain(self.types.keys());
        for qname in declared {
            add(&mut by_uri, &qname.uri, Some(&qname.local_name));
        }
        for production in self.rules.iter().flat_map(|r| r.productions.iter()) {
            match &production.event {
                Event::StartElement(decl) => {
                    add(&mut by_uri, &decl.qname.uri, Some(&decl.qname.local_name))
                }
                Event::Attribute(decl) => {
                    add(&mut by_uri, &decl.qname.uri, Some(&decl.qname.local_name))
                }
                Event::StartElementNs(uri) | Event::AttributeNs(uri) => add(&mut by_uri, uri, None),
                _ => {}
            }
        }

        let mut partitions: Vec<_> = by_uri.into_iter().collect();
        partitions.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, names) in &mut partitions {
            names.sort();
            names.dedup();
        }
        partitions
    }
}
