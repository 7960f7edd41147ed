//! Grammar traversal: current rule, element nesting, prefix scopes and the
//! per-run pool of learning built-in rules.
//!
//! Nothing in here touches the wire; both coder halves drive the same
//! traversal so that decoder and encoder evolve their grammars identically.

use std::sync::Arc;

use crate::context::{ElementContext, ElementContextStack};
use crate::event::{Event, NamespaceDeclaration};
use crate::grammar::{ElementDecl, Grammar, Production, Rule, RuleKind, RuleRef};
use crate::options::Profile;
use crate::qname::QName;
use crate::string_table::XML_NS;
use crate::{FastHashMap, Result};

/// Traversal state of one coder instance.
#[derive(Debug)]
pub struct Traversal {
    grammar: Arc<Grammar>,
    profile: Profile,
    stack: ElementContextStack,
    current: RuleRef,
    runtime_rules: Vec<Rule>,
    pool: FastHashMap<QName, Arc<ElementDecl>>,
}

impl Traversal {
    /// Traversal positioned at the document rule.
    pub fn new(grammar: Arc<Grammar>, profile: Profile) -> Self {
        let current = RuleRef::Grammar(grammar.document_rule());
        Self {
            grammar,
            profile,
            stack: ElementContextStack::new(current),
            current,
            runtime_rules: Vec::new(),
            pool: FastHashMap::default(),
        }
    }

    /// Resets the stack to the root frame, selects the document or fragment
    /// rule and forgets every runtime rule.
    pub fn init_for_each_run(&mut self, fragment: bool) {
        let entry =
            if fragment { self.grammar.fragment_rule() } else { self.grammar.document_rule() };
        self.current = RuleRef::Grammar(entry);
        self.stack.reset(self.current);
        self.runtime_rules.clear();
        self.pool.clear();
        log::debug!("traversal reset (fragment={fragment})");
    }

    /// Die geteilte Grammar.
    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    /// Rule the next event code is resolved against.
    pub fn current_rule(&self) -> RuleRef {
        self.current
    }

    /// Moves to `rule`.
    pub fn set_current_rule(&mut self, rule: RuleRef) {
        self.current = rule;
    }

    /// Resolves a rule reference.
    ///
    /// # Panics
    ///
    /// If `rule` does not belong to this run.
    pub fn rule(&self, rule: RuleRef) -> &Rule {
        match rule {
            RuleRef::Grammar(id) => self.grammar.rule(id),
            RuleRef::Runtime(index) => &self.runtime_rules[index as usize],
        }
    }

    /// Opens an element: the current frame resumes in `resume` once the
    /// element is closed, and traversal continues in the element's rule.
    pub fn push_element(&mut self, decl: &ElementDecl, qname: QName, resume: RuleRef) {
        self.stack.top_mut().rule = resume;
        self.current = decl.rule;
        self.stack.push(ElementContext::element(qname, decl.rule));
    }

    /// Closes the innermost element and restores its parent's resume rule.
    ///
    /// # Errors
    ///
    /// `StackUnderflow` if no element is open.
    pub fn pop_element(&mut self) -> Result<ElementContext> {
        let frame = self.stack.pop()?;
        self.current = self.stack.top().rule;
        Ok(frame)
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    /// Name of the innermost open element.
    pub fn element_qname(&self) -> Option<&QName> {
        self.stack.top().qname()
    }

    /// Cached `{uri}local` form of the innermost open element.
    pub fn element_qname_string(&mut self) -> Option<&str> {
        self.stack.top_mut().qname_string()
    }

    /// Prefix of the innermost open element.
    pub fn element_prefix(&self) -> Option<&str> {
        self.stack.top().prefix()
    }

    /// Namespace declarations of the innermost open element.
    pub fn declared_prefix_declarations(&self) -> &[NamespaceDeclaration] {
        self.stack.top().ns_declarations()
    }

    /// Binds a prefix in the innermost scope. With `local_element_ns` the
    /// prefix also becomes the prefix of the innermost element.
    ///
    /// # Errors
    ///
    /// `DuplicatePrefix` if the same pair is already declared there.
    pub fn declare_prefix(&mut self, decl: NamespaceDeclaration) -> Result<()> {
        let element_prefix = decl.local_element_ns.then(|| Arc::clone(&decl.prefix));
        let top = self.stack.top_mut();
        top.declare(decl)?;
        if let Some(prefix) = element_prefix {
            top.set_prefix(prefix);
        }
        Ok(())
    }

    /// Nearest binding of `prefix`, innermost scope first; the root frame is
    /// not searched. `xml` is always bound.
    pub fn resolve_uri(&self, prefix: &str) -> Option<Arc<str>> {
        if let Some(uri) = self.stack.elements().find_map(|frame| frame.resolve(prefix)) {
            return Some(Arc::clone(uri));
        }
        (prefix == "xml").then(|| Arc::from(XML_NS))
    }

    /// Declaration used for an element matched by a wildcard: the global
    /// declaration if any, the shared ur-type under the ultra-constrained
    /// profile, otherwise a learning built-in rule pair created on first use.
    pub fn resolve_or_create_generic_start_element(&mut self, qname: &QName) -> Arc<ElementDecl> {
        if let Some(decl) = self.grammar.global_element(qname) {
            return Arc::clone(decl);
        }
        if self.profile == Profile::UltraConstrained {
            return Arc::clone(self.grammar.ur_type());
        }
        if let Some(decl) = self.pool.get(qname) {
            return Arc::clone(decl);
        }

        let start = self.runtime_rules.len() as u32;
        let content = RuleRef::Runtime(start + 1);
        let mut start_tag = Rule::new(RuleKind::StartTag);
        start_tag.content = Some(content);
        let mut element_content = Rule::new(RuleKind::ElementContent);
        element_content.productions.push(Production::new(Event::EndElement, None));
        self.runtime_rules.push(start_tag);
        self.runtime_rules.push(element_content);

        let name = QName::new(Arc::clone(&qname.uri), Arc::clone(&qname.local_name));
        let decl = Arc::new(ElementDecl { qname: name.clone(), rule: RuleRef::Runtime(start) });
        self.pool.insert(name, Arc::clone(&decl));
        log::debug!("runtime grammar created for {}", qname.to_clark());
        decl
    }

    /// Records a production matched through an undeclared level.
    ///
    /// Only built-in element rules learn: StartTag learns AT, SE, CH and EE
    /// (once); ElementContent learns SE and CH. Everything else is ignored.
    pub fn learn(&mut self, rule: RuleRef, event: Event) {
        let RuleRef::Runtime(index) = rule else { return };
        let Some(target) = self.runtime_rules.get_mut(index as usize) else { return };
        let next = match (target.kind(), &event) {
            (RuleKind::StartTag, Event::Attribute(_)) => Some(rule),
            (RuleKind::StartTag, Event::EndElement) if target.has_end_element() => return,
            (RuleKind::StartTag, Event::EndElement) => None,
            (RuleKind::StartTag, Event::StartElement(_) | Event::CharactersGeneric) => {
                target.content()
            }
            (RuleKind::ElementContent, Event::StartElement(_) | Event::CharactersGeneric) => {
                Some(rule)
            }
            _ => return,
        };
        log::debug!("learned {:?} in runtime rule {index}", event.event_type());
        target.learn(Production::new(event, next));
    }

    /// Number of runtime rules created in this run.
    pub fn runtime_rule_count(&self) -> usize {
        self.runtime_rules.len()
    }
}
