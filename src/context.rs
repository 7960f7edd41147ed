//! Element-Kontext-Stack.
//!
//! Frame 0 is the document root and never carries a name. Every other frame
//! belongs to one open element. The rule stored in a frame is the rule to
//! resume in once the frame's child element has ended.

use std::sync::Arc;

use crate::event::NamespaceDeclaration;
use crate::grammar::RuleRef;
use crate::qname::QName;
use crate::{Error, Result};

const INITIAL_CAPACITY: usize = 16;
const GROWTH_FACTOR: usize = 4;

/// Kontext pro Element.
#[derive(Debug, Clone)]
pub struct ElementContext {
    qname: Option<QName>,
    qname_string: Option<Arc<str>>,
    pub(crate) rule: RuleRef,
    ns_declarations: Option<Vec<NamespaceDeclaration>>,
}

impl ElementContext {
    /// Root frame.
    pub(crate) fn root(rule: RuleRef) -> Self {
        Self { qname: None, qname_string: None, rule, ns_declarations: None }
    }

    /// Frame for an open element.
    pub(crate) fn element(qname: QName, rule: RuleRef) -> Self {
        Self { qname: Some(qname), qname_string: None, rule, ns_declarations: None }
    }

    /// Element name; `None` for the root frame.
    pub fn qname(&self) -> Option<&QName> {
        self.qname.as_ref()
    }

    /// `{uri}local` form of the name, computed on first use.
    pub fn qname_string(&mut self) -> Option<&str> {
        let qname = self.qname.as_ref()?;
        Some(&**self.qname_string.get_or_insert_with(|| Arc::from(qname.to_clark())))
    }

    /// Prefix of the element name, if known.
    pub fn prefix(&self) -> Option<&str> {
        self.qname.as_ref()?.prefix.as_deref()
    }

    // NS mit local_element_ns liefert den Prefix nach
    pub(crate) fn set_prefix(&mut self, prefix: Arc<str>) {
        if let Some(qname) = &mut self.qname {
            qname.prefix = Some(prefix);
        }
    }

    /// Prefix bindings declared on this element, in declaration order.
    pub fn ns_declarations(&self) -> &[NamespaceDeclaration] {
        self.ns_declarations.as_deref().unwrap_or_default()
    }

    /// Adds a binding; the same (uri, prefix) pair may appear only once per
    /// element.
    pub(crate) fn declare(&mut self, decl: NamespaceDeclaration) -> Result<()> {
        let decls = self.ns_declarations.get_or_insert_with(Vec::new);
        if decls.iter().any(|d| d.prefix == decl.prefix && d.uri == decl.uri) {
            return Err(Error::DuplicatePrefix {
                prefix: decl.prefix.to_string(),
                uri: decl.uri.to_string(),
            });
        }
        decls.push(decl);
        Ok(())
    }

    /// Latest binding of `prefix` on this element.
    pub fn resolve(&self, prefix: &str) -> Option<&Arc<str>> {
        self.ns_declarations().iter().rev().find(|d| &*d.prefix == prefix).map(|d| &d.uri)
    }
}

/// Array-backed stack of [`ElementContext`] frames.
///
/// Starts with room for 16 frames and grows to four times its capacity when
/// full.
#[derive(Debug)]
pub struct ElementContextStack {
    frames: Vec<ElementContext>,
}

impl ElementContextStack {
    /// Stack holding only the root frame.
    pub fn new(root_rule: RuleRef) -> Self {
        let mut frames = Vec::with_capacity(INITIAL_CAPACITY);
        frames.push(ElementContext::root(root_rule));
        Self { frames }
    }

    /// Drops every element frame and resets the root.
    pub fn reset(&mut self, root_rule: RuleRef) {
        self.frames.truncate(1);
        if let Some(root) = self.frames.first_mut() {
            *root = ElementContext::root(root_rule);
        } else {
            self.frames.push(ElementContext::root(root_rule));
        }
    }

    /// Pushes a frame.
    pub fn push(&mut self, frame: ElementContext) {
        if self.frames.len() == self.frames.capacity() {
            let mut grown = Vec::with_capacity(self.frames.capacity() * GROWTH_FACTOR);
            grown.append(&mut self.frames);
            log::trace!("element stack grown to {}", grown.capacity());
            self.frames = grown;
        }
        self.frames.push(frame);
    }

    /// Pops an element frame.
    ///
    /// # Errors
    ///
    /// `StackUnderflow` if only the root frame is left.
    pub fn pop(&mut self) -> Result<ElementContext> {
        if self.frames.len() <= 1 {
            return Err(Error::StackUnderflow);
        }
        self.frames.pop().ok_or(Error::StackUnderflow)
    }

    /// Innermost frame.
    pub fn top(&self) -> &ElementContext {
        // Frame 0 wird nie entfernt
        &self.frames[self.frames.len() - 1]
    }

    /// Innermost frame, mutable.
    pub fn top_mut(&mut self) -> &mut ElementContext {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Number of frames including the root.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`; the root frame is permanent.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Allocated frame slots.
    pub fn capacity(&self) -> usize {
        self.frames.capacity()
    }

    /// Element frames from innermost to outermost, root excluded.
    pub fn elements(&self) -> impl Iterator<Item = &ElementContext> {
        self.frames[1..].iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(n: u32) -> RuleRef {
        RuleRef::Runtime(n)
    }

    #[test]
    fn grows_by_factor_four() {
        let mut stack = ElementContextStack::new(rule(0));
        assert_eq!(stack.capacity(), 16);
        for i in 0..16 {
            stack.push(ElementContext::element(QName::new("", format!("e{i}")), rule(i)));
        }
        assert_eq!(stack.len(), 17);
        assert_eq!(stack.capacity(), 64);
        assert_eq!(stack.top().qname().unwrap().local_name.as_ref(), "e15");
    }

    #[test]
    fn pop_at_root_underflows() {
        let mut stack = ElementContextStack::new(rule(0));
        stack.push(ElementContext::element(QName::new("", "a"), rule(1)));
        assert!(stack.pop().is_ok());
        assert_eq!(stack.pop().unwrap_err(), Error::StackUnderflow);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn qname_string_cached() {
        let mut frame = ElementContext::element(QName::new("urn:x", "a"), rule(0));
        assert_eq!(frame.qname_string(), Some("{urn:x}a"));
        assert_eq!(frame.qname_string(), Some("{urn:x}a"));
        assert_eq!(ElementContext::root(rule(0)).qname_string(), None);
    }

    #[test]
    fn duplicate_binding_rejected() {
        let mut frame = ElementContext::element(QName::new("", "a"), rule(0));
        frame.declare(NamespaceDeclaration::new("p", "urn:p")).unwrap();
        frame.declare(NamespaceDeclaration::new("q", "urn:p")).unwrap();
        let err = frame.declare(NamespaceDeclaration::new("p", "urn:p")).unwrap_err();
        assert!(matches!(err, Error::DuplicatePrefix { .. }));
        assert_eq!(frame.resolve("q").map(|u| u.as_ref()), Some("urn:p"));
        assert_eq!(frame.resolve("r"), None);
    }

    #[test]
    fn reset_keeps_root_only() {
        let mut stack = ElementContextStack::new(rule(0));
        stack.push(ElementContext::element(QName::new("", "a"), rule(1)));
        stack.reset(rule(7));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.top().rule, rule(7));
        assert_eq!(stack.elements().count(), 0);
    }
}
