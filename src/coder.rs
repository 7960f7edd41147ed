//! State shared by decoder and encoder.
//!
//! Both halves own one `BodyCoder`: grammar, options, traversal, string
//! table, value codec and warning sink. The helpers here keep the content
//! dispatch identical on both sides.

use std::sync::Arc;

use crate::datatype::{Datatype, LexicalValueCodec, TypedValueCodec, Value, ValueCodec};
use crate::error::{Error, ErrorHandler, LogErrorHandler, Result};
use crate::event::Event;
use crate::event_code::CodeTable;
use crate::grammar::{Grammar, RuleRef};
use crate::options::ExiOptions;
use crate::qname::QName;
use crate::string_table::StringTable;
use crate::traversal::Traversal;
use crate::boolean;

/// Naming context for values outside any element.
static NO_CONTEXT: std::sync::LazyLock<QName> = std::sync::LazyLock::new(|| QName::new("", ""));

pub(crate) struct BodyCoder {
    pub(crate) options: ExiOptions,
    pub(crate) traversal: Traversal,
    pub(crate) string_table: StringTable,
    pub(crate) value_codec: Box<dyn ValueCodec>,
    error_handler: Box<dyn ErrorHandler>,
}

impl BodyCoder {
    pub(crate) fn new(grammar: Arc<Grammar>, options: ExiOptions) -> Result<Self> {
        options.validate()?;
        let preserve = options.preserve();
        let value_codec: Box<dyn ValueCodec> = if preserve.lexical_values {
            Box::new(LexicalValueCodec::new(preserve.prefixes))
        } else {
            Box::new(TypedValueCodec::new(preserve.prefixes))
        };
        Ok(Self {
            string_table: StringTable::for_grammar(&grammar, &options),
            traversal: Traversal::new(grammar, options.profile()),
            options,
            value_codec,
            error_handler: Box::new(LogErrorHandler),
        })
    }

    pub(crate) fn init_for_each_run(&mut self) {
        self.traversal.init_for_each_run(self.options.fragment());
        self.string_table.clear();
    }

    pub(crate) fn set_error_handler(&mut self, handler: Box<dyn ErrorHandler>) {
        self.error_handler = handler;
    }

    pub(crate) fn throw_warning(&mut self, warning: Error) {
        self.error_handler.warning(&warning);
    }

    pub(crate) fn preserve_prefixes(&self) -> bool {
        self.options.preserve().prefixes
    }

    /// Event-code table of the current rule.
    pub(crate) fn code_table(&self) -> CodeTable {
        let current = self.traversal.current_rule();
        CodeTable::build(self.traversal.rule(current), current, &self.options)
    }

    /// Name of the innermost element, used as value context.
    pub(crate) fn value_context(&self) -> QName {
        self.traversal.element_qname().unwrap_or(&NO_CONTEXT).clone()
    }

    /// Datatype of an attribute value that is neither xsi:type nor a
    /// schema-informed xsi:nil: declared datatype, else global attribute,
    /// else String.
    pub(crate) fn attribute_datatype(&self, event: Option<&Event>, qname: &QName) -> Datatype {
        match event {
            Some(Event::Attribute(decl)) => decl.datatype.clone(),
            _ => self
                .traversal
                .grammar()
                .global_attribute(qname)
                .cloned()
                .unwrap_or(Datatype::String),
        }
    }

    /// Rule switch requested by an xsi:type value, with a warning for
    /// unknown types.
    pub(crate) fn xsi_type_redirect(&mut self, value: &Value) -> Option<RuleRef> {
        let Value::QName(type_name) = value else {
            self.throw_warning(Error::XsiTypeNotFound(value.to_string()));
            return None;
        };
        match self.traversal.grammar().type_rule(type_name) {
            Some(rule) => Some(RuleRef::Grammar(rule)),
            None => {
                self.throw_warning(Error::XsiTypeNotFound(type_name.to_clark()));
                None
            }
        }
    }

    /// Rule switch requested by an xsi:nil value in `rule`.
    pub(crate) fn xsi_nil_redirect(&self, rule: RuleRef, value: &Value) -> Option<RuleRef> {
        let nil = match value {
            Value::Boolean(b) => *b,
            Value::String(s) => boolean::parse(s) == Some(true),
            _ => false,
        };
        if !nil {
            return None;
        }
        self.traversal.rule(rule).type_empty().map(RuleRef::Grammar)
    }
}
