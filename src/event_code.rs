//! Event-Code-Tabellen (ein bis drei Teile pro Event Code).
//!
//! Level one holds the rule's own productions in order. Levels two and three
//! are synthesised per rule kind from the fidelity options: undeclared
//! productions of built-in and schema-informed element rules plus the
//! document-level DT, CM and PI. A level that prunes down to nothing is
//! dropped and the level below moves up.
//!
//! Each part is an n-bit unsigned integer; the width is `⌈log₂ k⌉` where `k`
//! counts the entries of that level plus one escape value if a deeper level
//! exists.

use std::borrow::Cow;
use std::fmt;

use crate::bit_width::for_count;
use crate::channel::{DecoderChannel, EncoderChannel};
use crate::event::{Event, EventType};
use crate::grammar::{Rule, RuleKind, RuleRef};
use crate::n_bit_unsigned_integer;
use crate::options::ExiOptions;
use crate::{Error, Result};

/// Ein Event Code mit 1-3 Teilen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventCode {
    part1: u32,
    part2: Option<u32>,
    part3: Option<u32>,
}

impl EventCode {
    /// Single-part code.
    pub fn one(part1: u32) -> Self {
        Self { part1, part2: None, part3: None }
    }

    /// Two-part code.
    pub fn two(part1: u32, part2: u32) -> Self {
        Self { part1, part2: Some(part2), part3: None }
    }

    /// Three-part code.
    pub fn three(part1: u32, part2: u32, part3: u32) -> Self {
        Self { part1, part2: Some(part2), part3: Some(part3) }
    }

    /// Anzahl der Teile.
    pub fn len(&self) -> usize {
        1 + usize::from(self.part2.is_some()) + usize::from(self.part3.is_some())
    }

    /// Always `false`; a code has at least one part.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Erster Teil.
    pub fn part1(&self) -> u32 {
        self.part1
    }

    /// Zweiter Teil.
    pub fn part2(&self) -> Option<u32> {
        self.part2
    }

    /// Dritter Teil.
    pub fn part3(&self) -> Option<u32> {
        self.part3
    }
}

/// Dotted form, e.g. `1.3.0`.
impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.part1)?;
        if let Some(p2) = self.part2 {
            write!(f, ".{p2}")?;
        }
        if let Some(p3) = self.part3 {
            write!(f, ".{p3}")?;
        }
        Ok(())
    }
}

/// One resolvable production of a table.
#[derive(Debug, Clone)]
pub struct CodeEntry {
    /// Production kind reported to callers.
    pub event_type: EventType,
    /// Grammar terminal for level-one entries; `None` for synthesised ones.
    pub event: Option<Event>,
    /// Follow rule; `None` for EE and ED.
    pub next: Option<RuleRef>,
}

impl CodeEntry {
    fn synthesised(event_type: EventType, next: Option<RuleRef>) -> Self {
        Self { event_type, event: None, next }
    }
}

/// Event-code table of one rule under a fixed set of options.
#[derive(Debug, Clone)]
pub struct CodeTable {
    kind: RuleKind,
    levels: [Vec<CodeEntry>; 3],
}

impl CodeTable {
    /// Builds the table for `rule`, addressed as `rule_ref`.
    pub fn build(rule: &Rule, rule_ref: RuleRef, options: &ExiOptions) -> Self {
        let first: Vec<CodeEntry> = rule
            .productions()
            .iter()
            .map(|p| CodeEntry {
                event_type: p.event.event_type(),
                event: Some(p.event.clone()),
                next: p.next,
            })
            .collect();
        let (second, third) = undeclared_levels(rule, rule_ref, options);
        let mut levels = [first, second, third];
        if levels[1].is_empty() {
            // leere zweite Ebene: dritte rueckt auf
            levels.swap(1, 2);
        }
        Self { kind: rule.kind(), levels }
    }

    /// Entries of level `level` (0-based).
    pub fn level(&self, level: usize) -> &[CodeEntry] {
        self.levels.get(level).map_or(&[][..], Vec::as_slice)
    }

    fn widths(&self) -> [u8; 3] {
        let [l1, l2, l3] = &self.levels;
        [
            for_count(l1.len() + usize::from(!l2.is_empty())),
            for_count(l2.len() + usize::from(!l3.is_empty())),
            for_count(l3.len()),
        ]
    }

    fn code_at(&self, level: usize, index: usize) -> EventCode {
        let escape1 = self.levels[0].len() as u32;
        let escape2 = self.levels[1].len() as u32;
        match level {
            0 => EventCode::one(index as u32),
            1 => EventCode::two(escape1, index as u32),
            _ => EventCode::three(escape1, escape2, index as u32),
        }
    }

    /// First entry, level by level, that satisfies `pred`.
    pub fn find(&self, pred: impl Fn(&CodeEntry) -> bool) -> Option<(EventCode, &CodeEntry)> {
        self.levels.iter().enumerate().find_map(|(level, entries)| {
            entries
                .iter()
                .position(&pred)
                .map(|index| (self.code_at(level, index), &entries[index]))
        })
    }

    /// Reads an event code and resolves it.
    ///
    /// # Errors
    ///
    /// `InvalidEventCode` if a part exceeds the table.
    pub fn decode<C: DecoderChannel + ?Sized>(
        &self,
        channel: &mut C,
    ) -> Result<(EventCode, &CodeEntry)> {
        let widths = self.widths();
        let mut parts = [0u32; 3];
        for level in 0..3 {
            let entries = &self.levels[level];
            let part = n_bit_unsigned_integer::decode(channel, widths[level])?;
            parts[level] = part;
            if let Some(entry) = entries.get(part as usize) {
                let code = self.code_at(level, part as usize);
                log::trace!("{:?}: event code {code} -> {:?}", self.kind, entry.event_type);
                return Ok((code, entry));
            }
            let has_deeper = self.levels.get(level + 1).is_some_and(|l| !l.is_empty());
            if part as usize != entries.len() || !has_deeper {
                return Err(self.invalid(&parts[..=level]));
            }
        }
        Err(self.invalid(&parts))
    }

    /// Writes `code` with this table's part widths.
    pub fn encode<C: EncoderChannel + ?Sized>(
        &self,
        channel: &mut C,
        code: &EventCode,
    ) -> Result<()> {
        let widths = self.widths();
        n_bit_unsigned_integer::encode(channel, code.part1, widths[0])?;
        if let Some(p2) = code.part2 {
            n_bit_unsigned_integer::encode(channel, p2, widths[1])?;
        }
        if let Some(p3) = code.part3 {
            n_bit_unsigned_integer::encode(channel, p3, widths[2])?;
        }
        log::trace!("{:?}: wrote event code {code}", self.kind);
        Ok(())
    }

    fn invalid(&self, parts: &[u32]) -> Error {
        let code = parts.iter().map(u32::to_string).collect::<Vec<_>>().join(".");
        Error::InvalidEventCode {
            event_code: Cow::Owned(code),
            grammar_state: Cow::Owned(format!("{:?}", self.kind)),
        }
    }
}

/// Zweite und dritte Ebene je Regeltyp.
fn undeclared_levels(
    rule: &Rule,
    rule_ref: RuleRef,
    options: &ExiOptions,
) -> (Vec<CodeEntry>, Vec<CodeEntry>) {
    use EventType as T;

    let preserve = options.preserve();
    let this = Some(rule_ref);
    let content = rule.content().or(this);
    let mut second = Vec::new();
    let mut third = Vec::new();
    let push_cm_pi = |level: &mut Vec<CodeEntry>| {
        if preserve.comments {
            level.push(CodeEntry::synthesised(T::Comment, this));
        }
        if preserve.pis {
            level.push(CodeEntry::synthesised(T::ProcessingInstruction, this));
        }
    };

    match rule.kind() {
        RuleKind::Document | RuleKind::Fragment => {}
        RuleKind::DocContent => {
            if preserve.dtd {
                second.push(CodeEntry::synthesised(T::DocType, this));
            }
            push_cm_pi(&mut third);
        }
        RuleKind::DocEnd | RuleKind::FragmentContent => push_cm_pi(&mut second),
        RuleKind::StartTag => {
            second.push(CodeEntry::synthesised(T::EndElementUndeclared, None));
            second.push(CodeEntry::synthesised(T::AttributeGenericUndeclared, this));
            if preserve.prefixes {
                second.push(CodeEntry::synthesised(T::NamespaceDeclaration, this));
            }
            push_element_content(&mut second, content, preserve.dtd);
            push_cm_pi(&mut third);
        }
        RuleKind::ElementContent => {
            push_element_content(&mut second, this, preserve.dtd);
            push_cm_pi(&mut third);
        }
        RuleKind::TypeStart if options.strict() => {
            if rule.is_type_castable() {
                second.push(CodeEntry::synthesised(T::AttributeXsiType, this));
            }
            if rule.is_nillable() {
                second.push(CodeEntry::synthesised(T::AttributeXsiNil, this));
            }
        }
        RuleKind::TypeAttributes | RuleKind::TypeContent if options.strict() => {}
        kind @ (RuleKind::TypeStart | RuleKind::TypeAttributes | RuleKind::TypeContent) => {
            if !rule.has_end_element() {
                second.push(CodeEntry::synthesised(T::EndElementUndeclared, None));
            }
            if kind == RuleKind::TypeStart {
                second.push(CodeEntry::synthesised(T::AttributeXsiType, this));
                second.push(CodeEntry::synthesised(T::AttributeXsiNil, this));
            }
            if kind != RuleKind::TypeContent {
                second.push(CodeEntry::synthesised(T::AttributeGenericUndeclared, this));
            }
            if kind == RuleKind::TypeStart && preserve.prefixes {
                second.push(CodeEntry::synthesised(T::NamespaceDeclaration, this));
            }
            let next = if kind == RuleKind::TypeContent { this } else { content };
            push_element_content(&mut second, next, preserve.dtd);
            push_cm_pi(&mut third);
        }
    }
    (second, third)
}

// SE(*), CH und (mit DTD) ER fuehren alle in dieselbe Folgeregel
fn push_element_content(
    level: &mut Vec<CodeEntry>,
    next: Option<RuleRef>,
    entity_references: bool,
) {
    level.push(CodeEntry::synthesised(EventType::StartElementGenericUndeclared, next));
    level.push(CodeEntry::synthesised(EventType::CharactersGenericUndeclared, next));
    if entity_references {
        level.push(CodeEntry::synthesised(EventType::EntityReference, next));
    }
}
