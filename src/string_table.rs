//! String table (EXI §7.3): compact identifiers for names and values.
//!
//! Name partitions (URI, prefix, local name) only ever grow within a run and
//! start from the pre-populated baseline of EXI Appendix D plus the names the
//! grammar declares.
//!
//! Value partitions are a global ring of at most `value_partition_capacity`
//! entries plus one local sequence per naming context (the qualified name of
//! the element or attribute the value belongs to). When the ring wraps, the
//! overwritten value's local slot becomes a permanent hole; local ids never
//! shift and are never reused.
//!
//! Lifecycle: one table per coder instance, reset by [`StringTable::clear`]
//! at the start of every run.

use std::rc::Rc;
use std::sync::Arc;

use crate::bit_width::for_count;
use crate::channel::{DecoderChannel, EncoderChannel};
use crate::grammar::Grammar;
use crate::options::ExiOptions;
use crate::qname::QName;
use crate::{
    Error, FastHashMap, FastIndexMap, FastIndexSet, Result, n_bit_unsigned_integer, string,
    unsigned_integer,
};

/// XML Namespace URI (`xml:` prefix).
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
/// XML Schema instance namespace (xsi:type, xsi:nil).
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
/// XML Schema namespace; pre-populated for schema-informed grammars only.
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

const XML_LOCAL_NAMES: [&str; 4] = ["base", "id", "lang", "space"];
const XSI_LOCAL_NAMES: [&str; 2] = ["nil", "type"];

/// Built-in XML Schema type names, lexically sorted (EXI Table D-5).
const XSD_BUILTIN_TYPES: [&str; 46] = [
    "ENTITIES", "ENTITY", "ID", "IDREF", "IDREFS", "NCName", "NMTOKEN", "NMTOKENS",
    "NOTATION", "Name", "QName", "anySimpleType", "anyType", "anyURI", "base64Binary",
    "boolean", "byte", "date", "dateTime", "decimal", "double", "duration", "float",
    "gDay", "gMonth", "gMonthDay", "gYear", "gYearMonth", "hexBinary", "int", "integer",
    "language", "long", "negativeInteger", "nonNegativeInteger", "nonPositiveInteger",
    "normalizedString", "positiveInteger", "short", "string", "time", "token",
    "unsignedByte", "unsignedInt", "unsignedLong", "unsignedShort",
];

/// Prefix- und Local-Name-Partition einer URI.
#[derive(Debug, Clone, Default)]
struct UriPartition {
    prefixes: FastIndexSet<Arc<str>>,
    local_names: FastIndexSet<Arc<str>>,
}

/// Alle Namens-Partitionen; die URI-ID ist der Index in `uris`.
#[derive(Debug, Clone, Default)]
struct NamePartitions {
    uris: FastIndexMap<Arc<str>, UriPartition>,
}

impl NamePartitions {
    /// Baseline nach EXI Appendix D.
    fn builtin(schema_informed: bool) -> Self {
        let mut names = Self::default();
        let empty = names.add_uri("");
        names.add_prefix(empty, "");
        let xml = names.add_uri(XML_NS);
        names.add_prefix(xml, "xml");
        for local in XML_LOCAL_NAMES {
            names.add_local_name(xml, local);
        }
        let xsi = names.add_uri(XSI_NS);
        names.add_prefix(xsi, "xsi");
        for local in XSI_LOCAL_NAMES {
            names.add_local_name(xsi, local);
        }
        if schema_informed {
            let xsd = names.add_uri(XSD_NS);
            for local in XSD_BUILTIN_TYPES {
                names.add_local_name(xsd, local);
            }
        }
        names
    }

    fn add_uri(&mut self, uri: &str) -> usize {
        if let Some(id) = self.uris.get_index_of(uri) {
            return id;
        }
        self.uris.insert_full(Arc::from(uri), UriPartition::default()).0
    }

    fn partition(&self, uri_id: usize) -> Option<&UriPartition> {
        self.uris.get_index(uri_id).map(|(_, p)| p)
    }

    fn partition_mut(&mut self, uri_id: usize) -> Option<&mut UriPartition> {
        self.uris.get_index_mut(uri_id).map(|(_, p)| p)
    }

    fn add_prefix(&mut self, uri_id: usize, prefix: &str) -> Option<usize> {
        let part = self.partition_mut(uri_id)?;
        Some(match part.prefixes.get_index_of(prefix) {
            Some(id) => id,
            None => part.prefixes.insert_full(Arc::from(prefix)).0,
        })
    }

    fn add_local_name(&mut self, uri_id: usize, local_name: &str) -> Option<usize> {
        let part = self.partition_mut(uri_id)?;
        Some(match part.local_names.get_index_of(local_name) {
            Some(id) => id,
            None => part.local_names.insert_full(Arc::from(local_name)).0,
        })
    }
}

/// Result of a value lookup for the current naming context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueHit {
    /// Present in the context's own local partition at this id.
    Local(usize),
    /// Present in the global partition at this id (owned by another context).
    Global(usize),
}

/// Wo ein Value aktuell liegt.
#[derive(Debug, Clone, Copy)]
struct ValueLocation {
    context: usize,
    local_id: usize,
    global_id: usize,
}

/// Ein belegter Slot der globalen Partition samt Besitzer.
#[derive(Debug, Clone)]
struct GlobalSlot {
    value: Rc<str>,
    context: usize,
    local_id: usize,
}

/// String table of one coder instance.
#[derive(Debug, Clone)]
pub struct StringTable {
    names: NamePartitions,
    /// Zustand nach Pre-Population, Ziel von `clear()`.
    baseline: NamePartitions,
    global: Vec<GlobalSlot>,
    local: FastIndexMap<QName, Vec<Option<Rc<str>>>>,
    lookup: FastHashMap<Rc<str>, ValueLocation>,
    /// Zuletzt beschriebener Ring-Slot; `None` = noch nichts eingefuegt.
    cursor: Option<usize>,
    capacity: Option<usize>,
    max_length: Option<usize>,
}

impl StringTable {
    /// Schema-less table with the given value bounds (`None` = unbounded).
    pub fn new(capacity: Option<u32>, max_length: Option<u32>) -> Self {
        Self::with_names(NamePartitions::builtin(false), capacity, max_length)
    }

    /// Table pre-populated for `grammar`, bounded as `options` say.
    pub fn for_grammar(grammar: &Grammar, options: &ExiOptions) -> Self {
        let mut names = NamePartitions::builtin(grammar.is_schema_informed());
        for (uri, local_names) in grammar.name_partitions() {
            let uri_id = names.add_uri(uri);
            for local in local_names {
                names.add_local_name(uri_id, local);
            }
        }
        Self::with_names(names, options.value_partition_capacity(), options.value_max_length())
    }

    fn with_names(names: NamePartitions, capacity: Option<u32>, max_length: Option<u32>) -> Self {
        Self {
            baseline: names.clone(),
            names,
            global: Vec::new(),
            local: FastIndexMap::default(),
            lookup: FastHashMap::default(),
            cursor: None,
            capacity: capacity.map(|c| c as usize),
            max_length: max_length.map(|m| m as usize),
        }
    }

    /// Resets all partitions to the pre-populated state and empties the value
    /// partitions.
    pub fn clear(&mut self) {
        self.names.clone_from(&self.baseline);
        self.global.clear();
        self.local.clear();
        self.lookup.clear();
        self.cursor = None;
    }

    // === URI / Prefix / Local-Name ===

    /// Number of URIs.
    pub fn uri_count(&self) -> usize {
        self.names.uris.len()
    }

    /// Compact id of `uri`.
    pub fn uri_id(&self, uri: &str) -> Option<usize> {
        self.names.uris.get_index_of(uri)
    }

    /// URI by compact id.
    pub fn uri(&self, id: usize) -> Option<&Arc<str>> {
        self.names.uris.get_index(id).map(|(uri, _)| uri)
    }

    /// Adds `uri` (idempotent) and returns its id.
    pub fn add_uri(&mut self, uri: &str) -> usize {
        self.names.add_uri(uri)
    }

    /// Number of prefixes bound to the URI `uri_id`.
    pub fn prefix_count(&self, uri_id: usize) -> usize {
        self.names.partition(uri_id).map_or(0, |p| p.prefixes.len())
    }

    /// Compact id of `prefix` within `uri_id`.
    pub fn prefix_id(&self, uri_id: usize, prefix: &str) -> Option<usize> {
        self.names.partition(uri_id)?.prefixes.get_index_of(prefix)
    }

    /// Prefix by compact id.
    pub fn prefix(&self, uri_id: usize, id: usize) -> Option<&Arc<str>> {
        self.names.partition(uri_id)?.prefixes.get_index(id)
    }

    /// Adds `prefix` under `uri_id` (idempotent).
    pub fn add_prefix(&mut self, uri_id: usize, prefix: &str) -> Result<usize> {
        self.names.add_prefix(uri_id, prefix).ok_or(Error::InvalidCompactId(uri_id))
    }

    /// Number of local names under `uri_id`.
    pub fn local_name_count(&self, uri_id: usize) -> usize {
        self.names.partition(uri_id).map_or(0, |p| p.local_names.len())
    }

    /// Compact id of `local_name` within `uri_id`.
    pub fn local_name_id(&self, uri_id: usize, local_name: &str) -> Option<usize> {
        self.names.partition(uri_id)?.local_names.get_index_of(local_name)
    }

    /// Local name by compact id.
    pub fn local_name(&self, uri_id: usize, id: usize) -> Option<&Arc<str>> {
        self.names.partition(uri_id)?.local_names.get_index(id)
    }

    /// Adds `local_name` under `uri_id` (idempotent).
    pub fn add_local_name(&mut self, uri_id: usize, local_name: &str) -> Result<usize> {
        self.names.add_local_name(uri_id, local_name).ok_or(Error::InvalidCompactId(uri_id))
    }

    // === Values ===

    /// Adds `value` under the naming context `context`.
    ///
    /// Silently ignored when the value is longer than the maximum length,
    /// when the value partitions are disabled (capacity 0), when it is empty,
    /// or when it is already present in the table. Otherwise it is appended to
    /// the context's local sequence and placed at the next ring slot; an
    /// occupied slot is overwritten and its previous owner's local entry
    /// becomes a hole.
    pub fn add_value(&mut self, context: &QName, value: &str) {
        if self.accepts(value) && !self.lookup.contains_key(value) {
            self.insert_value(context, Rc::from(value));
        }
    }

    /// Like [`add_value`](Self::add_value) for an already shared string.
    pub(crate) fn add_value_rc(&mut self, context: &QName, value: Rc<str>) {
        if self.accepts(&value) && !self.lookup.contains_key(&*value) {
            self.insert_value(context, value);
        }
    }

    fn accepts(&self, value: &str) -> bool {
        if let Some(max) = self.max_length
            && value.chars().count() > max
        {
            return false;
        }
        if self.capacity == Some(0) {
            return false;
        }
        !value.is_empty()
    }

    fn insert_value(&mut self, context: &QName, value: Rc<str>) {
        let entry = self.local.entry(context.clone());
        let ctx = entry.index();
        let locals = entry.or_default();
        let local_id = locals.len();
        locals.push(Some(Rc::clone(&value)));

        let slot = GlobalSlot { value: Rc::clone(&value), context: ctx, local_id };
        let global_id = match self.capacity {
            None => {
                self.global.push(slot);
                self.global.len() - 1
            }
            Some(cap) => {
                let g = self.cursor.map_or(0, |c| (c + 1) % cap);
                self.cursor = Some(g);
                if let Some(occupied) = self.global.get_mut(g) {
                    let evicted = std::mem::replace(occupied, slot);
                    if let Some((_, owner)) = self.local.get_index_mut(evicted.context)
                        && let Some(hole) = owner.get_mut(evicted.local_id)
                    {
                        *hole = None;
                    }
                    self.lookup.remove(&evicted.value);
                } else {
                    self.global.push(slot);
                }
                g
            }
        };
        self.lookup.insert(value, ValueLocation { context: ctx, local_id, global_id });
    }

    /// Finds `value`: a local hit if `context` owns it, a global hit otherwise.
    pub fn lookup_value(&self, context: &QName, value: &str) -> Option<ValueHit> {
        let loc = self.lookup.get(value)?;
        if self.local.get_index_of(context) == Some(loc.context) {
            Some(ValueHit::Local(loc.local_id))
        } else {
            Some(ValueHit::Global(loc.global_id))
        }
    }

    /// Local value by id; holes and out-of-range ids are `InvalidCompactId`.
    pub fn local_value(&self, context: &QName, id: usize) -> Result<Rc<str>> {
        self.local
            .get(context)
            .and_then(|values| values.get(id))
            .and_then(Clone::clone)
            .ok_or(Error::InvalidCompactId(id))
    }

    /// Global value by id.
    pub fn global_value(&self, id: usize) -> Result<Rc<str>> {
        self.global
            .get(id)
            .map(|slot| Rc::clone(&slot.value))
            .ok_or(Error::InvalidCompactId(id))
    }

    /// Length of the context's local sequence, holes included.
    pub fn local_value_count(&self, context: &QName) -> usize {
        self.local.get(context).map_or(0, Vec::len)
    }

    /// Number of occupied global slots.
    pub fn global_value_count(&self) -> usize {
        self.global.len()
    }

    /// The context's local sequence (`None` = evicted hole).
    pub fn local_values(&self, context: &QName) -> &[Option<Rc<str>>] {
        self.local.get(context).map_or(&[][..], Vec::as_slice)
    }

    /// Global values in slot order.
    pub fn global_values(&self) -> impl Iterator<Item = &str> {
        self.global.iter().map(|slot| &*slot.value)
    }
}

// ============================================================================
// Value-Codierung (EXI §7.3.3)
// ============================================================================

/// Decodes a string value: 0 = local hit, 1 = global hit, `L + 2` = miss
/// with `L` characters (added to the table).
pub fn decode_value<C: DecoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    context: &QName,
) -> Result<Rc<str>> {
    match unsigned_integer::decode(channel)? {
        0 => {
            let n = for_count(table.local_value_count(context));
            let id = n_bit_unsigned_integer::decode(channel, n)? as usize;
            table.local_value(context, id)
        }
        1 => {
            let n = for_count(table.global_value_count());
            let id = n_bit_unsigned_integer::decode(channel, n)? as usize;
            table.global_value(id)
        }
        len_plus_two => {
            let value: Rc<str> = string::decode_chars(channel, len_plus_two - 2)?.into();
            table.add_value_rc(context, Rc::clone(&value));
            Ok(value)
        }
    }
}

/// Encodes a string value against the table; the dual of [`decode_value`].
pub fn encode_value<C: EncoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    context: &QName,
    value: &str,
) -> Result<()> {
    match table.lookup_value(context, value) {
        Some(ValueHit::Local(id)) => {
            unsigned_integer::encode(channel, 0)?;
            let n = for_count(table.local_value_count(context));
            n_bit_unsigned_integer::encode(channel, id as u32, n)
        }
        Some(ValueHit::Global(id)) => {
            unsigned_integer::encode(channel, 1)?;
            let n = for_count(table.global_value_count());
            n_bit_unsigned_integer::encode(channel, id as u32, n)
        }
        None => {
            string::encode_with_offset(channel, value, 2)?;
            table.add_value(context, value);
            Ok(())
        }
    }
}
