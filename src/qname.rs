//! Qualified names and their wire coding (EXI §7.1.7, §7.3.2).
//!
//! A QName is a URI, a local name and an optional prefix. Two QNames are
//! equal if URI and local name are equal, regardless of their prefixes.
//!
//! On the wire every component is coded against the name partitions of the
//! [`StringTable`]: URIs and prefixes as compact ids with a miss code, local
//! names as string literals with a hit code.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use crate::bit_width::for_count;
use crate::channel::{DecoderChannel, EncoderChannel};
use crate::event::NamespaceDeclaration;
use crate::string_table::{StringTable, XSI_NS};
use crate::{Error, Result, boolean, n_bit_unsigned_integer, string, unsigned_integer};

static XSI_TYPE: LazyLock<QName> = LazyLock::new(|| QName::with_prefix(XSI_NS, "type", "xsi"));
static XSI_NIL: LazyLock<QName> = LazyLock::new(|| QName::with_prefix(XSI_NS, "nil", "xsi"));

/// A qualified name.
///
/// `Arc<str>` components: QNames live inside the shared, immutable grammar.
#[derive(Debug, Clone)]
pub struct QName {
    /// The namespace URI. Empty string means no namespace.
    pub uri: Arc<str>,
    /// The local name.
    pub local_name: Arc<str>,
    /// The prefix, if known (only coded when prefixes are preserved).
    pub prefix: Option<Arc<str>>,
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local_name == other.local_name && self.uri == other.uri
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.local_name.hash(state);
    }
}

/// Erst local_name, dann uri; Prefix wird ignoriert.
impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.local_name
            .cmp(&other.local_name)
            .then_with(|| self.uri.cmp(&other.uri))
    }
}

/// `prefix:local_name` with a non-empty prefix, otherwise `local_name`.
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(pfx) if !pfx.is_empty() => write!(f, "{pfx}:{}", self.local_name),
            _ => f.write_str(&self.local_name),
        }
    }
}

impl QName {
    /// Creates a QName without prefix.
    pub fn new(uri: impl Into<Arc<str>>, local_name: impl Into<Arc<str>>) -> Self {
        Self { uri: uri.into(), local_name: local_name.into(), prefix: None }
    }

    /// Creates a QName with prefix.
    pub fn with_prefix(
        uri: impl Into<Arc<str>>,
        local_name: impl Into<Arc<str>>,
        prefix: impl Into<Arc<str>>,
    ) -> Self {
        Self { uri: uri.into(), local_name: local_name.into(), prefix: Some(prefix.into()) }
    }

    /// xsi:type.
    pub fn xsi_type() -> Self {
        XSI_TYPE.clone()
    }

    /// xsi:nil.
    pub fn xsi_nil() -> Self {
        XSI_NIL.clone()
    }

    /// `true` for xsi:type.
    #[inline]
    pub fn is_xsi_type(&self) -> bool {
        &*self.uri == XSI_NS && &*self.local_name == "type"
    }

    /// `true` for xsi:nil.
    #[inline]
    pub fn is_xsi_nil(&self) -> bool {
        &*self.uri == XSI_NS && &*self.local_name == "nil"
    }

    /// `{uri}local_name` form; used as the cached string form of element names.
    pub fn to_clark(&self) -> String {
        if self.uri.is_empty() {
            self.local_name.to_string()
        } else {
            format!("{{{}}}{}", self.uri, self.local_name)
        }
    }
}

/// Splits a lexical `prefix:local` name. No colon means the default prefix.
pub fn split_lexical(lexical: &str) -> (&str, &str) {
    match lexical.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", lexical),
    }
}

// ============================================================================
// Wire coding
// ============================================================================

/// Encodes a URI: n-bit id with `n = ⌈log₂(m+1)⌉`, 0 = miss followed by a
/// string literal. Returns the URI id.
pub fn encode_uri<C: EncoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    uri: &str,
) -> Result<usize> {
    let n = for_count(table.uri_count() + 1);
    match table.uri_id(uri) {
        Some(id) => {
            n_bit_unsigned_integer::encode(channel, id as u32 + 1, n)?;
            Ok(id)
        }
        None => {
            n_bit_unsigned_integer::encode(channel, 0, n)?;
            string::encode(channel, uri)?;
            Ok(table.add_uri(uri))
        }
    }
}

/// Decodes a URI; returns its id and the shared string.
pub fn decode_uri<C: DecoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
) -> Result<(usize, Arc<str>)> {
    let n = for_count(table.uri_count() + 1);
    let code = n_bit_unsigned_integer::decode(channel, n)? as usize;
    let id = if code == 0 {
        let uri = string::decode(channel)?;
        table.add_uri(&uri)
    } else {
        code - 1
    };
    let uri = table.uri(id).cloned().ok_or(Error::InvalidCompactId(id))?;
    Ok((id, uri))
}

/// Encodes a local name: 0 + n-bit id on a hit, `L + 1` + literal on a miss.
pub fn encode_local_name<C: EncoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    uri_id: usize,
    local_name: &str,
) -> Result<()> {
    match table.local_name_id(uri_id, local_name) {
        Some(id) => {
            unsigned_integer::encode(channel, 0)?;
            let n = for_count(table.local_name_count(uri_id));
            n_bit_unsigned_integer::encode(channel, id as u32, n)
        }
        None => {
            string::encode_with_offset(channel, local_name, 1)?;
            table.add_local_name(uri_id, local_name)?;
            Ok(())
        }
    }
}

/// Decodes a local name under `uri_id`.
pub fn decode_local_name<C: DecoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    uri_id: usize,
) -> Result<Arc<str>> {
    let id = match unsigned_integer::decode(channel)? {
        0 => {
            let n = for_count(table.local_name_count(uri_id));
            n_bit_unsigned_integer::decode(channel, n)? as usize
        }
        len_plus_one => {
            let local = string::decode_chars(channel, len_plus_one - 1)?;
            table.add_local_name(uri_id, &local)?
        }
    };
    table.local_name(uri_id, id).cloned().ok_or(Error::InvalidCompactId(id))
}

/// Encodes the prefix of a qualified name when the URI has bound prefixes.
///
/// A prefix not yet in the partition is coded as id 0; the following
/// namespace declaration with `local_element_ns` carries the real one.
pub fn encode_prefix<C: EncoderChannel + ?Sized>(
    channel: &mut C,
    table: &StringTable,
    uri_id: usize,
    prefix: Option<&str>,
) -> Result<()> {
    let m = table.prefix_count(uri_id);
    if m == 0 {
        return Ok(());
    }
    let id = prefix.and_then(|p| table.prefix_id(uri_id, p)).unwrap_or(0);
    n_bit_unsigned_integer::encode(channel, id as u32, for_count(m))
}

/// Decodes the prefix of a qualified name; `None` if the URI has no prefixes yet.
pub fn decode_prefix<C: DecoderChannel + ?Sized>(
    channel: &mut C,
    table: &StringTable,
    uri_id: usize,
) -> Result<Option<Arc<str>>> {
    let m = table.prefix_count(uri_id);
    if m == 0 {
        return Ok(None);
    }
    let id = n_bit_unsigned_integer::decode(channel, for_count(m))? as usize;
    table.prefix(uri_id, id).cloned().map(Some).ok_or(Error::InvalidCompactId(id))
}

/// Encodes URI, local name and (with `preserve_prefixes`) prefix.
pub fn encode_qname<C: EncoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    qname: &QName,
    preserve_prefixes: bool,
) -> Result<()> {
    let uri_id = encode_uri(channel, table, &qname.uri)?;
    encode_local_name(channel, table, uri_id, &qname.local_name)?;
    if preserve_prefixes {
        encode_prefix(channel, table, uri_id, qname.prefix.as_deref())?;
    }
    Ok(())
}

/// Decodes URI, local name and (with `preserve_prefixes`) prefix.
pub fn decode_qname<C: DecoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    preserve_prefixes: bool,
) -> Result<QName> {
    let (uri_id, uri) = decode_uri(channel, table)?;
    let local_name = decode_local_name(channel, table, uri_id)?;
    let prefix = if preserve_prefixes { decode_prefix(channel, table, uri_id)? } else { None };
    Ok(QName { uri, local_name, prefix })
}

/// Encodes the local name (and prefix) of a name whose URI the grammar fixes.
pub fn encode_local_qname<C: EncoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    qname: &QName,
    preserve_prefixes: bool,
) -> Result<()> {
    let uri_id = table.add_uri(&qname.uri);
    encode_local_name(channel, table, uri_id, &qname.local_name)?;
    if preserve_prefixes {
        encode_prefix(channel, table, uri_id, qname.prefix.as_deref())?;
    }
    Ok(())
}

/// Decodes the local name (and prefix) under the grammar-given `uri`.
pub fn decode_local_qname<C: DecoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    uri: &Arc<str>,
    preserve_prefixes: bool,
) -> Result<QName> {
    let uri_id = table.add_uri(uri);
    let local_name = decode_local_name(channel, table, uri_id)?;
    let prefix = if preserve_prefixes { decode_prefix(channel, table, uri_id)? } else { None };
    Ok(QName { uri: Arc::clone(uri), local_name, prefix })
}

/// Encodes the prefix only; URI and local name are fixed by the production.
pub fn encode_declared_qname<C: EncoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    qname: &QName,
    preserve_prefixes: bool,
) -> Result<()> {
    if preserve_prefixes {
        let uri_id = table.add_uri(&qname.uri);
        encode_prefix(channel, table, uri_id, qname.prefix.as_deref())?;
    }
    Ok(())
}

/// Decodes the prefix for a production-fixed `declared` name.
pub fn decode_declared_qname<C: DecoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    declared: &QName,
    preserve_prefixes: bool,
) -> Result<QName> {
    let mut qname = QName::new(Arc::clone(&declared.uri), Arc::clone(&declared.local_name));
    if preserve_prefixes {
        let uri_id = table.add_uri(&declared.uri);
        qname.prefix = decode_prefix(channel, table, uri_id)?;
    }
    Ok(qname)
}

/// Encodes a namespace declaration: URI, prefix with miss option
/// (`n = ⌈log₂(m+1)⌉`), then the local-element-ns bit.
pub fn encode_namespace_declaration<C: EncoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
    decl: &NamespaceDeclaration,
) -> Result<()> {
    let uri_id = encode_uri(channel, table, &decl.uri)?;
    let n = for_count(table.prefix_count(uri_id) + 1);
    match table.prefix_id(uri_id, &decl.prefix) {
        Some(id) => n_bit_unsigned_integer::encode(channel, id as u32 + 1, n)?,
        None => {
            n_bit_unsigned_integer::encode(channel, 0, n)?;
            string::encode(channel, &decl.prefix)?;
            table.add_prefix(uri_id, &decl.prefix)?;
        }
    }
    boolean::encode(channel, decl.local_element_ns)
}

/// Decodes a namespace declaration.
pub fn decode_namespace_declaration<C: DecoderChannel + ?Sized>(
    channel: &mut C,
    table: &mut StringTable,
) -> Result<NamespaceDeclaration> {
    let (uri_id, uri) = decode_uri(channel, table)?;
    let n = for_count(table.prefix_count(uri_id) + 1);
    let id = match n_bit_unsigned_integer::decode(channel, n)? as usize {
        0 => {
            let prefix = string::decode(channel)?;
            table.add_prefix(uri_id, &prefix)?
        }
        code => code - 1,
    };
    let prefix = table.prefix(uri_id, id).cloned().ok_or(Error::InvalidCompactId(id))?;
    let local_element_ns = boolean::decode(channel)?;
    Ok(NamespaceDeclaration { uri, prefix, local_element_ns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BitDecoderChannel, BitEncoderChannel};

    fn encoded(f: impl FnOnce(&mut BitEncoderChannel<Vec<u8>>, &mut StringTable)) -> Vec<u8> {
        let mut table = StringTable::new(None, None);
        let mut ch = BitEncoderChannel::new(Vec::new());
        f(&mut ch, &mut table);
        ch.flush().unwrap();
        ch.into_inner()
    }

    #[test]
    fn equality_ignores_prefix() {
        let a = QName::with_prefix("urn:x", "e", "p");
        let b = QName::new("urn:x", "e");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "p:e");
        assert_eq!(b.to_string(), "e");
        assert_ne!(a, QName::new("urn:y", "e"));
    }

    #[test]
    fn ordering_local_name_first() {
        let (a, b) = (QName::new("urn:a", "a"), QName::new("urn:a", "b"));
        let other = QName::new("urn:b", "a");
        let mut names = vec![other.clone(), b.clone(), a.clone()];
        names.sort();
        assert_eq!(names, [a, other, b]);
    }

    #[test]
    fn reserved_names() {
        assert!(QName::xsi_type().is_xsi_type());
        assert!(!QName::xsi_type().is_xsi_nil());
        assert!(QName::xsi_nil().is_xsi_nil());
        assert!(!QName::new("", "type").is_xsi_type());
    }

    #[test]
    fn lexical_split_and_clark() {
        assert_eq!(split_lexical("p:e"), ("p", "e"));
        assert_eq!(split_lexical("e"), ("", "e"));
        assert_eq!(QName::new("urn:x", "e").to_clark(), "{urn:x}e");
        assert_eq!(QName::new("", "e").to_clark(), "e");
    }

    #[test]
    fn uri_hit_uses_m_plus_one_width() {
        // 3 URIs -> 2 Bits; "" ist id 0 -> Code 1
        let bytes = encoded(|ch, t| {
            encode_uri(ch, t, "").unwrap();
        });
        assert_eq!(bytes, vec![0b0100_0000]);
    }

    #[test]
    fn qname_miss_then_hit() {
        let q = QName::new("urn:x", "item");
        let bytes = encoded(|ch, t| {
            encode_qname(ch, t, &q, false).unwrap();
            encode_qname(ch, t, &q, false).unwrap();
        });

        let mut table = StringTable::new(None, None);
        let mut ch = BitDecoderChannel::new(&bytes[..]);
        assert_eq!(decode_qname(&mut ch, &mut table, false).unwrap(), q);
        assert_eq!(table.uri_id("urn:x"), Some(3));
        assert_eq!(decode_qname(&mut ch, &mut table, false).unwrap(), q);
        assert_eq!(table.local_name_count(3), 1);
    }

    #[test]
    fn local_name_hit_in_builtin_partition() {
        // xml:lang: URI-Code 2 (2 Bits), Local-Name Hit 0 (8 Bits), dann id 2 in 2 Bits
        let q = QName::new(crate::string_table::XML_NS, "lang");
        let bytes = encoded(|ch, t| encode_qname(ch, t, &q, false).unwrap());
        assert_eq!(bytes, vec![0b1000_0000, 0b0010_0000]);
    }

    #[test]
    fn namespace_declaration_round_trip() {
        let decl = NamespaceDeclaration {
            uri: Arc::from("urn:x"),
            prefix: Arc::from("x"),
            local_element_ns: true,
        };
        let again = NamespaceDeclaration { local_element_ns: false, ..decl.clone() };
        let bytes = encoded(|ch, t| {
            encode_namespace_declaration(ch, t, &decl).unwrap();
            encode_namespace_declaration(ch, t, &again).unwrap();
        });
        let mut table = StringTable::new(None, None);
        let mut ch = BitDecoderChannel::new(&bytes[..]);
        assert_eq!(decode_namespace_declaration(&mut ch, &mut table).unwrap(), decl);
        assert_eq!(decode_namespace_declaration(&mut ch, &mut table).unwrap(), again);
        assert_eq!(table.prefix_count(3), 1);
    }

    #[test]
    fn prefix_coded_after_declaration() {
        let decl = NamespaceDeclaration {
            uri: Arc::from("urn:x"),
            prefix: Arc::from("x"),
            local_element_ns: false,
        };
        let q = QName::with_prefix("urn:x", "e", "x");
        let bytes = encoded(|ch, t| {
            encode_namespace_declaration(ch, t, &decl).unwrap();
            encode_qname(ch, t, &q, true).unwrap();
        });
        let mut table = StringTable::new(None, None);
        let mut ch = BitDecoderChannel::new(&bytes[..]);
        decode_namespace_declaration(&mut ch, &mut table).unwrap();
        let decoded = decode_qname(&mut ch, &mut table, true).unwrap();
        assert_eq!(decoded.prefix.as_deref(), Some("x"));
    }
}
