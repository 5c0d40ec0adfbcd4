//! Typed records: the atomic unit of stored metadata.
//!
//! A record is keyed by `(filename, code)` and carries one [`Value`] whose
//! wire shape is fixed by its 4-byte type tag:
//!
//! | tag    | wire value                                   |
//! |--------|----------------------------------------------|
//! | `bool` | 1 byte, 0 or 1                               |
//! | `long` | `u32`                                        |
//! | `shor` | `u16` in a 4-byte slot (2 pad bytes first)   |
//! | `blob` | `u32` length + bytes                         |
//! | `ustr` | `u32` UTF-16 unit count + UTF-16BE units     |
//! | `type` | 4 raw bytes                                  |
//! | `comp` | `u64`                                        |
//! | `dutc` | `u64`                                        |
//! | other  | `u32` length + bytes, kept opaque            |

pub mod codec;

use std::cmp::Ordering;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{DsStoreError, Result};

pub use codec::{decode_record, encode_record};

// ── FourCC ───────────────────────────────────────────────────────────────────

/// A 4-byte code, used both for record codes and type tags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        FourCC(*bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Parse from a string of exactly four ASCII characters.
    pub fn parse(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !s.is_ascii() {
            return Err(DsStoreError::format(0, format!("'{s}' is not a 4-character ASCII code")));
        }
        Ok(FourCC([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{self}'")
    }
}

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

// ── Type tags ────────────────────────────────────────────────────────────────

pub const TAG_BOOL: FourCC = FourCC::new(b"bool");
pub const TAG_LONG: FourCC = FourCC::new(b"long");
pub const TAG_SHOR: FourCC = FourCC::new(b"shor");
pub const TAG_BLOB: FourCC = FourCC::new(b"blob");
pub const TAG_USTR: FourCC = FourCC::new(b"ustr");
pub const TAG_TYPE: FourCC = FourCC::new(b"type");
pub const TAG_COMP: FourCC = FourCC::new(b"comp");
pub const TAG_DUTC: FourCC = FourCC::new(b"dutc");

// ── Value ────────────────────────────────────────────────────────────────────

/// A decoded record value.  The variant determines the wire type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Bool(bool),
    Long(u32),
    Shor(u16),
    Blob(#[serde(serialize_with = "as_hex")] Vec<u8>),
    Ustr(String),
    Type(FourCC),
    Comp(u64),
    Dutc(u64),
    /// A tag this codec does not know, carried as a length-prefixed blob.
    /// Encoding one whose `tag` is a known tag is a format error.
    Unknown {
        tag:  FourCC,
        #[serde(serialize_with = "as_hex")]
        data: Vec<u8>,
    },
}

impl Value {
    /// The 4-byte type tag written before this value.
    pub fn tag(&self) -> FourCC {
        match self {
            Value::Bool(_)            => TAG_BOOL,
            Value::Long(_)            => TAG_LONG,
            Value::Shor(_)            => TAG_SHOR,
            Value::Blob(_)            => TAG_BLOB,
            Value::Ustr(_)            => TAG_USTR,
            Value::Type(_)            => TAG_TYPE,
            Value::Comp(_)            => TAG_COMP,
            Value::Dutc(_)            => TAG_DUTC,
            Value::Unknown { tag, .. } => *tag,
        }
    }

    /// Encoded size of the value part only.
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::Bool(_)                 => 1,
            Value::Long(_) | Value::Shor(_) => 4,
            Value::Type(_)                 => 4,
            Value::Comp(_) | Value::Dutc(_) => 8,
            Value::Blob(b)                 => 4 + b.len(),
            Value::Unknown { data, .. }    => 4 + data.len(),
            Value::Ustr(s)                 => 4 + 2 * s.encode_utf16().count(),
        }
    }
}

fn as_hex<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

// ── Record ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub filename: String,
    pub code:     FourCC,
    #[serde(flatten)]
    pub value:    Value,
}

impl Record {
    pub fn new(filename: impl Into<String>, code: FourCC, value: Value) -> Self {
        Self { filename: filename.into(), code, value }
    }

    /// True if this record has the given `(filename, code)` key.
    #[inline]
    pub fn matches(&self, filename: &str, code: FourCC) -> bool {
        self.code == code && self.filename == filename
    }

    /// Full encoded size: name length + UTF-16 name + code + tag + value.
    pub fn encoded_len(&self) -> usize {
        4 + 2 * self.filename.encode_utf16().count() + 4 + 4 + self.value.encoded_len()
    }

    /// Serialization order: filenames compared case-insensitively, then
    /// case-sensitively to break ties, then codes bytewise.
    pub fn cmp_key(&self, other: &Record) -> Ordering {
        cmp_filenames(&self.filename, &other.filename).then_with(|| self.code.cmp(&other.code))
    }
}

/// Total order over filenames: case-folded comparison first, exact second.
pub fn cmp_filenames(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}

/// Sort in serialization order.  Stable, so duplicate keys keep input order.
pub fn sort_records(records: &mut [Record]) {
    records.sort_by(Record::cmp_key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rec(name: &str, code: &[u8; 4]) -> Record {
        Record::new(name, FourCC::new(code), Value::Bool(true))
    }

    #[test]
    fn sort_is_case_insensitive_then_by_code() {
        let mut v = vec![
            rec("beta", b"Iloc"),
            rec("Alpha", b"cmmt"),
            rec("alpha", b"Iloc"),
            rec("Alpha", b"Iloc"),
            rec(".", b"vstl"),
        ];
        sort_records(&mut v);
        let keys: Vec<(String, String)> =
            v.iter().map(|r| (r.filename.clone(), r.code.to_string())).collect();
        assert_eq!(
            keys,
            vec![
                (".".into(), "vstl".into()),
                ("Alpha".into(), "Iloc".into()),
                ("Alpha".into(), "cmmt".into()),
                ("alpha".into(), "Iloc".into()),
                ("beta".into(), "Iloc".into()),
            ]
        );
    }

    #[test]
    fn fourcc_parse_and_display() {
        assert_eq!(FourCC::parse("Iloc").unwrap(), FourCC::new(b"Iloc"));
        assert!(FourCC::parse("Ilo").is_err());
        assert!(FourCC::parse("Ilocx").is_err());
        assert_eq!(FourCC([b'a', 0, b'b', b'c']).to_string(), "a\\x00bc");
    }

    #[test]
    fn encoded_len_counts_utf16_units() {
        let r = Record::new("é𝄞", FourCC::new(b"cmmt"), Value::Ustr("ab".into()));
        // name: 1 + 2 units; value: 4 + 2*2
        assert_eq!(r.encoded_len(), 4 + 6 + 8 + 8);
    }

    #[test]
    fn value_serializes_with_tag_name() {
        let r = Record::new(".", FourCC::new(b"vstl"), Value::Type(FourCC::new(b"icnv")));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["filename"], ".");
        assert_eq!(json["code"], "vstl");
        assert_eq!(json["type"], "type");
        assert_eq!(json["value"], "icnv");
    }

    proptest! {
        #[test]
        fn filename_order_is_total_and_antisymmetric(a in "[a-zA-Z. ]{0,8}", b in "[a-zA-Z. ]{0,8}") {
            let ab = cmp_filenames(&a, &b);
            let ba = cmp_filenames(&b, &a);
            prop_assert_eq!(ab, ba.reverse());
            prop_assert_eq!(ab == Ordering::Equal, a == b);
        }
    }
}
