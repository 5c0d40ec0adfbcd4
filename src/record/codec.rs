//! Record wire codec.
//!
//! A record on the wire is:
//!
//! ```text
//! u32 name_len | name_len × u16 (UTF-16BE) | code[4] | tag[4] | value
//! ```
//!
//! Decoding never truncates: a length that is zero (for names), above its
//! cap, or longer than the bytes left in the node fails the whole decode.

use crate::block::{BlockReader, BlockWriter};
use crate::error::{DsStoreError, Result};
use super::{FourCC, Record, Value};
use super::{TAG_BLOB, TAG_BOOL, TAG_COMP, TAG_DUTC, TAG_LONG, TAG_SHOR, TAG_TYPE, TAG_USTR};

/// Longest filename accepted, in UTF-16 units.
pub const MAX_FILENAME_UNITS: u32 = 1024;
/// Longest `ustr` value accepted, in UTF-16 units.
pub const MAX_USTR_UNITS:     u32 = 64 * 1024;
/// Longest `blob` (or unknown-tag) payload accepted.
pub const MAX_BLOB_LEN:       u32 = 1024 * 1024;

const KNOWN_TAGS: [FourCC; 8] = [TAG_BOOL, TAG_LONG, TAG_SHOR, TAG_BLOB, TAG_USTR, TAG_TYPE, TAG_COMP, TAG_DUTC];

// ── Decode ───────────────────────────────────────────────────────────────────

/// Decode one record at the reader's cursor.
pub fn decode_record(r: &mut BlockReader<'_>) -> Result<Record> {
    let start = r.position();

    let name_len = r.read_u32()?;
    if name_len == 0 || name_len > MAX_FILENAME_UNITS {
        return Err(DsStoreError::format(start, format!("filename length {name_len} out of range")));
    }
    let filename = read_utf16(r, name_len)?;

    let code = FourCC(r.read_array::<4>()?);
    let tag  = FourCC(r.read_array::<4>()?);
    let value = decode_value(r, tag)?;

    Ok(Record { filename, code, value })
}

fn decode_value(r: &mut BlockReader<'_>, tag: FourCC) -> Result<Value> {
    let at = r.position();
    let value = match tag {
        TAG_BOOL => match r.read_u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            b => return Err(DsStoreError::format(at, format!("bool byte {b:#04x}"))),
        },
        TAG_LONG => Value::Long(r.read_u32()?),
        TAG_SHOR => {
            let pad = r.read_u16()?;
            if pad != 0 {
                return Err(DsStoreError::format(at, format!("shor high half {pad:#06x} is not zero")));
            }
            Value::Shor(r.read_u16()?)
        }
        TAG_TYPE => Value::Type(FourCC(r.read_array::<4>()?)),
        TAG_COMP => Value::Comp(r.read_u64()?),
        TAG_DUTC => Value::Dutc(r.read_u64()?),
        TAG_USTR => {
            let units = r.read_u32()?;
            if units > MAX_USTR_UNITS {
                return Err(DsStoreError::format(at, format!("ustr length {units} exceeds {MAX_USTR_UNITS}")));
            }
            Value::Ustr(read_utf16(r, units)?)
        }
        TAG_BLOB => Value::Blob(read_blob(r)?),
        other => Value::Unknown { tag: other, data: read_blob(r)? },
    };
    Ok(value)
}

fn read_blob(r: &mut BlockReader<'_>) -> Result<Vec<u8>> {
    let at = r.position();
    let len = r.read_u32()?;
    if len > MAX_BLOB_LEN {
        return Err(DsStoreError::format(at, format!("blob length {len} exceeds {MAX_BLOB_LEN}")));
    }
    Ok(r.read_bytes(len as usize)?.to_vec())
}

fn read_utf16(r: &mut BlockReader<'_>, units: u32) -> Result<String> {
    let at = r.position();
    let raw = r.read_bytes(units as usize * 2)?;
    let wide: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&wide).map_err(|_| DsStoreError::format(at, "invalid UTF-16"))
}

// ── Encode ───────────────────────────────────────────────────────────────────

/// Append one record in wire format.
pub fn encode_record(record: &Record, w: &mut BlockWriter) -> Result<()> {
    if let Value::Unknown { tag, .. } = &record.value {
        if KNOWN_TAGS.contains(tag) {
            return Err(DsStoreError::format(
                w.len() as u64,
                format!("opaque value for '{}' carries the known tag {tag}", record.filename),
            ));
        }
    }
    let name_units = record.filename.encode_utf16().count();
    if name_units == 0 || name_units > MAX_FILENAME_UNITS as usize {
        return Err(DsStoreError::format(
            w.len() as u64,
            format!("filename '{}' has {name_units} UTF-16 units", record.filename),
        ));
    }
    w.write_u32(name_units as u32)?;
    write_utf16(&record.filename, w)?;
    w.write_bytes(record.code.as_bytes());
    w.write_bytes(record.value.tag().as_bytes());

    match &record.value {
        Value::Bool(b)  => w.write_u8(u8::from(*b))?,
        Value::Long(v)  => w.write_u32(*v)?,
        Value::Shor(v)  => {
            w.write_u16(0)?;
            w.write_u16(*v)?;
        }
        Value::Type(t)  => w.write_bytes(t.as_bytes()),
        Value::Comp(v) | Value::Dutc(v) => w.write_u64(*v)?,
        Value::Ustr(s)  => {
            let units = s.encode_utf16().count();
            if units > MAX_USTR_UNITS as usize {
                return Err(DsStoreError::format(w.len() as u64, format!("ustr of {units} units too long")));
            }
            w.write_u32(units as u32)?;
            write_utf16(s, w)?;
        }
        Value::Blob(data) | Value::Unknown { data, .. } => {
            if data.len() > MAX_BLOB_LEN as usize {
                return Err(DsStoreError::format(w.len() as u64, format!("blob of {} bytes too long", data.len())));
            }
            w.write_u32(data.len() as u32)?;
            w.write_bytes(data);
        }
    }
    Ok(())
}

fn write_utf16(s: &str, w: &mut BlockWriter) -> Result<()> {
    for unit in s.encode_utf16() {
        w.write_u16(unit)?;
    }
    Ok(())
}
