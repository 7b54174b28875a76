//! Ledger binary codec
//!
//! Transactions are a flat sequence of `field header ‖ value` pairs in
//! canonical order. Objects nested in arrays end with `0xE1`, arrays
//! with `0xF1`.

use thiserror::Error;

use super::definitions::{by_code, by_name, FieldDef, TypeCode};
use crate::error::RecoveryError;

const NATIVE_POSITIVE: u64 = 0x4000_0000_0000_0000;
const NATIVE_VALUE_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;
const ISSUED_FLAG: u8 = 0x80;
const ISSUED_AMOUNT_LEN: usize = 48;

const OBJECT_END: (u8, u8) = (14, 1);
const ARRAY_END: (u8, u8) = (15, 1);

const MAX_VL_LEN: usize = 918_744;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of data at offset {0}")]
    UnexpectedEnd(usize),

    #[error("unknown field (type {type_code}, field {nth})")]
    UnknownField { type_code: u8, nth: u8 },

    #[error("unsupported field type: {0}")]
    UnsupportedType(&'static str),

    #[error("invalid length prefix at offset {0}")]
    InvalidLength(usize),

    #[error("value too long to encode: {0} bytes")]
    TooLong(usize),

    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),

    #[error("field {field} has the wrong value type")]
    ValueMismatch { field: &'static str },

    #[error("array element must be an object, found {0}")]
    BadArrayElement(&'static str),
}

impl From<CodecError> for RecoveryError {
    fn from(e: CodecError) -> Self {
        RecoveryError::signing_failed(format!("ledger codec: {}", e))
    }
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Native drops or a raw 48-byte issued amount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Amount {
    Native { drops: u64, positive: bool },
    Issued([u8; ISSUED_AMOUNT_LEN]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Hash(Vec<u8>),
    Amount(Amount),
    Blob(Vec<u8>),
    AccountId([u8; 20]),
    Object(StObject),
    /// Elements are single-field wrappers such as `Signer` or `Memo`
    Array(Vec<Field>),
    Vector256(Vec<[u8; 32]>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub def: &'static FieldDef,
    pub value: FieldValue,
}

impl Field {
    /// Build a field by its definition name
    pub fn named(name: &str, value: FieldValue) -> CodecResult<Self> {
        let def = by_name(name).ok_or(CodecError::UnsupportedType("unknown field name"))?;
        Ok(Self { def, value })
    }
}

/// An ordered set of fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StObject {
    fields: Vec<Field>,
}

impl StObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.def.name == name).map(|f| &f.value)
    }

    /// Insert or replace
    pub fn set(&mut self, field: Field) {
        match self.fields.iter_mut().find(|f| f.def == field.def) {
            Some(existing) => existing.value = field.value,
            None => self.fields.push(field),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let index = self.fields.iter().position(|f| f.def.name == name)?;
        Some(self.fields.remove(index).value)
    }

    fn sorted(&self) -> Vec<&Field> {
        let mut sorted: Vec<&Field> = self.fields.iter().collect();
        sorted.sort_by_key(|f| f.def.ordinal());
        sorted
    }
}

// =============================================================================
// Decoding
// =============================================================================

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let end = end.ok_or(CodecError::UnexpectedEnd(self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn header(&mut self) -> CodecResult<(u8, u8)> {
        let first = self.u8()?;
        let mut type_code = first >> 4;
        let mut nth = first & 0x0F;
        if type_code == 0 {
            type_code = self.u8()?;
        }
        if nth == 0 {
            nth = self.u8()?;
        }
        Ok((type_code, nth))
    }

    fn vl_length(&mut self) -> CodecResult<usize> {
        let at = self.pos;
        let b1 = self.u8()? as usize;
        match b1 {
            0..=192 => Ok(b1),
            193..=240 => {
                let b2 = self.u8()? as usize;
                Ok(193 + (b1 - 193) * 256 + b2)
            }
            241..=254 => {
                let b2 = self.u8()? as usize;
                let b3 = self.u8()? as usize;
                Ok(12_481 + (b1 - 241) * 65_536 + b2 * 256 + b3)
            }
            _ => Err(CodecError::InvalidLength(at)),
        }
    }

    fn field(&mut self) -> CodecResult<(&'static FieldDef, Option<FieldValue>)> {
        let (type_code, nth) = self.header()?;
        let unknown = CodecError::UnknownField { type_code, nth };
        let def = TypeCode::from_code(type_code)
            .and_then(|tc| by_code(tc, nth))
            .ok_or(unknown)?;

        if def.ordinal() == OBJECT_END || def.ordinal() == ARRAY_END {
            return Ok((def, None));
        }
        Ok((def, Some(self.value(def)?)))
    }

    fn value(&mut self, def: &'static FieldDef) -> CodecResult<FieldValue> {
        Ok(match def.type_code {
            TypeCode::UInt8 => FieldValue::UInt8(self.u8()?),
            TypeCode::UInt16 => FieldValue::UInt16(u16::from_be_bytes(self.array()?)),
            TypeCode::UInt32 => FieldValue::UInt32(u32::from_be_bytes(self.array()?)),
            TypeCode::UInt64 => FieldValue::UInt64(u64::from_be_bytes(self.array()?)),
            TypeCode::Hash128 | TypeCode::Hash160 | TypeCode::Hash256 => {
                let len = def.type_code.hash_len().unwrap_or_default();
                FieldValue::Hash(self.take(len)?.to_vec())
            }
            TypeCode::Amount => FieldValue::Amount(self.amount()?),
            TypeCode::Blob => {
                let len = self.vl_length()?;
                FieldValue::Blob(self.take(len)?.to_vec())
            }
            TypeCode::AccountId => {
                let at = self.pos;
                if self.vl_length()? != 20 {
                    return Err(CodecError::InvalidLength(at));
                }
                FieldValue::AccountId(self.array()?)
            }
            TypeCode::StObject => FieldValue::Object(self.object(Some(OBJECT_END))?),
            TypeCode::StArray => FieldValue::Array(self.array_elements()?),
            TypeCode::Vector256 => {
                let at = self.pos;
                let len = self.vl_length()?;
                if len % 32 != 0 {
                    return Err(CodecError::InvalidLength(at));
                }
                let mut hashes = Vec::with_capacity(len / 32);
                for _ in 0..len / 32 {
                    hashes.push(self.array()?);
                }
                FieldValue::Vector256(hashes)
            }
            TypeCode::PathSet => return Err(CodecError::UnsupportedType("PathSet")),
        })
    }

    fn amount(&mut self) -> CodecResult<Amount> {
        let first = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEnd(self.pos))?;
        if first & ISSUED_FLAG != 0 {
            return Ok(Amount::Issued(self.array()?));
        }
        let raw = u64::from_be_bytes(self.array()?);
        Ok(Amount::Native {
            drops: raw & NATIVE_VALUE_MASK,
            positive: raw & NATIVE_POSITIVE != 0,
        })
    }

    /// Fields until `end` (nested objects) or until the data runs out
    fn object(&mut self, end: Option<(u8, u8)>) -> CodecResult<StObject> {
        let mut object = StObject::new();
        loop {
            if end.is_none() && self.is_empty() {
                return Ok(object);
            }
            let (def, value) = self.field()?;
            match value {
                Some(value) => object.fields.push(Field { def, value }),
                None if Some(def.ordinal()) == end => return Ok(object),
                None => return Err(CodecError::UnknownField { type_code: def.ordinal().0, nth: def.ordinal().1 }),
            }
        }
    }

    fn array_elements(&mut self) -> CodecResult<Vec<Field>> {
        let mut elements = Vec::new();
        loop {
            let (def, value) = self.field()?;
            match value {
                None if def.ordinal() == ARRAY_END => return Ok(elements),
                Some(value @ FieldValue::Object(_)) => elements.push(Field { def, value }),
                _ => return Err(CodecError::BadArrayElement(def.name)),
            }
        }
    }
}

/// Decode a complete top-level transaction
pub fn decode(data: &[u8]) -> CodecResult<StObject> {
    let mut reader = Reader::new(data);
    let object = reader.object(None)?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes(data.len() - reader.pos));
    }
    Ok(object)
}

// =============================================================================
// Encoding
// =============================================================================

pub fn encode_header(type_code: u8, nth: u8, out: &mut Vec<u8>) {
    match (type_code < 16, nth < 16) {
        (true, true) => out.push((type_code << 4) | nth),
        (true, false) => out.extend([type_code << 4, nth]),
        (false, true) => out.extend([nth, type_code]),
        (false, false) => out.extend([0, type_code, nth]),
    }
}

pub fn encode_vl_length(len: usize, out: &mut Vec<u8>) -> CodecResult<()> {
    if len <= 192 {
        out.push(len as u8);
    } else if len <= 12_480 {
        let rem = len - 193;
        out.extend([193 + (rem >> 8) as u8, (rem & 0xFF) as u8]);
    } else if len <= MAX_VL_LEN {
        let rem = len - 12_481;
        out.extend([241 + (rem >> 16) as u8, ((rem >> 8) & 0xFF) as u8, (rem & 0xFF) as u8]);
    } else {
        return Err(CodecError::TooLong(len));
    }
    Ok(())
}

fn encode_value(def: &'static FieldDef, value: &FieldValue, out: &mut Vec<u8>) -> CodecResult<()> {
    let mismatch = CodecError::ValueMismatch { field: def.name };
    match (def.type_code, value) {
        (TypeCode::UInt8, FieldValue::UInt8(v)) => out.push(*v),
        (TypeCode::UInt16, FieldValue::UInt16(v)) => out.extend(v.to_be_bytes()),
        (TypeCode::UInt32, FieldValue::UInt32(v)) => out.extend(v.to_be_bytes()),
        (TypeCode::UInt64, FieldValue::UInt64(v)) => out.extend(v.to_be_bytes()),
        (TypeCode::Hash128 | TypeCode::Hash160 | TypeCode::Hash256, FieldValue::Hash(bytes)) => {
            if Some(bytes.len()) != def.type_code.hash_len() {
                return Err(mismatch);
            }
            out.extend(bytes);
        }
        (TypeCode::Amount, FieldValue::Amount(Amount::Native { drops, positive })) => {
            let sign = if *positive { NATIVE_POSITIVE } else { 0 };
            out.extend((sign | (drops & NATIVE_VALUE_MASK)).to_be_bytes());
        }
        (TypeCode::Amount, FieldValue::Amount(Amount::Issued(raw))) => out.extend(raw),
        (TypeCode::Blob, FieldValue::Blob(bytes)) => {
            encode_vl_length(bytes.len(), out)?;
            out.extend(bytes);
        }
        (TypeCode::AccountId, FieldValue::AccountId(id)) => {
            encode_vl_length(id.len(), out)?;
            out.extend(id);
        }
        (TypeCode::StObject, FieldValue::Object(object)) => {
            encode_fields(object.sorted(), out)?;
            encode_header(OBJECT_END.0, OBJECT_END.1, out);
        }
        (TypeCode::StArray, FieldValue::Array(elements)) => {
            for element in elements {
                encode_field(element, out)?;
            }
            encode_header(ARRAY_END.0, ARRAY_END.1, out);
        }
        (TypeCode::Vector256, FieldValue::Vector256(hashes)) => {
            encode_vl_length(hashes.len() * 32, out)?;
            for hash in hashes {
                out.extend(hash);
            }
        }
        _ => return Err(mismatch),
    }
    Ok(())
}

fn encode_field(field: &Field, out: &mut Vec<u8>) -> CodecResult<()> {
    let (type_code, nth) = field.def.ordinal();
    encode_header(type_code, nth, out);
    encode_value(field.def, &field.value, out)
}

fn encode_fields<'f>(fields: impl IntoIterator<Item = &'f Field>, out: &mut Vec<u8>) -> CodecResult<()> {
    for field in fields {
        encode_field(field, out)?;
    }
    Ok(())
}

/// Canonical serialization of a top-level object
pub fn encode(object: &StObject) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    encode_fields(object.sorted(), &mut out)?;
    Ok(out)
}

/// Serialization covered by signatures: top-level signing fields only
pub fn encode_for_signing(object: &StObject) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    encode_fields(object.sorted().into_iter().filter(|f| f.def.is_signing_field()), &mut out)?;
    Ok(out)
}
