use std::collections::HashMap;

use thiserror::Error;

use crate::ids::{EntityId, NO_ID, RawId};

pub const CURRENT_VERSION: u32 = 8;
pub const MIN_VERSION: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported project revision {0}")]
    UnsupportedVersion(u32),
    #[error("unexpected end of data at offset {offset} while reading {wanted} bytes")]
    UnexpectedEof { offset: usize, wanted: usize },
    #[error("length {count} at offset {offset} exceeds the remaining {remaining} bytes")]
    LengthOutOfBounds {
        offset: usize,
        count: usize,
        remaining: usize,
    },
    #[error("invalid utf-8 string at offset {0}")]
    InvalidUtf8(usize),
    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u64 },
    #[error("{0} trailing bytes after document")]
    TrailingBytes(usize),
    #[error("document failed integrity check: {0}")]
    Integrity(String),
}

pub trait ProjectBuffer {
    fn version(&self) -> u32;
    fn is_reading(&self) -> bool;
    fn is_for_undo_redo(&self) -> bool;

    fn serialize_u8(&mut self, value: &mut u8) -> Result<(), CodecError>;
    fn serialize_u16(&mut self, value: &mut u16) -> Result<(), CodecError>;
    fn serialize_u32(&mut self, value: &mut u32) -> Result<(), CodecError>;
    fn serialize_u64(&mut self, value: &mut u64) -> Result<(), CodecError>;

    fn serialize_bytes(&mut self, value: &mut Vec<u8>) -> Result<(), CodecError>;

    fn serialize_len(&mut self, len: usize) -> Result<usize, CodecError>;

    /// Redirects an id read from the buffer. Only load buffers remap.
    fn map_id(&self, raw: RawId) -> RawId {
        raw
    }

    fn serialize_i8(&mut self, value: &mut i8) -> Result<(), CodecError> {
        let mut raw = u8::from_ne_bytes(value.to_ne_bytes());
        self.serialize_u8(&mut raw)?;
        *value = i8::from_ne_bytes(raw.to_ne_bytes());
        Ok(())
    }

    fn serialize_bool(&mut self, value: &mut bool) -> Result<(), CodecError> {
        let mut raw = u8::from(*value);
        self.serialize_u8(&mut raw)?;
        *value = match raw {
            0 => false,
            1 => true,
            other => {
                return Err(CodecError::InvalidValue {
                    field: "bool",
                    value: u64::from(other),
                });
            }
        };
        Ok(())
    }

    fn serialize_string(&mut self, value: &mut String) -> Result<(), CodecError> {
        let mut bytes = std::mem::take(value).into_bytes();
        self.serialize_bytes(&mut bytes)?;
        *value = String::from_utf8(bytes).map_err(|error| {
            CodecError::InvalidUtf8(error.utf8_error().valid_up_to())
        })?;
        Ok(())
    }

    fn serialize_id<I: EntityId>(&mut self, id: &mut I) -> Result<(), CodecError>
    where
        Self: Sized,
    {
        let mut raw = id.raw();
        self.serialize_u32(&mut raw)?;
        if self.is_reading() {
            *id = I::from_raw(self.map_id(raw));
        }
        Ok(())
    }

    fn serialize_opt_id<I: EntityId>(&mut self, id: &mut Option<I>) -> Result<(), CodecError>
    where
        Self: Sized,
    {
        let mut raw = id.map_or(NO_ID, EntityId::raw);
        self.serialize_u32(&mut raw)?;
        if self.is_reading() {
            *id = (raw != NO_ID).then(|| I::from_raw(self.map_id(raw)));
        }
        Ok(())
    }

    fn serialize_list<T, F>(&mut self, list: &mut Vec<T>, mut visit: F) -> Result<(), CodecError>
    where
        Self: Sized,
        T: Default,
        F: FnMut(&mut T, &mut Self) -> Result<(), CodecError>,
    {
        let count = self.serialize_len(list.len())?;
        self.initialize_list(list, count);
        for item in list.iter_mut() {
            visit(item, self)?;
        }
        Ok(())
    }

    fn initialize_list<T: Default>(&self, list: &mut Vec<T>, count: usize)
    where
        Self: Sized,
    {
        if self.is_reading() {
            list.clear();
            list.resize_with(count, T::default);
        }
    }
}

pub(crate) fn serialize_enum<B, T>(
    buffer: &mut B,
    value: &mut T,
    field: &'static str,
    to_raw: fn(T) -> u8,
    from_raw: fn(u8) -> Option<T>,
) -> Result<(), CodecError>
where
    B: ProjectBuffer,
    T: Copy,
{
    let mut raw = to_raw(*value);
    buffer.serialize_u8(&mut raw)?;
    if buffer.is_reading() {
        *value = from_raw(raw).ok_or(CodecError::InvalidValue {
            field,
            value: u64::from(raw),
        })?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SaveBuffer {
    bytes: Vec<u8>,
    version: u32,
    undo_redo: bool,
}

impl SaveBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            version: CURRENT_VERSION,
            undo_redo: false,
        }
    }

    #[must_use]
    pub fn for_undo_redo() -> Self {
        Self {
            undo_redo: true,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn write_len(&mut self, len: usize) -> Result<(), CodecError> {
        let mut raw = u32::try_from(len).map_err(|_| CodecError::InvalidValue {
            field: "length",
            value: len as u64,
        })?;
        self.serialize_u32(&mut raw)
    }
}

impl Default for SaveBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectBuffer for SaveBuffer {
    fn version(&self) -> u32 {
        self.version
    }

    fn is_reading(&self) -> bool {
        false
    }

    fn is_for_undo_redo(&self) -> bool {
        self.undo_redo
    }

    fn serialize_u8(&mut self, value: &mut u8) -> Result<(), CodecError> {
        self.bytes.push(*value);
        Ok(())
    }

    fn serialize_u16(&mut self, value: &mut u16) -> Result<(), CodecError> {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn serialize_u32(&mut self, value: &mut u32) -> Result<(), CodecError> {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn serialize_u64(&mut self, value: &mut u64) -> Result<(), CodecError> {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn serialize_bytes(&mut self, value: &mut Vec<u8>) -> Result<(), CodecError> {
        self.write_len(value.len())?;
        self.bytes.extend_from_slice(value);
        Ok(())
    }

    fn serialize_len(&mut self, len: usize) -> Result<usize, CodecError> {
        self.write_len(len)?;
        Ok(len)
    }
}

#[derive(Debug, Clone)]
pub struct LoadBuffer<'a> {
    bytes: &'a [u8],
    offset: usize,
    version: u32,
    undo_redo: bool,
    remap: HashMap<RawId, RawId>,
}

impl<'a> LoadBuffer<'a> {
    pub fn new(bytes: &'a [u8], version: u32) -> Result<Self, CodecError> {
        if !(MIN_VERSION..=CURRENT_VERSION).contains(&version) {
            return Err(CodecError::UnsupportedVersion(version));
        }
        Ok(Self {
            bytes,
            offset: 0,
            version,
            undo_redo: false,
            remap: HashMap::new(),
        })
    }

    #[must_use]
    pub fn for_undo_redo(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            version: CURRENT_VERSION,
            undo_redo: true,
            remap: HashMap::new(),
        }
    }

    pub fn remap_id(&mut self, old: RawId, new: RawId) {
        self.remap.insert(old, new);
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(CodecError::TrailingBytes(extra)),
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let slice = self.take_slice(N)?;
        let mut out = [0; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn take_slice(&mut self, wanted: usize) -> Result<&'a [u8], CodecError> {
        if wanted > self.remaining() {
            return Err(CodecError::UnexpectedEof {
                offset: self.offset,
                wanted,
            });
        }
        let bytes = self.bytes;
        let slice = &bytes[self.offset..self.offset + wanted];
        self.offset += wanted;
        Ok(slice)
    }
}

impl ProjectBuffer for LoadBuffer<'_> {
    fn version(&self) -> u32 {
        self.version
    }

    fn is_reading(&self) -> bool {
        true
    }

    fn is_for_undo_redo(&self) -> bool {
        self.undo_redo
    }

    fn serialize_u8(&mut self, value: &mut u8) -> Result<(), CodecError> {
        *value = self.take::<1>()?[0];
        Ok(())
    }

    fn serialize_u16(&mut self, value: &mut u16) -> Result<(), CodecError> {
        *value = u16::from_le_bytes(self.take()?);
        Ok(())
    }

    fn serialize_u32(&mut self, value: &mut u32) -> Result<(), CodecError> {
        *value = u32::from_le_bytes(self.take()?);
        Ok(())
    }

    fn serialize_u64(&mut self, value: &mut u64) -> Result<(), CodecError> {
        *value = u64::from_le_bytes(self.take()?);
        Ok(())
    }

    fn serialize_bytes(&mut self, value: &mut Vec<u8>) -> Result<(), CodecError> {
        let len = self.serialize_len(0)?;
        *value = self.take_slice(len)?.to_vec();
        Ok(())
    }

    fn serialize_len(&mut self, _len: usize) -> Result<usize, CodecError> {
        let offset = self.offset;
        let count = u32::from_le_bytes(self.take()?) as usize;
        // Every element occupies at least one byte, so a larger count is corrupt.
        if count > self.remaining() {
            return Err(CodecError::LengthOutOfBounds {
                offset,
                count,
                remaining: self.remaining(),
            });
        }
        Ok(count)
    }

    fn map_id(&self, raw: RawId) -> RawId {
        self.remap.get(&raw).copied().unwrap_or(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{InstrumentId, SongId};

    #[test]
    fn primitives_are_little_endian_with_u32_length_prefixes() {
        let mut save = SaveBuffer::new();
        let mut word = 0x1234_u16;
        let mut text = "ab".to_string();
        save.serialize_u16(&mut word).expect("write u16");
        save.serialize_string(&mut text).expect("write string");

        assert_eq!(save.into_bytes(), vec![0x34, 0x12, 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn optional_ids_use_sentinel_and_remap_on_read() {
        let mut save = SaveBuffer::for_undo_redo();
        let mut some = Some(SongId::new(150));
        let mut none: Option<InstrumentId> = None;
        save.serialize_opt_id(&mut some).expect("write some");
        save.serialize_opt_id(&mut none).expect("write none");
        let bytes = save.into_bytes();

        let mut load = LoadBuffer::for_undo_redo(&bytes);
        load.remap_id(150, 400);
        let mut read_some: Option<SongId> = None;
        let mut read_none = Some(InstrumentId::new(1));
        load.serialize_opt_id(&mut read_some).expect("read some");
        load.serialize_opt_id(&mut read_none).expect("read none");

        assert_eq!(read_some, Some(SongId::new(400)));
        assert_eq!(read_none, None);
        load.finish().expect("buffer fully consumed");
    }

    #[test]
    fn corrupt_counts_are_rejected_before_allocation() {
        let bytes = u32::MAX.to_le_bytes();
        let mut load = LoadBuffer::for_undo_redo(&bytes);
        let mut list: Vec<u8> = Vec::new();
        let error = load
            .serialize_list(&mut list, |item, buffer| buffer.serialize_u8(item))
            .expect_err("oversized count should fail");
        assert!(matches!(error, CodecError::LengthOutOfBounds { .. }));
    }

    #[test]
    fn unknown_revisions_are_rejected() {
        assert_eq!(
            LoadBuffer::new(&[], CURRENT_VERSION + 1).err(),
            Some(CodecError::UnsupportedVersion(CURRENT_VERSION + 1))
        );
        assert!(LoadBuffer::new(&[], 0).is_err());
    }

    #[test]
    fn bool_rejects_values_other_than_zero_and_one() {
        let bytes = [2_u8];
        let mut load = LoadBuffer::for_undo_redo(&bytes);
        let mut flag = false;
        assert!(matches!(
            load.serialize_bool(&mut flag),
            Err(CodecError::InvalidValue { field: "bool", .. })
        ));
    }
}
