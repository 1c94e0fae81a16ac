//! C1 — append-only, offset-addressable name store with deduplication.

use crate::core::error::{CoreError, CoreResult};
use std::collections::HashMap;

pub const MAX_NAME_LEN: usize = 255;
const DEFAULT_TABLE_CAP: usize = 16 * 1024 * 1024;

/// Monotonic byte buffer of NUL-terminated names plus a hashed index for
/// O(1) dedup (spec.md §3 explicitly allows either a linear or hashed
/// probe; a `HashMap` is the natural Rust pick for the hashed one).
///
/// Offsets handed out by `intern` are stable for the table's lifetime: the
/// buffer only ever grows at its tail, so an existing offset's bytes are
/// never touched again.
pub struct StringTable {
    buf: Vec<u8>,
    index: HashMap<Box<str>, u32>,
    max_size: usize,
}

impl StringTable {
    pub fn new(max_size: usize) -> Self {
        Self {
            buf: Vec::new(),
            index: HashMap::new(),
            max_size,
        }
    }

    /// Interns `name`, returning its offset. Idempotent: a name already
    /// present returns the offset from its first interning.
    pub fn intern(&mut self, name: &str) -> CoreResult<u32> {
        if name.len() > MAX_NAME_LEN {
            return Err(CoreError::NameTooLong);
        }
        if let Some(&off) = self.index.get(name) {
            return Ok(off);
        }
        let offset = self.buf.len() as u32;
        let needed = self.buf.len() + name.len() + 1;
        if needed > self.max_size {
            return Err(CoreError::NoSpace);
        }
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(0);
        self.index.insert(name.into(), offset);
        Ok(offset)
    }

    /// Reads the NUL-terminated name starting at `offset`.
    pub fn get(&self, offset: u32) -> CoreResult<&str> {
        let start = offset as usize;
        let rest = self
            .buf
            .get(start..)
            .ok_or_else(|| CoreError::Corrupted("name offset out of range".into()))?;
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| CoreError::Corrupted("unterminated name".into()))?;
        std::str::from_utf8(&rest[..end])
            .map_err(|_| CoreError::Corrupted("non-utf8 name".into()))
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Raw NUL-terminated byte buffer, for writing the string-table
    /// section verbatim (spec.md §6).
    pub fn raw_buf(&self) -> &[u8] {
        &self.buf
    }

    /// Rebuilds a table from a previously persisted buffer, re-deriving
    /// the dedup index by rescanning every NUL-terminated run. Offsets
    /// are preserved exactly since the buffer is reused as-is.
    pub fn from_raw(buf: Vec<u8>, max_size: usize) -> CoreResult<Self> {
        let mut index = HashMap::new();
        let mut start = 0usize;
        while start < buf.len() {
            let end = buf[start..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| CoreError::Corrupted("unterminated name in string table".into()))?;
            let name = std::str::from_utf8(&buf[start..start + end])
                .map_err(|_| CoreError::Corrupted("non-utf8 name in string table".into()))?;
            index.insert(Box::<str>::from(name), start as u32);
            start += end + 1;
        }
        Ok(Self { buf, index, max_size })
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut t = StringTable::default();
        let a = t.intern("foo").unwrap();
        let b = t.intern("foo").unwrap();
        assert_eq!(a, b);
        assert_eq!(t.get(a).unwrap(), "foo");
    }

    #[test]
    fn offsets_stay_monotone_across_further_interns() {
        let mut t = StringTable::default();
        let a = t.intern("alpha").unwrap();
        t.intern("beta").unwrap();
        t.intern("gamma").unwrap();
        assert_eq!(t.get(a).unwrap(), "alpha");
    }

    #[test]
    fn rejects_oversized_names() {
        let mut t = StringTable::default();
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert_eq!(t.intern(&long), Err(CoreError::NameTooLong));
    }

    #[test]
    fn table_full_once_capacity_exhausted() {
        let mut t = StringTable::new(8);
        assert_eq!(t.intern("abcdefgh"), Err(CoreError::NoSpace));
    }

    #[test]
    fn raw_round_trip_preserves_offsets() {
        let mut t = StringTable::default();
        let a = t.intern("alpha").unwrap();
        let b = t.intern("beta").unwrap();
        let restored = StringTable::from_raw(t.raw_buf().to_vec(), DEFAULT_TABLE_CAP).unwrap();
        assert_eq!(restored.get(a).unwrap(), "alpha");
        assert_eq!(restored.get(b).unwrap(), "beta");
    }
}
