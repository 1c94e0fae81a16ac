//! C7 — per-inode linked list of (namespace, name, value) triples in
//! pooled storage.

use crate::core::error::{CoreError, CoreResult};
use crate::core::strings::StringTable;

pub const SENTINEL: u32 = u32::MAX;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_VALUE_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Security,
    System,
    User,
    Trusted,
}

impl Namespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Security => "security.",
            Namespace::System => "system.",
            Namespace::User => "user.",
            Namespace::Trusted => "trusted.",
        }
    }

    fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Namespace::Security,
            1 => Namespace::System,
            2 => Namespace::User,
            _ => Namespace::Trusted,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Namespace::Security => 0,
            Namespace::System => 1,
            Namespace::User => 2,
            Namespace::Trusted => 3,
        }
    }

    /// Splits a fully qualified xattr name into its namespace and the bare
    /// name that follows the recognized prefix.
    fn split(full_name: &str) -> CoreResult<Self> {
        for ns in [Namespace::Security, Namespace::System, Namespace::User, Namespace::Trusted] {
            if full_name.starts_with(ns.prefix()) {
                return Ok(ns);
            }
        }
        Err(CoreError::BadNamespace)
    }
}

#[derive(Default, Clone, Copy)]
pub struct SetFlags {
    pub create: bool,
    pub replace: bool,
}

/// One entry, 32-bit-aligned by construction. `next` chains through the
/// owning inode's singly-linked list, rooted at `Node::xattr_head`.
#[repr(C)]
#[derive(Clone, Copy)]
struct Entry {
    name_offset: u32,
    value_offset: u32,
    value_len: u32,
    namespace: u8,
    next: u32,
}

const FREE_SENTINEL: u32 = u32::MAX;

pub struct XattrPool {
    entries: Vec<Entry>,
    free_entries: Vec<u32>,
    names: StringTable,
    values: Vec<u8>,
    value_free: Vec<(u32, u32)>,
}

impl XattrPool {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_entries: Vec::new(),
            names: StringTable::default(),
            values: Vec::new(),
            value_free: Vec::new(),
        }
    }

    fn alloc_value(&mut self, data: &[u8]) -> u32 {
        for (i, &(off, len)) in self.value_free.iter().enumerate() {
            if len as usize >= data.len() {
                self.value_free.remove(i);
                self.values[off as usize..off as usize + data.len()].copy_from_slice(data);
                return off;
            }
        }
        let off = self.values.len() as u32;
        self.values.extend_from_slice(data);
        off
    }

    fn free_value(&mut self, off: u32, len: u32) {
        if len > 0 {
            self.value_free.push((off, len));
        }
    }

    fn alloc_entry(&mut self, entry: Entry) -> u32 {
        if let Some(idx) = self.free_entries.pop() {
            self.entries[idx as usize] = entry;
            idx
        } else {
            let idx = self.entries.len() as u32;
            self.entries.push(entry);
            idx
        }
    }

    fn find(&self, head: u32, bare_name: &str) -> CoreResult<Option<(u32, Entry)>> {
        let mut cur = head;
        while cur != SENTINEL {
            let e = *self
                .entries
                .get(cur as usize)
                .ok_or_else(|| CoreError::Corrupted("dangling xattr entry".into()))?;
            if self.names.get(e.name_offset)? == bare_name {
                return Ok(Some((cur, e)));
            }
            cur = e.next;
        }
        Ok(None)
    }

    /// `buf` of length 0 returns the required length without copying.
    pub fn get(&self, head: u32, full_name: &str, buf: &mut [u8]) -> CoreResult<usize> {
        Namespace::split(full_name)?;
        let bare = &full_name[full_name.find('.').map(|i| i + 1).unwrap_or(0)..];
        match self.find(head, bare)? {
            None => Err(CoreError::NotFound),
            Some((_, e)) => {
                let len = e.value_len as usize;
                if buf.is_empty() {
                    return Ok(len);
                }
                if buf.len() < len {
                    return Err(CoreError::BufferTooSmall(len));
                }
                buf[..len]
                    .copy_from_slice(&self.values[e.value_offset as usize..e.value_offset as usize + len]);
                Ok(len)
            }
        }
    }

    pub fn set(
        &mut self,
        head: &mut u32,
        full_name: &str,
        value: &[u8],
        flags: SetFlags,
    ) -> CoreResult<()> {
        let ns = Namespace::split(full_name)?;
        let bare = &full_name[full_name.find('.').map(|i| i + 1).unwrap_or(0)..];
        if bare.len() > MAX_NAME_LEN {
            return Err(CoreError::NameTooLong);
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(CoreError::ValueTooBig);
        }

        if let Some((idx, existing)) = self.find(*head, bare)? {
            if flags.create {
                return Err(CoreError::Exists);
            }
            self.free_value(existing.value_offset, existing.value_len);
            let value_offset = self.alloc_value(value);
            self.entries[idx as usize].value_offset = value_offset;
            self.entries[idx as usize].value_len = value.len() as u32;
            return Ok(());
        }

        if flags.replace {
            return Err(CoreError::NotFound);
        }

        let name_offset = self.names.intern(bare)?;
        let value_offset = self.alloc_value(value);
        let entry = Entry {
            name_offset,
            value_offset,
            value_len: value.len() as u32,
            namespace: ns.tag(),
            next: *head,
        };
        let idx = self.alloc_entry(entry);
        *head = idx;
        Ok(())
    }

    /// `buf` of length 0 returns the total length of the NUL-separated
    /// name list without copying.
    pub fn list(&self, head: u32, buf: &mut [u8]) -> CoreResult<usize> {
        let mut names = Vec::new();
        let mut cur = head;
        while cur != SENTINEL {
            let e = *self
                .entries
                .get(cur as usize)
                .ok_or_else(|| CoreError::Corrupted("dangling xattr entry".into()))?;
            let bare = self.names.get(e.name_offset)?;
            names.push(format!("{}{}", Namespace::from_tag(e.namespace).prefix(), bare));
            cur = e.next;
        }
        let mut total = 0usize;
        for n in &names {
            total += n.len() + 1;
        }
        if buf.is_empty() {
            return Ok(total);
        }
        if buf.len() < total {
            return Err(CoreError::BufferTooSmall(total));
        }
        let mut off = 0;
        for n in &names {
            buf[off..off + n.len()].copy_from_slice(n.as_bytes());
            buf[off + n.len()] = 0;
            off += n.len() + 1;
        }
        Ok(total)
    }

    pub fn remove(&mut self, head: &mut u32, full_name: &str) -> CoreResult<()> {
        Namespace::split(full_name)?;
        let bare = &full_name[full_name.find('.').map(|i| i + 1).unwrap_or(0)..];
        let mut prev: Option<u32> = None;
        let mut cur = *head;
        while cur != SENTINEL {
            let e = *self
                .entries
                .get(cur as usize)
                .ok_or_else(|| CoreError::Corrupted("dangling xattr entry".into()))?;
            if self.names.get(e.name_offset)? == bare {
                match prev {
                    Some(p) => self.entries[p as usize].next = e.next,
                    None => *head = e.next,
                }
                self.free_value(e.value_offset, e.value_len);
                self.free_entries.push(cur);
                return Ok(());
            }
            prev = Some(cur);
            cur = e.next;
        }
        Err(CoreError::NotFound)
    }

    /// Frees every entry rooted at `head`, used during inode deletion.
    pub fn free_all(&mut self, head: &mut u32) {
        let mut cur = *head;
        while cur != SENTINEL {
            let e = self.entries[cur as usize];
            self.free_value(e.value_offset, e.value_len);
            self.free_entries.push(cur);
            cur = e.next;
        }
        *head = SENTINEL;
    }
}

impl Default for XattrPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw form of an `XattrPool`, for writing into the data section's xattr
/// sub-region verbatim (spec.md §6). `Entry` has no padding concerns (it
/// is a flat run of `u32`/`u8`/`u32` fields), so the entry table is
/// serialized via the same raw-bytes approach as `core::tree::Node`.
pub struct XattrRaw {
    pub entries: Vec<u8>,
    pub free_entries: Vec<u32>,
    pub names: Vec<u8>,
    pub values: Vec<u8>,
    pub value_free: Vec<(u32, u32)>,
}

impl XattrPool {
    pub fn export_raw(&self) -> XattrRaw {
        let entries = unsafe {
            std::slice::from_raw_parts(
                self.entries.as_ptr() as *const u8,
                self.entries.len() * std::mem::size_of::<Entry>(),
            )
        }
        .to_vec();
        XattrRaw {
            entries,
            free_entries: self.free_entries.clone(),
            names: self.names.raw_buf().to_vec(),
            values: self.values.clone(),
            value_free: self.value_free.clone(),
        }
    }

    pub fn import_raw(raw: XattrRaw) -> CoreResult<Self> {
        let entry_size = std::mem::size_of::<Entry>();
        if raw.entries.len() % entry_size != 0 {
            return Err(CoreError::Corrupted("truncated xattr entry table".into()));
        }
        let count = raw.entries.len() / entry_size;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let chunk = &raw.entries[i * entry_size..(i + 1) * entry_size];
            entries.push(unsafe { crate::core::utils::deserialize_row(chunk) });
        }
        Ok(Self {
            entries,
            free_entries: raw.free_entries,
            names: StringTable::from_raw(raw.names, 16 * 1024 * 1024)?,
            values: raw.values,
            value_free: raw.value_free,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_round_trip() {
        let mut pool = XattrPool::new();
        let mut head = SENTINEL;
        pool.set(&mut head, "user.foo", b"bar", SetFlags::default()).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(pool.get(head, "user.foo", &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"bar");
        pool.remove(&mut head, "user.foo").unwrap();
        assert_eq!(pool.get(head, "user.foo", &mut buf), Err(CoreError::NotFound));
    }

    #[test]
    fn bad_namespace_is_rejected() {
        let mut pool = XattrPool::new();
        let mut head = SENTINEL;
        assert_eq!(
            pool.set(&mut head, "wat.foo", b"bar", SetFlags::default()),
            Err(CoreError::BadNamespace)
        );
    }

    #[test]
    fn create_flag_rejects_existing() {
        let mut pool = XattrPool::new();
        let mut head = SENTINEL;
        pool.set(&mut head, "user.foo", b"1", SetFlags::default()).unwrap();
        let flags = SetFlags { create: true, replace: false };
        assert_eq!(pool.set(&mut head, "user.foo", b"2", flags), Err(CoreError::Exists));
    }

    #[test]
    fn zero_length_buffer_reports_required_size() {
        let mut pool = XattrPool::new();
        let mut head = SENTINEL;
        pool.set(&mut head, "user.foo", b"hello", SetFlags::default()).unwrap();
        assert_eq!(pool.get(head, "user.foo", &mut []).unwrap(), 5);
    }

    #[test]
    fn export_import_raw_round_trips() {
        let mut pool = XattrPool::new();
        let mut head = SENTINEL;
        pool.set(&mut head, "user.foo", b"bar", SetFlags::default()).unwrap();
        let raw = pool.export_raw();
        let restored = XattrPool::import_raw(raw).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(restored.get(head, "user.foo", &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"bar");
    }

    #[test]
    fn free_all_empties_the_list() {
        let mut pool = XattrPool::new();
        let mut head = SENTINEL;
        pool.set(&mut head, "user.a", b"1", SetFlags::default()).unwrap();
        pool.set(&mut head, "user.b", b"2", SetFlags::default()).unwrap();
        pool.free_all(&mut head);
        assert_eq!(head, SENTINEL);
    }
}
