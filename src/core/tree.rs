//! C2 — packed array of fixed-size nodes; parent/child indices; path
//! resolution; rebalance.

use crate::core::config::Config;
use crate::core::error::{CoreError, CoreResult};
use crate::core::strings::StringTable;
use std::mem::size_of;

pub const SENTINEL: u32 = u32::MAX;
const CHILD_SENTINEL: u16 = u16::MAX;
const BRANCHING_FACTOR: usize = 16;

pub const S_IFDIR: u16 = 0x4000;
pub const S_IFREG: u16 = 0x8000;
const S_IFMT: u16 = 0xF000;

pub fn is_dir(mode: u16) -> bool {
    mode & S_IFMT == S_IFDIR
}

/// One cache line. Field order is chosen so the `u64 size` lands on an
/// 8-byte boundary without `repr(packed)` padding tricks.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub inode: u32,
    pub parent: u32,
    pub child_count: u16,
    pub mode: u16,
    pub name_offset: u32,
    pub children: [u16; BRANCHING_FACTOR],
    pub size: u64,
    pub mtime: u32,
    pub xattr_head: u32,
}

const _: () = assert!(size_of::<Node>() == 64, "Node must be exactly 64 bytes");

impl Node {
    fn free() -> Self {
        Self {
            inode: 0,
            parent: SENTINEL,
            child_count: 0,
            mode: 0,
            name_offset: 0,
            children: [CHILD_SENTINEL; BRANCHING_FACTOR],
            size: 0,
            mtime: 0,
            xattr_head: SENTINEL,
        }
    }

    pub fn is_free(&self) -> bool {
        self.inode == 0
    }
}

fn now() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

pub struct Tree {
    nodes: Vec<Node>,
    free_list: Vec<u32>,
    strings: StringTable,
    next_inode: u32,
    ops_since_rebalance: u64,
    rebalance_threshold: u64,
}

impl Tree {
    /// Creates a tree containing only the root directory at index 0.
    pub fn init(config: &Config) -> CoreResult<Self> {
        let mut strings = StringTable::default();
        let root_name = strings.intern("")?;
        let root = Node {
            inode: 1,
            parent: SENTINEL,
            child_count: 0,
            mode: S_IFDIR | 0o755,
            name_offset: root_name,
            children: [CHILD_SENTINEL; BRANCHING_FACTOR],
            size: 0,
            mtime: now(),
            xattr_head: SENTINEL,
        };
        Ok(Self {
            nodes: vec![root],
            free_list: Vec::new(),
            strings,
            next_inode: 2,
            ops_since_rebalance: 0,
            rebalance_threshold: config.rebalance_threshold,
        })
    }

    pub fn root(&self) -> u32 {
        0
    }

    pub fn node(&self, index: u32) -> CoreResult<&Node> {
        self.nodes
            .get(index as usize)
            .filter(|n| !n.is_free())
            .ok_or(CoreError::NotFound)
    }

    pub fn name_of(&self, index: u32) -> CoreResult<&str> {
        let n = self.node(index)?;
        self.strings.get(n.name_offset)
    }

    /// Linear scan of `parent`'s children; the branching factor is small
    /// and fixed, so this stays cache-line friendly.
    pub fn find_child(&self, parent: u32, name: &str) -> CoreResult<u32> {
        let p = self.node(parent)?;
        for &c in p.children.iter() {
            if c == CHILD_SENTINEL {
                continue;
            }
            if self.name_of(c as u32)? == name {
                return Ok(c as u32);
            }
        }
        Err(CoreError::NotFound)
    }

    pub fn insert(&mut self, parent: u32, name: &str, mode: u16) -> CoreResult<u32> {
        {
            let p = self.node(parent)?;
            if !is_dir(p.mode) {
                return Err(CoreError::NotADirectory);
            }
        }
        if self.find_child(parent, name).is_ok() {
            return Err(CoreError::Exists);
        }
        let p = self.node(parent)?;
        if p.child_count as usize >= BRANCHING_FACTOR {
            return Err(CoreError::ParentFull);
        }
        let slot = p
            .children
            .iter()
            .position(|&c| c == CHILD_SENTINEL)
            .ok_or(CoreError::ParentFull)?;

        let name_offset = self.strings.intern(name)?;
        let inode = self.next_inode;
        let new_index = self.alloc_slot()?;

        self.nodes[new_index as usize] = Node {
            inode,
            parent,
            child_count: 0,
            mode,
            name_offset,
            children: [CHILD_SENTINEL; BRANCHING_FACTOR],
            size: 0,
            mtime: now(),
            xattr_head: SENTINEL,
        };
        let p = &mut self.nodes[parent as usize];
        p.children[slot] = new_index as u16;
        p.child_count += 1;

        self.next_inode += 1;
        self.note_op();
        Ok(new_index)
    }

    /// Like `insert`, but stamps the node with a caller-supplied inode
    /// number instead of minting the next one. Used by recovery redo,
    /// which must recreate the exact inode a committed INSERT record
    /// logged, not whatever the live `next_inode` counter is now.
    pub fn insert_with_inode(
        &mut self,
        parent: u32,
        name: &str,
        mode: u16,
        inode: u32,
    ) -> CoreResult<u32> {
        let idx = self.insert(parent, name, mode)?;
        self.nodes[idx as usize].inode = inode;
        if inode >= self.next_inode {
            self.next_inode = inode + 1;
        }
        Ok(idx)
    }

    /// Pops the free list or grows the array; fails once indices would no
    /// longer fit the 16-bit children slots (spec.md §3's packed layout).
    fn alloc_slot(&mut self) -> CoreResult<u32> {
        if let Some(idx) = self.free_list.pop() {
            return Ok(idx);
        }
        if self.nodes.len() >= CHILD_SENTINEL as usize {
            return Err(CoreError::NoSpace);
        }
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node::free());
        Ok(idx)
    }

    pub fn delete(&mut self, index: u32) -> CoreResult<()> {
        if index == self.root() {
            return Err(CoreError::PermissionDenied);
        }
        let node = *self.node(index)?;
        if is_dir(node.mode) && node.child_count > 0 {
            return Err(CoreError::NotEmpty);
        }
        let parent = node.parent;
        {
            let p = &mut self.nodes[parent as usize];
            let slot = p
                .children
                .iter()
                .position(|&c| c as u32 == index)
                .ok_or_else(|| CoreError::Corrupted("child missing from parent".into()))?;
            p.children[slot] = CHILD_SENTINEL;
            p.child_count -= 1;
        }
        self.nodes[index as usize] = Node::free();
        self.free_list.push(index);
        self.note_op();
        Ok(())
    }

    pub fn set_size_mtime(&mut self, index: u32, size: Option<u64>, mtime_now: bool) -> CoreResult<()> {
        let n = self
            .nodes
            .get_mut(index as usize)
            .filter(|n| !n.is_free())
            .ok_or(CoreError::NotFound)?;
        if let Some(s) = size {
            n.size = s;
        }
        if mtime_now {
            n.mtime = now();
        }
        Ok(())
    }

    pub fn set_mode(&mut self, index: u32, mode: u16) -> CoreResult<()> {
        let n = self
            .nodes
            .get_mut(index as usize)
            .filter(|n| !n.is_free())
            .ok_or(CoreError::NotFound)?;
        n.mode = mode;
        Ok(())
    }

    pub fn set_xattr_head(&mut self, index: u32, head: u32) -> CoreResult<()> {
        let n = self
            .nodes
            .get_mut(index as usize)
            .filter(|n| !n.is_free())
            .ok_or(CoreError::NotFound)?;
        n.xattr_head = head;
        Ok(())
    }

    pub fn children_of(&self, index: u32) -> CoreResult<Vec<(String, u32)>> {
        let n = self.node(index)?;
        let mut out = Vec::with_capacity(n.child_count as usize);
        for &c in n.children.iter() {
            if c == CHILD_SENTINEL {
                continue;
            }
            out.push((self.name_of(c as u32)?.to_string(), c as u32));
        }
        Ok(out)
    }

    /// Resolves `/a/b/c`. Rejects `..` (path-traversal guard), skips `.`,
    /// rejects names with NUL or control bytes, rejects anything not
    /// starting with `/`.
    pub fn path_lookup(&self, path: &str) -> CoreResult<u32> {
        if !path.starts_with('/') {
            return Err(CoreError::BadName(path.to_string()));
        }
        let mut cur = self.root();
        for comp in path.split('/') {
            if comp.is_empty() || comp == "." {
                continue;
            }
            if comp == ".." {
                return Err(CoreError::BadName("..".into()));
            }
            if comp.bytes().any(|b| b == 0 || b < 0x20) {
                return Err(CoreError::BadName(comp.to_string()));
            }
            cur = self.find_child(cur, comp)?;
        }
        Ok(cur)
    }

    /// Pure helper: splits `path` into its parent path and final component.
    pub fn split_path(path: &str) -> CoreResult<(String, String)> {
        if !path.starts_with('/') {
            return Err(CoreError::BadName(path.to_string()));
        }
        let trimmed = path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) => Ok(("/".to_string(), trimmed[1..].to_string())),
            Some(i) => Ok((trimmed[..i].to_string(), trimmed[i + 1..].to_string())),
            None => Ok(("/".to_string(), String::new())),
        }
    }

    fn note_op(&mut self) {
        self.ops_since_rebalance += 1;
        if self.ops_since_rebalance >= self.rebalance_threshold {
            self.rebalance();
        }
    }

    /// Re-lays the node array out in breadth-first order. Semantics
    /// preserving: indices change, inode numbers do not.
    pub fn rebalance(&mut self) {
        let mut new_nodes = Vec::with_capacity(self.nodes.len());
        let mut old_to_new = vec![SENTINEL; self.nodes.len()];
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(self.root());

        while let Some(old_idx) = queue.pop_front() {
            if old_to_new[old_idx as usize] != SENTINEL {
                continue;
            }
            let new_idx = new_nodes.len() as u32;
            old_to_new[old_idx as usize] = new_idx;
            new_nodes.push(self.nodes[old_idx as usize]);
            for &c in self.nodes[old_idx as usize].children.iter() {
                if c != CHILD_SENTINEL {
                    queue.push_back(c as u32);
                }
            }
        }

        for n in new_nodes.iter_mut() {
            if n.parent != SENTINEL {
                n.parent = old_to_new[n.parent as usize];
            }
            for c in n.children.iter_mut() {
                if *c != CHILD_SENTINEL {
                    *c = old_to_new[*c as usize] as u16;
                }
            }
        }

        self.nodes = new_nodes;
        self.free_list.clear();
        self.ops_since_rebalance = 0;
    }

    /// Checks invariants (1)-(5) of spec.md §3 over the live node set.
    pub fn nary_validate(&self) -> CoreResult<()> {
        for (i, n) in self.nodes.iter().enumerate() {
            if n.is_free() {
                continue;
            }
            let i = i as u32;
            if n.parent != SENTINEL {
                let p = self
                    .nodes
                    .get(n.parent as usize)
                    .ok_or_else(|| CoreError::Corrupted("dangling parent".into()))?;
                let occurrences = p.children.iter().filter(|&&c| c as u32 == i).count();
                if occurrences != 1 {
                    return Err(CoreError::Corrupted(format!(
                        "node {i} not listed exactly once in parent {}",
                        n.parent
                    )));
                }
            }
            if !is_dir(n.mode) && n.child_count != 0 {
                return Err(CoreError::Corrupted(format!(
                    "non-directory node {i} has children"
                )));
            }
            let mut seen = std::collections::HashSet::new();
            for &c in n.children.iter() {
                if c == CHILD_SENTINEL {
                    continue;
                }
                let child = self
                    .nodes
                    .get(c as usize)
                    .ok_or_else(|| CoreError::Corrupted("dangling child".into()))?;
                if child.parent != i {
                    return Err(CoreError::Corrupted(format!(
                        "child {c} parent field does not point back to {i}"
                    )));
                }
                let name = self.strings.get(child.name_offset)?;
                if !seen.insert(name.to_string()) {
                    return Err(CoreError::Corrupted(format!(
                        "duplicate child name under {i}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Linear scan for the node carrying a given inode number. Used by
    /// recovery, which only ever has inode numbers to go on (node indices
    /// are not stable across a rebalance and must never leak across a
    /// restart boundary).
    pub fn find_by_inode(&self, inode: u32) -> CoreResult<u32> {
        self.nodes
            .iter()
            .position(|n| !n.is_free() && n.inode == inode)
            .map(|i| i as u32)
            .ok_or(CoreError::NotFound)
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub fn strings_mut(&mut self) -> &mut StringTable {
        &mut self.strings
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Raw node array plus the next inode counter, for writing the
    /// inode-table section verbatim (spec.md §6). Free slots are included
    /// as-is (`Node::is_free` tells them apart on reload).
    pub fn export_raw(&self) -> (&[Node], u32) {
        (&self.nodes, self.next_inode)
    }

    /// Rebuilds a tree from a previously persisted node array and string
    /// table, re-deriving the free list by rescanning for free slots.
    /// Node indices are preserved exactly since the array is reused as-is.
    pub fn import_raw(nodes: Vec<Node>, strings: StringTable, next_inode: u32, config: &Config) -> Self {
        let free_list = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_free())
            .map(|(i, _)| i as u32)
            .collect();
        Self {
            nodes,
            free_list,
            strings,
            next_inode,
            ops_since_rebalance: 0,
            rebalance_threshold: config.rebalance_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Tree {
        Tree::init(&Config::for_tests()).unwrap()
    }

    #[test]
    fn init_creates_root_only() {
        let t = tree();
        assert!(is_dir(t.node(t.root()).unwrap().mode));
        assert_eq!(t.node(t.root()).unwrap().child_count, 0);
    }

    #[test]
    fn insert_find_delete_round_trip() {
        let mut t = tree();
        let root = t.root();
        let a = t.insert(root, "a", S_IFDIR | 0o755).unwrap();
        assert_eq!(t.find_child(root, "a").unwrap(), a);
        t.delete(a).unwrap();
        assert_eq!(t.find_child(root, "a"), Err(CoreError::NotFound));
        t.nary_validate().unwrap();
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut t = tree();
        let root = t.root();
        t.insert(root, "x", S_IFREG | 0o644).unwrap();
        assert_eq!(t.insert(root, "x", S_IFDIR | 0o755), Err(CoreError::Exists));
    }

    #[test]
    fn rmdir_non_empty_then_empty() {
        let mut t = tree();
        let root = t.root();
        let d = t.insert(root, "d", S_IFDIR | 0o755).unwrap();
        let f = t.insert(d, "f", S_IFREG | 0o644).unwrap();
        assert_eq!(t.delete(d), Err(CoreError::NotEmpty));
        t.delete(f).unwrap();
        t.delete(d).unwrap();
    }

    #[test]
    fn path_traversal_is_rejected() {
        let mut t = tree();
        let root = t.root();
        t.insert(root, "a", S_IFDIR | 0o755).unwrap();
        assert_eq!(t.path_lookup("/a/../etc"), Err(CoreError::BadName("..".into())));
    }

    #[test]
    fn dot_component_is_skipped() {
        let mut t = tree();
        let root = t.root();
        let a = t.insert(root, "a", S_IFDIR | 0o755).unwrap();
        let b = t.insert(a, "b", S_IFREG | 0o644).unwrap();
        assert_eq!(t.path_lookup("/a/./b").unwrap(), b);
        assert_eq!(t.path_lookup("/a/b").unwrap(), b);
    }

    #[test]
    fn split_path_then_rejoin() {
        let (parent, last) = Tree::split_path("/a/b/c").unwrap();
        assert_eq!(parent, "/a/b");
        assert_eq!(last, "c");
    }

    #[test]
    fn branching_factor_exhaustion_and_recovery() {
        let mut t = tree();
        let root = t.root();
        for i in 0..BRANCHING_FACTOR {
            t.insert(root, &format!("f{i}"), S_IFREG | 0o644).unwrap();
        }
        assert_eq!(
            t.insert(root, "one-too-many", S_IFREG | 0o644),
            Err(CoreError::ParentFull)
        );
        let victim = t.find_child(root, "f0").unwrap();
        t.delete(victim).unwrap();
        t.insert(root, "one-too-many", S_IFREG | 0o644).unwrap();
    }

    #[test]
    fn export_import_raw_round_trips() {
        let mut t = tree();
        let root = t.root();
        let a = t.insert(root, "a", S_IFDIR | 0o755).unwrap();
        t.insert(a, "b", S_IFREG | 0o644).unwrap();
        let (nodes, next_inode) = t.export_raw();
        let nodes = nodes.to_vec();
        let strings_buf = t.strings().raw_buf().to_vec();
        let strings = StringTable::from_raw(strings_buf, 16 * 1024 * 1024).unwrap();
        let restored = Tree::import_raw(nodes, strings, next_inode, &Config::for_tests());
        assert_eq!(restored.path_lookup("/a/b").unwrap(), t.path_lookup("/a/b").unwrap());
        restored.nary_validate().unwrap();
    }

    #[test]
    fn rebalance_preserves_inode_numbers_and_structure() {
        let mut t = tree();
        let root = t.root();
        let a = t.insert(root, "a", S_IFDIR | 0o755).unwrap();
        let b = t.insert(a, "b", S_IFREG | 0o644).unwrap();
        let inode_b = t.node(b).unwrap().inode;
        t.rebalance();
        t.nary_validate().unwrap();
        let new_b = t.path_lookup("/a/b").unwrap();
        assert_eq!(t.node(new_b).unwrap().inode, inode_b);
    }
}
