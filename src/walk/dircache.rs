use crate::fs::{DirStream, FileDes, dup_cloexec, openat_dir};
use std::io;
use std::os::unix::io::RawFd;

/// Index of a live entry in the cache's arena.
pub(crate) type EntryId = usize;

/// One directory discovered by the walk.
///
/// Entries form a tree through `parent`; the reference count is one "self"
/// reference plus one per live child. The entry is freed when it reaches
/// zero, which is also when the post-order visit fires.
#[derive(Debug)]
pub(crate) struct CacheEntry {
    pub(crate) parent: Option<EntryId>,
    pub(crate) depth: usize,
    pub(crate) refcount: usize,
    /// Position in the priority queue while the descriptor is open.
    heap_index: usize,
    pub(crate) fd: Option<FileDes>,
    /// Device and inode for cycle detection and -xdev, filled from stat.
    pub(crate) dev_ino: Option<(u64, u64)>,
    /// Offset of this directory's name within the full path.
    pub(crate) nameoff: usize,
    /// The name segment, always ending in a slash.
    pub(crate) name: Box<[u8]>,
}

impl CacheEntry {
    #[inline]
    pub(crate) fn namelen(&self) -> usize {
        self.name.len()
    }

    #[inline]
    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(FileDes::raw)
    }
}

/**
A bounded cache of open directory descriptors.

Keeps at most `capacity` descriptors among the entries it tracks, organised
as a binary min-heap whose root is the best eviction candidate. The ordering
prefers to evict deep, lightly-referenced directories: shallow directories
with many live children benefit the most from directory-relative opens.
*/
#[derive(Debug)]
pub(crate) struct DirCache {
    slots: Vec<Option<CacheEntry>>,
    free: Vec<EntryId>,
    heap: Vec<EntryId>,
    capacity: usize,
}

impl DirCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            heap: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub(crate) fn open_count(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub(crate) fn entry(&self, id: EntryId) -> &CacheEntry {
        self.slots[id].as_ref().expect("stale cache entry id")
    }

    #[inline]
    fn entry_mut(&mut self, id: EntryId) -> &mut CacheEntry {
        self.slots[id].as_mut().expect("stale cache entry id")
    }

    /// Create an entry for a newly discovered directory.
    ///
    /// The child starts with refcount 1 and bumps its parent's count.
    pub(crate) fn add(
        &mut self,
        parent: Option<EntryId>,
        name: &[u8],
        dev_ino: Option<(u64, u64)>,
    ) -> EntryId {
        let mut segment = Vec::with_capacity(name.len() + 1);
        segment.extend_from_slice(name);
        if !segment.ends_with(b"/") {
            segment.push(b'/');
        }

        let (depth, nameoff) = match parent {
            Some(pid) => {
                let parent_entry = self.entry(pid);
                (parent_entry.depth + 1, parent_entry.nameoff + parent_entry.namelen())
            }
            None => (0, 0),
        };

        let entry = CacheEntry {
            parent,
            depth,
            refcount: 1,
            heap_index: usize::MAX,
            fd: None,
            dev_ino,
            nameoff,
            name: segment.into_boxed_slice(),
        };

        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(entry);
                id
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        if let Some(pid) = parent {
            self.incref(pid);
        }

        id
    }

    /// Bump an entry's reference count, fixing its heap position.
    pub(crate) fn incref(&mut self, id: EntryId) {
        let entry = self.entry_mut(id);
        entry.refcount += 1;
        if entry.fd.is_some() {
            self.bubble_down(id);
        }
    }

    /// Drop one reference, fixing the heap position. The caller frees the
    /// entry once the count reaches zero.
    pub(crate) fn decref(&mut self, id: EntryId) -> usize {
        let entry = self.entry_mut(id);
        entry.refcount -= 1;
        let remaining = entry.refcount;
        if entry.fd.is_some() {
            self.bubble_up(id);
        }
        remaining
    }

    /// Destroy a dead entry, closing its descriptor if still cached.
    pub(crate) fn free_entry(&mut self, id: EntryId) {
        debug_assert_eq!(self.entry(id).refcount, 0, "freeing a live entry");
        if self.entry(id).fd.is_some() {
            self.heap_remove(id);
        }
        self.slots[id] = None;
        self.free.push(id);
    }

    /// Find the nearest ancestor with an open descriptor.
    ///
    /// Returns `(fd, suffix offset)` for the `*at` family, or `None` when
    /// every ancestor is closed and the caller must fall back to the full
    /// path relative to the working directory.
    pub(crate) fn entry_base(&self, id: EntryId) -> Option<(EntryId, RawFd, usize)> {
        let mut base = self.entry(id).parent;
        while let Some(bid) = base {
            let entry = self.entry(bid);
            if let Some(fd) = entry.raw_fd() {
                return Some((bid, fd, entry.nameoff + entry.namelen()));
            }
            base = entry.parent;
        }
        None
    }

    /**
    Open an entry's directory and hand back a stream over a duplicated
    descriptor, retaining the original for future `*at` calls.

    When the cache is full the heap root is evicted first. Descriptor
    exhaustion triggers one eviction-and-retry, permanently shrinking the
    cache; a second failure is returned to the caller.
    */
    pub(crate) fn open(&mut self, id: EntryId, path: &[u8]) -> io::Result<DirStream> {
        debug_assert!(self.entry(id).fd.is_none(), "entry already open");

        if self.heap.len() == self.capacity
            && let Some(&root) = self.heap.first()
        {
            self.heap_remove(root);
        }

        let base = self.entry_base(id);
        let (save, at_fd, at_off) = match base {
            Some((bid, fd, off)) => (Some(bid), fd, off),
            None => (None, libc::AT_FDCWD, 0),
        };

        let fd = match openat_dir(at_fd, &path[at_off..]) {
            Ok(fd) => fd,
            Err(err) if self.should_retry(&err, save) => openat_dir(at_fd, &path[at_off..])?,
            Err(err) => return Err(err),
        };

        let raw = fd.raw();
        self.entry_mut(id).fd = Some(fd);
        self.heap_push(id);

        // Dup the cached descriptor for the stream; the stream closes its
        // copy when enumeration finishes while ours stays in the heap.
        let duped = match dup_cloexec(raw) {
            Ok(duped) => duped,
            Err(err) if self.should_retry(&err, Some(id)) => dup_cloexec(raw)?,
            Err(err) => return Err(err),
        };

        DirStream::from_fd(duped)
    }

    /// Shrink after descriptor exhaustion, sparing `save`. Capacity never
    /// grows back.
    fn should_retry(&mut self, err: &io::Error, save: Option<EntryId>) -> bool {
        if !matches!(err.raw_os_error(), Some(libc::EMFILE | libc::ENFILE)) {
            return false;
        }
        if self.heap.len() <= 1 {
            return false;
        }

        let mut victim = self.heap[0];
        if Some(victim) == save {
            victim = self.heap[1];
        }
        self.heap_remove(victim);
        self.capacity = self.heap.len();
        true
    }

    /// True when `a` should sit above `b` in the heap.
    fn heap_check(&self, a: EntryId, b: EntryId) -> bool {
        let (a, b) = (self.entry(a), self.entry(b));
        if a.depth != b.depth {
            a.depth > b.depth
        } else {
            a.refcount <= b.refcount
        }
    }

    #[inline]
    fn heap_move(&mut self, id: EntryId, index: usize) {
        self.heap[index] = id;
        self.entry_mut(id).heap_index = index;
    }

    fn bubble_up(&mut self, id: EntryId) {
        let mut i = self.entry(id).heap_index;
        while i > 0 {
            let pi = (i - 1) / 2;
            let parent = self.heap[pi];
            if self.heap_check(parent, id) {
                break;
            }
            self.heap_move(parent, i);
            i = pi;
        }
        self.heap_move(id, i);
    }

    fn bubble_down(&mut self, id: EntryId) {
        let mut i = self.entry(id).heap_index;
        loop {
            let mut ci = 2 * i + 1;
            if ci >= self.heap.len() {
                break;
            }

            let mut child = self.heap[ci];
            let ri = ci + 1;
            if ri < self.heap.len() && !self.heap_check(child, self.heap[ri]) {
                ci = ri;
                child = self.heap[ri];
            }

            if self.heap_check(id, child) {
                break;
            }

            self.heap_move(child, i);
            i = ci;
        }
        self.heap_move(id, i);
    }

    fn heap_push(&mut self, id: EntryId) {
        debug_assert!(self.heap.len() < self.capacity);
        let index = self.heap.len();
        self.heap.push(id);
        self.entry_mut(id).heap_index = index;
        self.bubble_up(id);
    }

    /// Close an entry's descriptor and drop it from the heap.
    fn heap_remove(&mut self, id: EntryId) {
        let i = self.entry(id).heap_index;
        let entry = self.entry_mut(id);
        entry.fd = None;
        entry.heap_index = usize::MAX;

        let last = self.heap.pop().expect("removing from an empty heap");
        if last != id {
            self.heap[i] = last;
            self.entry_mut(last).heap_index = i;
            self.bubble_down(last);
            self.bubble_up(last);
        }
    }

    #[cfg(test)]
    fn assert_heap_valid(&self) {
        assert!(self.heap.len() <= self.capacity);
        for (i, &id) in self.heap.iter().enumerate() {
            assert_eq!(self.entry(id).heap_index, i, "stale heap index");
            assert!(self.entry(id).fd.is_some(), "closed entry in the heap");
            if i > 0 {
                let parent = self.heap[(i - 1) / 2];
                assert!(self.heap_check(parent, id), "heap order violated");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::ffi::OsStrExt as _;

    fn scratch_tree(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        dir
    }

    #[test]
    fn eviction_respects_capacity() {
        let dir = scratch_tree(&["a", "b", "c", "d"]);
        let root_path = dir.path().as_os_str().as_bytes().to_vec();

        let mut cache = DirCache::new(2);
        let root = cache.add(None, &root_path, None);
        let _stream = cache.open(root, &root_path).unwrap();

        for name in ["a", "b", "c", "d"] {
            let child = cache.add(Some(root), name.as_bytes(), None);
            let mut path = root_path.clone();
            path.push(b'/');
            path.extend_from_slice(name.as_bytes());
            let _stream = cache.open(child, &path).unwrap();

            assert!(cache.open_count() <= cache.capacity());
            cache.assert_heap_valid();
        }
    }

    #[test]
    fn refcount_changes_reorder_the_heap() {
        let dir = scratch_tree(&["a", "b", "c"]);
        let root_path = dir.path().as_os_str().as_bytes().to_vec();

        let mut cache = DirCache::new(8);
        let root = cache.add(None, &root_path, None);
        let _root_stream = cache.open(root, &root_path).unwrap();

        let mut children = Vec::new();
        for name in ["a", "b", "c"] {
            let child = cache.add(Some(root), name.as_bytes(), None);
            let mut path = root_path.clone();
            path.push(b'/');
            path.extend_from_slice(name.as_bytes());
            let _stream = cache.open(child, &path).unwrap();
            children.push(child);
        }
        cache.assert_heap_valid();

        // Heavily referenced entries sink away from the eviction point
        for _ in 0..4 {
            cache.incref(children[0]);
        }
        cache.assert_heap_valid();
        for _ in 0..4 {
            cache.decref(children[0]);
        }
        cache.assert_heap_valid();
    }

    #[test]
    fn entry_base_skips_closed_ancestors() {
        let dir = scratch_tree(&["a"]);
        std::fs::create_dir(dir.path().join("a/b")).unwrap();
        let root_path = dir.path().as_os_str().as_bytes().to_vec();

        let mut cache = DirCache::new(8);
        let root = cache.add(None, &root_path, None);
        let a = cache.add(Some(root), b"a", None);
        let b = cache.add(Some(a), b"b", None);

        // Nothing open yet: resolution falls back to the working directory
        assert!(cache.entry_base(b).is_none());

        let _stream = cache.open(root, &root_path).unwrap();
        let (bid, _, off) = cache.entry_base(b).unwrap();
        assert_eq!(bid, root);
        assert_eq!(off, root_path.len() + 1);
    }

    #[test]
    fn refcounts_propagate_to_parents() {
        let mut cache = DirCache::new(4);
        let root = cache.add(None, b"root", None);
        let a = cache.add(Some(root), b"a", None);
        assert_eq!(cache.entry(root).refcount, 2);

        assert_eq!(cache.decref(a), 0);
        cache.free_entry(a);
        assert_eq!(cache.decref(root), 1);
        assert_eq!(cache.decref(root), 0);
        cache.free_entry(root);
    }
}
