use super::dircache::{DirCache, EntryId};

/// Incrementally maintains the full path of the entry being walked.
///
/// Moving between entries rewrites only the suffix that actually changed:
/// the builder walks the new entry's ancestors back to the deepest one it
/// shares with the previously built path and writes each name segment at its
/// recorded offset.
#[derive(Debug, Default)]
pub(crate) struct PathBuilder {
    buf: Vec<u8>,
    /// The entry the buffer currently spells out, if any.
    last: Option<EntryId>,
}

impl PathBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Reset which entry the buffer is known to spell out.
    #[inline]
    pub(crate) fn set_last(&mut self, last: Option<EntryId>) {
        self.last = last;
    }

    /// Rebuild the buffer so it names `entry`, reusing the shared prefix.
    pub(crate) fn rebuild(&mut self, cache: &DirCache, entry: EntryId) {
        let target = cache.entry(entry);
        self.buf.resize(target.nameoff + target.namelen(), 0);

        // Walk the previous entry up to the new entry's depth; everything
        // deeper is stale anyway.
        let mut last = self.last;
        while let Some(lid) = last
            && cache.entry(lid).depth > target.depth
        {
            last = cache.entry(lid).parent;
        }

        // Write segments backwards until we hit the common ancestor
        let mut cursor = Some(entry);
        while cursor != last {
            let id = cursor.expect("diverged past the root");
            let seg = cache.entry(id);
            self.buf[seg.nameoff..seg.nameoff + seg.namelen()].copy_from_slice(&seg.name);

            if let Some(lid) = last
                && cache.entry(lid).depth == seg.depth
            {
                last = cache.entry(lid).parent;
            }
            cursor = seg.parent;
        }

        self.last = Some(entry);
    }

    /// Truncate to the current entry's directory prefix and append `name`.
    pub(crate) fn concat(&mut self, cache: &DirCache, current: Option<EntryId>, name: &[u8]) {
        let nameoff = current.map_or(0, |id| {
            let entry = cache.entry(id);
            entry.nameoff + entry.namelen()
        });
        self.buf.truncate(nameoff);
        self.buf.extend_from_slice(name);
    }

    /// Trim the buffer back to just `current`, dropping the trailing slash
    /// of non-root entries.
    pub(crate) fn trim(&mut self, cache: &DirCache, current: EntryId, root: &[u8]) {
        let entry = cache.entry(current);
        let length = if entry.depth == 0 {
            // Use exactly the string passed in, trailing slashes included
            root.len()
        } else {
            let mut length = entry.nameoff + entry.namelen();
            if entry.namelen() > 1 {
                length -= 1;
                self.last = entry.parent;
            }
            length
        };
        self.buf.truncate(length);
    }
}
