use super::dircache::{DirCache, EntryId};
use super::dirqueue::DirQueue;
use super::path::PathBuilder;
use crate::error::WalkError;
use crate::fs::{DirStream, FileType, basename_offset, fstatat};
use libc::c_int;
use std::io;
use std::os::unix::io::RawFd;

/// What the callback tells the walker to do after a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Keep going; directories are queued for later exploration.
    Continue,
    /// Stop reading the current directory, but keep walking.
    SkipSiblings,
    /// Don't descend into this directory.
    SkipSubtree,
    /// End the traversal cleanly.
    Stop,
}

/// Whether a visit happens before or after the entry's descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitPhase {
    Pre,
    Post,
}

/// Traversal configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkFlags {
    /// Follow symlinks named on the command line (-H).
    pub follow_roots: bool,
    /// Follow every symlink (-L).
    pub follow_all: bool,
    /// Compare ancestors' (dev, ino) pairs to catch symlink cycles.
    pub detect_cycles: bool,
    /// Visit directories again in post-order (-depth).
    pub post_order: bool,
    /// Don't cross filesystem boundaries (-xdev).
    pub xdev: bool,
    /// Stat every entry even when the walk itself doesn't need it.
    pub stat_all: bool,
    /// Deliver per-entry errors as visits instead of aborting the walk.
    pub recover: bool,
}

impl WalkFlags {
    /// Whether a visit at `depth` resolves symlinks when statting.
    #[must_use]
    #[inline]
    pub const fn follows_at(&self, depth: usize) -> bool {
        self.follow_all || (depth == 0 && self.follow_roots)
    }
}

/// Everything the callback learns about one visited file.
pub struct Visit<'a> {
    /// The full path to the file.
    pub path: &'a [u8],
    /// The root this walk started from, exactly as given.
    pub root: &'a [u8],
    /// Offset of the basename within `path`.
    pub nameoff: usize,
    /// Depth below the root; the root itself is 0.
    pub depth: usize,
    pub file_type: FileType,
    /// The stat buffer, if the walk already needed one.
    pub stat: Option<&'a libc::stat>,
    /// Descriptor for `*at` calls on this file, or `AT_FDCWD`.
    pub at_fd: RawFd,
    /// The path to use relative to `at_fd`.
    pub at_path: &'a [u8],
    /// `AT_SYMLINK_NOFOLLOW` unless this visit follows links.
    pub at_flags: c_int,
    pub phase: VisitPhase,
    /// The errno behind a `FileType::Error` visit, 0 otherwise.
    pub error: i32,
}

impl Visit<'_> {
    /// The basename of the visited file.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &[u8] {
        &self.path[self.nameoff..]
    }
}

impl core::fmt::Debug for Visit<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Visit")
            .field("path", &String::from_utf8_lossy(self.path))
            .field("depth", &self.depth)
            .field("file_type", &self.file_type)
            .field("phase", &self.phase)
            .field("stat", &self.stat.is_some())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// The path names the current cache entry.
    Current,
    /// The path names a child of the current entry.
    Child,
    /// Entries are being garbage collected (post-order visits).
    Gc,
}

enum Handled {
    Action(WalkAction),
    Fail,
}

enum Outcome {
    Done,
    Fail,
}

/// The reusable per-visit fields, rebuilt before each callback.
struct VisitBuf {
    nameoff: usize,
    depth: usize,
    file_type: FileType,
    at_fd: RawFd,
    at_off: usize,
    at_flags: c_int,
    phase: VisitPhase,
    error: i32,
}

struct WalkState<'w, F> {
    callback: &'w mut F,
    flags: WalkFlags,
    /// The first errno seen, re-raised when the walk ends.
    error: i32,
    cache: DirCache,
    queue: DirQueue,
    current: Option<EntryId>,
    stream: Option<DirStream>,
    status: Status,
    root: &'w [u8],
    path: PathBuilder,
    visit: VisitBuf,
    statbuf: Option<libc::stat>,
}

#[inline]
fn raw_errno(err: &io::Error) -> i32 {
    err.raw_os_error().unwrap_or(libc::EIO)
}

impl<F> WalkState<'_, F>
where
    F: FnMut(&Visit<'_>) -> WalkAction,
{
    /// Record an error on the current visit; without `recover` it also
    /// becomes the walk's fate.
    fn set_error(&mut self, errno: i32) {
        self.visit.error = errno;
        self.visit.file_type = FileType::Error;
        if !self.flags.recover && self.error == 0 {
            self.error = errno;
        }
    }

    /// Stat the current visit, retrying without following in case a symlink
    /// is merely broken.
    fn stat_visit(&mut self) -> io::Result<()> {
        let result = fstatat(
            self.visit.at_fd,
            &self.path.as_bytes()[self.visit.at_off..],
            self.visit.at_flags,
        );
        let statbuf = match result {
            Ok(statbuf) => statbuf,
            Err(err)
                if self.visit.at_flags == 0 && err.raw_os_error() == Some(libc::ENOENT) =>
            {
                self.visit.at_flags = libc::AT_SYMLINK_NOFOLLOW;
                fstatat(
                    self.visit.at_fd,
                    &self.path.as_bytes()[self.visit.at_off..],
                    self.visit.at_flags,
                )?
            }
            Err(err) => return Err(err),
        };

        self.visit.file_type = FileType::from_mode(statbuf.st_mode);
        self.statbuf = Some(statbuf);
        Ok(())
    }

    /// Fill the visit buffer for the path currently in the builder.
    /// `dirent_type` carries the directory reader's type when there is one.
    fn init_buffers(&mut self, dirent_type: Option<FileType>) {
        self.visit.error = 0;
        self.visit.phase = if self.status == Status::Gc {
            VisitPhase::Post
        } else {
            VisitPhase::Pre
        };
        self.statbuf = None;
        self.visit.at_fd = libc::AT_FDCWD;
        self.visit.at_off = 0;

        if let Some(id) = self.current {
            let entry = self.cache.entry(id);
            self.visit.nameoff = entry.nameoff;
            self.visit.depth = entry.depth;

            if self.status == Status::Child {
                self.visit.nameoff += entry.namelen();
                self.visit.depth += 1;
                self.visit.at_fd = entry.raw_fd().expect("children are visited while open");
                self.visit.at_off = self.visit.nameoff;
            } else if let Some((_, fd, off)) = self.cache.entry_base(id) {
                self.visit.at_fd = fd;
                self.visit.at_off = off;
            }
        } else {
            self.visit.depth = 0;
        }

        if self.visit.depth == 0 {
            // Root paths like "foo/bar" still get a sensible basename
            self.visit.nameoff = basename_offset(self.path.as_bytes());
        }

        self.visit.file_type = match dirent_type {
            Some(file_type) => file_type,
            None if self.status != Status::Child => FileType::Directory,
            None => FileType::Unknown,
        };

        let follow = self.flags.follows_at(self.visit.depth);
        self.visit.at_flags = if follow { 0 } else { libc::AT_SYMLINK_NOFOLLOW };

        let detect_cycles = self.flags.detect_cycles && self.status == Status::Child;

        let needs_stat = self.flags.stat_all
            || self.visit.file_type == FileType::Unknown
            || (self.visit.file_type == FileType::Symlink && follow)
            || (self.visit.file_type == FileType::Directory
                && (detect_cycles || self.flags.xdev));
        if !needs_stat {
            return;
        }

        if let Err(err) = self.stat_visit() {
            self.set_error(raw_errno(&err));
            return;
        }

        if self.visit.file_type == FileType::Directory && detect_cycles {
            let statbuf = self.statbuf.as_ref().expect("just statted");
            #[allow(clippy::unnecessary_cast)] //dev_t/ino_t widths vary by target
            let needle = (statbuf.st_dev as u64, statbuf.st_ino as u64);

            let mut ancestor = self.current;
            while let Some(id) = ancestor {
                let entry = self.cache.entry(id);
                if entry.dev_ino == Some(needle) {
                    self.set_error(libc::ELOOP);
                    return;
                }
                ancestor = entry.parent;
            }
        }
    }

    /// Invoke the callback on the current visit.
    fn handle_path(&mut self) -> Handled {
        // Error visits only reach the callback under `recover`
        if self.visit.file_type == FileType::Error && !self.flags.recover {
            return Handled::Fail;
        }

        let path = self.path.as_bytes();
        let visit = Visit {
            path,
            root: self.root,
            nameoff: self.visit.nameoff,
            depth: self.visit.depth,
            file_type: self.visit.file_type,
            stat: self.statbuf.as_ref(),
            at_fd: self.visit.at_fd,
            at_path: &path[self.visit.at_off..],
            at_flags: self.visit.at_flags,
            phase: self.visit.phase,
            error: self.visit.error,
        };

        Handled::Action((self.callback)(&visit))
    }

    /// Queue a child of the current entry for later exploration.
    fn push_child(&mut self, name: &[u8]) {
        #[allow(clippy::unnecessary_cast)]
        let dev_ino = self
            .statbuf
            .as_ref()
            .map(|statbuf| (statbuf.st_dev as u64, statbuf.st_ino as u64));
        let id = self.cache.add(self.current, name, dev_ino);
        self.queue.push(id);
    }

    /**
    Garbage-collect `entry` and any ancestors whose last reference this was.

    In post-order mode each entry reaching refcount zero gets its `Post`
    visit here, which is exactly after all of its descendants have been
    fully walked.
    */
    fn gc(&mut self, entry: Option<EntryId>, mut invoke: bool) -> Handled {
        let mut ret = Handled::Action(WalkAction::Continue);

        if !self.flags.post_order {
            invoke = false;
        }

        let mut entry = entry;
        if invoke && let Some(id) = entry {
            self.path.rebuild(&self.cache, id);
        }

        self.status = Status::Gc;

        while let Some(id) = entry {
            if self.cache.decref(id) > 0 {
                self.path.set_last(Some(id));
                break;
            }

            if invoke {
                self.current = Some(id);
                self.path.trim(&self.cache, id, self.root);
                if self.status == Status::Child {
                    self.status = Status::Current;
                }
                self.init_buffers(None);

                match self.handle_path() {
                    Handled::Action(WalkAction::Stop) => {
                        ret = Handled::Action(WalkAction::Stop);
                        invoke = false;
                    }
                    Handled::Fail => {
                        ret = Handled::Fail;
                        invoke = false;
                    }
                    Handled::Action(_) => {}
                }
            }

            let parent = self.cache.entry(id).parent;
            self.cache.free_entry(id);
            entry = parent;
        }

        ret
    }

    /// Finish the current entry and move to the next queued directory.
    fn pop(&mut self, invoke: bool) -> Handled {
        let ret = self.gc(self.current, invoke);
        self.current = self.queue.pop();
        self.status = Status::Current;
        ret
    }

    fn run(&mut self) -> Outcome {
        // The root string itself is the first visit
        self.path.concat(&self.cache, None, self.root);
        self.status = Status::Child;
        self.init_buffers(None);

        match self.handle_path() {
            Handled::Action(WalkAction::Continue | WalkAction::SkipSiblings) => {}
            Handled::Action(WalkAction::SkipSubtree | WalkAction::Stop) => return Outcome::Done,
            Handled::Fail => return Outcome::Fail,
        }

        if self.visit.file_type != FileType::Directory {
            return Outcome::Done;
        }

        // Now start the breadth-first search
        #[allow(clippy::unnecessary_cast)]
        let dev_ino = self
            .statbuf
            .as_ref()
            .map(|statbuf| (statbuf.st_dev as u64, statbuf.st_ino as u64));
        self.current = Some(self.cache.add(None, self.root, dev_ino));

        let mut namebuf: Vec<u8> = Vec::new();

        while let Some(current) = self.current {
            self.path.rebuild(&self.cache, current);

            let mut dir_err = match self.cache.open(current, self.path.as_bytes()) {
                Ok(stream) => {
                    self.stream = Some(stream);
                    None
                }
                Err(err) => Some(raw_errno(&err)),
            };

            if dir_err.is_none() {
                loop {
                    let dirent_type = {
                        let stream = self.stream.as_mut().expect("opened above");
                        match stream.read() {
                            Ok(Some(dirent)) => {
                                namebuf.clear();
                                namebuf.extend_from_slice(dirent.name);
                                dirent.file_type
                            }
                            Ok(None) => break,
                            Err(err) => {
                                dir_err = Some(raw_errno(&err));
                                break;
                            }
                        }
                    };

                    self.path.concat(&self.cache, self.current, &namebuf);
                    self.status = Status::Child;
                    self.init_buffers(Some(dirent_type));

                    match self.handle_path() {
                        Handled::Action(WalkAction::Continue) => {
                            if self.visit.file_type == FileType::Directory {
                                if self.flags.xdev
                                    && let Some(statbuf) = self.statbuf.as_ref()
                                {
                                    #[allow(clippy::unnecessary_cast)]
                                    let dev = statbuf.st_dev as u64;
                                    let parent_dev =
                                        self.cache.entry(current).dev_ino.map(|(d, _)| d);
                                    if parent_dev != Some(dev) {
                                        continue;
                                    }
                                }
                                self.push_child(&namebuf);
                            }
                        }
                        Handled::Action(WalkAction::SkipSubtree) => {}
                        Handled::Action(WalkAction::SkipSiblings) => break,
                        Handled::Action(WalkAction::Stop) => return Outcome::Done,
                        Handled::Fail => return Outcome::Fail,
                    }
                }
            }

            if let Some(errno) = dir_err {
                // Report the unreadable directory itself, then move on
                self.stream = None;
                self.path.trim(&self.cache, current, self.root);
                if self.status == Status::Child {
                    self.status = Status::Current;
                }
                self.init_buffers(None);
                self.set_error(errno);

                match self.handle_path() {
                    Handled::Action(WalkAction::Stop) => return Outcome::Done,
                    Handled::Fail => return Outcome::Fail,
                    Handled::Action(_) => {}
                }
            }

            self.stream = None;
            match self.pop(true) {
                Handled::Action(WalkAction::Stop) => return Outcome::Done,
                Handled::Fail => return Outcome::Fail,
                Handled::Action(_) => {}
            }
        }

        Outcome::Done
    }
}

/**
Walk the tree under `root` breadth-first, invoking `callback` once per visit.

`nopenfd` bounds the directory descriptors the walk may keep open; it must
be at least 2 (one cached descriptor plus the duplicate handed to the
directory reader). The first errno observed is re-raised as the walk's
error; with [`WalkFlags::recover`] set, per-entry errors are delivered to
the callback as [`FileType::Error`] visits instead of ending the walk.
*/
pub fn walk<F>(
    root: &[u8],
    nopenfd: usize,
    flags: WalkFlags,
    callback: &mut F,
) -> Result<(), WalkError>
where
    F: FnMut(&Visit<'_>) -> WalkAction,
{
    if nopenfd < 2 {
        return Err(WalkError::new(libc::EMFILE));
    }

    let mut state = WalkState {
        callback,
        flags,
        error: 0,
        // One descriptor is reserved for the reader's dup()
        cache: DirCache::new(nopenfd - 1),
        queue: DirQueue::new(),
        current: None,
        stream: None,
        status: Status::Current,
        root,
        path: PathBuilder::new(),
        visit: VisitBuf {
            nameoff: 0,
            depth: 0,
            file_type: FileType::Unknown,
            at_fd: libc::AT_FDCWD,
            at_off: 0,
            at_flags: 0,
            phase: VisitPhase::Pre,
            error: 0,
        },
        statbuf: None,
    };

    let outcome = state.run();

    match outcome {
        Outcome::Done if state.error == 0 => Ok(()),
        Outcome::Done => Err(WalkError::new(state.error)),
        Outcome::Fail => Err(WalkError::new(if state.error == 0 {
            libc::EINVAL
        } else {
            state.error
        })),
    }
}
