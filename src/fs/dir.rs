use super::FileType;
use core::ffi::CStr;
use core::ptr::NonNull;
use libc::{DIR, O_CLOEXEC, O_DIRECTORY, O_RDONLY, c_int};
use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

/// An owned file descriptor, closed on drop.
///
/// The dircache hands out raw copies of the descriptor for `*at` calls while
/// it stays alive; only this wrapper ever closes it.
#[derive(Debug)]
#[repr(transparent)]
pub struct FileDes(RawFd);

impl FileDes {
    /// Returns the raw descriptor without giving up ownership.
    #[must_use]
    #[inline]
    pub const fn raw(&self) -> RawFd {
        self.0
    }

    /// Consumes the wrapper, handing ownership of the descriptor to the caller.
    #[must_use]
    #[inline]
    pub fn into_raw(self) -> RawFd {
        let fd = self.0;
        core::mem::forget(self);
        fd
    }
}

impl Drop for FileDes {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: we own the descriptor and close it exactly once
        unsafe { libc::close(self.0) };
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn errno_ptr() -> *mut c_int {
    // SAFETY: always valid to take the thread-local errno address
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
unsafe fn errno_ptr() -> *mut c_int {
    // SAFETY: as above, under the BSD spelling
    unsafe { libc::__error() }
}

/// NUL-check a byte path and hand it to a syscall as a C string.
fn cstr(path: &[u8]) -> io::Result<CString> {
    CString::new(path).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
}

/// `openat(2)` restricted to directories, with `O_CLOEXEC`.
pub fn openat_dir(dirfd: RawFd, path: &[u8]) -> io::Result<FileDes> {
    let c_path = cstr(path)?;
    // SAFETY: c_path is NUL-terminated and dirfd is either AT_FDCWD or a
    // descriptor the cache keeps open
    let fd = unsafe { libc::openat(dirfd, c_path.as_ptr(), O_RDONLY | O_CLOEXEC | O_DIRECTORY) };
    if fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(FileDes(fd))
    }
}

/// Duplicate a descriptor with the close-on-exec flag set atomically.
pub fn dup_cloexec(fd: RawFd) -> io::Result<FileDes> {
    // SAFETY: fcntl with F_DUPFD_CLOEXEC only reads the descriptor
    let duped = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if duped < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(FileDes(duped))
    }
}

/// `fstatat(2)` returning the stat buffer by value.
pub fn fstatat(dirfd: RawFd, path: &[u8], flags: c_int) -> io::Result<libc::stat> {
    let c_path = cstr(path)?;
    let mut statbuf = core::mem::MaybeUninit::<libc::stat>::uninit();
    // SAFETY: statbuf is sized for the out-parameter and only read on success
    let ret = unsafe { libc::fstatat(dirfd, c_path.as_ptr(), statbuf.as_mut_ptr(), flags) };
    if ret != 0 {
        Err(io::Error::last_os_error())
    } else {
        // SAFETY: the kernel filled the buffer
        Ok(unsafe { statbuf.assume_init() })
    }
}

/// `faccessat(2)` for `-readable`/`-writable`/`-executable`.
pub fn faccessat(dirfd: RawFd, path: &[u8], mode: c_int) -> io::Result<()> {
    let c_path = cstr(path)?;
    // SAFETY: plain permission probe, no memory handed to the kernel
    let ret = unsafe { libc::faccessat(dirfd, c_path.as_ptr(), mode, 0) };
    if ret != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// `readlinkat(2)` with a growth loop in case the size hint was stale.
pub fn readlinkat(dirfd: RawFd, path: &[u8], size_hint: usize) -> io::Result<Vec<u8>> {
    let c_path = cstr(path)?;
    let mut capacity = size_hint.max(1) + 1;

    loop {
        let mut buf = vec![0u8; capacity];
        // SAFETY: buf is writable for capacity bytes
        let len = unsafe {
            libc::readlinkat(
                dirfd,
                c_path.as_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        };
        if len < 0 {
            return Err(io::Error::last_os_error());
        }

        #[allow(clippy::cast_sign_loss)] //checked non-negative above
        let len = len as usize;
        if len < buf.len() {
            buf.truncate(len);
            return Ok(buf);
        }

        // The target grew under us, retry with more room
        capacity *= 2;
    }
}

/// `unlinkat(2)`, with `AT_REMOVEDIR` when asked to remove a directory.
pub fn unlinkat(dirfd: RawFd, path: &[u8], remove_dir: bool) -> io::Result<()> {
    let c_path = cstr(path)?;
    let flags = if remove_dir { libc::AT_REMOVEDIR } else { 0 };
    // SAFETY: NUL-terminated path, flags restricted to AT_REMOVEDIR
    let ret = unsafe { libc::unlinkat(dirfd, c_path.as_ptr(), flags) };
    if ret != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// One directory entry as yielded by [`DirStream::read`].
///
/// The name borrows the stream's internal `dirent`, so it is only valid until
/// the next read; the walker copies it straight into its path buffer.
#[derive(Debug)]
pub struct Dirent<'a> {
    pub name: &'a [u8],
    pub file_type: FileType,
}

/**
POSIX directory stream over a descriptor the caller duplicated for us.

The stream owns its descriptor through the `DIR` handle: `fdopendir` adopts
the fd and `closedir` releases it. The dircache keeps the original descriptor
for future `*at` calls, which is why it hands us a duplicate.
*/
#[derive(Debug)]
pub struct DirStream {
    dir: NonNull<DIR>,
}

impl DirStream {
    /// Adopt `fd` as a directory stream. On failure the descriptor is closed.
    pub fn from_fd(fd: FileDes) -> io::Result<Self> {
        let raw = fd.into_raw();
        // SAFETY: raw is an open directory descriptor we now own
        let dir = unsafe { libc::fdopendir(raw) };
        match NonNull::new(dir) {
            Some(dir) => Ok(Self { dir }),
            None => {
                let err = io::Error::last_os_error();
                // SAFETY: fdopendir failed, so the fd was not adopted
                unsafe { libc::close(raw) };
                Err(err)
            }
        }
    }

    /**
    Reads the next entry, skipping `.` and `..`.

    Returns `Ok(None)` at end of directory. Unlike plain `readdir`, errors
    are told apart from end-of-stream by clearing and re-checking `errno`.
    */
    pub fn read(&mut self) -> io::Result<Option<Dirent<'_>>> {
        loop {
            // SAFETY: errno is thread-local; clearing it lets us distinguish
            // end-of-directory from a readdir failure
            unsafe { *errno_ptr() = 0 };

            // SAFETY: self.dir is a valid stream for our whole lifetime
            let entry = unsafe { libc::readdir(self.dir.as_ptr()) };
            if entry.is_null() {
                let err = io::Error::last_os_error();
                return match err.raw_os_error() {
                    Some(0) | None => Ok(None),
                    Some(_) => Err(err),
                };
            }

            // SAFETY: readdir returned a valid dirent whose d_name is
            // NUL-terminated
            let name = unsafe { CStr::from_ptr((*entry).d_name.as_ptr()) }.to_bytes();
            if name == b"." || name == b".." {
                continue;
            }

            // SAFETY: entry outlives the returned borrow of self
            let d_type = unsafe { (*entry).d_type };
            return Ok(Some(Dirent {
                name,
                file_type: FileType::from_dtype(d_type),
            }));
        }
    }
}

impl Drop for DirStream {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: closing the stream releases the adopted descriptor too
        unsafe { libc::closedir(self.dir.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::ffi::OsStrExt as _;

    #[test]
    fn stream_lists_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let fd = openat_dir(libc::AT_FDCWD, dir.path().as_os_str().as_bytes()).unwrap();
        let mut stream = DirStream::from_fd(fd).unwrap();

        let mut names = Vec::new();
        while let Some(entry) = stream.read().unwrap() {
            names.push(entry.name.to_vec());
        }
        names.sort();
        assert_eq!(names, vec![b"a.txt".to_vec(), b"sub".to_vec()]);
    }

    #[test]
    fn readlink_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink("target/elsewhere", &link).unwrap();

        let target = readlinkat(libc::AT_FDCWD, link.as_os_str().as_bytes(), 4).unwrap();
        assert_eq!(target, b"target/elsewhere");
    }

    #[test]
    fn nul_in_path_is_einval() {
        let err = fstatat(libc::AT_FDCWD, b"bad\0path", 0).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }
}
