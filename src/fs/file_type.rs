use libc::{
    DT_BLK, DT_CHR, DT_DIR, DT_FIFO, DT_LNK, DT_REG, DT_SOCK, S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO,
    S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK, mode_t,
};

/// Represents the type of a visited file, as the walker reports it.
///
/// `Unknown` appears when the directory entry carries no type information
/// (esoteric filesystems mostly); `Error` marks a visit whose path could not
/// be examined at all, with the errno recorded on the visit itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileType {
    BlockDevice,
    CharDevice,
    Directory,
    Door,
    Fifo,
    Symlink,
    RegularFile,
    Socket,
    Unknown,
    Error,
}

impl FileType {
    /// Converts a `dirent` d_type to a `FileType`.
    /// On some filesystems (NTFS and friends) this reports `Unknown` and the
    /// walker falls back to `stat`.
    #[must_use]
    #[inline]
    pub const fn from_dtype(d_type: u8) -> Self {
        match d_type {
            DT_DIR => Self::Directory,
            DT_REG => Self::RegularFile,
            DT_BLK => Self::BlockDevice,
            DT_CHR => Self::CharDevice,
            DT_FIFO => Self::Fifo,
            DT_LNK => Self::Symlink,
            DT_SOCK => Self::Socket,
            _ => Self::Unknown,
        }
    }

    /// Classify a `st_mode` from a stat buffer.
    #[must_use]
    #[inline]
    pub const fn from_mode(mode: mode_t) -> Self {
        match mode & S_IFMT {
            S_IFREG => Self::RegularFile,
            S_IFDIR => Self::Directory,
            S_IFBLK => Self::BlockDevice,
            S_IFCHR => Self::CharDevice,
            S_IFIFO => Self::Fifo,
            S_IFLNK => Self::Symlink,
            S_IFSOCK => Self::Socket,
            _ => Self::Unknown,
        }
    }

    /// The single-character spelling used by `-type` arguments and `%y`.
    #[must_use]
    pub const fn type_char(self) -> char {
        match self {
            Self::BlockDevice => 'b',
            Self::CharDevice => 'c',
            Self::Directory => 'd',
            Self::Door => 'D',
            Self::Fifo => 'p',
            Self::RegularFile => 'f',
            Self::Symlink => 'l',
            Self::Socket => 's',
            Self::Unknown | Self::Error => 'U',
        }
    }

    /// The bit this type occupies in a [`TypeMask`].
    #[must_use]
    pub(crate) const fn bit(self) -> u16 {
        match self {
            Self::BlockDevice => 1 << 0,
            Self::CharDevice => 1 << 1,
            Self::Directory => 1 << 2,
            Self::Door => 1 << 3,
            Self::Fifo => 1 << 4,
            Self::Symlink => 1 << 5,
            Self::RegularFile => 1 << 6,
            Self::Socket => 1 << 7,
            Self::Unknown | Self::Error => 0,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::BlockDevice => write!(f, "Block device"),
            Self::CharDevice => write!(f, "Character device"),
            Self::Directory => write!(f, "Directory"),
            Self::Door => write!(f, "Door"),
            Self::Fifo => write!(f, "FIFO"),
            Self::Symlink => write!(f, "Symlink"),
            Self::RegularFile => write!(f, "Regular file"),
            Self::Socket => write!(f, "Socket"),
            Self::Unknown => write!(f, "Unknown"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// A set of [`FileType`]s, as accepted by `-type`/`-xtype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeMask(u16);

impl TypeMask {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn with(self, file_type: FileType) -> Self {
        Self(self.0 | file_type.bit())
    }

    #[must_use]
    pub const fn contains(self, file_type: FileType) -> bool {
        file_type.bit() & self.0 != 0
    }
}

/// Render a mode the way `ls -l` does: `drwxr-xr-x` and friends.
#[must_use]
pub fn format_mode(mode: mode_t) -> [u8; 10] {
    let mut buf = *b"----------";

    buf[0] = match mode & S_IFMT {
        S_IFBLK => b'b',
        S_IFCHR => b'c',
        S_IFDIR => b'd',
        S_IFIFO => b'p',
        S_IFLNK => b'l',
        S_IFSOCK => b's',
        _ => b'-',
    };

    const TRIADS: [(mode_t, u8, usize); 9] = [
        (0o400, b'r', 1),
        (0o200, b'w', 2),
        (0o100, b'x', 3),
        (0o040, b'r', 4),
        (0o020, b'w', 5),
        (0o010, b'x', 6),
        (0o004, b'r', 7),
        (0o002, b'w', 8),
        (0o001, b'x', 9),
    ];
    for (bit, ch, idx) in TRIADS {
        if mode & bit != 0 {
            buf[idx] = ch;
        }
    }

    // setuid/setgid/sticky overwrite the execute column
    if mode & libc::S_ISUID != 0 {
        buf[3] = if mode & 0o100 != 0 { b's' } else { b'S' };
    }
    if mode & libc::S_ISGID != 0 {
        buf[6] = if mode & 0o010 != 0 { b's' } else { b'S' };
    }
    if mode & libc::S_ISVTX != 0 {
        buf[9] = if mode & 0o001 != 0 { b't' } else { b'T' };
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_strings() {
        assert_eq!(&format_mode(S_IFDIR | 0o755), b"drwxr-xr-x");
        assert_eq!(&format_mode(S_IFREG | 0o644), b"-rw-r--r--");
        assert_eq!(&format_mode(S_IFREG | libc::S_ISUID | 0o755), b"-rwsr-xr-x");
        assert_eq!(&format_mode(S_IFDIR | libc::S_ISVTX | 0o777), b"drwxrwxrwt");
        assert_eq!(&format_mode(S_IFLNK | 0o777), b"lrwxrwxrwx");
    }

    #[test]
    fn masks() {
        let mask = TypeMask::empty()
            .with(FileType::Directory)
            .with(FileType::Symlink);
        assert!(mask.contains(FileType::Directory));
        assert!(mask.contains(FileType::Symlink));
        assert!(!mask.contains(FileType::RegularFile));
        assert!(!mask.contains(FileType::Unknown));
    }

    #[test]
    fn dtype_round_trip() {
        assert_eq!(FileType::from_dtype(DT_DIR), FileType::Directory);
        assert_eq!(FileType::from_dtype(0), FileType::Unknown);
        assert_eq!(FileType::from_mode(S_IFSOCK | 0o600), FileType::Socket);
    }
}
