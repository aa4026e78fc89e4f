use core::fmt;
use std::io;

/// The errno a traversal ended with, re-raised once the walk unwinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkError {
    errno: i32,
}

impl WalkError {
    #[must_use]
    #[inline]
    pub const fn new(errno: i32) -> Self {
        Self { errno }
    }

    #[must_use]
    #[inline]
    pub const fn errno(&self) -> i32 {
        self.errno
    }
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.errno))
    }
}

impl core::error::Error for WalkError {}

impl From<WalkError> for io::Error {
    fn from(err: WalkError) -> Self {
        Self::from_raw_os_error(err.errno)
    }
}

/// Why command-line parsing produced no command.
///
/// Diagnostics are printed where the problem is discovered, with whatever
/// context is at hand (typo suggestions, the offending argument); this enum
/// only carries what the caller needs for the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// An informational option like -help ran; exit successfully.
    Info,
    /// The command line was rejected; the diagnostic is already out.
    Fatal,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Info => write!(f, "informational option"),
            Self::Fatal => write!(f, "invalid command line"),
        }
    }
}

impl core::error::Error for ParseError {}
