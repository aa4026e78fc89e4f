use crate::fs::{FileType, faccessat};
use crate::walk::Visit;
use libc::mode_t;
use std::fs::File;
use std::io::{self, Write};
use std::rc::Rc;

/// One `*suffix=esc` entry from `LS_COLORS`.
#[derive(Debug)]
struct ExtColor {
    ext: String,
    color: String,
}

/// The colour table parsed from `LS_COLORS`, with the `dircolors` defaults.
#[derive(Debug)]
pub struct Colors {
    reset: String,
    normal: Option<String>,
    file: Option<String>,
    dir: Option<String>,
    link: Option<String>,
    multi_hard: Option<String>,
    pipe: Option<String>,
    door: Option<String>,
    block: Option<String>,
    chardev: Option<String>,
    orphan: Option<String>,
    missing: Option<String>,
    socket: Option<String>,
    setuid: Option<String>,
    setgid: Option<String>,
    capable: Option<String>,
    sticky_ow: Option<String>,
    ow: Option<String>,
    sticky: Option<String>,
    exec: Option<String>,

    warning: String,
    error: String,

    ext_list: Vec<ExtColor>,
}

impl Default for Colors {
    fn default() -> Self {
        // Defaults generated by dircolors --print-database
        Self {
            reset: "0".into(),
            normal: None,
            file: None,
            dir: Some("01;34".into()),
            link: Some("01;36".into()),
            multi_hard: None,
            pipe: Some("40;33".into()),
            door: Some("01;35".into()),
            block: Some("40;33;01".into()),
            chardev: Some("40;33;01".into()),
            orphan: Some("40;31;01".into()),
            missing: None,
            socket: Some("01;35".into()),
            setuid: Some("37;41".into()),
            setgid: Some("30;43".into()),
            capable: Some("30;41".into()),
            sticky_ow: Some("30;42".into()),
            ow: Some("34;42".into()),
            sticky: Some("37;44".into()),
            exec: Some("01;32".into()),
            warning: "40;33;01".into(),
            error: "40;31;01".into(),
            ext_list: Vec::new(),
        }
    }
}

impl Colors {
    /// Parse an `LS_COLORS`-style string on top of the defaults.
    #[must_use]
    pub fn parse(ls_colors: Option<&str>) -> Self {
        let mut colors = Self::default();
        let Some(data) = ls_colors else {
            return colors;
        };

        for field in data.split(':') {
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };

            // Ignore all-zero values
            if !value.is_empty() && value.bytes().all(|byte| byte == b'0') {
                continue;
            }
            let value = value.to_owned();

            match key {
                "bd" => colors.block = Some(value),
                "ca" => colors.capable = Some(value),
                "cd" => colors.chardev = Some(value),
                "di" => colors.dir = Some(value),
                "do" => colors.door = Some(value),
                "ex" => colors.exec = Some(value),
                "fi" => colors.file = Some(value),
                "ln" => colors.link = Some(value),
                "mh" => colors.multi_hard = Some(value),
                "mi" => colors.missing = Some(value),
                "no" => colors.normal = Some(value),
                "or" => colors.orphan = Some(value),
                "ow" => colors.ow = Some(value),
                "pi" => colors.pipe = Some(value),
                "rs" => colors.reset = value,
                "sg" => colors.setgid = Some(value),
                "so" => colors.socket = Some(value),
                "st" => colors.sticky = Some(value),
                "su" => colors.setuid = Some(value),
                "tw" => colors.sticky_ow = Some(value),
                _ => {
                    if let Some(ext) = key.strip_prefix('*') {
                        colors.ext_list.push(ExtColor {
                            ext: ext.to_owned(),
                            color: value,
                        });
                    }
                }
            }
        }

        colors
    }

    /// Resolve a `%{tag}` mnemonic to an escape sequence.
    fn tag_color(&self, tag: &str) -> Option<&str> {
        match tag {
            "rs" => Some(&self.reset),
            "er" => Some(&self.error),
            "wr" => Some(&self.warning),
            "ex" => self.exec.as_deref(),
            "bld" => Some("01"),
            "red" => Some("01;31"),
            "grn" => Some("01;32"),
            "ylw" => Some("01;33"),
            "blu" => Some("01;34"),
            "mag" => Some("01;35"),
            "cyn" => Some("01;36"),
            _ => None,
        }
    }

    /// Pick the colour for a file the way `ls` would.
    fn file_color(&self, name: &[u8], visit: &Visit<'_>, statbuf: Option<&libc::stat>) -> Option<&str> {
        let Some(statbuf) = statbuf else {
            return self.orphan.as_deref();
        };

        let mode: mode_t = statbuf.st_mode;
        let mut color = match FileType::from_mode(mode) {
            FileType::RegularFile => {
                let mut color = if mode & libc::S_ISUID != 0 {
                    self.setuid.as_deref()
                } else if mode & libc::S_ISGID != 0 {
                    self.setgid.as_deref()
                } else if mode & 0o111 != 0 {
                    self.exec.as_deref()
                } else {
                    None
                };

                if color.is_none() && statbuf.st_nlink > 1 {
                    color = self.multi_hard.as_deref();
                }

                if color.is_none() {
                    // Longest matching *suffix wins
                    color = self
                        .ext_list
                        .iter()
                        .filter(|ext| name.ends_with(ext.ext.as_bytes()))
                        .max_by_key(|ext| ext.ext.len())
                        .map(|ext| ext.color.as_str());
                }

                color.or(self.file.as_deref())
            }

            FileType::Directory => {
                let color = if mode & libc::S_ISVTX != 0 {
                    if mode & libc::S_IWOTH != 0 {
                        self.sticky_ow.as_deref()
                    } else {
                        self.sticky.as_deref()
                    }
                } else if mode & libc::S_IWOTH != 0 {
                    self.ow.as_deref()
                } else {
                    None
                };
                color.or(self.dir.as_deref())
            }

            FileType::Symlink => {
                if faccessat(visit.at_fd, visit.at_path, libc::F_OK).is_ok() {
                    self.link.as_deref()
                } else {
                    self.orphan.as_deref()
                }
            }

            FileType::BlockDevice => self.block.as_deref(),
            FileType::CharDevice => self.chardev.as_deref(),
            FileType::Fifo => self.pipe.as_deref(),
            FileType::Socket => self.socket.as_deref(),
            FileType::Door => self.door.as_deref(),
            FileType::Unknown | FileType::Error => self.missing.as_deref(),
        };

        if color.is_none() {
            color = self.normal.as_deref();
        }
        color
    }
}

/// Where a [`ColorFile`] writes.
#[derive(Debug)]
enum Sink {
    Stdout(io::Stdout),
    Stderr(io::Stderr),
    File(File),
}

impl Write for Sink {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(out) => out.write(buf),
            Self::Stderr(err) => err.write(buf),
            Self::File(file) => file.write(buf),
        }
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(out) => out.flush(),
            Self::Stderr(err) => err.flush(),
            Self::File(file) => file.flush(),
        }
    }
}

/**
An output stream that understands the colour table.

Plain writes pass straight through; [`ColorFile::cformat`] substitutes
`%{tag}` mnemonics with ANSI escapes, and [`ColorFile::print_path`] renders
a visited path the way `ls` would colour it. With colours disabled every
method degrades to plain text.
*/
#[derive(Debug)]
pub struct ColorFile {
    sink: Sink,
    colors: Option<Rc<Colors>>,
}

impl ColorFile {
    #[must_use]
    pub fn stdout(colors: Option<Rc<Colors>>) -> Self {
        Self {
            sink: Sink::Stdout(io::stdout()),
            colors,
        }
    }

    #[must_use]
    pub fn stderr(colors: Option<Rc<Colors>>) -> Self {
        Self {
            sink: Sink::Stderr(io::stderr()),
            colors,
        }
    }

    #[must_use]
    pub fn file(file: File) -> Self {
        Self {
            sink: Sink::File(file),
            colors: None,
        }
    }

    pub fn set_colors(&mut self, colors: Option<Rc<Colors>>) {
        self.colors = colors;
    }

    #[must_use]
    pub fn colors_enabled(&self) -> bool {
        self.colors.is_some()
    }

    fn print_esc(&mut self, esc: &str) -> io::Result<()> {
        self.sink.write_all(b"\x1b[")?;
        self.sink.write_all(esc.as_bytes())?;
        self.sink.write_all(b"m")
    }

    /// Write `text`, replacing `%{tag}` with the tag's escape sequence when
    /// colours are on, and with nothing otherwise.
    pub fn cformat(&mut self, text: &str) -> io::Result<()> {
        let mut rest = text;
        while let Some(start) = rest.find("%{") {
            self.sink.write_all(rest[..start].as_bytes())?;
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                // Unterminated tag: emit it verbatim
                self.sink.write_all(rest[start..].as_bytes())?;
                return Ok(());
            };

            let tag = &after[..end];
            let esc = self
                .colors
                .clone()
                .and_then(|colors| colors.tag_color(tag).map(str::to_owned));
            if let Some(esc) = esc {
                self.print_esc(&esc)?;
            }

            rest = &after[end + 1..];
        }
        self.sink.write_all(rest.as_bytes())
    }

    /// An error line, coloured when the stream is.
    pub fn error(&mut self, message: &str) {
        let _ = self.cformat("%{er}");
        let _ = self.sink.write_all(message.as_bytes());
        let _ = self.cformat("%{rs}");
        let _ = self.sink.write_all(b"\n");
        let _ = self.sink.flush();
    }

    /// A warning line, coloured when the stream is.
    pub fn warning(&mut self, message: &str) {
        let _ = self.cformat("%{wr}");
        let _ = self.sink.write_all(message.as_bytes());
        let _ = self.cformat("%{rs}");
        let _ = self.sink.write_all(b"\n");
        let _ = self.sink.flush();
    }

    /// Write a visited path, colouring the directory part and the basename
    /// separately. No trailing newline.
    pub fn print_path(
        &mut self,
        visit: &Visit<'_>,
        statbuf: Option<&libc::stat>,
    ) -> io::Result<()> {
        let Some(colors) = self.colors.clone() else {
            return self.sink.write_all(visit.path);
        };

        let name = &visit.path[visit.nameoff..];

        if let Some(dir) = colors.dir.as_deref() {
            self.print_esc(dir)?;
            self.sink.write_all(&visit.path[..visit.nameoff])?;
            self.print_esc(&colors.reset)?;
        } else {
            self.sink.write_all(&visit.path[..visit.nameoff])?;
        }

        match colors.file_color(name, visit, statbuf) {
            Some(color) => {
                let color = color.to_owned();
                self.print_esc(&color)?;
                self.sink.write_all(name)?;
                self.print_esc(&colors.reset)
            }
            None => self.sink.write_all(name),
        }
    }
}

impl Write for ColorFile {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write(buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides_and_suffixes() {
        let colors =
            Colors::parse(Some("di=01;35:*.tar.gz=01;31:*.gz=01;32:rs=00:mi=0:bogus"));
        assert_eq!(colors.dir.as_deref(), Some("01;35"));
        assert_eq!(colors.reset, "00");
        // The all-zero mi= entry is ignored
        assert!(colors.missing.is_none());
        assert_eq!(colors.ext_list.len(), 2);

        // Longest suffix wins between *.gz and *.tar.gz
        let longest = colors
            .ext_list
            .iter()
            .filter(|ext| b"x.tar.gz".ends_with(ext.ext.as_bytes()))
            .max_by_key(|ext| ext.ext.len())
            .unwrap();
        assert_eq!(longest.color, "01;31");
    }

    #[test]
    fn tag_lookup() {
        let colors = Colors::default();
        assert_eq!(colors.tag_color("rs"), Some("0"));
        assert_eq!(colors.tag_color("er"), Some("40;31;01"));
        assert_eq!(colors.tag_color("nope"), None);
    }
}
