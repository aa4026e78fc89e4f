use crate::color::ColorFile;
use crate::fs::{FileType, TimeField, Timespec, format_mode, fstatat, readlinkat, stat_time};
use crate::mtab::MountTable;
use crate::walk::Visit;
use chrono::{DateTime, Datelike as _, Local, TimeZone as _, Timelike as _};
use std::io::{self, Write};

/// Conversion flags and field width, `%-8s` style.
#[derive(Debug, Clone, Copy, Default)]
struct FmtSpec {
    minus: bool,
    zero: bool,
    space: bool,
    plus: bool,
    alt: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// What a `%` conversion prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Ctime(TimeField),
    Strftime(TimeField, char),
    Blocks,
    OneKBlocks,
    Depth,
    Dev,
    Inode,
    Basename,
    Dirname,
    FullPath,
    RelPath,
    Root,
    FsType,
    Group,
    Gid,
    User,
    Uid,
    LinkTarget,
    OctalMode,
    SymbolicMode,
    Nlink,
    Size,
    Sparseness,
    TypeChar,
    DerefTypeChar,
}

impl Field {
    /// Whether rendering this field reads the stat buffer.
    const fn needs_stat(self) -> bool {
        !matches!(
            self,
            Self::Depth
                | Self::Basename
                | Self::Dirname
                | Self::FullPath
                | Self::RelPath
                | Self::Root
                | Self::LinkTarget
                | Self::TypeChar
                | Self::DerefTypeChar
        )
    }

    /// Whether the conversion is numeric, which is what the `#0+` flags
    /// require.
    const fn numeric(self) -> bool {
        matches!(self, Self::Depth | Self::OctalMode | Self::Sparseness)
    }
}

#[derive(Debug)]
enum Directive {
    Literal(Vec<u8>),
    /// `\c`: flush and stop.
    Flush,
    Field {
        spec: FmtSpec,
        field: Field,
    },
}

/// Everything a directive may look at while rendering.
pub struct PrintfCtx<'a> {
    pub visit: &'a Visit<'a>,
    pub statbuf: Option<&'a libc::stat>,
    pub mtab: Option<&'a MountTable>,
}

/// A compiled `-printf` format string.
#[derive(Debug)]
pub struct Program {
    directives: Vec<Directive>,
    pub needs_stat: bool,
}

enum Value {
    Str(Vec<u8>),
    Int(i64),
    Uint(u64),
    Octal(u32),
    Float(f64),
}

fn pad(out: &mut dyn Write, spec: FmtSpec, text: &[u8], numeric: bool) -> io::Result<()> {
    let width = spec.width.unwrap_or(0);
    if text.len() >= width {
        return out.write_all(text);
    }

    let padding = width - text.len();
    if spec.minus {
        out.write_all(text)?;
        for _ in 0..padding {
            out.write_all(b" ")?;
        }
        return Ok(());
    }

    let fill = if numeric && spec.zero { b"0" } else { b" " };
    if fill == b"0" && !text.is_empty() && (text[0] == b'-' || text[0] == b'+') {
        // Zero padding goes between the sign and the digits
        out.write_all(&text[..1])?;
        for _ in 0..padding {
            out.write_all(fill)?;
        }
        return out.write_all(&text[1..]);
    }

    for _ in 0..padding {
        out.write_all(fill)?;
    }
    out.write_all(text)
}

fn render(out: &mut dyn Write, spec: FmtSpec, value: Value) -> io::Result<()> {
    match value {
        Value::Str(mut text) => {
            if let Some(precision) = spec.precision {
                text.truncate(precision);
            }
            pad(out, spec, &text, false)
        }
        Value::Int(n) => {
            let mut text = if spec.plus && n >= 0 {
                format!("+{n}")
            } else if spec.space && n >= 0 {
                format!(" {n}")
            } else {
                n.to_string()
            };
            if let Some(precision) = spec.precision
                && text.len() < precision
            {
                text = format!("{n:0>precision$}");
            }
            pad(out, spec, text.as_bytes(), true)
        }
        Value::Uint(n) => pad(out, spec, n.to_string().as_bytes(), true),
        Value::Octal(n) => {
            let text = if spec.alt {
                format!("0{n:o}")
            } else {
                format!("{n:o}")
            };
            pad(out, spec, text.as_bytes(), true)
        }
        Value::Float(x) => pad(out, spec, format!("{x}").as_bytes(), true),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn local_time(ts: Timespec) -> Option<DateTime<Local>> {
    Local.timestamp_opt(ts.sec, ts.nsec as u32).single()
}

/// The ctime-style rendering of `%a`/`%c`/`%t`, nanoseconds included.
fn ctime_string(ts: Timespec) -> String {
    local_time(ts).map_or_else(String::new, |time| {
        format!(
            "{} {} {:2} {:02}:{:02}:{:02}.{:09}0 {:4}",
            time.format("%a"),
            time.format("%b"),
            time.day(),
            time.hour(),
            time.minute(),
            time.second(),
            ts.nsec,
            time.year(),
        )
    })
}

/// One `%A`/`%C`/`%T` conversion, with the non-POSIX extensions.
fn strftime_string(ts: Timespec, spec_char: char) -> String {
    let Some(time) = local_time(ts) else {
        return String::new();
    };

    match spec_char {
        '@' => format!("{}.{:09}0", ts.sec, ts.nsec),
        'k' => format!("{:2}", time.hour()),
        'l' => format!("{:2}", (time.hour() + 11) % 12 + 1),
        'S' => format!("{:02}.{:09}0", time.second(), ts.nsec),
        '+' => format!(
            "{:4}-{:02}-{:02}+{:02}:{:02}:{:02}.{:09}0",
            time.year(),
            time.month(),
            time.day(),
            time.hour(),
            time.minute(),
            time.second(),
            ts.nsec,
        ),
        _ => time.format(&format!("%{spec_char}")).to_string(),
    }
}

pub(crate) fn user_name(uid: libc::uid_t) -> Option<Vec<u8>> {
    // SAFETY: getpwuid returns a pointer to static storage or NULL
    let pwd = unsafe { libc::getpwuid(uid) };
    if pwd.is_null() {
        return None;
    }
    // SAFETY: pw_name is NUL-terminated while the record is live
    Some(unsafe { core::ffi::CStr::from_ptr((*pwd).pw_name) }.to_bytes().to_vec())
}

pub(crate) fn group_name(gid: libc::gid_t) -> Option<Vec<u8>> {
    // SAFETY: as for getpwuid
    let grp = unsafe { libc::getgrgid(gid) };
    if grp.is_null() {
        return None;
    }
    // SAFETY: gr_name is NUL-terminated while the record is live
    Some(unsafe { core::ffi::CStr::from_ptr((*grp).gr_name) }.to_bytes().to_vec())
}

impl Program {
    /**
    Compile a format string.

    Parse failures are reported on `cerr` the same way the expression
    parser reports its own, and surface as [`crate::error::ParseError::Fatal`].
    */
    pub fn parse(
        format: &str,
        has_mtab: bool,
        cerr: &mut ColorFile,
    ) -> Result<Self, crate::error::ParseError> {
        use crate::error::ParseError;

        let mut program = Self {
            directives: Vec::new(),
            needs_stat: false,
        };
        let mut literal: Vec<u8> = Vec::new();

        let fail = |cerr: &mut ColorFile, message: String| {
            cerr.error(&message);
            Err(ParseError::Fatal)
        };

        let mut chars = format.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => match chars.next() {
                    Some(digit @ '0'..='7') => {
                        let mut value = digit as u32 - '0' as u32;
                        for _ in 0..2 {
                            match chars.peek() {
                                Some(&(next @ '0'..='7')) => {
                                    value = value * 8 + (next as u32 - '0' as u32);
                                    chars.next();
                                }
                                _ => break,
                            }
                        }
                        #[allow(clippy::cast_possible_truncation)]
                        literal.push(value as u8);
                    }
                    Some('a') => literal.push(0x07),
                    Some('b') => literal.push(0x08),
                    Some('f') => literal.push(0x0c),
                    Some('n') => literal.push(b'\n'),
                    Some('r') => literal.push(b'\r'),
                    Some('t') => literal.push(b'\t'),
                    Some('v') => literal.push(0x0b),
                    Some('\\') => literal.push(b'\\'),
                    Some('c') => {
                        if !literal.is_empty() {
                            program.directives.push(Directive::Literal(core::mem::take(
                                &mut literal,
                            )));
                        }
                        program.directives.push(Directive::Flush);
                        return Ok(program);
                    }
                    Some(other) => {
                        return fail(
                            cerr,
                            format!(
                                "error: '{format}': Unrecognized escape sequence '\\{other}'."
                            ),
                        );
                    }
                    None => {
                        return fail(
                            cerr,
                            format!("error: '{format}': Incomplete escape sequence '\\'."),
                        );
                    }
                },

                '%' => {
                    if chars.peek() == Some(&'%') {
                        chars.next();
                        literal.push(b'%');
                        continue;
                    }

                    let mut spec = FmtSpec::default();
                    let mut must_be_numeric = false;

                    // Flags
                    loop {
                        let Some(&flag) = chars.peek() else { break };
                        let seen = match flag {
                            '#' => {
                                must_be_numeric = true;
                                core::mem::replace(&mut spec.alt, true)
                            }
                            '0' => {
                                must_be_numeric = true;
                                core::mem::replace(&mut spec.zero, true)
                            }
                            '+' => {
                                must_be_numeric = true;
                                core::mem::replace(&mut spec.plus, true)
                            }
                            ' ' => core::mem::replace(&mut spec.space, true),
                            '-' => core::mem::replace(&mut spec.minus, true),
                            _ => break,
                        };
                        if seen {
                            return fail(
                                cerr,
                                format!("error: '{format}': Duplicate flag '{flag}'."),
                            );
                        }
                        chars.next();
                    }

                    // Field width
                    let mut width = None;
                    while let Some(&(digit @ '0'..='9')) = chars.peek() {
                        width = Some(width.unwrap_or(0) * 10 + (digit as usize - '0' as usize));
                        chars.next();
                    }
                    spec.width = width;

                    // Precision
                    if chars.peek() == Some(&'.') {
                        chars.next();
                        let mut precision = 0;
                        while let Some(&(digit @ '0'..='9')) = chars.peek() {
                            precision = precision * 10 + (digit as usize - '0' as usize);
                            chars.next();
                        }
                        spec.precision = Some(precision);
                    }

                    let Some(conversion) = chars.next() else {
                        return fail(
                            cerr,
                            format!("error: '{format}': Incomplete format specifier '%'."),
                        );
                    };

                    let field = match conversion {
                        'a' => Field::Ctime(TimeField::Accessed),
                        'c' => Field::Ctime(TimeField::Changed),
                        't' => Field::Ctime(TimeField::Modified),
                        'b' => Field::Blocks,
                        'd' => Field::Depth,
                        'D' => Field::Dev,
                        'f' => Field::Basename,
                        'F' => {
                            if !has_mtab {
                                return fail(
                                    cerr,
                                    format!(
                                        "error: '{format}': Couldn't parse the mount table."
                                    ),
                                );
                            }
                            Field::FsType
                        }
                        'g' => Field::Group,
                        'G' => Field::Gid,
                        'h' => Field::Dirname,
                        'H' => Field::Root,
                        'i' => Field::Inode,
                        'k' => Field::OneKBlocks,
                        'l' => Field::LinkTarget,
                        'm' => Field::OctalMode,
                        'M' => Field::SymbolicMode,
                        'n' => Field::Nlink,
                        'p' => Field::FullPath,
                        'P' => Field::RelPath,
                        's' => Field::Size,
                        'S' => Field::Sparseness,
                        'u' => Field::User,
                        'U' => Field::Uid,
                        'y' => Field::TypeChar,
                        'Y' => Field::DerefTypeChar,

                        'A' | 'C' | 'T' => {
                            let field = match conversion {
                                'A' => TimeField::Accessed,
                                'C' => TimeField::Changed,
                                _ => TimeField::Modified,
                            };
                            let Some(time_spec) = chars.next() else {
                                return fail(
                                    cerr,
                                    format!(
                                        "error: '{format}': Incomplete time specifier '%{conversion}'."
                                    ),
                                );
                            };
                            match time_spec {
                                '@' | 'H' | 'I' | 'k' | 'l' | 'M' | 'p' | 'r' | 'S' | 'T'
                                | '+' | 'X' | 'Z' | 'a' | 'A' | 'b' | 'B' | 'c' | 'd' | 'D'
                                | 'h' | 'j' | 'm' | 'U' | 'w' | 'W' | 'x' | 'y' | 'Y' => {
                                    Field::Strftime(field, time_spec)
                                }
                                _ => {
                                    return fail(
                                        cerr,
                                        format!(
                                            "error: '{format}': Unrecognized time specifier '%{conversion}{time_spec}'."
                                        ),
                                    );
                                }
                            }
                        }

                        _ => {
                            return fail(
                                cerr,
                                format!(
                                    "error: '{format}': Unrecognized format specifier '%{conversion}'."
                                ),
                            );
                        }
                    };

                    if must_be_numeric && !field.numeric() {
                        return fail(
                            cerr,
                            format!(
                                "error: '{format}': Invalid flags for string format '%{conversion}'."
                            ),
                        );
                    }

                    program.needs_stat |= field.needs_stat();
                    if !literal.is_empty() {
                        program
                            .directives
                            .push(Directive::Literal(core::mem::take(&mut literal)));
                    }
                    program.directives.push(Directive::Field { spec, field });
                }

                _ => {
                    let mut buf = [0u8; 4];
                    literal.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
            }
        }

        if !literal.is_empty() {
            program.directives.push(Directive::Literal(literal));
        }
        Ok(program)
    }

    /// Run the program against one visit.
    pub fn write(&self, out: &mut dyn Write, ctx: &PrintfCtx<'_>) -> io::Result<()> {
        for directive in &self.directives {
            match directive {
                Directive::Literal(text) => out.write_all(text)?,
                Directive::Flush => {
                    out.flush()?;
                    break;
                }
                Directive::Field { spec, field } => self.field(out, *spec, *field, ctx)?,
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines, clippy::unnecessary_cast)] //stat field widths vary by target
    fn field(
        &self,
        out: &mut dyn Write,
        spec: FmtSpec,
        field: Field,
        ctx: &PrintfCtx<'_>,
    ) -> io::Result<()> {
        let visit = ctx.visit;
        let statbuf = ctx.statbuf;

        let value = match field {
            Field::Ctime(time_field) => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Str(ctime_string(stat_time(statbuf, time_field)).into_bytes())
            }
            Field::Strftime(time_field, spec_char) => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Str(
                    strftime_string(stat_time(statbuf, time_field), spec_char).into_bytes(),
                )
            }
            Field::Blocks => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Uint(statbuf.st_blocks as u64)
            }
            Field::OneKBlocks => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Uint((statbuf.st_blocks as u64 + 1) / 2)
            }
            Field::Depth => Value::Int(visit.depth as i64),
            Field::Dev => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Uint(statbuf.st_dev as u64)
            }
            Field::Inode => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Uint(statbuf.st_ino as u64)
            }
            Field::Basename => Value::Str(visit.name().to_vec()),
            Field::Dirname => {
                let text = if visit.nameoff > 0 {
                    let mut len = visit.nameoff;
                    if len > 1 {
                        len -= 1;
                    }
                    visit.path[..len].to_vec()
                } else if visit.path.first() == Some(&b'/') {
                    b"/".to_vec()
                } else {
                    b".".to_vec()
                };
                Value::Str(text)
            }
            Field::FullPath => Value::Str(visit.path.to_vec()),
            Field::RelPath => {
                let mut rel = &visit.path[visit.root.len().min(visit.path.len())..];
                if rel.first() == Some(&b'/') {
                    rel = &rel[1..];
                }
                Value::Str(rel.to_vec())
            }
            Field::Root => Value::Str(visit.root.to_vec()),
            Field::FsType => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                let fs_type = ctx
                    .mtab
                    .map_or("unknown", |mtab| mtab.fstype(statbuf.st_dev as u64));
                Value::Str(fs_type.as_bytes().to_vec())
            }
            Field::Group => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                match group_name(statbuf.st_gid) {
                    Some(name) => Value::Str(name),
                    None => Value::Uint(u64::from(statbuf.st_gid)),
                }
            }
            Field::Gid => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Uint(u64::from(statbuf.st_gid))
            }
            Field::User => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                match user_name(statbuf.st_uid) {
                    Some(name) => Value::Str(name),
                    None => Value::Uint(u64::from(statbuf.st_uid)),
                }
            }
            Field::Uid => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Uint(u64::from(statbuf.st_uid))
            }
            Field::LinkTarget => {
                if visit.file_type != FileType::Symlink {
                    return Ok(());
                }
                let size_hint = statbuf.map_or(0, |st| st.st_size as usize);
                match readlinkat(visit.at_fd, visit.at_path, size_hint) {
                    Ok(target) => Value::Str(target),
                    Err(err) => return Err(err),
                }
            }
            Field::OctalMode => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Octal(u32::from(statbuf.st_mode as u32 & 0o7777))
            }
            Field::SymbolicMode => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Str(format_mode(statbuf.st_mode).to_vec())
            }
            Field::Nlink => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Uint(statbuf.st_nlink as u64)
            }
            Field::Size => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                Value::Uint(statbuf.st_size as u64)
            }
            Field::Sparseness => {
                let Some(statbuf) = statbuf else { return Ok(()) };
                #[allow(clippy::cast_precision_loss)]
                let sparsity = if statbuf.st_size == 0 {
                    f64::INFINITY
                } else {
                    512.0 * statbuf.st_blocks as f64 / statbuf.st_size as f64
                };
                Value::Float(sparsity)
            }
            Field::TypeChar => Value::Str(vec![visit.file_type.type_char() as u8]),
            Field::DerefTypeChar => {
                if visit.file_type != FileType::Symlink {
                    Value::Str(vec![visit.file_type.type_char() as u8])
                } else {
                    let ch = match fstatat(visit.at_fd, visit.at_path, 0) {
                        Ok(statbuf) => FileType::from_mode(statbuf.st_mode).type_char(),
                        Err(err) => match err.raw_os_error() {
                            Some(libc::ELOOP) => 'L',
                            Some(libc::ENOENT) => 'N',
                            _ => 'U',
                        },
                    };
                    Value::Str(vec![ch as u8])
                }
            }
        };

        render(out, spec, value)
    }
}
