use crate::color::ColorFile;
use crate::error::ParseError;
use crate::walk::Visit;
use std::cell::RefCell;
use std::ffi::{OsStr, OsString};
use std::io::{self, BufRead as _, Write as _};
use std::os::unix::ffi::OsStrExt as _;
use std::process::Command;

/// How much of one batched command line we let arguments occupy.
fn batch_limit() -> usize {
    // SAFETY: plain sysconf query
    let arg_max = unsafe { libc::sysconf(libc::_SC_ARG_MAX) };
    if arg_max > 0 {
        #[allow(clippy::cast_sign_loss)]
        let arg_max = arg_max as usize;
        // Leave headroom for the environment and the template itself
        arg_max.saturating_sub(4096).max(4096)
    } else {
        128 * 1024
    }
}

#[derive(Debug, Default)]
struct BatchState {
    paths: Vec<Vec<u8>>,
    bytes: usize,
    /// The parent directory of the pending batch under -execdir.
    dir: Option<Vec<u8>>,
    failed: bool,
}

/**
A compiled `-exec`/`-ok`/`-execdir`/`-okdir` template.

`;` templates run once per file with `{}` substrings replaced by the path.
`+` templates batch paths into as few invocations as fit the argument-size
limit, flushed when the limit is hit and once more at walk end. The `dir`
variants run the command in the parent directory of the matched files, so a
batch only holds files sharing one parent.
*/
#[derive(Debug)]
pub struct ExecSpec {
    /// Template argv, terminator excluded. For batched templates the
    /// trailing `{}` is dropped; paths go where it was.
    tmpl: Vec<Vec<u8>>,
    pub chdir: bool,
    pub confirm: bool,
    pub multi: bool,
    limit: usize,
    state: RefCell<BatchState>,
}

impl ExecSpec {
    /**
    Parse the template following the `-exec`-family token at `args[pos]`.

    Returns the spec and the number of template tokens consumed, terminator
    included. The template runs to the first bare `;`, or to `+` when it
    directly follows `{}`.
    */
    pub fn parse(
        args: &[OsString],
        pos: usize,
        chdir: bool,
        confirm: bool,
        cerr: &mut ColorFile,
    ) -> Result<(Self, usize), ParseError> {
        let arg = args[pos].to_string_lossy().into_owned();
        let mut tmpl: Vec<Vec<u8>> = Vec::new();
        let mut multi = false;
        let mut end = None;

        for (i, token) in args.iter().enumerate().skip(pos + 1) {
            let bytes = token.as_bytes();
            if bytes == b";" {
                end = Some(i);
                break;
            }
            if bytes == b"+" && tmpl.last().map(Vec::as_slice) == Some(b"{}") {
                multi = true;
                end = Some(i);
                break;
            }
            tmpl.push(bytes.to_vec());
        }

        let Some(end) = end else {
            cerr.error(&format!("error: {arg}: Expected '... ;' or '... {{}} +'."));
            return Err(ParseError::Fatal);
        };

        if tmpl.is_empty() {
            cerr.error(&format!("error: {arg}: Missing command."));
            return Err(ParseError::Fatal);
        }

        if multi {
            if confirm {
                // find rejects -ok ... + too
                cerr.error(&format!("error: {arg}: '+' is incompatible with prompting."));
                return Err(ParseError::Fatal);
            }
            tmpl.pop();
        }

        let consumed = end - pos;
        Ok((
            Self {
                tmpl,
                chdir,
                confirm,
                multi,
                limit: batch_limit(),
                state: RefCell::new(BatchState::default()),
            },
            consumed,
        ))
    }

    /// The template tokens, for `-D tree` dumps.
    #[must_use]
    pub fn template(&self) -> &[Vec<u8>] {
        &self.tmpl
    }

    /// The directory prefix of `path`, without the trailing slash.
    fn parent_dir(path: &[u8], nameoff: usize) -> Vec<u8> {
        if nameoff > 1 {
            path[..nameoff - 1].to_vec()
        } else if nameoff == 1 {
            b"/".to_vec()
        } else {
            b".".to_vec()
        }
    }

    /// Replace every `{}` substring in `arg` with `path`.
    fn substitute(arg: &[u8], path: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(arg.len());
        let mut rest = arg;
        while let Some(at) = rest.windows(2).position(|window| window == b"{}") {
            out.extend_from_slice(&rest[..at]);
            out.extend_from_slice(path);
            rest = &rest[at + 2..];
        }
        out.extend_from_slice(rest);
        out
    }

    fn command(&self, argv: &[Vec<u8>], dir: Option<&[u8]>) -> Command {
        let mut command = Command::new(OsStr::from_bytes(&argv[0]));
        for arg in &argv[1..] {
            command.arg(OsStr::from_bytes(arg));
        }
        if let Some(dir) = dir {
            command.current_dir(OsStr::from_bytes(dir));
        }
        command
    }

    /// Ask on the terminal before running, `-ok` style.
    fn confirmed(&self, argv: &[Vec<u8>]) -> bool {
        let rendered: Vec<String> = argv
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect();
        eprint!("{} ? ", rendered.join(" "));
        let _ = io::stderr().flush();

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim_start().as_bytes().first(), Some(&(b'y' | b'Y')))
    }

    fn spawn(&self, argv: &[Vec<u8>], dir: Option<&[u8]>) -> io::Result<bool> {
        if self.confirm && !self.confirmed(argv) {
            return Ok(false);
        }
        let status = self.command(argv, dir).status()?;
        Ok(status.success())
    }

    /// Run the accumulated batch, if any.
    fn flush(&self) -> io::Result<bool> {
        let (paths, dir) = {
            let mut state = self.state.borrow_mut();
            if state.paths.is_empty() {
                return Ok(true);
            }
            state.bytes = 0;
            (core::mem::take(&mut state.paths), state.dir.take())
        };

        let mut argv = self.tmpl.clone();
        argv.extend(paths);
        let ok = self.spawn(&argv, dir.as_deref())?;
        if !ok {
            self.state.borrow_mut().failed = true;
        }
        Ok(ok)
    }

    /// Run (or batch) the template for one visit.
    pub fn exec(&self, visit: &Visit<'_>) -> io::Result<bool> {
        let dir = self
            .chdir
            .then(|| Self::parent_dir(visit.path, visit.nameoff));

        // Under -execdir the command sees ./name in its own directory
        let path: Vec<u8> = if self.chdir {
            let mut relative = b"./".to_vec();
            relative.extend_from_slice(visit.name());
            relative
        } else {
            visit.path.to_vec()
        };

        if !self.multi {
            let argv: Vec<Vec<u8>> = self
                .tmpl
                .iter()
                .map(|arg| Self::substitute(arg, &path))
                .collect();
            return self.spawn(&argv, dir.as_deref());
        }

        // Batched: group by parent when running there, flush on overflow
        if self.chdir {
            let dir_changed = {
                let state = self.state.borrow();
                !state.paths.is_empty() && state.dir.as_deref() != dir.as_deref()
            };
            if dir_changed {
                self.flush()?;
            }
        }

        let mut state = self.state.borrow_mut();
        state.bytes += path.len() + 1;
        state.paths.push(path);
        state.dir = dir;
        let full = state.bytes >= self.limit;
        drop(state);

        if full {
            self.flush()?;
        }
        Ok(true)
    }

    /// Flush the final batch at walk end. Returns false when any batched
    /// invocation failed.
    pub fn finish(&self) -> io::Result<bool> {
        self.flush()?;
        Ok(!self.state.borrow().failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(tokens: &[&str]) -> (ExecSpec, usize) {
        let args: Vec<OsString> = tokens.iter().map(OsString::from).collect();
        let mut cerr = ColorFile::stderr(None);
        ExecSpec::parse(&args, 0, false, false, &mut cerr).unwrap()
    }

    #[test]
    fn template_scanning() {
        let (spec, consumed) = parse_ok(&["-exec", "echo", "{}", ";"]);
        assert_eq!(consumed, 3);
        assert!(!spec.multi);
        assert_eq!(spec.template(), &[b"echo".to_vec(), b"{}".to_vec()]);

        let (spec, consumed) = parse_ok(&["-exec", "echo", "{}", "+"]);
        assert_eq!(consumed, 3);
        assert!(spec.multi);
        assert_eq!(spec.template(), &[b"echo".to_vec()]);
    }

    #[test]
    fn plus_needs_braces() {
        // A '+' that doesn't follow {} is an ordinary argument
        let args: Vec<OsString> = ["-exec", "echo", "+", "{}", ";"]
            .iter()
            .map(OsString::from)
            .collect();
        let mut cerr = ColorFile::stderr(None);
        let (spec, consumed) = ExecSpec::parse(&args, 0, false, false, &mut cerr).unwrap();
        assert_eq!(consumed, 4);
        assert!(!spec.multi);
    }

    #[test]
    fn unterminated_is_an_error() {
        let args: Vec<OsString> = ["-exec", "echo", "{}"].iter().map(OsString::from).collect();
        let mut cerr = ColorFile::stderr(None);
        assert!(ExecSpec::parse(&args, 0, false, false, &mut cerr).is_err());
    }

    #[test]
    fn substitution_is_substring() {
        assert_eq!(
            ExecSpec::substitute(b"pre{}post", b"X"),
            b"preXpost".to_vec()
        );
        assert_eq!(ExecSpec::substitute(b"{}{}", b"ab"), b"abab".to_vec());
        assert_eq!(ExecSpec::substitute(b"none", b"x"), b"none".to_vec());
    }

    #[test]
    fn parent_dirs() {
        assert_eq!(ExecSpec::parent_dir(b"/t/a", 3), b"/t".to_vec());
        assert_eq!(ExecSpec::parent_dir(b"/a", 1), b"/".to_vec());
        assert_eq!(ExecSpec::parent_dir(b"a", 0), b".".to_vec());
    }
}
