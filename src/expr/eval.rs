use super::printf::PrintfCtx;
use super::{Expr, ExprKind, IntCmp, ModeCmp};
use crate::cmdline::Cmdline;
use crate::fs::{
    DirStream, FileType, TimeField, format_mode, fstatat, openat_dir, readlinkat, stat_time,
    unlinkat,
};
use crate::walk::{Visit, VisitPhase, WalkAction, walk};
use chrono::{Local, TimeZone as _};
use std::io::{self, Write as _};
use std::time::Instant;

/// Carried across every visit of one evaluation run.
struct CallbackArgs {
    /// Eventual process exit status contribution: 0 or -1.
    ret: i32,
    /// Set by -quit; stops the remaining roots too.
    quit: bool,
}

/// Per-visit evaluation state.
struct EvalState<'a, 'v> {
    visit: &'a Visit<'v>,
    cmdline: &'a Cmdline,
    /// What the walker should do next, possibly overridden by an action.
    action: WalkAction,
    ret: &'a mut i32,
    quit: &'a mut bool,
    /// Lazily filled stat buffer when the walker didn't provide one.
    statbuf: Option<libc::stat>,
}

impl EvalState<'_, '_> {
    /// Whether an error at this visit should be silently swallowed.
    fn should_ignore(&self, errno: i32) -> bool {
        self.cmdline.ignore_races && errno == libc::ENOENT && self.visit.depth > 0
    }

    /// Report an error that occurred during evaluation.
    fn eval_error(&mut self, err: &io::Error) {
        if !self.should_ignore(err.raw_os_error().unwrap_or(0)) {
            let path = String::from_utf8_lossy(self.visit.path);
            self.cmdline
                .cerr
                .borrow_mut()
                .error(&format!("'{path}': {err}"));
            *self.ret = -1;
        }
    }

    /// The stat buffer for this visit, fetching it on first use.
    fn fill_statbuf(&mut self) -> Option<libc::stat> {
        if let Some(statbuf) = self.visit.stat {
            return Some(*statbuf);
        }
        if let Some(statbuf) = self.statbuf {
            return Some(statbuf);
        }

        match fstatat(self.visit.at_fd, self.visit.at_path, self.visit.at_flags) {
            Ok(statbuf) => {
                self.statbuf = Some(statbuf);
                Some(statbuf)
            }
            Err(err) => {
                self.eval_error(&err);
                None
            }
        }
    }

    /// The stat buffer if anyone already paid for it.
    fn cached_statbuf(&self) -> Option<libc::stat> {
        self.visit.stat.copied().or(self.statbuf)
    }
}

/// Evaluate one node, maintaining its success counters.
fn eval_expr(expr: &Expr, state: &mut EvalState<'_, '_>) -> bool {
    let timing = state.cmdline.debug.rates.then(Instant::now);

    let ret = eval_kind(expr, state);

    if let Some(start) = timing {
        expr.elapsed.set(expr.elapsed.get() + start.elapsed());
    }
    expr.evaluations.set(expr.evaluations.get() + 1);
    if ret {
        expr.successes.set(expr.successes.get() + 1);
    }

    ret
}

fn cmp_stat(state: &mut EvalState<'_, '_>, cmp: IntCmp, pick: impl Fn(&libc::stat) -> i64) -> bool {
    match state.fill_statbuf() {
        Some(statbuf) => cmp.matches(pick(&statbuf)),
        None => false,
    }
}

#[allow(clippy::too_many_lines, clippy::unnecessary_cast)] //one arm per predicate; stat field widths vary
fn eval_kind(expr: &Expr, state: &mut EvalState<'_, '_>) -> bool {
    let visit = state.visit;

    match &expr.kind {
        ExprKind::True => true,
        ExprKind::False => false,

        ExprKind::Not => !eval_expr(expr.rhs.as_ref().expect("unary operand"), state),
        ExprKind::And => {
            if !eval_expr(expr.lhs.as_ref().expect("binary operand"), state) {
                return false;
            }
            if *state.quit {
                return false;
            }
            eval_expr(expr.rhs.as_ref().expect("binary operand"), state)
        }
        ExprKind::Or => {
            if eval_expr(expr.lhs.as_ref().expect("binary operand"), state) {
                return true;
            }
            if *state.quit {
                return false;
            }
            eval_expr(expr.rhs.as_ref().expect("binary operand"), state)
        }
        ExprKind::Comma => {
            eval_expr(expr.lhs.as_ref().expect("binary operand"), state);
            if *state.quit {
                return false;
            }
            eval_expr(expr.rhs.as_ref().expect("binary operand"), state)
        }

        ExprKind::Access { mode } => {
            crate::fs::faccessat(visit.at_fd, visit.at_path, *mode).is_ok()
        }

        ExprKind::Time {
            field,
            unit,
            cmp,
            reftime,
        } => {
            let Some(statbuf) = state.fill_statbuf() else {
                return false;
            };
            let diff = reftime.diff_seconds(stat_time(&statbuf, *field));
            cmp.matches(diff / unit.divisor())
        }

        ExprKind::Newer { field, reftime } => {
            let Some(statbuf) = state.fill_statbuf() else {
                return false;
            };
            stat_time(&statbuf, *field).newer_than(*reftime)
        }

        ExprKind::Used { cmp } => {
            let Some(statbuf) = state.fill_statbuf() else {
                return false;
            };
            let diff = stat_time(&statbuf, TimeField::Accessed)
                .diff_seconds(stat_time(&statbuf, TimeField::Changed));
            cmp.matches(diff / (60 * 60 * 24))
        }

        ExprKind::Gid { cmp } => cmp_stat(state, *cmp, |st| i64::from(st.st_gid)),
        ExprKind::Uid { cmp } => cmp_stat(state, *cmp, |st| i64::from(st.st_uid)),

        ExprKind::NoGroup => {
            let Some(statbuf) = state.fill_statbuf() else {
                return false;
            };
            // SAFETY: getgrgid returns static storage or NULL
            unsafe { libc::getgrgid(statbuf.st_gid) }.is_null()
        }
        ExprKind::NoUser => {
            let Some(statbuf) = state.fill_statbuf() else {
                return false;
            };
            // SAFETY: getpwuid returns static storage or NULL
            unsafe { libc::getpwuid(statbuf.st_uid) }.is_null()
        }

        ExprKind::Depth { cmp } => cmp.matches(visit.depth as i64),

        ExprKind::Empty => eval_empty(state),

        ExprKind::Fstype { name } => {
            let Some(statbuf) = state.fill_statbuf() else {
                return false;
            };
            state
                .cmdline
                .mtab
                .as_ref()
                .is_some_and(|mtab| mtab.fstype(statbuf.st_dev as u64) == name)
        }

        ExprKind::Hidden => visit.nameoff > 0 && visit.path.get(visit.nameoff) == Some(&b'.'),

        ExprKind::NoHidden => {
            if visit.nameoff > 0 && visit.path.get(visit.nameoff) == Some(&b'.') {
                state.action = WalkAction::SkipSubtree;
                false
            } else {
                true
            }
        }

        ExprKind::Inum { cmp } => cmp_stat(state, *cmp, |st| st.st_ino as i64),
        ExprKind::Links { cmp } => cmp_stat(state, *cmp, |st| st.st_nlink as i64),

        ExprKind::Lname { glob } => {
            if visit.file_type != FileType::Symlink {
                return false;
            }
            let Some(statbuf) = state.fill_statbuf() else {
                return false;
            };
            match readlinkat(visit.at_fd, visit.at_path, statbuf.st_size as usize) {
                Ok(target) => glob.matches(&target),
                Err(err) => {
                    state.eval_error(&err);
                    false
                }
            }
        }

        ExprKind::Name { glob } => {
            let mut name = visit.name();
            if visit.depth == 0 {
                // Trailing slashes are not part of a root's name
                if let Some(slash) = name.iter().position(|&byte| byte == b'/')
                    && slash > 0
                {
                    name = &name[..slash];
                }
            }
            glob.matches(name)
        }

        ExprKind::PathMatch { glob } => glob.matches(visit.path),

        ExprKind::Perm {
            cmp,
            file_mode,
            dir_mode,
        } => {
            let Some(statbuf) = state.fill_statbuf() else {
                return false;
            };
            let mode = statbuf.st_mode;
            let target = if visit.file_type == FileType::Directory {
                *dir_mode
            } else {
                *file_mode
            };
            match cmp {
                ModeCmp::Exact => (mode & 0o7777) == target,
                ModeCmp::All => (mode & target) == target,
                ModeCmp::Any => ((mode & target) != 0) == (target != 0),
            }
        }

        ExprKind::RegexMatch { regex } => regex.is_match(visit.path),

        ExprKind::Samefile { dev, ino } => {
            let Some(statbuf) = state.fill_statbuf() else {
                return false;
            };
            statbuf.st_dev as u64 == *dev && statbuf.st_ino as u64 == *ino
        }

        ExprKind::Size { unit, cmp } => {
            let Some(statbuf) = state.fill_statbuf() else {
                return false;
            };
            let scale = unit.scale();
            let size = (statbuf.st_size as i64 + scale - 1) / scale; // round up
            cmp.matches(size)
        }

        ExprKind::Sparse => {
            let Some(statbuf) = state.fill_statbuf() else {
                return false;
            };
            let expected = (statbuf.st_size as i64 + 511) / 512;
            (statbuf.st_blocks as i64) < expected
        }

        ExprKind::Type { mask } => mask.contains(visit.file_type),

        ExprKind::Xtype { mask } => eval_xtype(*mask, state),

        ExprKind::Prune => {
            state.action = WalkAction::SkipSubtree;
            true
        }

        ExprKind::Quit => {
            state.action = WalkAction::Stop;
            *state.quit = true;
            true
        }

        ExprKind::Delete => {
            // Never try to delete the current directory
            if visit.path == b"." {
                return true;
            }
            let remove_dir = visit.file_type == FileType::Directory;
            match unlinkat(visit.at_fd, visit.at_path, remove_dir) {
                Ok(()) => true,
                Err(err) => {
                    state.eval_error(&err);
                    false
                }
            }
        }

        ExprKind::Print { file } => {
            if file.borrow().colors_enabled() {
                state.fill_statbuf();
            }
            let statbuf = state.cached_statbuf();
            let mut file = file.borrow_mut();
            let result = file
                .print_path(visit, statbuf.as_ref())
                .and_then(|()| file.write_all(b"\n"));
            drop(file);
            if let Err(err) = result {
                state.eval_error(&err);
            }
            true
        }

        ExprKind::Print0 { file } => {
            let mut buffer = visit.path.to_vec();
            buffer.push(0);
            if let Err(err) = file.borrow_mut().write_all(&buffer) {
                state.eval_error(&err);
            }
            true
        }

        ExprKind::Printf { file, program } => {
            if program.needs_stat && state.fill_statbuf().is_none() {
                return true;
            }
            let statbuf = state.cached_statbuf();
            let ctx = PrintfCtx {
                visit,
                statbuf: statbuf.as_ref(),
                mtab: state.cmdline.mtab.as_ref(),
            };
            if let Err(err) = program.write(&mut *file.borrow_mut(), &ctx) {
                state.eval_error(&err);
            }
            true
        }

        ExprKind::Ls { file, reftime } => {
            eval_fls(file, reftime.sec, state);
            true
        }

        ExprKind::Exec { exec } => match exec.exec(visit) {
            Ok(ok) => ok,
            Err(err) => {
                state.eval_error(&err);
                false
            }
        },
    }
}

/// -empty: a directory with no entries, or a zero-length file.
fn eval_empty(state: &mut EvalState<'_, '_>) -> bool {
    let visit = state.visit;

    if visit.file_type == FileType::Directory {
        let stream = openat_dir(visit.at_fd, visit.at_path).and_then(DirStream::from_fd);
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                state.eval_error(&err);
                return false;
            }
        };

        match stream.read() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(err) => {
                state.eval_error(&err);
                false
            }
        }
    } else {
        state
            .fill_statbuf()
            .is_some_and(|statbuf| statbuf.st_size == 0)
    }
}

/// -xtype: like -type, but with the follow mode inverted for symlinks.
fn eval_xtype(mask: crate::fs::TypeMask, state: &mut EvalState<'_, '_>) -> bool {
    let visit = state.visit;
    let follow = state.cmdline.flags.follows_at(visit.depth);
    let is_link = visit.file_type == FileType::Symlink;

    if follow == is_link {
        return mask.contains(visit.file_type);
    }

    // -xtype does the opposite of everything else
    let at_flags = if follow { libc::AT_SYMLINK_NOFOLLOW } else { 0 };

    match fstatat(visit.at_fd, visit.at_path, at_flags) {
        Ok(statbuf) => mask.contains(FileType::from_mode(statbuf.st_mode)),
        Err(err) if !follow && err.raw_os_error() == Some(libc::ENOENT) => {
            // Broken symlink
            mask.contains(visit.file_type)
        }
        Err(err) => {
            state.eval_error(&err);
            false
        }
    }
}

/// -ls/-fls: one `ls -dils`-shaped line per file.
#[allow(clippy::unnecessary_cast)]
fn eval_fls(file: &super::OutFile, now: i64, state: &mut EvalState<'_, '_>) {
    let Some(statbuf) = state.fill_statbuf() else {
        return;
    };
    let visit = state.visit;

    let result = (|| -> io::Result<()> {
        let mut out = file.borrow_mut();

        let ino = statbuf.st_ino as u64;
        let blocks = (statbuf.st_blocks as u64 + 1) / 2;
        let mode = format_mode(statbuf.st_mode);
        let nlink = statbuf.st_nlink as u64;
        write!(
            out,
            "{:9} {:6} {} {:3} ",
            ino,
            blocks,
            String::from_utf8_lossy(&mode),
            nlink
        )?;

        match super::printf::user_name(statbuf.st_uid) {
            Some(name) => write!(out, " {:<8}", String::from_utf8_lossy(&name))?,
            None => write!(out, " {:<8}", statbuf.st_uid)?,
        }
        match super::printf::group_name(statbuf.st_gid) {
            Some(name) => write!(out, " {:<8}", String::from_utf8_lossy(&name))?,
            None => write!(out, " {:<8}", statbuf.st_gid)?,
        }

        write!(out, " {:8}", statbuf.st_size as u64)?;

        let mtime = statbuf.st_mtime as i64;
        let six_months_ago = now - 6 * 30 * 24 * 60 * 60;
        let tomorrow = now + 24 * 60 * 60;
        let format = if mtime <= six_months_ago || mtime >= tomorrow {
            "%b %e  %Y"
        } else {
            "%b %e %H:%M"
        };
        match Local.timestamp_opt(mtime, 0).single() {
            Some(time) => write!(out, " {}", time.format(format))?,
            None => write!(out, " ?")?,
        }

        out.write_all(b" ")?;
        let stat_ref = Some(&statbuf);
        out.print_path(visit, stat_ref)?;

        if visit.file_type == FileType::Symlink {
            out.write_all(b" -> ")?;
            let target = readlinkat(visit.at_fd, visit.at_path, statbuf.st_size as usize)?;
            out.write_all(&target)?;
        }

        out.write_all(b"\n")
    })();

    if let Err(err) = result {
        state.eval_error(&err);
    }
}

/// Trace the stat the walker performed, for -D stat.
fn debug_stat(visit: &Visit<'_>) {
    let base_len = visit.path.len() - visit.at_path.len();

    eprint!("fstatat(");
    if visit.at_fd == libc::AT_FDCWD {
        eprint!("AT_FDCWD");
    } else {
        eprint!("\"{}\"", String::from_utf8_lossy(&visit.path[..base_len]));
    }
    eprint!(", \"{}\", ", String::from_utf8_lossy(visit.at_path));
    if visit.at_flags == libc::AT_SYMLINK_NOFOLLOW {
        eprint!("AT_SYMLINK_NOFOLLOW");
    } else {
        eprint!("{}", visit.at_flags);
    }
    eprintln!(")");
}

/// The walker callback: decide which visits get the expression, and relay
/// action hints back to the walk.
fn cmdline_callback(cmdline: &Cmdline, visit: &Visit<'_>, args: &mut CallbackArgs) -> WalkAction {
    let mut state = EvalState {
        visit,
        cmdline,
        action: WalkAction::Continue,
        ret: &mut args.ret,
        quit: &mut args.quit,
        statbuf: None,
    };

    'eval: {
        if visit.file_type == FileType::Error {
            if !state.should_ignore(visit.error) {
                let path = String::from_utf8_lossy(visit.path);
                let err = io::Error::from_raw_os_error(visit.error);
                cmdline.cerr.borrow_mut().error(&format!("'{path}': {err}"));
                *state.ret = -1;
            }
            state.action = WalkAction::SkipSubtree;
            break 'eval;
        }

        if cmdline.xargs_safe
            && visit
                .path
                .iter()
                .any(|&byte| matches!(byte, b' ' | b'\t' | b'\n' | b'\'' | b'"' | b'\\'))
        {
            let path = String::from_utf8_lossy(visit.path);
            cmdline
                .cerr
                .borrow_mut()
                .error(&format!("'{path}': Path is not safe for xargs."));
            *state.ret = -1;
            state.action = WalkAction::SkipSubtree;
            break 'eval;
        }

        if visit.depth >= cmdline.maxdepth {
            state.action = WalkAction::SkipSubtree;
        }

        // In post-order mode, directories are handled on their Post visit
        let expected_phase = if cmdline.flags.post_order
            && visit.file_type == FileType::Directory
            && visit.depth < cmdline.maxdepth
        {
            VisitPhase::Post
        } else {
            VisitPhase::Pre
        };

        if visit.phase == expected_phase
            && visit.depth >= cmdline.mindepth
            && visit.depth <= cmdline.maxdepth
        {
            eval_expr(&cmdline.expr, &mut state);
        }
    }

    let action = state.action;
    let statted = visit.stat.is_some() || state.statbuf.is_some();
    if cmdline.debug.stat && statted {
        debug_stat(visit);
    }

    action
}

/// Flush any pending -exec ... + batches.
fn exec_finish(expr: &Expr, cmdline: &Cmdline) -> bool {
    let mut ok = true;

    if let ExprKind::Exec { exec } = &expr.kind {
        match exec.finish() {
            Ok(true) => {}
            Ok(false) => ok = false,
            Err(err) => {
                cmdline.cerr.borrow_mut().error(&format!("error: {err}"));
                ok = false;
            }
        }
    }

    if let Some(lhs) = &expr.lhs {
        ok &= exec_finish(lhs, cmdline);
    }
    if let Some(rhs) = &expr.rhs {
        ok &= exec_finish(rhs, cmdline);
    }

    ok
}

/// Infer how many file descriptors the walk may use.
fn infer_fdlimit(cmdline: &Cmdline) -> usize {
    let mut ret = 4096usize;

    let mut rlimit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: out-parameter of the right type
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlimit) } == 0
        && rlimit.rlim_cur != libc::RLIM_INFINITY
    {
        #[allow(clippy::cast_possible_truncation)]
        {
            ret = rlimit.rlim_cur as usize;
        }
    }

    // 3 for the std streams, plus whatever the command line opened
    let mut nopen = 3 + cmdline.nopen_files;

    // Check /dev/fd for the real count, in case we inherited more
    if let Ok(entries) = std::fs::read_dir("/dev/fd") {
        // One of these is the directory handle we're holding
        nopen = entries.count().saturating_sub(1);
    }

    // One extra descriptor reserved for -empty
    let reserved = nopen + 1;

    if ret > reserved { ret - reserved } else { 1 }
}

/**
Walk every root and evaluate the expression per visit.

Returns 0 when every visit succeeded and every action worked, -1 otherwise;
the caller maps that onto the process exit status.
*/
pub fn eval_cmdline(cmdline: &Cmdline) -> i32 {
    if cmdline.optlevel >= 4 && cmdline.expr.is_false() {
        if cmdline.debug.opt {
            eprintln!("-O4: skipping evaluation of top-level -false");
        }
        return 0;
    }

    let nopenfd = infer_fdlimit(cmdline);

    let mut args = CallbackArgs { ret: 0, quit: false };

    for root in &cmdline.roots {
        if args.quit {
            break;
        }

        let mut callback = |visit: &Visit<'_>| cmdline_callback(cmdline, visit, &mut args);
        if let Err(err) = walk(root, nopenfd, cmdline.flags, &mut callback) {
            args.ret = -1;
            let path = String::from_utf8_lossy(root);
            cmdline
                .cerr
                .borrow_mut()
                .error(&format!("'{path}': {err}"));
        }
    }

    if !exec_finish(&cmdline.expr, cmdline) {
        args.ret = -1;
    }

    let _ = cmdline.cout.borrow_mut().flush();

    if cmdline.debug.rates {
        cmdline.dump(true);
    }

    args.ret
}
