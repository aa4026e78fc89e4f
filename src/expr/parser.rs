use super::exec::ExecSpec;
use super::glob::{Glob, bre_to_ere};
use super::optimizer::Optimizer;
use super::printf::Program;
use super::{CmpMode, Expr, ExprKind, IntCmp, ModeCmp, SizeUnit, TimeUnit};
use crate::cmdline::{Cmdline, UseColor};
use crate::color::ColorFile;
use crate::error::ParseError;
use crate::fs::{FileType, TimeField, Timespec, TypeMask, fstatat};
use chrono::{Local, TimeZone as _, Timelike as _};
use libc::mode_t;
use regex::bytes::RegexBuilder;
use std::cell::RefCell;
use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt as _;
use std::rc::Rc;

/// Which regex dialect subsequent -regex/-iregex tests compile with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegexDialect {
    PosixBasic,
    PosixExtended,
}

/// Token classes, used to track where the expression proper begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenType {
    Flag,
    Path,
    Option,
    Test,
    Action,
    Operator,
}

/// Ephemeral state while the command line is parsed.
struct ParserState<'a> {
    cmdline: &'a mut Cmdline,
    args: &'a [OsString],
    pos: usize,
    regex_dialect: RegexDialect,
    /// Whether a -print action is still implied.
    implicit_print: bool,
    /// Whether warnings are enabled (see -warn, -nowarn).
    warn: bool,
    /// Whether the expression has started.
    expr_started: bool,
    /// Whether any non-option arguments have been encountered.
    non_option_seen: bool,
    /// The reference time, shifted by -daystart.
    now: Timespec,
}

type ParseFn = fn(&mut ParserState<'_>, i32, i32) -> Result<Box<Expr>, ParseError>;

/// One literal in the parse table. `prefix` admits arguments that merely
/// start with the name, for -O and -newerXY.
struct TableEntry {
    name: &'static str,
    prefix: bool,
    parse: Option<ParseFn>,
    arg1: i32,
    arg2: i32,
}

const fn op(name: &'static str) -> TableEntry {
    TableEntry {
        name,
        prefix: false,
        parse: None,
        arg1: 0,
        arg2: 0,
    }
}

const fn lit(name: &'static str, parse: ParseFn) -> TableEntry {
    TableEntry {
        name,
        prefix: false,
        parse: Some(parse),
        arg1: 0,
        arg2: 0,
    }
}

const fn lit1(name: &'static str, parse: ParseFn, arg1: i32) -> TableEntry {
    TableEntry {
        name,
        prefix: false,
        parse: Some(parse),
        arg1,
        arg2: 0,
    }
}

const fn lit2(name: &'static str, parse: ParseFn, arg1: i32, arg2: i32) -> TableEntry {
    TableEntry {
        name,
        prefix: false,
        parse: Some(parse),
        arg1,
        arg2,
    }
}

impl TableEntry {
    const fn prefixed(mut self) -> Self {
        self.prefix = true;
        self
    }
}

// Integer encodings for the curried table arguments
const FIELD_ATIME: i32 = 0;
const FIELD_CTIME: i32 = 1;
const FIELD_MTIME: i32 = 2;
const UNIT_MINUTES: i32 = 0;
const UNIT_DAYS: i32 = 1;
const FOLLOW_NONE: i32 = 0;
const FOLLOW_ROOTS: i32 = 1;
const FOLLOW_ALL: i32 = 2;

const fn time_field(arg: i32) -> TimeField {
    match arg {
        FIELD_ATIME => TimeField::Accessed,
        FIELD_CTIME => TimeField::Changed,
        _ => TimeField::Modified,
    }
}

/// The parse table for literals, ordered like the help text reads.
static PARSE_TABLE: &[TableEntry] = &[
    lit("D", parse_debug),
    lit("E", parse_regex_extended),
    lit("O", parse_optlevel).prefixed(),
    lit2("P", parse_follow, FOLLOW_NONE, 0),
    lit2("H", parse_follow, FOLLOW_ROOTS, 0),
    lit2("L", parse_follow, FOLLOW_ALL, 0),
    lit("X", parse_xargs_safe),
    op("a"),
    lit2("amin", parse_acmtime, FIELD_ATIME, UNIT_MINUTES),
    op("and"),
    lit2("atime", parse_acmtime, FIELD_ATIME, UNIT_DAYS),
    lit1("anewer", parse_acnewer, FIELD_ATIME),
    lit2("cmin", parse_acmtime, FIELD_CTIME, UNIT_MINUTES),
    lit2("ctime", parse_acmtime, FIELD_CTIME, UNIT_DAYS),
    lit1("cnewer", parse_acnewer, FIELD_CTIME),
    lit1("color", parse_color, 1),
    lit("d", parse_depth),
    lit("daystart", parse_daystart),
    lit("delete", parse_delete),
    lit("depth", parse_depth_n),
    lit("empty", parse_empty),
    lit2("exec", parse_exec, 0, 0),
    lit2("execdir", parse_exec, 1, 0),
    lit1("executable", parse_access, libc::X_OK),
    lit("f", parse_f),
    lit1("false", parse_const, 0),
    lit("fls", parse_fls),
    lit2("follow", parse_follow, FOLLOW_ALL, 1),
    lit("fprint", parse_fprint),
    lit("fprint0", parse_fprint0),
    lit("fprintf", parse_fprintf),
    lit("fstype", parse_fstype),
    lit("gid", parse_group),
    lit("group", parse_group),
    lit("help", parse_help),
    lit("hidden", parse_hidden),
    lit1("ignore_readdir_race", parse_ignore_races, 1),
    lit1("ilname", parse_lname, 1),
    lit1("iname", parse_name, 1),
    lit("inum", parse_inum),
    lit1("ipath", parse_path, 1),
    lit1("iregex", parse_regex, 1),
    lit1("iwholename", parse_path, 1),
    lit("links", parse_links),
    lit1("lname", parse_lname, 0),
    lit("ls", parse_ls),
    lit1("maxdepth", parse_depth_limit, 0),
    lit1("mindepth", parse_depth_limit, 1),
    lit2("mmin", parse_acmtime, FIELD_MTIME, UNIT_MINUTES),
    lit1("mnewer", parse_acnewer, FIELD_MTIME),
    lit("mount", parse_mount),
    lit2("mtime", parse_acmtime, FIELD_MTIME, UNIT_DAYS),
    lit1("name", parse_name, 0),
    lit1("newer", parse_acnewer, FIELD_MTIME),
    lit("newer", parse_newerxy).prefixed(),
    lit1("nocolor", parse_color, 0),
    lit("nogroup", parse_nogroup),
    lit("nohidden", parse_nohidden),
    lit1("noignore_readdir_race", parse_ignore_races, 0),
    lit("noleaf", parse_noleaf),
    op("not"),
    lit("nouser", parse_nouser),
    lit1("nowarn", parse_warn, 0),
    op("o"),
    lit2("ok", parse_exec, 0, 1),
    lit2("okdir", parse_exec, 1, 1),
    op("or"),
    lit1("path", parse_path, 0),
    lit("perm", parse_perm),
    lit("print", parse_print),
    lit("print0", parse_print0),
    lit("printf", parse_printf),
    lit("prune", parse_prune),
    lit("quit", parse_quit),
    lit1("readable", parse_access, libc::R_OK),
    lit1("regex", parse_regex, 0),
    lit("regextype", parse_regextype),
    lit("samefile", parse_samefile),
    lit("size", parse_size),
    lit("sparse", parse_sparse),
    lit1("true", parse_const, 1),
    lit1("type", parse_type, 0),
    lit("uid", parse_user),
    lit("used", parse_used),
    lit("user", parse_user),
    lit("version", parse_version),
    lit1("warn", parse_warn, 1),
    lit1("wholename", parse_path, 0),
    lit1("writable", parse_access, libc::W_OK),
    lit("x", parse_mount),
    lit("xdev", parse_mount),
    lit1("xtype", parse_type, 1),
    op("-"),
    lit("-help", parse_help),
    lit("-version", parse_version),
];

fn table_lookup(name: &str) -> Option<&'static TableEntry> {
    PARSE_TABLE.iter().find(|entry| {
        if entry.prefix {
            name.starts_with(entry.name)
        } else {
            name == entry.name
        }
    })
}

/// Plain edit distance, for "did you mean" suggestions.
fn typo_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, &ca) in a.iter().enumerate() {
        let mut prev = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { prev } else { prev + 1 };
            prev = row[j + 1];
            row[j + 1] = cost.min(prev + 1).min(row[j] + 1);
        }
    }

    row[b.len()]
}

fn table_lookup_fuzzy(name: &str) -> &'static TableEntry {
    PARSE_TABLE
        .iter()
        .min_by_key(|entry| typo_distance(name, entry.name))
        .expect("the parse table is not empty")
}

/// Parse digits of `base`, returning the value and the rest of the string.
fn parse_int_partial(text: &str, base: u32) -> Option<(i64, &str)> {
    let end = text
        .find(|ch: char| !ch.is_digit(base))
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let value = i64::from_str_radix(&text[..end], base).ok()?;
    Some((value, &text[end..]))
}

/// Parse `[-+]N`, leaving any unit suffix for the caller.
fn parse_icmp_partial(text: &str) -> Option<(IntCmp, &str)> {
    let (mode, rest) = match text.as_bytes().first() {
        Some(&b'-') => (CmpMode::Less, &text[1..]),
        Some(&b'+') => (CmpMode::Greater, &text[1..]),
        _ => (CmpMode::Exact, text),
    };
    let (value, rest) = parse_int_partial(rest, 10)?;
    Some((IntCmp { mode, value }, rest))
}

fn parse_icmp_full(text: &str) -> Option<IntCmp> {
    match parse_icmp_partial(text) {
        Some((cmp, "")) => Some(cmp),
        _ => None,
    }
}

fn looks_like_icmp(text: &str) -> bool {
    let rest = text.strip_prefix(['-', '+']).unwrap_or(text);
    rest.as_bytes().first().is_some_and(u8::is_ascii_digit)
}

impl<'a> ParserState<'a> {
    fn arg_os(&self, offset: usize) -> Option<&'a OsStr> {
        self.args.get(self.pos + offset).map(OsString::as_os_str)
    }

    fn arg_str(&self, offset: usize) -> Option<&'a str> {
        self.arg_os(offset).and_then(OsStr::to_str)
    }

    fn err(&self, message: String) {
        self.cmdline.cerr.borrow_mut().error(&message);
    }

    fn warn_msg(&self, message: String) {
        self.cmdline.cerr.borrow_mut().warning(&message);
    }

    fn optimizer(&self) -> Optimizer {
        Optimizer {
            optlevel: self.cmdline.optlevel,
            debug: self.cmdline.debug.opt,
        }
    }

    /// Advance by `argc` tokens, tracking expression state.
    fn advance(&mut self, token_type: TokenType, argc: usize) -> usize {
        if token_type != TokenType::Flag && token_type != TokenType::Path {
            self.expr_started = true;
            if token_type != TokenType::Option {
                self.non_option_seen = true;
            }
        }

        let start = self.pos;
        self.pos += argc;
        start
    }

    /// The argv tokens `[start, start+argc)`, for expression dumps.
    fn collect_argv(&self, start: usize, argc: usize) -> Vec<String> {
        self.args[start..start + argc]
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    fn parse_root(&mut self, path: &OsStr) {
        self.cmdline.roots.push(path.as_bytes().to_vec());
    }

    /// While parsing an expression, skip any paths and record them as roots.
    fn skip_paths(&mut self) {
        loop {
            let Some(arg) = self.arg_os(0) else { return };
            let bytes = arg.as_bytes();

            if bytes.starts_with(b"-") {
                if bytes == b"--" {
                    // find uses -- to separate flags from the rest of the
                    // command line; we allow mixing, so it's just skipped
                    self.advance(TokenType::Flag, 1);
                    continue;
                }
                if bytes != b"-" {
                    // - by itself is a file name, anything else a predicate
                    return;
                }
            }

            if bytes == b"(" || bytes == b"!" {
                return;
            }

            if self.expr_started && (bytes == b")" || bytes == b",") {
                return;
            }

            let arg = arg.to_os_string();
            self.parse_root(&arg);
            self.advance(TokenType::Path, 1);
        }
    }

    /// Stat a reference file named on the command line, following links
    /// according to the active follow mode.
    fn stat_arg(&self, path: &OsStr) -> Result<libc::stat, ParseError> {
        let follow = self.cmdline.flags.follow_roots || self.cmdline.flags.follow_all;
        let at_flags = if follow { 0 } else { libc::AT_SYMLINK_NOFOLLOW };

        fstatat(libc::AT_FDCWD, path.as_bytes(), at_flags).map_err(|err| {
            self.err(format!("error: '{}': {err}", path.to_string_lossy()));
            ParseError::Fatal
        })
    }
}

fn parse_flag(state: &mut ParserState<'_>, argc: usize) -> Result<Box<Expr>, ParseError> {
    state.advance(TokenType::Flag, argc);
    Ok(Expr::constant(true))
}

fn parse_nullary_flag(state: &mut ParserState<'_>) -> Result<Box<Expr>, ParseError> {
    parse_flag(state, 1)
}

fn parse_unary_flag(state: &mut ParserState<'_>) -> Result<Box<Expr>, ParseError> {
    parse_flag(state, 2)
}

fn parse_option(state: &mut ParserState<'_>, argc: usize) -> Result<Box<Expr>, ParseError> {
    let start = state.advance(TokenType::Option, argc);

    if state.warn && state.non_option_seen {
        let arg = state.args[start].to_string_lossy();
        state.warn_msg(format!(
            "warning: The '{arg}' option applies to the entire command line.  For clarity, place\nit before any non-option arguments.\n"
        ));
    }

    Ok(Expr::constant(true))
}

fn parse_nullary_option(state: &mut ParserState<'_>) -> Result<Box<Expr>, ParseError> {
    parse_option(state, 1)
}

fn parse_unary_option(state: &mut ParserState<'_>) -> Result<Box<Expr>, ParseError> {
    parse_option(state, 2)
}

fn parse_positional_option(
    state: &mut ParserState<'_>,
    argc: usize,
) -> Result<Box<Expr>, ParseError> {
    state.advance(TokenType::Option, argc);
    Ok(Expr::constant(true))
}

fn parse_nullary_positional_option(state: &mut ParserState<'_>) -> Result<Box<Expr>, ParseError> {
    parse_positional_option(state, 1)
}

fn parse_test(
    state: &mut ParserState<'_>,
    kind: ExprKind,
    argc: usize,
) -> Result<Box<Expr>, ParseError> {
    let start = state.advance(TokenType::Test, argc);
    let argv = state.collect_argv(start, argc);
    Ok(Expr::new(kind, true, argv))
}

fn parse_nullary_test(state: &mut ParserState<'_>, kind: ExprKind) -> Result<Box<Expr>, ParseError> {
    parse_test(state, kind, 1)
}

/// The value argument of a unary test or action, checked to exist.
fn require_value<'p>(state: &ParserState<'p>) -> Result<&'p OsStr, ParseError> {
    match state.arg_os(1) {
        Some(value) => Ok(value),
        None => {
            let arg = state.arg_str(0).unwrap_or("?");
            state.err(format!("error: {arg} needs a value."));
            Err(ParseError::Fatal)
        }
    }
}

/// As [`require_value`], but the value must be valid UTF-8.
fn require_str_value<'p>(state: &ParserState<'p>) -> Result<&'p str, ParseError> {
    let value = require_value(state)?;
    match value.to_str() {
        Some(value) => Ok(value),
        None => {
            let arg = state.arg_str(0).unwrap_or("?");
            state.err(format!("error: {arg}: Argument is not valid UTF-8."));
            Err(ParseError::Fatal)
        }
    }
}

fn parse_action(
    state: &mut ParserState<'_>,
    kind: ExprKind,
    argc: usize,
) -> Result<Box<Expr>, ParseError> {
    // -prune and -nohidden don't count as output for the implicit -print
    if !matches!(kind, ExprKind::Prune | ExprKind::NoHidden) {
        state.implicit_print = false;
    }

    let start = state.advance(TokenType::Action, argc);
    let argv = state.collect_argv(start, argc);
    Ok(Expr::new(kind, false, argv))
}

fn parse_test_icmp(
    state: &mut ParserState<'_>,
    make: impl FnOnce(IntCmp) -> ExprKind,
) -> Result<Box<Expr>, ParseError> {
    let value = require_str_value(state)?;
    let Some(cmp) = parse_icmp_full(value) else {
        state.err(format!("error: '{value}' is not a valid integer."));
        return Err(ParseError::Fatal);
    };
    parse_test(state, make(cmp), 2)
}

fn parse_debug(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let Some(flag) = state.arg_str(1) else {
        let arg = state.arg_str(0).unwrap_or("-D");
        state.err(format!("error: {arg} needs a flag."));
        return Err(ParseError::Fatal);
    };

    match flag {
        "help" => {
            println!("Supported debug flags:\n");
            println!("  help:   This message.");
            println!("  opt:    Print optimization details.");
            println!("  rates:  Print predicate success rates.");
            println!("  stat:   Trace all stat() calls.");
            println!("  tree:   Print the parse tree.");
            return Err(ParseError::Info);
        }
        "opt" => state.cmdline.debug.opt = true,
        "rates" => state.cmdline.debug.rates = true,
        "stat" => state.cmdline.debug.stat = true,
        "tree" => state.cmdline.debug.tree = true,
        _ => {
            state.warn_msg(format!("warning: Unrecognized debug flag '{flag}'.\n"));
        }
    }

    parse_unary_flag(state)
}

fn parse_optlevel(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let arg = state.arg_str(0).unwrap_or("");
    let level = if arg == "-Ofast" {
        4
    } else {
        match arg[2..].parse::<i32>() {
            Ok(level) if level >= 0 => level,
            _ => {
                state.err(format!("error: '{}' is not a valid integer.", &arg[2..]));
                return Err(ParseError::Fatal);
            }
        }
    };

    state.cmdline.optlevel = level;
    if level > 4 {
        state.warn_msg(format!("warning: {arg} is the same as -O4.\n"));
    }

    parse_nullary_flag(state)
}

fn parse_follow(state: &mut ParserState<'_>, arg1: i32, option: i32) -> Result<Box<Expr>, ParseError> {
    let flags = &mut state.cmdline.flags;
    flags.follow_roots = false;
    flags.follow_all = false;
    flags.detect_cycles = false;
    match arg1 {
        FOLLOW_ROOTS => flags.follow_roots = true,
        FOLLOW_ALL => {
            flags.follow_all = true;
            flags.detect_cycles = true;
        }
        _ => {}
    }

    if option != 0 {
        parse_nullary_positional_option(state)
    } else {
        parse_nullary_flag(state)
    }
}

fn parse_xargs_safe(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    state.cmdline.xargs_safe = true;
    parse_nullary_flag(state)
}

fn parse_regex_extended(
    state: &mut ParserState<'_>,
    _: i32,
    _: i32,
) -> Result<Box<Expr>, ParseError> {
    state.regex_dialect = RegexDialect::PosixExtended;
    parse_nullary_flag(state)
}

fn parse_access(state: &mut ParserState<'_>, mode: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_nullary_test(state, ExprKind::Access { mode })
}

fn parse_acmtime(state: &mut ParserState<'_>, field: i32, unit: i32) -> Result<Box<Expr>, ParseError> {
    let reftime = state.now;
    let unit = if unit == UNIT_MINUTES {
        TimeUnit::Minutes
    } else {
        TimeUnit::Days
    };
    parse_test_icmp(state, |cmp| ExprKind::Time {
        field: time_field(field),
        unit,
        cmp,
        reftime,
    })
}

fn parse_acnewer(state: &mut ParserState<'_>, field: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let value = require_value(state)?;
    let statbuf = state.stat_arg(value)?;
    let reftime = crate::fs::stat_time(&statbuf, TimeField::Modified);

    parse_test(
        state,
        ExprKind::Newer {
            field: time_field(field),
            reftime,
        },
        2,
    )
}

fn parse_color(state: &mut ParserState<'_>, color: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let colors = (color != 0).then(|| Rc::clone(&state.cmdline.colors));
    state.cmdline.use_color = if color != 0 {
        UseColor::Always
    } else {
        UseColor::Never
    };
    state.cmdline.cout.borrow_mut().set_colors(colors.clone());
    state.cmdline.cerr.borrow_mut().set_colors(colors);
    parse_nullary_option(state)
}

fn parse_const(state: &mut ParserState<'_>, value: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    state.advance(TokenType::Test, 1);
    Ok(Expr::constant(value != 0))
}

fn parse_daystart(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let Some(now) = Local
        .timestamp_opt(state.now.sec, state.now.nsec as u32)
        .single()
    else {
        state.err("error: -daystart: Could not read the local time.".to_owned());
        return Err(ParseError::Fatal);
    };

    let mut date = now.date_naive();
    if now.hour() != 0 || now.minute() != 0 || now.second() != 0 || state.now.nsec != 0 {
        let Some(next) = date.succ_opt() else {
            state.err("error: -daystart: Time overflow.".to_owned());
            return Err(ParseError::Fatal);
        };
        date = next;
    }

    let midnight = date.and_hms_opt(0, 0, 0).expect("midnight always exists");
    let Some(local) = Local.from_local_datetime(&midnight).earliest() else {
        state.err("error: -daystart: Could not read the local time.".to_owned());
        return Err(ParseError::Fatal);
    };

    state.now = Timespec {
        sec: local.timestamp(),
        nsec: 0,
    };

    parse_nullary_positional_option(state)
}

fn parse_delete(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    state.cmdline.flags.post_order = true;
    parse_action(state, ExprKind::Delete, 1)
}

fn parse_depth(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    state.cmdline.flags.post_order = true;
    parse_nullary_option(state)
}

fn parse_depth_n(state: &mut ParserState<'_>, arg1: i32, arg2: i32) -> Result<Box<Expr>, ParseError> {
    match state.arg_str(1) {
        Some(arg) if looks_like_icmp(arg) => {
            parse_test_icmp(state, |cmp| ExprKind::Depth { cmp })
        }
        _ => parse_depth(state, arg1, arg2),
    }
}

fn parse_depth_limit(state: &mut ParserState<'_>, is_min: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let value = require_str_value(state)?;
    let Ok(depth) = value.parse::<usize>() else {
        state.err(format!("error: '{value}' is not a valid integer."));
        return Err(ParseError::Fatal);
    };

    if is_min != 0 {
        state.cmdline.mindepth = depth;
    } else {
        state.cmdline.maxdepth = depth;
    }

    parse_unary_option(state)
}

fn parse_empty(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_nullary_test(state, ExprKind::Empty)
}

fn parse_exec(state: &mut ParserState<'_>, chdir: i32, confirm: i32) -> Result<Box<Expr>, ParseError> {
    let (spec, consumed) = {
        let mut cerr = state.cmdline.cerr.borrow_mut();
        ExecSpec::parse(
            state.args,
            state.pos,
            chdir != 0,
            confirm != 0,
            &mut cerr,
        )?
    };

    if spec.chdir && spec.multi {
        // One retained parent descriptor per pending batch
        state.cmdline.nopen_files += 1;
    }

    parse_action(state, ExprKind::Exec { exec: spec }, consumed + 1)
}

fn parse_f(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    state.advance(TokenType::Flag, 1);

    let Some(path) = state.arg_os(0) else {
        state.err("error: -f requires a path.".to_owned());
        return Err(ParseError::Fatal);
    };

    let path = path.to_os_string();
    state.parse_root(&path);
    state.advance(TokenType::Path, 1);
    Ok(Expr::constant(true))
}

/// Open `path` for an output action, counting it against the descriptor
/// budget.
fn expr_open(state: &mut ParserState<'_>, path: &OsStr) -> Result<super::OutFile, ParseError> {
    match std::fs::File::create(path) {
        Ok(file) => {
            state.cmdline.nopen_files += 1;
            Ok(Rc::new(RefCell::new(ColorFile::file(file))))
        }
        Err(err) => {
            state.err(format!("error: '{}': {err}", path.to_string_lossy()));
            Err(ParseError::Fatal)
        }
    }
}

fn parse_fls(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let value = require_value(state)?.to_os_string();
    let file = expr_open(state, &value)?;
    let reftime = state.now;
    parse_action(state, ExprKind::Ls { file, reftime }, 2)
}

fn parse_fprint(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let value = require_value(state)?.to_os_string();
    let file = expr_open(state, &value)?;
    parse_action(state, ExprKind::Print { file }, 2)
}

fn parse_fprint0(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let value = require_value(state)?.to_os_string();
    let file = expr_open(state, &value)?;
    parse_action(state, ExprKind::Print0 { file }, 2)
}

fn parse_fprintf(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let arg = state.arg_str(0).unwrap_or("-fprintf").to_owned();

    let Some(file) = state.arg_os(1) else {
        state.err(format!("error: {arg} needs a file."));
        return Err(ParseError::Fatal);
    };
    let file = file.to_os_string();

    let Some(format) = state.arg_str(2) else {
        state.err(format!("error: {arg} needs a format string."));
        return Err(ParseError::Fatal);
    };
    let format = format.to_owned();

    let out = expr_open(state, &file)?;
    let program = {
        let has_mtab = state.cmdline.mtab.is_some();
        let mut cerr = state.cmdline.cerr.borrow_mut();
        Program::parse(&format, has_mtab, &mut cerr)?
    };

    parse_action(state, ExprKind::Printf { file: out, program }, 3)
}

fn parse_fstype(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    if state.cmdline.mtab.is_none() {
        let arg = state.arg_str(0).unwrap_or("-fstype");
        state.err(format!("error: {arg}: Couldn't parse the mount table."));
        return Err(ParseError::Fatal);
    }

    let name = require_str_value(state)?.to_owned();
    parse_test(state, ExprKind::Fstype { name }, 2)
}

fn lookup_group_name(name: &str) -> Option<i64> {
    let c_name = CString::new(name).ok()?;
    // SAFETY: getgrnam returns static storage or NULL
    let grp = unsafe { libc::getgrnam(c_name.as_ptr()) };
    if grp.is_null() {
        None
    } else {
        // SAFETY: non-null record from getgrnam
        Some(i64::from(unsafe { (*grp).gr_gid }))
    }
}

fn lookup_user_name(name: &str) -> Option<i64> {
    let c_name = CString::new(name).ok()?;
    // SAFETY: getpwnam returns static storage or NULL
    let pwd = unsafe { libc::getpwnam(c_name.as_ptr()) };
    if pwd.is_null() {
        None
    } else {
        // SAFETY: non-null record from getpwnam
        Some(i64::from(unsafe { (*pwd).pw_uid }))
    }
}

fn parse_group(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let arg = state.arg_str(0).unwrap_or("-group").to_owned();
    let value = require_str_value(state)?;

    let cmp = if let Some(gid) = lookup_group_name(value) {
        IntCmp {
            mode: CmpMode::Exact,
            value: gid,
        }
    } else if looks_like_icmp(value) {
        match parse_icmp_full(value) {
            Some(cmp) => cmp,
            None => {
                state.err(format!("error: '{value}' is not a valid integer."));
                return Err(ParseError::Fatal);
            }
        }
    } else {
        state.err(format!("error: {arg} {value}: No such group."));
        return Err(ParseError::Fatal);
    };

    parse_test(state, ExprKind::Gid { cmp }, 2)
}

fn parse_user(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let arg = state.arg_str(0).unwrap_or("-user").to_owned();
    let value = require_str_value(state)?;

    let cmp = if let Some(uid) = lookup_user_name(value) {
        IntCmp {
            mode: CmpMode::Exact,
            value: uid,
        }
    } else if looks_like_icmp(value) {
        match parse_icmp_full(value) {
            Some(cmp) => cmp,
            None => {
                state.err(format!("error: '{value}' is not a valid integer."));
                return Err(ParseError::Fatal);
            }
        }
    } else {
        state.err(format!("error: {arg} {value}: No such user."));
        return Err(ParseError::Fatal);
    };

    parse_test(state, ExprKind::Uid { cmp }, 2)
}

fn parse_used(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_test_icmp(state, |cmp| ExprKind::Used { cmp })
}

fn parse_hidden(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_nullary_test(state, ExprKind::Hidden)
}

fn parse_ignore_races(state: &mut ParserState<'_>, ignore: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    state.cmdline.ignore_races = ignore != 0;
    parse_nullary_option(state)
}

fn parse_inum(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_test_icmp(state, |cmp| ExprKind::Inum { cmp })
}

fn parse_links(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_test_icmp(state, |cmp| ExprKind::Links { cmp })
}

fn parse_ls(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let file = Rc::clone(&state.cmdline.cout);
    let reftime = state.now;
    parse_action(state, ExprKind::Ls { file, reftime }, 1)
}

fn parse_mount(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    state.cmdline.flags.xdev = true;
    parse_nullary_option(state)
}

fn parse_glob(
    state: &mut ParserState<'_>,
    casefold: i32,
    make: impl FnOnce(Glob) -> ExprKind,
) -> Result<Box<Expr>, ParseError> {
    let arg = state.arg_str(0).unwrap_or("?").to_owned();
    let value = require_str_value(state)?;

    match Glob::new(value, casefold != 0) {
        Ok(glob) => parse_test(state, make(glob), 2),
        Err(err) => {
            state.err(format!("error: {arg} {value}: {err}."));
            Err(ParseError::Fatal)
        }
    }
}

fn parse_name(state: &mut ParserState<'_>, casefold: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_glob(state, casefold, |glob| ExprKind::Name { glob })
}

fn parse_path(state: &mut ParserState<'_>, casefold: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_glob(state, casefold, |glob| ExprKind::PathMatch { glob })
}

fn parse_lname(state: &mut ParserState<'_>, casefold: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_glob(state, casefold, |glob| ExprKind::Lname { glob })
}

fn parse_newerxy(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let arg = state.arg_str(0).unwrap_or("").to_owned();
    if arg.len() != 8 {
        state.err(format!("error: Expected -newerXY; found {arg}."));
        return Err(ParseError::Fatal);
    }

    let x = arg.as_bytes()[6];
    let field = match x {
        b'a' => TimeField::Accessed,
        b'c' => TimeField::Changed,
        b'm' => TimeField::Modified,
        b'B' => {
            state.err(format!(
                "error: {arg}: File birth times ('B') are not supported."
            ));
            return Err(ParseError::Fatal);
        }
        _ => {
            state.err(format!(
                "error: {arg}: For -newerXY, X should be 'a', 'c', 'm', or 'B'."
            ));
            return Err(ParseError::Fatal);
        }
    };

    let y = arg.as_bytes()[7];
    let ref_field = match y {
        b'a' => TimeField::Accessed,
        b'c' => TimeField::Changed,
        b'm' => TimeField::Modified,
        b't' => {
            state.err(format!(
                "error: {arg}: Explicit reference times ('t') are not supported."
            ));
            return Err(ParseError::Fatal);
        }
        b'B' => {
            state.err(format!(
                "error: {arg}: File birth times ('B') are not supported."
            ));
            return Err(ParseError::Fatal);
        }
        _ => {
            state.err(format!(
                "error: {arg}: For -newerXY, Y should be 'a', 'c', 'm', 'B', or 't'."
            ));
            return Err(ParseError::Fatal);
        }
    };

    let value = require_value(state)?;
    let statbuf = state.stat_arg(value)?;
    let reftime = crate::fs::stat_time(&statbuf, ref_field);

    parse_test(state, ExprKind::Newer { field, reftime }, 2)
}

fn parse_nogroup(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_nullary_test(state, ExprKind::NoGroup)
}

fn parse_nohidden(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_action(state, ExprKind::NoHidden, 1)
}

fn parse_noleaf(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    if state.warn {
        let arg = state.arg_str(0).unwrap_or("-noleaf");
        state.warn_msg(format!(
            "warning: bfind does not apply the optimization that {arg} inhibits.\n"
        ));
    }

    parse_nullary_option(state)
}

fn parse_nouser(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_nullary_test(state, ExprKind::NoUser)
}

/// Parse a permission mode like chmod(1): `CLAUSE{,CLAUSE}*` where each
/// clause is `[ugoa]* ([+-=] ([rwxXst]* | [ugo]))+`.
fn parse_mode_clauses(mode: &str) -> Option<(mode_t, mode_t)> {
    if mode.as_bytes().first().is_some_and(u8::is_ascii_digit) {
        let (value, rest) = parse_int_partial(mode, 8)?;
        if !rest.is_empty() || value > 0o7777 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = value as mode_t;
        return Some((value, value));
    }

    let mut file_mode: mode_t = 0;
    let mut dir_mode: mode_t = 0;

    for clause in mode.split(',') {
        let bytes = clause.as_bytes();
        let mut i = 0;

        let mut who: mode_t = 0;
        while i < bytes.len() {
            who |= match bytes[i] {
                b'u' => 0o700,
                b'g' => 0o070,
                b'o' => 0o007,
                b'a' => 0o777,
                _ => break,
            };
            i += 1;
        }
        if who == 0 {
            who = 0o777;
        }

        let mut actions = 0;
        while i < bytes.len() {
            let op = bytes[i];
            if !matches!(op, b'+' | b'-' | b'=') {
                return None;
            }
            i += 1;

            let mut file_change: mode_t = 0;
            let mut dir_change: mode_t = 0;

            if i < bytes.len() && matches!(bytes[i], b'u' | b'g' | b'o') {
                // PERMCOPY (e.g. u=g) has no effect for -perm
                i += 1;
            } else {
                while i < bytes.len() {
                    match bytes[i] {
                        b'r' => {
                            file_change |= who & 0o444;
                            dir_change |= who & 0o444;
                        }
                        b'w' => {
                            file_change |= who & 0o222;
                            dir_change |= who & 0o222;
                        }
                        b'x' => {
                            file_change |= who & 0o111;
                            dir_change |= who & 0o111;
                        }
                        b'X' => {
                            // Executable for directories only
                            dir_change |= who & 0o111;
                        }
                        b's' => {
                            if who & 0o700 != 0 {
                                file_change |= libc::S_ISUID;
                                dir_change |= libc::S_ISUID;
                            }
                            if who & 0o070 != 0 {
                                file_change |= libc::S_ISGID;
                                dir_change |= libc::S_ISGID;
                            }
                        }
                        b't' => {
                            file_change |= libc::S_ISVTX;
                            dir_change |= libc::S_ISVTX;
                        }
                        _ => break,
                    }
                    i += 1;
                }
            }

            match op {
                b'=' => {
                    file_mode &= !who;
                    dir_mode &= !who;
                    file_mode |= file_change;
                    dir_mode |= dir_change;
                }
                b'+' => {
                    file_mode |= file_change;
                    dir_mode |= dir_change;
                }
                _ => {
                    file_mode &= !file_change;
                    dir_mode &= !dir_change;
                }
            }
            actions += 1;
        }

        if actions == 0 {
            return None;
        }
    }

    Some((file_mode, dir_mode))
}

fn parse_perm(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let value = require_str_value(state)?;

    let (cmp, mode) = match value.as_bytes().first() {
        Some(&b'-') => (ModeCmp::All, &value[1..]),
        Some(&b'/') => (ModeCmp::Any, &value[1..]),
        _ => (ModeCmp::Exact, value),
    };

    let Some((file_mode, dir_mode)) = parse_mode_clauses(mode) else {
        state.err(format!("error: '{value}' is an invalid mode."));
        return Err(ParseError::Fatal);
    };

    parse_test(
        state,
        ExprKind::Perm {
            cmp,
            file_mode,
            dir_mode,
        },
        2,
    )
}

fn parse_print(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let file = Rc::clone(&state.cmdline.cout);
    parse_action(state, ExprKind::Print { file }, 1)
}

fn parse_print0(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let file = Rc::clone(&state.cmdline.cout);
    parse_action(state, ExprKind::Print0 { file }, 1)
}

fn parse_printf(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let format = require_str_value(state)?.to_owned();
    let file = Rc::clone(&state.cmdline.cout);
    let program = {
        let has_mtab = state.cmdline.mtab.is_some();
        let mut cerr = state.cmdline.cerr.borrow_mut();
        Program::parse(&format, has_mtab, &mut cerr)?
    };
    parse_action(state, ExprKind::Printf { file, program }, 2)
}

fn parse_prune(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_action(state, ExprKind::Prune, 1)
}

fn parse_quit(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_action(state, ExprKind::Quit, 1)
}

fn parse_regex(state: &mut ParserState<'_>, casefold: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let arg = state.arg_str(0).unwrap_or("-regex").to_owned();
    let value = require_str_value(state)?;

    let translated = match state.regex_dialect {
        RegexDialect::PosixBasic => bre_to_ere(value),
        RegexDialect::PosixExtended => value.to_owned(),
    };

    // The test is a full match: anchor the whole pattern
    let anchored = format!("^(?:{translated})$");
    let regex = RegexBuilder::new(&anchored)
        .case_insensitive(casefold != 0)
        .unicode(false)
        .build();

    match regex {
        Ok(regex) => parse_test(state, ExprKind::RegexMatch { regex }, 2),
        Err(err) => {
            state.err(format!("error: {arg} {value}: {err}."));
            Err(ParseError::Fatal)
        }
    }
}

fn parse_regextype(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let Some(value) = state.arg_str(1) else {
        let arg = state.arg_str(0).unwrap_or("-regextype");
        state.err(format!("error: {arg} needs a value."));
        return Err(ParseError::Fatal);
    };

    match value {
        "posix-basic" => state.regex_dialect = RegexDialect::PosixBasic,
        "posix-extended" => state.regex_dialect = RegexDialect::PosixExtended,
        "help" => {
            println!("Supported types are:\n");
            println!("  posix-basic:    POSIX basic regular expressions (BRE)");
            println!("  posix-extended: POSIX extended regular expressions (ERE)");
            return Err(ParseError::Info);
        }
        _ => {
            state.err(format!("error: Unsupported -regextype '{value}'.\n"));
            eprintln!("Supported types are:\n");
            eprintln!("  posix-basic:    POSIX basic regular expressions (BRE)");
            eprintln!("  posix-extended: POSIX extended regular expressions (ERE)");
            return Err(ParseError::Fatal);
        }
    }

    parse_positional_option(state, 2)
}

fn parse_samefile(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let value = require_value(state)?;
    let statbuf = state.stat_arg(value)?;

    #[allow(clippy::unnecessary_cast)] //dev_t/ino_t widths vary by target
    let kind = ExprKind::Samefile {
        dev: statbuf.st_dev as u64,
        ino: statbuf.st_ino as u64,
    };
    parse_test(state, kind, 2)
}

fn parse_size(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let arg = state.arg_str(0).unwrap_or("-size").to_owned();
    let value = require_str_value(state)?;

    let Some((cmp, unit_str)) = parse_icmp_partial(value) else {
        state.err(format!("error: '{value}' is not a valid integer."));
        return Err(ParseError::Fatal);
    };

    let unit = match unit_str {
        "" | "b" => SizeUnit::Blocks,
        "c" => SizeUnit::Bytes,
        "w" => SizeUnit::Words,
        "k" => SizeUnit::Kilo,
        "M" => SizeUnit::Mega,
        "G" => SizeUnit::Giga,
        "T" => SizeUnit::Tera,
        "P" => SizeUnit::Peta,
        _ => {
            state.err(format!(
                "error: {arg} {value}: Expected a size unit (one of bcwkMGTP); found {unit_str}."
            ));
            return Err(ParseError::Fatal);
        }
    };

    parse_test(state, ExprKind::Size { unit, cmp }, 2)
}

fn parse_sparse(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    parse_nullary_test(state, ExprKind::Sparse)
}

fn parse_type(state: &mut ParserState<'_>, xtype: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let arg = state.arg_str(0).unwrap_or("-type").to_owned();
    let value = require_str_value(state)?;

    if value.is_empty() {
        state.err(format!("error: {arg} {value}: Expected a type flag."));
        return Err(ParseError::Fatal);
    }

    let mut mask = TypeMask::empty();
    for spec in value.split(',') {
        let mut chars = spec.chars();
        let (Some(type_char), None) = (chars.next(), chars.next()) else {
            state.err(format!(
                "error: {arg} {value}: Types must be comma-separated."
            ));
            return Err(ParseError::Fatal);
        };

        let file_type = match type_char {
            'b' => FileType::BlockDevice,
            'c' => FileType::CharDevice,
            'd' => FileType::Directory,
            'D' => FileType::Door,
            'p' => FileType::Fifo,
            'f' => FileType::RegularFile,
            'l' => FileType::Symlink,
            's' => FileType::Socket,
            _ => {
                state.err(format!(
                    "error: {arg} {value}: Unknown type flag '{type_char}' (expected one of [bcdpflsD])."
                ));
                return Err(ParseError::Fatal);
            }
        };
        mask = mask.with(file_type);
    }

    let kind = if xtype != 0 {
        ExprKind::Xtype { mask }
    } else {
        ExprKind::Type { mask }
    };
    parse_test(state, kind, 2)
}

fn parse_warn(state: &mut ParserState<'_>, warn: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    state.warn = warn != 0;
    parse_nullary_positional_option(state)
}

fn parse_help(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let mut cout = state.cmdline.cout.borrow_mut();
    let mut show = |text: &str| {
        let _ = cout.cformat(text);
    };

    show("Usage: %{ex}bfind%{rs} [%{cyn}flags%{rs}...] [%{mag}paths%{rs}...] [%{blu}expression%{rs}...]\n\n");
    show("%{cyn}flags%{rs} (%{cyn}-H%{rs}/%{cyn}-L%{rs}/%{cyn}-P%{rs} etc.), %{mag}paths%{rs}, and %{blu}expressions%{rs} may be freely mixed in any order.\n\n");

    show("%{bld}POSIX find features:%{rs}\n\n");
    show("  %{red}(%{rs} %{blu}expression%{rs} %{red})%{rs}\n");
    show("  %{red}!%{rs} %{blu}expression%{rs}\n");
    show("  %{blu}expression%{rs} [%{red}-a%{rs}] %{blu}expression%{rs}\n");
    show("  %{blu}expression%{rs} %{red}-o%{rs} %{blu}expression%{rs}\n\n");
    show("  %{cyn}-H%{rs}\n      Follow symbolic links on the command line, but not while searching\n");
    show("  %{cyn}-L%{rs}\n      Follow all symbolic links\n\n");
    show("  %{blu}-depth%{rs}\n      Search in post-order (descendents first)\n");
    show("  %{blu}-xdev%{rs}\n      Don't descend into other mount points\n\n");
    show("  %{blu}-atime%{rs}/%{blu}-ctime%{rs}/%{blu}-mtime%{rs} %{bld}[-+]N%{rs}\n      Find files accessed/changed/modified %{bld}N%{rs} days ago\n");
    show("  %{blu}-group%{rs}/%{blu}-user%{rs} %{bld}NAME%{rs}\n      Find files owned by the group/user %{bld}NAME%{rs}\n");
    show("  %{blu}-links%{rs} %{bld}[-+]N%{rs}\n      Find files with %{bld}N%{rs} hard links\n");
    show("  %{blu}-name%{rs} %{bld}GLOB%{rs}\n      Find files whose name matches the %{bld}GLOB%{rs}\n");
    show("  %{blu}-path%{rs} %{bld}GLOB%{rs}\n      Find files whose entire path matches the %{bld}GLOB%{rs}\n");
    show("  %{blu}-newer%{rs} %{bld}FILE%{rs}\n      Find files newer than %{bld}FILE%{rs}\n");
    show("  %{blu}-perm%{rs} %{bld}[-/]MODE%{rs}\n      Find files with a matching mode\n");
    show("  %{blu}-type%{rs} %{bld}[bcdlpfs]%{rs}\n      Find files of the given type\n");
    show("  %{blu}-size%{rs} %{bld}[-+]N[bcwkMGTP]%{rs}\n      Find files with the given size\n\n");
    show("  %{blu}-prune%{rs}\n      Don't descend into this directory\n");
    show("  %{blu}-exec%{rs} %{bld}command ... {} (;|+)%{rs}\n      Execute a command, optionally batching files\n");
    show("  %{blu}-ok%{rs} %{bld}command ... {} ;%{rs}\n      Prompt the user whether to execute a command\n");
    show("  %{blu}-print%{rs}\n      Print the path to the found file\n\n");

    show("%{bld}GNU find features:%{rs}\n\n");
    show("  %{red}-not%{rs} %{blu}expression%{rs}\n");
    show("  %{blu}expression%{rs} %{red}-and%{rs}/%{red}-or%{rs}/%{red},%{rs} %{blu}expression%{rs}\n\n");
    show("  %{cyn}-P%{rs}\n      Never follow symbolic links (the default)\n");
    show("  %{cyn}-D%{rs} %{bld}FLAG%{rs}\n      Turn on a debugging flag (see -D help)\n");
    show("  %{cyn}-O%{rs}%{bld}N%{rs}\n      Enable optimization level %{bld}N%{rs} (default: 3)\n\n");
    show("  %{blu}-d%{rs}\n      Search in post-order (same as %{blu}-depth%{rs})\n");
    show("  %{blu}-daystart%{rs}\n      Measure times relative to the start of today\n");
    show("  %{blu}-follow%{rs}\n      Follow all symbolic links (same as %{cyn}-L%{rs})\n");
    show("  %{blu}-ignore_readdir_race%{rs}/%{blu}-noignore_readdir_race%{rs}\n      Whether to report an error if the tree changes during the search\n");
    show("  %{blu}-mindepth%{rs}/%{blu}-maxdepth%{rs} %{bld}N%{rs}\n      Ignore files shallower/deeper than %{bld}N%{rs}\n");
    show("  %{blu}-mount%{rs}\n      Don't descend into other mount points (same as %{blu}-xdev%{rs})\n");
    show("  %{blu}-noleaf%{rs}\n      Ignored, for compatibility with GNU find\n");
    show("  %{blu}-regextype%{rs} %{bld}TYPE%{rs}\n      Use TYPE-flavored regexes (see -regextype help)\n");
    show("  %{blu}-warn%{rs}/%{blu}-nowarn%{rs}\n      Turn on or off warnings about the command line\n\n");
    show("  %{blu}-amin%{rs}/%{blu}-cmin%{rs}/%{blu}-mmin%{rs} %{bld}[-+]N%{rs}\n      Find files accessed/changed/modified %{bld}N%{rs} minutes ago\n");
    show("  %{blu}-anewer%{rs}/%{blu}-cnewer%{rs}/%{blu}-mnewer%{rs} %{bld}FILE%{rs}\n      Find files accessed/changed/modified more recently than %{bld}FILE%{rs} was modified\n");
    show("  %{blu}-empty%{rs}\n      Find empty files/directories\n");
    show("  %{blu}-executable%{rs}/%{blu}-readable%{rs}/%{blu}-writable%{rs}\n      Find files the current user can execute/read/write\n");
    show("  %{blu}-false%{rs}/%{blu}-true%{rs}\n      Always false/true\n");
    show("  %{blu}-fstype%{rs} %{bld}TYPE%{rs}\n      Find files on file systems with the given %{bld}TYPE%{rs}\n");
    show("  %{blu}-gid%{rs}/%{blu}-uid%{rs} %{bld}[-+]N%{rs}\n      Find files owned by group/user ID %{bld}N%{rs}\n");
    show("  %{blu}-inum%{rs} %{bld}[-+]N%{rs}\n      Find files with inode number %{bld}N%{rs}\n");
    show("  %{blu}-lname%{rs} %{bld}GLOB%{rs}\n      Find symbolic links whose target matches the %{bld}GLOB%{rs}\n");
    show("  %{blu}-newer%{rs}%{bld}XY%{rs} %{bld}REFERENCE%{rs}\n      Find files whose %{bld}X%{rs} time is newer than the %{bld}Y%{rs} time of %{bld}REFERENCE%{rs}\n");
    show("  %{blu}-regex%{rs} %{bld}REGEX%{rs}\n      Find files whose entire path matches the regular expression %{bld}REGEX%{rs}\n");
    show("  %{blu}-samefile%{rs} %{bld}FILE%{rs}\n      Find hard links to %{bld}FILE%{rs}\n");
    show("  %{blu}-used%{rs} %{bld}[-+]N%{rs}\n      Find files last accessed %{bld}N%{rs} days after they were changed\n");
    show("  %{blu}-wholename%{rs} %{bld}GLOB%{rs}\n      Same as %{blu}-path%{rs}\n");
    show("  %{blu}-ilname%{rs}/%{blu}-iname%{rs}/%{blu}-ipath%{rs}/%{blu}-iregex%{rs}/%{blu}-iwholename%{rs}\n      Case-insensitive versions of %{blu}-lname%{rs}/%{blu}-name%{rs}/%{blu}-path%{rs}/%{blu}-regex%{rs}/%{blu}-wholename%{rs}\n");
    show("  %{blu}-xtype%{rs} %{bld}[bcdlpfs]%{rs}\n      Find files of the given type, following links when %{blu}-type%{rs} would not, and vice versa\n\n");
    show("  %{blu}-delete%{rs}\n      Delete any found files (implies %{blu}-depth%{rs})\n");
    show("  %{blu}-execdir%{rs}/%{blu}-okdir%{rs} %{bld}command ... {} (;|+)%{rs}\n      Like %{blu}-exec%{rs}/%{blu}-ok%{rs}, but run the command in the same directory as the found file(s)\n");
    show("  %{blu}-print0%{rs}\n      Like %{blu}-print%{rs}, but use the null character ('\\0') as a separator rather than newlines\n");
    show("  %{blu}-printf%{rs} %{bld}FORMAT%{rs}\n      Print according to a format string (see %{ex}man%{rs} %{bld}find%{rs})\n");
    show("  %{blu}-fprint%{rs}/%{blu}-fprint0%{rs} %{bld}FILE%{rs}, %{blu}-fprintf%{rs} %{bld}FILE FORMAT%{rs}, %{blu}-fls%{rs} %{bld}FILE%{rs}\n      Like the stdout variants, but write to %{bld}FILE%{rs}\n");
    show("  %{blu}-quit%{rs}\n      Quit immediately\n\n");
    show("  %{blu}-version%{rs}\n      Print version information\n");
    show("  %{blu}-help%{rs}\n      Print this help message\n\n");

    show("%{bld}BSD find features:%{rs}\n\n");
    show("  %{cyn}-E%{rs}\n      Use extended regular expressions (same as %{blu}-regextype%{rs} %{bld}posix-extended%{rs})\n");
    show("  %{cyn}-X%{rs}\n      Filter out files with non-%{ex}xargs%{rs}-safe names\n");
    show("  %{cyn}-x%{rs}\n      Don't descend into other mount points (same as %{blu}-xdev%{rs})\n");
    show("  %{cyn}-f%{rs} %{mag}PATH%{rs}\n      Treat %{mag}PATH%{rs} as a path to search (useful if it may begin with a dash)\n");
    show("  %{blu}-depth%{rs} %{bld}[-+]N%{rs}\n      Find files with depth %{bld}N%{rs}\n");
    show("  %{blu}-gid%{rs}/%{blu}-uid%{rs} %{bld}NAME%{rs}\n      Group/user names are supported in addition to numeric IDs\n");
    show("  %{blu}-ls%{rs}\n      List files like %{ex}ls%{rs} %{bld}-dils%{rs}\n");
    show("  %{blu}-sparse%{rs}\n      Find files that occupy fewer disk blocks than expected\n\n");

    show("%{bld}Extra features:%{rs}\n\n");
    show("  %{blu}-color%{rs}/%{blu}-nocolor%{rs}\n      Turn on or off file type colorization\n");
    show("  %{blu}-hidden%{rs}/%{blu}-nohidden%{rs}\n      Match hidden files, or filter them out\n");

    Err(ParseError::Info)
}

fn parse_version(state: &mut ParserState<'_>, _: i32, _: i32) -> Result<Box<Expr>, ParseError> {
    let mut cout = state.cmdline.cout.borrow_mut();
    let _ = cout.cformat(&format!(
        "%{{ex}}bfind%{{rs}} %{{bld}}{}%{{rs}}\n",
        env!("CARGO_PKG_VERSION")
    ));
    Err(ParseError::Info)
}

/// LITERAL : OPTION | TEST | ACTION
fn parse_literal(state: &mut ParserState<'_>) -> Result<Box<Expr>, ParseError> {
    // Paths are already skipped at this point
    let Some(arg) = state.arg_str(0) else {
        let display = state
            .arg_os(0)
            .map_or_else(String::new, |arg| arg.to_string_lossy().into_owned());
        state.err(format!("error: Expected a predicate; found '{display}'."));
        return Err(ParseError::Fatal);
    };

    let Some(name) = arg.strip_prefix('-') else {
        state.err(format!("error: Expected a predicate; found '{arg}'."));
        return Err(ParseError::Fatal);
    };

    if let Some(entry) = table_lookup(name) {
        let Some(parse) = entry.parse else {
            state.err(format!("error: Expected a predicate; found '{arg}'."));
            return Err(ParseError::Fatal);
        };
        return parse(state, entry.arg1, entry.arg2);
    }

    let suggestion = table_lookup_fuzzy(name);
    state.err(format!(
        "error: Unknown argument '{arg}'; did you mean '-{}'?",
        suggestion.name
    ));
    Err(ParseError::Fatal)
}

/// FACTOR : "(" EXPR ")" | "!" FACTOR | "-not" FACTOR | LITERAL
fn parse_factor(state: &mut ParserState<'_>) -> Result<Box<Expr>, ParseError> {
    state.skip_paths();

    let Some(arg) = state.arg_os(0) else {
        state.err("error: Expression terminated prematurely.".to_owned());
        return Err(ParseError::Fatal);
    };
    let bytes = arg.as_bytes();

    if bytes == b"(" {
        state.advance(TokenType::Operator, 1);
        let expr = parse_expr(state)?;
        state.skip_paths();

        match state.arg_os(0) {
            Some(arg) if arg.as_bytes() == b")" => {
                state.advance(TokenType::Operator, 1);
                Ok(expr)
            }
            _ => {
                state.err("error: Expected a ')'.".to_owned());
                Err(ParseError::Fatal)
            }
        }
    } else if bytes == b"!" || bytes == b"-not" {
        let start = state.advance(TokenType::Operator, 1);
        let argv = state.collect_argv(start, 1);
        let factor = parse_factor(state)?;
        Ok(state.optimizer().new_not_expr(factor, argv))
    } else {
        parse_literal(state)
    }
}

/// TERM : FACTOR | TERM ["-a"|"-and"] FACTOR
fn parse_term(state: &mut ParserState<'_>) -> Result<Box<Expr>, ParseError> {
    let mut term = parse_factor(state)?;

    loop {
        state.skip_paths();

        let Some(arg) = state.arg_os(0) else { break };
        let bytes = arg.as_bytes();

        if matches!(bytes, b"-o" | b"-or" | b"," | b")") {
            break;
        }

        let argv = if bytes == b"-a" || bytes == b"-and" {
            let start = state.advance(TokenType::Operator, 1);
            state.collect_argv(start, 1)
        } else {
            vec!["-a".to_owned()]
        };

        let rhs = parse_factor(state)?;
        term = state.optimizer().new_and_expr(term, rhs, argv);
    }

    Ok(term)
}

/// CLAUSE : TERM | CLAUSE ("-o"|"-or") TERM
fn parse_clause(state: &mut ParserState<'_>) -> Result<Box<Expr>, ParseError> {
    let mut clause = parse_term(state)?;

    loop {
        state.skip_paths();

        let Some(arg) = state.arg_os(0) else { break };
        let bytes = arg.as_bytes();
        if bytes != b"-o" && bytes != b"-or" {
            break;
        }

        let start = state.advance(TokenType::Operator, 1);
        let argv = state.collect_argv(start, 1);
        let rhs = parse_term(state)?;
        clause = state.optimizer().new_or_expr(clause, rhs, argv);
    }

    Ok(clause)
}

/// EXPR : CLAUSE | EXPR "," CLAUSE
fn parse_expr(state: &mut ParserState<'_>) -> Result<Box<Expr>, ParseError> {
    let mut expr = parse_clause(state)?;

    loop {
        state.skip_paths();

        let Some(arg) = state.arg_os(0) else { break };
        if arg.as_bytes() != b"," {
            break;
        }

        let start = state.advance(TokenType::Operator, 1);
        let argv = state.collect_argv(start, 1);
        let rhs = parse_clause(state)?;
        expr = state.optimizer().new_comma_expr(expr, rhs, argv);
    }

    Ok(expr)
}

/// Parse the top-level expression, wiring in the implicit -print.
fn parse_whole_expr(state: &mut ParserState<'_>) -> Result<Box<Expr>, ParseError> {
    state.skip_paths();

    let mut expr = if state.arg_os(0).is_some() {
        parse_expr(state)?
    } else {
        Expr::constant(true)
    };

    if let Some(arg) = state.arg_os(0) {
        state.err(format!(
            "error: Unexpected argument '{}'.",
            arg.to_string_lossy()
        ));
        return Err(ParseError::Fatal);
    }

    if state.implicit_print {
        let file = Rc::clone(&state.cmdline.cout);
        let print = Expr::new(ExprKind::Print { file }, false, vec!["-print".to_owned()]);
        expr = state
            .optimizer()
            .new_and_expr(expr, print, vec!["-a".to_owned()]);
    }

    Ok(state.optimizer().optimize_whole(expr))
}

/**
Parse a full command line into a [`Cmdline`].

`args[0]` is the program name. Diagnostics go to stderr as they are
discovered; the returned [`ParseError`] only picks the exit status.
*/
pub fn parse_cmdline(args: &[OsString]) -> Result<Cmdline, ParseError> {
    let mut cmdline = Cmdline::with_defaults();

    if cmdline.mtab.is_none() {
        cmdline
            .cerr
            .borrow_mut()
            .warning("warning: Couldn't parse the mount table.\n");
    }

    let now = Local::now();
    #[allow(clippy::cast_lossless)]
    let now = Timespec {
        sec: now.timestamp(),
        nsec: i64::from(now.timestamp_subsec_nanos() % 1_000_000_000),
    };

    // SAFETY: plain isatty query
    let stdin_tty = unsafe { libc::isatty(libc::STDIN_FILENO) } != 0;

    let mut state = ParserState {
        cmdline: &mut cmdline,
        args,
        pos: 1,
        regex_dialect: RegexDialect::PosixBasic,
        implicit_print: true,
        warn: stdin_tty,
        expr_started: false,
        non_option_seen: false,
        now,
    };

    let expr = parse_whole_expr(&mut state)?;
    cmdline.expr = expr;

    if cmdline.roots.is_empty() {
        cmdline.roots.push(b".".to_vec());
    }

    if cmdline.debug.tree {
        cmdline.dump(false);
    }

    Ok(cmdline)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cmdline, ParseError> {
        let args: Vec<OsString> = std::iter::once("bfind")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect();
        parse_cmdline(&args)
    }

    #[test]
    fn icmp_prefixes() {
        assert_eq!(
            parse_icmp_full("+3"),
            Some(IntCmp {
                mode: CmpMode::Greater,
                value: 3
            })
        );
        assert_eq!(
            parse_icmp_full("-3"),
            Some(IntCmp {
                mode: CmpMode::Less,
                value: 3
            })
        );
        assert_eq!(
            parse_icmp_full("3"),
            Some(IntCmp {
                mode: CmpMode::Exact,
                value: 3
            })
        );
        assert_eq!(parse_icmp_full("3x"), None);
        assert!(looks_like_icmp("+12"));
        assert!(!looks_like_icmp("abc"));
    }

    #[test]
    fn roots_and_implicit_print() {
        let cmdline = parse(&["/tmp", "-name", "x"]).unwrap();
        assert_eq!(cmdline.roots, vec![b"/tmp".to_vec()]);

        // (-name x) -a -print
        let expr = &cmdline.expr;
        assert!(matches!(expr.kind, ExprKind::And));
        assert!(matches!(
            expr.lhs.as_ref().unwrap().kind,
            ExprKind::Name { .. }
        ));
        assert!(matches!(
            expr.rhs.as_ref().unwrap().kind,
            ExprKind::Print { .. }
        ));
    }

    #[test]
    fn explicit_print_stays_unwrapped() {
        let cmdline = parse(&["/tmp", "-print"]).unwrap();
        assert!(matches!(cmdline.expr.kind, ExprKind::Print { .. }));
    }

    #[test]
    fn default_root_is_dot() {
        let cmdline = parse(&[]).unwrap();
        assert_eq!(cmdline.roots, vec![b".".to_vec()]);
    }

    #[test]
    fn dash_f_and_double_dash() {
        let cmdline = parse(&["-f", "-starts-with-dash", "--", "other"]).unwrap();
        assert_eq!(
            cmdline.roots,
            vec![b"-starts-with-dash".to_vec(), b"other".to_vec()]
        );
    }

    #[test]
    fn operators_bind_correctly() {
        // a -o b -a c parses as a -o (b -a c)
        let cmdline = parse(&["-O0", "-name", "a", "-o", "-name", "b", "-name", "c"]).unwrap();
        // Wrapped in the implicit print: ((a -o (b c)) -a -print)
        let and = &cmdline.expr;
        let or = and.lhs.as_ref().unwrap();
        assert!(matches!(or.kind, ExprKind::Or));
        let rhs = or.rhs.as_ref().unwrap();
        assert!(matches!(rhs.kind, ExprKind::And));
    }

    #[test]
    fn parens_and_not() {
        let cmdline = parse(&["-O0", "(", "!", "-name", "a", ")", "-print"]).unwrap();
        let and = &cmdline.expr;
        assert!(matches!(and.kind, ExprKind::And));
        assert!(and.lhs.as_ref().unwrap().is_not());
    }

    #[test]
    fn unknown_predicate_fails() {
        assert!(parse(&["-nmae", "x"]).is_err());
    }

    #[test]
    fn follow_flags() {
        let cmdline = parse(&["-L", "/tmp"]).unwrap();
        assert!(cmdline.flags.follow_all);
        assert!(cmdline.flags.detect_cycles);
        assert!(!cmdline.flags.follow_roots);

        let cmdline = parse(&["-H", "/tmp"]).unwrap();
        assert!(cmdline.flags.follow_roots);
        assert!(!cmdline.flags.follow_all);

        // Later flags override earlier ones
        let cmdline = parse(&["-L", "-P", "/tmp"]).unwrap();
        assert!(!cmdline.flags.follow_all);
        assert!(!cmdline.flags.detect_cycles);
    }

    #[test]
    fn optimization_levels() {
        let cmdline = parse(&["-O1", "/tmp"]).unwrap();
        assert_eq!(cmdline.optlevel, 1);

        let cmdline = parse(&["-Ofast", "/tmp"]).unwrap();
        assert_eq!(cmdline.optlevel, 4);
    }

    #[test]
    fn top_level_purity_passes() {
        // The implicit -print keeps an otherwise pure command line impure
        let cmdline = parse(&["-O4", "/tmp", "-name", "x", "-depth", "2"]).unwrap();
        assert!(!cmdline.expr.is_false());

        // A trailing pure clause is peeled off at O2 and above
        let cmdline = parse(&["-O4", "/tmp", "-print", ",", "-name", "x"]).unwrap();
        assert!(matches!(cmdline.expr.kind, ExprKind::Print { .. }));
    }

    #[test]
    fn depth_forms() {
        let cmdline = parse(&["/tmp", "-depth"]).unwrap();
        assert!(cmdline.flags.post_order);

        let cmdline = parse(&["-O0", "/tmp", "-depth", "2"]).unwrap();
        assert!(!cmdline.flags.post_order);
        let and = &cmdline.expr;
        assert!(matches!(
            and.lhs.as_ref().unwrap().kind,
            ExprKind::Depth { .. }
        ));
    }

    #[test]
    fn min_max_depth() {
        let cmdline = parse(&["/tmp", "-mindepth", "1", "-maxdepth", "3"]).unwrap();
        assert_eq!(cmdline.mindepth, 1);
        assert_eq!(cmdline.maxdepth, 3);
    }

    #[test]
    fn delete_implies_depth() {
        let cmdline = parse(&["/tmp", "-name", "x", "-delete"]).unwrap();
        assert!(cmdline.flags.post_order);
    }

    #[test]
    fn size_units() {
        let cmdline = parse(&["-O0", "/tmp", "-size", "+10M"]).unwrap();
        let size = cmdline.expr.lhs.as_ref().unwrap();
        match &size.kind {
            ExprKind::Size { unit, cmp } => {
                assert_eq!(*unit, SizeUnit::Mega);
                assert_eq!(cmp.mode, CmpMode::Greater);
                assert_eq!(cmp.value, 10);
            }
            other => panic!("expected a size test, got {other:?}"),
        }

        assert!(parse(&["/tmp", "-size", "10Q"]).is_err());
        assert!(parse(&["/tmp", "-size", "10MM"]).is_err());
    }

    #[test]
    fn perm_modes() {
        let cmdline = parse(&["-O0", "/tmp", "-perm", "644"]).unwrap();
        match &cmdline.expr.lhs.as_ref().unwrap().kind {
            ExprKind::Perm {
                cmp,
                file_mode,
                dir_mode,
            } => {
                assert_eq!(*cmp, ModeCmp::Exact);
                assert_eq!(*file_mode, 0o644);
                assert_eq!(*dir_mode, 0o644);
            }
            other => panic!("expected a perm test, got {other:?}"),
        }

        let cmdline = parse(&["-O0", "/tmp", "-perm", "-u+w,g+r"]).unwrap();
        match &cmdline.expr.lhs.as_ref().unwrap().kind {
            ExprKind::Perm {
                cmp,
                file_mode,
                dir_mode,
            } => {
                assert_eq!(*cmp, ModeCmp::All);
                assert_eq!(*file_mode, 0o240);
                assert_eq!(*dir_mode, 0o240);
            }
            other => panic!("expected a perm test, got {other:?}"),
        }

        // X sets the executable bit for directories only
        let cmdline = parse(&["-O0", "/tmp", "-perm", "/a+X"]).unwrap();
        match &cmdline.expr.lhs.as_ref().unwrap().kind {
            ExprKind::Perm {
                file_mode,
                dir_mode,
                ..
            } => {
                assert_eq!(*file_mode, 0);
                assert_eq!(*dir_mode, 0o111);
            }
            other => panic!("expected a perm test, got {other:?}"),
        }

        assert!(parse(&["/tmp", "-perm", "u"]).is_err());
        assert!(parse(&["/tmp", "-perm", "8888"]).is_err());
    }

    #[test]
    fn type_lists() {
        let cmdline = parse(&["-O0", "/tmp", "-type", "d,l"]).unwrap();
        match &cmdline.expr.lhs.as_ref().unwrap().kind {
            ExprKind::Type { mask } => {
                assert!(mask.contains(FileType::Directory));
                assert!(mask.contains(FileType::Symlink));
                assert!(!mask.contains(FileType::RegularFile));
            }
            other => panic!("expected a type test, got {other:?}"),
        }

        assert!(parse(&["/tmp", "-type", "q"]).is_err());
        assert!(parse(&["/tmp", "-type", "dl"]).is_err());
    }

    #[test]
    fn newerxy_rejections() {
        assert!(parse(&["/tmp", "-newerBt", "/tmp"]).is_err());
        assert!(parse(&["/tmp", "-newermt", "/tmp"]).is_err());
        assert!(parse(&["/tmp", "-neweraq", "/tmp"]).is_err());
    }

    #[test]
    fn noleaf_is_accepted_without_effect() {
        let with = parse(&["/tmp", "-noleaf"]).unwrap();
        let without = parse(&["/tmp"]).unwrap();
        assert!(matches!(with.expr.kind, ExprKind::Print { .. }));
        assert!(matches!(without.expr.kind, ExprKind::Print { .. }));
        assert!(!with.flags.post_order);
    }

    #[test]
    fn missing_values_fail() {
        assert!(parse(&["/tmp", "-name"]).is_err());
        assert!(parse(&["/tmp", "-size"]).is_err());
        assert!(parse(&["/tmp", "-maxdepth"]).is_err());
    }

    #[test]
    fn mode_clause_grammar() {
        assert_eq!(parse_mode_clauses("644"), Some((0o644, 0o644)));
        assert_eq!(parse_mode_clauses("u+w"), Some((0o200, 0o200)));
        assert_eq!(parse_mode_clauses("a+rX"), Some((0o444, 0o555)));
        assert_eq!(parse_mode_clauses("u=rw,go=r"), Some((0o644, 0o644)));
        assert_eq!(parse_mode_clauses("+t"), {
            let sticky = libc::S_ISVTX;
            Some((sticky, sticky))
        });
        assert_eq!(parse_mode_clauses("u+s"), {
            let setuid = libc::S_ISUID;
            Some((setuid, setuid))
        });
        // PERMCOPY parses but contributes nothing
        assert_eq!(parse_mode_clauses("u=g"), Some((0, 0)));

        assert_eq!(parse_mode_clauses("u"), None);
        assert_eq!(parse_mode_clauses("u+z"), None);
        assert_eq!(parse_mode_clauses("10000"), None);
        assert_eq!(parse_mode_clauses(""), None);
    }

    #[test]
    fn typo_suggestions_rank_sensibly() {
        assert_eq!(table_lookup_fuzzy("nmae").name, "name");
        assert_eq!(table_lookup_fuzzy("prnit").name, "print");
    }
}
