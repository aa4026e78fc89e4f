pub mod eval;
pub mod exec;
pub mod glob;
pub mod optimizer;
pub mod parser;
pub mod printf;

use crate::color::ColorFile;
use crate::fs::{TimeField, Timespec, TypeMask};
use core::cell::Cell;
use core::fmt::{self, Write as _};
use core::time::Duration;
use libc::{c_int, mode_t};
use std::cell::RefCell;
use std::rc::Rc;

pub use glob::Glob;

/// A stream an action writes to: stdout, or a file opened by `-fprint` and
/// friends. Shared because several actions may target the same stream.
pub type OutFile = Rc<RefCell<ColorFile>>;

/// How an integer test compares against its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpMode {
    /// `N` written plainly.
    Exact,
    /// `-N`.
    Less,
    /// `+N`.
    Greater,
}

/// An integer comparison parsed from a `[-+]N` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntCmp {
    pub mode: CmpMode,
    pub value: i64,
}

impl IntCmp {
    #[must_use]
    #[inline]
    pub const fn matches(&self, n: i64) -> bool {
        match self.mode {
            CmpMode::Exact => n == self.value,
            CmpMode::Less => n < self.value,
            CmpMode::Greater => n > self.value,
        }
    }
}

/// The unit suffix of a `-size` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Blocks,
    Bytes,
    Words,
    Kilo,
    Mega,
    Giga,
    Tera,
    Peta,
}

impl SizeUnit {
    #[must_use]
    pub const fn scale(self) -> i64 {
        match self {
            Self::Blocks => 512,
            Self::Bytes => 1,
            Self::Words => 2,
            Self::Kilo => 1024,
            Self::Mega => 1024 * 1024,
            Self::Giga => 1024 * 1024 * 1024,
            Self::Tera => 1024 * 1024 * 1024 * 1024,
            Self::Peta => 1024 * 1024 * 1024 * 1024 * 1024,
        }
    }
}

/// The unit a time test counts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minutes,
    Days,
}

impl TimeUnit {
    #[must_use]
    pub const fn divisor(self) -> i64 {
        match self {
            Self::Minutes => 60,
            Self::Days => 60 * 60 * 24,
        }
    }
}

/// How `-perm` compares modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCmp {
    /// `MODE`: all permission bits equal.
    Exact,
    /// `-MODE`: all given bits set.
    All,
    /// `/MODE`: any given bit set (or an empty mode).
    Any,
}

/// What an expression node does when evaluated.
///
/// Operators keep their children in the node's `lhs`/`rhs`; leaves carry
/// their parsed arguments here.
#[derive(Debug)]
pub enum ExprKind {
    True,
    False,
    Not,
    And,
    Or,
    Comma,

    Access { mode: c_int },
    Time { field: TimeField, unit: TimeUnit, cmp: IntCmp, reftime: Timespec },
    Newer { field: TimeField, reftime: Timespec },
    Used { cmp: IntCmp },
    Gid { cmp: IntCmp },
    Uid { cmp: IntCmp },
    NoGroup,
    NoUser,
    Depth { cmp: IntCmp },
    Empty,
    Fstype { name: String },
    Hidden,
    Inum { cmp: IntCmp },
    Links { cmp: IntCmp },
    Lname { glob: Glob },
    Name { glob: Glob },
    PathMatch { glob: Glob },
    Perm { cmp: ModeCmp, file_mode: mode_t, dir_mode: mode_t },
    RegexMatch { regex: regex::bytes::Regex },
    Samefile { dev: u64, ino: u64 },
    Size { unit: SizeUnit, cmp: IntCmp },
    Sparse,
    Type { mask: TypeMask },
    Xtype { mask: TypeMask },

    NoHidden,
    Prune,
    Quit,
    Delete,
    Print { file: OutFile },
    Print0 { file: OutFile },
    Printf { file: OutFile, program: printf::Program },
    Ls { file: OutFile, reftime: Timespec },
    Exec { exec: exec::ExecSpec },
}

/// A node of the parsed expression tree.
///
/// `pure` marks nodes whose evaluation has no observable side effect;
/// `always_true`/`always_false` are filled in by the optimizer's constant
/// propagation. The counters feed `-D rates`.
#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub lhs: Option<Box<Expr>>,
    pub rhs: Option<Box<Expr>>,
    pub pure: bool,
    pub always_true: bool,
    pub always_false: bool,
    /// The argv tokens this node was parsed from, synthesized for nodes the
    /// parser inserted itself.
    pub argv: Vec<String>,
    pub evaluations: Cell<u64>,
    pub successes: Cell<u64>,
    pub elapsed: Cell<Duration>,
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind, pure: bool, argv: Vec<String>) -> Box<Self> {
        Box::new(Self {
            kind,
            lhs: None,
            rhs: None,
            pure,
            always_true: false,
            always_false: false,
            argv,
            evaluations: Cell::new(0),
            successes: Cell::new(0),
            elapsed: Cell::new(Duration::ZERO),
        })
    }

    /// A constant node, the stand-in for the C singletons.
    #[must_use]
    pub fn constant(value: bool) -> Box<Self> {
        let (kind, argv) = if value {
            (ExprKind::True, "-true")
        } else {
            (ExprKind::False, "-false")
        };
        let mut expr = Self::new(kind, true, vec![argv.to_owned()]);
        expr.always_true = value;
        expr.always_false = !value;
        expr
    }

    #[must_use]
    pub fn new_unary(kind: ExprKind, rhs: Box<Self>, argv: Vec<String>) -> Box<Self> {
        let mut expr = Self::new(kind, rhs.pure, argv);
        expr.rhs = Some(rhs);
        expr
    }

    #[must_use]
    pub fn new_binary(kind: ExprKind, lhs: Box<Self>, rhs: Box<Self>, argv: Vec<String>) -> Box<Self> {
        let mut expr = Self::new(kind, lhs.pure && rhs.pure, argv);
        expr.lhs = Some(lhs);
        expr.rhs = Some(rhs);
        expr
    }

    #[must_use]
    #[inline]
    pub const fn is_true(&self) -> bool {
        matches!(self.kind, ExprKind::True)
    }

    #[must_use]
    #[inline]
    pub const fn is_false(&self) -> bool {
        matches!(self.kind, ExprKind::False)
    }

    #[must_use]
    #[inline]
    pub const fn is_not(&self) -> bool {
        matches!(self.kind, ExprKind::Not)
    }

    /// Render the tree the way `-D tree` prints it.
    pub fn dump(&self, out: &mut String, verbose: bool) {
        out.push('(');
        for (i, arg) in self.argv.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(arg);
        }

        if verbose {
            let evaluations = self.evaluations.get();
            let successes = self.successes.get();
            let mut rate = 0.0;
            let mut time = 0.0;
            if evaluations > 0 {
                #[allow(clippy::cast_precision_loss)]
                {
                    rate = 100.0 * successes as f64 / evaluations as f64;
                    time = self.elapsed.get().as_nanos() as f64 / evaluations as f64;
                }
            }
            let _ = write!(out, " [{successes}/{evaluations}={rate}%; {time}ns]");
        }

        if let Some(lhs) = &self.lhs {
            out.push(' ');
            lhs.dump(out, verbose);
        }
        if let Some(rhs) = &self.rhs {
            out.push(' ');
            rhs.dump(out, verbose);
        }
        out.push(')');
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.dump(&mut out, false);
        f.write_str(&out)
    }
}
