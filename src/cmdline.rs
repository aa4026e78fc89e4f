use crate::color::{ColorFile, Colors};
use crate::expr::{Expr, OutFile};
use crate::mtab::MountTable;
use crate::walk::WalkFlags;
use std::cell::RefCell;
use std::rc::Rc;

/// Whether stdout gets colorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseColor {
    Never,
    /// Colors when the stream is a terminal (the default).
    Auto,
    Always,
}

/// The -D debugging channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugFlags {
    /// Print optimization details.
    pub opt: bool,
    /// Print predicate success rates after the walk.
    pub rates: bool,
    /// Trace all stat() calls.
    pub stat: bool,
    /// Print the parse tree.
    pub tree: bool,
}

/// Everything a parsed command line amounts to.
pub struct Cmdline {
    /// The root paths to walk, in command-line order.
    pub roots: Vec<Vec<u8>>,
    /// The colour table from LS_COLORS.
    pub colors: Rc<Colors>,
    pub use_color: UseColor,
    pub cout: OutFile,
    pub cerr: OutFile,
    /// The mount table, when it could be read; -fstype and %F need it.
    pub mtab: Option<MountTable>,
    pub mindepth: usize,
    pub maxdepth: usize,
    pub flags: WalkFlags,
    /// Optimization level, 0 through 4.
    pub optlevel: i32,
    pub debug: DebugFlags,
    /// -X: refuse paths that would confuse xargs.
    pub xargs_safe: bool,
    /// -ignore_readdir_race: swallow ENOENT below the roots.
    pub ignore_races: bool,
    pub expr: Box<Expr>,
    /// Descriptors the command line itself keeps open (-fprint files,
    /// pending -execdir batches), subtracted from the walker's budget.
    pub nopen_files: usize,
}

impl Cmdline {
    /// A command line with nothing parsed into it yet.
    #[must_use]
    pub fn with_defaults() -> Self {
        let colors = Rc::new(Colors::parse(std::env::var("LS_COLORS").ok().as_deref()));

        // SAFETY: plain isatty queries
        let stdout_tty = unsafe { libc::isatty(libc::STDOUT_FILENO) } != 0;
        // SAFETY: as above
        let stderr_tty = unsafe { libc::isatty(libc::STDERR_FILENO) } != 0;

        let cout = Rc::new(RefCell::new(ColorFile::stdout(
            stdout_tty.then(|| Rc::clone(&colors)),
        )));
        let cerr = Rc::new(RefCell::new(ColorFile::stderr(
            stderr_tty.then(|| Rc::clone(&colors)),
        )));

        Self {
            roots: Vec::new(),
            colors,
            use_color: UseColor::Auto,
            cout,
            cerr,
            mtab: MountTable::parse().ok(),
            mindepth: 0,
            maxdepth: usize::MAX,
            flags: WalkFlags {
                recover: true,
                ..WalkFlags::default()
            },
            optlevel: 3,
            debug: DebugFlags::default(),
            xargs_safe: false,
            ignore_races: false,
            expr: Expr::constant(true),
            nopen_files: 0,
        }
    }

    /// Dump the parsed command line to stderr, for -D tree and -D rates.
    pub fn dump(&self, verbose: bool) {
        let mut out = String::new();

        if self.flags.follow_all {
            out.push_str("-L ");
        } else if self.flags.follow_roots {
            out.push_str("-H ");
        } else {
            out.push_str("-P ");
        }

        if self.optlevel != 3 {
            out.push_str(&format!("-O{} ", self.optlevel));
        }

        if self.debug.opt {
            out.push_str("-D opt ");
        }
        if self.debug.rates {
            out.push_str("-D rates ");
        }
        if self.debug.stat {
            out.push_str("-D stat ");
        }
        if self.debug.tree {
            out.push_str("-D tree ");
        }

        for root in &self.roots {
            if matches!(root.first(), Some(&(b'-' | b'(' | b')' | b'!' | b','))) {
                out.push_str("-f ");
            }
            out.push_str(&String::from_utf8_lossy(root));
            out.push(' ');
        }

        if self.cout.borrow().colors_enabled() {
            out.push_str("-color ");
        } else {
            out.push_str("-nocolor ");
        }
        if self.flags.post_order {
            out.push_str("-depth ");
        }
        if self.ignore_races {
            out.push_str("-ignore_readdir_race ");
        }
        if self.flags.xdev {
            out.push_str("-mount ");
        }
        if self.mindepth != 0 {
            out.push_str(&format!("-mindepth {} ", self.mindepth));
        }
        if self.maxdepth != usize::MAX {
            out.push_str(&format!("-maxdepth {} ", self.maxdepth));
        }

        self.expr.dump(&mut out, verbose);
        eprintln!("{out}");
    }
}
