#![allow(clippy::inline_always)]

//! A breadth-first `find(1)`.
//!
//! The crate splits into two subsystems: [`walk`], a traversal engine that
//! explores directory trees breadth-first while keeping its open-descriptor
//! footprint bounded, and [`expr`], the find-style expression language that
//! drives filtering and actions per visited file. [`cmdline`] glues them
//! together the way the binary uses them.

pub mod cmdline;
pub mod color;
pub mod error;
pub mod expr;
pub mod fs;
pub mod mtab;
pub mod walk;

pub use cmdline::Cmdline;
pub use error::{ParseError, WalkError};
pub use expr::eval::eval_cmdline;
pub use expr::parser::parse_cmdline;
pub use walk::{Visit, VisitPhase, WalkAction, WalkFlags, walk as walk_tree};

//this allocator is more efficient than jemalloc through my testing
#[cfg(all(
    feature = "mimalloc",
    any(target_os = "linux", target_os = "macos", target_os = "android")
))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;
