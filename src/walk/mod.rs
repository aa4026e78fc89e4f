mod dircache;
mod dirqueue;
mod path;
mod walker;

pub use walker::{Visit, VisitPhase, WalkAction, WalkFlags, walk};
