//! Traversal-engine integration tests: ordering guarantees, descriptor
//! budgeting, cancellation, and error delivery.

use bfind::{VisitPhase, WalkAction, WalkFlags, walk_tree};
use std::fs;
use std::os::unix::ffi::OsStrExt as _;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Seen {
    path: Vec<u8>,
    depth: usize,
    phase: VisitPhase,
    error: i32,
}

fn collect(root: &Path, nopenfd: usize, flags: WalkFlags) -> Vec<Seen> {
    let mut seen = Vec::new();
    let root_bytes = root.as_os_str().as_bytes();

    walk_tree(root_bytes, nopenfd, flags, &mut |visit| {
        seen.push(Seen {
            path: visit.path.to_vec(),
            depth: visit.depth,
            phase: visit.phase,
            error: visit.error,
        });
        WalkAction::Continue
    })
    .unwrap();

    seen
}

fn scratch() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a"), "").unwrap();
    fs::create_dir(dir.path().join("b")).unwrap();
    fs::write(dir.path().join("b/c"), "").unwrap();
    dir
}

#[test]
fn breadth_first_order() {
    let dir = scratch();
    let seen = collect(
        dir.path(),
        16,
        WalkFlags {
            recover: true,
            ..WalkFlags::default()
        },
    );

    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0].depth, 0);
    assert!(seen.iter().all(|visit| visit.phase == VisitPhase::Pre));

    // Shallower entries always come first
    for pair in seen.windows(2) {
        assert!(pair[0].depth <= pair[1].depth, "BFS order violated");
    }

    // And a parent's visit precedes its descendants'
    let b_at = seen
        .iter()
        .position(|visit| visit.path.ends_with(b"/b"))
        .unwrap();
    let c_at = seen
        .iter()
        .position(|visit| visit.path.ends_with(b"/b/c"))
        .unwrap();
    assert!(b_at < c_at);
}

#[test]
fn post_order_visits_fire_after_descendants() {
    let dir = scratch();
    let seen = collect(
        dir.path(),
        16,
        WalkFlags {
            recover: true,
            post_order: true,
            ..WalkFlags::default()
        },
    );

    // Directories appear twice, files once
    let posts: Vec<&Seen> = seen
        .iter()
        .filter(|visit| visit.phase == VisitPhase::Post)
        .collect();
    assert_eq!(posts.len(), 2); // the root and b

    for (i, visit) in seen.iter().enumerate() {
        if visit.phase != VisitPhase::Post {
            continue;
        }
        // Everything under this path was already seen
        let mut prefix = visit.path.clone();
        prefix.push(b'/');
        for (j, other) in seen.iter().enumerate() {
            if other.path.starts_with(&prefix) {
                assert!(j < i, "descendant visited after the post-order visit");
            }
        }
    }

    // The root's post-order visit is the very last
    assert_eq!(seen.last().unwrap().phase, VisitPhase::Post);
    assert_eq!(seen.last().unwrap().depth, 0);
}

#[test]
fn skip_subtree_prunes() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join(".git")).unwrap();
    fs::write(dir.path().join(".git/config"), "").unwrap();
    fs::write(dir.path().join("kept"), "").unwrap();

    let mut seen = Vec::new();
    walk_tree(
        dir.path().as_os_str().as_bytes(),
        16,
        WalkFlags {
            recover: true,
            ..WalkFlags::default()
        },
        &mut |visit| {
            seen.push(visit.path.to_vec());
            if visit.name() == b".git" {
                WalkAction::SkipSubtree
            } else {
                WalkAction::Continue
            }
        },
    )
    .unwrap();

    assert!(seen.iter().any(|path| path.ends_with(b"/.git")));
    assert!(!seen.iter().any(|path| path.ends_with(b"/config")));
    assert!(seen.iter().any(|path| path.ends_with(b"/kept")));
}

#[test]
fn skip_siblings_stops_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["one", "two", "three", "four"] {
        fs::write(dir.path().join(name), "").unwrap();
    }

    let mut children = 0;
    walk_tree(
        dir.path().as_os_str().as_bytes(),
        16,
        WalkFlags {
            recover: true,
            ..WalkFlags::default()
        },
        &mut |visit| {
            if visit.depth == 1 {
                children += 1;
                WalkAction::SkipSiblings
            } else {
                WalkAction::Continue
            }
        },
    )
    .unwrap();

    assert_eq!(children, 1);
}

#[test]
fn stop_ends_the_walk() {
    let dir = scratch();

    let mut count = 0;
    walk_tree(
        dir.path().as_os_str().as_bytes(),
        16,
        WalkFlags {
            recover: true,
            ..WalkFlags::default()
        },
        &mut |_visit| {
            count += 1;
            WalkAction::Stop
        },
    )
    .unwrap();

    assert_eq!(count, 1);
}

#[cfg(target_os = "linux")]
fn open_fd_count() -> usize {
    fs::read_dir("/proc/self/fd").unwrap().count()
}

#[test]
fn descriptor_budget_is_respected() {
    // A chain deep enough that an unbounded walker would hold open
    // descriptors for every level
    let dir = tempfile::tempdir().unwrap();
    let mut path = dir.path().to_path_buf();
    const DEPTH: usize = 60;
    for i in 0..DEPTH {
        path.push(format!("level{i}"));
    }
    fs::create_dir_all(&path).unwrap();

    const NOPENFD: usize = 8;

    #[cfg(target_os = "linux")]
    let baseline = open_fd_count();

    let mut dirs = 0;
    #[cfg(target_os = "linux")]
    let mut max_fds = 0;

    walk_tree(
        dir.path().as_os_str().as_bytes(),
        NOPENFD,
        WalkFlags {
            recover: true,
            ..WalkFlags::default()
        },
        &mut |_visit| {
            dirs += 1;
            #[cfg(target_os = "linux")]
            {
                max_fds = max_fds.max(open_fd_count());
            }
            WalkAction::Continue
        },
    )
    .unwrap();

    assert_eq!(dirs, DEPTH + 1);

    #[cfg(target_os = "linux")]
    {
        // The budget, the /proc/self/fd handle we opened to count, and some
        // slack for concurrently running tests in this process. An unbounded
        // walker would hold one descriptor per level and blow far past this.
        assert!(
            max_fds <= baseline + NOPENFD + 8,
            "walk held {} descriptors over a baseline of {baseline}",
            max_fds - baseline,
        );
    }
}

#[test]
fn tiny_budget_is_rejected() {
    let dir = scratch();
    let err = walk_tree(
        dir.path().as_os_str().as_bytes(),
        1,
        WalkFlags::default(),
        &mut |_visit| WalkAction::Continue,
    )
    .unwrap_err();
    assert_eq!(err.errno(), libc::EMFILE);
}

#[test]
fn symlink_cycle_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

    let seen = collect(
        dir.path(),
        16,
        WalkFlags {
            recover: true,
            follow_all: true,
            detect_cycles: true,
            ..WalkFlags::default()
        },
    );

    let cycle = seen
        .iter()
        .find(|visit| visit.path.ends_with(b"/loop"))
        .expect("the symlink was visited");
    assert_eq!(cycle.error, libc::ELOOP);
}

#[test]
fn missing_root_aborts_without_recover() {
    let err = walk_tree(
        b"/nonexistent/certainly/not/here",
        16,
        WalkFlags::default(),
        &mut |_visit| WalkAction::Continue,
    )
    .unwrap_err();
    assert_eq!(err.errno(), libc::ENOENT);
}

#[test]
fn missing_root_is_delivered_with_recover() {
    let mut seen = Vec::new();
    walk_tree(
        b"/nonexistent/certainly/not/here",
        16,
        WalkFlags {
            recover: true,
            ..WalkFlags::default()
        },
        &mut |visit| {
            seen.push((visit.error, visit.phase));
            WalkAction::Continue
        },
    )
    .unwrap();

    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, libc::ENOENT);
}

#[test]
fn non_directory_root_gets_one_visit() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain");
    fs::write(&file, "x").unwrap();

    let seen = collect(
        &file,
        16,
        WalkFlags {
            recover: true,
            ..WalkFlags::default()
        },
    );
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].depth, 0);
}

#[test]
fn root_name_offset_points_at_the_basename() {
    let dir = scratch();
    let root_bytes = dir.path().as_os_str().as_bytes().to_vec();

    walk_tree(
        &root_bytes,
        16,
        WalkFlags {
            recover: true,
            ..WalkFlags::default()
        },
        &mut |visit| {
            assert!(!visit.name().contains(&b'/'));
            assert_eq!(visit.root, root_bytes.as_slice());
            WalkAction::Continue
        },
    )
    .unwrap();
}
