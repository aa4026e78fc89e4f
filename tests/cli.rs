//! End-to-end tests of the bfind binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn bfind() -> Command {
    Command::cargo_bin("bfind").unwrap()
}

/// stdout as lines, in output order.
fn lines(output: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(str::to_owned)
        .collect()
}

fn scratch() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a"), "").unwrap();
    fs::create_dir(dir.path().join("b")).unwrap();
    fs::write(dir.path().join("b/c"), "").unwrap();
    dir
}

fn path_str(path: &Path) -> String {
    path.to_str().unwrap().to_owned()
}

#[test]
fn minimal_walk_is_breadth_first() {
    let dir = scratch();
    let root = path_str(dir.path());

    let assert = bfind().arg(&root).assert().success();
    let out = lines(&assert.get_output().stdout);

    assert_eq!(out.len(), 4);
    assert_eq!(out[0], root);
    assert_eq!(out[3], format!("{root}/b/c"));
    let mut middle = vec![out[1].clone(), out[2].clone()];
    middle.sort();
    assert_eq!(middle, vec![format!("{root}/a"), format!("{root}/b")]);
}

#[test]
fn depth_mode_is_post_order() {
    let dir = scratch();
    let root = path_str(dir.path());

    let assert = bfind().args([root.as_str(), "-depth"]).assert().success();
    let out = lines(&assert.get_output().stdout);

    assert_eq!(out.len(), 4);
    // The root comes last, and b only after its contents
    assert_eq!(out[3], root);
    let b_at = out.iter().position(|line| *line == format!("{root}/b")).unwrap();
    let c_at = out
        .iter()
        .position(|line| *line == format!("{root}/b/c"))
        .unwrap();
    assert!(c_at < b_at);
}

#[test]
fn prune_cuts_the_subtree() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join(".git")).unwrap();
    fs::write(dir.path().join(".git/config"), "").unwrap();
    fs::write(dir.path().join("kept"), "").unwrap();
    let root = path_str(dir.path());

    let assert = bfind()
        .args([root.as_str(), "-name", ".git", "-prune", "-o", "-print"])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);

    // The pruned directory wins the -o, so it is not printed, and its
    // contents are never visited
    assert!(!out.iter().any(|line| line.ends_with("/.git")));
    assert!(!out.iter().any(|line| line.ends_with("/config")));
    assert!(out.iter().any(|line| line.ends_with("/kept")));
}

#[test]
fn name_glob_filters() {
    let dir = scratch();
    let root = path_str(dir.path());

    let assert = bfind().args([root.as_str(), "-name", "c"]).assert().success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out, vec![format!("{root}/b/c")]);
}

#[test]
fn iname_folds_case() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("README"), "").unwrap();
    let root = path_str(dir.path());

    let assert = bfind()
        .args([root.as_str(), "-iname", "readme"])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out, vec![format!("{root}/README")]);
}

#[test]
fn type_filters() {
    let dir = scratch();
    let root = path_str(dir.path());

    let assert = bfind().args([root.as_str(), "-type", "f"]).assert().success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|line| line.ends_with("/a") || line.ends_with("/b/c")));

    let assert = bfind().args([root.as_str(), "-type", "d"]).assert().success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out.len(), 2);
}

#[test]
fn depth_limits() {
    let dir = scratch();
    let root = path_str(dir.path());

    let assert = bfind().args([root.as_str(), "-maxdepth", "1"]).assert().success();
    assert_eq!(lines(&assert.get_output().stdout).len(), 3);

    let assert = bfind().args([root.as_str(), "-mindepth", "1"]).assert().success();
    assert_eq!(lines(&assert.get_output().stdout).len(), 3);

    let assert = bfind().args([root.as_str(), "-maxdepth", "0"]).assert().success();
    assert_eq!(lines(&assert.get_output().stdout), vec![root.clone()]);
}

#[test]
fn false_emits_nothing() {
    let dir = scratch();
    let root = path_str(dir.path());

    bfind()
        .args([root.as_str(), "-false", "-and", "-print"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    bfind()
        .args(["-O4", root.as_str(), "-false", "-and", "-print"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn print0_uses_nul_separators() {
    let dir = scratch();
    let root = path_str(dir.path());

    let assert = bfind()
        .args([root.as_str(), "-maxdepth", "0", "-print0"])
        .assert()
        .success();
    let out = assert.get_output().stdout.clone();
    assert_eq!(out, [root.as_bytes(), b"\0"].concat());
}

#[test]
fn printf_directives() {
    let dir = scratch();
    let root = path_str(dir.path());

    let assert = bfind()
        .args([root.as_str(), "-name", "c", "-printf", r"%d %f %y\n"])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out, vec!["2 c f".to_owned()]);

    let assert = bfind()
        .args([root.as_str(), "-name", "c", "-printf", r"%P\n"])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out, vec!["b/c".to_owned()]);
}

#[test]
fn fprint_writes_the_file() {
    let dir = scratch();
    let root = path_str(dir.path());
    let out_path = dir.path().join("listing");

    bfind()
        .args([
            root.as_str(),
            "-name",
            "a",
            "-fprint",
            out_path.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written = fs::read_to_string(&out_path).unwrap();
    assert_eq!(written, format!("{root}/a\n"));
}

#[test]
fn ls_lines_have_the_expected_shape() {
    let dir = scratch();
    let root = path_str(dir.path());

    let assert = bfind().args([root.as_str(), "-name", "a", "-ls"]).assert().success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out.len(), 1);

    let fields: Vec<&str> = out[0].split_whitespace().collect();
    // inode blocks mode nlink owner group size month day time path
    assert!(fields.len() >= 10, "short -ls line: {}", out[0]);
    assert!(fields[0].chars().all(|ch| ch.is_ascii_digit()));
    assert!(fields[2].starts_with('-'));
    assert!(fields.last().unwrap().ends_with("/a"));
}

#[test]
fn exec_runs_per_file() {
    let dir = scratch();
    let root = path_str(dir.path());

    bfind()
        .args([root.as_str(), "-name", "a", "-exec", "cp", "{}", "{}.copy", ";"])
        .assert()
        .success();
    assert!(dir.path().join("a.copy").exists());
}

#[test]
fn exec_batches_with_plus() {
    let dir = scratch();
    let root = path_str(dir.path());
    let marker = dir.path().join("marker");

    let script = format!("echo \"$@\" >> {}", marker.display());
    bfind()
        .args([
            root.as_str(),
            "-type",
            "f",
            "-exec",
            "sh",
            "-c",
            script.as_str(),
            "sh",
            "{}",
            "+",
        ])
        .assert()
        .success();

    let content = fs::read_to_string(&marker).unwrap();
    assert!(content.contains("/a"));
    assert!(content.contains("/b/c"));
    // One batch, one invocation
    assert_eq!(content.lines().count(), 1);
}

#[test]
fn delete_removes_the_tree() {
    let dir = tempfile::tempdir().unwrap();
    let victim = dir.path().join("victim");
    fs::create_dir_all(victim.join("sub")).unwrap();
    fs::write(victim.join("sub/file"), "").unwrap();

    bfind()
        .args([path_str(&victim).as_str(), "-delete"])
        .assert()
        .success();
    assert!(!victim.exists());
}

#[test]
fn empty_finds_empty_files_and_dirs() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("empty"), "").unwrap();
    fs::write(dir.path().join("full"), "content").unwrap();
    fs::create_dir(dir.path().join("hollow")).unwrap();
    let root = path_str(dir.path());

    let assert = bfind()
        .args([root.as_str(), "-mindepth", "1", "-empty"])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out.len(), 2);
    assert!(out.iter().any(|line| line.ends_with("/empty")));
    assert!(out.iter().any(|line| line.ends_with("/hollow")));
}

#[test]
fn size_rounds_up() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("small"), "xy").unwrap();
    fs::write(dir.path().join("zero"), "").unwrap();
    let root = path_str(dir.path());

    // 2 bytes round up to one 512-byte block
    let assert = bfind()
        .args([root.as_str(), "-type", "f", "-size", "1"])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out, vec![format!("{root}/small")]);

    // A zero-byte file has size 0 in every unit
    let assert = bfind()
        .args([root.as_str(), "-type", "f", "-size", "0k"])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out, vec![format!("{root}/zero")]);

    let assert = bfind()
        .args([root.as_str(), "-type", "f", "-size", "+1c"])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out, vec![format!("{root}/small")]);
}

#[test]
fn newer_compares_mtimes() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("old");
    let new = dir.path().join("new");
    fs::write(&old, "").unwrap();
    fs::write(&new, "").unwrap();

    filetime::set_file_mtime(&old, filetime::FileTime::from_unix_time(1_000_000, 0)).unwrap();
    filetime::set_file_mtime(&new, filetime::FileTime::from_unix_time(2_000_000, 0)).unwrap();

    let root = path_str(dir.path());
    let assert = bfind()
        .args([root.as_str(), "-newer", old.to_str().unwrap()])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert!(out.iter().any(|line| line.ends_with("/new")));
    assert!(!out.iter().any(|line| line.ends_with("/old")));
}

#[test]
fn mmin_matches_recent_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("fresh"), "").unwrap();
    let root = path_str(dir.path());

    let assert = bfind()
        .args([root.as_str(), "-type", "f", "-mmin", "-1"])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out, vec![format!("{root}/fresh")]);
}

#[test]
fn quit_stops_after_the_first_match() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..20 {
        fs::write(dir.path().join(format!("file{i:02}")), "").unwrap();
    }
    let root = path_str(dir.path());

    let assert = bfind()
        .args([root.as_str(), "-type", "f", "-print", "-quit"])
        .assert()
        .success();
    assert_eq!(lines(&assert.get_output().stdout).len(), 1);
}

#[test]
fn regex_matches_whole_paths() {
    let dir = scratch();
    let root = path_str(dir.path());

    // Partial matches don't count
    let assert = bfind().args([root.as_str(), "-regex", "c"]).assert().success();
    assert!(lines(&assert.get_output().stdout).is_empty());

    let assert = bfind()
        .args(["-E", root.as_str(), "-regex", ".*/(a|c)"])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out.len(), 2);
}

#[test]
fn basic_regex_treats_parens_literally() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("(weird)"), "").unwrap();
    let root = path_str(dir.path());

    let assert = bfind()
        .args([root.as_str(), "-regex", ".*/(weird)"])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out, vec![format!("{root}/(weird)")]);
}

#[test]
fn noleaf_is_accepted() {
    let dir = scratch();
    let root = path_str(dir.path());

    let assert = bfind().args([root.as_str(), "-noleaf"]).assert().success();
    assert_eq!(lines(&assert.get_output().stdout).len(), 4);
}

#[test]
fn missing_root_fails() {
    bfind()
        .arg("/nonexistent/certainly/not/here")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No such file"));
}

#[test]
fn symlink_loop_fails_under_l() {
    let dir = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();
    let root = path_str(dir.path());

    bfind()
        .args(["-L", root.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("symbolic links"));
}

#[test]
fn unknown_arguments_suggest_a_fix() {
    bfind()
        .args(["/tmp", "-nmae", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("did you mean '-name'"));
}

#[test]
fn help_and_version_exit_zero() {
    bfind()
        .arg("-help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
    bfind()
        .arg("-version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bfind"));
}

#[test]
fn multiple_roots_walk_in_order() {
    let one = tempfile::tempdir().unwrap();
    let two = tempfile::tempdir().unwrap();
    fs::write(one.path().join("x"), "").unwrap();
    fs::write(two.path().join("y"), "").unwrap();

    let assert = bfind()
        .args([path_str(one.path()).as_str(), path_str(two.path()).as_str()])
        .assert()
        .success();
    let out = lines(&assert.get_output().stdout);
    assert_eq!(out.len(), 4);
    assert_eq!(out[0], path_str(one.path()));
    assert_eq!(out[2], path_str(two.path()));
}

#[test]
fn tree_dump_shows_the_expression() {
    let dir = scratch();
    let root = path_str(dir.path());

    bfind()
        .args(["-D", "tree", root.as_str(), "-name", "c"])
        .assert()
        .success()
        .stderr(predicate::str::contains("(-name c)"))
        .stderr(predicate::str::contains("-print"));
}
