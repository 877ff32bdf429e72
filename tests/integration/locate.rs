//! `weave locate` and `weave index`

use predicates::prelude::*;

use crate::common::{Project, UTIL, checksum};

/// Three commits; the second one introduces `lib/util.py`.
fn three_commits() -> (Project, Vec<String>) {
    let project = Project::new();
    project.write("other.py", "X = 1\n");
    let first = project.git.commit_all("first").unwrap();
    project.write("lib/util.py", UTIL);
    let second = project.git.commit_all("add util").unwrap();
    project.write("other.py", "X = 2\n");
    let third = project.git.commit_all("third").unwrap();
    (project, vec![first, second, third])
}

#[test]
fn test_locate_then_answer_from_cache() {
    let (project, commits) = three_commits();

    project
        .weave()
        .args(["locate", &checksum(UTIL)])
        .assert()
        .success()
        .stdout(predicate::str::contains(&commits[1]))
        .stdout(predicate::str::contains("lib/util.py"))
        .stdout(predicate::str::contains("add util"))
        .stdout(predicate::str::contains("scanned"));
    assert!(project.join(".weave-cache.json").exists());

    project
        .weave()
        .args(["locate", &checksum(UTIL)])
        .assert()
        .success()
        .stdout(predicate::str::contains(&commits[1]))
        .stdout(predicate::str::contains("answered from cache"));
}

#[test]
fn test_wrong_hint_is_never_reported() {
    let (project, commits) = three_commits();

    project
        .weave()
        .args(["locate", &checksum(UTIL), "--commit", &commits[2]])
        .assert()
        .success()
        .stdout(predicate::str::contains(&commits[1]))
        .stdout(predicate::str::contains(&commits[2]).not());
}

#[test]
fn test_unknown_checksum_fails() {
    let (project, _) = three_commits();

    project
        .weave()
        .args(["locate", &checksum("never committed\n")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No commit in history contains"));
}

#[test]
fn test_corrupt_cache_is_rejected() {
    let (project, _) = three_commits();
    project.write("cache.json", "{ definitely not json");

    project
        .weave()
        .args(["locate", &checksum(UTIL), "--cache", "cache.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupt"));
}

#[test]
fn test_no_save_cache() {
    let (project, commits) = three_commits();

    project
        .weave()
        .args(["locate", &checksum(UTIL), "--no-save-cache"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&commits[1]));
    assert!(!project.join(".weave-cache.json").exists());
}

#[test]
fn test_show_source_and_output() {
    let (project, _) = three_commits();

    project
        .weave()
        .args(["locate", &checksum(UTIL), "--show-source", "-o", "recovered.py"])
        .assert()
        .success()
        .stdout(predicate::str::contains("def doit():"));
    assert_eq!(project.read("recovered.py"), UTIL);
}

#[test]
fn test_index_then_locate_scans_nothing() {
    let (project, commits) = three_commits();

    project
        .weave()
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 3 new commit(s)"));
    project
        .weave()
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 0 new commit(s)"));

    project
        .weave()
        .args(["locate", &checksum(UTIL)])
        .assert()
        .success()
        .stdout(predicate::str::contains(&commits[1]))
        .stdout(predicate::str::contains("answered from cache"));
}

#[test]
fn test_renamed_file_is_found_at_new_path() {
    let (project, _) = three_commits();
    std::fs::rename(project.join("lib/util.py"), project.join("lib/helpers.py")).unwrap();
    let renamed = project.git.commit_all("rename util").unwrap();

    project
        .weave()
        .args(["locate", &checksum(UTIL), "--path", "lib/helpers.py"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&renamed))
        .stdout(predicate::str::contains("lib/helpers.py"));
}
