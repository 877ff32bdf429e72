//! `weave render`

use predicates::prelude::*;

use crate::common::{CALC, Project, UTIL, checksum};

#[test]
fn test_render_namespaces_fragments_and_records_commits() {
    let (project, commit) = Project::with_fragments();

    project.weave().args(["render", "main.py", "-o", "out.py"]).assert().success();

    let rendered = project.read("out.py");
    assert!(rendered.starts_with("# Code auto-generated by weave"));
    assert!(rendered.contains("from contracts_api import requires"));
    assert!(rendered.contains("from decimal import Decimal"));
    assert!(rendered.contains("def util_doit():"));
    assert!(rendered.contains("def calc_doit():"));
    assert!(rendered.contains("return util_doit() + calc_doit()"));
    assert!(!rendered.contains("import lib."));

    assert!(rendered.contains("# Objects below have been imported from: lib/util.py"));
    assert!(rendered.contains(&format!("# {} git:{commit}", checksum(UTIL))));
    assert!(rendered.contains(&format!("# {} git:{commit}", checksum(CALC))));
}

#[test]
fn test_render_is_idempotent() {
    let (project, _) = Project::with_fragments();

    let first = project.weave().args(["render", "main.py"]).assert().success();
    let second = project.weave().args(["render", "main.py"]).assert().success();
    assert_eq!(first.get_output().stdout, second.get_output().stdout);
    assert!(!first.get_output().stdout.is_empty());
}

#[test]
fn test_uncommitted_fragment_has_no_commit() {
    let (project, _) = Project::with_fragments();
    let changed = "def doit():\n    return 2\n";
    project.write("lib/util.py", changed);

    project.weave().args(["render", "main.py", "-o", "out.py"]).assert().success();

    let rendered = project.read("out.py");
    let header = format!("# {}\n", checksum(changed));
    assert!(rendered.contains(&header), "missing commit-less header in:\n{rendered}");
}

#[test]
fn test_render_without_git() {
    let (project, _) = Project::with_fragments();

    let output = project.weave().args(["render", "main.py", "--no-git", "--no-banner"]).assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    assert!(!stdout.contains(" git:"));
    assert!(!stdout.contains("auto-generated"));
}

#[test]
fn test_cycle_fails_without_output() {
    let project = Project::new();
    project.write("lib/a.py", "import lib.b as b\n\n\ndef fa():\n    return b.fb()\n");
    project.write("lib/b.py", "import lib.a as a\n\n\ndef fb():\n    return a.fa()\n");
    project.write("main.py", "import lib.a as a\n\n\ndef hook():\n    return a.fa()\n");

    project
        .weave()
        .args(["render", "main.py", "-o", "out.py", "--no-git"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cyclic fragment imports"));
    assert!(!project.join("out.py").exists());
}

#[test]
fn test_unresolved_fragment_suggests_a_candidate() {
    let (project, _) = Project::with_fragments();
    project.write("broken.py", "import lib.utl as util\n\n\ndef hook():\n    return util.doit()\n");

    project
        .weave()
        .args(["render", "broken.py", "--no-git"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lib.utl"))
        .stderr(predicate::str::contains("lib.util"));
}

#[test]
fn test_existing_output_needs_force() {
    let (project, _) = Project::with_fragments();
    project.write("out.py", "keep me\n");

    project
        .weave()
        .args(["render", "main.py", "-o", "out.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(project.read("out.py"), "keep me\n");

    project.weave().args(["render", "main.py", "-o", "out.py", "--force"]).assert().success();
    assert!(project.read("out.py").contains("def util_doit():"));
}

#[test]
fn test_config_file_settings_apply() {
    let (project, _) = Project::with_fragments();
    project.write("weave.toml", "[render]\nbanner = false\nnamespace = \"qualified\"\nuse_git = false\n");

    let output = project.weave().args(["render", "main.py"]).assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    assert!(stdout.contains("def lib_util_doit():"));
    assert!(!stdout.contains("auto-generated"));
    assert!(!stdout.contains(" git:"));
}
