//! `weave trace` and `weave headers`

use predicates::prelude::*;

use crate::common::{CALC, Project, UTIL, checksum};

#[test]
fn test_trace_locates_and_restores_every_fragment() {
    let (project, commit) = Project::with_fragments();
    project.weave().args(["render", "main.py", "-o", "out.py"]).assert().success();

    project
        .weave()
        .args(["trace", "out.py", "--restore-dir", "restored"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 of 2 fragment(s) located"))
        .stdout(predicate::str::contains(&commit));

    assert_eq!(project.read("restored/lib/util.py"), UTIL);
    assert_eq!(project.read("restored/lib/calc.py"), CALC);
}

#[test]
fn test_trace_reports_unknown_fragments() {
    let (project, _) = Project::with_fragments();
    project.write("lib/util.py", "def doit():\n    return 3\n");
    project.weave().args(["render", "main.py", "-o", "out.py"]).assert().success();

    project
        .weave()
        .args(["trace", "out.py"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("1 of 2 fragment(s) located"))
        .stderr(predicate::str::contains("could not be located"));
}

#[test]
fn test_headers_lists_every_header() {
    let (project, commit) = Project::with_fragments();
    project.weave().args(["render", "main.py", "-o", "out.py"]).assert().success();

    project
        .weave()
        .args(["headers", "out.py"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("lib/util.py\t{}\t{commit}", checksum(UTIL))))
        .stdout(predicate::str::contains(format!("lib/calc.py\t{}\t{commit}", checksum(CALC))));

    let output = project.weave().args(["headers", "out.py", "--json"]).assert().success();
    let rows: serde_json::Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);
}

#[test]
fn test_headers_rejects_malformed_header() {
    let project = Project::new();
    project.write("bad.py", "# Objects below have been imported from: lib/util.py\n# sha256:abc\n");

    project
        .weave()
        .args(["headers", "bad.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid provenance header"));
}
