//! Shared helpers for the integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use weave_cli::provenance::ChecksumAlgorithm;
use weave_cli::test_utils::TestGit;

pub const UTIL: &str = "def doit():\n    return 1\n";
pub const CALC: &str = "from decimal import Decimal\n\n\ndef doit():\n    return Decimal(2)\n";
pub const TEMPLATE: &str = "\
from contracts_api import requires
import lib.util as util
import lib.calc as calc


def hook():
    return util.doit() + calc.doit()
";

/// A git repository in a temporary directory.
pub struct Project {
    pub dir: TempDir,
    pub git: TestGit,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let git = TestGit::new(dir.path());
        git.init_with_user().unwrap();
        Self {
            dir,
            git,
        }
    }

    /// A repository holding the util/calc fragments and a template, all committed.
    pub fn with_fragments() -> (Self, String) {
        let project = Self::new();
        project.write("lib/util.py", UTIL);
        project.write("lib/calc.py", CALC);
        project.write("main.py", TEMPLATE);
        let commit = project.git.commit_all("add fragments").unwrap();
        (project, commit)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        self.git.write_file(relative, content).unwrap()
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.join(relative)).unwrap()
    }

    /// The `weave` binary running in the repository, without colors or progress bars.
    pub fn weave(&self) -> Command {
        let mut cmd = Command::cargo_bin("weave").unwrap();
        cmd.current_dir(self.path())
            .env("NO_COLOR", "1")
            .env("WEAVE_NO_PROGRESS", "1")
            .env_remove("WEAVE_CONFIG")
            .env_remove("RUST_LOG");
        cmd
    }
}

/// `sha256:<hex>` of `content`.
pub fn checksum(content: &str) -> String {
    ChecksumAlgorithm::Sha256.digest(content.as_bytes()).to_string()
}
