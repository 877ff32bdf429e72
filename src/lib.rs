//! weave - fragment composition with provenance
//!
//! weave has two halves that meet in the provenance header.
//!
//! The **composer** takes a template script and the fragment modules it imports, and
//! produces one self-contained source file for a host runtime that cannot import anything
//! itself. Fragment definitions are renamed with a per-fragment prefix, imports between
//! fragments are rewritten into direct references, native imports are hoisted, and every
//! inlined fragment is preceded by a header:
//!
//! ```text
//! # Objects below have been imported from: lib/util.py
//! # sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08 git:4b2e1c0...
//! ```
//!
//! The **source locator** goes the other way. Given the checksum from a header it finds
//! the commit and path that introduced that exact content, using an incrementally built
//! index of every blob in the repository's history.
//!
//! # Modules
//!
//! ## Composition
//! - [`syntax`] - the language front end: parsing, import extraction, rewriting
//! - [`fragment`] - loaded fragments and module path lookup
//! - [`resolver`] - import classification and the acyclic fragment graph
//! - [`renderer`] - namespacing, literal substitution and artifact assembly
//! - [`provenance`] - checksums and the header codec
//!
//! ## History
//! - [`git`] - the git CLI wrapper
//! - [`history`] - the checksum index, its persistence and the indexer
//! - [`lookup`] - the lookup state machine and artifact tracing
//!
//! ## Supporting modules
//! - [`cli`] - the `weave` command line
//! - [`config`] - `weave.toml`
//! - [`core`] - error types
//! - [`utils`] - atomic writes, paths and progress bars

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod fragment;
pub mod git;
pub mod history;
pub mod lookup;
pub mod provenance;
pub mod renderer;
pub mod resolver;
pub mod syntax;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
