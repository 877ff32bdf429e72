//! Integration test suite for weave
//!
//! End-to-end tests that drive the `weave` binary against throwaway git repositories.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **render**: composing templates, headers, failure modes
//! - **locate**: checksum lookups, the history cache, commit hints
//! - **trace**: tracing and restoring the fragments of a rendered artifact

mod common;

mod locate;
mod render;
mod trace;
