//! Core types shared by every part of weave
//!
//! The core module currently holds the error system:
//! - [`WeaveError`] - enumerated failure modes for composition, lookup, git and I/O
//! - [`ErrorContext`] - user-facing wrapper with details and a suggestion
//! - [`user_friendly_error`] - converts any [`anyhow::Error`] for CLI display
//!
//! Library functions return [`anyhow::Result`] and raise [`WeaveError`] variants for the
//! failures a caller may want to match on; call sites add `.context()` for the rest.

pub mod error;

pub use error::{ErrorContext, WeaveError, user_friendly_error};
