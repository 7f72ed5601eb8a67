//! Optimization and legalization passes over the typed IR.
//!
//! Each pass is a standalone module with a `run` entry point; the compile
//! sequence decides which ones to apply based on the compile options and
//! the output target.

pub mod fold;
pub mod layout;
pub mod loop_progress;
pub mod lower;
pub mod prune;

mod walk;

pub use lower::TargetCaps;
