//! Shared types for the recall workspace: the error taxonomy and CLI output format.

pub mod error;
pub mod types;
