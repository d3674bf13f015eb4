//! Foundational data structures, error types, and file type definitions.

pub mod error;
pub mod filetypes;
pub mod models;
