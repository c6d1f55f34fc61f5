//! Data models for receipt parsing.

pub mod config;
pub mod receipt;
