//! Shared utilities for bundlewire.
//!
//! This crate provides the cross-cutting pieces used by every other
//! bundlewire crate: the unified error type and filesystem helpers.

pub mod errors;
pub mod fs;
