//! Shared utilities for bindle.

pub mod fs;
pub mod hash;
