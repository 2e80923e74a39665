//! Content store backends.

pub mod filesystem;
