//! Native API request handlers.

pub mod native;

pub use native::*;
