pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{chunked_input, seeded_bytes};
