//! Repository traits for metadata operations.

pub mod catalog;
pub mod ledger;
pub mod multipart;

pub use catalog::CatalogRepo;
pub use ledger::LedgerRepo;
pub use multipart::MultipartRepo;
