//! Olaf reference-table file format library
//!
//! A `.ofp` file holds one audio item's packed fingerprint table, sorted
//! ascending, ready to be registered with the engine's database.

pub mod format;
pub mod reader;
pub mod writer;

pub use format::{OfpFile, OfpHeader, OfpMetadata, MAGIC, VERSION};
pub use reader::OfpReader;
pub use writer::OfpWriter;
