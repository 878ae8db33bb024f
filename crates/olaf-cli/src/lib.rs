//! Shared plumbing for the Olaf command-line binaries

pub mod audio;
pub mod output;
