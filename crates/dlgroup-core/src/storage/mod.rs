//! Destination file I/O.
//!
//! Creates (optionally preallocated) destination files, reopens them for
//! resume, and exposes positional writes so several commands can fill
//! different pieces of the same file.

mod builder;
mod writer;

pub use builder::StorageWriterBuilder;
pub use writer::StorageWriter;
