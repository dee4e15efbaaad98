//! CSV adapters used by the command-line interface.

pub mod breakdown_writer;
pub mod cart_reader;
