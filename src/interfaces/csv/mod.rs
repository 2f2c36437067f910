//! CSV batch I/O for the command-line front end.

pub mod catalog_reader;
pub mod order_reader;
pub mod outcome_writer;
