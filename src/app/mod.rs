//! Application entry: CLI parsing and benchmark startup.

pub(crate) mod cli;
pub mod startup;
