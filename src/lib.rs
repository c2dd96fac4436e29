//! Cortex analyzers
//!
//! Standalone adapters that read a JSON artifact on standard input, query a
//! threat-intelligence service or parse a submitted file, and write a JSON
//! report on standard output.

pub mod analyzers;
pub mod artifact;
pub mod binary;
pub mod cli;
pub mod errors;
pub mod http;
pub mod metadata;
pub mod ole;
pub mod policy;
pub mod proxy;
pub mod report;
pub mod runner;

#[cfg(test)]
mod testing;

pub use artifact::Artifact;
pub use errors::{AnalyzerError, AnalyzerResult};
pub use report::Outcome;
