//! De Bruijn graph construction backed by a counting cuckoo filter.
//!
//! Stages: `ccf` counts read k-mers into the filter, `cdbg` finds branching
//! nodes and grows unitig edges between them, `smfy` simplifies the result.

pub mod error;
pub mod graph;
pub mod io;
pub mod kmer;
pub mod pipeline;
pub mod stats;

pub use error::{Error, Result};
