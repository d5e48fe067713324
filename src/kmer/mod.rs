//! K-mer codec and the approximate counting filter

pub mod cuckoo;
pub mod kmer;
