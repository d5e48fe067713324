//! Stage orchestration: filter counting (`ccf`), graph construction (`cdbg`)
//! and simplification (`smfy`).
//!
//! Stages talk to each other only through files named by [`OutputPaths`].

pub mod construct;
pub mod count;
pub mod simplify;

use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Run-time parameters shared by every stage.
#[derive(Clone, Debug, Serialize)]
pub struct DbgConfig {
    pub kmer_len: usize,
    /// Minimum filter count for a k-mer to take part in the graph.
    pub min_count: u8,
    pub max_read_len: usize,
    /// Short open-ended edges below this length are clipped. 0 means
    /// `max_read_len`.
    pub tip_max_len: usize,
    pub workers: usize,
    /// Path prefix for every stage file.
    pub prefix: PathBuf,
    /// Expected number of distinct k-mers, used to size the filter.
    pub filter_capacity: usize,
}

impl Default for DbgConfig {
    fn default() -> Self {
        Self {
            kmer_len: 203,
            min_count: 3,
            max_read_len: 550,
            tip_max_len: 0,
            workers: num_cpus::get(),
            prefix: PathBuf::from("cfdbg"),
            filter_capacity: 1 << 24,
        }
    }
}

impl DbgConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kmer_len < 3 {
            return Err(Error::Config(format!("k-mer length {} is too small", self.kmer_len)));
        }
        if self.min_count == 0 || self.min_count > crate::kmer::cuckoo::MAX_COUNT {
            return Err(Error::Config(format!(
                "min count {} outside 1..={}",
                self.min_count,
                crate::kmer::cuckoo::MAX_COUNT
            )));
        }
        if self.max_read_len < self.kmer_len + 50 {
            return Err(Error::Config(format!(
                "max read length {} must be at least k + 50 = {}",
                self.max_read_len,
                self.kmer_len + 50
            )));
        }
        if self.workers == 0 {
            return Err(Error::Config("worker count must be positive".into()));
        }
        if self.prefix.as_os_str().is_empty() {
            return Err(Error::Config("output prefix is empty".into()));
        }
        Ok(())
    }

    pub fn effective_tip_len(&self) -> usize {
        if self.tip_max_len == 0 {
            self.max_read_len
        } else {
            self.tip_max_len
        }
    }

    pub fn paths(&self) -> OutputPaths {
        OutputPaths::new(&self.prefix)
    }
}

/// File names derived from the run prefix.
#[derive(Clone, Debug)]
pub struct OutputPaths {
    pub filter_info: PathBuf,
    pub filter_hash: PathBuf,
    pub unique_kmers: PathBuf,
    pub complex_nodes: PathBuf,
    pub edges: PathBuf,
    pub dbg_stat: PathBuf,
    pub nodes: PathBuf,
    pub smfy_edges: PathBuf,
    pub smfy_nodes: PathBuf,
    pub smfy_info: PathBuf,
    pub stats_json: PathBuf,
}

impl OutputPaths {
    pub fn new(prefix: &Path) -> Self {
        let with = |suffix: &str| {
            let mut name = prefix.as_os_str().to_owned();
            name.push(suffix);
            PathBuf::from(name)
        };
        Self {
            filter_info: with(".cf.Info"),
            filter_hash: with(".cf.Hash.gz"),
            unique_kmers: with(".uniqkmerseq"),
            complex_nodes: with(".complexNode"),
            edges: with(".edges.fq"),
            dbg_stat: with(".DBG.stat"),
            nodes: with(".nodes.Arr"),
            smfy_edges: with(".edges.smfy.fq"),
            smfy_nodes: with(".nodes.smfy.Arr"),
            smfy_info: with(".smfy.DBGInfo"),
            stats_json: with(".stats.json"),
        }
    }
}

/// JSON summary written next to each stage's outputs.
#[derive(Debug, Serialize)]
pub struct StageReport<'a, T: Serialize> {
    pub stage: &'static str,
    pub config: &'a DbgConfig,
    pub stats: &'a T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<crate::stats::GraphSummary>,
}
