use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cfdbg", version, about = "Cuckoo-filter de Bruijn graph construction and simplification", long_about = None)]
pub struct Cli {
    /// Log at DEBUG level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every stage.
#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
    /// Prefix for every stage file
    #[arg(short, long)]
    pub prefix: PathBuf,

    /// K-mer length
    #[arg(short = 'K', long, default_value_t = 203)]
    pub kmer_len: usize,

    /// Minimum filter count for a k-mer to be used (1-3)
    #[arg(long, default_value_t = 3)]
    pub min_count: u8,

    /// Longest expected read length
    #[arg(long, default_value_t = 550)]
    pub max_read_len: usize,

    /// Number of threads
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Count k-mers from reads into a cuckoo filter and write the unique k-mer stream
    Ccf {
        #[command(flatten)]
        graph: GraphArgs,

        /// Read files, FASTA or FASTQ, optionally gzipped
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Expected number of distinct k-mers
        #[arg(long, default_value_t = 1 << 24)]
        capacity: usize,
    },

    /// Build the de Bruijn graph from a counted filter
    Cdbg {
        #[command(flatten)]
        graph: GraphArgs,
    },

    /// Clip tips, merge paths and classify edges of a built graph
    Smfy {
        #[command(flatten)]
        graph: GraphArgs,

        /// Maximum tip length to clip (0 uses --max-read-len)
        #[arg(long, default_value_t = 0)]
        tip_max_len: usize,
    },
}
