mod cli_main;

use anyhow::Context;
use cfdbg::pipeline::{construct::construct_dbg, count::count_kmers, simplify::simplify_dbg, DbgConfig};
use clap::Parser;
use cli_main::{Cli, Commands, GraphArgs};
use rayon::ThreadPoolBuilder;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

fn config_from(args: &GraphArgs) -> DbgConfig {
    DbgConfig {
        kmer_len: args.kmer_len,
        min_count: args.min_count,
        max_read_len: args.max_read_len,
        workers: args.threads,
        prefix: args.prefix.clone(),
        ..Default::default()
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Setting tracing default failed")?;

    let threads = match &cli.command {
        Commands::Ccf { graph, .. } | Commands::Cdbg { graph } | Commands::Smfy { graph, .. } => graph.threads,
    };
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Failed to build thread pool")?;

    let start = Instant::now();
    match cli.command {
        Commands::Ccf {
            graph,
            input,
            capacity,
        } => {
            let config = DbgConfig {
                filter_capacity: capacity,
                ..config_from(&graph)
            };
            info!("Starting ccf: {} input file(s), k = {}", input.len(), config.kmer_len);
            count_kmers(&config, &input).context("ccf failed")?;
        }

        Commands::Cdbg { graph } => {
            let config = config_from(&graph);
            info!("Starting cdbg: prefix = {}, k = {}", config.prefix.display(), config.kmer_len);
            construct_dbg(&config).context("cdbg failed")?;
        }

        Commands::Smfy { graph, tip_max_len } => {
            let config = DbgConfig {
                tip_max_len,
                ..config_from(&graph)
            };
            info!("Starting smfy: prefix = {}", config.prefix.display());
            simplify_dbg(&config).context("smfy failed")?;
        }
    }
    info!("Completed in {:.2}s", start.elapsed().as_secs_f32());
    Ok(())
}
