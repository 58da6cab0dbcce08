use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Number of randomized operations to run against the tree.
    #[arg(long, default_value_t = 10_000)]
    pub ops: usize,

    /// Trigger a compaction after every N operations. 0 disables GC.
    #[arg(long, default_value_t = 100)]
    pub gc_every: usize,

    /// Elements are drawn uniformly from 0..max-elem.
    #[arg(long, default_value_t = 500)]
    pub max_elem: i64,

    /// Seed for the workload generator, for reproducible runs.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
