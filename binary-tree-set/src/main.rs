use std::collections::BTreeSet;

use anyhow::{ensure, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use binary_tree_set::{cli::Cli, client::SetClient, coordinator::SetCoordinator};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Drives a randomized workload against the actor tree and an in-memory
/// `BTreeSet` oracle at the same time, with compactions interleaved, and
/// fails if the two ever disagree on membership.
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut client = SetClient::new(SetCoordinator::spawn());
    let mut oracle = BTreeSet::new();
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut mismatches = 0usize;

    info!(
        ops = cli.ops,
        gc_every = cli.gc_every,
        max_elem = cli.max_elem,
        seed = cli.seed,
        "starting workload"
    );

    for step in 1..=cli.ops {
        let elem = rng.gen_range(0..cli.max_elem);
        match rng.gen_range(0..3) {
            0 => {
                client.insert(elem).await?;
                oracle.insert(elem);
            }
            1 => {
                client.remove(elem).await?;
                oracle.remove(&elem);
            }
            _ => {
                let found = client.contains(elem).await?;
                if found != oracle.contains(&elem) {
                    mismatches += 1;
                    warn!(elem, found, "membership diverged from the oracle");
                }
            }
        }
        if cli.gc_every != 0 && step % cli.gc_every == 0 {
            client.gc()?;
        }
    }

    // Final sweep over the whole element range.
    for elem in 0..cli.max_elem {
        let found = client.contains(elem).await?;
        if found != oracle.contains(&elem) {
            mismatches += 1;
            warn!(elem, found, "final sweep diverged from the oracle");
        }
    }

    info!(ops = cli.ops, live = oracle.len(), "workload complete");
    ensure!(
        mismatches == 0,
        "{mismatches} membership mismatches against the oracle"
    );
    info!("actor tree agrees with the in-memory oracle");
    Ok(())
}
