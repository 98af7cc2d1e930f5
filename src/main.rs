use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{ensure, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use kadsim::{gml, Coordinator};

const OUTPUT_DIR: &str = "out";

#[derive(Debug, Parser)]
#[command(name = "kadsim", version)]
#[command(about = "Kademlia overlay-network construction simulator")]
#[command(
    after_help = "Each simulation writes out/m<M>_n<N>_k<K>__<i>.gml describing the \
                  final connectivity graph."
)]
struct Args {
    /// Identifier width in bits (1 to 256, with 2^M >= N)
    m: u16,
    /// Number of nodes that will join the network
    n: usize,
    /// Capacity of the routing-table buckets
    k: usize,
    /// Number of independent networks to generate
    #[arg(default_value_t = 1)]
    num: usize,
}

fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };
    ensure!(args.num >= 1, "num must be at least 1");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    fs::create_dir_all(OUTPUT_DIR)?;

    for run in 1..=args.num {
        let mut coordinator = Coordinator::new(args.m, args.n, args.k)?;

        let started = Instant::now();
        coordinator.run()?;
        let elapsed = started.elapsed().as_secs();

        let graph = gml::render(coordinator.network());
        let path = PathBuf::from(OUTPUT_DIR).join(format!(
            "m{}_n{}_k{}__{}.gml",
            args.m, args.n, args.k, run
        ));

        // A failed write loses one output, not the remaining runs.
        if let Err(err) = fs::write(&path, &graph) {
            eprintln!("{}: {err}", path.display());
            continue;
        }
        println!("{}: {elapsed} seconds", path.display());
    }

    Ok(())
}
