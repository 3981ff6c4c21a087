use clap::Parser;
use std::time::Instant;

use csrload::{Csr, FileFormat, LoadOptions};

#[derive(Parser)]
#[command(
    name = "csrload",
    version = "0.1",
    about = "Load an .mtx/.coo/edge-list file into a CSR graph and report its shape"
)]
struct ProgramArgs {
    /// Required — input file (.mtx, .coo, .el/.csv are accepted)
    #[arg(short, long, required = true)]
    file: String,

    /// Parse a weight column per record
    #[arg(short, long)]
    weighted: bool,

    /// Skip record validation (undefined results on malformed input)
    #[arg(short, long)]
    unchecked: bool,

    /// Worker thread count, default is one per physical core
    #[arg(short, long)]
    threads: Option<usize>,

    /// Degree-histogram partitions (1, 2, 4, or 8)
    #[arg(short, long, default_value_t = 1)]
    partitions: usize,

    /// Force the input format instead of detecting it (mtx, coo, el)
    #[arg(long)]
    format: Option<String>,

    /// Print the first neighbors of vertex 0
    #[arg(short = 'n', long)]
    neighbors: bool,
}

fn main() {
    let args = ProgramArgs::parse();
    if let Err(e) = run(&args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &ProgramArgs) -> Result<(), Box<dyn std::error::Error>> {
    let format = match args.format.as_deref() {
        None => None,
        Some("mtx") => Some(FileFormat::Mtx),
        Some("coo") => Some(FileFormat::Coo),
        Some("el") | Some("csv") => Some(FileFormat::EdgeList),
        Some(other) => return Err(format!("error unknown format '{other}'").into()),
    };
    let options = LoadOptions {
        format,
        weighted: args.weighted,
        checked: !args.unchecked,
        threads: args.threads,
        partitions: args.partitions,
        ..LoadOptions::default()
    };

    let time = Instant::now();
    let graph: Csr<u32, f32> = Csr::from_file(&args.file, &options)?;
    println!(
        "graph built (|V| = {}, |E| = {}) {:?}",
        graph.rows(),
        graph.edge_count(),
        time.elapsed()
    );

    if args.neighbors && graph.rows() > 0 {
        println!("vertex 0's neighbors:");
        match graph.neighbor_weights(0) {
            Some(ws) => {
                for (v, w) in graph.neighbors(0).iter().zip(ws) {
                    println!("{v} {w}");
                }
            }
            None => {
                for v in graph.neighbors(0) {
                    println!("{v}");
                }
            }
        }
    }
    Ok(())
}
