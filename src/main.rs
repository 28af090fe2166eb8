use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;

use vexel::{
    Collection, CollectionOptions, CreateMode, Metric, Precision, Quantization, SearchArgs,
};

#[derive(Parser)]
#[command(name = "vexel", version = "1.0.0", about = "The .vex vector collection CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new collection file
    Create {
        path: PathBuf,
        #[arg(short, long)]
        dim: u32,
        /// Quantization width in bits: 4, 8, 16, 32, 64
        #[arg(short, long, default_value = "64")]
        quantization: u8,
        /// Metric: euclidean (default) or cosine
        #[arg(short, long, default_value = "euclidean")]
        metric: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Insert or replace one document
    Add {
        path: PathBuf,
        id: u64,
        /// Comma-separated vector components, e.g. "0.1,0.2,0.3"
        vector: String,
        /// Metadata string stored verbatim
        #[arg(short, long, default_value = "")]
        metadata: String,
    },
    /// Print one document as JSON
    Get {
        path: PathBuf,
        id: u64,
    },
    /// Remove one document
    Remove {
        path: PathBuf,
        id: u64,
    },
    /// Nearest-neighbor or radius search
    Search {
        path: PathBuf,
        /// Comma-separated query vector
        vector: String,
        #[arg(short, long, default_value = "10")]
        k: usize,
        #[arg(short, long, default_value = "0")]
        radius: f64,
        /// Precision: medium (default) or exact
        #[arg(short, long, default_value = "medium")]
        precision: String,
    },
    /// List all live document ids
    Ids {
        path: PathBuf,
    },
    /// Show collection parameters and counts
    Info {
        path: PathBuf,
    },
    /// Document, bucket, and distance statistics as JSON
    Stats {
        path: PathBuf,
    },
    /// Scan every span and report file health
    Verify {
        path: PathBuf,
        /// Print the full report as JSON instead of the summary line
        #[arg(long)]
        json: bool,
    },
    /// Print the replication update stream as JSON
    Updates {
        path: PathBuf,
        #[arg(short, long, default_value = "100")]
        max: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {

        // ── Create ───────────────────────────────────────────────────────────
        Commands::Create { path, dim, quantization, metric, force } => {
            let mut opts = options(&path);
            opts.dim = Some(dim);
            opts.quantization = Some(
                Quantization::from_bits(quantization)
                    .ok_or_else(|| format!("unknown quantization width {quantization}"))?,
            );
            opts.metric =
                Some(Metric::from_name(&metric).ok_or_else(|| format!("unknown metric {metric}"))?);
            opts.create_mode =
                if force { CreateMode::CreateAndOverwrite } else { CreateMode::CreateIfNotExists };
            let col = Collection::open(opts)?;
            println!(
                "Created: {}  (dim {}, {} bits, {})",
                path.display(),
                col.dim(),
                col.quantization().bits(),
                col.metric().name()
            );
        }

        // ── Add ──────────────────────────────────────────────────────────────
        Commands::Add { path, id, vector, metadata } => {
            let col = open_existing(&path)?;
            let vector = parse_vector(&vector)?;
            col.add_document(id, &vector, metadata.as_bytes())?;
            println!("  added  {id} ({} components, {} B metadata)", vector.len(), metadata.len());
        }

        // ── Get ──────────────────────────────────────────────────────────────
        Commands::Get { path, id } => {
            let col = open_existing(&path)?;
            let doc = col.get_document(id)?;
            let json = serde_json::json!({
                "id": doc.id,
                "vector": doc.vector,
                "metadata": String::from_utf8_lossy(&doc.metadata),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }

        // ── Remove ───────────────────────────────────────────────────────────
        Commands::Remove { path, id } => {
            let col = open_existing(&path)?;
            col.remove_document(id)?;
            println!("  removed  {id}");
        }

        // ── Search ───────────────────────────────────────────────────────────
        Commands::Search { path, vector, k, radius, precision } => {
            let col = open_existing(&path)?;
            let mut args = SearchArgs::knn(parse_vector(&vector)?, k);
            args.radius = radius;
            args.precision = Precision::from_name(&precision)
                .ok_or_else(|| format!("unknown precision {precision}"))?;
            let response = col.search(&args)?;
            println!("{:<20} {:>14}  Metadata", "Id", "Distance");
            for r in &response.results {
                println!(
                    "{:<20} {:>14.6}  {}",
                    r.id,
                    r.distance,
                    String::from_utf8_lossy(&r.metadata)
                );
            }
            println!(
                "{} result(s), {:.1}% of the collection scored",
                response.results.len(),
                response.percent_searched
            );
        }

        // ── Ids ──────────────────────────────────────────────────────────────
        Commands::Ids { path } => {
            let col = open_existing(&path)?;
            for id in col.get_all_ids()? {
                println!("{id}");
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { path } => {
            let col = open_existing(&path)?;
            let stats = col.compute_stats()?;
            println!("Collection: {}", path.display());
            println!("  dimensionality : {}", col.dim());
            println!("  quantization   : {} bits", col.quantization().bits());
            println!("  metric         : {}", col.metric().name());
            println!("  documents      : {}", stats.document_count);
            println!("  tombstones     : {}", stats.tombstone_count);
            println!("  file size      : {} B", stats.file_size_bytes);
            println!("  reusable       : {} B", stats.free_bytes);
        }

        // ── Stats ────────────────────────────────────────────────────────────
        Commands::Stats { path } => {
            let col = open_existing(&path)?;
            println!("{}", serde_json::to_string_pretty(&col.compute_stats()?)?);
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { path, json } => {
            let col = open_existing(&path)?;
            let report = col.verify()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
            }
            if !report.is_healthy() {
                std::process::exit(1);
            }
        }

        // ── Updates ──────────────────────────────────────────────────────────
        Commands::Updates { path, max } => {
            let col = open_existing(&path)?;
            for u in col.updates_since(&HashMap::new(), max)? {
                let kind = match u.kind {
                    vexel::UpdateKind::Write(_) => "write",
                    vexel::UpdateKind::Delete => "delete",
                };
                let json = serde_json::json!({
                    "record_id": u.record_id,
                    "node_id": u.node_id,
                    "sequence": u.sequence,
                    "timestamp": u.timestamp,
                    "kind": kind,
                });
                println!("{json}");
            }
        }
    }
    Ok(())
}

fn options(path: &PathBuf) -> CollectionOptions {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "collection".to_owned());
    let mut opts = CollectionOptions::new(name);
    opts.path = path.clone();
    opts
}

fn open_existing(path: &PathBuf) -> Result<Collection, Box<dyn std::error::Error>> {
    let mut opts = options(path);
    opts.create_mode = CreateMode::OpenExisting;
    Ok(Collection::open(opts)?)
}

fn parse_vector(s: &str) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
    s.split(',')
        .map(|c| {
            c.trim()
                .parse::<f64>()
                .map_err(|e| format!("bad component {c:?}: {e}").into())
        })
        .collect()
}
