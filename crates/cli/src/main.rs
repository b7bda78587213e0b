use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use harvester_core::config::{self, AppConfig};
use harvester_core::models::WorkItem;
use harvester_core::pipeline;
use std::collections::HashSet;
use std::path::PathBuf;
use storage::RecordStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Crawl { input, limit, json } => run_crawl(cfg, input, limit, json).await,
        Commands::Optimize {
            input,
            samples,
            json,
        } => run_optimize(cfg, input, samples, json).await,
        Commands::Classify { text, file, json } => run_classify(cfg, text, file, json).await,
        Commands::Records {
            limit,
            label,
            fields,
            json,
        } => run_records(cfg, limit, label, fields, json).await,
    }
}

#[derive(Parser)]
#[command(name = "catalog-harvester")]
#[command(about = "Catalog metadata harvester and ensemble classifier", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest, classify, and store every link in the input file
    Crawl {
        /// File with one document URL per line (# comments allowed)
        input: PathBuf,
        /// Process at most this many links
        #[arg(long)]
        limit: Option<usize>,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Test weight configurations against sampled links and rank them
    Optimize {
        /// File with one document URL per line
        input: PathBuf,
        /// Number of links sampled from the head of the file
        #[arg(long, default_value_t = 25)]
        samples: usize,
        /// Output JSON report
        #[arg(long)]
        json: bool,
    },
    /// Classify a single text without fetching or storing anything
    Classify {
        /// Text to classify; reads stdin when neither this nor --file is given
        text: Option<String>,
        /// Read the text from a file instead
        #[arg(long)]
        file: Option<PathBuf>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored records
    Records {
        /// Maximum rows
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
        /// Filter by final label
        #[arg(long)]
        label: Option<String>,
        /// Restrict output fields (comma-separated), e.g. url,label,grade
        #[arg(long, value_delimiter = ',', num_args = 1.., default_values_t = Vec::<String>::new())]
        fields: Vec<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

fn read_links(path: &PathBuf, limit: Option<usize>) -> Result<Vec<WorkItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading link file {}", path.display()))?;
    let mut items: Vec<WorkItem> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(WorkItem::from_url)
        .collect();
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    Ok(items)
}

async fn run_crawl(cfg: AppConfig, input: PathBuf, limit: Option<usize>, json: bool) -> Result<()> {
    let items = read_links(&input, limit)?;

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing in-flight items");
            ctrl_c_token.cancel();
        }
    });

    let (tx, mut rx) = mpsc::channel::<harvester_core::models::ProgressEvent>(64);
    let progress_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            info!(
                batch = format!("{}/{}", event.batch_index + 1, event.total_batches),
                done = event.items_done,
                total = event.items_total,
                errors = event.errors_so_far,
                "progress"
            );
        }
    });

    let outcome = pipeline::run_crawl(&cfg, items, Some(tx), cancel).await?;
    let _ = progress_task.await;

    if json {
        let status = if outcome.report.fatal.is_some() {
            "aborted"
        } else {
            "ok"
        };
        let summary = serde_json::json!({
            "status": status,
            "done": outcome.report.items_done,
            "failed": outcome.report.failed_items.len(),
            "unprocessed": outcome.unprocessed.len(),
            "error_counts": outcome.report.error_counts,
            "final_memory_mb": outcome.report.final_memory_mb,
            "elapsed_ms": outcome.report.elapsed_ms,
            "fatal": outcome.report.fatal,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "crawl: done {}, failed {}, unprocessed {}, elapsed {} ms",
            outcome.report.items_done,
            outcome.report.failed_items.len(),
            outcome.unprocessed.len(),
            outcome.report.elapsed_ms
        );
        for failure in &outcome.report.failed_items {
            println!(
                "  failed {} ({}) after {} retries: {}",
                failure.id,
                failure.category.as_str(),
                failure.retries,
                failure.url
            );
        }
        if let Some(fatal) = &outcome.report.fatal {
            println!("fatal: {fatal}");
        }
    }
    Ok(())
}

async fn run_optimize(cfg: AppConfig, input: PathBuf, samples: usize, json: bool) -> Result<()> {
    let samples = read_links(&input, Some(samples))?;
    let (best, report) = pipeline::run_optimize(&cfg, samples, None).await?;

    if json {
        let out = serde_json::json!({
            "best": best.name,
            "runs": report.runs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("best configuration: {}", best.name);
        for run in &report.runs {
            println!(
                "  {:<16} composite {:>6.3}  quality {:>5.1}  confidence {:.2}  errors {:.0}%  {} ms",
                run.config_name,
                run.composite_score,
                run.average_quality,
                run.average_confidence,
                run.error_rate * 100.0,
                run.processing_time_ms
            );
        }
    }
    Ok(())
}

async fn run_classify(
    cfg: AppConfig,
    text: Option<String>,
    file: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let text = match (text, file) {
        (Some(t), _) => t,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => {
            use std::io::Read;
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let (votes, result) = pipeline::classify_text(&cfg, &text).await?;

    if json {
        let out = serde_json::json!({
            "label": result.final_label,
            "confidence": result.aggregate_confidence,
            "votes": votes,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "{} (confidence {:.2})",
            result.final_label, result.aggregate_confidence
        );
        for vote in &votes {
            println!("  {:<12} {} ({:.2})", vote.method, vote.label, vote.confidence);
        }
    }
    Ok(())
}

async fn run_records(
    cfg: AppConfig,
    limit: i64,
    label: Option<String>,
    fields: Vec<String>,
    json: bool,
) -> Result<()> {
    let pool = storage::connect(&cfg.database.path).await?;
    storage::migrate(&pool).await?;
    let store = RecordStore::new(pool);

    let records = store.list_records(limit, label.as_deref()).await?;
    let mut vals: Vec<serde_json::Value> = records
        .iter()
        .filter_map(|r| serde_json::to_value(r).ok())
        .collect();
    if !fields.is_empty() {
        vals = filter_fields(vals, &fields);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&vals)?);
    } else {
        for v in &vals {
            println!("{}", serde_json::to_string(v)?);
        }
    }
    Ok(())
}

fn filter_fields(mut results: Vec<serde_json::Value>, fields: &[String]) -> Vec<serde_json::Value> {
    let want: HashSet<String> = fields.iter().map(|s| s.to_lowercase()).collect();
    for r in results.iter_mut() {
        if let Some(obj) = r.as_object_mut() {
            let mut keep = serde_json::Map::new();
            for (k, v) in obj.iter() {
                if want.contains(&k.to_lowercase()) {
                    keep.insert(k.clone(), v.clone());
                }
            }
            *obj = keep;
        }
    }
    results
}
