use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rxsearch_api::{
    respond, ApiResult, AutocompleteRequest, DrugSearchApi, InProcApi, SearchRequest,
};
use rxsearch_core::DrugSummary;
use rxsearch_search::{MergeOrder, SearchConfig, SearchEngine};
use rxsearch_store::{PartitionSet, PartitionSpec};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rxctl", version, about = "Federated drug-name search")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Partition files in order, canonical first: "name=path,..." or bare paths
    #[arg(long = "partitions", env = "RXS_PARTITIONS", global = true)]
    partitions: Option<String>,

    /// Per-partition timeout in milliseconds (overrides RXS_PARTITION_TIMEOUT_MS)
    #[arg(long = "timeout-ms", global = true)]
    timeout_ms: Option<u64>,

    /// Merged result ordering: score | partition (overrides RXS_MERGE_ORDER)
    #[arg(long = "merge-order", global = true)]
    merge_order: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search every partition, deduplicated and paginated
    Search {
        query: String,
        /// 1-based page number
        #[arg(long = "page", allow_negative_numbers = true)]
        page: Option<i64>,
        /// Page size
        #[arg(long = "limit", allow_negative_numbers = true)]
        limit: Option<i64>,
    },
    /// Typeahead suggestions from the canonical partition
    Autocomplete { query: String },
    /// List configured partitions and record counts
    Partitions,
}

fn init_tracing() {
    let env = std::env::var("RXS_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("RXS_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid RXS_METRICS_ADDR; expected host:port");
        }
    }
}

fn build_config(cli: &Cli) -> Result<SearchConfig> {
    let mut cfg = SearchConfig::from_env();
    if let Some(ms) = cli.timeout_ms {
        cfg.call.timeout = Duration::from_millis(ms.max(1));
    }
    if let Some(order) = cli.merge_order.as_deref() {
        cfg.merge_order = MergeOrder::from_str(order)?;
    }
    Ok(cfg)
}

fn print_json<T: Serialize>(res: &ApiResult<T>) -> bool {
    let (status, body) = respond(res);
    match serde_json::to_string_pretty(&body) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("encode error: {}", e),
    }
    status < 400
}

fn print_rows(rows: &[DrugSummary]) {
    println!("{:<32} {:<12} {:<16} UNII", "NAME", "DRUGBANK", "TYPE");
    for r in rows {
        let id = r.drugbank_id.first().map(String::as_str).unwrap_or("-");
        println!(
            "{:<32} {:<12} {:<16} {}",
            r.name,
            id,
            r.drug_type.as_deref().unwrap_or("-"),
            r.unii.as_deref().unwrap_or("-")
        );
    }
}

async fn run(api: &InProcApi, cli: &Cli) -> bool {
    match &cli.command {
        Commands::Search { query, page, limit } => {
            info!(query = %query, page = ?page, limit = ?limit, "search invoked");
            let res = api.search(SearchRequest { query: Some(query.clone()), page: *page, limit: *limit }).await;
            match cli.output {
                Output::Json => print_json(&res),
                Output::Human => match res {
                    Ok(resp) => {
                        print_rows(&resp.data);
                        match resp.pagination {
                            Some(p) => println!("page {}/{} • {} total • {} shown", p.page, p.total_pages, p.total, resp.data.len()),
                            None => println!("(query too short)"),
                        }
                        true
                    }
                    Err(e) => {
                        eprintln!("search error: {}", e);
                        false
                    }
                },
            }
        }
        Commands::Autocomplete { query } => {
            info!(query = %query, "autocomplete invoked");
            let res = api.autocomplete(AutocompleteRequest { query: Some(query.clone()) }).await;
            match cli.output {
                Output::Json => print_json(&res),
                Output::Human => match res {
                    Ok(resp) => {
                        for s in resp.data {
                            println!("{}", s.name);
                        }
                        true
                    }
                    Err(e) => {
                        eprintln!("autocomplete error: {}", e);
                        false
                    }
                },
            }
        }
        Commands::Partitions => {
            let res = api.partitions().await;
            match cli.output {
                Output::Json => print_json(&res),
                Output::Human => match res {
                    Ok(parts) => {
                        println!("{:<20} {:<10} DOCS", "PARTITION", "ROLE");
                        for p in parts {
                            let role = if p.canonical { "canonical" } else { "replica" };
                            let docs = p.docs.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string());
                            println!("{:<20} {:<10} {}", p.name, role, docs);
                        }
                        true
                    }
                    Err(e) => {
                        eprintln!("partitions error: {}", e);
                        false
                    }
                },
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let raw = cli.partitions.clone().ok_or_else(|| anyhow!("no partitions: pass --partitions or set RXS_PARTITIONS"))?;
    let specs = PartitionSpec::parse_list(&raw)?;
    let cfg = build_config(&cli)?;
    let parts = PartitionSet::open(&specs)?;
    info!(partitions = parts.len(), canonical = %parts.canonical().name(), "partitions opened");
    let api = InProcApi::new(SearchEngine::new(parts, cfg));

    // Dropping the request future on Ctrl-C cancels in-flight partition calls.
    let ok = tokio::select! {
        ok = run(&api, &cli) => ok,
        _ = signal::ctrl_c() => {
            warn!("Ctrl-C received; cancelling request");
            false
        }
    };

    api.shutdown().await;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
