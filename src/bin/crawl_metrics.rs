//! Crawl Metrics Binary - batch derivation over a crawl directory
//!
//! Detects duplicate titles / h1 / descriptions and ranks the top external
//! domains, then writes the records to the selected backend.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin crawl_metrics -- --backend sqlite
//! ```
//!
//! ## Environment Variables
//!
//! - CRAWLSTATS_DATA_DIR - Directory of `<prefix>.txt.<part_id>` shards (default: data)
//! - CRAWLSTATS_OUTPUT_PATH - JSONL output directory (default: data/out) - used when --backend jsonl
//! - CRAWLSTATS_DB_PATH - SQLite database path (default: data/crawlstats.db) - used when --backend sqlite
//! - TOP_DOMAINS_N - Domains kept per ranking (default: 100)
//! - DOMAIN_SAMPLE_SIZE - Destinations sampled per domain (default: 100)
//! - DOMAIN_SAMPLE_SOURCES - Source urls kept per destination (default: 3)
//! - DUPLICATE_SAMPLE_SIZE - Other urls kept per duplicate record (default: 10)
//! - RUST_LOG - Logging level (optional, default: info)

use crawlstats::derive::run_derivation;
use crawlstats::resolve::PatternUrlResolver;
use crawlstats::sinks::create_sink;
use crawlstats::{parse_backend_from_args, AnalyticsConfig, BackendType};
use std::env;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let backend = parse_backend_from_args(&args);
    let config = AnalyticsConfig::from_env();

    let sink_path = match backend {
        BackendType::Sqlite => config.db_path.clone(),
        BackendType::Jsonl => config.output_path.clone(),
    };

    log::info!("🚀 Starting crawl metrics derivation");
    log::info!("   Data dir: {}", config.data_dir.display());
    log::info!("   Output: {}", sink_path.display());
    log::info!("   Top domains: {}", config.top_domains_n);
    log::info!(
        "   Domain samples: {} destinations x {} sources",
        config.domain_sample_size,
        config.domain_sample_sources
    );
    log::info!("   Duplicate samples: {}", config.duplicate_sample_size);

    let mut sink = create_sink(backend, sink_path)?;
    log::info!("📊 Backend: {}", sink.backend_type());

    let started = Instant::now();
    let resolver = PatternUrlResolver::new(&config.data_dir);
    let summary = run_derivation(&config, &resolver, sink.as_mut())?;

    log::info!(
        "✅ Derivation done in {:.1}s: {} duplicate records, {} full domains, {} second level domains",
        started.elapsed().as_secs_f64(),
        summary.duplicate_records,
        summary.full_domains,
        summary.second_level_domains
    );
    Ok(())
}
