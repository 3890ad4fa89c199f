//! Crawl Query Binary - run a query settings document against the metrics store
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin crawl_query -- query.json
//! cargo run --release --bin crawl_query -- query.json --suggest --relevance
//! cargo run --release --bin crawl_query -- query.json --urls-done 12000
//! ```
//!
//! `--suggest` ranks patterns of the "suggest" table instead of summing the
//! "full_crawl" table. `--relevance` applies the pattern hierarchy.
//! `--urls-done <n>` drops groups holding 3% of the crawl or less.
//!
//! ## Environment Variables
//!
//! - CRAWLSTATS_DB_PATH - SQLite database path (default: data/crawlstats.db)
//! - STRICT_FIELDS - Reject unknown fields (default: true)
//! - MAX_RESULTS - Pattern results kept (default: 30)
//! - MAX_CHILDREN - Children kept per pattern (default: 10)
//! - RUST_LOG - Logging level (optional, default: info)

use crawlstats::query::{
    FieldCatalog, FieldValidation, MetricsQuery, MinPagesHook, QuerySettings, SqliteStore,
    SuggestQuery,
};
use crawlstats::resolve::RequestsResolver;
use crawlstats::{AnalyticsConfig, AnalyticsError};
use std::env;

const VALUE_FLAGS: &[&str] = &["--urls-done"];

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|x| x == flag)
        .and_then(|idx| args.get(idx + 1))
        .map(String::as_str)
}

/// First argument that is neither a flag nor a flag's value
fn settings_path(args: &[String]) -> Option<&str> {
    let mut skip_next = false;
    for arg in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
        } else if !arg.starts_with("--") {
            return Some(arg.as_str());
        }
    }
    None
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let config = AnalyticsConfig::from_env();

    let path = settings_path(&args).ok_or_else(|| {
        AnalyticsError::Config("usage: crawl_query <settings.json> [--suggest] [--relevance]".to_string())
    })?;
    let settings = QuerySettings::from_json(&std::fs::read_to_string(path)?)?;
    let validation = FieldValidation::from_strict(config.strict_fields);

    log::info!("📖 Query store: {}", config.db_path.display());
    let store = SqliteStore::open(&config.db_path)?;

    let output = if args.iter().any(|a| a == "--suggest") {
        let relevance = args.iter().any(|a| a == "--relevance");
        let resolver = RequestsResolver::new(&store);
        let patterns = SuggestQuery::new(&store, FieldCatalog::crawl())
            .with_validation(validation)
            .with_limits(config.max_results, config.max_children)
            .query(&settings, &resolver, relevance)?;
        serde_json::to_string_pretty(&patterns)?
    } else {
        let mut query = MetricsQuery::new(&store, FieldCatalog::crawl()).with_validation(validation);
        if let Some(raw) = flag_value(&args, "--urls-done") {
            let urls_done: u64 = raw
                .parse()
                .map_err(|_| AnalyticsError::Config(format!("invalid --urls-done value '{}'", raw)))?;
            query = query.with_hook(MinPagesHook::from_urls_done(urls_done));
        }
        serde_json::to_string_pretty(&query.query(&settings)?)?
    };

    println!("{}", output);
    Ok(())
}
