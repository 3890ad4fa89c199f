//! Analytics configuration from environment variables

use crate::error::AnalyticsError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Output backend for derived records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Jsonl,
    Sqlite,
}

impl FromStr for BackendType {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jsonl" => Ok(BackendType::Jsonl),
            "sqlite" => Ok(BackendType::Sqlite),
            other => Err(AnalyticsError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Parse `--backend <jsonl|sqlite>` from command line arguments (default: JSONL)
pub fn parse_backend_from_args(args: &[String]) -> BackendType {
    args.iter()
        .position(|x| x == "--backend")
        .and_then(|idx| args.get(idx + 1))
        .and_then(|s| match s.parse() {
            Ok(backend) => Some(backend),
            Err(e) => {
                log::warn!("⚠️  {}, falling back to JSONL", e);
                None
            }
        })
        .unwrap_or(BackendType::Jsonl)
}

/// Configuration for the batch derivation and query runners
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Directory holding `<prefix>.txt.<part_id>` shard files
    pub data_dir: PathBuf,

    /// SQLite database used as tabular store and SQLite sink
    pub db_path: PathBuf,

    /// Output directory for the JSONL sink
    pub output_path: PathBuf,

    /// Number of domains kept by the top domains ranking
    pub top_domains_n: usize,

    /// Number of destinations sampled per domain
    pub domain_sample_size: usize,

    /// Number of source url ids kept per sampled destination
    pub domain_sample_sources: usize,

    /// Number of other url ids kept per duplicate record
    pub duplicate_sample_size: usize,

    /// Unknown query fields are errors (true) or warnings (false)
    pub strict_fields: bool,

    /// Pattern query result list truncation
    pub max_results: usize,

    /// Pattern query children truncation
    pub max_children: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            db_path: PathBuf::from("data/crawlstats.db"),
            output_path: PathBuf::from("data/out"),
            top_domains_n: 100,
            domain_sample_size: 100,
            domain_sample_sources: 3,
            duplicate_sample_size: 10,
            strict_fields: true,
            max_results: 30,
            max_children: 10,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl AnalyticsConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `CRAWLSTATS_DATA_DIR` (default: data)
    /// - `CRAWLSTATS_DB_PATH` (default: data/crawlstats.db)
    /// - `CRAWLSTATS_OUTPUT_PATH` (default: data/out)
    /// - `TOP_DOMAINS_N` (default: 100)
    /// - `DOMAIN_SAMPLE_SIZE` (default: 100)
    /// - `DOMAIN_SAMPLE_SOURCES` (default: 3)
    /// - `DUPLICATE_SAMPLE_SIZE` (default: 10)
    /// - `STRICT_FIELDS` (default: true)
    /// - `MAX_RESULTS` (default: 30)
    /// - `MAX_CHILDREN` (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            data_dir: env::var("CRAWLSTATS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),

            db_path: env::var("CRAWLSTATS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),

            output_path: env::var("CRAWLSTATS_OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_path),

            top_domains_n: env_parse("TOP_DOMAINS_N", defaults.top_domains_n),
            domain_sample_size: env_parse("DOMAIN_SAMPLE_SIZE", defaults.domain_sample_size),
            domain_sample_sources: env_parse(
                "DOMAIN_SAMPLE_SOURCES",
                defaults.domain_sample_sources,
            ),
            duplicate_sample_size: env_parse(
                "DUPLICATE_SAMPLE_SIZE",
                defaults.duplicate_sample_size,
            ),
            strict_fields: env_parse("STRICT_FIELDS", defaults.strict_fields),
            max_results: env_parse("MAX_RESULTS", defaults.max_results),
            max_children: env_parse("MAX_CHILDREN", defaults.max_children),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases touch the same variables, keep them in one test to avoid races.
    #[test]
    fn test_config_from_env() {
        env::remove_var("CRAWLSTATS_DATA_DIR");
        env::remove_var("TOP_DOMAINS_N");
        env::remove_var("STRICT_FIELDS");

        let config = AnalyticsConfig::from_env();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.top_domains_n, 100);
        assert!(config.strict_fields);
        assert_eq!(config.max_results, 30);
        assert_eq!(config.max_children, 10);

        env::set_var("CRAWLSTATS_DATA_DIR", "/tmp/crawl_42");
        env::set_var("TOP_DOMAINS_N", "5");
        env::set_var("STRICT_FIELDS", "false");

        let config = AnalyticsConfig::from_env();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/crawl_42"));
        assert_eq!(config.top_domains_n, 5);
        assert!(!config.strict_fields);

        env::remove_var("CRAWLSTATS_DATA_DIR");
        env::remove_var("TOP_DOMAINS_N");
        env::remove_var("STRICT_FIELDS");
    }

    #[test]
    fn test_backend_from_args() {
        let args: Vec<String> = vec!["crawl_metrics".into(), "--backend".into(), "sqlite".into()];
        assert_eq!(parse_backend_from_args(&args), BackendType::Sqlite);

        let args: Vec<String> = vec!["crawl_metrics".into()];
        assert_eq!(parse_backend_from_args(&args), BackendType::Jsonl);

        let args: Vec<String> = vec!["crawl_metrics".into(), "--backend".into(), "csv".into()];
        assert_eq!(parse_backend_from_args(&args), BackendType::Jsonl);
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("SQLite".parse::<BackendType>().unwrap(), BackendType::Sqlite);
        assert_eq!("jsonl".parse::<BackendType>().unwrap(), BackendType::Jsonl);
        assert!(matches!(
            "csv".parse::<BackendType>(),
            Err(AnalyticsError::Config(_))
        ));
    }
}
