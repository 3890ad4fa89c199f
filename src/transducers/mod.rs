//! Batch derivations over merged crawl streams
//!
//! - `duplicates`: duplicate title / h1 / description detection
//! - `top_domains`: top external domains by outbound links

pub mod duplicates;
pub mod top_domains;

/// Crawl-wide url identifier
pub type UrlId = i64;

pub use duplicates::{
    detect_from_joins, get_duplicate_metadata, ContentType, DuplicateDetector, DuplicateRecord,
};
pub use top_domains::{
    compute_top_domains, compute_top_full_domains, compute_top_second_level_domains,
    count_unique_follow_links, count_unique_links, filter_external_outlinks,
    filter_invalid_destination_urls, resolve_sample_url_ids, DomainLinkStats, DomainSampling,
    LinkDestination, OutLink,
};
