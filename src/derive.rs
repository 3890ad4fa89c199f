//! Batch derivation over a crawl directory
//!
//! Reads the shard streams, derives duplicate records and both domain
//! rankings, then hands them to a sink. The sink is flushed only when every
//! stream was read without error.

use crate::config::AnalyticsConfig;
use crate::error::Result;
use crate::resolve::DisplayResolver;
use crate::sinks::{DomainRanking, RecordSink};
use crate::streams::{RowStream, CONTENTS, OUTLINKS_RAW, PATTERNS};
use crate::transducers::{
    compute_top_full_domains, compute_top_second_level_domains, filter_external_outlinks,
    filter_invalid_destination_urls, get_duplicate_metadata, resolve_sample_url_ids,
    DomainLinkStats, DomainSampling, DuplicateRecord, OutLink, UrlId,
};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationSummary {
    pub duplicate_records: usize,
    pub full_domains: usize,
    pub second_level_domains: usize,
}

/// Resolved full-host and second-level rankings
pub struct TopDomains {
    pub full: Vec<(usize, DomainLinkStats<String>)>,
    pub second_level: Vec<(usize, DomainLinkStats<String>)>,
}

pub fn derive_duplicates(data_dir: &Path, sample_size: usize) -> Result<Vec<DuplicateRecord>> {
    let patterns = RowStream::from_directory(PATTERNS, data_dir)?;
    let contents = RowStream::from_directory(CONTENTS, data_dir)?;
    let (patterns_status, contents_status) = (patterns.status(), contents.status());

    let records = get_duplicate_metadata(patterns, contents, sample_size)?;
    patterns_status.check()?;
    contents_status.check()?;
    Ok(records)
}

pub fn derive_top_domains<R>(config: &AnalyticsConfig, resolver: &R) -> Result<TopDomains>
where
    R: DisplayResolver<UrlId> + ?Sized,
{
    let stream = RowStream::from_directory(OUTLINKS_RAW, &config.data_dir)?;
    let status = stream.status();
    let links = stream
        .map(|row| OutLink::from_row(&row))
        .collect::<Result<Vec<_>>>()?;
    status.check()?;

    let total = links.len();
    let links: Vec<OutLink> =
        filter_invalid_destination_urls(filter_external_outlinks(links)).collect();
    log::info!("📥 {} external links kept of {}", links.len(), total);

    let sampling = DomainSampling {
        destinations: config.domain_sample_size,
        sources: config.domain_sample_sources,
    };
    let full = compute_top_full_domains(links.clone(), config.top_domains_n, sampling);
    let second_level = compute_top_second_level_domains(links, config.top_domains_n, sampling);

    Ok(TopDomains {
        full: resolve_sample_url_ids(full, resolver)?,
        second_level: resolve_sample_url_ids(second_level, resolver)?,
    })
}

/// Derive every record kind and write it to `sink`
pub fn run_derivation<R>(
    config: &AnalyticsConfig,
    resolver: &R,
    sink: &mut dyn RecordSink,
) -> Result<DerivationSummary>
where
    R: DisplayResolver<UrlId> + ?Sized,
{
    let duplicates = derive_duplicates(&config.data_dir, config.duplicate_sample_size)?;
    let domains = derive_top_domains(config, resolver)?;

    sink.write_duplicates(&duplicates)?;
    sink.write_domains(DomainRanking::Full, &domains.full)?;
    sink.write_domains(DomainRanking::SecondLevel, &domains.second_level)?;
    sink.flush()?;

    Ok(DerivationSummary {
        duplicate_records: duplicates.len(),
        full_domains: domains.full.len(),
        second_level_domains: domains.second_level.len(),
    })
}
