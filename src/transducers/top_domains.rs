//! Top external domains by outbound links
//!
//! Groups external outlinks by destination domain, counts follow and
//! nofollow links, samples the most linked destinations and keeps the
//! N domains with the most unique follow links.

use super::UrlId;
use crate::error::Result;
use crate::resolve::DisplayResolver;
use crate::streams::{Row, OUTLINKS_RAW};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use url::Url;

/// Bit of the follow mask set on links pointing inside the crawled site
pub const INTERNAL_LINK_BIT: i64 = 4;

/// One outbound link row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutLink {
    pub src: UrlId,
    pub link_type: String,
    pub follow: i64,
    pub dst_url_id: i64,
    pub external_url: String,
}

impl OutLink {
    pub fn new(src: UrlId, link_type: &str, follow: i64, dst_url_id: i64, external_url: &str) -> Self {
        Self {
            src,
            link_type: link_type.to_string(),
            follow,
            dst_url_id,
            external_url: external_url.to_string(),
        }
    }

    /// Read a row of the `urllinks` stream
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            src: row.int(OUTLINKS_RAW.field_idx("id")?).unwrap_or_default(),
            link_type: row
                .str(OUTLINKS_RAW.field_idx("link_type")?)
                .unwrap_or_default()
                .to_string(),
            follow: row.int(OUTLINKS_RAW.field_idx("follow")?).unwrap_or_default(),
            dst_url_id: row
                .int(OUTLINKS_RAW.field_idx("dst_url_id")?)
                .unwrap_or(-1),
            external_url: row
                .str(OUTLINKS_RAW.field_idx("external_url")?)
                .unwrap_or_default()
                .to_string(),
        })
    }

    pub fn is_external(&self) -> bool {
        self.link_type == "a" && self.follow & INTERNAL_LINK_BIT == 0
    }

    /// Follow when no flag other than the internal bit is set
    pub fn is_follow(&self) -> bool {
        self.follow & !INTERNAL_LINK_BIT == 0
    }
}

/// A destination url with the number of distinct pages linking to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDestination<T = UrlId> {
    pub url: String,
    pub unique_links: usize,
    pub sample_sources: Vec<T>,
}

impl<T> LinkDestination<T> {
    pub fn new(url: &str, unique_links: usize, sample_sources: Vec<T>) -> Self {
        Self {
            url: url.to_string(),
            unique_links,
            sample_sources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainLinkStats<T = UrlId> {
    pub domain: String,
    /// Follow links, duplicates included
    pub follow_links: usize,
    pub nofollow_links: usize,
    /// Distinct (source, destination) pairs among follow links
    pub unique_follow_links: usize,
    pub sample_follow_links: Vec<LinkDestination<T>>,
    pub sample_nofollow_links: Vec<LinkDestination<T>>,
}

/// Sample sizes used when describing a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainSampling {
    /// Destinations kept per domain
    pub destinations: usize,
    /// Source url ids kept per destination
    pub sources: usize,
}

impl Default for DomainSampling {
    fn default() -> Self {
        Self {
            destinations: 100,
            sources: 3,
        }
    }
}

pub fn filter_external_outlinks<I>(links: I) -> impl Iterator<Item = OutLink>
where
    I: IntoIterator<Item = OutLink>,
{
    links.into_iter().filter(OutLink::is_external)
}

/// Host of an absolute url, if it contains at least one dot
fn dotted_host(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    host.contains('.').then(|| host.to_string())
}

/// Drop links whose destination is not an absolute url with a dotted host
pub fn filter_invalid_destination_urls<I>(links: I) -> impl Iterator<Item = OutLink>
where
    I: IntoIterator<Item = OutLink>,
{
    links
        .into_iter()
        .filter(|link| dotted_host(&link.external_url).is_some())
}

/// Grouping key on the destination's full host name
pub fn full_domain_key(link: &OutLink) -> Option<String> {
    dotted_host(&link.external_url)
}

/// Grouping key on the last two labels of the destination host
pub fn second_level_domain_key(link: &OutLink) -> Option<String> {
    let host = dotted_host(&link.external_url)?;
    let labels: Vec<&str> = host.rsplitn(3, '.').take(2).collect();
    Some(format!("{}.{}", labels.get(1)?, labels.first()?))
}

/// Distinct (source, destination) pairs
pub fn count_unique_links<'l, I>(links: I) -> usize
where
    I: IntoIterator<Item = &'l OutLink>,
{
    links
        .into_iter()
        .map(|link| (link.src, link.external_url.as_str()))
        .collect::<HashSet<_>>()
        .len()
}

pub fn count_unique_follow_links<'l, I>(links: I) -> usize
where
    I: IntoIterator<Item = &'l OutLink>,
{
    count_unique_links(links.into_iter().filter(|link| link.is_follow()))
}

/// Stats of one destination: distinct sources and the first of them
pub fn compute_link_destination_stats<'l, I>(links: I, url: &str, sources: usize) -> LinkDestination
where
    I: IntoIterator<Item = &'l OutLink>,
{
    let mut seen = HashSet::new();
    let mut sample = Vec::new();
    for link in links.into_iter().filter(|link| link.external_url == url) {
        if seen.insert(link.src) && sample.len() < sources {
            sample.push(link.src);
        }
    }
    LinkDestination::new(url, seen.len(), sample)
}

/// Most linked destinations, ranked by distinct sources (ties keep first seen order)
pub fn compute_sample_links<'l, I>(links: I, sampling: DomainSampling) -> Vec<LinkDestination>
where
    I: IntoIterator<Item = &'l OutLink>,
{
    // destination -> its links, in first seen order
    let mut order: Vec<&str> = Vec::new();
    let mut by_url: HashMap<&str, Vec<&OutLink>> = HashMap::new();

    for link in links {
        let url = link.external_url.as_str();
        by_url
            .entry(url)
            .or_insert_with(|| {
                order.push(url);
                Vec::new()
            })
            .push(link);
    }

    let mut destinations: Vec<LinkDestination> = order
        .into_iter()
        .filter_map(|url| {
            let group = by_url.remove(url)?;
            Some(compute_link_destination_stats(group, url, sampling.sources))
        })
        .collect();

    // stable sort keeps first seen order among equal counts
    destinations.sort_by(|a, b| b.unique_links.cmp(&a.unique_links));
    destinations.truncate(sampling.destinations);
    destinations
}

/// Counts and samples of one domain's links
pub fn compute_domain_link_counts(
    domain: &str,
    links: &[OutLink],
    sampling: DomainSampling,
) -> DomainLinkStats {
    let (follow, nofollow): (Vec<&OutLink>, Vec<&OutLink>) =
        links.iter().partition(|link| link.is_follow());

    DomainLinkStats {
        domain: domain.to_string(),
        follow_links: follow.len(),
        nofollow_links: nofollow.len(),
        unique_follow_links: count_unique_links(follow.iter().copied()),
        sample_follow_links: compute_sample_links(follow.iter().copied(), sampling),
        sample_nofollow_links: compute_sample_links(nofollow.iter().copied(), sampling),
    }
}

/// Group links by `key`, keeping groups in first seen order
fn group_links<I, F>(links: I, key: F) -> Vec<(String, Vec<OutLink>)>
where
    I: IntoIterator<Item = OutLink>,
    F: Fn(&OutLink) -> Option<String>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<OutLink>)> = Vec::new();

    for link in links {
        let Some(domain) = key(&link) else {
            continue;
        };
        match index.get(&domain) {
            Some(&pos) => groups[pos].1.push(link),
            None => {
                index.insert(domain.clone(), groups.len());
                groups.push((domain, vec![link]));
            }
        }
    }
    groups
}

/// Top `n` domains by unique follow links, paired with that count
///
/// Links for which `key` yields no domain are skipped. Domains without any
/// follow link are left out.
pub fn compute_top_domains<I, F>(
    links: I,
    n: usize,
    key: F,
    sampling: DomainSampling,
) -> Vec<(usize, DomainLinkStats)>
where
    I: IntoIterator<Item = OutLink>,
    F: Fn(&OutLink) -> Option<String>,
{
    let groups = group_links(links, key);
    let total = groups.len();

    let mut ranked: Vec<(usize, DomainLinkStats)> = groups
        .iter()
        .map(|(domain, links)| compute_domain_link_counts(domain, links, sampling))
        .filter(|stats| stats.follow_links > 0)
        .map(|stats| (stats.unique_follow_links, stats))
        .collect();

    ranked.sort_by(|(a_unique, a), (b_unique, b)| {
        b_unique
            .cmp(a_unique)
            .then_with(|| b.follow_links.cmp(&a.follow_links))
    });
    ranked.truncate(n);

    log::info!("✅ Ranked {} of {} domains", ranked.len(), total);
    ranked
}

pub fn compute_top_full_domains<I>(
    links: I,
    n: usize,
    sampling: DomainSampling,
) -> Vec<(usize, DomainLinkStats)>
where
    I: IntoIterator<Item = OutLink>,
{
    compute_top_domains(links, n, full_domain_key, sampling)
}

pub fn compute_top_second_level_domains<I>(
    links: I,
    n: usize,
    sampling: DomainSampling,
) -> Vec<(usize, DomainLinkStats)>
where
    I: IntoIterator<Item = OutLink>,
{
    compute_top_domains(links, n, second_level_domain_key, sampling)
}

/// Replace sampled source url ids by display urls
///
/// All ids of the result set are resolved with a single resolver call.
/// Ids the resolver does not know are dropped from the samples.
pub fn resolve_sample_url_ids<R>(
    results: Vec<(usize, DomainLinkStats)>,
    resolver: &R,
) -> Result<Vec<(usize, DomainLinkStats<String>)>>
where
    R: DisplayResolver<UrlId> + ?Sized,
{
    let mut ids: Vec<UrlId> = results
        .iter()
        .flat_map(|(_, stats)| {
            stats
                .sample_follow_links
                .iter()
                .chain(&stats.sample_nofollow_links)
        })
        .flat_map(|dest| dest.sample_sources.iter().copied())
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let resolved = resolver.resolve_batch(&ids)?;
    let unknown = ids.iter().filter(|id| !resolved.contains_key(id)).count();
    if unknown > 0 {
        log::warn!("⚠️  {} sampled url ids could not be resolved", unknown);
    }

    let resolve_all = |destinations: Vec<LinkDestination>| -> Vec<LinkDestination<String>> {
        destinations
            .into_iter()
            .map(|dest| LinkDestination {
                url: dest.url,
                unique_links: dest.unique_links,
                sample_sources: dest
                    .sample_sources
                    .iter()
                    .filter_map(|id| resolved.get(id).cloned())
                    .collect(),
            })
            .collect()
    };

    Ok(results
        .into_iter()
        .map(|(count, stats)| {
            let resolved_stats = DomainLinkStats {
                domain: stats.domain,
                follow_links: stats.follow_links,
                nofollow_links: stats.nofollow_links,
                unique_follow_links: stats.unique_follow_links,
                sample_follow_links: resolve_all(stats.sample_follow_links),
                sample_nofollow_links: resolve_all(stats.sample_nofollow_links),
            };
            (count, resolved_stats)
        })
        .collect())
}
