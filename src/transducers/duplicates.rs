//! Duplicate metadata detection
//!
//! Consumes url ids joined with their content rows and flags, per
//! mandatory content type, every url whose first content hash is shared
//! with other urls of the crawl.

use super::UrlId;
use crate::error::Result;
use crate::streams::{JoinRecord, Row, SortedStreamMerger, Value, CONTENTS, PATTERNS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Name of the secondary stream holding content rows in a join
pub const CONTENTS_STREAM: &str = "contents";

/// Page content kinds, ordered by their numeric id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Title = 1,
    H1 = 2,
    H2 = 3,
    Description = 4,
    H3 = 5,
}

impl ContentType {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(ContentType::Title),
            2 => Some(ContentType::H1),
            3 => Some(ContentType::H2),
            4 => Some(ContentType::Description),
            5 => Some(ContentType::H3),
            _ => None,
        }
    }

    pub fn id(&self) -> i64 {
        *self as i64
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Title => "title",
            ContentType::H1 => "h1",
            ContentType::H2 => "h2",
            ContentType::Description => "description",
            ContentType::H3 => "h3",
        }
    }

    /// Title, h1 and description are checked for duplication
    pub fn is_mandatory(&self) -> bool {
        matches!(
            self,
            ContentType::Title | ContentType::H1 | ContentType::Description
        )
    }
}

/// Duplicate status of one (url, content type)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateRecord {
    pub url_id: UrlId,
    pub content_type: ContentType,
    /// Number of contents of this type found on the page
    pub filled_nb: usize,
    /// Size of the url group sharing the first content hash
    pub duplicates_nb: usize,
    /// True for the smallest url id of the group
    pub is_first: bool,
    /// Other urls of the group, self excluded
    pub duplicate_urls: Vec<UrlId>,
}

impl DuplicateRecord {
    /// Row laid out as the `urlcontentsduplicate` stream
    pub fn to_row(&self) -> Row {
        Row::new(vec![
            Value::Int(self.url_id),
            Value::Int(self.content_type.id()),
            Value::Int(self.filled_nb as i64),
            Value::Int(self.duplicates_nb as i64),
            Value::Bool(self.is_first),
            Value::from(self.duplicate_urls.clone()),
        ])
    }
}

/// Two pass duplicate detector
///
/// Pass 1 ([`observe`](Self::observe)) is fed one url at a time in
/// ascending url id order. Pass 2 ([`finish`](Self::finish)) runs once all
/// hash groups are materialized.
pub struct DuplicateDetector {
    sample_size: usize,
    hashes: HashMap<ContentType, HashMap<i64, Vec<UrlId>>>,
    url_to_hash: BTreeMap<UrlId, BTreeMap<ContentType, i64>>,
    filled: HashMap<UrlId, BTreeMap<ContentType, usize>>,
    min_url_id: Option<UrlId>,
    max_url_id: Option<UrlId>,
}

impl DuplicateDetector {
    pub fn new(sample_size: usize) -> Self {
        Self {
            sample_size,
            hashes: HashMap::new(),
            url_to_hash: BTreeMap::new(),
            filled: HashMap::new(),
            min_url_id: None,
            max_url_id: None,
        }
    }

    /// Record the `(content type id, hash)` pairs of one url
    ///
    /// Only the first hash of each mandatory type is grouped; every
    /// content is counted.
    pub fn observe<I>(&mut self, url_id: UrlId, contents: I)
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        if self.min_url_id.is_none() {
            self.min_url_id = Some(url_id);
        }
        self.max_url_id = Some(url_id);

        for (type_id, hash) in contents {
            let Some(content_type) = ContentType::from_id(type_id) else {
                log::debug!("Ignoring unknown content type {} for url {}", type_id, url_id);
                continue;
            };

            *self
                .filled
                .entry(url_id)
                .or_default()
                .entry(content_type)
                .or_insert(0) += 1;

            if !content_type.is_mandatory() {
                continue;
            }

            let seen = self.url_to_hash.entry(url_id).or_default();
            if seen.contains_key(&content_type) {
                continue;
            }
            seen.insert(content_type, hash);
            self.hashes
                .entry(content_type)
                .or_default()
                .entry(hash)
                .or_default()
                .push(url_id);
        }
    }

    /// Emit records for every hashed url in [first url seen, last url seen]
    pub fn finish(self) -> Vec<DuplicateRecord> {
        let (Some(min_url_id), Some(max_url_id)) = (self.min_url_id, self.max_url_id) else {
            return Vec::new();
        };
        if min_url_id > max_url_id {
            log::warn!(
                "⚠️  Url ids are not sorted (first {} > last {}), no duplicate records emitted",
                min_url_id,
                max_url_id
            );
            return Vec::new();
        }

        let mut records = Vec::new();
        for (&url_id, url_hashes) in self.url_to_hash.range(min_url_id..=max_url_id) {
            let Some(filled) = self.filled.get(&url_id) else {
                continue;
            };

            for (&content_type, &filled_nb) in filled {
                if !content_type.is_mandatory() {
                    records.push(DuplicateRecord {
                        url_id,
                        content_type,
                        filled_nb,
                        duplicates_nb: 0,
                        is_first: true,
                        duplicate_urls: Vec::new(),
                    });
                    continue;
                }

                let Some(group) = url_hashes
                    .get(&content_type)
                    .and_then(|hash| self.hashes.get(&content_type)?.get(hash))
                else {
                    continue;
                };

                let first_url_id = group.iter().min().copied();
                records.push(DuplicateRecord {
                    url_id,
                    content_type,
                    filled_nb,
                    duplicates_nb: group.len(),
                    is_first: first_url_id == Some(url_id),
                    duplicate_urls: group
                        .iter()
                        .copied()
                        .filter(|&other| other != url_id)
                        .take(self.sample_size)
                        .collect(),
                });
            }
        }

        log::info!(
            "✅ {} duplicate records for urls {}..={}",
            records.len(),
            min_url_id,
            max_url_id
        );
        records
    }
}

/// Run the detector over join records of patterns with their contents
pub fn detect_from_joins<K, I>(joins: I, sample_size: usize) -> Result<Vec<DuplicateRecord>>
where
    I: IntoIterator<Item = JoinRecord<K, Row>>,
{
    let id_idx = PATTERNS.field_idx("id")?;
    let type_idx = CONTENTS.field_idx("content_type")?;
    let hash_idx = CONTENTS.field_idx("hash")?;

    let mut detector = DuplicateDetector::new(sample_size);
    for join in joins {
        let Some(url_id) = join.primary.int(id_idx) else {
            continue;
        };
        let contents = join
            .matches(CONTENTS_STREAM)
            .iter()
            .filter_map(|row| Some((row.int(type_idx)?, row.int(hash_idx)?)));
        detector.observe(url_id, contents);
    }
    Ok(detector.finish())
}

/// Join the patterns and contents streams by url id and detect duplicates
pub fn get_duplicate_metadata<'a, P, C>(
    patterns: P,
    contents: C,
    sample_size: usize,
) -> Result<Vec<DuplicateRecord>>
where
    P: IntoIterator<Item = Row>,
    P::IntoIter: 'a,
    C: IntoIterator<Item = Row>,
    C::IntoIter: 'a,
{
    let joins = SortedStreamMerger::by_column(patterns, PATTERNS.field_idx("id")?)
        .with_secondary_column(CONTENTS_STREAM, contents, CONTENTS.field_idx("id")?);
    detect_from_joins(joins, sample_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_pattern(id: i64) -> Row {
        Row::new(vec![
            id.into(),
            "http".into(),
            "www.site.com".into(),
            format!("/{}", id).into(),
            "".into(),
        ])
    }

    fn create_test_content(id: i64, content_type: ContentType, hash: i64) -> Row {
        Row::new(vec![
            id.into(),
            content_type.id().into(),
            hash.into(),
            "text".into(),
        ])
    }

    fn find(records: &[DuplicateRecord], url_id: UrlId, ct: ContentType) -> &DuplicateRecord {
        records
            .iter()
            .find(|r| r.url_id == url_id && r.content_type == ct)
            .unwrap()
    }

    #[test]
    fn test_title_shared_by_two_urls() {
        let patterns = vec![create_test_pattern(5), create_test_pattern(9)];
        let contents = vec![
            create_test_content(5, ContentType::Title, 1234),
            create_test_content(9, ContentType::Title, 1234),
        ];

        let records = get_duplicate_metadata(patterns, contents, 10).unwrap();
        assert_eq!(
            records,
            vec![
                DuplicateRecord {
                    url_id: 5,
                    content_type: ContentType::Title,
                    filled_nb: 1,
                    duplicates_nb: 2,
                    is_first: true,
                    duplicate_urls: vec![9],
                },
                DuplicateRecord {
                    url_id: 9,
                    content_type: ContentType::Title,
                    filled_nb: 1,
                    duplicates_nb: 2,
                    is_first: false,
                    duplicate_urls: vec![5],
                },
            ]
        );
    }

    #[test]
    fn test_only_first_hash_is_grouped() {
        let patterns = vec![create_test_pattern(1), create_test_pattern(2), create_test_pattern(3)];
        let contents = vec![
            create_test_content(1, ContentType::H1, 10),
            create_test_content(1, ContentType::H1, 20),
            create_test_content(2, ContentType::H1, 20),
            create_test_content(3, ContentType::H1, 10),
        ];

        let records = get_duplicate_metadata(patterns, contents, 10).unwrap();

        let first = find(&records, 1, ContentType::H1);
        assert_eq!(first.filled_nb, 2);
        assert_eq!(first.duplicates_nb, 2);
        assert!(first.is_first);
        assert_eq!(first.duplicate_urls, vec![3]);

        // url 2 does not share url 1's second h1
        let second = find(&records, 2, ContentType::H1);
        assert_eq!(second.duplicates_nb, 1);
        assert!(second.is_first);
        assert!(second.duplicate_urls.is_empty());
    }

    #[test]
    fn test_exactly_one_first_per_group() {
        let ids: Vec<i64> = (1..=15).collect();
        let patterns: Vec<Row> = ids.iter().map(|&id| create_test_pattern(id)).collect();
        let contents: Vec<Row> = ids
            .iter()
            .map(|&id| create_test_content(id, ContentType::Description, 77))
            .collect();

        let records = get_duplicate_metadata(patterns, contents, 10).unwrap();
        assert_eq!(records.len(), 15);
        assert_eq!(records.iter().filter(|r| r.is_first).count(), 1);
        assert!(records.iter().all(|r| r.duplicates_nb == 15));
        assert!(find(&records, 1, ContentType::Description).is_first);

        let last = find(&records, 15, ContentType::Description);
        assert_eq!(last.duplicate_urls, (1..=10).collect::<Vec<_>>());
        let middle = find(&records, 4, ContentType::Description);
        assert_eq!(middle.duplicate_urls, vec![1, 2, 3, 5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_optional_types_are_counted_only() {
        let patterns = vec![create_test_pattern(1), create_test_pattern(2)];
        let contents = vec![
            create_test_content(1, ContentType::Title, 5),
            create_test_content(1, ContentType::H2, 8),
            create_test_content(1, ContentType::H2, 8),
            create_test_content(1, ContentType::H3, 9),
            create_test_content(2, ContentType::H2, 8),
        ];

        let records = get_duplicate_metadata(patterns, contents, 10).unwrap();
        let types: Vec<ContentType> = records.iter().map(|r| r.content_type).collect();
        assert_eq!(types, vec![ContentType::Title, ContentType::H2, ContentType::H3]);

        let h2 = find(&records, 1, ContentType::H2);
        assert_eq!(h2.filled_nb, 2);
        assert_eq!(h2.duplicates_nb, 0);
        assert!(h2.is_first);
        assert!(h2.duplicate_urls.is_empty());

        // url 2 has no mandatory content, nothing is emitted for it
        assert!(records.iter().all(|r| r.url_id != 2));
    }

    #[test]
    fn test_unknown_content_type_is_ignored() {
        let mut detector = DuplicateDetector::new(10);
        detector.observe(1, vec![(42, 1), (1, 7)]);
        let records = detector.finish();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content_type, ContentType::Title);
    }

    #[test]
    fn test_empty_input() {
        let records = get_duplicate_metadata(Vec::new(), Vec::new(), 10).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_unsorted_url_ids_emit_nothing() {
        let mut detector = DuplicateDetector::new(10);
        detector.observe(9, [(ContentType::Title.id(), 7)]);
        detector.observe(5, [(ContentType::Title.id(), 7)]);
        assert!(detector.finish().is_empty());
    }

    #[test]
    fn test_record_row_layout() {
        let record = DuplicateRecord {
            url_id: 3,
            content_type: ContentType::H1,
            filled_nb: 1,
            duplicates_nb: 3,
            is_first: false,
            duplicate_urls: vec![1, 2],
        };
        let row = record.to_row();
        assert_eq!(row.len(), crate::streams::CONTENTS_DUPLICATE.headers.len());
        assert_eq!(row.get(5), &Value::from(vec![1i64, 2]));
    }
}
