//! Snapshot statistics: data source and cross-source summaries, the entity
//! size breakdown, and the sample lists behind each of them.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::config::ConfigIndex;
use crate::error::EvidenceError;
use crate::source::EvidenceStore;
use crate::table::{fmt_statistic, Align, Cell, Table};

pub const SNAPSHOT_SOURCES: [&str; 2] = ["pocSnapshot", "pocCalculate"];

/// Up to two entity ids; pair samples name the first two entities of a match.
pub type SnapshotSample = Vec<i64>;

// ---------------------------------------------------------------------------
// Match levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLevel {
    Single,
    Duplicate,
    Ambiguous,
    Possible,
    Related,
}

/// Checked in order, first prefix wins.
const LEVEL_PREFIXES: [(&str, SampleLevel); 16] = [
    ("0", SampleLevel::Single),
    ("1", SampleLevel::Duplicate),
    ("2", SampleLevel::Ambiguous),
    ("3", SampleLevel::Possible),
    ("4", SampleLevel::Related),
    ("SINGLE", SampleLevel::Single),
    ("DUPLICATE", SampleLevel::Duplicate),
    ("AMBIGUOUS", SampleLevel::Ambiguous),
    ("POSSIBLE", SampleLevel::Possible),
    ("POSSIBLY", SampleLevel::Related),
    ("RELATED", SampleLevel::Related),
    ("S", SampleLevel::Single),
    ("D", SampleLevel::Duplicate),
    ("A", SampleLevel::Ambiguous),
    ("P", SampleLevel::Possible),
    ("R", SampleLevel::Related),
];

impl SampleLevel {
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim().to_uppercase();
        LEVEL_PREFIXES
            .iter()
            .find(|(prefix, _)| token.starts_with(prefix))
            .map(|(_, level)| *level)
    }

    pub fn sample_key(self) -> &'static str {
        match self {
            Self::Single => "SINGLE_SAMPLE",
            Self::Duplicate => "DUPLICATE_SAMPLE",
            Self::Ambiguous => "AMBIGUOUS_MATCH_SAMPLE",
            Self::Possible => "POSSIBLE_MATCH_SAMPLE",
            Self::Related => "POSSIBLY_RELATED_SAMPLE",
        }
    }

    /// Across data sources a duplicate is a match.
    pub fn cross_sample_key(self) -> &'static str {
        match self {
            Self::Duplicate => "MATCH_SAMPLE",
            other => other.sample_key(),
        }
    }

    /// Samples of a single entity are shown with `get`, the rest with `compare`.
    pub fn is_single_entity(self) -> bool {
        matches!(self, Self::Single | Self::Duplicate)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSourceStats {
    pub record_count: i64,
    pub entity_count: i64,
    pub compression: String,
    pub single_count: i64,
    pub duplicate_count: i64,
    pub ambiguous_count: i64,
    pub possible_count: i64,
    pub related_count: i64,
    pub samples: BTreeMap<String, Vec<SnapshotSample>>,
    pub cross_matches: BTreeMap<String, CrossMatchStats>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossMatchStats {
    pub match_count: i64,
    pub ambiguous_count: i64,
    pub possible_count: i64,
    pub related_count: i64,
    pub samples: BTreeMap<String, Vec<SnapshotSample>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySizeBucket {
    pub entity_size: i64,
    pub display: String,
    pub entity_count: i64,
    pub review_count: i64,
    /// Document order.
    pub review_reasons: Vec<(String, Vec<i64>)>,
    pub sample_entities: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct SnapshotDocument {
    data_sources: Option<BTreeMap<String, DataSourceStats>>,
    entity_sizes: Option<Vec<EntitySizeBucket>>,
    legacy_entity_sizes: bool,
}

fn int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn entity_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A sample is an entity id, or a space separated list naming a pair.
fn sample(value: &Value) -> Option<SnapshotSample> {
    let ids: Vec<i64> = match value {
        Value::Number(_) => entity_id(value).into_iter().collect(),
        Value::String(s) => s.split_whitespace().filter_map(|t| t.parse().ok()).take(2).collect(),
        _ => Vec::new(),
    };
    (!ids.is_empty()).then_some(ids)
}

fn samples(map: &Map<String, Value>) -> BTreeMap<String, Vec<SnapshotSample>> {
    map.iter()
        .filter(|(key, _)| key.ends_with("_SAMPLE"))
        .filter_map(|(key, value)| {
            let list = value.as_array()?;
            Some((key.clone(), list.iter().filter_map(sample).collect()))
        })
        .collect()
}

fn data_source_stats(map: &Map<String, Value>) -> DataSourceStats {
    // Older snapshots count matches, newer ones count entities.
    let suffix = if map.contains_key("DUPLICATE_COUNT") { "_COUNT" } else { "_ENTITY_COUNT" };
    let count = |level: &str| int(map.get(&format!("{level}{suffix}")));
    let compression = match map.get("COMPRESSION") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    };
    let cross_matches = match map.get("CROSS_MATCHES") {
        Some(Value::Object(cross)) => cross
            .iter()
            .filter_map(|(ds, body)| Some((ds.clone(), cross_match_stats(body.as_object()?))))
            .collect(),
        _ => BTreeMap::new(),
    };
    DataSourceStats {
        record_count: int(map.get("RECORD_COUNT")),
        entity_count: int(map.get("ENTITY_COUNT")),
        compression,
        single_count: int(map.get("SINGLE_COUNT")),
        duplicate_count: count("DUPLICATE"),
        ambiguous_count: count("AMBIGUOUS_MATCH"),
        possible_count: count("POSSIBLE_MATCH"),
        related_count: count("POSSIBLY_RELATED"),
        samples: samples(map),
        cross_matches,
    }
}

fn cross_match_stats(map: &Map<String, Value>) -> CrossMatchStats {
    let suffix = if map.contains_key("MATCH_COUNT") { "_COUNT" } else { "_ENTITY_COUNT" };
    let count = |level: &str| int(map.get(&format!("{level}{suffix}")));
    CrossMatchStats {
        match_count: count("MATCH"),
        ambiguous_count: count("AMBIGUOUS_MATCH"),
        possible_count: count("POSSIBLE_MATCH"),
        related_count: count("POSSIBLY_RELATED"),
        samples: samples(map),
    }
}

fn entity_size_bucket(map: &Map<String, Value>) -> Option<EntitySizeBucket> {
    let display = map.get("ENTITY_SIZE_DISPLAY")?;
    let display = match display {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let ids = |value: Option<&Value>| -> Vec<i64> {
        value
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(entity_id).collect())
            .unwrap_or_default()
    };
    let review_reasons = match map.get("REVIEW_REASONS") {
        Some(Value::Object(reasons)) => {
            reasons.iter().map(|(reason, list)| (reason.clone(), ids(Some(list)))).collect()
        }
        _ => Vec::new(),
    };
    Some(EntitySizeBucket {
        entity_size: int(map.get("ENTITY_SIZE")),
        display,
        entity_count: int(map.get("ENTITY_COUNT")),
        review_count: int(map.get("REVIEW_COUNT")),
        review_reasons,
        sample_entities: ids(map.get("SAMPLE_ENTITIES")),
    })
}

impl SnapshotDocument {
    pub fn is_snapshot(value: &Value) -> bool {
        value
            .get("SOURCE")
            .and_then(Value::as_str)
            .is_some_and(|s| SNAPSHOT_SOURCES.contains(&s))
    }

    pub fn from_value(value: &Value) -> Result<Self, EvidenceError> {
        if !Self::is_snapshot(value) {
            return Err(EvidenceError::Document(format!(
                "expected a snapshot file, found source {}",
                value.get("SOURCE").unwrap_or(&Value::Null)
            )));
        }

        let data_sources = value.get("DATA_SOURCES").and_then(Value::as_object).map(|sources| {
            sources
                .iter()
                .filter_map(|(code, body)| Some((code.clone(), data_source_stats(body.as_object()?))))
                .collect()
        });

        let mut legacy_entity_sizes = false;
        let entity_sizes = value.get("ENTITY_SIZE_BREAKDOWN").and_then(Value::as_array).map(|list| {
            list.iter()
                .filter_map(Value::as_object)
                .filter_map(|bucket| {
                    let parsed = entity_size_bucket(bucket);
                    legacy_entity_sizes |= parsed.is_none();
                    parsed
                })
                .collect::<Vec<_>>()
        });
        if legacy_entity_sizes {
            log::debug!("snapshot entity size breakdown lacks ENTITY_SIZE_DISPLAY");
        }

        Ok(Self { data_sources, entity_sizes, legacy_entity_sizes })
    }

    pub fn data_sources(&self) -> Result<&BTreeMap<String, DataSourceStats>, EvidenceError> {
        self.data_sources.as_ref().ok_or_else(|| {
            EvidenceError::Document("the loaded snapshot has no data source statistics".to_string())
        })
    }

    pub fn entity_sizes(&self) -> Result<&[EntitySizeBucket], EvidenceError> {
        if self.legacy_entity_sizes {
            return Err(EvidenceError::Document(
                "the loaded snapshot has an older entity size structure, re-compute it with the latest snapshot tool"
                    .to_string(),
            ));
        }
        self.entity_sizes.as_deref().ok_or_else(|| {
            EvidenceError::Document("the loaded snapshot has no entity size breakdown".to_string())
        })
    }
}

// ---------------------------------------------------------------------------
// Sample lists
// ---------------------------------------------------------------------------

/// Samples selected for browsing.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleList {
    /// Shown above each sample while browsing.
    pub review_title: String,
    pub single_entity: bool,
    pub ambiguous: bool,
    pub samples: Vec<SnapshotSample>,
}

fn parse_level(token: &str) -> Result<SampleLevel, EvidenceError> {
    SampleLevel::parse(token).ok_or_else(|| EvidenceError::argument(token, "not a valid match level"))
}

pub fn data_source_samples(
    doc: &SnapshotDocument,
    data_source: &str,
    level: &str,
) -> Result<SampleList, EvidenceError> {
    let data_source = data_source.to_uppercase();
    let stats = doc
        .data_sources()?
        .get(&data_source)
        .ok_or_else(|| EvidenceError::argument(&data_source, "not a valid data source"))?;
    let level = parse_level(level)?;
    let key = level.sample_key();
    Ok(SampleList {
        review_title: format!("DATA SOURCE SUMMARY FOR: {data_source} ({key})"),
        single_entity: level.is_single_entity(),
        ambiguous: level == SampleLevel::Ambiguous,
        samples: stats.samples.get(key).cloned().unwrap_or_default(),
    })
}

pub fn cross_source_samples(
    doc: &SnapshotDocument,
    data_source1: &str,
    data_source2: &str,
    level: &str,
) -> Result<SampleList, EvidenceError> {
    let data_source1 = data_source1.to_uppercase();
    let data_source2 = data_source2.to_uppercase();
    let stats = doc
        .data_sources()?
        .get(&data_source1)
        .ok_or_else(|| EvidenceError::argument(&data_source1, "not a valid data source"))?;
    let cross = stats
        .cross_matches
        .get(&data_source2)
        .ok_or_else(|| EvidenceError::argument(&data_source2, "not a matching data source"))?;
    let level = parse_level(level)?;
    let key = level.cross_sample_key();
    Ok(SampleList {
        review_title: format!("CROSS SOURCE SUMMARY for: {data_source1}-{data_source2}  ({key})"),
        single_entity: level.is_single_entity(),
        ambiguous: level == SampleLevel::Ambiguous,
        samples: cross.samples.get(key).cloned().unwrap_or_default(),
    })
}

/// The full ambiguous entity set behind a pair sample, when either entity of
/// the pair is the ambiguous one. Without a store the pair is kept.
pub fn widen_ambiguous(
    sample: &[i64],
    index: &ConfigIndex,
    store: Option<&dyn EvidenceStore>,
) -> Result<Vec<i64>, EvidenceError> {
    let Some(store) = store else {
        log::warn!("a database connection is required to locate the ambiguous entity");
        return Ok(sample.to_vec());
    };
    for entity_id in sample {
        if let Some(set) = store.ambiguous_entity_set(*entity_id, index.ambiguous_ftype_id())? {
            return Ok(set);
        }
    }
    Ok(sample.to_vec())
}

// ---------------------------------------------------------------------------
// Entity size filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSign {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeFilter {
    pub sign: SizeSign,
    pub size: i64,
    pub review_only: bool,
    pub reason: Option<String>,
}

fn numeric(text: &str) -> Option<i64> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl SizeFilter {
    /// Tokens: `=N`, `>N`, `<N`, `>=N`, `<=N` (sign and size may be split),
    /// `review`, or a review reason. A reason implies `review`; `review`
    /// without a size means every entity larger than one.
    pub fn parse(arg: &str) -> Self {
        let mut filter = Self { sign: SizeSign::Eq, size: 0, review_only: false, reason: None };
        for token in arg.split_whitespace() {
            let (sign, rest) = if let Some(rest) = token.strip_prefix(">=") {
                (Some(SizeSign::Ge), rest)
            } else if let Some(rest) = token.strip_prefix("<=") {
                (Some(SizeSign::Le), rest)
            } else if let Some(rest) = token.strip_prefix('>') {
                (Some(SizeSign::Gt), rest)
            } else if let Some(rest) = token.strip_prefix('<') {
                (Some(SizeSign::Lt), rest)
            } else if let Some(rest) = token.strip_prefix('=') {
                (Some(SizeSign::Eq), rest)
            } else {
                (None, token)
            };

            match sign {
                Some(sign) => {
                    filter.sign = sign;
                    if let Some(size) = numeric(rest) {
                        filter.size = size;
                    }
                }
                None if numeric(token).is_some() => filter.size = numeric(token).unwrap_or(0),
                None if token.eq_ignore_ascii_case("review") => filter.review_only = true,
                None => filter.reason = Some(token.to_uppercase()),
            }
        }
        if filter.reason.is_some() {
            filter.review_only = true;
        }
        if filter.review_only && filter.size == 0 {
            filter.size = 1;
            filter.sign = SizeSign::Gt;
        }
        filter
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeSample {
    pub entity_id: i64,
    pub entity_size: i64,
    pub review_reason: Option<String>,
}

impl SizeSample {
    pub fn review_title(&self) -> String {
        match &self.review_reason {
            Some(reason) => format!("ENTITY SIZE {} - REVIEW FOR: {reason}", self.entity_size),
            None => format!("ENTITY SIZE {}", self.entity_size),
        }
    }
}

/// Entities matching the filter. An exact size match replaces anything
/// gathered so far; smaller sizes are prepended and larger ones appended.
pub fn entity_size_samples(doc: &SnapshotDocument, filter: &SizeFilter) -> Result<Vec<SizeSample>, EvidenceError> {
    let mut selected: Vec<SizeSample> = Vec::new();
    for bucket in doc.entity_sizes()? {
        let these: Vec<SizeSample> = if !filter.review_only {
            bucket
                .sample_entities
                .iter()
                .map(|id| SizeSample { entity_id: *id, entity_size: bucket.entity_size, review_reason: None })
                .collect()
        } else {
            bucket
                .review_reasons
                .iter()
                .filter(|(reason, _)| {
                    filter.reason.as_ref().map_or(true, |wanted| reason.to_uppercase().contains(wanted))
                })
                .flat_map(|(reason, ids)| {
                    ids.iter().map(|id| SizeSample {
                        entity_id: *id,
                        entity_size: bucket.entity_size,
                        review_reason: Some(reason.clone()),
                    })
                })
                .collect()
        };
        if these.is_empty() {
            continue;
        }

        let size = bucket.entity_size;
        let inclusive = matches!(filter.sign, SizeSign::Eq | SizeSign::Ge | SizeSign::Le);
        if inclusive && size == filter.size {
            selected = these;
            break;
        } else if matches!(filter.sign, SizeSign::Lt | SizeSign::Le) && size < filter.size {
            let mut combined = these;
            combined.append(&mut selected);
            selected = combined;
        } else if matches!(filter.sign, SizeSign::Gt | SizeSign::Ge) && size > filter.size {
            selected.extend(these);
        }
    }
    Ok(selected)
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

pub fn data_source_table(doc: &SnapshotDocument, file_name: &str) -> Result<Table, EvidenceError> {
    let mut table = Table::new(format!("Data source summary from {file_name}"))
        .column("Data Source", Align::Center)
        .column("Records", Align::Center)
        .column("Entities", Align::Center)
        .column("Compression", Align::Center)
        .column("Singletons", Align::Center)
        .column("Duplicates", Align::Center)
        .column("Ambiguous", Align::Center)
        .column("Possibles", Align::Center)
        .column("Relationships", Align::Center);
    for (code, stats) in doc.data_sources()? {
        table.push_row(vec![
            Cell::text(code.clone()),
            Cell::text(fmt_statistic(stats.record_count)),
            Cell::text(fmt_statistic(stats.entity_count)),
            Cell::text(stats.compression.clone()),
            Cell::text(fmt_statistic(stats.single_count)),
            Cell::text(fmt_statistic(stats.duplicate_count)),
            Cell::text(fmt_statistic(stats.ambiguous_count)),
            Cell::text(fmt_statistic(stats.possible_count)),
            Cell::text(fmt_statistic(stats.related_count)),
        ]);
    }
    Ok(table)
}

/// All cross-source pairs, or only those of `only` when given.
pub fn cross_source_table(
    doc: &SnapshotDocument,
    file_name: &str,
    only: Option<&str>,
) -> Result<Table, EvidenceError> {
    let mut table = Table::new(format!("Cross Source Summary from {file_name}"))
        .column("Data Source1", Align::Center)
        .column("Data Source2", Align::Center)
        .column("Duplicates", Align::Center)
        .column("Ambiguous", Align::Center)
        .column("Possibles", Align::Center)
        .column("Relationships", Align::Center);
    for (code1, stats) in doc.data_sources()? {
        if only.is_some_and(|only| !only.eq_ignore_ascii_case(code1)) {
            continue;
        }
        for (code2, cross) in &stats.cross_matches {
            table.push_row(vec![
                Cell::text(code1.clone()),
                Cell::text(code2.clone()),
                Cell::text(fmt_statistic(cross.match_count)),
                Cell::text(fmt_statistic(cross.ambiguous_count)),
                Cell::text(fmt_statistic(cross.possible_count)),
                Cell::text(fmt_statistic(cross.related_count)),
            ]);
        }
    }
    Ok(table)
}

pub fn entity_size_table(doc: &SnapshotDocument, file_name: &str) -> Result<Table, EvidenceError> {
    let mut buckets: Vec<&EntitySizeBucket> = doc.entity_sizes()?.iter().collect();
    buckets.sort_by(|a, b| b.entity_size.cmp(&a.entity_size));

    let mut table = Table::new(format!("Entity Size Breakdown from {file_name}"))
        .column("Entity Size", Align::Center)
        .column("Entity Count", Align::Center)
        .column("Review Count", Align::Center)
        .column("Review Reasons", Align::Left);
    for bucket in buckets {
        let reasons: Vec<String> = bucket
            .review_reasons
            .iter()
            .map(|(reason, ids)| format!("{} {reason}", ids.len()))
            .collect();
        table.push_row(vec![
            Cell::text(bucket.display.clone()),
            Cell::text(bucket.entity_count.to_string()),
            Cell::text(bucket.review_count.to_string()),
            Cell::text(reasons.join(" | ")),
        ]);
    }
    Ok(table)
}
