//! Audit statistics: summary tables, sub-category drill-down and sample review.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::classify::compare_feature;
use crate::compare::Comparator;
use crate::config::ConfigIndex;
use crate::error::EvidenceError;
use crate::model::MatchCode;
use crate::payload::de;
use crate::source::EvidenceStore;
use crate::table::{fmt_statistic, Align, Cell, Span, Table, Tone};

pub const AUDIT_SOURCE: &str = "pocAudit";
pub const OTHERS_GROUP: &str = "OTHERS";
const TOP_GROUPS: usize = 10;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditStats {
    #[serde(rename = "STANDARD_COUNT", deserialize_with = "de::loose_i64")]
    pub standard_count: i64,
    #[serde(rename = "RESULT_COUNT", deserialize_with = "de::loose_i64")]
    pub result_count: i64,
    #[serde(rename = "COMMON_COUNT", deserialize_with = "de::loose_i64")]
    pub common_count: i64,
    #[serde(rename = "PRECISION", deserialize_with = "de::loose_string")]
    pub precision: String,
    #[serde(rename = "RECALL", deserialize_with = "de::loose_string")]
    pub recall: String,
    #[serde(rename = "F1-SCORE", deserialize_with = "de::loose_string")]
    pub f1_score: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccuracyStats {
    #[serde(rename = "PRIOR_POSITIVE", deserialize_with = "de::loose_i64")]
    pub prior_positive: i64,
    #[serde(rename = "NEW_POSITIVE", deserialize_with = "de::loose_i64")]
    pub new_positive: i64,
    #[serde(rename = "NEW_NEGATIVE", deserialize_with = "de::loose_i64")]
    pub new_negative: i64,
    #[serde(rename = "PRECISION", deserialize_with = "de::loose_string")]
    pub precision: String,
    #[serde(rename = "RECALL", deserialize_with = "de::loose_string")]
    pub recall: String,
    #[serde(rename = "F1-SCORE", deserialize_with = "de::loose_string")]
    pub f1_score: String,
}

/// One record of an audit sample, as written by the audit tool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuditRecord {
    #[serde(default, deserialize_with = "de::loose_string")]
    pub audit_id: String,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub audit_category: String,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(deserialize_with = "de::loose_string")]
    pub record_id: String,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub prior_id: String,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub prior_score: String,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub newer_id: String,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub newer_score: String,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub audit_result: String,
}

pub type AuditSample = Vec<AuditRecord>;

#[derive(Debug, Clone, Deserialize)]
struct RawSubCategory {
    #[serde(rename = "COUNT", default, deserialize_with = "de::loose_i64")]
    count: i64,
    #[serde(rename = "SAMPLE", default)]
    sample: Vec<AuditSample>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditSubCategory {
    pub name: String,
    pub count: i64,
    pub samples: Vec<AuditSample>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditCategory {
    pub name: String,
    pub count: i64,
    /// Document order.
    pub sub_categories: Vec<AuditSubCategory>,
}

#[derive(Debug, Clone)]
pub struct AuditDocument {
    pub entity: Option<AuditStats>,
    pub clusters: AuditStats,
    pub pairs: AuditStats,
    pub accuracy: AccuracyStats,
    /// Document order.
    pub categories: Vec<AuditCategory>,
}

#[derive(Deserialize)]
struct RawAudit {
    #[serde(rename = "SOURCE", default)]
    source: String,
    #[serde(rename = "ENTITY", default)]
    entity: Option<AuditStats>,
    #[serde(rename = "CLUSTERS", default)]
    clusters: AuditStats,
    #[serde(rename = "PAIRS", default)]
    pairs: AuditStats,
    #[serde(rename = "ACCURACY", default)]
    accuracy: AccuracyStats,
    #[serde(rename = "AUDIT")]
    audit: Option<Map<String, Value>>,
}

impl AuditDocument {
    pub fn from_value(value: &Value) -> Result<Self, EvidenceError> {
        let raw = RawAudit::deserialize(value)
            .map_err(|e| EvidenceError::Document(format!("unreadable audit file: {e}")))?;
        if raw.source != AUDIT_SOURCE {
            return Err(EvidenceError::Document(format!(
                "expected an audit file, found source {:?}",
                raw.source
            )));
        }
        let audit = raw
            .audit
            .ok_or_else(|| EvidenceError::Document("audit file has no AUDIT section".to_string()))?;

        let mut categories = Vec::with_capacity(audit.len());
        for (name, body) in &audit {
            let count = body.get("COUNT").and_then(Value::as_i64).unwrap_or(0);
            let mut sub_categories = Vec::new();
            if let Some(Value::Object(subs)) = body.get("SUB_CATEGORY") {
                for (sub_name, sub) in subs {
                    let raw = RawSubCategory::deserialize(sub).map_err(|e| {
                        EvidenceError::Document(format!("audit sub-category {name}/{sub_name}: {e}"))
                    })?;
                    sub_categories.push(AuditSubCategory {
                        name: sub_name.clone(),
                        count: raw.count,
                        samples: raw.sample,
                    });
                }
            }
            categories.push(AuditCategory { name: name.clone(), count, sub_categories });
        }

        Ok(Self {
            entity: raw.entity,
            clusters: raw.clusters,
            pairs: raw.pairs,
            accuracy: raw.accuracy,
            categories,
        })
    }

    /// Case-insensitive category lookup.
    pub fn category(&self, name: &str) -> Option<&AuditCategory> {
        self.categories.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

pub fn category_tone(category: &str) -> Tone {
    match category {
        "SPLIT" | "SPLIT+MERGE" => Tone::Caution,
        "MERGE" => Tone::Highlight1,
        _ => Tone::Bad,
    }
}

// ---------------------------------------------------------------------------
// Drill-down
// ---------------------------------------------------------------------------

/// A selectable row of the drill-down: one sub-category, or the OTHERS roll-up.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditGroup {
    /// 1-based.
    pub index: usize,
    pub name: String,
    /// Sub-category names folded into this group.
    pub members: Vec<String>,
    pub count: i64,
}

/// The ten largest sub-categories, then OTHERS summing the rest.
pub fn drill_down(category: &AuditCategory) -> Vec<AuditGroup> {
    let mut ranked: Vec<&AuditSubCategory> = category.sub_categories.iter().collect();
    // Stable, so equal counts keep document order.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));

    let mut groups: Vec<AuditGroup> = Vec::new();
    for (i, sub) in ranked.into_iter().enumerate() {
        if i < TOP_GROUPS {
            groups.push(AuditGroup {
                index: i + 1,
                name: sub.name.clone(),
                members: vec![sub.name.clone()],
                count: sub.count,
            });
        } else if i == TOP_GROUPS {
            groups.push(AuditGroup {
                index: i + 1,
                name: OTHERS_GROUP.to_string(),
                members: vec![sub.name.clone()],
                count: sub.count,
            });
        } else if let Some(others) = groups.last_mut() {
            others.members.push(sub.name.clone());
            others.count += sub.count;
        }
    }
    groups
}

/// Samples of a group, concatenated in document order of its sub-categories.
pub fn group_samples<'c>(category: &'c AuditCategory, group: &AuditGroup) -> Vec<&'c AuditSample> {
    category
        .sub_categories
        .iter()
        .filter(|s| group.members.contains(&s.name))
        .flat_map(|s| s.samples.iter())
        .collect()
}

/// A group by 1-based index or by case-insensitive name.
pub fn select_group<'g>(groups: &'g [AuditGroup], token: &str) -> Option<&'g AuditGroup> {
    let token = token.trim();
    if let Ok(index) = token.parse::<usize>() {
        return groups.iter().find(|g| g.index == index);
    }
    groups.iter().find(|g| g.name.eq_ignore_ascii_case(token))
}

// ---------------------------------------------------------------------------
// Sample cursor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Moved,
    AtStart,
    AtEnd,
}

/// Forward/back navigation over a list, never skipping or repeating.
#[derive(Debug, Clone)]
pub struct SampleCursor<T> {
    items: Vec<T>,
    position: usize,
}

impl<T> SampleCursor<T> {
    /// `None` for an empty list.
    pub fn new(items: Vec<T>) -> Option<Self> {
        if items.is_empty() {
            None
        } else {
            Some(Self { items, position: 0 })
        }
    }

    pub fn current(&self) -> &T {
        &self.items[self.position]
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn next(&mut self) -> Step {
        if self.position + 1 >= self.items.len() {
            Step::AtEnd
        } else {
            self.position += 1;
            Step::Moved
        }
    }

    pub fn prev(&mut self) -> Step {
        if self.position == 0 {
            Step::AtStart
        } else {
            self.position -= 1;
            Step::Moved
        }
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

pub fn summary_tables(doc: &AuditDocument, file_name: &str) -> Vec<Table> {
    let mut stats = Table::new(format!("Audit Results from {file_name}"))
        .column("Statistic1", Align::Left)
        .column("Entities", Align::Right)
        .column("Clusters", Align::Right)
        .column("Pairs", Align::Right)
        .column("", Align::Center)
        .column("Statistic2", Align::Left)
        .column("Accuracy", Align::Right);

    let zero = AuditStats::default();
    let entity = doc.entity.as_ref().unwrap_or(&zero);
    let acc = &doc.accuracy;
    let count_row = |label: &str, f: fn(&AuditStats) -> i64, label2: &str, value2: i64, tone: Tone| {
        vec![
            Cell::text(label),
            Cell::text(fmt_statistic(f(entity))),
            Cell::text(fmt_statistic(f(&doc.clusters))),
            Cell::text(fmt_statistic(f(&doc.pairs))),
            Cell::empty(),
            Cell::styled(Span::toned(label2, tone)),
            Cell::styled(Span::toned(fmt_statistic(value2), tone)),
        ]
    };
    stats.push_row(count_row("Prior Count", |s| s.standard_count, "Prior Positives", acc.prior_positive, Tone::Plain));
    stats.push_row(count_row("Newer Count", |s| s.result_count, "New Positives", acc.new_positive, Tone::Highlight1));
    stats.push_row(count_row("Common Count", |s| s.common_count, "New Negatives", acc.new_negative, Tone::Caution));

    let ratio_row = |label: &str, f: fn(&AuditStats) -> &str, value2: &str| {
        let shown = |s: &str| if s.is_empty() { "0".to_string() } else { s.to_string() };
        vec![
            Cell::text(label),
            Cell::text(shown(f(entity))),
            Cell::text(shown(f(&doc.clusters))),
            Cell::text(shown(f(&doc.pairs))),
            Cell::empty(),
            Cell::styled(Span::toned(label, Tone::Highlight2)),
            Cell::styled(Span::toned(shown(value2), Tone::Highlight2)),
        ]
    };
    stats.push_row(ratio_row("Precision", |s| s.precision.as_str(), &acc.precision));
    stats.push_row(ratio_row("Recall", |s| s.recall.as_str(), &acc.recall));
    stats.push_row(ratio_row("F1 Score", |s| s.f1_score.as_str(), &acc.f1_score));

    let mut categories = Table::new("SPLIT AND MERGED ENTITIES")
        .column("Category", Align::Left)
        .column("Count", Align::Right);
    for category in &doc.categories {
        let tone = category_tone(&category.name);
        categories.push_row(vec![
            Cell::styled(Span::toned(category.name.clone(), tone)),
            Cell::styled(Span::toned(fmt_statistic(category.count), tone)),
        ]);
    }

    vec![stats, categories]
}

pub fn groups_table(category: &AuditCategory, groups: &[AuditGroup]) -> Table {
    let tone = category_tone(&category.name);
    let mut table = Table::new(format!("{} ENTITY SUB-CATEGORIES", category.name))
        .column("Index", Align::Center)
        .column("Category", Align::Left)
        .column("Sub-category", Align::Left)
        .column("Count", Align::Right);
    for group in groups {
        table.push_row(vec![
            Cell::text(group.index.to_string()),
            Cell::styled(Span::toned(category.name.clone(), tone)),
            Cell::text(group.name.clone()),
            Cell::text(fmt_statistic(group.count)),
        ]);
    }
    table
}

fn status_rank(result: &str) -> u8 {
    match result.to_lowercase().as_str() {
        "same" => 1,
        "new negative" => 2,
        "new positive" => 3,
        "missing" => 4,
        _ => 5,
    }
}

fn result_span(result: &str) -> Span {
    match result.to_uppercase().as_str() {
        "NEW POSITIVE" => Span::toned(result, Tone::Highlight1),
        "NEW NEGATIVE" => Span::toned(result, Tone::Caution),
        "MISSING" => Span::toned(result, Tone::Bad),
        _ => Span::plain(result).bold(),
    }
}

struct ReviewedRecord<'s> {
    record: &'s AuditRecord,
    record_label: String,
    /// (ftype id, lib feat id, description) for scored feature types only.
    features: Vec<(i64, i64, String)>,
}

/// Side-by-side feature comparison of one audit sample's records.
///
/// Needs the relational store; records it does not know are shown as `** <id>`.
pub fn review_sample(
    sample: &AuditSample,
    index: &ConfigIndex,
    comparator: &Comparator,
    store: Option<&dyn EvidenceStore>,
) -> Result<Table, EvidenceError> {
    let store = store.ok_or_else(|| {
        EvidenceError::Store("a database connection is required to review audit samples".to_string())
    })?;

    let mut reviewed = Vec::with_capacity(sample.len());
    let mut ftypes_used: Vec<i64> = Vec::new();
    for record in sample {
        let dsrc_id = match &record.data_source {
            Some(code) => {
                let id = index.data_source_id(code);
                if id.is_none() {
                    log::warn!("data source {code} not found");
                }
                id
            }
            None => None,
        };
        let stored = store.record_features(dsrc_id, &record.record_id)?;
        let (record_label, features) = match stored {
            None => (format!("** {}", record.record_id), Vec::new()),
            Some(features) => {
                let scored: Vec<(i64, i64, String)> = features
                    .into_iter()
                    .filter(|f| index.ftype(f.ftype_id).is_some_and(|t| t.comparison.is_some()))
                    .map(|f| (f.ftype_id, f.lib_feat_id, f.feat_desc))
                    .collect();
                for (ftype_id, _, _) in &scored {
                    if !ftypes_used.contains(ftype_id) {
                        ftypes_used.push(*ftype_id);
                    }
                }
                (record.record_id.clone(), scored)
            }
        };
        reviewed.push(ReviewedRecord { record, record_label, features });
    }
    ftypes_used.sort_unstable();

    let (audit_id, audit_category) = sample
        .first()
        .map(|r| (r.audit_id.as_str(), r.audit_category.as_str()))
        .unwrap_or(("", ""));
    let mut table = Table::new(format!("Audit Result ID {audit_id} {audit_category}"))
        .column("DataSource", Align::Left)
        .column("Record ID", Align::Left)
        .column("Prior ID", Align::Left)
        .column("Prior Score", Align::Left)
        .column("Newer ID", Align::Left)
        .column("Newer Score", Align::Left)
        .column("Audit result", Align::Left);
    for ftype_id in &ftypes_used {
        let code = index.ftype(*ftype_id).map(|f| f.code.clone()).unwrap_or_default();
        table = table.column(code, Align::Left);
    }

    let mut order: Vec<usize> = (0..reviewed.len()).collect();
    order.sort_by(|&a, &b| {
        let (ra, rb) = (reviewed[a].record, reviewed[b].record);
        status_rank(&ra.audit_result)
            .cmp(&status_rank(&rb.audit_result))
            .then_with(|| ra.prior_id.cmp(&rb.prior_id))
            .then_with(|| ra.newer_id.cmp(&rb.newer_id))
    });

    for i in order {
        let this = &reviewed[i];
        let record = this.record;
        let mut row = vec![
            Cell::text(record.data_source.clone().unwrap_or_default()),
            Cell::text(this.record_label.clone()),
            Cell::text(record.prior_id.clone()),
            Cell::text(record.prior_score.clone()),
            Cell::text(record.newer_id.clone()),
            Cell::text(record.newer_score.clone()),
            Cell::styled(result_span(&record.audit_result)),
        ];
        for ftype_id in &ftypes_used {
            let Some(ftype) = index.ftype(*ftype_id) else {
                row.push(Cell::empty());
                continue;
            };
            let cfunc = ftype.comparison.as_ref().map(|c| c.code.as_str());
            let mut cell = Cell::empty();
            for (_, lib_feat_id, desc) in this.features.iter().filter(|f| f.0 == *ftype_id) {
                if desc.is_empty() {
                    continue;
                }
                let peers: Vec<(i64, &str)> = reviewed
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .flat_map(|(_, other)| other.features.iter())
                    .filter(|f| f.0 == *ftype_id)
                    .map(|f| (f.1, f.2.as_str()))
                    .collect();
                let tone = match compare_feature(comparator, &ftype.code, cfunc, (*lib_feat_id, desc.as_str()), &peers) {
                    MatchCode::NotCompared => Tone::Caution,
                    MatchCode::Matched => Tone::Good,
                    MatchCode::Conflicting if ftype.exclusive => Tone::Bad,
                    _ => Tone::Plain,
                };
                cell.push_span(Span::toned(desc.clone(), tone));
            }
            row.push(cell);
        }
        table.push_row(row);
    }

    Ok(table)
}

/// Entity ids to drill into for a sample, first-seen order.
pub fn sample_entity_ids(sample: &AuditSample) -> Vec<i64> {
    let mut ids = Vec::new();
    for record in sample {
        if let Ok(id) = record.newer_id.trim().parse::<i64>() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{config, FixtureStore};
    use serde_json::json;

    fn category_with(counts: &[i64]) -> AuditCategory {
        AuditCategory {
            name: "MERGE".to_string(),
            count: counts.iter().sum(),
            sub_categories: counts
                .iter()
                .enumerate()
                .map(|(i, c)| AuditSubCategory {
                    name: format!("SUB{i}"),
                    count: *c,
                    samples: vec![vec![record(&format!("s{i}"), "1", "2", "new positive")]],
                })
                .collect(),
        }
    }

    fn record(rid: &str, prior: &str, newer: &str, result: &str) -> AuditRecord {
        AuditRecord {
            audit_id: "7".to_string(),
            audit_category: "MERGE".to_string(),
            data_source: Some("CUSTOMERS".to_string()),
            record_id: rid.to_string(),
            prior_id: prior.to_string(),
            prior_score: String::new(),
            newer_id: newer.to_string(),
            newer_score: String::new(),
            audit_result: result.to_string(),
        }
    }

    #[test]
    fn fifteen_sub_categories_make_eleven_groups() {
        let counts = [5, 40, 3, 33, 12, 9, 50, 1, 18, 27, 2, 7, 21, 15, 4];
        let category = category_with(&counts);
        let groups = drill_down(&category);
        assert_eq!(groups.len(), 11);
        assert_eq!(groups[0].name, "SUB6");
        assert_eq!(groups[0].count, 50);

        let others = &groups[10];
        assert_eq!(others.name, OTHERS_GROUP);
        assert_eq!(others.index, 11);
        assert_eq!(others.count, 5 + 3 + 1 + 2 + 4);

        let samples = group_samples(&category, others);
        let order: Vec<&str> = samples.iter().map(|s| s[0].record_id.as_str()).collect();
        assert_eq!(order, vec!["s0", "s2", "s7", "s10", "s14"]);
    }

    #[test]
    fn equal_counts_keep_document_order() {
        let category = category_with(&[3, 3, 3]);
        let names: Vec<String> = drill_down(&category).into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["SUB0", "SUB1", "SUB2"]);
    }

    #[test]
    fn select_by_index_or_name() {
        let groups = drill_down(&category_with(&[3, 9]));
        assert_eq!(select_group(&groups, "1").unwrap().name, "SUB1");
        assert_eq!(select_group(&groups, "sub0").unwrap().index, 2);
        assert!(select_group(&groups, "12").is_none());
        assert!(select_group(&groups, "nope").is_none());
    }

    #[test]
    fn cursor_reports_ends() {
        let mut cursor = SampleCursor::new(vec!['a', 'b']).unwrap();
        assert_eq!(cursor.prev(), Step::AtStart);
        assert_eq!(cursor.next(), Step::Moved);
        assert_eq!(*cursor.current(), 'b');
        assert_eq!(cursor.next(), Step::AtEnd);
        assert_eq!(cursor.position(), 1);
        assert!(SampleCursor::<char>::new(Vec::new()).is_none());
    }

    #[test]
    fn document_preserves_category_order() {
        let doc = AuditDocument::from_value(&json!({
            "SOURCE": "pocAudit",
            "CLUSTERS": { "STANDARD_COUNT": 10, "RESULT_COUNT": 9, "COMMON_COUNT": 8,
                          "PRECISION": 0.9, "RECALL": "0.8", "F1-SCORE": 0.85 },
            "PAIRS": {},
            "ACCURACY": { "PRIOR_POSITIVE": 100, "NEW_POSITIVE": 3, "NEW_NEGATIVE": 2 },
            "AUDIT": {
                "SPLIT": { "COUNT": 2, "SUB_CATEGORY": {} },
                "MERGE": { "COUNT": 5, "SUB_CATEGORY": {
                    "+NAME+DOB": { "COUNT": 5, "SAMPLE": [ [
                        { "audit_id": 1, "audit_category": "MERGE", "record_id": 1001,
                          "prior_id": 4, "newer_id": 5, "audit_result": "new positive" }
                    ] ] } } }
            }
        }))
        .unwrap();
        let names: Vec<&str> = doc.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["SPLIT", "MERGE"]);
        let merge = doc.category("merge").unwrap();
        assert_eq!(merge.sub_categories[0].samples[0][0].record_id, "1001");
        assert_eq!(doc.clusters.precision, "0.9");

        let tables = summary_tables(&doc, "audit.json");
        assert_eq!(tables[0].rows[0][1].plain_text(), "0");
        assert_eq!(tables[0].rows[0][6].plain_text(), "100");
        assert_eq!(tables[1].rows[1][0].lines[0][0].tone, Tone::Highlight1);
    }

    #[test]
    fn wrong_source_is_rejected() {
        let err = AuditDocument::from_value(&json!({ "SOURCE": "pocSnapshot", "AUDIT": {} }))
            .unwrap_err();
        assert!(matches!(err, EvidenceError::Document(_)));
    }

    #[test]
    fn review_needs_store() {
        let sample = vec![record("1", "1", "2", "same")];
        let err = review_sample(&sample, &config(), &Comparator::default(), None).unwrap_err();
        assert!(matches!(err, EvidenceError::Store(_)));
    }

    #[test]
    fn review_marks_missing_and_sorts_by_status() {
        let store = FixtureStore::new()
            .with_record(1, "A", &[(1, 10, "JOHN SMITH"), (3, 30, "123-45-6789"), (20, 50, "PERSON")])
            .with_record(1, "B", &[(1, 11, "JON SMITH"), (3, 31, "999-99-9999"), (6, 60, "555-1234")]);
        let sample = vec![
            record("A", "1", "2", "new positive"),
            record("B", "1", "1", "same"),
            record("C", "1", "3", "missing"),
        ];
        let table = review_sample(&sample, &config(), &Comparator::default(), Some(&store)).unwrap();

        let headers: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(&headers[7..], &["NAME", "SSN", "PHONE"]);
        let records: Vec<String> = table.rows.iter().map(|r| r[1].plain_text()).collect();
        assert_eq!(records, vec!["B", "A", "** C"]);

        let a = &table.rows[1];
        assert_eq!(a[7].lines[0][0].tone, Tone::Good);
        assert_eq!(a[8].lines[0][0].tone, Tone::Bad);
        assert!(a[9].is_empty());
        assert_eq!(table.rows[0][9].lines[0][0].tone, Tone::Caution);
    }

    #[test]
    fn sample_ids_are_newer_entities() {
        let sample = vec![record("A", "1", "2", "x"), record("B", "1", "2", "x"), record("C", "1", "9", "x")];
        assert_eq!(sample_entity_ids(&sample), vec![2, 9]);
    }
}
