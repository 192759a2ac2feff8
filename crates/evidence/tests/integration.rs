use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use serde_json::{json, Value};

use matchlens_evidence::audit::{self, AuditDocument, OTHERS_GROUP};
use matchlens_evidence::model::{IgnoredCode, MatchCode, Sign};
use matchlens_evidence::snapshot::{self, SizeFilter, SnapshotDocument};
use matchlens_evidence::why::why_table;
use matchlens_evidence::{
    Classifier, Collector, Comparator, ConfigIndex, EvidenceError, EvidenceStore,
    ResolutionEngine, StoredFeature, Tone,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load(name: &str) -> Value {
    let path = fixtures_dir().join(name);
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    serde_json::from_str(&text).unwrap()
}

fn index() -> ConfigIndex {
    let text = std::fs::read_to_string(fixtures_dir().join("g2config.json")).unwrap();
    ConfigIndex::from_json(&text).unwrap()
}

// -------------------------------------------------------------------------
// Engine and store backed by fixture documents
// -------------------------------------------------------------------------

/// `{"why": {id: doc}, "entities": {id: doc}, "searches": [doc, ...]}`;
/// searches are answered in call order.
struct FileEngine {
    why: HashMap<i64, Value>,
    entities: HashMap<i64, Value>,
    searches: RefCell<VecDeque<Value>>,
}

fn by_id(value: &Value) -> HashMap<i64, Value> {
    value
        .as_object()
        .map(|map| map.iter().map(|(k, v)| (k.parse().unwrap(), v.clone())).collect())
        .unwrap_or_default()
}

impl FileEngine {
    fn open(name: &str) -> Self {
        let doc = load(name);
        Self {
            why: by_id(&doc["why"]),
            entities: by_id(&doc["entities"]),
            searches: RefCell::new(doc["searches"].as_array().cloned().unwrap_or_default().into()),
        }
    }
}

impl ResolutionEngine for FileEngine {
    fn get_entity_by_entity_id(&self, entity_id: i64) -> Result<Value, EvidenceError> {
        self.entities
            .get(&entity_id)
            .cloned()
            .ok_or_else(|| EvidenceError::NotFound(entity_id.to_string()))
    }

    fn get_entity_by_record_id(&self, ds: &str, rid: &str) -> Result<Value, EvidenceError> {
        Err(EvidenceError::NotFound(format!("{ds}: {rid}")))
    }

    fn why_entity_by_entity_id(&self, entity_id: i64) -> Result<Value, EvidenceError> {
        self.why
            .get(&entity_id)
            .cloned()
            .ok_or_else(|| EvidenceError::NotFound(entity_id.to_string()))
    }

    fn search_by_attributes(&self, _attributes: &Value) -> Result<Value, EvidenceError> {
        Ok(self
            .searches
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| json!({ "SEARCH_RESPONSE": { "RESOLVED_ENTITIES": [] } })))
    }

    fn add_record(&mut self, _ds: &str, _rid: &str, _record: &Value) -> Result<(), EvidenceError> {
        Err(EvidenceError::Engine("read-only fixture".to_string()))
    }

    fn delete_record(&mut self, _ds: &str, _rid: &str) -> Result<(), EvidenceError> {
        Err(EvidenceError::Engine("read-only fixture".to_string()))
    }

    fn get_record(&self, ds: &str, rid: &str) -> Result<Value, EvidenceError> {
        Err(EvidenceError::NotFound(format!("{ds}: {rid}")))
    }
}

#[derive(Default)]
struct RecordStore {
    records: HashMap<(Option<i64>, String), Vec<StoredFeature>>,
    ambiguous: HashMap<i64, Vec<i64>>,
}

impl RecordStore {
    fn with(mut self, dsrc_id: i64, rid: &str, features: &[(i64, i64, &str)]) -> Self {
        let features = features
            .iter()
            .map(|&(ftype_id, lib_feat_id, desc)| StoredFeature {
                ftype_id,
                lib_feat_id,
                feat_desc: desc.to_string(),
            })
            .collect();
        self.records.insert((Some(dsrc_id), rid.to_string()), features);
        self
    }
}

impl EvidenceStore for RecordStore {
    fn feature_element_values(&self, _lib_feat_id: i64) -> Result<Option<String>, EvidenceError> {
        Ok(None)
    }

    fn feature_description(&self, _lib_feat_id: i64) -> Result<Option<String>, EvidenceError> {
        Ok(None)
    }

    fn ambiguous_entity_set(
        &self,
        entity_id: i64,
        _ambiguous_ftype_id: i64,
    ) -> Result<Option<Vec<i64>>, EvidenceError> {
        Ok(self.ambiguous.get(&entity_id).cloned())
    }

    fn record_features(
        &self,
        dsrc_id: Option<i64>,
        record_id: &str,
    ) -> Result<Option<Vec<StoredFeature>>, EvidenceError> {
        Ok(self.records.get(&(dsrc_id, record_id.to_string())).cloned())
    }
}

// -------------------------------------------------------------------------
// Configuration
// -------------------------------------------------------------------------

#[test]
fn config_file_loads_with_last_close_score() {
    let index = index();
    let address = index.ftype_by_code("ADDRESS").unwrap();
    assert_eq!(address.comparison.as_ref().unwrap().close_score, Some(80));
    assert!(index.has_data_source("CUSTOMERS"));
    assert!(index.has_entity_type("TRY_ETYPE"));
    assert_eq!(index.ambiguous_ftype_id(), 40);
    assert!(index.sequence_by_code("SSN") < index.sequence_by_code("ADDRESS"));
}

// -------------------------------------------------------------------------
// Why not
// -------------------------------------------------------------------------

#[test]
fn why_not_business_address_conflict() {
    let index = index();
    let engine = FileEngine::open("why_not_business_address.json");
    let set = Collector::new(&engine, &index).collect(&[1, 2, 1]).unwrap();
    let comparator = Comparator::default();
    let out = Classifier::new(&index, &comparator, None).classify(&set);

    for id in [1, 2] {
        let member = out.member(id).unwrap();
        assert_eq!(member.why_key.match_key(), "+SSN-ADDRESS");
        assert_eq!(member.why_key.to_string(), "+SSN-ADDRESS (SF1)");
        assert!(member.why_key.has_term(Sign::Minus, "ADDRESS"));
        assert!(!member.why_key.no_candidates);
    }

    let acme = out.member(1).unwrap();
    let address = acme.feature("ADDRESS").next().unwrap();
    assert_eq!(address.match_code, MatchCode::Conflicting);
    assert!(address.exclusive);
    let score = address.evidence.score.as_ref().unwrap();
    assert_eq!(score.counterpart, "99 OAK AVE SPRINGFIELD");
    assert_eq!(score.bucket, "DIFF");

    // Different names do not count against a non-exclusive type.
    let name = acme.feature("NAME").next().unwrap();
    assert_eq!(name.match_code, MatchCode::Conflicting);
    assert!(!acme.why_key.has_term(Sign::Minus, "NAME"));

    let ssn = acme.feature("SSN").next().unwrap();
    assert!(ssn.evidence.was_candidate);
    assert_eq!(ssn.evidence.score.as_ref().unwrap().bucket, "SAME");
    assert_eq!(acme.relations[0].entity_id, 2);
}

#[test]
fn why_not_table_shows_counterpart_lines() {
    let index = index();
    let engine = FileEngine::open("why_not_business_address.json");
    let set = Collector::new(&engine, &index).collect(&[1, 2]).unwrap();
    let comparator = Comparator::default();
    let out = Classifier::new(&index, &comparator, None).classify(&set);
    let table = why_table(&out, &index);

    assert_eq!(table.title, "Why NOT for listed entities");
    assert_eq!(table.columns[1].name, "1");
    let relationships = table.row("RELATIONSHIPS").unwrap();
    assert_eq!(relationships[1].plain_text(), "+SSN-ADDRESS (SF1)");

    let address = table.row("ADDRESS").unwrap();
    assert_eq!(
        address[1].plain_lines(),
        vec!["1 MAIN ST ANYTOWN [1]", "  99 OAK AVE SPRINGFIELD (20)"]
    );
    assert_eq!(address[1].lines[0][0].tone, Tone::Bad);

    let labels: Vec<String> = table.rows.iter().map(|r| r[0].plain_text()).collect();
    assert_eq!(labels, vec!["DATA SOURCES", "RELATIONSHIPS", "WHY RESULT", "NAME", "SSN", "ADDRESS"]);
}

// -------------------------------------------------------------------------
// Single entity
// -------------------------------------------------------------------------

#[test]
fn capped_feature_matches_but_stays_out_of_the_key() {
    let index = index();
    let engine = FileEngine::open("why_scoring_cap.json");
    let set = Collector::new(&engine, &index).collect(&[7]).unwrap();
    let comparator = Comparator::default();
    let out = Classifier::new(&index, &comparator, None).classify(&set);

    let member = out.member(102).unwrap();
    assert_eq!(member.why_key.to_string(), "+NAME+PHONE (CNAME_CFF)");
    let dob = member.feature("DOB").next().unwrap();
    assert_eq!(dob.match_code, MatchCode::Matched);
    assert_eq!(dob.ignored, IgnoredCode::NotScored);
    assert_eq!(dob.evidence.legend_text(), "1980-01-01 [!5000]");

    let phone = member.feature("PHONE").next().unwrap();
    assert!(phone.evidence.was_candidate);

    let missing = member.features.iter().find(|f| f.evidence.lib_feat_id == 77).unwrap();
    assert_eq!(missing.match_code, MatchCode::Unmatched);

    assert_eq!(out.member(101).unwrap().why_key.match_key(), "+NAME+PHONE");
}

#[test]
fn single_entity_table_dims_ignored_features() {
    let index = index();
    let engine = FileEngine::open("why_scoring_cap.json");
    let set = Collector::new(&engine, &index).collect(&[7]).unwrap();
    let comparator = Comparator::default();
    let out = Classifier::new(&index, &comparator, None).classify(&set);
    let table = why_table(&out, &index);

    assert_eq!(table.title, "Why for entity ID 7");
    assert_eq!(table.columns[0].name, "Internal ID");
    let why = table.row("WHY RESULT").unwrap();
    assert_eq!(
        why[2].plain_lines(),
        vec!["+NAME+PHONE (CNAME_CFF)", "engine: +NAME+PHONE (CNAME_CFF)"]
    );
    let dob = table.row("DOB").unwrap();
    assert!(dob[2].lines[0][0].dim);
    assert_eq!(table.rows.last().unwrap()[0].plain_text(), "unknown");
}

#[test]
fn unknown_entity_is_not_found() {
    let index = index();
    let engine = FileEngine::open("why_scoring_cap.json");
    let err = Collector::new(&engine, &index).collect(&[8]).unwrap_err();
    assert_eq!(err.to_string(), "0 records found for 8");
}

// -------------------------------------------------------------------------
// Audit
// -------------------------------------------------------------------------

#[test]
fn audit_drill_down_rolls_up_the_smallest() {
    let doc = AuditDocument::from_value(&load("audit.json")).unwrap();
    let merge = doc.category("merge").unwrap();
    let groups = audit::drill_down(merge);

    assert_eq!(groups.len(), 11);
    assert_eq!(groups[0].name, "S01");
    assert_eq!(groups[1].name, "S03");
    let others = &groups[10];
    assert_eq!(others.name, OTHERS_GROUP);
    assert_eq!(others.count, 5 + 4 + 3 + 2 + 1);
    assert_eq!(audit::select_group(&groups, "11"), Some(others));
    assert_eq!(audit::select_group(&groups, "others"), Some(others));

    let first_records: Vec<&str> = audit::group_samples(merge, others)
        .iter()
        .map(|sample| sample[0].record_id.as_str())
        .collect();
    assert_eq!(first_records, vec!["S02-A", "S04-A", "S07-A", "S14-A", "S15-A"]);
}

#[test]
fn audit_summary_tables() {
    let doc = AuditDocument::from_value(&load("audit.json")).unwrap();
    let tables = audit::summary_tables(&doc, "audit.json");
    assert_eq!(tables[0].title, "Audit Results from audit.json");
    let prior = tables[0].row("Prior Count").unwrap();
    assert_eq!(prior[1].plain_text(), "1,000");
    assert_eq!(prior[3].plain_text(), "5,000");

    let categories: Vec<String> = tables[1].rows.iter().map(|r| r[0].plain_text()).collect();
    assert_eq!(categories, vec!["SPLIT", "MERGE", "SPLIT+MERGE"]);
    assert_eq!(tables[1].row("MERGE").unwrap()[1].plain_text(), "270");

    let merge = doc.category("MERGE").unwrap();
    let groups = audit::groups_table(merge, &audit::drill_down(merge));
    assert_eq!(groups.title, "MERGE ENTITY SUB-CATEGORIES");
    assert_eq!(groups.rows.len(), 11);
}

#[test]
fn audit_sample_review_compares_stored_features() {
    let index = index();
    let comparator = Comparator::default();
    let doc = AuditDocument::from_value(&load("audit.json")).unwrap();
    let merge = doc.category("MERGE").unwrap();
    let sample = &merge.sub_categories[1].samples[0];
    let store = RecordStore::default()
        .with(1, "S02-A", &[(1, 500, "JOHN SMITH"), (2, 501, "1980-01-01"), (20, 502, "PERSON")])
        .with(1, "S02-B", &[(1, 500, "JOHN SMITH"), (2, 503, "1975-06-30")]);

    let table = audit::review_sample(sample, &index, &comparator, Some(&store)).unwrap();
    assert_eq!(table.title, "Audit Result ID 102 MERGE");
    let names: Vec<&str> = table.columns.iter().skip(7).map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["NAME", "DOB"]);

    // "same" sorts ahead of "new positive".
    assert_eq!(table.rows[0][1].plain_text(), "S02-B");
    assert_eq!(table.rows[0][7].lines[0][0].tone, Tone::Good);
    assert_eq!(table.rows[0][8].lines[0][0].tone, Tone::Bad);
    assert_eq!(audit::sample_entity_ids(sample), vec![1002]);

    let err = audit::review_sample(sample, &index, &comparator, None).unwrap_err();
    assert!(matches!(err, EvidenceError::Store(_)));
}

#[test]
fn unknown_audit_record_is_flagged() {
    let index = index();
    let comparator = Comparator::default();
    let doc = AuditDocument::from_value(&load("audit.json")).unwrap();
    let sample = &doc.category("MERGE").unwrap().sub_categories[0].samples[0];
    let store = RecordStore::default().with(1, "S01-A", &[(1, 600, "MARY JONES")]);

    let table = audit::review_sample(sample, &index, &comparator, Some(&store)).unwrap();
    let labels: Vec<String> = table.rows.iter().map(|r| r[1].plain_text()).collect();
    assert_eq!(labels, vec!["** S01-B", "S01-A"]);
    assert_eq!(table.rows[1][7].lines[0][0].tone, Tone::Caution);
}

// -------------------------------------------------------------------------
// Snapshot
// -------------------------------------------------------------------------

#[test]
fn snapshot_summary_tables() {
    let doc = SnapshotDocument::from_value(&load("snapshot.json")).unwrap();

    let table = snapshot::data_source_table(&doc, "snapshot.json").unwrap();
    assert_eq!(table.title, "Data source summary from snapshot.json");
    let customers = table.row("CUSTOMERS").unwrap();
    assert_eq!(customers[1].plain_text(), "1,200");
    assert_eq!(customers[3].plain_text(), "16.67%");
    assert_eq!(customers[5].plain_text(), "80");
    assert_eq!(table.rows[1][0].plain_text(), "WATCHLIST");

    let cross = snapshot::cross_source_table(&doc, "snapshot.json", None).unwrap();
    assert_eq!(cross.rows.len(), 1);
    assert_eq!(cross.rows[0][1].plain_text(), "WATCHLIST");
    assert_eq!(cross.rows[0][5].plain_text(), "9");
    let only = snapshot::cross_source_table(&doc, "snapshot.json", Some("watchlist")).unwrap();
    assert!(only.is_empty());

    let sizes = snapshot::entity_size_table(&doc, "snapshot.json").unwrap();
    let shown: Vec<String> = sizes.rows.iter().map(|r| r[0].plain_text()).collect();
    assert_eq!(shown, vec!["3", "2", "1"]);
    assert_eq!(sizes.rows[0][3].plain_text(), "1 multi_name | 1 multi_ssn");
}

#[test]
fn snapshot_sample_lists() {
    let doc = SnapshotDocument::from_value(&load("snapshot.json")).unwrap();

    let dupes = snapshot::data_source_samples(&doc, "customers", "duplicate").unwrap();
    assert!(dupes.single_entity);
    assert_eq!(dupes.samples, vec![vec![21], vec![22], vec![23]]);
    assert_eq!(dupes.review_title, "DATA SOURCE SUMMARY FOR: CUSTOMERS (DUPLICATE_SAMPLE)");

    let possibles = snapshot::data_source_samples(&doc, "CUSTOMERS", "3").unwrap();
    assert!(!possibles.single_entity);
    assert_eq!(possibles.samples, vec![vec![41, 42], vec![43, 44]]);

    let cross = snapshot::cross_source_samples(&doc, "customers", "watchlist", "d").unwrap();
    assert_eq!(cross.samples, vec![vec![61, 62]]);
    assert_eq!(cross.review_title, "CROSS SOURCE SUMMARY for: CUSTOMERS-WATCHLIST  (MATCH_SAMPLE)");

    let err = snapshot::cross_source_samples(&doc, "watchlist", "customers", "d").unwrap_err();
    assert!(matches!(err, EvidenceError::Argument { .. }));
    let err = snapshot::data_source_samples(&doc, "NOPE", "d").unwrap_err();
    assert!(matches!(err, EvidenceError::Argument { .. }));
}

#[test]
fn ambiguous_pair_widens_through_the_store() {
    let index = index();
    let doc = SnapshotDocument::from_value(&load("snapshot.json")).unwrap();
    let list = snapshot::cross_source_samples(&doc, "CUSTOMERS", "WATCHLIST", "ambiguous").unwrap();
    assert!(list.ambiguous);

    let mut store = RecordStore::default();
    store.ambiguous.insert(72, vec![71, 72, 73]);
    let widened = snapshot::widen_ambiguous(&list.samples[0], &index, Some(&store)).unwrap();
    assert_eq!(widened, vec![71, 72, 73]);
    let kept = snapshot::widen_ambiguous(&list.samples[0], &index, None).unwrap();
    assert_eq!(kept, vec![71, 72]);
}

#[test]
fn entity_size_filters() {
    let doc = SnapshotDocument::from_value(&load("snapshot.json")).unwrap();
    let ids = |arg: &str| -> Vec<i64> {
        snapshot::entity_size_samples(&doc, &SizeFilter::parse(arg))
            .unwrap()
            .iter()
            .map(|s| s.entity_id)
            .collect()
    };

    assert_eq!(ids("=3"), vec![301, 302, 303]);
    assert_eq!(ids("< 3"), vec![201, 202, 11, 12]);
    assert_eq!(ids(">=2"), vec![201, 202]);
    assert_eq!(ids("review"), vec![301, 302, 201]);
    assert_eq!(ids("multi_ssn"), vec![302]);

    let reviewed = snapshot::entity_size_samples(&doc, &SizeFilter::parse("multi_dob")).unwrap();
    assert_eq!(reviewed[0].review_title(), "ENTITY SIZE 2 - REVIEW FOR: multi_dob");
}
