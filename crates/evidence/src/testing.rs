//! In-memory engine and store doubles shared by unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use serde_json::{json, Value};

use crate::config::ConfigIndex;
use crate::error::EvidenceError;
use crate::source::{EvidenceStore, ResolutionEngine, StoredFeature};

pub fn config_value() -> Value {
    json!({ "G2_CONFIG": {
        "CFG_DSRC": [
            { "DSRC_ID": 1, "DSRC_CODE": "CUSTOMERS" },
            { "DSRC_ID": 2, "DSRC_CODE": "WATCHLIST" },
            { "DSRC_ID": 3, "DSRC_CODE": "TEST" }
        ],
        "CFG_ETYPE": [ { "ETYPE_ID": 3, "ETYPE_CODE": "TEST" } ],
        "CFG_ERRULE": [ { "ERRULE_ID": 100, "ERRULE_CODE": "SF1_PNAME" } ],
        "CFG_FTYPE": [
            { "FTYPE_ID": 1, "FTYPE_CODE": "NAME", "FTYPE_EXCL": "No", "USED_FOR_CAND": "No" },
            { "FTYPE_ID": 2, "FTYPE_CODE": "DOB", "FTYPE_EXCL": "Yes", "USED_FOR_CAND": "No" },
            { "FTYPE_ID": 3, "FTYPE_CODE": "SSN", "FTYPE_EXCL": "Yes", "USED_FOR_CAND": "Yes" },
            { "FTYPE_ID": 5, "FTYPE_CODE": "ADDRESS", "FTYPE_EXCL": "Yes", "USED_FOR_CAND": "No" },
            { "FTYPE_ID": 6, "FTYPE_CODE": "PHONE", "FTYPE_EXCL": "No", "USED_FOR_CAND": "Yes" },
            { "FTYPE_ID": 7, "FTYPE_CODE": "DRLIC", "FTYPE_EXCL": "Yes", "USED_FOR_CAND": "Yes" },
            { "FTYPE_ID": 20, "FTYPE_CODE": "RECORD_TYPE", "FTYPE_EXCL": "Yes", "USED_FOR_CAND": "No" },
            { "FTYPE_ID": 40, "FTYPE_CODE": "AMBIGUOUS_ENTITY", "FTYPE_EXCL": "No", "USED_FOR_CAND": "No" }
        ],
        "CFG_CFUNC": [
            { "CFUNC_ID": 1, "CFUNC_CODE": "GNR_COMP" },
            { "CFUNC_ID": 2, "CFUNC_CODE": "DOB_COMP" },
            { "CFUNC_ID": 3, "CFUNC_CODE": "SSN_COMP" },
            { "CFUNC_ID": 4, "CFUNC_CODE": "ADDR_COMP" },
            { "CFUNC_ID": 5, "CFUNC_CODE": "PHONE_COMP" },
            { "CFUNC_ID": 6, "CFUNC_CODE": "ID_COMP" }
        ],
        "CFG_CFRTN": [
            { "CFUNC_ID": 1, "CLOSE_SCORE": 85 },
            { "CFUNC_ID": 4, "CLOSE_SCORE": 80 }
        ],
        "CFG_CFCALL": [
            { "FTYPE_ID": 1, "CFUNC_ID": 1 },
            { "FTYPE_ID": 2, "CFUNC_ID": 2 },
            { "FTYPE_ID": 3, "CFUNC_ID": 3 },
            { "FTYPE_ID": 5, "CFUNC_ID": 4 },
            { "FTYPE_ID": 6, "CFUNC_ID": 5 },
            { "FTYPE_ID": 7, "CFUNC_ID": 6 }
        ],
        "CFG_ATTR": [
            { "ATTR_CODE": "NAME_FULL", "FTYPE_CODE": "NAME", "INTERNAL": "No" },
            { "ATTR_CODE": "REL_ANCHOR_KEY", "FTYPE_CODE": "REL_ANCHOR", "INTERNAL": "Yes" }
        ]
    }})
}

pub fn config() -> ConfigIndex {
    ConfigIndex::from_value(&config_value()).expect("test config")
}

#[derive(Default)]
pub struct FixtureEngine {
    pub why: HashMap<i64, Value>,
    pub entities: HashMap<i64, Value>,
    pub records: HashMap<(String, String), Value>,
    pub searches: RefCell<VecDeque<Value>>,
    pub added: Vec<(String, String, Value)>,
    pub deleted: Vec<(String, String)>,
}

impl FixtureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_why(mut self, entity_id: i64, doc: Value) -> Self {
        self.why.insert(entity_id, doc);
        self
    }

    pub fn with_entity(mut self, entity_id: i64, doc: Value) -> Self {
        self.entities.insert(entity_id, doc);
        self
    }

    pub fn with_record_entity(mut self, ds: &str, rid: &str, doc: Value) -> Self {
        self.records.insert((ds.to_string(), rid.to_string()), doc);
        self
    }

    pub fn with_search(self, doc: Value) -> Self {
        self.searches.borrow_mut().push_back(doc);
        self
    }
}

impl ResolutionEngine for FixtureEngine {
    fn get_entity_by_entity_id(&self, entity_id: i64) -> Result<Value, EvidenceError> {
        self.entities
            .get(&entity_id)
            .cloned()
            .ok_or_else(|| EvidenceError::NotFound(entity_id.to_string()))
    }

    fn get_entity_by_record_id(&self, ds: &str, rid: &str) -> Result<Value, EvidenceError> {
        self.records
            .get(&(ds.to_string(), rid.to_string()))
            .cloned()
            .ok_or_else(|| EvidenceError::NotFound(format!("{ds}: {rid}")))
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

    fn add_record(&mut self, ds: &str, rid: &str, record: &Value) -> Result<(), EvidenceError> {
        self.added.push((ds.to_string(), rid.to_string(), record.clone()));
        Ok(())
    }

    fn delete_record(&mut self, ds: &str, rid: &str) -> Result<(), EvidenceError> {
        self.deleted.push((ds.to_string(), rid.to_string()));
        Ok(())
    }

    fn get_record(&self, ds: &str, rid: &str) -> Result<Value, EvidenceError> {
        Err(EvidenceError::NotFound(format!("{ds}: {rid}")))
    }
}

#[derive(Default)]
pub struct FixtureStore {
    pub elements: HashMap<i64, String>,
    pub descriptions: HashMap<i64, String>,
    pub ambiguous: HashMap<i64, Vec<i64>>,
    pub records: HashMap<(Option<i64>, String), Vec<StoredFeature>>,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, dsrc_id: i64, rid: &str, features: &[(i64, i64, &str)]) -> Self {
        let features = features
            .iter()
            .map(|(ftype_id, lib_feat_id, desc)| StoredFeature {
                ftype_id: *ftype_id,
                lib_feat_id: *lib_feat_id,
                feat_desc: desc.to_string(),
            })
            .collect();
        self.records.insert((Some(dsrc_id), rid.to_string()), features);
        self
    }
}

impl EvidenceStore for FixtureStore {
    fn feature_element_values(&self, lib_feat_id: i64) -> Result<Option<String>, EvidenceError> {
        Ok(self.elements.get(&lib_feat_id).cloned())
    }

    fn feature_description(&self, lib_feat_id: i64) -> Result<Option<String>, EvidenceError> {
        Ok(self.descriptions.get(&lib_feat_id).cloned())
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
