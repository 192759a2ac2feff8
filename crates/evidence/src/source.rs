//! Seams to the resolution engine and its relational store.
//!
//! Documents cross these boundaries as raw `serde_json::Value`s; the typed
//! views live in [`crate::payload`].

use serde_json::Value;

use crate::error::EvidenceError;

/// Entity resolution engine calls used by the console.
///
/// Reads report a missing entity or record as [`EvidenceError::NotFound`],
/// never as an engine failure.
pub trait ResolutionEngine {
    fn get_entity_by_entity_id(&self, entity_id: i64) -> Result<Value, EvidenceError>;

    fn get_entity_by_record_id(
        &self,
        data_source: &str,
        record_id: &str,
    ) -> Result<Value, EvidenceError>;

    fn why_entity_by_entity_id(&self, entity_id: i64) -> Result<Value, EvidenceError>;

    fn search_by_attributes(&self, attributes: &Value) -> Result<Value, EvidenceError>;

    fn add_record(
        &mut self,
        data_source: &str,
        record_id: &str,
        record: &Value,
    ) -> Result<(), EvidenceError>;

    fn delete_record(&mut self, data_source: &str, record_id: &str) -> Result<(), EvidenceError>;

    fn get_record(&self, data_source: &str, record_id: &str) -> Result<Value, EvidenceError>;
}

/// A library feature attached to an observed record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFeature {
    pub ftype_id: i64,
    pub lib_feat_id: i64,
    pub feat_desc: String,
}

/// Read-only lookups against the engine's relational store.
///
/// `Ok(None)` means the row does not exist.
pub trait EvidenceStore {
    /// `LIB_FEAT.FELEM_VALUES`, a `code:value|code:value` string.
    fn feature_element_values(&self, lib_feat_id: i64) -> Result<Option<String>, EvidenceError>;

    fn feature_description(&self, lib_feat_id: i64) -> Result<Option<String>, EvidenceError>;

    /// The entity plus every entity it is ambiguously related to, or `None`
    /// when the entity holds no ambiguous feature.
    fn ambiguous_entity_set(
        &self,
        entity_id: i64,
        ambiguous_ftype_id: i64,
    ) -> Result<Option<Vec<i64>>, EvidenceError>;

    /// Features of one record ordered by feature type, or `None` when the
    /// record is not in the store.
    fn record_features(
        &self,
        dsrc_id: Option<i64>,
        record_id: &str,
    ) -> Result<Option<Vec<StoredFeature>>, EvidenceError>;
}
