//! Typed views of the engine's JSON documents.
//!
//! Only the fields the console reads are modeled; everything else is ignored.
//! Flags arrive as `"Y"`/`"N"`, booleans or integers depending on engine
//! version, so they go through [`de::flag`].

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::EvidenceError;

pub(crate) mod de {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
            Value::String(s) => {
                let s = s.trim().to_ascii_uppercase();
                s.starts_with('Y') || s == "1" || s == "TRUE"
            }
            _ => false,
        })
    }

    pub fn loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub fn loose_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(0),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64))
                .ok_or_else(|| D::Error::custom(format!("not an integer: {n}"))),
            Value::String(s) if s.trim().is_empty() => Ok(0),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("not an integer: {s}"))),
            other => Err(D::Error::custom(format!("not an integer: {other}"))),
        }
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))),
            Value::String(s) => Ok(s.trim().parse().ok()),
            _ => Ok(None),
        }
    }
}

fn from_value<T: serde::de::DeserializeOwned>(value: &Value, what: &str) -> Result<T, EvidenceError> {
    T::deserialize(value).map_err(|e| EvidenceError::Engine(format!("unreadable {what} response: {e}")))
}

// ---------------------------------------------------------------------------
// getEntityByEntityID / getEntityByRecordID
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EntityResponse {
    pub resolved_entity: ResolvedEntity,
    #[serde(default)]
    pub related_entities: Vec<RelatedEntity>,
}

impl EntityResponse {
    pub fn from_value(value: &Value) -> Result<Self, EvidenceError> {
        from_value(value, "entity")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ResolvedEntity {
    #[serde(deserialize_with = "de::loose_i64")]
    pub entity_id: i64,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub entity_name: String,
    #[serde(default)]
    pub features: BTreeMap<String, Vec<FeatureEntry>>,
    #[serde(default)]
    pub records: Vec<EntityRecord>,
}

/// One consolidated feature value; `feat_desc_values` lists the library
/// features folded into it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FeatureEntry {
    #[serde(default, deserialize_with = "de::loose_string")]
    pub feat_desc: String,
    #[serde(default, deserialize_with = "de::loose_i64")]
    pub lib_feat_id: i64,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub utype_code: String,
    #[serde(default)]
    pub feat_desc_values: Vec<FeatDescValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FeatDescValue {
    #[serde(default, deserialize_with = "de::loose_string")]
    pub feat_desc: String,
    #[serde(deserialize_with = "de::loose_i64")]
    pub lib_feat_id: i64,
    #[serde(default, deserialize_with = "de::flag")]
    pub used_for_cand: bool,
    #[serde(default, deserialize_with = "de::flag")]
    pub used_for_scoring: bool,
    #[serde(default, deserialize_with = "de::loose_i64")]
    pub entity_count: i64,
    #[serde(default, deserialize_with = "de::flag")]
    pub candidate_cap_reached: bool,
    #[serde(default, deserialize_with = "de::flag")]
    pub scoring_cap_reached: bool,
    #[serde(default, deserialize_with = "de::flag")]
    pub suppressed: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EntityRecord {
    #[serde(deserialize_with = "de::loose_string")]
    pub data_source: String,
    #[serde(deserialize_with = "de::loose_string")]
    pub record_id: String,
    #[serde(default, deserialize_with = "de::loose_i64")]
    pub internal_id: i64,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub match_key: String,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub errule_code: String,
    #[serde(default)]
    pub json_data: Value,
    #[serde(default)]
    pub features: Vec<RecordFeature>,
    #[serde(default)]
    pub name_data: Vec<String>,
    #[serde(default)]
    pub attribute_data: Vec<String>,
    #[serde(default)]
    pub identifier_data: Vec<String>,
    #[serde(default)]
    pub address_data: Vec<String>,
    #[serde(default)]
    pub phone_data: Vec<String>,
    #[serde(default)]
    pub relationship_data: Vec<String>,
    #[serde(default)]
    pub other_data: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RecordFeature {
    #[serde(deserialize_with = "de::loose_i64")]
    pub lib_feat_id: i64,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub utype_code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RelatedEntity {
    #[serde(deserialize_with = "de::loose_i64")]
    pub entity_id: i64,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub entity_name: String,
    #[serde(default, deserialize_with = "de::loose_i64")]
    pub match_level: i64,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub match_key: String,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub errule_code: String,
    #[serde(default, deserialize_with = "de::flag")]
    pub is_ambiguous: bool,
    #[serde(default)]
    pub record_summary: Vec<RecordSummary>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RecordSummary {
    #[serde(deserialize_with = "de::loose_string")]
    pub data_source: String,
    #[serde(default, deserialize_with = "de::loose_i64")]
    pub record_count: i64,
}

// ---------------------------------------------------------------------------
// whyEntityByEntityID
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct WhyResponse {
    #[serde(default)]
    pub why_results: Vec<WhyResult>,
    #[serde(default)]
    pub entities: Vec<EntityResponse>,
}

impl WhyResponse {
    pub fn from_value(value: &Value) -> Result<Self, EvidenceError> {
        from_value(value, "why")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct WhyResult {
    #[serde(default, deserialize_with = "de::loose_i64")]
    pub internal_id: i64,
    #[serde(default, deserialize_with = "de::loose_i64")]
    pub entity_id: i64,
    pub match_info: MatchInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MatchInfo {
    #[serde(default, deserialize_with = "de::loose_string")]
    pub why_key: String,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub why_errule_code: String,
    #[serde(default)]
    pub candidate_keys: BTreeMap<String, Vec<CandidateKey>>,
    #[serde(default)]
    pub feature_scores: BTreeMap<String, Vec<ScoreRecord>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CandidateKey {
    #[serde(deserialize_with = "de::loose_i64")]
    pub feat_id: i64,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub feat_desc: String,
}

/// Pairwise feature score, shared by why results and search results.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ScoreRecord {
    #[serde(default, deserialize_with = "de::loose_i64")]
    pub inbound_feat_id: i64,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub inbound_feat: String,
    #[serde(default, deserialize_with = "de::loose_i64")]
    pub candidate_feat_id: i64,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub candidate_feat: String,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub gnr_fn: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub gnr_on: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub gnr_gn: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub gnr_sn: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub full_score: Option<i64>,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub score_bucket: String,
}

impl ScoreRecord {
    /// Name scores use `GNR_FN`, everything else `FULL_SCORE`.
    pub fn score(&self) -> i64 {
        self.gnr_fn.or(self.full_score).unwrap_or(0)
    }

    pub fn is_name_score(&self) -> bool {
        self.gnr_fn.is_some()
    }

    pub fn display(&self) -> String {
        match self.gnr_fn {
            Some(full) => {
                if let Some(org) = self.gnr_on.filter(|s| *s > 0) {
                    return format!("org:{org}");
                }
                let mut text = format!("full:{full}");
                if let Some(giv) = self.gnr_gn.filter(|s| *s > 0) {
                    text.push_str(&format!("|giv:{giv}"));
                }
                if let Some(sur) = self.gnr_sn.filter(|s| *s > 0) {
                    text.push_str(&format!("|sur:{sur}"));
                }
                text
            }
            None => self.score().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// searchByAttributes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SearchResponse {
    pub search_response: SearchBody,
}

impl SearchResponse {
    pub fn from_value(value: &Value) -> Result<Self, EvidenceError> {
        from_value(value, "search")
    }

    pub fn entities(&self) -> &[SearchEntity] {
        &self.search_response.resolved_entities
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SearchBody {
    #[serde(default)]
    pub resolved_entities: Vec<SearchEntity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SearchEntity {
    #[serde(deserialize_with = "de::loose_i64")]
    pub entity_id: i64,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub entity_name: String,
    #[serde(default, deserialize_with = "de::loose_i64")]
    pub match_level: i64,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub match_key: String,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub errule_code: String,
    #[serde(default, deserialize_with = "de::loose_i64")]
    pub match_score: i64,
    #[serde(default)]
    pub match_scores: BTreeMap<String, Vec<ScoreRecord>>,
    #[serde(default)]
    pub records: Vec<SearchRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SearchRecord {
    #[serde(deserialize_with = "de::loose_string")]
    pub data_source: String,
    #[serde(deserialize_with = "de::loose_string")]
    pub record_id: String,
}

// ---------------------------------------------------------------------------
// getRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RecordResponse {
    #[serde(default, deserialize_with = "de::loose_string")]
    pub data_source: String,
    #[serde(default, deserialize_with = "de::loose_string")]
    pub record_id: String,
    #[serde(default)]
    pub json_data: Value,
}

impl RecordResponse {
    pub fn from_value(value: &Value) -> Result<Self, EvidenceError> {
        from_value(value, "record")
    }
}
