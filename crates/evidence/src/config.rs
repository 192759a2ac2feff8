use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;

use crate::error::EvidenceError;
use crate::payload::de;

pub const AMBIGUOUS_FTYPE: &str = "AMBIGUOUS_ENTITY";

// ---------------------------------------------------------------------------
// Document shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    #[serde(rename = "G2_CONFIG")]
    g2_config: ConfigTables,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ConfigTables {
    #[serde(default)]
    cfg_dsrc: Vec<DsrcRow>,
    #[serde(default)]
    cfg_etype: Vec<EtypeRow>,
    #[serde(default)]
    cfg_errule: Vec<ErruleRow>,
    cfg_ftype: Vec<FtypeRow>,
    #[serde(default)]
    cfg_cfunc: Vec<CfuncRow>,
    #[serde(default)]
    cfg_cfrtn: Vec<CfrtnRow>,
    #[serde(default)]
    cfg_cfcall: Vec<CfcallRow>,
    #[serde(default)]
    cfg_attr: Vec<AttrRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct DsrcRow {
    #[serde(deserialize_with = "de::loose_i64")]
    dsrc_id: i64,
    dsrc_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct EtypeRow {
    #[serde(deserialize_with = "de::loose_i64")]
    etype_id: i64,
    etype_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ErruleRow {
    #[serde(deserialize_with = "de::loose_i64")]
    errule_id: i64,
    errule_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct FtypeRow {
    #[serde(deserialize_with = "de::loose_i64")]
    ftype_id: i64,
    ftype_code: String,
    #[serde(default, deserialize_with = "de::flag")]
    ftype_excl: bool,
    #[serde(default, deserialize_with = "de::flag")]
    used_for_cand: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct CfuncRow {
    #[serde(deserialize_with = "de::loose_i64")]
    cfunc_id: i64,
    cfunc_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct CfrtnRow {
    #[serde(deserialize_with = "de::loose_i64")]
    cfunc_id: i64,
    #[serde(default, deserialize_with = "de::loose_i64")]
    close_score: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct CfcallRow {
    #[serde(deserialize_with = "de::loose_i64")]
    ftype_id: i64,
    #[serde(deserialize_with = "de::loose_i64")]
    cfunc_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct AttrRow {
    attr_code: String,
    #[serde(default, deserialize_with = "de::flag")]
    internal: bool,
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonFunctionConfig {
    pub id: i64,
    pub code: String,
    /// Full scores at or above this are labeled CLOSE.
    pub close_score: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRuleConfig {
    pub id: i64,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTypeConfig {
    pub id: i64,
    pub code: String,
    pub exclusive: bool,
    pub used_for_candidates: bool,
    /// Display rank, starting at 1.
    pub sequence: usize,
    /// Present when the feature type is scored.
    pub comparison: Option<ComparisonFunctionConfig>,
}

/// Read-only lookups over the engine configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct ConfigIndex {
    ftypes: BTreeMap<i64, FeatureTypeConfig>,
    ftype_codes: HashMap<String, i64>,
    dsrc_by_id: BTreeMap<i64, String>,
    dsrc_by_code: HashMap<String, i64>,
    etypes: BTreeMap<i64, String>,
    rules: BTreeMap<i64, ResolutionRuleConfig>,
    rule_codes: HashMap<String, i64>,
    internal_attrs: HashMap<String, bool>,
    ambiguous_ftype_id: i64,
}

impl ConfigIndex {
    pub fn from_json(text: &str) -> Result<Self, EvidenceError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| EvidenceError::ConfigParse(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, EvidenceError> {
        let doc = ConfigDocument::deserialize(value)
            .map_err(|e| EvidenceError::ConfigParse(e.to_string()))?;
        Self::build(doc.g2_config)
    }

    fn build(tables: ConfigTables) -> Result<Self, EvidenceError> {
        let cfuncs: HashMap<i64, String> =
            tables.cfg_cfunc.into_iter().map(|r| (r.cfunc_id, r.cfunc_code)).collect();

        // Several return rows per function; the last one read is kept.
        let mut close_scores: HashMap<i64, i64> = HashMap::new();
        for row in tables.cfg_cfrtn {
            close_scores.insert(row.cfunc_id, row.close_score);
        }

        let mut ftypes: BTreeMap<i64, FeatureTypeConfig> = BTreeMap::new();
        let mut ftype_codes = HashMap::new();
        for row in tables.cfg_ftype {
            ftype_codes.insert(row.ftype_code.clone(), row.ftype_id);
            ftypes.insert(
                row.ftype_id,
                FeatureTypeConfig {
                    id: row.ftype_id,
                    code: row.ftype_code,
                    exclusive: row.ftype_excl,
                    used_for_candidates: row.used_for_cand,
                    sequence: usize::MAX,
                    comparison: None,
                },
            );
        }

        let mut cfcalls = tables.cfg_cfcall;
        cfcalls.sort_by_key(|r| r.ftype_id);
        for call in &cfcalls {
            let code = cfuncs.get(&call.cfunc_id).ok_or_else(|| {
                EvidenceError::ConfigValidation(format!(
                    "CFG_CFCALL references unknown comparison function {}",
                    call.cfunc_id
                ))
            })?;
            let ftype = ftypes.get_mut(&call.ftype_id).ok_or_else(|| {
                EvidenceError::ConfigValidation(format!(
                    "CFG_CFCALL references unknown feature type {}",
                    call.ftype_id
                ))
            })?;
            ftype.comparison = Some(ComparisonFunctionConfig {
                id: call.cfunc_id,
                code: code.clone(),
                close_score: close_scores.get(&call.cfunc_id).copied(),
            });
        }

        let ambiguous_ftype_id = *ftype_codes.get(AMBIGUOUS_FTYPE).ok_or_else(|| {
            EvidenceError::ConfigValidation(format!("feature type {AMBIGUOUS_FTYPE} is not configured"))
        })?;

        let mut next = 1;
        let mut assign = |ftypes: &mut BTreeMap<i64, FeatureTypeConfig>, id: i64| {
            if let Some(f) = ftypes.get_mut(&id) {
                if f.sequence == usize::MAX {
                    f.sequence = next;
                    next += 1;
                }
            }
        };
        assign(&mut ftypes, ambiguous_ftype_id);
        for call in &cfcalls {
            assign(&mut ftypes, call.ftype_id);
        }
        let ids: Vec<i64> = ftypes.keys().copied().collect();
        for id in ids {
            assign(&mut ftypes, id);
        }

        let internal_attrs = tables
            .cfg_attr
            .into_iter()
            .map(|r| (r.attr_code.to_uppercase(), r.internal))
            .collect();

        log::debug!(
            "config index: {} feature types, {} scored, {} data sources",
            ftypes.len(),
            cfcalls.len(),
            tables.cfg_dsrc.len()
        );

        Ok(Self {
            ftypes,
            ftype_codes,
            dsrc_by_code: tables.cfg_dsrc.iter().map(|r| (r.dsrc_code.clone(), r.dsrc_id)).collect(),
            dsrc_by_id: tables.cfg_dsrc.into_iter().map(|r| (r.dsrc_id, r.dsrc_code)).collect(),
            etypes: tables.cfg_etype.into_iter().map(|r| (r.etype_id, r.etype_code)).collect(),
            rule_codes: tables.cfg_errule.iter().map(|r| (r.errule_code.clone(), r.errule_id)).collect(),
            rules: tables
                .cfg_errule
                .into_iter()
                .map(|r| (r.errule_id, ResolutionRuleConfig { id: r.errule_id, code: r.errule_code }))
                .collect(),
            internal_attrs,
            ambiguous_ftype_id,
        })
    }

    pub fn ftype(&self, id: i64) -> Option<&FeatureTypeConfig> {
        self.ftypes.get(&id)
    }

    pub fn ftype_by_code(&self, code: &str) -> Option<&FeatureTypeConfig> {
        self.ftype_codes.get(code).and_then(|id| self.ftypes.get(id))
    }

    /// Feature types in display order.
    pub fn ftypes(&self) -> Vec<&FeatureTypeConfig> {
        let mut all: Vec<_> = self.ftypes.values().collect();
        all.sort_by_key(|f| f.sequence);
        all
    }

    pub fn data_source_id(&self, code: &str) -> Option<i64> {
        self.dsrc_by_code.get(code).copied()
    }

    pub fn data_source_code(&self, id: i64) -> Option<&str> {
        self.dsrc_by_id.get(&id).map(String::as_str)
    }

    pub fn has_data_source(&self, code: &str) -> bool {
        self.dsrc_by_code.contains_key(code)
    }

    pub fn data_sources(&self) -> impl Iterator<Item = &str> {
        self.dsrc_by_id.values().map(String::as_str)
    }

    pub fn has_entity_type(&self, code: &str) -> bool {
        self.etypes.values().any(|c| c == code)
    }

    /// Resolution rule named in engine match results.
    pub fn rule_by_code(&self, code: &str) -> Option<&ResolutionRuleConfig> {
        self.rule_codes.get(code).and_then(|id| self.rules.get(id))
    }

    /// Comparison function called for a scored feature type.
    pub fn comparison_function(&self, ftype_code: &str) -> Option<&ComparisonFunctionConfig> {
        self.ftype_by_code(ftype_code).and_then(|f| f.comparison.as_ref())
    }

    pub fn comparison_code(&self, ftype_code: &str) -> Option<&str> {
        self.comparison_function(ftype_code).map(|c| c.code.as_str())
    }

    /// Display rank; unknown feature types sort last.
    pub fn sequence(&self, ftype_id: i64) -> usize {
        self.ftypes.get(&ftype_id).map_or(usize::MAX, |f| f.sequence)
    }

    pub fn sequence_by_code(&self, code: &str) -> usize {
        self.ftype_by_code(code).map_or(usize::MAX, |f| f.sequence)
    }

    pub fn ambiguous_ftype_id(&self) -> i64 {
        self.ambiguous_ftype_id
    }

    /// `attr` may carry a `:usage` suffix, e.g. `ADDR_LINE1:HOME`.
    pub fn is_internal_attribute(&self, attr: &str) -> bool {
        let code = attr.split(':').next().unwrap_or(attr).trim().to_uppercase();
        self.internal_attrs.get(&code).copied().unwrap_or(false)
    }
}
