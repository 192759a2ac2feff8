use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Map, Value};

use crate::config::ConfigIndex;
use crate::error::EvidenceError;
use crate::model::{
    AnalysisMode, CrossRelation, EngineKey, EvidenceSet, FeatureEvidence, FeatureScore,
    MemberEvidence,
};
use crate::payload::{
    EntityRecord, EntityResponse, FeatDescValue, ResolvedEntity, ScoreRecord, SearchResponse,
    WhyResponse, WhyResult,
};
use crate::source::ResolutionEngine;

/// Gathers per-member feature evidence from the engine.
pub struct Collector<'a> {
    engine: &'a dyn ResolutionEngine,
    index: &'a ConfigIndex,
}

struct Consolidated<'r> {
    ftype_code: &'r str,
    usage_type: &'r str,
    value: &'r FeatDescValue,
}

impl<'a> Collector<'a> {
    pub fn new(engine: &'a dyn ResolutionEngine, index: &'a ConfigIndex) -> Self {
        Self { engine, index }
    }

    /// One id explains a resolved entity; two or more explain why the
    /// listed entities did not resolve.
    pub fn collect(&self, entity_ids: &[i64]) -> Result<EvidenceSet, EvidenceError> {
        let mut ids: Vec<i64> = Vec::with_capacity(entity_ids.len());
        for id in entity_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        match ids.as_slice() {
            [] => Err(EvidenceError::argument("", "expected one or more entity ids")),
            [id] => self.single_entity(*id),
            _ => self.why_not(&ids),
        }
    }

    // -----------------------------------------------------------------------
    // Single entity
    // -----------------------------------------------------------------------

    fn single_entity(&self, entity_id: i64) -> Result<EvidenceSet, EvidenceError> {
        let why = WhyResponse::from_value(&self.engine.why_entity_by_entity_id(entity_id)?)?;
        let resolved = first_resolved(&why, entity_id)?;
        let consolidated = consolidated_features(resolved);

        let mut members: BTreeMap<i64, MemberEvidence> = BTreeMap::new();
        for record in &resolved.records {
            let member = members
                .entry(record.internal_id)
                .or_insert_with(|| MemberEvidence::new(record.internal_id));
            member.data_sources.push(data_source_line(record));

            for feature in &record.features {
                if member.has_feature(feature.lib_feat_id) {
                    continue;
                }
                let evidence = match consolidated.get(&feature.lib_feat_id) {
                    Some(c) => {
                        let usage = if feature.utype_code.is_empty() {
                            c.usage_type
                        } else {
                            feature.utype_code.as_str()
                        };
                        match self.evidence_from(member.member, c.ftype_code, usage, c.value) {
                            Some(e) => e,
                            None => continue,
                        }
                    }
                    None => {
                        log::warn!(
                            "feature {} of record {} is missing from the entity features",
                            feature.lib_feat_id,
                            record.record_id
                        );
                        FeatureEvidence::missing(member.member, feature.lib_feat_id)
                    }
                };
                member.features.push(evidence);
            }
        }

        for result in &why.why_results {
            if let Some(member) = members.get_mut(&result.internal_id) {
                self.apply_why_result(member, result);
            }
        }

        Ok(EvidenceSet {
            mode: AnalysisMode::SingleEntity { entity_id },
            members: members.into_values().collect(),
        })
    }

    fn apply_why_result(&self, member: &mut MemberEvidence, result: &WhyResult) {
        let info = &result.match_info;
        member.engine_keys.push(EngineKey {
            match_key: info.why_key.clone(),
            rule_code: info.why_errule_code.clone(),
            other_entity: None,
        });

        for keys in info.candidate_keys.values() {
            for key in keys {
                match member.feature_mut(key.feat_id) {
                    Some(feature) => feature.was_candidate = true,
                    None => log::warn!("candidate feature {} not in record", key.feat_id),
                }
            }
        }

        for (ftype_code, scores) in &info.feature_scores {
            for score in scores {
                // Inbound and candidate sides are sometimes reversed.
                let (own_id, own_desc, other_id, other_desc) =
                    if member.has_feature(score.inbound_feat_id) {
                        (score.inbound_feat_id, &score.inbound_feat, score.candidate_feat_id, &score.candidate_feat)
                    } else if member.has_feature(score.candidate_feat_id) {
                        (score.candidate_feat_id, &score.candidate_feat, score.inbound_feat_id, &score.inbound_feat)
                    } else {
                        log::warn!("scored feature {} not in record", score.inbound_feat_id);
                        continue;
                    };
                let known_ftype = self.index.ftype_by_code(ftype_code);
                let Some(feature) = member.feature_mut(own_id) else {
                    continue;
                };
                let value = score.score();
                if feature.score.as_ref().is_some_and(|s| value <= s.score) {
                    continue;
                }
                feature.score = Some(FeatureScore {
                    score: value,
                    display: score.display(),
                    bucket: score.score_bucket.clone(),
                    counterpart: other_desc.clone(),
                    counterpart_id: Some(other_id),
                });
                if feature.is_missing() {
                    if let Some(ftype) = known_ftype {
                        feature.ftype_id = Some(ftype.id);
                        feature.ftype_code = ftype.code.clone();
                        feature.description = own_desc.clone();
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Why not
    // -----------------------------------------------------------------------

    fn why_not(&self, entity_ids: &[i64]) -> Result<EvidenceSet, EvidenceError> {
        let mut members = Vec::with_capacity(entity_ids.len());
        for &entity_id in entity_ids {
            members.push(self.why_not_member(entity_id, entity_ids)?);
        }
        members.sort_by_key(|m| m.member);

        // A library feature held by two listed entities was shared outright.
        let held: Vec<HashSet<i64>> = members
            .iter()
            .map(|m| m.features.iter().map(|f| f.lib_feat_id).collect())
            .collect();
        for (i, member) in members.iter_mut().enumerate() {
            for feature in &mut member.features {
                let shared = held
                    .iter()
                    .enumerate()
                    .any(|(j, ids)| j != i && ids.contains(&feature.lib_feat_id));
                if shared {
                    feature.was_candidate = feature.used_for_candidates;
                }
            }
        }

        Ok(EvidenceSet {
            mode: AnalysisMode::WhyNot { entity_ids: entity_ids.to_vec() },
            members,
        })
    }

    fn why_not_member(
        &self,
        entity_id: i64,
        listed: &[i64],
    ) -> Result<MemberEvidence, EvidenceError> {
        let why = WhyResponse::from_value(&self.engine.why_entity_by_entity_id(entity_id)?)?;
        let resolved = first_resolved(&why, entity_id)?;

        let mut member = MemberEvidence::new(entity_id);
        member.data_sources = resolved.records.iter().map(data_source_line).collect();

        for (ftype_code, entries) in &resolved.features {
            for entry in entries {
                for value in &entry.feat_desc_values {
                    if member.has_feature(value.lib_feat_id) {
                        continue;
                    }
                    if let Some(e) = self.evidence_from(entity_id, ftype_code, &entry.utype_code, value) {
                        member.features.push(e);
                    }
                }
            }
        }

        let entity = EntityResponse::from_value(&self.engine.get_entity_by_entity_id(entity_id)?)?;
        member.relations = entity
            .related_entities
            .iter()
            .filter(|r| r.entity_id != entity_id && listed.contains(&r.entity_id))
            .map(|r| CrossRelation {
                entity_id: r.entity_id,
                match_key: r.match_key.clone(),
                rule_code: r.errule_code.clone(),
            })
            .collect();

        let document = merge_search_document(&resolved.records);
        let search = SearchResponse::from_value(&self.engine.search_by_attributes(&document)?)?;
        for found in search.entities() {
            if found.entity_id == entity_id || !listed.contains(&found.entity_id) {
                continue;
            }
            member.engine_keys.push(EngineKey {
                match_key: found.match_key.clone(),
                rule_code: found.errule_code.clone(),
                other_entity: Some(found.entity_id),
            });
            for (ftype_code, scores) in &found.match_scores {
                let Some(best) = best_score(scores) else {
                    continue;
                };
                self.apply_search_score(&mut member, ftype_code, best, &found.match_key);
            }
        }

        Ok(member)
    }

    fn apply_search_score(
        &self,
        member: &mut MemberEvidence,
        ftype_code: &str,
        best: &ScoreRecord,
        match_key: &str,
    ) {
        let Some(feature) = member.features.iter_mut().find(|f| {
            f.ftype_code == ftype_code
                && (f.description == best.inbound_feat || f.description == best.candidate_feat)
        }) else {
            return;
        };
        let value = best.score();
        if feature.score.as_ref().is_some_and(|s| value <= s.score) {
            return;
        }
        let counterpart = if feature.description == best.inbound_feat {
            best.candidate_feat.clone()
        } else {
            best.inbound_feat.clone()
        };
        feature.score = Some(FeatureScore {
            score: value,
            display: best.display(),
            bucket: self.search_bucket(ftype_code, best, match_key).to_string(),
            counterpart,
            counterpart_id: None,
        });
    }

    fn search_bucket(&self, ftype_code: &str, score: &ScoreRecord, match_key: &str) -> &'static str {
        let value = score.score();
        if value == 100 {
            return "SAME";
        }
        let close = if score.is_name_score() {
            match_key.contains("NAME")
        } else {
            self.index
                .comparison_function(ftype_code)
                .and_then(|c| c.close_score)
                .is_some_and(|close| value >= close)
        };
        if close {
            "CLOSE"
        } else {
            "DIFF"
        }
    }

    fn evidence_from(
        &self,
        member: i64,
        ftype_code: &str,
        usage_type: &str,
        value: &FeatDescValue,
    ) -> Option<FeatureEvidence> {
        let Some(ftype) = self.index.ftype_by_code(ftype_code) else {
            log::warn!("feature type {ftype_code} is not configured; feature {} skipped", value.lib_feat_id);
            return None;
        };
        Some(FeatureEvidence {
            member,
            ftype_id: Some(ftype.id),
            ftype_code: ftype.code.clone(),
            lib_feat_id: value.lib_feat_id,
            description: value.feat_desc.clone(),
            usage_type: usage_type.to_string(),
            used_for_candidates: value.used_for_cand,
            used_for_scoring: value.used_for_scoring,
            candidate_cap_reached: value.candidate_cap_reached,
            scoring_cap_reached: value.scoring_cap_reached,
            suppressed: value.suppressed,
            entity_count: value.entity_count,
            was_candidate: false,
            score: None,
        })
    }
}

fn first_resolved(why: &WhyResponse, entity_id: i64) -> Result<&ResolvedEntity, EvidenceError> {
    why.entities
        .first()
        .map(|e| &e.resolved_entity)
        .filter(|r| !r.records.is_empty())
        .ok_or_else(|| EvidenceError::NotFound(entity_id.to_string()))
}

fn consolidated_features(resolved: &ResolvedEntity) -> HashMap<i64, Consolidated<'_>> {
    let mut found = HashMap::new();
    for (ftype_code, entries) in &resolved.features {
        for entry in entries {
            for value in &entry.feat_desc_values {
                found.entry(value.lib_feat_id).or_insert(Consolidated {
                    ftype_code,
                    usage_type: &entry.utype_code,
                    value,
                });
            }
        }
    }
    found
}

fn data_source_line(record: &EntityRecord) -> String {
    format!("{}: {}", record.data_source, record.record_id)
}

/// Highest score; the first record wins ties.
fn best_score(scores: &[ScoreRecord]) -> Option<&ScoreRecord> {
    scores.iter().fold(None, |best: Option<&ScoreRecord>, s| match best {
        Some(b) if s.score() <= b.score() => Some(b),
        _ => Some(s),
    })
}

/// Folds an entity's records into one search document: the first record as
/// is, list attributes of later records appended, and their scalar
/// attributes pushed as one object per record onto `ROOT_ATTRIBUTES`.
pub fn merge_search_document(records: &[EntityRecord]) -> Value {
    let mut merged = Map::new();
    let mut first = true;
    for record in records {
        let Value::Object(data) = &record.json_data else {
            continue;
        };
        if first {
            merged = data.clone();
            first = false;
            continue;
        }
        let mut scalars = Map::new();
        for (key, value) in data {
            match (value, merged.get_mut(key)) {
                (Value::Array(items), Some(Value::Array(existing))) => {
                    existing.extend(items.iter().cloned());
                }
                (Value::Array(_), None) => {
                    merged.insert(key.clone(), value.clone());
                }
                _ => {
                    scalars.insert(key.clone(), value.clone());
                }
            }
        }
        if !scalars.is_empty() {
            let root = merged
                .entry("ROOT_ATTRIBUTES")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(list) = root {
                list.push(Value::Object(scalars));
            }
        }
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{config, FixtureEngine};
    use serde_json::json;

    fn single_why() -> Value {
        json!({
            "WHY_RESULTS": [
                { "INTERNAL_ID": 11, "ENTITY_ID": 1, "MATCH_INFO": {
                    "WHY_KEY": "+NAME+SSN", "WHY_ERRULE_CODE": "SF1_PNAME",
                    "CANDIDATE_KEYS": { "SSN": [ { "FEAT_ID": 103, "FEAT_DESC": "123-45-6789" } ] },
                    "FEATURE_SCORES": {
                        "NAME": [
                            { "INBOUND_FEAT_ID": 101, "INBOUND_FEAT": "JOHN SMITH",
                              "CANDIDATE_FEAT_ID": 201, "CANDIDATE_FEAT": "JON SMITH",
                              "GNR_FN": 90, "GNR_GN": 85, "GNR_SN": 100, "SCORE_BUCKET": "CLOSE" },
                            { "INBOUND_FEAT_ID": 101, "INBOUND_FEAT": "JOHN SMITH",
                              "CANDIDATE_FEAT_ID": 202, "CANDIDATE_FEAT": "J SMITH",
                              "GNR_FN": 70, "SCORE_BUCKET": "PLAUSIBLE" }
                        ],
                        "PHONE": [
                            { "INBOUND_FEAT_ID": 206, "INBOUND_FEAT": "555-1234",
                              "CANDIDATE_FEAT_ID": 999, "CANDIDATE_FEAT": "555-1234",
                              "FULL_SCORE": 100, "SCORE_BUCKET": "SAME" }
                        ]
                    }
                }},
                { "INTERNAL_ID": 12, "ENTITY_ID": 1, "MATCH_INFO": {
                    "WHY_KEY": "", "WHY_ERRULE_CODE": "", "CANDIDATE_KEYS": {}, "FEATURE_SCORES": {}
                }}
            ],
            "ENTITIES": [ { "RESOLVED_ENTITY": {
                "ENTITY_ID": 1,
                "FEATURES": {
                    "NAME": [ { "FEAT_DESC": "JOHN SMITH", "LIB_FEAT_ID": 101, "UTYPE_CODE": "PRIMARY",
                        "FEAT_DESC_VALUES": [
                            { "FEAT_DESC": "JOHN SMITH", "LIB_FEAT_ID": 101, "USED_FOR_CAND": "N", "USED_FOR_SCORING": "Y", "ENTITY_COUNT": 1 },
                            { "FEAT_DESC": "JON SMITH", "LIB_FEAT_ID": 201, "USED_FOR_CAND": "N", "USED_FOR_SCORING": "Y", "ENTITY_COUNT": 1 }
                        ] } ],
                    "SSN": [ { "FEAT_DESC": "123-45-6789", "LIB_FEAT_ID": 103,
                        "FEAT_DESC_VALUES": [
                            { "FEAT_DESC": "123-45-6789", "LIB_FEAT_ID": 103, "USED_FOR_CAND": "Y", "USED_FOR_SCORING": "Y", "ENTITY_COUNT": 1 }
                        ] } ]
                },
                "RECORDS": [
                    { "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "1001", "INTERNAL_ID": 11,
                      "FEATURES": [ { "LIB_FEAT_ID": 101 }, { "LIB_FEAT_ID": 103 } ] },
                    { "DATA_SOURCE": "WATCHLIST", "RECORD_ID": "W-7", "INTERNAL_ID": 12,
                      "FEATURES": [ { "LIB_FEAT_ID": 201 }, { "LIB_FEAT_ID": 103 }, { "LIB_FEAT_ID": 206 } ] },
                    { "DATA_SOURCE": "WATCHLIST", "RECORD_ID": "W-8", "INTERNAL_ID": 12,
                      "FEATURES": [ { "LIB_FEAT_ID": 201 } ] }
                ]
            } } ]
        })
    }

    #[test]
    fn single_entity_members_are_internal_ids() {
        let index = config();
        let engine = FixtureEngine::new().with_why(1, single_why());
        let set = Collector::new(&engine, &index).collect(&[1]).unwrap();

        assert_eq!(set.mode, AnalysisMode::SingleEntity { entity_id: 1 });
        let ids: Vec<i64> = set.members.iter().map(|m| m.member).collect();
        assert_eq!(ids, vec![11, 12]);
        assert_eq!(set.members[1].data_sources, vec!["WATCHLIST: W-7", "WATCHLIST: W-8"]);
        assert_eq!(set.members[0].engine_keys[0].rule_code, "SF1_PNAME");
    }

    #[test]
    fn best_score_wins_and_candidate_keys_mark_features() {
        let index = config();
        let engine = FixtureEngine::new().with_why(1, single_why());
        let set = Collector::new(&engine, &index).collect(&[1]).unwrap();
        let member = &set.members[0];

        let name = member.features.iter().find(|f| f.lib_feat_id == 101).unwrap();
        let score = name.score.as_ref().unwrap();
        assert_eq!(score.score, 90);
        assert_eq!(score.display, "full:90|giv:85|sur:100");
        assert_eq!(score.counterpart, "JON SMITH");
        assert_eq!(name.usage_type, "PRIMARY");

        let ssn = member.features.iter().find(|f| f.lib_feat_id == 103).unwrap();
        assert!(ssn.was_candidate);
    }

    #[test]
    fn missing_consolidated_feature_becomes_sentinel_until_scored() {
        let index = config();
        let engine = FixtureEngine::new().with_why(1, single_why());
        let set = Collector::new(&engine, &index).collect(&[1]).unwrap();
        let member = &set.members[1];

        // 206 is reported under member 11's why result, so member 12 keeps the sentinel.
        let phone = member.features.iter().find(|f| f.lib_feat_id == 206).unwrap();
        assert!(phone.is_missing());
        assert_eq!(phone.description, "missing 206");
        assert_eq!(phone.entity_count, -1);
    }

    #[test]
    fn sentinel_is_replaced_by_scored_feature_type() {
        let mut why = single_why();
        why["WHY_RESULTS"][1]["MATCH_INFO"]["FEATURE_SCORES"] = json!({
            "PHONE": [ { "INBOUND_FEAT_ID": 999, "INBOUND_FEAT": "555-1234",
                         "CANDIDATE_FEAT_ID": 206, "CANDIDATE_FEAT": "555-1234",
                         "FULL_SCORE": 100, "SCORE_BUCKET": "SAME" } ]
        });
        let index = config();
        let engine = FixtureEngine::new().with_why(1, why);
        let set = Collector::new(&engine, &index).collect(&[1]).unwrap();

        let phone = set.members[1].features.iter().find(|f| f.lib_feat_id == 206).unwrap();
        assert!(!phone.is_missing());
        assert_eq!(phone.ftype_code, "PHONE");
        assert_eq!(phone.description, "555-1234");
        assert_eq!(phone.score.as_ref().unwrap().counterpart_id, Some(999));
    }

    #[test]
    fn empty_entity_is_not_found() {
        let index = config();
        let engine = FixtureEngine::new().with_why(5, json!({ "WHY_RESULTS": [], "ENTITIES": [] }));
        let err = Collector::new(&engine, &index).collect(&[5]).unwrap_err();
        assert!(matches!(err, EvidenceError::NotFound(ref id) if id == "5"));
    }

    #[test]
    fn no_ids_is_argument_error() {
        let index = config();
        let engine = FixtureEngine::new();
        let err = Collector::new(&engine, &index).collect(&[]).unwrap_err();
        assert!(matches!(err, EvidenceError::Argument { .. }));
    }

    #[test]
    fn merge_appends_lists_and_collects_scalars() {
        let records: Vec<EntityRecord> = serde_json::from_value(json!([
            { "DATA_SOURCE": "A", "RECORD_ID": "1",
              "JSON_DATA": { "NAME_FULL": "JOHN SMITH", "PHONES": [ { "PHONE_NUMBER": "1" } ] } },
            { "DATA_SOURCE": "B", "RECORD_ID": "2",
              "JSON_DATA": { "NAME_FULL": "J SMITH", "PHONES": [ { "PHONE_NUMBER": "2" } ],
                             "ADDRESSES": [ { "ADDR_FULL": "1 MAIN ST" } ] } }
        ]))
        .unwrap();
        let merged = merge_search_document(&records);
        assert_eq!(merged["NAME_FULL"], "JOHN SMITH");
        assert_eq!(merged["PHONES"].as_array().unwrap().len(), 2);
        assert_eq!(merged["ADDRESSES"][0]["ADDR_FULL"], "1 MAIN ST");
        assert_eq!(merged["ROOT_ATTRIBUTES"], json!([ { "NAME_FULL": "J SMITH" } ]));
    }

    #[test]
    fn best_score_keeps_first_on_ties() {
        let scores: Vec<ScoreRecord> = serde_json::from_value(json!([
            { "INBOUND_FEAT": "a", "FULL_SCORE": 80 },
            { "INBOUND_FEAT": "b", "FULL_SCORE": 80 },
            { "INBOUND_FEAT": "c", "FULL_SCORE": 60 }
        ]))
        .unwrap();
        assert_eq!(best_score(&scores).unwrap().inbound_feat, "a");
        assert!(best_score(&[]).is_none());
    }
}
