use std::collections::BTreeMap;

use crate::ambiguous;
use crate::compare::Comparator;
use crate::config::ConfigIndex;
use crate::model::{
    AmbiguousFeature, AnalysisMode, Classification, ClassifiedFeature, ClassifiedMember,
    EvidenceSet, FeatureEvidence, IgnoredCode, MatchCode, MemberEvidence, Sign, WhyKey, WhyTerm,
};
use crate::source::EvidenceStore;

/// Addresses only conflict exclusively when they are business addresses.
const ADDRESS_FTYPE: &str = "ADDRESS";
const BUSINESS_USAGE: &str = "BUSINESS";

pub struct Classifier<'a> {
    index: &'a ConfigIndex,
    comparator: &'a Comparator,
    store: Option<&'a dyn EvidenceStore>,
}

impl<'a> Classifier<'a> {
    pub fn new(
        index: &'a ConfigIndex,
        comparator: &'a Comparator,
        store: Option<&'a dyn EvidenceStore>,
    ) -> Self {
        Self { index, comparator, store }
    }

    pub fn classify(&self, set: &EvidenceSet) -> Classification {
        let members = set
            .members
            .iter()
            .map(|member| self.classify_member(set, member))
            .collect();
        Classification { mode: set.mode.clone(), members }
    }

    fn classify_member(&self, set: &EvidenceSet, member: &MemberEvidence) -> ClassifiedMember {
        let ambiguous_id = self.index.ambiguous_ftype_id();
        let mut features = Vec::with_capacity(member.features.len());
        let mut ambiguous = Vec::new();

        for evidence in &member.features {
            if evidence.ftype_id == Some(ambiguous_id) {
                ambiguous.push(AmbiguousFeature {
                    lib_feat_id: evidence.lib_feat_id,
                    reason: ambiguous::describe(evidence.lib_feat_id, self.index, self.store),
                });
                continue;
            }
            features.push(self.classify_feature(evidence, &set.members));
        }
        features.sort_by(|a, b| a.cmp_for_display(b));

        let rule_code = governing_rule(&set.mode, member);
        if !rule_code.is_empty() && self.index.rule_by_code(&rule_code).is_none() {
            log::warn!("resolution rule {rule_code} is not in the engine configuration");
        }
        let why_key = WhyKey {
            terms: self.terms(&features),
            rule_code,
            no_candidates: set.members.len() >= 2 && !self.has_candidate_match(&features),
        };

        ClassifiedMember {
            member: member.member,
            data_sources: member.data_sources.clone(),
            features,
            ambiguous,
            why_key,
            engine_keys: member.engine_keys.clone(),
            relations: member.relations.clone(),
        }
    }

    fn classify_feature(
        &self,
        evidence: &FeatureEvidence,
        members: &[MemberEvidence],
    ) -> ClassifiedFeature {
        let match_code = if evidence.is_missing() {
            MatchCode::Unmatched
        } else {
            let peers: Vec<(i64, &str)> = members
                .iter()
                .filter(|m| m.member != evidence.member)
                .flat_map(|m| m.features.iter())
                .filter(|f| !f.is_missing() && f.ftype_code == evidence.ftype_code)
                .map(|f| (f.lib_feat_id, f.description.as_str()))
                .collect();
            compare_feature(
                self.comparator,
                &evidence.ftype_code,
                self.index.comparison_code(&evidence.ftype_code),
                (evidence.lib_feat_id, evidence.description.as_str()),
                &peers,
            )
        };
        ClassifiedFeature {
            match_code,
            ignored: IgnoredCode::for_evidence(evidence),
            exclusive: self.is_exclusive(&evidence.ftype_code, &evidence.usage_type),
            evidence: evidence.clone(),
        }
    }

    pub fn is_exclusive(&self, ftype_code: &str, usage_type: &str) -> bool {
        if ftype_code == ADDRESS_FTYPE {
            return usage_type.eq_ignore_ascii_case(BUSINESS_USAGE);
        }
        self.index.ftype_by_code(ftype_code).is_some_and(|f| f.exclusive)
    }

    /// One term per feature type in display order; a match outweighs a conflict.
    fn terms(&self, features: &[ClassifiedFeature]) -> Vec<WhyTerm> {
        let mut signs: BTreeMap<&str, Sign> = BTreeMap::new();
        for feature in features {
            let Some(sign) = feature.contributes() else {
                continue;
            };
            let entry = signs.entry(feature.evidence.ftype_code.as_str()).or_insert(sign);
            if sign == Sign::Plus {
                *entry = Sign::Plus;
            }
        }
        let mut terms: Vec<WhyTerm> = signs
            .into_iter()
            .map(|(code, sign)| WhyTerm { sign, ftype_code: code.to_string() })
            .collect();
        terms.sort_by(|a, b| {
            self.index
                .sequence_by_code(&a.ftype_code)
                .cmp(&self.index.sequence_by_code(&b.ftype_code))
                .then_with(|| a.ftype_code.cmp(&b.ftype_code))
        });
        terms
    }

    fn has_candidate_match(&self, features: &[ClassifiedFeature]) -> bool {
        features.iter().any(|f| {
            f.match_code == MatchCode::Matched
                && !f.ignored.is_ignored()
                && f.evidence.used_for_candidates
                && self
                    .index
                    .ftype_by_code(&f.evidence.ftype_code)
                    .is_some_and(|t| t.used_for_candidates)
        })
    }
}

/// Compare one value against every value of the same type held by the other
/// parties. A shared library feature id is an immediate match.
pub fn compare_feature(
    comparator: &Comparator,
    ftype_code: &str,
    cfunc_code: Option<&str>,
    own: (i64, &str),
    peers: &[(i64, &str)],
) -> MatchCode {
    if peers.is_empty() {
        return MatchCode::NotCompared;
    }
    let matched = peers.iter().any(|(lib_feat_id, description)| {
        *lib_feat_id == own.0 || comparator.is_close_enough(ftype_code, cfunc_code, own.1, description)
    });
    if matched {
        MatchCode::Matched
    } else {
        MatchCode::Conflicting
    }
}

fn governing_rule(mode: &AnalysisMode, member: &MemberEvidence) -> String {
    match mode {
        AnalysisMode::SingleEntity { .. } => member
            .engine_keys
            .first()
            .map(|k| k.rule_code.clone())
            .unwrap_or_default(),
        AnalysisMode::WhyNot { .. } => member
            .engine_keys
            .iter()
            .filter(|k| !k.rule_code.is_empty())
            .min_by_key(|k| k.other_entity)
            .map(|k| k.rule_code.clone())
            .or_else(|| {
                member
                    .relations
                    .iter()
                    .filter(|r| !r.rule_code.is_empty())
                    .min_by_key(|r| r.entity_id)
                    .map(|r| r.rule_code.clone())
            })
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EngineKey, UNKNOWN_FTYPE};
    use crate::testing::config;

    fn feature(member: i64, code: &str, lib: i64, desc: &str) -> FeatureEvidence {
        let index = config();
        FeatureEvidence {
            member,
            ftype_id: index.ftype_by_code(code).map(|f| f.id),
            ftype_code: code.to_string(),
            lib_feat_id: lib,
            description: desc.to_string(),
            usage_type: String::new(),
            used_for_candidates: true,
            used_for_scoring: true,
            candidate_cap_reached: false,
            scoring_cap_reached: false,
            suppressed: false,
            entity_count: 1,
            was_candidate: false,
            score: None,
        }
    }

    fn member(id: i64, features: Vec<FeatureEvidence>) -> MemberEvidence {
        let mut m = MemberEvidence::new(id);
        m.features = features;
        m
    }

    fn why_not(members: Vec<MemberEvidence>) -> EvidenceSet {
        EvidenceSet {
            mode: AnalysisMode::WhyNot { entity_ids: members.iter().map(|m| m.member).collect() },
            members,
        }
    }

    fn run(set: &EvidenceSet) -> Classification {
        let index = config();
        let comparator = Comparator::default();
        Classifier::new(&index, &comparator, None).classify(set)
    }

    #[test]
    fn type_held_by_one_member_is_not_compared() {
        let set = why_not(vec![
            member(1, vec![feature(1, "NAME", 10, "JOHN SMITH"), feature(1, "DOB", 11, "1980-01-01")]),
            member(2, vec![feature(2, "NAME", 20, "JOHN SMITH")]),
        ]);
        let out = run(&set);
        let dob = out.member(1).unwrap().feature("DOB").next().unwrap();
        assert_eq!(dob.match_code, MatchCode::NotCompared);
        assert!(out.member(2).unwrap().feature("DOB").next().is_none());
    }

    #[test]
    fn exclusive_conflict_marks_only_its_member() {
        let mut b_addr = feature(2, "ADDRESS", 21, "9 ELM AVE SPRINGFIELD");
        b_addr.usage_type = "HOME".to_string();
        let mut a_addr = feature(1, "ADDRESS", 11, "1 MAIN ST SPRINGFIELD");
        a_addr.usage_type = "BUSINESS".to_string();
        let set = why_not(vec![
            member(1, vec![feature(1, "SSN", 10, "123-45-6789"), a_addr]),
            member(2, vec![feature(2, "SSN", 10, "123-45-6789"), b_addr]),
        ]);
        let out = run(&set);
        assert_eq!(out.member(1).unwrap().why_key.match_key(), "+SSN-ADDRESS");
        assert_eq!(out.member(2).unwrap().why_key.match_key(), "+SSN");
        let b = out.member(2).unwrap().feature("ADDRESS").next().unwrap();
        assert_eq!(b.match_code, MatchCode::Conflicting);
        assert!(!b.exclusive);
    }

    #[test]
    fn ignored_match_contributes_nothing() {
        let mut capped = feature(2, "SSN", 10, "123-45-6789");
        capped.scoring_cap_reached = true;
        let set = why_not(vec![
            member(1, vec![feature(1, "SSN", 10, "123-45-6789")]),
            member(2, vec![capped]),
        ]);
        let out = run(&set);
        let b = out.member(2).unwrap();
        assert_eq!(b.features[0].match_code, MatchCode::Matched);
        assert_eq!(b.features[0].ignored, IgnoredCode::NotScored);
        assert!(b.why_key.terms.is_empty());
        assert!(b.why_key.no_candidates);
        assert!(!out.member(1).unwrap().why_key.no_candidates);
    }

    #[test]
    fn plus_dominates_within_a_type() {
        let set = why_not(vec![
            member(1, vec![feature(1, "DRLIC", 10, "A1234567"), feature(1, "DRLIC", 11, "ZZZ00000")]),
            member(2, vec![feature(2, "DRLIC", 20, "A1234567")]),
        ]);
        let out = run(&set);
        assert_eq!(out.member(1).unwrap().why_key.match_key(), "+DRLIC");
    }

    #[test]
    fn sentinel_evidence_is_unmatched() {
        let set = why_not(vec![
            member(1, vec![FeatureEvidence::missing(1, 55), feature(1, "NAME", 10, "JOHN SMITH")]),
            member(2, vec![feature(2, "NAME", 20, "JON SMITH")]),
        ]);
        let out = run(&set);
        let a = out.member(1).unwrap();
        let missing = a.feature(UNKNOWN_FTYPE).next().unwrap();
        assert_eq!(missing.match_code, MatchCode::Unmatched);
        assert_eq!(a.features[0].match_code, MatchCode::Matched);
        assert_eq!(a.features[1].match_code, MatchCode::Unmatched);
    }

    #[test]
    fn cell_sort_order() {
        let mut ignored = feature(1, "NAME", 12, "AAA");
        ignored.candidate_cap_reached = true;
        let set = why_not(vec![
            member(
                1,
                vec![
                    feature(1, "NAME", 11, "ZED SMITH"),
                    feature(1, "NAME", 13, "WILMA FLINT"),
                    ignored,
                    feature(1, "NAME", 10, "JOHN SMITH"),
                ],
            ),
            member(2, vec![feature(2, "NAME", 20, "JOHN SMITH"), feature(2, "NAME", 21, "ZED SMITH")]),
        ]);
        let out = run(&set);
        let order: Vec<&str> = out.member(1).unwrap().features.iter()
            .map(|f| f.evidence.description.as_str())
            .collect();
        assert_eq!(order, vec!["JOHN SMITH", "ZED SMITH", "WILMA FLINT", "AAA"]);
    }

    #[test]
    fn rule_code_follows_mode() {
        let mut a = member(1, vec![]);
        a.engine_keys.push(EngineKey {
            match_key: "+NAME".to_string(),
            rule_code: "CNAME".to_string(),
            other_entity: Some(3),
        });
        a.engine_keys.push(EngineKey {
            match_key: "+SSN".to_string(),
            rule_code: "SSN_RULE".to_string(),
            other_entity: Some(2),
        });
        let set = why_not(vec![a, member(2, vec![]), member(3, vec![])]);
        let out = run(&set);
        assert_eq!(out.member(1).unwrap().why_key.rule_code, "SSN_RULE");
        assert_eq!(out.member(2).unwrap().why_key.rule_code, "");
        assert_eq!(out.member(2).unwrap().why_key.to_string(), "no candidate features no candidates!");
    }

    #[test]
    fn degraded_comparator_conflicts_on_near_names() {
        let index = config();
        let comparator = Comparator::degraded();
        let set = why_not(vec![
            member(1, vec![feature(1, "NAME", 10, "Jon Smith")]),
            member(2, vec![feature(2, "NAME", 20, "John Smith")]),
        ]);
        let out = Classifier::new(&index, &comparator, None).classify(&set);
        assert_eq!(out.member(1).unwrap().features[0].match_code, MatchCode::Conflicting);
    }

    #[test]
    fn compare_feature_shared_id_matches_without_comparison() {
        let comparator = Comparator::degraded();
        assert_eq!(
            compare_feature(&comparator, "ADDRESS", Some("ADDR_COMP"), (7, "a"), &[(7, "b")]),
            MatchCode::Matched
        );
        assert_eq!(
            compare_feature(&comparator, "ADDRESS", Some("ADDR_COMP"), (7, "a"), &[]),
            MatchCode::NotCompared
        );
    }
}
