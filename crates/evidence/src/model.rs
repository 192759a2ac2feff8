use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

/// Feature type code used when evidence cannot be tied to a configured type.
pub const UNKNOWN_FTYPE: &str = "unknown";

/// Row and column identity of one party under review: an internal
/// (observed entity) id in single-entity mode, an entity id otherwise.
pub type MemberId = i64;

// ---------------------------------------------------------------------------
// Raw evidence
// ---------------------------------------------------------------------------

/// Best score the engine reported for a feature against another member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureScore {
    pub score: i64,
    /// `full:95|giv:90`, `org:88` or the plain score.
    pub display: String,
    /// SAME, CLOSE, LIKELY, ... as reported or derived.
    pub bucket: String,
    pub counterpart: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart_id: Option<i64>,
}

impl FeatureScore {
    pub fn is_same_or_close(&self) -> bool {
        matches!(self.bucket.as_str(), "SAME" | "CLOSE")
    }
}

/// One feature occurrence attached to one member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureEvidence {
    pub member: MemberId,
    /// `None` when the consolidated feature section never described this feature.
    pub ftype_id: Option<i64>,
    pub ftype_code: String,
    pub lib_feat_id: i64,
    pub description: String,
    pub usage_type: String,
    pub used_for_candidates: bool,
    pub used_for_scoring: bool,
    pub candidate_cap_reached: bool,
    pub scoring_cap_reached: bool,
    pub suppressed: bool,
    pub entity_count: i64,
    /// Engine listed this feature among the candidate keys.
    pub was_candidate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<FeatureScore>,
}

impl FeatureEvidence {
    /// Evidence for a feature listed on a record but absent from the
    /// consolidated feature section.
    pub fn missing(member: MemberId, lib_feat_id: i64) -> Self {
        Self {
            member,
            ftype_id: None,
            ftype_code: UNKNOWN_FTYPE.to_string(),
            lib_feat_id,
            description: format!("missing {lib_feat_id}"),
            usage_type: String::new(),
            used_for_candidates: false,
            used_for_scoring: false,
            candidate_cap_reached: false,
            scoring_cap_reached: false,
            suppressed: false,
            entity_count: -1,
            was_candidate: false,
            score: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.ftype_id.is_none()
    }

    /// `desc [~!#N]` bracket legend used in every evidence table.
    pub fn legend_text(&self) -> String {
        let mut text = self.description.trim().to_string();
        text.push_str(" [");
        if self.candidate_cap_reached {
            text.push('~');
        }
        if self.scoring_cap_reached {
            text.push('!');
        }
        if self.suppressed {
            text.push('#');
        }
        text.push_str(&self.entity_count.to_string());
        text.push(']');
        text
    }
}

/// Engine-reported relationship between two listed entities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossRelation {
    pub entity_id: i64,
    pub match_key: String,
    pub rule_code: String,
}

/// Match key and rule exactly as the engine reported them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineKey {
    pub match_key: String,
    pub rule_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_entity: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberEvidence {
    pub member: MemberId,
    /// `DATA_SOURCE: RECORD_ID` lines.
    pub data_sources: Vec<String>,
    pub features: Vec<FeatureEvidence>,
    pub engine_keys: Vec<EngineKey>,
    pub relations: Vec<CrossRelation>,
}

impl MemberEvidence {
    pub fn new(member: MemberId) -> Self {
        Self {
            member,
            data_sources: Vec::new(),
            features: Vec::new(),
            engine_keys: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn feature_mut(&mut self, lib_feat_id: i64) -> Option<&mut FeatureEvidence> {
        self.features.iter_mut().find(|f| f.lib_feat_id == lib_feat_id)
    }

    pub fn has_feature(&self, lib_feat_id: i64) -> bool {
        self.features.iter().any(|f| f.lib_feat_id == lib_feat_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Why the records of one entity resolved together.
    SingleEntity { entity_id: i64 },
    /// Why the listed entities did not resolve, or how they relate.
    WhyNot { entity_ids: Vec<i64> },
}

/// Collected evidence, members sorted by id.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceSet {
    pub mode: AnalysisMode,
    pub members: Vec<MemberEvidence>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchCode {
    Matched,
    Conflicting,
    Unmatched,
    NotCompared,
}

impl MatchCode {
    fn rank(self) -> u8 {
        match self {
            Self::Matched => 0,
            Self::Conflicting => 1,
            Self::Unmatched => 2,
            Self::NotCompared => 3,
        }
    }
}

impl fmt::Display for MatchCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matched => write!(f, "MATCHED"),
            Self::Conflicting => write!(f, "CONFLICTING"),
            Self::Unmatched => write!(f, "UNMATCHED"),
            Self::NotCompared => write!(f, "NOT_COMPARED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IgnoredCode {
    None,
    NotCandidate,
    NotScored,
}

impl IgnoredCode {
    pub fn for_evidence(evidence: &FeatureEvidence) -> Self {
        if evidence.scoring_cap_reached || evidence.suppressed {
            Self::NotScored
        } else if evidence.candidate_cap_reached {
            Self::NotCandidate
        } else {
            Self::None
        }
    }

    pub fn is_ignored(self) -> bool {
        self != Self::None
    }

    fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::NotCandidate => 1,
            Self::NotScored => 2,
        }
    }
}

impl fmt::Display for IgnoredCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::NotCandidate => write!(f, "NOT_CANDIDATE"),
            Self::NotScored => write!(f, "NOT_SCORED"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedFeature {
    pub evidence: FeatureEvidence,
    pub match_code: MatchCode,
    pub ignored: IgnoredCode,
    pub exclusive: bool,
}

impl ClassifiedFeature {
    /// Row ordering inside a rendered cell.
    pub fn sort_order(&self) -> (u8, u8) {
        (self.match_code.rank(), self.ignored.rank())
    }

    pub fn cmp_for_display(&self, other: &Self) -> Ordering {
        self.sort_order()
            .cmp(&other.sort_order())
            .then_with(|| self.evidence.description.cmp(&other.evidence.description))
    }

    pub fn contributes(&self) -> Option<Sign> {
        if self.ignored.is_ignored() {
            return None;
        }
        match self.match_code {
            MatchCode::Matched => Some(Sign::Plus),
            MatchCode::Conflicting if self.exclusive => Some(Sign::Minus),
            _ => None,
        }
    }
}

/// Ambiguity marker with its reconstructed reason text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbiguousFeature {
    pub lib_feat_id: i64,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Why key
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sign {
    Plus,
    Minus,
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhyTerm {
    pub sign: Sign,
    pub ftype_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WhyKey {
    pub terms: Vec<WhyTerm>,
    pub rule_code: String,
    pub no_candidates: bool,
}

impl WhyKey {
    /// Terms only, e.g. `+SSN-ADDRESS`.
    pub fn match_key(&self) -> String {
        self.terms.iter().map(|t| format!("{}{}", t.sign, t.ftype_code)).collect()
    }

    pub fn has_term(&self, sign: Sign, ftype_code: &str) -> bool {
        self.terms.iter().any(|t| t.sign == sign && t.ftype_code == ftype_code)
    }
}

impl fmt::Display for WhyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.match_key();
        if key.is_empty() {
            write!(f, "no candidate features")?;
        } else {
            write!(f, "{key}")?;
        }
        if !self.rule_code.is_empty() {
            write!(f, " ({})", self.rule_code)?;
        }
        if self.no_candidates {
            write!(f, " no candidates!")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedMember {
    pub member: MemberId,
    pub data_sources: Vec<String>,
    /// Sorted for display.
    pub features: Vec<ClassifiedFeature>,
    pub ambiguous: Vec<AmbiguousFeature>,
    pub why_key: WhyKey,
    pub engine_keys: Vec<EngineKey>,
    pub relations: Vec<CrossRelation>,
}

impl ClassifiedMember {
    pub fn feature(&self, ftype_code: &str) -> impl Iterator<Item = &ClassifiedFeature> {
        let code = ftype_code.to_string();
        self.features.iter().filter(move |f| f.evidence.ftype_code == code)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub mode: AnalysisMode,
    pub members: Vec<ClassifiedMember>,
}

impl Classification {
    pub fn member(&self, id: MemberId) -> Option<&ClassifiedMember> {
        self.members.iter().find(|m| m.member == id)
    }
}
