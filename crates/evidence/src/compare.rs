//! Feature value comparison by comparison-function family.
//!
//! Fuzzy scoring is behind the `fuzzy` cargo feature. Without it, or with
//! [`Comparator::degraded`], every family falls back to exact equality.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Minimum scores (0-100) for a comparison to count as close enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComparatorThresholds {
    /// Names, addresses and group associations.
    pub token_set: u32,
    pub date_of_birth: u32,
    pub ssn: u32,
    pub identifier: u32,
}

impl Default for ComparatorThresholds {
    fn default() -> Self {
        Self { token_set: 80, date_of_birth: 90, ssn: 90, identifier: 90 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    Fuzzy,
    Exact,
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::Exact => write!(f, "exact"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Comparator {
    mode: CompareMode,
    thresholds: ComparatorThresholds,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(ComparatorThresholds::default())
    }
}

impl Comparator {
    pub fn new(thresholds: ComparatorThresholds) -> Self {
        let mode = if cfg!(feature = "fuzzy") { CompareMode::Fuzzy } else { CompareMode::Exact };
        Self { mode, thresholds }
    }

    /// Exact equality for every family.
    pub fn degraded() -> Self {
        Self { mode: CompareMode::Exact, thresholds: ComparatorThresholds::default() }
    }

    pub fn mode(&self) -> CompareMode {
        self.mode
    }

    pub fn thresholds(&self) -> &ComparatorThresholds {
        &self.thresholds
    }

    pub fn is_close_enough(
        &self,
        ftype_code: &str,
        cfunc_code: Option<&str>,
        a: &str,
        b: &str,
    ) -> bool {
        let Some(cfunc) = cfunc_code else {
            return a == b;
        };
        let close = match self.mode {
            CompareMode::Exact => a == b,
            CompareMode::Fuzzy => self.fuzzy(cfunc, a, b),
        };
        log::trace!("compare {ftype_code}/{cfunc} {a:?} {b:?} -> {close}");
        close
    }

    #[cfg(feature = "fuzzy")]
    fn fuzzy(&self, cfunc: &str, a: &str, b: &str) -> bool {
        let t = &self.thresholds;
        match cfunc {
            "GNR_COMP" | "ADDR_COMP" | "GROUP_ASSOCIATION_COMP" => {
                token_set_ratio(a, b) >= t.token_set
            }
            "DOB_COMP" => {
                let (la, lb) = (a.chars().count(), b.chars().count());
                if la == lb {
                    token_set_ratio(a, b) >= t.date_of_birth
                } else {
                    let n = la.min(lb);
                    a.chars().take(n).eq(b.chars().take(n))
                }
            }
            "SSN_COMP" => token_set_ratio(a, b) >= t.ssn,
            "ID_COMP" => ratio(a, b) >= t.identifier,
            "PHONE_COMP" => phone_tail(a) == phone_tail(b),
            _ => a == b,
        }
    }

    #[cfg(not(feature = "fuzzy"))]
    fn fuzzy(&self, _cfunc: &str, a: &str, b: &str) -> bool {
        a == b
    }
}

// ---------------------------------------------------------------------------
// Scoring primitives
// ---------------------------------------------------------------------------

/// Normalized Levenshtein similarity, 0-100.
#[cfg(feature = "fuzzy")]
pub fn ratio(a: &str, b: &str) -> u32 {
    if a.is_empty() || b.is_empty() {
        return if a == b { 100 } else { 0 };
    }
    (strsim::normalized_levenshtein(a, b) * 100.0).round() as u32
}

#[cfg(feature = "fuzzy")]
fn process(s: &str) -> String {
    let mapped: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect();
    mapped.trim().to_string()
}

/// Token-set similarity: order and repetition of words do not matter.
#[cfg(feature = "fuzzy")]
pub fn token_set_ratio(a: &str, b: &str) -> u32 {
    use std::collections::BTreeSet;

    let (pa, pb) = (process(a), process(b));
    if pa.is_empty() || pb.is_empty() {
        return if pa.is_empty() && pb.is_empty() && a == b { 100 } else { 0 };
    }
    let ta: BTreeSet<&str> = pa.split_whitespace().collect();
    let tb: BTreeSet<&str> = pb.split_whitespace().collect();

    let join = |set: Vec<&str>| set.join(" ");
    let sect = join(ta.intersection(&tb).copied().collect());
    let diff_ab = join(ta.difference(&tb).copied().collect());
    let diff_ba = join(tb.difference(&ta).copied().collect());
    let combined = |diff: &str| format!("{sect} {diff}").trim().to_string();
    let (c1, c2) = (combined(&diff_ab), combined(&diff_ba));

    let sect_score = |other: &str| if sect.is_empty() { 0 } else { ratio(&sect, other) };
    sect_score(&c1).max(sect_score(&c2)).max(ratio(&c1, &c2))
}

/// Last seven phone digits; values without digits keep their raw tail.
#[cfg(feature = "fuzzy")]
fn phone_tail(value: &str) -> String {
    let digits: Vec<char> = value.chars().filter(char::is_ascii_digit).collect();
    let chars: Vec<char> =
        if digits.is_empty() { value.chars().collect() } else { digits };
    let start = chars.len().saturating_sub(7);
    chars[start..].iter().collect()
}
