//! Reason text for ambiguous-entity features.
//!
//! The engine stores no description for these; the reason is rebuilt from
//! the feature's element pairs (`110:<ftype id>|111:<tier>|115:<reason>|114:<lib feat id>`).

use crate::config::ConfigIndex;
use crate::source::EvidenceStore;

pub const REQUIRES_LOOKUP: &str = "requires lookup";

pub fn describe(lib_feat_id: i64, index: &ConfigIndex, store: Option<&dyn EvidenceStore>) -> String {
    let Some(store) = store else {
        return REQUIRES_LOOKUP.to_string();
    };
    match store.feature_element_values(lib_feat_id) {
        Ok(Some(values)) => decode(&values, index, store).unwrap_or_else(|| {
            log::debug!("ambiguous feature {lib_feat_id}: undecodable elements {values:?}");
            REQUIRES_LOOKUP.to_string()
        }),
        Ok(None) => REQUIRES_LOOKUP.to_string(),
        Err(e) => {
            log::warn!("ambiguous feature {lib_feat_id}: {e}");
            REQUIRES_LOOKUP.to_string()
        }
    }
}

fn decode(values: &str, index: &ConfigIndex, store: &dyn EvidenceStore) -> Option<String> {
    let mut reasons = Vec::new();
    for pair in values.split('|').filter(|p| !p.trim().is_empty()) {
        let (code, value) = pair.split_once(':')?;
        let value = value.trim();
        match code.trim() {
            "110" => {
                let id: i64 = value.parse().ok()?;
                reasons.push(index.ftype(id)?.code.clone());
            }
            "111" => reasons.push(format!("Tier {value}")),
            "115" => reasons.push(
                match value {
                    "1" => "Conflicting exclusive",
                    "2" => "Suppressed feature",
                    "3" => "Absent Feature",
                    _ => return None,
                }
                .to_string(),
            ),
            "114" => {
                let id: i64 = value.parse().ok()?;
                reasons.push(store.feature_description(id).ok()??);
            }
            _ => {}
        }
    }
    if reasons.is_empty() {
        None
    } else {
        Some(reasons.join(" | "))
    }
}
