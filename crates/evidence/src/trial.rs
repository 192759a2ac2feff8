//! Trial resolution: stage two records under a scratch data source, see
//! whether they resolve, and always clean up afterwards.

use serde_json::{Map, Value};

use crate::error::EvidenceError;
use crate::payload::{EntityResponse, RecordResponse};
use crate::source::ResolutionEngine;

pub const TRY_DATA_SOURCE: &str = "TRY_DSRC";
pub const TRY_ENTITY_TYPE: &str = "TRY_ETYPE";
pub const TRY_RECORD_IDS: [&str; 2] = ["TRY_RECORD_1", "TRY_RECORD_2"];
pub const FORCE_RESOLVE: &str = "FORCE_RESOLVE";

#[derive(Debug, Clone, PartialEq)]
pub enum TrialRecord {
    /// Record attributes given inline, keys upper-cased.
    Inline(Map<String, Value>),
    /// An existing record, fetched with `get_record`.
    Stored { data_source: String, record_id: String },
}

fn upper_keys(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter().map(|(k, v)| (k.to_uppercase(), v)).collect()
}

/// A JSON array of two record objects. An object holding only
/// `data_source` and `record_id` refers to a stored record.
pub fn parse_trial_records(arg: &str) -> Result<[TrialRecord; 2], EvidenceError> {
    let invalid = |reason: &str| EvidenceError::argument(arg, reason);
    let parsed: Vec<Value> = serde_json::from_str(arg.trim())
        .map_err(|_| invalid("expected a json array of two records"))?;
    let mut records = parsed.into_iter().take(2).map(|value| match value {
        Value::Object(map) => {
            let map = upper_keys(map);
            let reference = map.len() == 2
                && map.get("DATA_SOURCE").and_then(Value::as_str).is_some()
                && map.get("RECORD_ID").is_some();
            if reference {
                let data_source = map
                    .get("DATA_SOURCE")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_default();
                let record_id = match map.get("RECORD_ID") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                Ok(TrialRecord::Stored { data_source, record_id })
            } else {
                Ok(TrialRecord::Inline(map))
            }
        }
        _ => Err(invalid("each record must be a json object")),
    });
    match (records.next(), records.next()) {
        (Some(first), Some(second)) => Ok([first?, second?]),
        _ => Err(invalid("expected a json array of two records")),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome<T> {
    /// Both records landed in one entity. `forced` when that took the
    /// trusted-id fallback.
    Resolved { entity_id: i64, forced: bool, analysis: T },
    NotResolved,
}

pub fn trial_title(forced: bool) -> &'static str {
    if forced {
        "Try result: NOT resolved!"
    } else {
        "Try result: resolved!"
    }
}

fn staged(engine: &dyn ResolutionEngine, record: TrialRecord, record_id: &str) -> Result<Map<String, Value>, EvidenceError> {
    let mut map = match record {
        TrialRecord::Inline(map) => map,
        TrialRecord::Stored { data_source, record_id } => {
            let response = RecordResponse::from_value(&engine.get_record(&data_source, &record_id)?)?;
            match response.json_data {
                Value::Object(map) => upper_keys(map),
                _ => {
                    return Err(EvidenceError::Engine(format!(
                        "record {data_source}: {record_id} has no json data"
                    )))
                }
            }
        }
    };
    map.insert("DATA_SOURCE".to_string(), Value::from(TRY_DATA_SOURCE));
    map.insert("ENTITY_TYPE".to_string(), Value::from(TRY_ENTITY_TYPE));
    map.insert("RECORD_ID".to_string(), Value::from(record_id));
    Ok(map)
}

fn resolved_entity(engine: &dyn ResolutionEngine, record_id: &str) -> Result<i64, EvidenceError> {
    let doc = engine.get_entity_by_record_id(TRY_DATA_SOURCE, record_id)?;
    Ok(EntityResponse::from_value(&doc)?.resolved_entity.entity_id)
}

/// Adds both records, retrying once with `TRUSTED_ID_NUMBER` forced when
/// they stay apart, and runs `analyse` on the shared entity while the
/// records still exist. Both records are deleted before returning.
pub fn run_trial<T>(
    engine: &mut dyn ResolutionEngine,
    records: [TrialRecord; 2],
    analyse: impl FnOnce(&dyn ResolutionEngine, i64) -> Result<T, EvidenceError>,
) -> Result<TrialOutcome<T>, EvidenceError> {
    let [first, second] = records;
    let mut staged_records = [
        staged(&*engine, first, TRY_RECORD_IDS[0])?,
        staged(&*engine, second, TRY_RECORD_IDS[1])?,
    ];

    let outcome = attempt(engine, &mut staged_records, analyse);

    let mut cleanup: Result<(), EvidenceError> = Ok(());
    for record_id in TRY_RECORD_IDS {
        if let Err(e) = engine.delete_record(TRY_DATA_SOURCE, record_id) {
            log::warn!("could not delete trial record {record_id}: {e}");
            if cleanup.is_ok() {
                cleanup = Err(e);
            }
        }
    }

    let outcome = outcome?;
    cleanup?;
    Ok(outcome)
}

fn attempt<T>(
    engine: &mut dyn ResolutionEngine,
    records: &mut [Map<String, Value>; 2],
    analyse: impl FnOnce(&dyn ResolutionEngine, i64) -> Result<T, EvidenceError>,
) -> Result<TrialOutcome<T>, EvidenceError> {
    let mut forced = false;
    loop {
        for (record, record_id) in records.iter().zip(TRY_RECORD_IDS) {
            engine.add_record(TRY_DATA_SOURCE, record_id, &Value::Object(record.clone()))?;
        }
        let first = resolved_entity(&*engine, TRY_RECORD_IDS[0])?;
        let second = resolved_entity(&*engine, TRY_RECORD_IDS[1])?;
        log::debug!("trial records resolved to {first} and {second} (forced: {forced})");

        if first == second {
            let analysis = analyse(&*engine, first)?;
            return Ok(TrialOutcome::Resolved { entity_id: first, forced, analysis });
        }
        if forced {
            return Ok(TrialOutcome::NotResolved);
        }
        for record in records.iter_mut() {
            record.insert("TRUSTED_ID_NUMBER".to_string(), Value::from(FORCE_RESOLVE));
        }
        forced = true;
    }
}
