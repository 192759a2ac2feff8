//! Attribute search: request document, ranking and the results table.

use serde_json::{json, Map, Value};

use crate::error::EvidenceError;
use crate::payload::SearchResponse;
use crate::table::{Align, Cell, Span, Table};

pub fn search_level_name(level: i64) -> &'static str {
    match level {
        1 => "Match",
        2 => "Possible Match",
        3 => "Possibly Related",
        4 => "Name Only",
        _ => "unknown",
    }
}

/// JSON objects are searched as given with upper-cased keys; anything else
/// is a name searched as both a person and an organization.
pub fn search_document(arg: &str) -> Result<Value, EvidenceError> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err(EvidenceError::argument(arg, "nothing to search for"));
    }
    if !arg.starts_with('{') {
        return Ok(json!({ "PERSON_NAME_FULL": arg, "ORGANIZATION_NAME_ORG": arg }));
    }
    let parsed: Map<String, Value> =
        serde_json::from_str(arg).map_err(|e| EvidenceError::argument(arg, e.to_string()))?;
    Ok(Value::Object(parsed.into_iter().map(|(k, v)| (k.to_uppercase(), v)).collect()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub entity_id: i64,
    pub entity_name: String,
    /// Best scoring candidate name, when it differs from the entity name.
    pub matched_name: Option<String>,
    /// `DS: record` for a single record, `DS: n records` otherwise.
    pub data_sources: Vec<String>,
    pub match_level: i64,
    pub match_key: String,
    /// `(5 - match level) * 100 + match score`.
    pub level_score: i64,
    pub name_score: i64,
}

impl SearchHit {
    pub fn score_text(&self) -> String {
        format!("{}-{:03}", self.level_score, (1000 + self.name_score) % 1000)
    }
}

/// Hits ordered best first.
pub fn rank_search(response: &SearchResponse) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = response
        .entities()
        .iter()
        .map(|entity| {
            let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
            for record in &entity.records {
                match grouped.iter_mut().find(|(ds, _)| *ds == record.data_source) {
                    Some((_, ids)) => ids.push(record.record_id.clone()),
                    None => grouped.push((record.data_source.clone(), vec![record.record_id.clone()])),
                }
            }
            let data_sources = grouped
                .into_iter()
                .map(|(ds, ids)| match ids.as_slice() {
                    [only] => format!("{ds}: {only}"),
                    _ => format!("{ds}: {} records", ids.len()),
                })
                .collect();

            let mut name_score = 0;
            let mut matched_name = String::new();
            for score in entity.match_scores.get("NAME").map(Vec::as_slice).unwrap_or_default() {
                let full = score.gnr_fn.unwrap_or(0);
                if full > name_score {
                    name_score = full;
                    matched_name = score.candidate_feat.clone();
                }
            }

            SearchHit {
                entity_id: entity.entity_id,
                entity_name: entity.entity_name.clone(),
                matched_name: (!matched_name.is_empty() && matched_name != entity.entity_name)
                    .then_some(matched_name),
                data_sources,
                match_level: entity.match_level,
                match_key: entity.match_key.chars().skip(1).collect(),
                level_score: (5 - entity.match_level) * 100 + entity.match_score,
                name_score,
            }
        })
        .collect();
    hits.sort_by(|a, b| (b.level_score, b.name_score).cmp(&(a.level_score, a.name_score)));
    hits
}

pub fn search_table(hits: &[SearchHit]) -> Table {
    let mut table = Table::new("SEARCH RESULTS")
        .column("Index", Align::Center)
        .column("Entity ID", Align::Center)
        .column("Entity Name", Align::Left)
        .column("Data Sources", Align::Left)
        .column("Match Level", Align::Left)
        .column("Match Key", Align::Left)
        .column("Match Score", Align::Center);
    for (i, hit) in hits.iter().enumerate() {
        let mut name = Cell::text(hit.entity_name.clone());
        if let Some(aka) = &hit.matched_name {
            name.push_span(Span::plain(format!(" aka: {aka}")).dim(true));
        }
        table.push_row(vec![
            Cell::text((i + 1).to_string()),
            Cell::text(hit.entity_id.to_string()),
            name,
            Cell::lines(hit.data_sources.clone()),
            Cell::text(search_level_name(hit.match_level)),
            Cell::text(hit.match_key.clone()),
            Cell::text(hit.score_text()),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> SearchResponse {
        SearchResponse::from_value(&json!({ "SEARCH_RESPONSE": { "RESOLVED_ENTITIES": [
            {
                "ENTITY_ID": 5, "ENTITY_NAME": "JOHN SMITH", "MATCH_LEVEL": 3, "MATCH_KEY": "+NAME",
                "MATCH_SCORE": "40",
                "MATCH_SCORES": { "NAME": [ { "GNR_FN": 100, "CANDIDATE_FEAT": "JOHN SMITH" } ] },
                "RECORDS": [ { "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "1001" } ]
            },
            {
                "ENTITY_ID": 9, "ENTITY_NAME": "JOHNNY SMITH", "MATCH_LEVEL": 2, "MATCH_KEY": "+NAME+DOB",
                "MATCH_SCORE": 10,
                "MATCH_SCORES": { "NAME": [
                    { "GNR_FN": 80, "CANDIDATE_FEAT": "JOHNNY SMITH" },
                    { "GNR_FN": 95, "CANDIDATE_FEAT": "JOHN SMITH" }
                ] },
                "RECORDS": [
                    { "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "1002" },
                    { "DATA_SOURCE": "WATCHLIST", "RECORD_ID": "W1" },
                    { "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "1003" }
                ]
            },
            {
                "ENTITY_ID": 2, "ENTITY_NAME": "J SMITH", "MATCH_LEVEL": 3, "MATCH_KEY": "+NAME",
                "MATCH_SCORE": 40,
                "MATCH_SCORES": { "NAME": [ { "GNR_FN": 7, "CANDIDATE_FEAT": "J SMITH" } ] },
                "RECORDS": []
            }
        ] } }))
        .unwrap()
    }

    #[test]
    fn plain_text_searches_both_name_kinds() {
        let doc = search_document("Joe Smith").unwrap();
        assert_eq!(doc, json!({ "PERSON_NAME_FULL": "Joe Smith", "ORGANIZATION_NAME_ORG": "Joe Smith" }));
        let doc = search_document(r#"{"name_last": "Smith", "date_of_birth": "1992-12-10"}"#).unwrap();
        assert_eq!(doc, json!({ "NAME_LAST": "Smith", "DATE_OF_BIRTH": "1992-12-10" }));
        assert!(matches!(search_document("{bad json"), Err(EvidenceError::Argument { .. })));
    }

    #[test]
    fn ranked_by_level_then_name_score() {
        let hits = rank_search(&response());
        let ids: Vec<i64> = hits.iter().map(|h| h.entity_id).collect();
        assert_eq!(ids, vec![9, 5, 2]);
        assert_eq!(hits[0].score_text(), "310-095");
        assert_eq!(hits[1].score_text(), "240-100");
        assert_eq!(hits[2].score_text(), "240-007");
        assert_eq!(hits[0].matched_name.as_deref(), Some("JOHN SMITH"));
        assert_eq!(hits[1].matched_name, None);
        assert_eq!(hits[0].match_key, "NAME+DOB");
        assert_eq!(hits[0].data_sources, vec!["CUSTOMERS: 2 records", "WATCHLIST: W1"]);
    }

    #[test]
    fn table_numbers_rows_in_rank_order() {
        let table = search_table(&rank_search(&response()));
        assert_eq!(table.rows[0][0].plain_text(), "1");
        assert_eq!(table.rows[0][1].plain_text(), "9");
        assert_eq!(table.rows[0][2].plain_lines(), vec!["JOHNNY SMITH", " aka: JOHN SMITH"]);
        assert_eq!(table.rows[0][4].plain_text(), "Possible Match");
    }
}
