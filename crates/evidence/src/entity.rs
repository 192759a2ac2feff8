//! Entity summary, detail, related-entity and side-by-side comparison tables,
//! plus record export.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ConfigIndex;
use crate::payload::{EntityRecord, EntityResponse, RelatedEntity};
use crate::table::{Align, Cell, Table};

const SUMMARY_LIMIT: usize = 20;
const COMPARE_RECORD_LIMIT: usize = 5;

pub fn related_level_name(level: i64) -> &'static str {
    match level {
        1 => "Ambiguous Match",
        2 => "Possible Match",
        3 => "Possibly Related",
        4 => "Name Only",
        11 => "Disclosed Relation",
        _ => "unknown",
    }
}

fn strip_key_sign(match_key: &str) -> String {
    match_key.chars().skip(1).collect()
}

/// Sorted items, then `+n more` past `limit`.
fn capped(mut items: Vec<String>, limit: usize) -> Vec<String> {
    items.sort();
    if items.len() > limit {
        let more = items.len() - limit;
        items.truncate(limit);
        items.push(format!("+{more} more"));
    }
    items
}

fn sorted_unique<'a>(items: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    items.into_iter().cloned().collect::<BTreeSet<_>>().into_iter().collect()
}

pub fn summary_title(response: &EntityResponse) -> String {
    let entity = &response.resolved_entity;
    format!("Entity ID {} - {}", entity.entity_id, entity.entity_name)
}

/// One row per data source.
pub fn entity_summary_table(response: &EntityResponse, index: &ConfigIndex) -> Table {
    let mut by_source: BTreeMap<&str, Vec<&EntityRecord>> = BTreeMap::new();
    for record in &response.resolved_entity.records {
        by_source.entry(record.data_source.as_str()).or_default().push(record);
    }

    let mut table = Table::new(summary_title(response))
        .column("Record ID", Align::Left)
        .column("Entity Data", Align::Left)
        .column("Additional Data", Align::Left);
    for (data_source, records) in by_source {
        let ids = capped(records.iter().map(|r| r.record_id.clone()).collect(), SUMMARY_LIMIT);
        let mut record_cell = vec![data_source.to_string()];
        record_cell.extend(ids);

        let (primary, other): (Vec<&String>, Vec<&String>) = records
            .iter()
            .flat_map(|r| r.name_data.iter())
            .partition(|n| n.to_uppercase().starts_with("PRIMARY"));
        let addresses: Vec<String> = records
            .iter()
            .flat_map(|r| r.address_data.iter())
            .map(|a| format!("ADDRESS: {a}"))
            .collect();
        let phones: Vec<String> = records
            .iter()
            .flat_map(|r| r.phone_data.iter())
            .map(|p| format!("PHONE: {p}"))
            .collect();
        let mut entity_data = sorted_unique(primary);
        entity_data.extend(sorted_unique(other));
        entity_data.extend(sorted_unique(records.iter().flat_map(|r| r.attribute_data.iter())));
        entity_data.extend(sorted_unique(records.iter().flat_map(|r| r.identifier_data.iter())));
        entity_data.extend(sorted_unique(&addresses));
        entity_data.extend(sorted_unique(&phones));

        let other_data = sorted_unique(
            records
                .iter()
                .flat_map(|r| r.other_data.iter())
                .filter(|item| !index.is_internal_attribute(item)),
        );

        table.push_row(vec![
            Cell::lines(record_cell),
            Cell::lines(entity_data),
            Cell::lines(capped(other_data, SUMMARY_LIMIT)),
        ]);
    }
    table
}

/// One row per record.
pub fn entity_detail_table(response: &EntityResponse) -> Table {
    let entity = &response.resolved_entity;
    let mut table = Table::new(format!("ENTITY_ID {} - {}", entity.entity_id, entity.entity_name))
        .column("Record ID", Align::Left)
        .column("Entity Data", Align::Left)
        .column("Additional Data", Align::Left);
    for record in &entity.records {
        let mut id_lines = vec![record.data_source.clone(), record.record_id.clone()];
        if !record.match_key.is_empty() {
            id_lines.push(format!(" ({})", strip_key_sign(&record.match_key)));
        }
        let mut data: Vec<String> = Vec::new();
        data.extend(record.name_data.iter().cloned());
        data.extend(record.attribute_data.iter().cloned());
        data.extend(record.identifier_data.iter().cloned());
        data.extend(record.address_data.iter().map(|a| format!("ADDRESS: {a}")));
        data.extend(record.phone_data.iter().map(|p| format!("PHONE: {p}")));
        table.push_row(vec![
            Cell::lines(id_lines),
            Cell::lines(data),
            Cell::lines(record.other_data.clone()),
        ]);
    }
    table
}

/// `None` when the entity has no relationships.
pub fn related_table(response: &EntityResponse, title: &str) -> Option<Table> {
    if response.related_entities.is_empty() {
        return None;
    }
    let mut related: Vec<&RelatedEntity> = response.related_entities.iter().collect();
    related.sort_by_key(|r| r.match_level);

    let mut table = Table::new(title)
        .column("Entity ID", Align::Left)
        .column("Entity Name", Align::Left)
        .column("Data Sources", Align::Left)
        .column("Match Level", Align::Left)
        .column("Match Key", Align::Left)
        .column("ER Rule", Align::Left);
    for entity in related {
        let mut sources: Vec<String> = entity
            .record_summary
            .iter()
            .map(|s| format!("{}({})", s.data_source, s.record_count))
            .collect();
        sources.sort();
        table.push_row(vec![
            Cell::text(entity.entity_id.to_string()),
            Cell::text(entity.entity_name.clone()),
            Cell::text(sources.join("|")),
            Cell::text(related_level_name(entity.match_level)),
            Cell::text(entity.match_key.clone()),
            Cell::text(entity.errule_code.clone()),
        ]);
    }
    Some(table)
}

// ---------------------------------------------------------------------------
// Compare
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CompareColumn {
    data_sources: BTreeMap<String, Vec<String>>,
    names: Vec<String>,
    attributes: Vec<String>,
    identifiers: Vec<String>,
    addresses: Vec<String>,
    phones: Vec<String>,
    relationships: Vec<String>,
    other: Vec<String>,
    cross_relations: Vec<String>,
    /// Relations to entities outside the compared set.
    other_relations: Vec<RelatedEntity>,
}

fn push_unique(list: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !list.contains(item) {
            list.push(item.clone());
        }
    }
}

fn relation_line(entity: &RelatedEntity) -> String {
    format!(
        "{} to {} on {} ({})",
        related_level_name(entity.match_level),
        entity.entity_id,
        strip_key_sign(&entity.match_key),
        entity.errule_code
    )
}

fn sorted(list: &[String]) -> Vec<String> {
    let mut list = list.to_vec();
    list.sort();
    list
}

/// Entities side by side, with their relations to each other and the
/// relationships they have in common.
pub fn compare_table(responses: &[EntityResponse], index: &ConfigIndex) -> Table {
    let listed: Vec<i64> = responses.iter().map(|r| r.resolved_entity.entity_id).collect();

    let mut columns: Vec<CompareColumn> = Vec::with_capacity(responses.len());
    for response in responses {
        let mut column = CompareColumn::default();
        for record in &response.resolved_entity.records {
            column
                .data_sources
                .entry(record.data_source.clone())
                .or_default()
                .push(record.record_id.clone());
            push_unique(&mut column.names, &record.name_data);
            push_unique(&mut column.attributes, &record.attribute_data);
            push_unique(&mut column.identifiers, &record.identifier_data);
            push_unique(&mut column.addresses, &record.address_data);
            push_unique(&mut column.phones, &record.phone_data);
            push_unique(&mut column.relationships, &record.relationship_data);
            let visible: Vec<String> = record
                .other_data
                .iter()
                .filter(|item| !index.is_internal_attribute(item))
                .cloned()
                .collect();
            push_unique(&mut column.other, &visible);
        }
        for related in &response.related_entities {
            if listed.contains(&related.entity_id) {
                column.cross_relations.push(relation_line(related));
            } else {
                column.other_relations.push(related.clone());
            }
        }
        if column.cross_relations.is_empty() {
            column.cross_relations.push("not related to the others".to_string());
        }
        columns.push(column);
    }

    let common: Vec<Vec<String>> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let mut shared: Vec<&RelatedEntity> = column
                .other_relations
                .iter()
                .filter(|relation| {
                    columns.iter().enumerate().any(|(j, other)| {
                        j != i && other.other_relations.iter().any(|r| r.entity_id == relation.entity_id)
                    })
                })
                .collect();
            shared.sort_by_key(|r| r.entity_id);
            shared.dedup_by_key(|r| r.entity_id);
            shared.into_iter().map(relation_line).collect()
        })
        .collect();

    let mut table = Table::new("Comparison of listed entities").column("Entity ID", Align::Left);
    for id in &listed {
        table = table.column(id.to_string(), Align::Left);
    }

    let data_sources: Vec<Cell> = columns
        .iter()
        .map(|column| {
            let mut lines = Vec::new();
            for (data_source, ids) in &column.data_sources {
                for id in sorted(ids).into_iter().take(COMPARE_RECORD_LIMIT) {
                    lines.push(format!("{data_source}: {id}"));
                }
                if ids.len() > COMPARE_RECORD_LIMIT {
                    lines.push(format!("{data_source}: +{} more", ids.len() - COMPARE_RECORD_LIMIT));
                }
            }
            Cell::lines(lines)
        })
        .collect();
    let mut row = vec![Cell::text("Data Sources")];
    row.extend(data_sources);
    table.push_row(row);

    let mut push_optional = |label: &str, cells: Vec<Vec<String>>| {
        if cells.iter().all(Vec::is_empty) {
            return;
        }
        let mut row = vec![Cell::text(label)];
        row.extend(cells.into_iter().map(Cell::lines));
        table.push_row(row);
    };
    push_optional("Names", columns.iter().map(|c| sorted(&c.names)).collect());
    push_optional("Attributes", columns.iter().map(|c| sorted(&c.attributes)).collect());
    push_optional("Identifiers", columns.iter().map(|c| sorted(&c.identifiers)).collect());
    push_optional("Addresses", columns.iter().map(|c| sorted(&c.addresses)).collect());
    push_optional("Phones", columns.iter().map(|c| sorted(&c.phones)).collect());
    push_optional("OtherData", columns.iter().map(|c| sorted(&c.other)).collect());
    push_optional("Disclosed Rels", columns.iter().map(|c| sorted(&c.relationships)).collect());
    push_optional("Cross Rels", columns.iter().map(|c| sorted(&c.cross_relations)).collect());
    push_optional("Common Rels", common);

    table
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Each record's `JSON_DATA`, one JSON document per line.
pub fn export_lines(responses: &[EntityResponse]) -> Vec<String> {
    responses
        .iter()
        .flat_map(|r| r.resolved_entity.records.iter())
        .map(|record| record.json_data.to_string())
        .collect()
}

pub fn default_export_file(entity_ids: &[i64]) -> String {
    match entity_ids {
        [only] => format!("{only}.json"),
        _ => "records.json".to_string(),
    }
}
