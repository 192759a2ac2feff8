//! Why / why-not evidence table.

use crate::config::ConfigIndex;
use crate::model::{
    AnalysisMode, Classification, ClassifiedFeature, ClassifiedMember, MatchCode, Sign, WhyKey,
    UNKNOWN_FTYPE,
};
use crate::table::{Align, Cell, Span, Table, Tone};

pub fn default_title(mode: &AnalysisMode) -> String {
    match mode {
        AnalysisMode::SingleEntity { entity_id } => format!("Why for entity ID {entity_id}"),
        AnalysisMode::WhyNot { .. } => "Why NOT for listed entities".to_string(),
    }
}

pub fn why_table(classification: &Classification, index: &ConfigIndex) -> Table {
    why_table_titled(classification, index, &default_title(&classification.mode))
}

pub fn why_table_titled(classification: &Classification, index: &ConfigIndex, title: &str) -> Table {
    let single = matches!(classification.mode, AnalysisMode::SingleEntity { .. });
    let members = &classification.members;
    // Naming the other party adds nothing when there are only two.
    let name_other = members.len() > 2;

    let mut table = Table::new(title)
        .column(if single { "Internal ID" } else { "Entity ID" }, Align::Left);
    for member in members {
        table = table.column(member.member.to_string(), Align::Left);
    }

    let mut row = vec![Cell::text("DATA SOURCES")];
    for member in members {
        let mut sources = member.data_sources.clone();
        sources.sort();
        row.push(Cell::lines(sources));
    }
    table.push_row(row);

    if members.iter().any(|m| !m.relations.is_empty()) {
        let mut row = vec![Cell::text("RELATIONSHIPS")];
        for member in members {
            let mut relations: Vec<_> = member.relations.iter().collect();
            relations.sort_by_key(|r| r.entity_id);
            row.push(Cell::lines(relations.iter().map(|r| {
                let mut line = format!("{} ({})", r.match_key, r.rule_code);
                if name_other {
                    line.push_str(&format!(" to {}", r.entity_id));
                }
                line
            })));
        }
        table.push_row(row);
    }

    let mut row = vec![Cell::text("WHY RESULT")];
    for member in members {
        row.push(why_result_cell(member, single, name_other));
    }
    table.push_row(row);

    let ambiguous_code = index
        .ftype(index.ambiguous_ftype_id())
        .map(|f| f.code.clone())
        .unwrap_or_default();
    let mut codes: Vec<String> = Vec::new();
    if members.iter().any(|m| !m.ambiguous.is_empty()) {
        codes.push(ambiguous_code.clone());
    }
    for member in members {
        for feature in &member.features {
            if !codes.contains(&feature.evidence.ftype_code) {
                codes.push(feature.evidence.ftype_code.clone());
            }
        }
    }
    codes.sort_by(|a, b| {
        let rank = |code: &str| (code == UNKNOWN_FTYPE, index.sequence_by_code(code));
        rank(a.as_str()).cmp(&rank(b.as_str())).then_with(|| a.cmp(b))
    });

    for code in codes {
        let mut row = vec![Cell::text(code.clone())];
        for member in members {
            let mut cell = Cell::empty();
            if code == ambiguous_code {
                for ambiguous in &member.ambiguous {
                    cell.push_span(Span::toned(ambiguous.reason.clone(), Tone::Bad));
                }
            } else {
                for feature in member.feature(&code) {
                    push_feature_lines(&mut cell, feature);
                }
            }
            row.push(cell);
        }
        table.push_row(row);
    }

    table
}

/// Spans for a reconstructed key: `+` terms good, `-` terms bad.
pub fn why_key_spans(key: &WhyKey) -> Vec<Span> {
    let mut spans = Vec::new();
    if key.terms.is_empty() {
        spans.push(Span::toned("no candidate features", Tone::Bad).bold());
    }
    for term in &key.terms {
        let tone = match term.sign {
            Sign::Plus => Tone::Good,
            Sign::Minus => Tone::Bad,
        };
        spans.push(Span::toned(format!("{}{}", term.sign, term.ftype_code), tone));
    }
    if !key.rule_code.is_empty() {
        spans.push(Span::plain(format!(" ({})", key.rule_code)));
    }
    if key.no_candidates {
        spans.push(Span::toned(" no candidates!", Tone::Bad).bold());
    }
    spans
}

fn why_result_cell(member: &ClassifiedMember, single: bool, name_other: bool) -> Cell {
    let mut cell = Cell::empty();
    cell.push_line(why_key_spans(&member.why_key));

    if single {
        for key in &member.engine_keys {
            if key.match_key.is_empty() && key.rule_code.is_empty() {
                continue;
            }
            cell.push_span(
                Span::plain(format!("engine: {} ({})", key.match_key, key.rule_code)).dim(true),
            );
        }
        return cell;
    }

    if member.engine_keys.is_empty() {
        cell.push_span(Span::toned("no resolve or relate!", Tone::Bad));
        return cell;
    }
    let mut keys: Vec<_> = member.engine_keys.iter().collect();
    keys.sort_by_key(|k| k.other_entity);
    for key in keys {
        let mut line = format!("engine: {} ({})", key.match_key, key.rule_code);
        if let (true, Some(other)) = (name_other, key.other_entity) {
            line.push_str(&format!(" to {other}"));
        }
        cell.push_span(Span::plain(line).dim(true));
    }
    cell
}

pub fn feature_tone(feature: &ClassifiedFeature) -> Tone {
    match feature.match_code {
        MatchCode::Matched => {
            if feature.evidence.was_candidate && feature.evidence.score.is_none() {
                Tone::Highlight2
            } else {
                Tone::Good
            }
        }
        MatchCode::Conflicting if feature.exclusive => Tone::Bad,
        MatchCode::Conflicting => Tone::Caution,
        MatchCode::Unmatched | MatchCode::NotCompared => Tone::Plain,
    }
}

fn push_feature_lines(cell: &mut Cell, feature: &ClassifiedFeature) {
    let tone = feature_tone(feature);
    let dim = feature.ignored.is_ignored();
    cell.push_span(Span::toned(feature.evidence.legend_text(), tone).dim(dim));

    if let Some(score) = &feature.evidence.score {
        // Close values may still score SAME; show what they were compared to.
        if score.bucket != "SAME" || score.counterpart != feature.evidence.description {
            cell.push_span(
                Span::toned(format!("  {} ({})", score.counterpart.trim(), score.display), tone)
                    .dim(dim)
                    .italic(),
            );
        }
    }
}
