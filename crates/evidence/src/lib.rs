//! `matchlens-evidence`: match evidence reconstruction for entity resolution review.
//!
//! Pure engine crate: reads engine documents through the [`ResolutionEngine`]
//! and [`EvidenceStore`] seams, returns classified evidence and plain tables.
//! No terminal IO.

pub mod ambiguous;
pub mod audit;
pub mod classify;
pub mod collect;
pub mod compare;
pub mod config;
pub mod entity;
pub mod error;
pub mod model;
pub mod payload;
pub mod search;
pub mod snapshot;
pub mod source;
pub mod table;
pub mod trial;
pub mod why;

#[cfg(test)]
mod testing;

pub use classify::Classifier;
pub use collect::Collector;
pub use compare::{Comparator, ComparatorThresholds, CompareMode};
pub use config::ConfigIndex;
pub use error::EvidenceError;
pub use model::{Classification, EvidenceSet, MatchCode, WhyKey};
pub use source::{EvidenceStore, ResolutionEngine, StoredFeature};
pub use table::{Align, Cell, Column, Span, Table, Tone};
