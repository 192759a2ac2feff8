//! Console session: loaded statistics, the last search result and command
//! dispatch.
//!
//! Every command runs to completion or fails with a [`CommandError`] that
//! the loop reports before prompting again.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use matchlens_config::Settings;
use matchlens_evidence::audit::{self, AuditDocument, AuditSample, AUDIT_SOURCE};
use matchlens_evidence::entity;
use matchlens_evidence::payload::{EntityResponse, SearchResponse};
use matchlens_evidence::search;
use matchlens_evidence::snapshot::{self, SampleList, SizeFilter, SizeSample, SnapshotDocument};
use matchlens_evidence::trial::{self, TrialOutcome};
use matchlens_evidence::why;
use matchlens_evidence::{
    Align, Cell, Classification, Classifier, Collector, Comparator, CompareMode,
    ConfigIndex, EvidenceError, EvidenceStore, ResolutionEngine, Table, Tone,
};

use crate::browse::{self, Action, AUDIT_PROMPT, SAMPLE_PROMPT};
use crate::command::{self, Command, GetTarget, IdList, ParseError, HELP};
use crate::exit_codes::{EXIT_COMMAND_FAILED, EXIT_COMMAND_NOT_FOUND, EXIT_ERROR, EXIT_USAGE};
use crate::prompt::Console;

pub const PROMPT: &str = "(matchlens) ";

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub enum CommandError {
    Parse(ParseError),
    Evidence(EvidenceError),
    /// A file named by the user could not be read or written.
    File(String),
    /// Console input or output failed; ends the session.
    Io(io::Error),
}

impl CommandError {
    pub fn is_stale(&self) -> bool {
        matches!(self, CommandError::Evidence(EvidenceError::StaleData(_)))
    }

    /// Exit code when the command ran one-shot from the command line.
    pub fn exit_code(&self) -> u8 {
        match self {
            CommandError::Parse(_) => EXIT_USAGE,
            CommandError::Evidence(EvidenceError::NotFound(_)) => EXIT_COMMAND_NOT_FOUND,
            CommandError::Io(_) => EXIT_ERROR,
            _ => EXIT_COMMAND_FAILED,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(e) => write!(f, "{}", e),
            CommandError::Evidence(e) => write!(f, "{}", e),
            CommandError::File(msg) => write!(f, "{}", msg),
            CommandError::Io(e) => write!(f, "console error: {}", e),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<ParseError> for CommandError {
    fn from(e: ParseError) -> Self {
        CommandError::Parse(e)
    }
}

impl From<EvidenceError> for CommandError {
    fn from(e: EvidenceError) -> Self {
        CommandError::Evidence(e)
    }
}

impl From<io::Error> for CommandError {
    fn from(e: io::Error) -> Self {
        CommandError::Io(e)
    }
}

/// A vanished entity in a loaded sample means the statistics are stale.
fn stale(e: CommandError) -> CommandError {
    match e {
        CommandError::Evidence(EvidenceError::NotFound(what)) => EvidenceError::StaleData(what).into(),
        other => other,
    }
}

/// Exact mode is announced as a warning.
fn compare_mode_level(mode: CompareMode) -> log::Level {
    match mode {
        CompareMode::Fuzzy => log::Level::Debug,
        CompareMode::Exact => log::Level::Warn,
    }
}

fn home_file(name: String) -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(name)
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

struct Loaded<T> {
    doc: T,
    file_name: String,
}

pub struct Session {
    engine: Box<dyn ResolutionEngine>,
    store: Option<Box<dyn EvidenceStore>>,
    index: ConfigIndex,
    comparator: Comparator,
    settings: Settings,
    /// Where settings changes are saved; `None` keeps them in memory.
    settings_path: Option<PathBuf>,
    last_search: Vec<i64>,
    snapshot: Option<Loaded<SnapshotDocument>>,
    audit: Option<Loaded<AuditDocument>>,
}

impl Session {
    pub fn new(
        engine: Box<dyn ResolutionEngine>,
        store: Option<Box<dyn EvidenceStore>>,
        index: ConfigIndex,
        settings: Settings,
    ) -> Self {
        let comparator = Comparator::new(settings.compare);
        log::log!(compare_mode_level(comparator.mode()), "comparing feature values in {} mode", comparator.mode());
        Self {
            engine,
            store,
            index,
            comparator,
            settings,
            settings_path: None,
            last_search: Vec::new(),
            snapshot: None,
            audit: None,
        }
    }

    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    fn persist_settings(&self) {
        if let Some(path) = &self.settings_path {
            if let Err(e) = self.settings.save_to(path) {
                log::warn!("could not save settings to {}: {}", path.display(), e);
            }
        }
    }

    fn store(&self) -> Option<&dyn EvidenceStore> {
        self.store.as_deref()
    }

    /// Reads commands until `quit` or end of input.
    pub fn run(&mut self, console: &mut Console<'_>) -> io::Result<()> {
        loop {
            let Some(line) = console.ask(PROMPT)? else {
                return Ok(());
            };
            match self.execute_line(&line, console) {
                Ok(Flow::Quit) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(CommandError::Io(e)) => return Err(e),
                Err(e) => {
                    let tone = if e.is_stale() { Tone::Caution } else { Tone::Bad };
                    console.message(&e.to_string(), tone)?;
                }
            }
        }
    }

    pub fn execute_line(&mut self, line: &str, console: &mut Console<'_>) -> Result<Flow, CommandError> {
        match command::parse(line)? {
            Some(command) => self.execute(command, console),
            None => Ok(Flow::Continue),
        }
    }

    pub fn execute(&mut self, command: Command, console: &mut Console<'_>) -> Result<Flow, CommandError> {
        log::debug!("command: {:?}", command);
        match command {
            Command::Load(path) => self.load_file(&path, console)?,
            Command::Search(arg) => self.search(&arg, console)?,
            Command::Get { detail, target } => {
                let response = self.fetch_target(&target)?;
                self.show_entity(&response, detail, console)?;
            }
            Command::Compare(ids) => {
                let ids = self.resolve_ids(&ids)?;
                self.compare(&ids, console)?;
            }
            Command::Why(ids) => {
                let ids = self.resolve_ids(&ids)?;
                self.why(&ids, console)?;
            }
            Command::Try(arg) => self.try_records(&arg, console)?,
            Command::Export { ids, file } => {
                let ids = self.resolve_ids(&ids)?;
                let file = file.unwrap_or_else(|| PathBuf::from(entity::default_export_file(&ids)));
                self.export(&ids, &file, console)?;
            }
            Command::AuditSummary { category, group } => {
                self.audit_summary(category.as_deref(), group.as_deref(), console)?
            }
            Command::DataSourceSummary(selection) => self.data_source_summary(selection, console)?,
            Command::CrossSourceSummary { data_source1, pair } => {
                self.cross_source_summary(data_source1.as_deref(), pair, console)?
            }
            Command::EntitySizeBreakdown(arg) => self.entity_size_breakdown(arg.as_deref(), console)?,
            Command::ColorScheme(scheme) => {
                console.renderer.set_scheme(scheme);
                self.settings.color_scheme = scheme;
                self.persist_settings();
                console.message(&format!("color scheme set to {}", scheme), Tone::Good)?;
            }
            Command::Help(name) => self.help(name.as_deref(), console)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Loads a snapshot or audit file, replacing any loaded before.
    pub fn load_file(&mut self, path: &Path, console: &mut Console<'_>) -> Result<(), CommandError> {
        let text = fs::read_to_string(path)
            .map_err(|e| CommandError::File(format!("cannot read {} - {}", path.display(), e)))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            EvidenceError::Document(format!("{} is not valid json: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        if SnapshotDocument::is_snapshot(&value) {
            let doc = SnapshotDocument::from_value(&value)?;
            self.snapshot = Some(Loaded { doc, file_name: file_name.clone() });
            self.settings.remember_snapshot(path);
            self.persist_settings();
            console.message(&format!("snapshot statistics loaded from {}", file_name), Tone::Good)?;
        } else if value.get("SOURCE").and_then(Value::as_str) == Some(AUDIT_SOURCE) {
            let doc = AuditDocument::from_value(&value)?;
            self.audit = Some(Loaded { doc, file_name: file_name.clone() });
            self.settings.remember_audit(path);
            self.persist_settings();
            console.message(&format!("audit statistics loaded from {}", file_name), Tone::Good)?;
        } else {
            return Err(EvidenceError::Document(format!("{} is not a snapshot or audit file", file_name)).into());
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<&Loaded<SnapshotDocument>, CommandError> {
        self.snapshot.as_ref().ok_or_else(|| {
            EvidenceError::Document("no snapshot file loaded, use load <file> first".to_string()).into()
        })
    }

    fn audit(&self) -> Result<&Loaded<AuditDocument>, CommandError> {
        self.audit.as_ref().ok_or_else(|| {
            EvidenceError::Document("no audit file loaded, use load <file> first".to_string()).into()
        })
    }

    // ------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------

    fn resolve_ids(&self, ids: &IdList) -> Result<Vec<i64>, CommandError> {
        match ids {
            IdList::Ids(ids) => Ok(ids.clone()),
            IdList::Search(_) if self.last_search.is_empty() => {
                Err(EvidenceError::argument("search", "there are no prior search results").into())
            }
            IdList::Search(top) => {
                let n = top.unwrap_or(self.last_search.len()).min(self.last_search.len());
                Ok(self.last_search[..n].to_vec())
            }
        }
    }

    fn fetch_entity(&self, entity_id: i64) -> Result<EntityResponse, CommandError> {
        let doc = self.engine.get_entity_by_entity_id(entity_id)?;
        Ok(EntityResponse::from_value(&doc)?)
    }

    fn fetch_target(&self, target: &GetTarget) -> Result<EntityResponse, CommandError> {
        match target {
            GetTarget::Entity(entity_id) => self.fetch_entity(*entity_id),
            GetTarget::Record { data_source, record_id } => {
                let doc = self.engine.get_entity_by_record_id(data_source, record_id)?;
                Ok(EntityResponse::from_value(&doc)?)
            }
            GetTarget::Search(n) => {
                let entity_id = n.checked_sub(1).and_then(|i| self.last_search.get(i)).copied().ok_or_else(|| {
                    EvidenceError::argument(n.to_string(), "select a valid index from the prior search results")
                })?;
                self.fetch_entity(entity_id)
            }
        }
    }

    fn show_entity(
        &self,
        response: &EntityResponse,
        detail: bool,
        console: &mut Console<'_>,
    ) -> Result<(), CommandError> {
        let table = if detail {
            entity::entity_detail_table(response)
        } else {
            entity::entity_summary_table(response, &self.index)
        };
        console.table(&table)?;
        if let Some(related) = entity::related_table(response, "Related entities") {
            console.table(&related)?;
        }
        Ok(())
    }

    fn search(&mut self, arg: &str, console: &mut Console<'_>) -> Result<(), CommandError> {
        let attributes = search::search_document(arg)?;
        let doc = self.engine.search_by_attributes(&attributes)?;
        let hits = search::rank_search(&SearchResponse::from_value(&doc)?);
        self.last_search = hits.iter().map(|h| h.entity_id).collect();

        if hits.is_empty() {
            console.message("0 records found", Tone::Caution)?;
            return Ok(());
        }
        let page_size = match self.settings.page_size {
            0 => hits.len(),
            n => n.min(hits.len()),
        };
        console.table(&search::search_table(&hits[..page_size]))?;
        if page_size < hits.len() {
            console.line(&format!(
                "showing {} of {} results, use search [n] with compare, why or export for the rest",
                page_size,
                hits.len()
            ))?;
        }
        Ok(())
    }

    fn compare(&self, entity_ids: &[i64], console: &mut Console<'_>) -> Result<(), CommandError> {
        let responses = entity_ids
            .iter()
            .map(|id| self.fetch_entity(*id))
            .collect::<Result<Vec<_>, _>>()?;
        console.table(&entity::compare_table(&responses, &self.index))?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Why and try
    // ------------------------------------------------------------------------

    fn classify(&self, entity_ids: &[i64]) -> Result<Classification, CommandError> {
        let set = Collector::new(&*self.engine, &self.index).collect(entity_ids)?;
        Ok(Classifier::new(&self.index, &self.comparator, self.store()).classify(&set))
    }

    fn why(&self, entity_ids: &[i64], console: &mut Console<'_>) -> Result<(), CommandError> {
        let classification = self.classify(entity_ids)?;
        console.table(&why::why_table(&classification, &self.index))?;
        Ok(())
    }

    fn try_records(&mut self, arg: &str, console: &mut Console<'_>) -> Result<(), CommandError> {
        let records = trial::parse_trial_records(arg)?;

        let index = &self.index;
        let comparator = &self.comparator;
        let store = self.store.as_deref();
        let outcome = trial::run_trial(&mut *self.engine, records, |engine, entity_id| {
            let set = Collector::new(engine, index).collect(&[entity_id])?;
            Ok(Classifier::new(index, comparator, store).classify(&set))
        })?;

        match outcome {
            TrialOutcome::Resolved { forced, analysis, .. } => {
                let table = why::why_table_titled(&analysis, &self.index, trial::trial_title(forced));
                console.table(&table)?;
            }
            TrialOutcome::NotResolved => {
                console.message("Try result: the records do not resolve, even when forced", Tone::Bad)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------------

    fn export(&self, entity_ids: &[i64], file: &Path, console: &mut Console<'_>) -> Result<(), CommandError> {
        let responses = entity_ids
            .iter()
            .map(|id| self.fetch_entity(*id))
            .collect::<Result<Vec<_>, _>>()?;
        let lines = entity::export_lines(&responses);

        let mut text = lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        fs::write(file, text)
            .map_err(|e| CommandError::File(format!("cannot write to {} - {}", file.display(), e)))?;
        console.message(&format!("{} records written to {}", lines.len(), file.display()), Tone::Good)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Audit
    // ------------------------------------------------------------------------

    fn audit_summary(
        &self,
        category: Option<&str>,
        group: Option<&str>,
        console: &mut Console<'_>,
    ) -> Result<(), CommandError> {
        let loaded = self.audit()?;
        let Some(category_name) = category else {
            for table in audit::summary_tables(&loaded.doc, &loaded.file_name) {
                console.table(&table)?;
            }
            return Ok(());
        };

        let category = loaded
            .doc
            .category(category_name)
            .ok_or_else(|| EvidenceError::argument(category_name, "not a valid audit category"))?;
        let groups = audit::drill_down(category);
        let Some(group_name) = group else {
            console.table(&audit::groups_table(category, &groups))?;
            return Ok(());
        };

        let group = audit::select_group(&groups, group_name).ok_or_else(|| {
            EvidenceError::argument(group_name, "please choose a valid split or merge sub-category")
        })?;
        let samples: Vec<&AuditSample> = audit::group_samples(category, group);
        if samples.is_empty() {
            console.message(&format!("no samples recorded for {}", group.name), Tone::Caution)?;
            return Ok(());
        }

        let review_title = format!("{} {}", category.name, group.name);
        browse::browse(
            samples,
            console,
            AUDIT_PROMPT,
            false,
            |sample, position, console| {
                let table = audit::review_sample(sample, &self.index, &self.comparator, self.store())?;
                console.line("")?;
                console.line(&format!("{} - {}", review_title, position.label()))?;
                console.table(&table)?;
                Ok(())
            },
            |sample, action, console| {
                let entity_ids = audit::sample_entity_ids(sample);
                match action {
                    Action::Why => self.why(&entity_ids, console),
                    Action::Export(file) => {
                        let file = file.unwrap_or_else(|| {
                            let audit_id = sample.first().map(|r| r.audit_id.as_str()).unwrap_or("sample");
                            home_file(format!("auditSample-{}.json", audit_id))
                        });
                        self.export(&entity_ids, &file, console)
                    }
                    Action::Detail => Ok(()),
                }
            },
        )
    }

    // ------------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------------

    fn data_source_summary(
        &self,
        selection: Option<(String, String)>,
        console: &mut Console<'_>,
    ) -> Result<(), CommandError> {
        let loaded = self.snapshot()?;
        match selection {
            None => console.table(&snapshot::data_source_table(&loaded.doc, &loaded.file_name)?)?,
            Some((data_source, level)) => {
                let list = snapshot::data_source_samples(&loaded.doc, &data_source, &level)?;
                self.browse_samples(list, console)?;
            }
        }
        Ok(())
    }

    fn cross_source_summary(
        &self,
        data_source1: Option<&str>,
        pair: Option<(String, String)>,
        console: &mut Console<'_>,
    ) -> Result<(), CommandError> {
        let loaded = self.snapshot()?;
        match (data_source1, pair) {
            (Some(data_source1), Some((data_source2, level))) => {
                let list = snapshot::cross_source_samples(&loaded.doc, data_source1, &data_source2, &level)?;
                self.browse_samples(list, console)?;
            }
            (only, _) => {
                console.table(&snapshot::cross_source_table(&loaded.doc, &loaded.file_name, only)?)?;
            }
        }
        Ok(())
    }

    fn entity_size_breakdown(&self, arg: Option<&str>, console: &mut Console<'_>) -> Result<(), CommandError> {
        let loaded = self.snapshot()?;
        let Some(arg) = arg else {
            console.table(&snapshot::entity_size_table(&loaded.doc, &loaded.file_name)?)?;
            return Ok(());
        };

        let filter = SizeFilter::parse(arg);
        log::debug!("entity size filter {:?}", filter);
        let samples: Vec<SizeSample> = snapshot::entity_size_samples(&loaded.doc, &filter)?;
        if samples.is_empty() {
            console.message(&format!("no entities found for entitySizeBreakdown {}", arg), Tone::Caution)?;
            return Ok(());
        }

        browse::browse(
            samples,
            console,
            SAMPLE_PROMPT,
            true,
            |sample, position, console| {
                console.line("")?;
                console.line(&format!("{} - {}", sample.review_title(), position.label()))?;
                let response = self.fetch_entity(sample.entity_id).map_err(stale)?;
                self.show_entity(&response, false, console)
            },
            |sample, action, console| self.sample_action(&[sample.entity_id], action, console),
        )
    }

    /// Entity ids of one sample, widened to the whole ambiguous set when asked.
    fn sample_ids(&self, sample: &[i64], ambiguous: bool) -> Result<Vec<i64>, CommandError> {
        if ambiguous {
            Ok(snapshot::widen_ambiguous(sample, &self.index, self.store())?)
        } else {
            Ok(sample.to_vec())
        }
    }

    fn browse_samples(&self, list: SampleList, console: &mut Console<'_>) -> Result<(), CommandError> {
        let SampleList { review_title, single_entity, ambiguous, samples } = list;
        if samples.is_empty() {
            console.message(&format!("no samples recorded for {}", review_title), Tone::Caution)?;
            return Ok(());
        }

        browse::browse(
            samples,
            console,
            SAMPLE_PROMPT,
            true,
            |sample, position, console| {
                let entity_ids = self.sample_ids(sample, ambiguous)?;
                console.line("")?;
                console.line(&format!("{} - {}", review_title, position.label()))?;
                match entity_ids.as_slice() {
                    [] => Ok(()),
                    [entity_id, ..] if single_entity => {
                        let response = self.fetch_entity(*entity_id).map_err(stale)?;
                        self.show_entity(&response, false, console)
                    }
                    _ => self.compare(&entity_ids, console).map_err(stale),
                }
            },
            |sample, action, console| {
                let entity_ids = self.sample_ids(sample, ambiguous)?;
                self.sample_action(&entity_ids, action, console)
            },
        )
    }

    fn sample_action(&self, entity_ids: &[i64], action: Action, console: &mut Console<'_>) -> Result<(), CommandError> {
        match action {
            Action::Detail => {
                for entity_id in entity_ids {
                    let response = self.fetch_entity(*entity_id).map_err(stale)?;
                    self.show_entity(&response, true, console)?;
                }
                Ok(())
            }
            Action::Why => self.why(entity_ids, console),
            Action::Export(file) => {
                let file = file.unwrap_or_else(|| {
                    let ids: Vec<String> = entity_ids.iter().map(i64::to_string).collect();
                    home_file(format!("{}.json", ids.join("-")))
                });
                self.export(entity_ids, &file, console)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Help
    // ------------------------------------------------------------------------

    fn help(&self, name: Option<&str>, console: &mut Console<'_>) -> Result<(), CommandError> {
        if let Some(name) = name {
            let entry = command::help_entry(name).ok_or_else(|| ParseError::Unknown(name.to_string()))?;
            console.line("")?;
            console.line(entry.summary)?;
            console.line(&format!("  syntax: {}", entry.syntax))?;
            console.line("")?;
            return Ok(());
        }

        let mut table = Table::new("Commands")
            .column("Command", Align::Left)
            .column("Description", Align::Left);
        for entry in HELP {
            table.push_row(vec![Cell::text(entry.name), Cell::text(entry.summary)]);
        }
        console.table(&table)?;
        console.line("type help <command> for its syntax")?;
        Ok(())
    }
}
