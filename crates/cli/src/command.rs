//! One console input line parsed into a typed command.

use std::fmt;
use std::path::PathBuf;

use matchlens_config::ColorScheme;

// ----------------------------------------------------------------------------
// Arguments
// ----------------------------------------------------------------------------

/// Entities named by their ids, or taken from the last search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdList {
    Ids(Vec<i64>),
    /// `search` for the whole result list, `search n` for its top n.
    Search(Option<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetTarget {
    Entity(i64),
    Record { data_source: String, record_id: String },
    /// 1-based position in the last search result.
    Search(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load(PathBuf),
    Search(String),
    Get { detail: bool, target: GetTarget },
    Compare(IdList),
    Why(IdList),
    Try(String),
    Export { ids: IdList, file: Option<PathBuf> },
    AuditSummary { category: Option<String>, group: Option<String> },
    DataSourceSummary(Option<(String, String)>),
    CrossSourceSummary { data_source1: Option<String>, pair: Option<(String, String)> },
    EntitySizeBreakdown(Option<String>),
    ColorScheme(ColorScheme),
    Help(Option<String>),
    Quit,
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Unknown(String),
    /// Missing or malformed arguments; carries the command's syntax line.
    Syntax { command: &'static str, reason: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Unknown(name) => {
                write!(f, "unknown command '{}', type help for the command list", name)
            }
            ParseError::Syntax { command, reason } => {
                let syntax = help_entry(command).map(|h| h.syntax).unwrap_or(command);
                write!(f, "{}, syntax: {}", reason, syntax)
            }
        }
    }
}

impl std::error::Error for ParseError {}

fn syntax(command: &'static str, reason: impl Into<String>) -> ParseError {
    ParseError::Syntax { command, reason: reason.into() }
}

// ----------------------------------------------------------------------------
// Help
// ----------------------------------------------------------------------------

pub struct HelpEntry {
    pub name: &'static str,
    pub syntax: &'static str,
    pub summary: &'static str,
}

pub const HELP: &[HelpEntry] = &[
    HelpEntry {
        name: "load",
        syntax: "load <snapshot or audit file>",
        summary: "Load statistics from a snapshot or audit file",
    },
    HelpEntry {
        name: "search",
        syntax: "search <name> | search <json attributes>",
        summary: "Search the engine by attributes",
    },
    HelpEntry {
        name: "get",
        syntax: "get [detail] <entity id> | <data source> <record id> | search <n>",
        summary: "Show an entity summary, or every record with detail",
    },
    HelpEntry {
        name: "compare",
        syntax: "compare <entity ids> | search [n]",
        summary: "Show entities side by side",
    },
    HelpEntry {
        name: "why",
        syntax: "why <entity id> | <entity ids> | search [n]",
        summary: "Explain why an entity resolved, or why entities did not",
    },
    HelpEntry {
        name: "try",
        syntax: "try [<record json>, <record json>]",
        summary: "Load two records and explain whether they resolve",
    },
    HelpEntry {
        name: "export",
        syntax: "export <entity ids> | search [n] [to <file>]",
        summary: "Write the entities' records as json lines",
    },
    HelpEntry {
        name: "auditSummary",
        syntax: "auditSummary [<category> [<sub-category>]]",
        summary: "Show audit statistics, a category drill-down or its samples",
    },
    HelpEntry {
        name: "dataSourceSummary",
        syntax: "dataSourceSummary [<data source> <match level>]",
        summary: "Show snapshot statistics by data source, or browse samples",
    },
    HelpEntry {
        name: "crossSourceSummary",
        syntax: "crossSourceSummary [<data source1> [<data source2> <match level>]]",
        summary: "Show matches across data sources, or browse samples",
    },
    HelpEntry {
        name: "entitySizeBreakdown",
        syntax: "entitySizeBreakdown [= | > | < | >= | <= <size>] [review] [<reason>]",
        summary: "Show entity sizes, or browse entities of a size",
    },
    HelpEntry {
        name: "colorScheme",
        syntax: "colorScheme dark | light",
        summary: "Switch colors for dark or light terminals",
    },
    HelpEntry { name: "help", syntax: "help [<command>]", summary: "Show commands" },
    HelpEntry { name: "quit", syntax: "quit", summary: "Leave the console" },
];

pub fn help_entry(name: &str) -> Option<&'static HelpEntry> {
    HELP.iter().find(|h| h.name.eq_ignore_ascii_case(name))
}

// ----------------------------------------------------------------------------
// Parsing
// ----------------------------------------------------------------------------

/// `Ok(None)` for a blank line.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };
    let tokens: Vec<&str> = rest.split_whitespace().collect();

    let command = match name.to_ascii_lowercase().as_str() {
        "load" => Command::Load(PathBuf::from(required("load", rest)?)),
        "search" => Command::Search(required("search", rest)?.to_string()),
        "get" => parse_get(rest)?,
        "compare" => Command::Compare(parse_ids("compare", rest)?),
        "why" => Command::Why(parse_ids("why", rest)?),
        "try" => Command::Try(required("try", rest)?.to_string()),
        "export" => parse_export(rest)?,
        "auditsummary" => Command::AuditSummary {
            category: tokens.first().map(|s| s.to_string()),
            group: tokens.get(1).map(|s| s.to_string()),
        },
        "datasourcesummary" => match tokens.as_slice() {
            [] => Command::DataSourceSummary(None),
            [data_source, level @ ..] if !level.is_empty() => {
                Command::DataSourceSummary(Some((data_source.to_string(), level.join(" "))))
            }
            _ => return Err(syntax("dataSourceSummary", "a match level is required")),
        },
        "crosssourcesummary" => match tokens.as_slice() {
            [] => Command::CrossSourceSummary { data_source1: None, pair: None },
            [data_source1] => Command::CrossSourceSummary {
                data_source1: Some(data_source1.to_string()),
                pair: None,
            },
            [data_source1, data_source2, level @ ..] if !level.is_empty() => {
                Command::CrossSourceSummary {
                    data_source1: Some(data_source1.to_string()),
                    pair: Some((data_source2.to_string(), level.join(" "))),
                }
            }
            _ => return Err(syntax("crossSourceSummary", "a match level is required")),
        },
        "entitysizebreakdown" => {
            Command::EntitySizeBreakdown((!rest.is_empty()).then(|| rest.to_string()))
        }
        "colorscheme" => {
            let scheme = required("colorScheme", rest)?
                .parse::<ColorScheme>()
                .map_err(|e| syntax("colorScheme", e))?;
            Command::ColorScheme(scheme)
        }
        "help" | "?" => Command::Help(tokens.first().map(|s| s.to_string())),
        "quit" | "exit" => Command::Quit,
        _ => return Err(ParseError::Unknown(name.to_string())),
    };
    Ok(Some(command))
}

fn required<'a>(command: &'static str, rest: &'a str) -> Result<&'a str, ParseError> {
    if rest.is_empty() {
        Err(syntax(command, format!("missing argument(s) for {}", command)))
    } else {
        Ok(rest)
    }
}

fn search_index(command: &'static str, token: &str) -> Result<usize, ParseError> {
    match token.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(syntax(command, "select a valid index from the prior search results")),
    }
}

fn parse_get(rest: &str) -> Result<Command, ParseError> {
    let mut tokens: Vec<&str> = required("get", rest)?.split_whitespace().collect();
    let detail = tokens.first().is_some_and(|t| t.eq_ignore_ascii_case("detail"));
    if detail {
        tokens.remove(0);
    }

    let target = match tokens.as_slice() {
        [keyword, n] if keyword.eq_ignore_ascii_case("search") => {
            GetTarget::Search(search_index("get", n)?)
        }
        [entity_id] => GetTarget::Entity(
            entity_id
                .parse()
                .map_err(|_| syntax("get", format!("{} is not an entity id", entity_id)))?,
        ),
        [data_source, record_id] => GetTarget::Record {
            data_source: data_source.to_uppercase(),
            record_id: record_id.to_string(),
        },
        _ => return Err(syntax("get", "incorrect number of parameters")),
    };
    Ok(Command::Get { detail, target })
}

/// Comma or space delimited ids, or `search [n]`.
fn parse_ids(command: &'static str, rest: &str) -> Result<IdList, ParseError> {
    let rest = required(command, rest)?;
    let tokens: Vec<&str> =
        rest.split(|c: char| c == ',' || c.is_whitespace()).filter(|t| !t.is_empty()).collect();

    if tokens.first().is_some_and(|t| t.eq_ignore_ascii_case("search")) {
        return match &tokens[1..] {
            [] => Ok(IdList::Search(None)),
            [n] => Ok(IdList::Search(Some(search_index(command, n)?))),
            [.., last] => Ok(IdList::Search(Some(search_index(command, last)?))),
        };
    }

    let mut ids = Vec::with_capacity(tokens.len());
    for token in tokens {
        let id = token.parse::<i64>().map_err(|_| {
            syntax(
                command,
                format!("error parsing [{}] into entity id numbers, expected comma or space delimited integers", rest),
            )
        })?;
        ids.push(id);
    }
    if ids.is_empty() {
        return Err(syntax(command, format!("{} contains no valid entities", rest)));
    }
    Ok(IdList::Ids(ids))
}

fn parse_export(rest: &str) -> Result<Command, ParseError> {
    let rest = required("export", rest)?;
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let (ids, file) = match tokens.iter().position(|t| t.eq_ignore_ascii_case("to")) {
        Some(at) => {
            let file = tokens[at + 1..].join(" ");
            if file.is_empty() {
                return Err(syntax("export", "a file name is required after to"));
            }
            (tokens[..at].join(" "), Some(PathBuf::from(file)))
        }
        None => (rest.to_string(), None),
    };
    Ok(Command::Export { ids: parse_ids("export", &ids)?, file })
}

/// Reply to a browse prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Previous,
    Next,
    Detail,
    Why,
    /// `e` or `e to <file>`.
    Export(Option<PathBuf>),
    Quit,
    /// Blank or unrecognised: show the current sample again.
    Again,
}

pub fn parse_reply(line: &str) -> Reply {
    let line = line.trim();
    let upper = line.to_ascii_uppercase();
    match upper.chars().next() {
        Some('P') => Reply::Previous,
        Some('N') => Reply::Next,
        Some('D') => Reply::Detail,
        Some('W') => Reply::Why,
        Some('Q') => Reply::Quit,
        Some('E') => {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let file = tokens
                .iter()
                .position(|t| t.eq_ignore_ascii_case("to"))
                .map(|at| tokens[at + 1..].join(" "))
                .filter(|f| !f.is_empty())
                .map(PathBuf::from);
            Reply::Export(file)
        }
        _ => Reply::Again,
    }
}
