use std::fmt;

#[derive(Debug)]
pub enum EvidenceError {
    /// Configuration document could not be parsed.
    ConfigParse(String),
    /// Configuration parsed but is unusable (missing feature type, bad reference).
    ConfigValidation(String),
    /// The engine reported zero records for the requested entity or record.
    NotFound(String),
    /// A loaded statistics document references data the engine no longer has.
    StaleData(String),
    /// User input could not be interpreted.
    Argument { input: String, reason: String },
    /// Engine call failed or returned an unreadable payload.
    Engine(String),
    /// Relational store call failed, or no store is connected.
    Store(String),
    /// Statistics document is not of the expected kind or shape.
    Document(String),
}

impl EvidenceError {
    pub fn argument(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Argument { input: input.into(), reason: reason.into() }
    }

    /// True for errors the console reports and then keeps running.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ConfigParse(_) | Self::ConfigValidation(_))
    }
}

impl fmt::Display for EvidenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::NotFound(what) => write!(f, "0 records found for {what}"),
            Self::StaleData(what) => {
                write!(f, "the statistics loaded are out of date for {what}")
            }
            Self::Argument { input, reason } => {
                write!(f, "incorrect argument(s) [{input}]: {reason}")
            }
            Self::Engine(msg) => write!(f, "engine error: {msg}"),
            Self::Store(msg) => write!(f, "database error: {msg}"),
            Self::Document(msg) => write!(f, "statistics file error: {msg}"),
        }
    }
}

impl std::error::Error for EvidenceError {}
