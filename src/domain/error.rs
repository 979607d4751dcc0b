//! Domain error taxonomy.

use chrono::NaiveDateTime;

/// Top-level error type for zlmatrader.
#[derive(Debug, thiserror::Error)]
pub enum ZlmaError {
    #[error("no data for {symbol} on {timeframe}")]
    NoData { symbol: String, timeframe: String },

    #[error("missing required column {field}")]
    MissingField { field: &'static str },

    #[error("{indicator} computation failed: {reason}")]
    Computation {
        indicator: &'static str,
        reason: String,
    },

    #[error("simulation failed at {at}: {reason}")]
    Simulation { at: NaiveDateTime, reason: String },

    #[error("corrupt price series: {reason}")]
    CorruptSeries { reason: String },

    #[error("unsupported timeframe {value:?} (expected one of 12h, 1d, 1w)")]
    UnsupportedTimeframe { value: String },

    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("storage query error: {reason}")]
    StorageQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ZlmaError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        ZlmaError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&ZlmaError> for std::process::ExitCode {
    fn from(err: &ZlmaError) -> Self {
        let code: u8 = match err {
            ZlmaError::Io(_) => 1,
            ZlmaError::ConfigParse { .. }
            | ZlmaError::ConfigMissing { .. }
            | ZlmaError::ConfigInvalid { .. }
            | ZlmaError::UnsupportedTimeframe { .. } => 2,
            ZlmaError::Storage { .. } | ZlmaError::StorageQuery { .. } => 3,
            ZlmaError::MissingField { .. }
            | ZlmaError::Computation { .. }
            | ZlmaError::CorruptSeries { .. } => 4,
            ZlmaError::NoData { .. } => 5,
            ZlmaError::Simulation { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
