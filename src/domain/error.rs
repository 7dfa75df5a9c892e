//! Domain error types.

/// Top-level error type for rotator.
#[derive(Debug, thiserror::Error)]
pub enum RotatorError {
    #[error("data error: {reason}")]
    Data { reason: String },

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

    #[error("no data for {ticker}")]
    NoData { ticker: String },

    #[error("insufficient data for {ticker}: have {bars} bars, need {minimum}")]
    InsufficientData {
        ticker: String,
        bars: usize,
        minimum: usize,
    },

    #[error("export error writing {path}: {reason}")]
    Export { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&RotatorError> for std::process::ExitCode {
    fn from(err: &RotatorError) -> Self {
        let code: u8 = match err {
            RotatorError::Io(_) => 1,
            RotatorError::ConfigParse { .. }
            | RotatorError::ConfigMissing { .. }
            | RotatorError::ConfigInvalid { .. } => 2,
            RotatorError::Data { .. } => 3,
            RotatorError::NoData { .. } | RotatorError::InsufficientData { .. } => 4,
            RotatorError::Export { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
