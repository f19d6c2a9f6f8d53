use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormulaError {
    /// Bad record, unknown architecture, unmet requirement. Raised before any download.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Checksum mismatch for {artifact}: expected {expected}, got {actual}")]
    Integrity {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("Command failed: {command} ({})", exit_description(.code))]
    Subprocess { command: String, code: Option<i32> },

    #[error("Assertion failed: {check}\n  expected: {expected}\n  actual:   {actual}")]
    Assertion {
        check: String,
        expected: String,
        actual: String,
    },

    #[error("Formula not found: {0}")]
    NotFound(String),

    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl FormulaError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Process exit code to report for this error.
    ///
    /// A failing subprocess's own code is passed through untouched.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Subprocess {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, FormulaError>;
