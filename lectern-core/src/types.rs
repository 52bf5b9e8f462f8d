//! Core type definitions for Lectern

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output formats a conversion can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Markdown,
    Json,
}

impl OutputFormat {
    /// Get the string representation of the format
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
        }
    }

    /// Whether a partial HTML rendering may be published before the final result
    pub fn supports_preview(&self) -> bool {
        matches!(self, OutputFormat::Html)
    }

    /// Get all supported formats
    pub fn all() -> &'static [OutputFormat] {
        &[OutputFormat::Html, OutputFormat::Markdown, OutputFormat::Json]
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ParseError::InvalidOutputFormat(s.to_string())),
        }
    }
}

/// Errors from parsing the string forms of core types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid output format: '{0}'. Supported formats are: html, markdown, json")]
    InvalidOutputFormat(String),

    #[error("Invalid job status: '{0}'")]
    InvalidJobStatus(String),

    #[error("Invalid job id: '{0}'")]
    InvalidJobId(String),
}
